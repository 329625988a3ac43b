//! Agents: prompt templates rendered against an LLM provider.
//!
//! The pipeline only sees the [`Agent`] trait; [`AgentSet::from_config`]
//! wires the five pipeline agents to an OpenAI-compatible endpoint.

pub mod agent;
pub mod model;
pub mod prompt;
pub mod providers;
pub mod set;

pub use {
    agent::{Agent, AgentParams, ParamValue, param},
    model::{ChatMessage, CompletionResponse, LlmProvider, Usage},
    prompt::{PromptAgent, PromptTemplate},
    set::{AgentKind, AgentSet},
};
