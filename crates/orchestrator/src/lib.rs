//! Batched chat replies: inbound messages are grouped per channel, one
//! message per batch is selected, and a fixed chain of agents decides
//! whether and how to answer it.
//!
//! Flow: transport → [`IntakeBuffer`] → [`BatchScheduler`] → selection →
//! [`PipelineOrchestrator`] (thought → theory → generate → reflection) →
//! [`ReflectionDecisionEngine`] (send + persist).

pub mod cognition;
pub mod decision;
pub mod error;
pub mod intake;
pub mod parser;
pub mod pipeline;
pub mod scheduler;
pub mod selector;

pub use {
    cognition::{CognitionState, Stage, StageFailure, StageOutcome},
    decision::{Action, Decision, ReflectionDecisionEngine, decide},
    error::{Error, Result},
    intake::IntakeBuffer,
    parser::{LabeledLineParser, ParseError, ParsedFields, StructuredTextParser, format_batch},
    pipeline::{PipelineOrchestrator, PipelineSettings, RunContext, RunReport},
    scheduler::{BatchScheduler, CycleReport, SchedulerOptions},
    selector::{Selection, select_message},
};
