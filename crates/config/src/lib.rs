//! Configuration loading, env substitution, and validation.
//!
//! Config files: `trinity.toml`, `trinity.yaml`, or `trinity.json`
//! Searched in `./` then `~/.config/trinity/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, data_dir, discover_and_load, find_config_file, load_config},
    schema::{
        AgentOverride, ChannelsConfig, IdentityConfig, MemoryBackend, MemoryStoreConfig,
        MetricsConfig, ProviderConfig, SchedulePolicy, SchedulerConfig, TrinityConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
