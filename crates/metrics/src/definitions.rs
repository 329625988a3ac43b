//! Metric name and label definitions.

/// Intake buffer metrics
pub mod intake {
    /// Messages accepted from transports
    pub const MESSAGES_ENQUEUED_TOTAL: &str = "trinity_intake_messages_enqueued_total";
    /// Messages waiting for the next drain
    pub const PENDING_MESSAGES: &str = "trinity_intake_pending_messages";
}

/// Scheduler and pipeline metrics
pub mod pipeline {
    /// Drain cycles that found at least one batch
    pub const CYCLES_TOTAL: &str = "trinity_pipeline_cycles_total";
    /// Completed pipeline runs
    pub const RUNS_TOTAL: &str = "trinity_pipeline_runs_total";
    /// Pipeline runs aborted by a collaborator failure
    pub const RUN_ERRORS_TOTAL: &str = "trinity_pipeline_run_errors_total";
    /// Wall time of one pipeline run in seconds
    pub const RUN_DURATION_SECONDS: &str = "trinity_pipeline_run_duration_seconds";
    /// Batch size seen by the selector
    pub const BATCH_SIZE: &str = "trinity_pipeline_batch_size";
    /// Stage replies that could not be parsed
    pub const STAGE_PARSE_FAILURES_TOTAL: &str = "trinity_pipeline_stage_parse_failures_total";
    /// Choose replies that fell back to the first message
    pub const SELECTION_FALLBACKS_TOTAL: &str = "trinity_pipeline_selection_fallbacks_total";
    /// Reflection decisions by outcome
    pub const DECISIONS_TOTAL: &str = "trinity_pipeline_decisions_total";
}

/// Memory store metrics
pub mod memory {
    /// Records committed by a flush
    pub const RECORDS_FLUSHED_TOTAL: &str = "trinity_memory_records_flushed_total";
}

/// LLM provider metrics
pub mod llm {
    /// Duration of completion requests in seconds
    pub const COMPLETION_DURATION_SECONDS: &str = "trinity_llm_completion_duration_seconds";
    /// Completion requests that failed
    pub const COMPLETION_ERRORS_TOTAL: &str = "trinity_llm_completion_errors_total";
    /// Prompt tokens sent
    pub const INPUT_TOKENS_TOTAL: &str = "trinity_llm_input_tokens_total";
    /// Completion tokens received
    pub const OUTPUT_TOKENS_TOTAL: &str = "trinity_llm_output_tokens_total";
}

/// Common label keys
pub mod labels {
    pub const MODEL: &str = "model";
    pub const STAGE: &str = "stage";
    pub const DECISION: &str = "decision";
    pub const CHANNEL: &str = "channel";
}

/// Histogram bucket boundaries
pub mod buckets {
    /// LLM calls and whole pipeline runs: 100ms to 2min
    pub const SLOW_DURATION: [f64; 10] = [0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];
    /// Batch sizes
    pub const BATCH_SIZE: [f64; 7] = [1.0, 2.0, 3.0, 5.0, 10.0, 25.0, 50.0];
}
