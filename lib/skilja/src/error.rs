use thiserror::Error;

/// Fatal error taxonomy. Per-record problems (malformed documents) are never
/// errors: they are skipped and counted by the mapper that saw them.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or invalid configuration, detected before any processing starts.
    #[error("configuration: {0}")]
    Configuration(String),

    /// A task exhausted its retries; the whole phase fails and no partial
    /// results are kept.
    #[error("phase {phase} failed on task {task} after {attempts} attempts: {source}")]
    PhaseFailed {
        phase: &'static str,
        task: usize,
        attempts: usize,
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::Configuration(msg.into())
    }
}
