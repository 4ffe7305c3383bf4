use thiserror::Error;

/// Recoverable failures raised by the engine.  Shape mismatches on matrices are
/// not represented here: they panic.
#[derive(Error, Debug)]
pub enum NesError {
    /// A setting violates its constraints
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// The worker pool could not be started
    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// Reading a settings file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A settings file could not be decoded
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, NesError>;
