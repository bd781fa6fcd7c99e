/// regmigrate error types and handling utilities

/// Main error type for planning operations
#[derive(Debug)]
pub enum MigrateError {
    /// A layer record from the registry could not be accepted
    InvalidLayer { image: String, reason: String },
    /// The same `name:tag` was inserted into the graph twice
    DuplicateImage { name: String },
    /// A query named an image that was never inserted
    UnknownImage { name: String },
    /// Configuration value out of range or unparsable
    InvalidConfig { reason: String },
    /// Registry request failed
    RegistryError {
        message: String,
        retryable: bool,
        attempt: u32,
    },
    /// Wrapped anyhow error for compatibility
    Other(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MigrateError>;

impl std::fmt::Display for MigrateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLayer { image, reason } => {
                write!(f, "Invalid layer record for {}: {}", image, reason)
            }
            Self::DuplicateImage { name } => {
                write!(f, "Image {} is already present in the graph", name)
            }
            Self::UnknownImage { name } => {
                write!(f, "Image {} was never inserted into the graph", name)
            }
            Self::InvalidConfig { reason } => write!(f, "Invalid configuration: {}", reason),
            Self::RegistryError {
                message,
                retryable,
                attempt,
            } => {
                write!(
                    f,
                    "Registry error (attempt {}, retryable: {}): {}",
                    attempt, retryable, message
                )
            }
            Self::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for MigrateError {}

impl From<anyhow::Error> for MigrateError {
    fn from(err: anyhow::Error) -> Self {
        MigrateError::Other(err)
    }
}

/// Only registry failures flagged as transient are worth another attempt;
/// everything else in this crate is a caller or input error.
pub fn is_retryable(err: &MigrateError) -> bool {
    match err {
        MigrateError::RegistryError { retryable, .. } => *retryable,
        MigrateError::InvalidLayer { .. }
        | MigrateError::DuplicateImage { .. }
        | MigrateError::UnknownImage { .. }
        | MigrateError::InvalidConfig { .. }
        | MigrateError::Other(_) => false,
    }
}

/// Retry configuration for registry requests
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: crate::constants::DEFAULT_MAX_RETRY_ATTEMPTS,
            initial_backoff_ms: crate::constants::DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: crate::constants::DEFAULT_MAX_BACKOFF_MS,
            backoff_multiplier: 2.0,
        }
    }
}

/// Exponential backoff for `attempt` (0-based) with ±20% jitter, capped at `max_backoff_ms`.
pub fn calculate_backoff(attempt: u32, config: &RetryConfig) -> u64 {
    let exp = config.backoff_multiplier.powi(attempt.min(32) as i32);
    let base = (config.initial_backoff_ms as f64 * exp).min(config.max_backoff_ms as f64);

    let jitter = base * (rand::random::<f64>() * 0.4 - 0.2);
    (base + jitter).clamp(0.0, config.max_backoff_ms as f64) as u64
}
