use thiserror::Error;

/// Error types for dialer queue operations
///
/// The first four variants form the taxonomy callers reason about: lookups
/// that miss, input that is malformed, assignment races and collaborator
/// failures. The remaining variants wrap infrastructure problems.
///
/// # Examples
///
/// ```
/// use dialer_engine::{DialerError, Result};
///
/// fn lookup_list(id: &str) -> Result<()> {
///     Err(DialerError::not_found(format!("call list {}", id)))
/// }
///
/// match lookup_list("missing") {
///     Err(DialerError::NotFound(msg)) => println!("not found: {}", msg),
///     Err(e) => println!("other error: {}", e),
///     Ok(()) => {}
/// }
/// ```
#[derive(Error, Debug)]
pub enum DialerError {
    /// Unknown list, item, disposition or session
    ///
    /// Returned to the caller immediately, never retried.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input
    ///
    /// # Examples
    /// - Filter criteria that reference an invalid field path
    /// - An item with neither a lead nor an opportunity reference
    /// - A manual item without a usable phone number
    /// - Dispositioning an item that is already terminal
    #[error("Validation error: {0}")]
    Validation(String),

    /// Lost a compare-and-swap race for an item
    ///
    /// The assignment engine retries these internally and reports "no item"
    /// once its retry budget is spent, so end users never see this variant
    /// from `get_next`.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A record source or DNC registry call failed
    ///
    /// During disposition side effects this is logged and reported in the
    /// outcome; the item's own state change is never rolled back for it.
    #[error("External failure: {0}")]
    ExternalFailure(String),

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unexpected internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DialerError {
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn external<S: Into<String>>(msg: S) -> Self {
        Self::ExternalFailure(msg.into())
    }

    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Short machine-readable code used by the HTTP layer
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION",
            Self::Conflict(_) => "CONFLICT",
            Self::ExternalFailure(_) => "EXTERNAL_FAILURE",
            Self::Database(_) => "DATABASE",
            Self::Configuration(_) => "CONFIGURATION",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<sqlx::Error> for DialerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound(err.to_string()),
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DialerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Database(format!("migration failed: {}", err))
    }
}

impl From<serde_json::Error> for DialerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("invalid JSON: {}", err))
    }
}

impl From<config::ConfigError> for DialerError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<anyhow::Error> for DialerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type for dialer operations
pub type Result<T> = std::result::Result<T, DialerError>;
