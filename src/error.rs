//! Error types for chatsync

use thiserror::Error;

/// Main error type for the pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// OAuth2 authentication against the upstream failed
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Non-2xx response from the upstream API
    #[error("Upstream API error ({status}) at {endpoint}: {body}")]
    Api {
        status: u16,
        endpoint: String,
        body: String,
    },

    /// A raw record failed schema normalization
    #[error("Schema error: {0}")]
    Schema(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(String),

    /// A run was cooperatively cancelled
    #[error("Run cancelled")]
    Cancelled,

    /// SLA / business-hours calculation failed
    #[error("Computation error: {0}")]
    Computation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQL errors
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Migration errors
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Reqwest HTTP client errors
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classify an error for `ExtractLog`/`TransformLog` metadata and for
    /// deciding whether the queue should retry.
    pub fn class(&self) -> &'static str {
        match self {
            Error::Auth(_) => "auth_error",
            Error::Api { status, .. } => match status {
                429 => "rate_limit",
                500..=599 => "server_error",
                400..=499 => "client_error",
                _ => "network_error",
            },
            Error::Schema(_) => "schema_error",
            Error::Database(_) | Error::Sql(_) | Error::Migrate(_) => "database_error",
            Error::Cancelled => "cancelled",
            Error::Computation(_) => "computation_error",
            Error::Configuration(_) => "config_error",
            Error::InvalidInput(_) => "invalid_input",
            Error::Serialization(_) => "serialization_error",
            Error::Io(_) => "io_error",
            Error::Reqwest(_) => "network_error",
            Error::Other(_) => "unknown_error",
        }
    }

    /// Whether the rate-limited queue should retry a call that failed this way.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            "rate_limit" | "server_error" | "network_error"
        )
    }
}

/// Result type alias for chatsync operations
pub type Result<T> = std::result::Result<T, Error>;
