//! Error types for the claims-intake service.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// IMAP/SMTP mail errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("IMAP connection failed: {0}")]
    Connect(String),

    #[error("IMAP login failed for {username}")]
    Login { username: String },

    #[error("IMAP command {command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("SMTP send to {to} failed: {reason}")]
    SmtpSend { to: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Errors calling the sibling REST services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Request to {service} failed: {reason}")]
    RequestFailed { service: String, reason: String },

    #[error("{service} returned status {status}: {body}")]
    BadStatus {
        service: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },
}

/// Template loading/rendering errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Failed to read template {name}: {reason}")]
    Read { name: String, reason: String },

    #[error("Rendered template {0} is empty")]
    Empty(String),
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Fulfillment assessment failed: {0}")]
    Assessment(String),

    #[error("Notification send failed: {0}")]
    Notify(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
