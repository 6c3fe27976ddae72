//! Configuration — built from environment variables, one struct per concern.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

// ── Mail monitor ────────────────────────────────────────────────────

/// IMAP inbox configuration for the mail monitor.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub app_password: SecretString,
    pub poll_interval_secs: u64,
}

impl MailConfig {
    /// Build config from environment variables.
    ///
    /// `EMAIL_USERNAME` and `EMAIL_APP_PASSWORD` are required; the rest
    /// default to a Gmail IMAP setup and a 30-second poll.
    pub fn from_env() -> Result<Self, ConfigError> {
        let username = std::env::var("EMAIL_USERNAME")
            .map_err(|_| ConfigError::MissingEnvVar("EMAIL_USERNAME".into()))?;
        let app_password = std::env::var("EMAIL_APP_PASSWORD")
            .map_err(|_| ConfigError::MissingEnvVar("EMAIL_APP_PASSWORD".into()))?;

        Ok(Self {
            imap_host: env_or("EMAIL_IMAP_HOST", "imap.gmail.com"),
            imap_port: env_parse_or("EMAIL_IMAP_PORT", 993),
            username,
            app_password: SecretString::from(app_password),
            poll_interval_secs: env_parse_or("MAIL_POLL_INTERVAL_SECS", 30),
        })
    }
}

// ── Sibling service endpoints ───────────────────────────────────────

/// Base URLs of the three sibling REST services.
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub user_validator_url: String,
    pub mail_service_url: String,
    pub fulfillment_api_url: String,
}

impl ServiceEndpoints {
    pub fn from_env() -> Self {
        Self {
            user_validator_url: env_or("FASTAPI_BASE_URL", "http://localhost:8000"),
            mail_service_url: env_or("MAIL_SERVICE_URL", "http://localhost:8001"),
            fulfillment_api_url: env_or("FULFILLMENT_API_URL", "http://localhost:8002"),
        }
    }
}

// ── LLM provider ────────────────────────────────────────────────────

/// Configuration for the LLM provider (OpenAI-compatible API).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: SecretString,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("LLM_API_KEY".into()))?;

        Ok(Self {
            api_base: env_or("LLM_API_BASE", "https://api.openai.com/v1"),
            api_key: SecretString::from(api_key),
            model: env_or("LLM_MODEL", "gpt-4o-mini"),
            temperature: env_parse_or("LLM_TEMPERATURE", 0.3),
            max_tokens: env_parse_or("LLM_MAX_TOKENS", 1500),
        })
    }
}

// ── Storage ─────────────────────────────────────────────────────────

/// Filesystem and database locations.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub attachments_dir: PathBuf,
    pub prompts_dir: PathBuf,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: PathBuf::from(env_or("CLAIMS_DB_PATH", "./data/claims.db")),
            attachments_dir: PathBuf::from(env_or("LOCAL_ATTACHMENTS_FOLDER", "attachments")),
            prompts_dir: PathBuf::from(env_or("CLAIMS_PROMPTS_DIR", "prompts")),
        }
    }
}

// ── In-process REST services ────────────────────────────────────────

/// Bind ports for the in-process REST services plus SMTP settings for
/// the mail service.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub user_validator_port: u16,
    pub mail_service_port: u16,
    pub fulfillment_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let username = env_or("EMAIL_USERNAME", "");
        let password = env_or("EMAIL_APP_PASSWORD", "");
        Self {
            user_validator_port: env_parse_or("USER_VALIDATOR_PORT", 8000),
            mail_service_port: env_parse_or("MAIL_SERVICE_PORT", 8001),
            fulfillment_port: env_parse_or("FULFILLMENT_PORT", 8002),
            smtp_host: env_or("EMAIL_SMTP_HOST", "smtp.gmail.com"),
            smtp_port: env_parse_or("EMAIL_SMTP_PORT", 587),
            smtp_username: username,
            smtp_password: password,
        }
    }
}
