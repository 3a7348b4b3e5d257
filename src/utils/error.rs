use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("No profile found for user '{user_id}'")]
    ProfileNotFound { user_id: String },

    #[error("Portal account is not connected")]
    NotConnected,

    #[error("Stored portal credentials are unreadable (field: {field})")]
    CredentialsCorrupted { field: &'static str },

    #[error("Portal rejected the supplied credentials")]
    AuthenticationFailed,

    #[error("Portal request failed: {cause}")]
    TransientFailure { cause: String },

    #[error("Cipher token could not be decrypted")]
    DecryptionFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Invalid portal URL: {reason}")]
    InvalidPortalUrl { reason: String },

    #[error("Browser error: {message}")]
    Browser { message: String },

    #[error("Timed out while {step}")]
    Timeout { step: String },

    #[error("Unexpected page markup: {message}")]
    Markup { message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Caller-facing classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    NotFound,
    NotConnected,
    CredentialsCorrupted,
    AuthenticationFailed,
    TransientFailure,
    Configuration,
}

/// The only error shape that leaves the orchestrator. Carries no secrets and no page content.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub status: u16,
    pub message: String,
    pub retryable: bool,
}

impl PortalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PortalError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            PortalError::ProfileNotFound { .. } => ErrorKind::NotFound,
            PortalError::NotConnected => ErrorKind::NotConnected,
            PortalError::CredentialsCorrupted { .. } | PortalError::DecryptionFailed => {
                ErrorKind::CredentialsCorrupted
            }
            PortalError::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            PortalError::TransientFailure { .. }
            | PortalError::Browser { .. }
            | PortalError::Timeout { .. }
            | PortalError::Markup { .. }
            | PortalError::Http(_) => ErrorKind::TransientFailure,
            PortalError::EncryptionFailed
            | PortalError::InvalidPortalUrl { .. }
            | PortalError::Io(_)
            | PortalError::Serialization(_)
            | PortalError::ConfigError { .. }
            | PortalError::InvalidConfigValue { .. } => ErrorKind::Configuration,
        }
    }

    /// HTTP-style status for the caller.
    pub fn status(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidRequest => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::NotConnected
            | ErrorKind::CredentialsCorrupted
            | ErrorKind::AuthenticationFailed => 401,
            ErrorKind::TransientFailure => 502,
            ErrorKind::Configuration => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientFailure
    }

    /// Fixed message per kind; never interpolates causes, credentials or markup.
    pub fn user_friendly_message(&self) -> String {
        match self.kind() {
            ErrorKind::InvalidRequest => match self {
                PortalError::InvalidRequest { message } => message.clone(),
                _ => "Invalid request".to_string(),
            },
            ErrorKind::NotFound => "Profile not found".to_string(),
            ErrorKind::NotConnected => "No Portal account is connected".to_string(),
            ErrorKind::CredentialsCorrupted => {
                "Stored Portal credentials could not be read".to_string()
            }
            ErrorKind::AuthenticationFailed => "Portal login failed".to_string(),
            ErrorKind::TransientFailure => "The Portal could not be reached".to_string(),
            ErrorKind::Configuration => "Service is misconfigured".to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.kind() {
            ErrorKind::InvalidRequest => "Request either 'averages' or 'transcript'",
            ErrorKind::NotFound => "Check the user id",
            ErrorKind::NotConnected
            | ErrorKind::CredentialsCorrupted
            | ErrorKind::AuthenticationFailed => "Reconnect your Portal account",
            ErrorKind::TransientFailure => "Try again in a few minutes",
            ErrorKind::Configuration => "Check the service configuration and cipher key",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            kind: self.kind(),
            status: self.status(),
            message: self.user_friendly_message(),
            retryable: self.is_retryable(),
        }
    }
}

impl From<toml::de::Error> for PortalError {
    fn from(e: toml::de::Error) -> Self {
        PortalError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        }
    }
}

pub type Result<T> = std::result::Result<T, PortalError>;
