use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid dashboard URL: {url}")]
    InvalidDashboardUrl { url: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn invalid_dashboard_url(url: &str) -> Self {
        Self::InvalidDashboardUrl {
            url: url.to_string(),
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AppError::InvalidDashboardUrl { .. }
                | AppError::Validation { .. }
                | AppError::MissingCredentials(_)
                | AppError::Json(_)
        )
    }
}

/// Failure raised by the HTTP layer before any status was received
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection refused, DNS, TLS, timeouts or a broken body
    #[error("{0}")]
    Connection(String),

    /// The request itself could not be built (bad URL, bad header value)
    #[error("{0}")]
    Request(String),
}

impl TransportError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(message.into())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_builder() {
            Self::Request(error.to_string())
        } else {
            Self::Connection(error.to_string())
        }
    }
}
