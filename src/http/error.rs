use thiserror::Error;

/// Errors returned by the third-party HTTP services (Neynar, Alchemy)
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{service} returned HTTP {status}: {message}")]
    Status {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Failed to decode {service} response: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },

    #[error("Missing configuration: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Whether the failure is transient and the call may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err.status().is_some_and(|s| s.is_server_error())
            }
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Unavailable(_) => true,
            ProviderError::Decode { .. }
            | ProviderError::Config(_)
            | ProviderError::InvalidInput(_)
            | ProviderError::Signing(_) => false,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            ProviderError::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
