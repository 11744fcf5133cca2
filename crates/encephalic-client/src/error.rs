use thiserror::Error;

/// Failure taxonomy for the analysis service.
///
/// `NotReady` is the distinguished "still warming up" signal (HTTP 503) that
/// the retry layer absorbs; everything else is terminal for a single request.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("service is still warming up")]
    NotReady,
    #[error("request timed out")]
    Timeout,
    #[error("transport failure: {message}")]
    Transport { status: Option<u16>, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_not_ready(&self) -> bool {
        matches!(self, ClientError::NotReady)
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        ClientError::Transport {
            status: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Transport {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}
