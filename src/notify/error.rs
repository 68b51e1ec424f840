// Channel resolution and delivery errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("channel {0} not found")]
    ChannelNotFound(i64),
    #[error("channel {0} is disabled")]
    ChannelDisabled(i64),
    #[error("unknown channel type: {0}")]
    UnknownChannelType(String),
    #[error("invalid channel config: {0}")]
    InvalidConfig(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("delivery failed after {attempts} attempts: HTTP {status}")]
    Status { status: u16, attempts: u32 },
    #[error("storage: {0}")]
    Storage(String),
}

impl From<anyhow::Error> for NotifyError {
    fn from(e: anyhow::Error) -> Self {
        NotifyError::Storage(format!("{:#}", e))
    }
}
