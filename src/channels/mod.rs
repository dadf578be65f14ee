pub mod rest;
pub mod telegram;

use reqwest::StatusCode;
use teloxide::RequestError;
use thiserror::Error;

pub use rest::RestChannel;
pub use telegram::TelegramChannel;

/// Why a single destination failed to take a message
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Invalid headers JSON: {0}")]
    InvalidHeaders(String),

    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid chat id: {0}")]
    InvalidChatId(String),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Telegram request failed: {0}")]
    Telegram(RequestError),

    #[error("{service} error{}: {detail}", status_suffix(.status))]
    Rejected {
        service: &'static str,
        /// Absent when the provider answered through its own error envelope
        status: Option<StatusCode>,
        detail: String,
    },
}

fn status_suffix(status: &Option<StatusCode>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl From<RequestError> for ChannelError {
    fn from(err: RequestError) -> Self {
        match err {
            // Keep the provider's description, e.g. "Bad Request: chat not found"
            RequestError::Api(api) => ChannelError::Rejected {
                service: "Telegram API",
                status: None,
                detail: api.to_string(),
            },
            other => ChannelError::Telegram(other),
        }
    }
}

impl ChannelError {
    /// True when the request never left the process
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ChannelError::InvalidHeaders(_)
                | ChannelError::InvalidHeader { .. }
                | ChannelError::InvalidMethod(_)
                | ChannelError::InvalidChatId(_)
        )
    }
}
