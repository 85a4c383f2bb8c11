//! Notification error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Webhook rejected alert: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

pub type NotifyResult<T> = Result<T, NotifyError>;
