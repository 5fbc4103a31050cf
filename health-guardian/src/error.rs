use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GuardianError>;

/// Errors surfaced to the user by the document, chat and care-plan flows.
///
/// Every variant carries the message that is shown to the user. Causes coming
/// from the model backend are logged where they happen and never leak into
/// these messages.
#[derive(Debug, Error)]
pub enum GuardianError {
    #[error("{0}")]
    MissingInput(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Busy(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Analysis(String),

    #[error("{0}")]
    CarePlan(String),

    #[error("{0}")]
    Chat(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Failures of the remote generative model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("model returned no text content")]
    EmptyResponse,

    #[error("chat provider error: {0}")]
    Chat(String),
}
