// ABOUTME: Error types for parley-slack.
// ABOUTME: Defines SlackError covering API, HTTP, signature, and registry failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlackError {
    #[error("Slack API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid request signature: {0}")]
    Signature(&'static str),

    #[error("registry error: {0}")]
    Registry(anyhow::Error),
}

// anyhow::Error is not a std Error, so thiserror's #[from] cannot derive this.
impl From<anyhow::Error> for SlackError {
    fn from(err: anyhow::Error) -> Self {
        SlackError::Registry(err)
    }
}

pub type Result<T> = std::result::Result<T, SlackError>;
