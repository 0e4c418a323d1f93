//! Narrow boundary to the generative chat service.
//!
//! An [`Oracle`] opens conversations; each [`OracleSession`] remembers every
//! turn sent through it since it was opened. Nothing else about the
//! service's memory is assumed by callers.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("request rejected: {0}")]
    Request(String),
    #[error("rate limited")]
    RateLimited,
}

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Opens a conversation conditioned on `preamble`, with no prior history.
    async fn open_session(&self, preamble: &str) -> Result<Box<dyn OracleSession>, OracleError>;
}

#[async_trait]
pub trait OracleSession: Send {
    /// Sends one user turn and returns the reply text.
    async fn turn(&mut self, text: &str) -> Result<String, OracleError>;
}
