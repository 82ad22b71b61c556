//! AI provider interface
//!
//! One `execute`/`generate_code` surface, N vendor adapters behind it. All
//! wire-format detail stays on the adapter side; the engine and driver only
//! see provider-agnostic requests and responses. Adapters classify every
//! failure as retryable or fatal; that tag is the retry wrapper's whole
//! decision input.

use async_trait::async_trait;
use thiserror::Error;

use super::protocol::AiRequest;
use crate::types::AiResponse;

/// A provider failure, tagged with whether a retry can help
#[derive(Debug, Clone, Error, PartialEq)]
#[error("provider error{}: {message}", if *.retryable { " (retryable)" } else { "" })]
pub struct ProviderError {
    pub message: String,
    /// Rate limits and 5xx-class failures are retryable; auth errors,
    /// malformed requests, and content rejections are not
    pub retryable: bool,
}

impl ProviderError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// A vendor AI-API adapter
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Perform one request/response round
    async fn execute(&self, request: &AiRequest) -> Result<AiResponse, ProviderError>;

    /// Code-generation mode: the raw text is parsed as a language fragment
    /// by the engine, so adapters should return it unwrapped
    async fn generate_code(&self, request: &AiRequest) -> Result<String, ProviderError>;
}
