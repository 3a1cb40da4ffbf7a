//! Boundary to external providers (mail, SMS, transcription APIs).
//!
//! A provider performs one call and reports the outcome. It never retries:
//! retries are decided by the supervisor from the fact log.

use crate::core::{CorrelationId, TaskType};
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Error reported by a provider call.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProviderError {
    /// The provider received the request and refused it.
    #[error("provider rejected request: {0}")]
    Rejected(String),

    /// The request never got a usable answer (network, 5xx, decode).
    #[error("provider transport failure: {0}")]
    Transport(String),
}

/// One outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub task_type: TaskType,
    /// Output of the before-handler.
    pub payload: Map<String, Value>,
    /// Present for two-stage operations; the provider must hand it to the
    /// external system so the eventual callback can be routed back.
    pub correlation_id: Option<CorrelationId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    pub payload: Map<String, Value>,
}

impl ProviderResponse {
    pub fn new(payload: Map<String, Value>) -> Self {
        Self { payload }
    }
}

/// A client for one external provider.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn call(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}
