use thiserror::Error;

/// Core error type for the courier orchestration engine.
///
/// Covers decoding of the wire shapes shared by every layer: task payloads,
/// handler result envelopes, fact kinds and callback correlation ids.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Serialization failed when encoding a value to JSON.
    #[error("serialization failed")]
    Serialization(#[source] serde_json::Error),

    /// Deserialization failed when decoding JSON to a value.
    #[error("deserialization failed")]
    Deserialization(#[source] serde_json::Error),

    /// A handler result envelope violated its invariants.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// A callback correlation id could not be parsed.
    #[error("invalid correlation id: {0}")]
    InvalidCorrelationId(String),

    /// An unknown fact kind was read from storage.
    #[error("unknown fact kind: {0}")]
    UnknownFactKind(String),

    /// An unknown task status was read from storage.
    #[error("unknown task status: {0}")]
    UnknownTaskStatus(String),

    /// A payload did not carry a required integer field.
    #[error("payload field `{0}` is missing or not an integer")]
    MissingField(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
