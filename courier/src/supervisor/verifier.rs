//! Verification of raw two-stage callback responses.
//!
//! Callbacks are persisted before anyone looks at them. The supervisor later
//! loads every delivery of an unsettled attempt and asks a
//! [`ResponseVerifier`] whether it reports success.

use crate::core::CoreError;
use crate::storage::CallbackDelivery;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const ENCODING_UTF8: &str = "utf8";
const ENCODING_HEX: &str = "hex";

/// A callback body as it arrived, with its signature header if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedResponse {
    pub body: Vec<u8>,
    pub signature: Option<String>,
}

impl ReceivedResponse {
    pub fn new(body: impl Into<Vec<u8>>, signature: Option<String>) -> Self {
        Self {
            body: body.into(),
            signature,
        }
    }

    /// Fact payload form. UTF-8 bodies are stored as text, anything else as hex.
    pub fn to_fact_payload(&self) -> Value {
        let (body, encoding) = match std::str::from_utf8(&self.body) {
            Ok(text) => (text.to_string(), ENCODING_UTF8),
            Err(_) => (hex::encode(&self.body), ENCODING_HEX),
        };
        json!({
            "body": body,
            "encoding": encoding,
            "signature": self.signature,
        })
    }

    pub fn from_fact_payload(payload: &Value) -> Result<Self, CoreError> {
        let invalid = |reason: &str| CoreError::InvalidEnvelope(format!("response fact: {reason}"));

        let body = payload
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing body"))?;
        let body = match payload.get("encoding").and_then(Value::as_str) {
            Some(ENCODING_HEX) => hex::decode(body).map_err(|e| invalid(&e.to_string()))?,
            Some(ENCODING_UTF8) | None => body.as_bytes().to_vec(),
            Some(other) => return Err(invalid(&format!("unknown encoding {other}"))),
        };
        let signature = payload
            .get("signature")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self { body, signature })
    }
}

impl From<CallbackDelivery> for ReceivedResponse {
    fn from(delivery: CallbackDelivery) -> Self {
        Self {
            body: delivery.body,
            signature: delivery.signature,
        }
    }
}

/// What a verified response says about the attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Succeeded,
    Failed(String),
}

pub trait ResponseVerifier: Send + Sync {
    fn verify(&self, response: &ReceivedResponse) -> Verification;
}

/// Reads the business status from a JSON body: `"status": "failed"` is a
/// failure, any other parseable body is a success.
pub fn body_status(body: &[u8]) -> Verification {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return Verification::Failed("response body is not JSON".into());
    };

    match value.get("status").and_then(Value::as_str) {
        Some("failed") => Verification::Failed(
            value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("provider reported failure")
                .to_string(),
        ),
        _ => Verification::Succeeded,
    }
}

/// Accepts unsigned responses and only checks the body status.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusVerifier;

impl ResponseVerifier for StatusVerifier {
    fn verify(&self, response: &ReceivedResponse) -> Verification {
        body_status(&response.body)
    }
}

/// HMAC-SHA256 over the raw body, hex-encoded in the signature header.
#[derive(Clone)]
pub struct HmacVerifier {
    mac: HmacSha256,
}

impl HmacVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret.as_ref())?,
        })
    }

    /// Hex signature for `body`, as a provider would send it.
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for HmacVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacVerifier").finish_non_exhaustive()
    }
}

impl ResponseVerifier for HmacVerifier {
    fn verify(&self, response: &ReceivedResponse) -> Verification {
        let Some(signature) = response.signature.as_deref() else {
            return Verification::Failed("missing signature".into());
        };
        let Ok(signature) = hex::decode(signature.trim()) else {
            return Verification::Failed("malformed signature".into());
        };

        let mut mac = self.mac.clone();
        mac.update(&response.body);
        if mac.verify_slice(&signature).is_err() {
            return Verification::Failed("signature mismatch".into());
        }

        body_status(&response.body)
    }
}
