//! Inbound callbacks for two-stage processes.
//!
//! Every delivery is stored verbatim in the delivery log, then the first one
//! per attempt is marked by a `response_received(n)` fact. Verification
//! happens later, inside the supervisor, so a crash between receipt and
//! verification loses nothing.

use crate::core::{CorrelationId, FactKind, NewFact};
use crate::storage::{CallbackDelivery, OperationalError, Result, Store};
use crate::supervisor::ReceivedResponse;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one callback delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackReceipt {
    /// First delivery for this attempt; the response is now a fact.
    Recorded(CorrelationId),
    /// The attempt already had a response. This delivery is stored as well
    /// and is verified alongside the earlier ones.
    Duplicate(CorrelationId),
    /// The correlation id could not be parsed. Logged as an operational error.
    Unroutable,
}

/// Receives raw provider callbacks and records them in the store.
pub struct CallbackInbox<S: Store> {
    store: Arc<S>,
}

impl<S: Store> CallbackInbox<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn receive(
        &self,
        correlation: &str,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<CallbackReceipt> {
        let Ok(correlation_id) = correlation.parse::<CorrelationId>() else {
            warn!("Unroutable callback for correlation id {:?}", correlation);
            let entry = OperationalError::new("callback", "unroutable correlation id").with_detail(
                json!({
                    "correlation_id": correlation,
                    "body": String::from_utf8_lossy(body),
                }),
            );
            self.store.record_error(entry).await?;
            return Ok(CallbackReceipt::Unroutable);
        };

        let signature = signature.map(str::to_string);
        self.store
            .record_delivery(CallbackDelivery::new(
                correlation_id.key.clone(),
                correlation_id.attempt,
                body,
                signature.clone(),
            ))
            .await?;

        let response = ReceivedResponse::new(body, signature);
        let fact = NewFact::new(correlation_id.key.clone(), FactKind::ResponseReceived)
            .attempt(correlation_id.attempt)
            .payload(response.to_fact_payload());

        if self.store.append_fact(fact).await? {
            info!("Recorded callback for {}", correlation_id);
            Ok(CallbackReceipt::Recorded(correlation_id))
        } else {
            debug!("Duplicate callback for {}", correlation_id);
            Ok(CallbackReceipt::Duplicate(correlation_id))
        }
    }
}

#[cfg(feature = "http")]
mod http {
    use super::CallbackInbox;
    use crate::storage::Store;
    use axum::{
        body::Bytes,
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        routing::post,
        Router,
    };
    use std::sync::Arc;
    use tracing::error;

    /// Header carrying the provider's body signature.
    pub const SIGNATURE_HEADER: &str = "x-signature";

    /// `POST /callbacks/{correlation_id}`. Every delivery that reached the
    /// store answers 202, including duplicates and unroutable ids, so
    /// providers stop redelivering.
    pub fn router<S: Store>(inbox: Arc<CallbackInbox<S>>) -> Router {
        Router::new()
            .route("/callbacks/{correlation_id}", post(receive_callback::<S>))
            .with_state(inbox)
    }

    async fn receive_callback<S: Store>(
        State(inbox): State<Arc<CallbackInbox<S>>>,
        Path(correlation_id): Path<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());

        match inbox.receive(&correlation_id, &body, signature).await {
            Ok(_) => StatusCode::ACCEPTED,
            Err(e) => {
                error!("Failed to record callback {}: {}", correlation_id, e);
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

#[cfg(feature = "http")]
pub use http::{router, SIGNATURE_HEADER};
