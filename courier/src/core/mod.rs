//! Core types shared by every layer of the courier engine.
//!
//! # Domain Model
//! - [`TaskType`], [`TaskPayload`]: what a unit of work is and the stable payload wire shape
//! - [`Fact`], [`FactKind`], [`ProcessKey`]: immutable records of what happened to a process
//! - [`FactSet`]: pure read functions deriving process state from facts
//! - [`HandlerResult`]: the envelope every business function returns
//! - [`CorrelationId`]: routes two-stage callbacks back to their attempt
//!
//! # Serialization
//! Payloads and envelopes are JSON; [`serialize_value`] and
//! [`deserialize_value`] are the storage codecs.

mod correlation;
mod envelope;
mod error;
mod fact;
mod serialization;
mod task;

pub use correlation::CorrelationId;
pub use envelope::{HandlerResult, HandlerStatus};
pub use error::{CoreError, Result};
pub use fact::{Fact, FactKind, FactSet, NewFact, ProcessKey};
pub use serialization::{deserialize_value, int_field, serialize_value, to_object};
pub use task::{TaskPayload, TaskType};
