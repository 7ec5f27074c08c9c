//! Envelope wire format, message registry, and dispatch rules for the
//! WebSocket messaging fabric (spec components A, B, C).
//!
//! This crate has no I/O: it is the framed-wire-format + registry +
//! dispatch-decision library that `services/server` wires up to a real
//! axum WebSocket, a real channel layer, and a real job queue.

pub mod app_state;
pub mod catalog;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod layer;
pub mod message;
pub mod registry;
pub mod signals;

pub use envelope::{Envelope, EnvelopeKind, EnvelopeState};
pub use error::EnvelopeError;
pub use handler::{AsyncRunnable, DeferredJob, JobContext, SessionHandle};
pub use layer::ChannelLayer;
pub use message::{Message, MessageHandlerKind, MessageMeta};
pub use registry::{Catalog, CatalogBuilder, MessageDescriptor};
