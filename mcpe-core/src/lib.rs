//! Core types for the MCPE event hub
//!
//! This crate holds everything the hub and its clients share:
//!
//! - **types / codec**: JSON-RPC 2.0 messages and the pure encode/decode layer
//! - **event**: the published [`Event`] with its metadata and priorities
//! - **model**: filters, delivery preferences, handler descriptors and the
//!   [`model::Subscription`] record
//! - **protocol**: method names, the protocol version and typed operation
//!   payloads
//! - **error**: the crate error enum and the wire error object with the
//!   hub's stable numeric codes
//! - **observability**: tracing + OpenTelemetry bootstrap
//!
//! No I/O happens in this crate; the server and client crates own the
//! transports.

pub mod codec;
pub mod error;
pub mod event;
pub mod model;
pub mod observability;
pub mod protocol;
pub mod types;

pub use error::{codes, Error, Result, RpcErrorObject};
pub use event::{Event, EventMetadata, Priority};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use protocol::PROTOCOL_VERSION;
pub use types::{RequestId, RpcMessage, RpcNotification, RpcRequest, RpcResponse};
