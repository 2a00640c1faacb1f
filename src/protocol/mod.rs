//! Janus wire message types.
//!
//! This module defines the message format exchanged with the gateway.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`Request`] | Client → Gateway | Verb + transaction + scoping |
//! | [`Frame`] | Gateway → Client | Ack, response, or event |
//! | [`HandleEvent`] | Gateway → Client | Classified handle event |
//!
//! # Routing Fields
//!
//! - `transaction` - correlates acks and responses to requests
//! - `session_id` - scopes a frame to a session
//! - `sender` / `handle_id` - scopes a frame to a plugin handle
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Handle event classification |
//! | `request` | Outgoing requests and options |
//! | `response` | Inbound frames and response envelopes |

// ============================================================================
// Submodules
// ============================================================================

/// Handle event classification.
pub mod event;

/// Outgoing request types.
pub mod request;

/// Inbound frame and response types.
pub mod response;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{HandleEvent, HandleEventKind};
pub use request::{Jsep, JsepType, Request, RequestOptions};
pub use response::{ClientResponse, Frame, FrameKind, PluginResponse};
