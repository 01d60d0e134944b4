//! # live-collab — Live channel transport for sandbox editing sessions
//!
//! Connects the per-module OT state machines of `live-core` to the room's
//! live channel.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  OutboundFrame   ┌───────────┐   WebSocket   ┌──────────┐
//! │ LiveTransport│ ───────────────► │ WsChannel │ ◄───────────► │ live room│
//! │              │ ◄─────────────── │           │               │          │
//! └──────┬───────┘  InboundFrame    └───────────┘               └──────────┘
//!        │
//!        ▼
//! ┌────────────────┐
//! │ SessionRegistry│ ── one ClientStateMachine per module
//! └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — Tagged wire frames (bincode-encoded) and transport errors
//! - [`channel`] — Channel seam and the tokio-tungstenite implementation
//! - [`transport`] — Correlation ids, pending table, echo demultiplexing
//! - [`config`] — Connection settings

pub mod protocol;
pub mod channel;
pub mod transport;
pub mod config;

// Re-exports for convenience
pub use protocol::{
    ClientEvent, CorrelationId, InboundFrame, ModuleSnapshot, OutboundFrame, ReplyStatus,
    ServerEvent, TransportError,
};
pub use channel::{Channel, WsChannel};
pub use transport::{LiveEvent, LiveTransport};
pub use config::LiveConfig;
