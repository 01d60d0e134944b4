//! # live-core — OT document model for live sandbox sessions
//!
//! Keeps a locally edited text buffer convergent with remote collaborators
//! over a channel that acknowledges late and broadcasts in server order.
//!
//! ## Architecture
//!
//! ```text
//!  editor (before, after)
//!        │
//!        ▼
//!  diff::text_operation ──► Operation
//!                              │
//!                              ▼
//!  SessionRegistry ──► ClientStateMachine ──► Outgoing (to transport)
//!   (module id)          │        ▲
//!                        │        └── remote op / ack (from transport)
//!                        ▼
//!                   RevisionLog
//! ```
//!
//! ## Modules
//!
//! - [`operation`] — Retain/insert/delete operations with transform and compose
//! - [`diff`] — Operation from two full texts
//! - [`revision`] — Bounded operation history behind the revision authority
//! - [`client`] — Synchronized / awaiting-confirm / buffering state machine
//! - [`registry`] — Module id → state machine
//! - [`authority`] — Server-side canonical document
//!
//! Every state machine is owned by a single caller and mutated serially.
//! Nothing here is `Sync`-shared or locked.

pub mod operation;
pub mod diff;
pub mod revision;
pub mod client;
pub mod registry;
pub mod authority;

// Re-exports for convenience
pub use operation::{Component, Operation, OtError};
pub use diff::text_operation;
pub use revision::{RevisionError, RevisionLog, DEFAULT_HISTORY_LIMIT};
pub use client::{ClientState, ClientStateMachine, Outgoing, SyncError};
pub use registry::SessionRegistry;
pub use authority::RevisionAuthority;
