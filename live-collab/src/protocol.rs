//! Wire schema for the live channel.
//!
//! Every frame is a tagged variant with a fixed payload per kind, encoded
//! with bincode:
//! ```text
//!  client ──► server   OutboundFrame::{Join, Leave, Push { correlation_id, ClientEvent }}
//!  server ──► client   InboundFrame::{JoinReply, Reply, Broadcast, LeaveReply, Error}
//! ```
//!
//! Inbound frames are validated after decoding; a frame that decodes but
//! carries an empty identifier fails with [`TransportError::MalformedMessage`].

use live_core::{Operation, SyncError};
use serde::{Deserialize, Serialize};

/// Identifier tagged onto every pushed event: adapter id followed by the
/// send index.
pub type CorrelationId = String;

/// Events a client pushes to the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Local edit, authored against `revision`
    Operation {
        module_id: String,
        operation: Operation,
        revision: u64,
    },
    ModuleSaved { module_id: String },
    DirectoryUpdated { directory_id: String },
    /// The module this user is looking at
    UserCurrentModule { module_id: String },
    /// Ask for the authoritative contents of a module (desync recovery)
    ModuleStateRequest { module_id: String },
}

impl ClientEvent {
    /// Module the event concerns, if any.
    pub fn module_id(&self) -> Option<&str> {
        match self {
            ClientEvent::Operation { module_id, .. }
            | ClientEvent::ModuleSaved { module_id }
            | ClientEvent::UserCurrentModule { module_id }
            | ClientEvent::ModuleStateRequest { module_id } => Some(module_id),
            ClientEvent::DirectoryUpdated { .. } => None,
        }
    }

    /// Channel event name.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Operation { .. } => "operation",
            ClientEvent::ModuleSaved { .. } => "module:saved",
            ClientEvent::DirectoryUpdated { .. } => "directory:updated",
            ClientEvent::UserCurrentModule { .. } => "user:current-module",
            ClientEvent::ModuleStateRequest { .. } => "live:module_state",
        }
    }
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundFrame {
    Join { topic: String },
    Leave,
    Push {
        correlation_id: CorrelationId,
        event: ClientEvent,
    },
}

/// Contents of one module at a revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSnapshot {
    pub module_id: String,
    pub code: String,
    pub revision: u64,
}

/// Outcome of a push or join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyStatus {
    Ok,
    Error(String),
}

/// Events the room broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// Operation folded into the module at `revision` (the revision it was
    /// applied on top of)
    Operation {
        module_id: String,
        operation: Operation,
        revision: u64,
    },
    /// Authoritative snapshot of a module
    ModuleState {
        module_id: String,
        code: String,
        revision: u64,
    },
    ModuleSaved { module_id: String },
    DirectoryUpdated { directory_id: String },
    UserCurrentModule { user_id: String, module_id: String },
    UserEntered { user_id: String },
    UserLeft { user_id: String },
}

impl ServerEvent {
    fn module_id(&self) -> Option<&str> {
        match self {
            ServerEvent::Operation { module_id, .. }
            | ServerEvent::ModuleState { module_id, .. }
            | ServerEvent::ModuleSaved { module_id }
            | ServerEvent::UserCurrentModule { module_id, .. } => Some(module_id),
            _ => None,
        }
    }
}

/// Frames received from the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboundFrame {
    JoinReply {
        status: ReplyStatus,
        modules: Vec<ModuleSnapshot>,
    },
    /// Answer to one push
    Reply {
        correlation_id: CorrelationId,
        status: ReplyStatus,
    },
    /// Room event; `correlation_id` is the sender's tag when the event
    /// originated from a push
    Broadcast {
        correlation_id: Option<CorrelationId>,
        event: ServerEvent,
    },
    LeaveReply,
    /// Channel error; a missing payload means the connection was lost
    Error { payload: Option<String> },
}

impl OutboundFrame {
    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        encode(self)
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        decode(bytes)
    }
}

impl InboundFrame {
    /// The synthetic frame delivered when the socket goes away.
    pub fn connection_loss() -> Self {
        InboundFrame::Error { payload: None }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        encode(self)
    }

    /// Deserialize and validate.
    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        let frame: Self = decode(bytes)?;
        frame.validate()?;
        Ok(frame)
    }

    /// Reject frames whose identifiers are empty.
    pub fn validate(&self) -> Result<(), TransportError> {
        match self {
            InboundFrame::JoinReply { modules, .. } => {
                if modules.iter().any(|m| m.module_id.is_empty()) {
                    return Err(malformed("join reply with empty module id"));
                }
            }
            InboundFrame::Reply { correlation_id, .. } => {
                if correlation_id.is_empty() {
                    return Err(malformed("reply without correlation id"));
                }
            }
            InboundFrame::Broadcast {
                correlation_id,
                event,
            } => {
                if correlation_id.as_deref() == Some("") {
                    return Err(malformed("broadcast with empty correlation id"));
                }
                if event.module_id() == Some("") {
                    return Err(malformed("broadcast with empty module id"));
                }
            }
            InboundFrame::LeaveReply | InboundFrame::Error { .. } => {}
        }
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, TransportError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| TransportError::Encode(e.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, TransportError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| TransportError::MalformedMessage(e.to_string()))?;
    Ok(value)
}

fn malformed(reason: &str) -> TransportError {
    TransportError::MalformedMessage(reason.to_string())
}

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Send attempted with no active channel
    ChannelUnavailable,
    /// The socket went away
    ConnectionLoss,
    /// The room answered a push with an error
    RemoteRejection {
        correlation_id: CorrelationId,
        reason: String,
    },
    MalformedMessage(String),
    Encode(String),
    Connect(String),
    /// A document's state machine refused the operation
    Sync(SyncError),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChannelUnavailable => write!(f, "No active channel"),
            Self::ConnectionLoss => write!(f, "Connection lost"),
            Self::RemoteRejection {
                correlation_id,
                reason,
            } => write!(f, "Message {correlation_id} rejected: {reason}"),
            Self::MalformedMessage(e) => write!(f, "Malformed message: {e}"),
            Self::Encode(e) => write!(f, "Encode error: {e}"),
            Self::Connect(e) => write!(f, "Connect error: {e}"),
            Self::Sync(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<SyncError> for TransportError {
    fn from(e: SyncError) -> Self {
        TransportError::Sync(e)
    }
}
