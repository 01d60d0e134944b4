//! Per-document OT client state machine.
//!
//! ```text
//!                 local edit (send)
//!  ┌──────────────┐ ─────────────────► ┌─────────────────┐
//!  │ Synchronized │                     │ AwaitingConfirm │ ◄──┐
//!  └──────────────┘ ◄───────────────── └─────────────────┘    │
//!         ▲               ack                 │ local edit      │ ack
//!         │                                   ▼ (buffer)        │ (send buffer)
//!   remote: apply                 ┌───────────────────────────┐ │
//!                                 │ AwaitingConfirmWithBuffer │─┘
//!                                 └───────────────────────────┘
//!                                   local edit: compose into buffer
//! ```
//!
//! At most one operation is in flight per document. Edits made while it is
//! unacknowledged are composed into a single buffer and sent on the next ack.
//! Remote operations are transformed past the in-flight and buffered edits
//! before they touch the local document.
//!
//! The machine never performs I/O: transitions that require a send return an
//! [`Outgoing`] for the caller to put on the wire.
//!
//! A [`OtError::LengthMismatch`] anywhere marks the document as desynced. The
//! only way out is [`ClientStateMachine::reset`] with an authoritative
//! snapshot.
//!
//! Reference: Nichols et al. — Jupiter Collaboration System (1995)

use crate::diff::text_operation;
use crate::operation::{OtError, Operation};

/// Synchronization state of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Nothing in flight.
    Synchronized,
    /// `outstanding` was sent and is not yet acknowledged.
    AwaitingConfirm { outstanding: Operation },
    /// `outstanding` is in flight; `buffer` holds every edit made since.
    AwaitingConfirmWithBuffer {
        outstanding: Operation,
        buffer: Operation,
    },
}

impl ClientState {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientState::Synchronized => "synchronized",
            ClientState::AwaitingConfirm { .. } => "awaiting-confirm",
            ClientState::AwaitingConfirmWithBuffer { .. } => "awaiting-confirm-with-buffer",
        }
    }
}

/// An operation the caller must send, tagged with the revision it was
/// authored against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub revision: u64,
    pub operation: Operation,
}

/// Client state machine errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// An operation did not fit the local document. The document is now
    /// desynced and needs a snapshot.
    LengthMismatch { expected: usize, actual: usize },
    /// A transformed operation was structurally invalid.
    InvalidOperation(String),
    /// Acknowledgement received with nothing in flight.
    UnexpectedAck,
    /// The document is waiting for a snapshot after a desync.
    Desynced,
}

impl SyncError {
    /// True for errors that leave the document needing a snapshot.
    pub fn is_desync(&self) -> bool {
        matches!(self, SyncError::LengthMismatch { .. })
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::LengthMismatch { expected, actual } => {
                write!(f, "Desync: operation expects length {expected}, document has {actual}")
            }
            SyncError::InvalidOperation(e) => write!(f, "Invalid operation: {e}"),
            SyncError::UnexpectedAck => write!(f, "Acknowledgement with nothing outstanding"),
            SyncError::Desynced => write!(f, "Document is waiting for a snapshot"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<OtError> for SyncError {
    fn from(e: OtError) -> Self {
        match e {
            OtError::LengthMismatch { expected, actual } => {
                SyncError::LengthMismatch { expected, actual }
            }
            OtError::Malformed(e) => SyncError::InvalidOperation(e),
        }
    }
}

/// The state machine for one open document.
#[derive(Debug, Clone)]
pub struct ClientStateMachine {
    state: ClientState,
    /// Local view of the document, including unacknowledged edits.
    document: String,
    /// Count of operations folded into the canonical document.
    revision: u64,
    desynced: bool,
}

impl ClientStateMachine {
    /// Fresh machine: empty document, revision 0, synchronized.
    pub fn new() -> Self {
        Self::with_document(String::new(), 0)
    }

    /// Machine seeded with a known document at `revision`.
    pub fn with_document(document: impl Into<String>, revision: u64) -> Self {
        Self {
            state: ClientState::Synchronized,
            document: document.into(),
            revision,
            desynced: false,
        }
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// Count of operations folded into the canonical document.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    /// Operation sent but not yet acknowledged.
    pub fn outstanding(&self) -> Option<&Operation> {
        match &self.state {
            ClientState::Synchronized => None,
            ClientState::AwaitingConfirm { outstanding }
            | ClientState::AwaitingConfirmWithBuffer { outstanding, .. } => Some(outstanding),
        }
    }

    /// Local edits waiting behind the outstanding operation.
    pub fn buffer(&self) -> Option<&Operation> {
        match &self.state {
            ClientState::AwaitingConfirmWithBuffer { buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    pub fn is_desynced(&self) -> bool {
        self.desynced
    }

    /// Local edit reported as full before/after texts.
    ///
    /// Returns `Ok(None)` for edits that change nothing.
    pub fn local_edit(&mut self, before: &str, after: &str) -> Result<Option<Outgoing>, SyncError> {
        let op = text_operation(before, after);
        if op.is_noop() {
            return Ok(None);
        }
        self.apply_client(op)
    }

    /// Apply a locally authored operation.
    ///
    /// Returns the operation to send when the machine was synchronized.
    pub fn apply_client(&mut self, op: Operation) -> Result<Option<Outgoing>, SyncError> {
        if self.desynced {
            return Err(SyncError::Desynced);
        }

        let document = op.apply(&self.document);
        let document = self.check(document)?;

        let next = match &self.state {
            ClientState::Synchronized => Ok(ClientState::AwaitingConfirm {
                outstanding: op.clone(),
            }),
            ClientState::AwaitingConfirm { outstanding } => {
                Ok(ClientState::AwaitingConfirmWithBuffer {
                    outstanding: outstanding.clone(),
                    buffer: op.clone(),
                })
            }
            ClientState::AwaitingConfirmWithBuffer { outstanding, buffer } => {
                buffer.compose(&op).map(|buffer| ClientState::AwaitingConfirmWithBuffer {
                    outstanding: outstanding.clone(),
                    buffer,
                })
            }
        };
        let next = self.check(next)?;

        let outgoing = match self.state {
            ClientState::Synchronized => Some(Outgoing {
                revision: self.revision(),
                operation: op,
            }),
            _ => None,
        };

        log::debug!("local edit: {} -> {}", self.state.name(), next.name());
        self.document = document;
        self.state = next;
        Ok(outgoing)
    }

    /// Apply an operation broadcast by the server on behalf of another client.
    ///
    /// Returns the operation transformed for the local document, which the
    /// editor applies to its own buffer.
    pub fn apply_server(&mut self, op: Operation) -> Result<Operation, SyncError> {
        if self.desynced {
            return Err(SyncError::Desynced);
        }

        let transformed = transform_state(&self.state, &op);
        let (next, local) = self.check(transformed)?;
        let document = local.apply(&self.document);
        let document = self.check(document)?;

        self.document = document;
        self.state = next;
        self.revision += 1;
        log::debug!(
            "remote operation applied at revision {} ({})",
            self.revision(),
            self.state.name()
        );
        Ok(local)
    }

    /// The server confirmed the outstanding operation.
    ///
    /// Returns the buffered operation when one is now due to be sent.
    pub fn server_ack(&mut self) -> Result<Option<Outgoing>, SyncError> {
        if self.desynced {
            return Err(SyncError::Desynced);
        }

        match std::mem::replace(&mut self.state, ClientState::Synchronized) {
            ClientState::Synchronized => Err(SyncError::UnexpectedAck),
            ClientState::AwaitingConfirm { .. } => {
                self.revision += 1;
                log::debug!("ack at revision {}: synchronized", self.revision());
                Ok(None)
            }
            ClientState::AwaitingConfirmWithBuffer { buffer, .. } => {
                self.revision += 1;
                self.state = ClientState::AwaitingConfirm {
                    outstanding: buffer.clone(),
                };
                log::debug!("ack at revision {}: sending buffer", self.revision());
                Ok(Some(Outgoing {
                    revision: self.revision(),
                    operation: buffer,
                }))
            }
        }
    }

    /// Replace everything with an authoritative snapshot.
    ///
    /// In-flight and buffered edits are discarded.
    pub fn reset(&mut self, document: impl Into<String>, revision: u64) {
        if self.outstanding().is_some() {
            log::warn!(
                "reset to revision {revision} drops unacknowledged edits ({})",
                self.state.name()
            );
        }
        self.state = ClientState::Synchronized;
        self.document = document.into();
        self.revision = revision;
        self.desynced = false;
    }

    /// Flag the document as needing a snapshot, e.g. after the caller failed
    /// to send an operation this machine already committed.
    pub fn mark_desynced(&mut self) {
        if !self.desynced {
            log::warn!(
                "marked desynced at revision {} ({})",
                self.revision,
                self.state.name()
            );
        }
        self.desynced = true;
    }

    /// Lift an operation result, flagging the document on length mismatch.
    fn check<T>(&mut self, result: Result<T, OtError>) -> Result<T, SyncError> {
        result.map_err(|e| {
            let err = SyncError::from(e);
            if err.is_desync() {
                log::warn!("desync detected at revision {}: {err}", self.revision());
                self.desynced = true;
            }
            err
        })
    }
}

impl Default for ClientStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Transform a remote operation past whatever the client has in flight.
///
/// Returns the next state and the remote operation rewritten for the local
/// document. Client-side operations go first so they keep insert priority.
fn transform_state(state: &ClientState, remote: &Operation) -> Result<(ClientState, Operation), OtError> {
    match state {
        ClientState::Synchronized => Ok((ClientState::Synchronized, remote.clone())),
        ClientState::AwaitingConfirm { outstanding } => {
            let (outstanding, remote) = outstanding.transform(remote)?;
            Ok((ClientState::AwaitingConfirm { outstanding }, remote))
        }
        ClientState::AwaitingConfirmWithBuffer { outstanding, buffer } => {
            let (outstanding, remote) = outstanding.transform(remote)?;
            let (buffer, remote) = buffer.transform(&remote)?;
            Ok((
                ClientState::AwaitingConfirmWithBuffer { outstanding, buffer },
                remote,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(text: &str) -> ClientStateMachine {
        ClientStateMachine::with_document(text, 0)
    }

    #[test]
    fn test_initial_state() {
        let client = ClientStateMachine::new();
        assert_eq!(client.state(), &ClientState::Synchronized);
        assert_eq!(client.revision(), 0);
        assert_eq!(client.document(), "");
        assert!(client.outstanding().is_none());
        assert!(client.buffer().is_none());
    }

    #[test]
    fn test_local_edit_sends_when_synchronized() {
        let mut client = seeded("hello");
        let out = client.local_edit("hello", "hallo").unwrap().unwrap();

        assert_eq!(out.revision, 0);
        assert_eq!(out.operation.apply("hello").unwrap(), "hallo");
        assert_eq!(client.document(), "hallo");
        assert_eq!(client.state().name(), "awaiting-confirm");
    }

    #[test]
    fn test_noop_edit_not_sent() {
        let mut client = seeded("hello");
        assert_eq!(client.local_edit("hello", "hello").unwrap(), None);
        assert_eq!(client.state(), &ClientState::Synchronized);
    }

    #[test]
    fn test_second_edit_is_buffered() {
        let mut client = seeded("ab");
        client.local_edit("ab", "abc").unwrap();
        assert_eq!(client.local_edit("abc", "abcd").unwrap(), None);
        assert_eq!(client.state().name(), "awaiting-confirm-with-buffer");

        // Third edit composes into the same buffer.
        assert_eq!(client.local_edit("abcd", "xabcd").unwrap(), None);
        let buffer = client.buffer().unwrap();
        assert_eq!(buffer.apply("abc").unwrap(), "xabcd");
    }

    #[test]
    fn test_ack_sends_buffer_and_stays_awaiting() {
        let mut client = seeded("ab");
        client.local_edit("ab", "abc").unwrap();
        client.local_edit("abc", "abcd").unwrap();

        let next = client.server_ack().unwrap().unwrap();
        assert_eq!(next.revision, 1);
        assert_eq!(next.operation.apply("abc").unwrap(), "abcd");
        assert_eq!(client.revision(), 1);
        assert!(matches!(client.state(), ClientState::AwaitingConfirm { .. }));

        assert_eq!(client.server_ack().unwrap(), None);
        assert_eq!(client.revision(), 2);
        assert_eq!(client.state(), &ClientState::Synchronized);
    }

    #[test]
    fn test_ack_while_synchronized_is_error() {
        let mut client = seeded("x");
        assert_eq!(client.server_ack(), Err(SyncError::UnexpectedAck));
        assert_eq!(client.state(), &ClientState::Synchronized);
    }

    #[test]
    fn test_remote_when_synchronized() {
        let mut client = seeded("abc");
        let remote = Operation::new().retain(3).insert("d");
        let local = client.apply_server(remote.clone()).unwrap();
        assert_eq!(local, remote);
        assert_eq!(client.document(), "abcd");
        assert_eq!(client.revision(), 1);
    }

    #[test]
    fn test_remote_while_awaiting_confirm() {
        let mut client = seeded("hello");
        client.local_edit("hello", "hallo").unwrap();

        let remote = Operation::new().retain(5).insert("!");
        let local = client.apply_server(remote).unwrap();

        assert_eq!(client.document(), "hallo!");
        assert_eq!(local.apply("hallo").unwrap(), "hallo!");
        assert_eq!(client.revision(), 1);
        let outstanding = client.outstanding().unwrap();
        assert_eq!(outstanding.apply("hello!").unwrap(), "hallo!");
        assert_eq!(client.state().name(), "awaiting-confirm");
    }

    #[test]
    fn test_remote_while_buffering() {
        let mut client = seeded("abc");
        client.local_edit("abc", "Xabc").unwrap();
        client.local_edit("Xabc", "XabcY").unwrap();

        // Server saw "abc" -> "abZc".
        let remote = Operation::new().retain(2).insert("Z").retain(1);
        client.apply_server(remote).unwrap();

        assert_eq!(client.document(), "XabZcY");
        assert_eq!(client.revision(), 1);
        let outstanding = client.outstanding().unwrap();
        let buffer = client.buffer().unwrap();
        let server_side = outstanding.apply("abZc").unwrap();
        assert_eq!(server_side, "XabZc");
        assert_eq!(buffer.apply(&server_side).unwrap(), "XabZcY");
    }

    #[test]
    fn test_length_mismatch_on_local_edit_desyncs() {
        let mut client = seeded("hello");
        let err = client.local_edit("hello world", "hello there").unwrap_err();
        assert!(err.is_desync());
        assert!(client.is_desynced());
        assert_eq!(client.document(), "hello");
        assert_eq!(client.state(), &ClientState::Synchronized);

        assert_eq!(client.local_edit("hello", "help"), Err(SyncError::Desynced));
    }

    #[test]
    fn test_length_mismatch_on_remote_leaves_document() {
        let mut client = seeded("hello");
        client.local_edit("hello", "hallo").unwrap();

        let bogus = Operation::new().retain(9).insert("?");
        let err = client.apply_server(bogus).unwrap_err();
        assert!(matches!(err, SyncError::LengthMismatch { expected: 5, actual: 9 }));
        assert_eq!(client.document(), "hallo");
        assert_eq!(client.revision(), 0);
        assert!(client.is_desynced());
    }

    #[test]
    fn test_reset_recovers() {
        let mut client = seeded("hello");
        client.local_edit("hello", "hallo").unwrap();
        let _ = client.apply_server(Operation::new().retain(2));
        assert!(client.is_desynced());

        client.reset("fresh copy", 12);
        assert!(!client.is_desynced());
        assert_eq!(client.state(), &ClientState::Synchronized);
        assert_eq!(client.document(), "fresh copy");
        assert_eq!(client.revision(), 12);

        let out = client.local_edit("fresh copy", "fresh copy!").unwrap().unwrap();
        assert_eq!(out.revision, 12);
    }

    #[test]
    fn test_mark_desynced_blocks_until_reset() {
        let mut client = seeded("ab");
        client.local_edit("ab", "abc").unwrap();
        client.mark_desynced();

        assert!(client.is_desynced());
        assert_eq!(client.local_edit("abc", "abcd"), Err(SyncError::Desynced));
        assert_eq!(client.server_ack(), Err(SyncError::Desynced));
        assert_eq!(
            client.apply_server(Operation::new().retain(2).insert("x")),
            Err(SyncError::Desynced)
        );

        client.reset("abc", 1);
        assert!(!client.is_desynced());
        assert_eq!(client.state(), &ClientState::Synchronized);
    }
}
