//! Authoritative document: the server half of the protocol.
//!
//! ```text
//!  client op @ rev r ──► transform past history[r..] ──► apply ──► append
//!                                                           │
//!                                                           ▼
//!                                               broadcast (op', rev head)
//! ```
//!
//! The live channel server keeps one of these per module. The collab crate
//! uses it as the room behind its in-memory test channel and in benchmarks.

use crate::operation::Operation;
use crate::revision::{RevisionError, RevisionLog};

/// The canonical copy of one document.
#[derive(Debug, Clone)]
pub struct RevisionAuthority {
    document: String,
    history: RevisionLog,
}

impl RevisionAuthority {
    /// Authority over `document` at revision 0.
    pub fn new(document: impl Into<String>, history_limit: usize) -> Self {
        Self {
            document: document.into(),
            history: RevisionLog::new(history_limit),
        }
    }

    /// Accept a client operation authored against `revision`.
    ///
    /// Returns the operation as applied, i.e. what every other client must
    /// receive. On error the document is unchanged.
    pub fn receive(&mut self, revision: u64, op: Operation) -> Result<Operation, RevisionError> {
        let op = self.history.transform_forward(op, revision)?;
        self.document = op.apply(&self.document)?;
        self.history.append(op.clone());
        Ok(op)
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn revision(&self) -> u64 {
        self.history.head()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientStateMachine;

    #[test]
    fn test_receive_in_order() {
        let mut authority = RevisionAuthority::new("abc", 16);
        let applied = authority
            .receive(0, Operation::new().retain(3).insert("d"))
            .unwrap();
        assert_eq!(applied.apply("abc").unwrap(), "abcd");
        assert_eq!(authority.document(), "abcd");
        assert_eq!(authority.revision(), 1);
    }

    #[test]
    fn test_receive_concurrent() {
        let mut authority = RevisionAuthority::new("abc", 16);
        authority
            .receive(0, Operation::new().insert("1").retain(3))
            .unwrap();
        // Authored against revision 0, arrives after the first edit.
        let applied = authority
            .receive(0, Operation::new().retain(3).insert("2"))
            .unwrap();
        assert_eq!(applied.base_len(), 4);
        assert_eq!(authority.document(), "1abc2");
        assert_eq!(authority.revision(), 2);
    }

    #[test]
    fn test_receive_rejects_stale_revision() {
        let mut authority = RevisionAuthority::new("", 1);
        authority.receive(0, Operation::new().insert("a")).unwrap();
        authority.receive(1, Operation::new().retain(1).insert("b")).unwrap();

        let err = authority
            .receive(0, Operation::new().insert("c"))
            .unwrap_err();
        assert!(matches!(err, RevisionError::OutOfRange { .. }));
        assert_eq!(authority.document(), "ab");
    }

    #[test]
    fn test_two_clients_converge() {
        let mut authority = RevisionAuthority::new("shared", 16);
        let mut alice = ClientStateMachine::with_document("shared", 0);
        let mut bob = ClientStateMachine::with_document("shared", 0);

        let a = alice.local_edit("shared", "A shared").unwrap().unwrap();
        let b = bob.local_edit("shared", "shared B").unwrap().unwrap();

        // Alice's edit reaches the server first.
        let a_applied = authority.receive(a.revision, a.operation).unwrap();
        let b_applied = authority.receive(b.revision, b.operation).unwrap();

        alice.server_ack().unwrap();
        alice.apply_server(b_applied).unwrap();

        bob.apply_server(a_applied).unwrap();
        bob.server_ack().unwrap();

        assert_eq!(authority.document(), "A shared B");
        assert_eq!(alice.document(), authority.document());
        assert_eq!(bob.document(), authority.document());
        assert_eq!(alice.revision(), 2);
        assert_eq!(bob.revision(), 2);
    }
}
