//! Append-only history of the operations folded into a document.
//!
//! ```text
//!  oldest                                   head
//!    │                                        │
//!    ▼                                        ▼
//!  ┌──────┬──────┬──────┬──────┬──────┐
//!  │ op 7 │ op 8 │ op 9 │ op10 │ op11 │   revision 12
//!  └──────┴──────┴──────┴──────┴──────┘
//!              ▲
//!              └── op authored at revision 9 is transformed past 9, 10, 11
//! ```
//!
//! Only the most recent `limit` entries are retained. Older entries are
//! folded into the base revision, the same way a delta log compacts into its
//! base snapshot.
//!
//! Reference: Nichols et al. — High-latency, Low-bandwidth Windowing in the
//! Jupiter Collaboration System (1995)

use std::collections::VecDeque;

use crate::operation::{OtError, Operation};

/// Default number of operations kept per document.
pub const DEFAULT_HISTORY_LIMIT: usize = 256;

/// Revision log errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionError {
    /// Requested revision lies outside the retained window.
    OutOfRange { requested: u64, oldest: u64, head: u64 },
    /// Transforming through the history failed.
    Operation(OtError),
}

impl std::fmt::Display for RevisionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RevisionError::OutOfRange { requested, oldest, head } => write!(
                f,
                "Revision {requested} out of range (retained {oldest}..={head})"
            ),
            RevisionError::Operation(e) => write!(f, "Operation error: {e}"),
        }
    }
}

impl std::error::Error for RevisionError {}

impl From<OtError> for RevisionError {
    fn from(e: OtError) -> Self {
        RevisionError::Operation(e)
    }
}

/// Per-document operation history.
#[derive(Debug, Clone)]
pub struct RevisionLog {
    /// Revision of the oldest retained entry.
    base: u64,
    entries: VecDeque<Operation>,
    limit: usize,
}

impl RevisionLog {
    /// Empty log at revision 0.
    pub fn new(limit: usize) -> Self {
        Self::starting_at(0, limit)
    }

    /// Empty log whose next entry becomes revision `revision + 1`.
    pub fn starting_at(revision: u64, limit: usize) -> Self {
        Self {
            base: revision,
            entries: VecDeque::with_capacity(limit.min(1024)),
            limit,
        }
    }

    /// Number of operations folded into the document so far.
    pub fn head(&self) -> u64 {
        self.base + self.entries.len() as u64
    }

    /// Oldest revision an operation may still be transformed from.
    pub fn oldest(&self) -> u64 {
        self.base
    }

    /// Retained entry count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Record an applied operation. Returns the new head revision.
    pub fn append(&mut self, op: Operation) -> u64 {
        self.entries.push_back(op);
        while self.entries.len() > self.limit {
            self.entries.pop_front();
            self.base += 1;
        }
        self.head()
    }

    /// Operations applied after `revision`, oldest first.
    pub fn since(
        &self,
        revision: u64,
    ) -> Result<impl Iterator<Item = &Operation> + '_, RevisionError> {
        let head = self.head();
        if revision < self.base || revision > head {
            return Err(RevisionError::OutOfRange {
                requested: revision,
                oldest: self.base,
                head,
            });
        }
        Ok(self.entries.iter().skip((revision - self.base) as usize))
    }

    /// Bring `op`, authored against `revision`, forward to the head.
    ///
    /// `op` keeps insert priority over every concurrent entry.
    pub fn transform_forward(&self, op: Operation, revision: u64) -> Result<Operation, RevisionError> {
        let mut op = op;
        for concurrent in self.since(revision)? {
            let (transformed, _) = op.transform(concurrent)?;
            op = transformed;
        }
        Ok(op)
    }

    /// Drop all entries and restart at `revision`.
    pub fn reset(&mut self, revision: u64) {
        self.entries.clear();
        self.base = revision;
    }
}

impl Default for RevisionLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_advances_head() {
        let mut log = RevisionLog::new(8);
        assert_eq!(log.head(), 0);
        assert!(log.is_empty());

        assert_eq!(log.append(Operation::new().insert("a")), 1);
        assert_eq!(log.append(Operation::new().retain(1).insert("b")), 2);
        assert_eq!(log.len(), 2);
        assert_eq!(log.oldest(), 0);
    }

    #[test]
    fn test_limit_compacts_oldest() {
        let mut log = RevisionLog::new(2);
        for _ in 0..5 {
            log.append(Operation::new());
        }
        assert_eq!(log.head(), 5);
        assert_eq!(log.len(), 2);
        assert_eq!(log.oldest(), 3);
    }

    #[test]
    fn test_starting_at() {
        let mut log = RevisionLog::starting_at(40, 4);
        assert_eq!(log.head(), 40);
        assert_eq!(log.append(Operation::new()), 41);
    }

    #[test]
    fn test_transform_forward_past_concurrent() {
        let mut doc = String::from("abc");
        let mut log = RevisionLog::new(16);

        // Two remote edits land first.
        let r1 = Operation::new().insert(">").retain(3);
        doc = r1.apply(&doc).unwrap();
        log.append(r1);
        let r2 = Operation::new().retain(4).insert("<");
        doc = r2.apply(&doc).unwrap();
        log.append(r2);

        // Local edit authored against revision 0 ("abc").
        let local = Operation::new().retain(1).delete(1).retain(1);
        let forward = log.transform_forward(local, 0).unwrap();
        assert_eq!(forward.apply(&doc).unwrap(), ">ac<");
    }

    #[test]
    fn test_transform_forward_from_head_is_identity() {
        let mut log = RevisionLog::new(4);
        log.append(Operation::new().insert("x"));
        let op = Operation::new().retain(1).insert("y");
        assert_eq!(log.transform_forward(op.clone(), 1).unwrap(), op);
    }

    #[test]
    fn test_out_of_range() {
        let mut log = RevisionLog::new(1);
        log.append(Operation::new().insert("a"));
        log.append(Operation::new().retain(1).insert("b"));

        let err = log
            .transform_forward(Operation::new(), 0)
            .unwrap_err();
        assert_eq!(
            err,
            RevisionError::OutOfRange { requested: 0, oldest: 1, head: 2 }
        );
        assert!(log.since(3).is_err());
    }

    #[test]
    fn test_reset() {
        let mut log = RevisionLog::new(4);
        log.append(Operation::new().insert("a"));
        log.reset(17);
        assert!(log.is_empty());
        assert_eq!(log.head(), 17);
        assert_eq!(log.oldest(), 17);
    }
}
