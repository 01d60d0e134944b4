//! Text operations with transform and compose.
//!
//! An [`Operation`] walks the whole pre-image document from left to right:
//!
//! ```text
//!   "hello"
//!    │
//!    │  Retain(1)  Insert("a")  Delete(1)  Retain(3)
//!    ▼
//!   "hallo"
//! ```
//!
//! Lengths are counted in Unicode scalar values (`char`s). An operation built
//! against one string applies to any other string with the same `chars()`
//! count, and fails with [`OtError::LengthMismatch`] otherwise.
//!
//! Canonical form, maintained by every constructor:
//! - no zero-length components
//! - adjacent components of the same kind are merged
//! - an insert never directly follows a delete (it is moved in front of it)
//!
//! With a canonical form, two operations that describe the same edit compare
//! equal, which is what makes serialization round-trips exact.
//!
//! Reference: Ellis & Gibbs — Concurrency Control in Groupware Systems (1989)

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One step of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Component {
    /// Keep the next `n` characters.
    Retain(usize),
    /// Insert text at the cursor.
    Insert(String),
    /// Remove the next `n` characters.
    Delete(usize),
}

impl Component {
    /// Characters this component consumes from the pre-image.
    pub fn base_len(&self) -> usize {
        match self {
            Component::Retain(n) | Component::Delete(n) => *n,
            Component::Insert(_) => 0,
        }
    }

    /// Characters this component contributes to the post-image.
    pub fn target_len(&self) -> usize {
        match self {
            Component::Retain(n) => *n,
            Component::Insert(text) => text.chars().count(),
            Component::Delete(_) => 0,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Component::Retain(n) | Component::Delete(n) => *n == 0,
            Component::Insert(text) => text.is_empty(),
        }
    }
}

/// Operation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtError {
    /// The operation expects a document (or a sibling operation) of a
    /// different length than the one it was given.
    LengthMismatch { expected: usize, actual: usize },
    /// Input does not describe a well-formed operation.
    Malformed(String),
}

impl std::fmt::Display for OtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OtError::LengthMismatch { expected, actual } => {
                write!(f, "Length mismatch: expected {expected}, got {actual}")
            }
            OtError::Malformed(e) => write!(f, "Malformed operation: {e}"),
        }
    }
}

impl std::error::Error for OtError {}

/// A retain/insert/delete edit covering a whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Component>", into = "Vec<Component>")]
pub struct Operation {
    components: Vec<Component>,
    base_len: usize,
    target_len: usize,
}

impl Operation {
    /// The empty operation: applies only to the empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: keep `n` characters.
    pub fn retain(mut self, n: usize) -> Self {
        self.push(Component::Retain(n));
        self
    }

    /// Builder: insert `text`.
    pub fn insert(mut self, text: impl Into<String>) -> Self {
        self.push(Component::Insert(text.into()));
        self
    }

    /// Builder: remove `n` characters.
    pub fn delete(mut self, n: usize) -> Self {
        self.push(Component::Delete(n));
        self
    }

    /// Append a component, keeping the canonical form.
    ///
    /// Lengths saturate at `usize::MAX`; such an operation fits no document.
    pub(crate) fn push(&mut self, component: Component) {
        if component.is_empty() {
            return;
        }
        self.base_len = self.base_len.saturating_add(component.base_len());
        self.target_len = self.target_len.saturating_add(component.target_len());
        self.merge(component);
    }

    /// Append a component, failing instead of overflowing a length.
    ///
    /// On error the operation is left unchanged.
    pub(crate) fn try_push(&mut self, component: Component) -> Result<(), OtError> {
        if component.is_empty() {
            return Ok(());
        }
        let overflow = || OtError::Malformed("length overflows usize".to_string());
        let base_len = self
            .base_len
            .checked_add(component.base_len())
            .ok_or_else(overflow)?;
        let target_len = self
            .target_len
            .checked_add(component.target_len())
            .ok_or_else(overflow)?;
        self.base_len = base_len;
        self.target_len = target_len;
        self.merge(component);
        Ok(())
    }

    fn merge(&mut self, component: Component) {
        match component {
            Component::Retain(n) => {
                if let Some(Component::Retain(last)) = self.components.last_mut() {
                    *last = last.saturating_add(n);
                    return;
                }
                self.components.push(Component::Retain(n));
            }
            Component::Delete(n) => {
                if let Some(Component::Delete(last)) = self.components.last_mut() {
                    *last = last.saturating_add(n);
                    return;
                }
                self.components.push(Component::Delete(n));
            }
            Component::Insert(text) => {
                if let Some(Component::Insert(last)) = self.components.last_mut() {
                    last.push_str(&text);
                    return;
                }
                let len = self.components.len();
                if matches!(self.components.last(), Some(Component::Delete(_))) {
                    // Insert goes in front of the trailing delete.
                    if len >= 2 {
                        if let Component::Insert(prev) = &mut self.components[len - 2] {
                            prev.push_str(&text);
                            return;
                        }
                    }
                    self.components.insert(len - 1, Component::Insert(text));
                    return;
                }
                self.components.push(Component::Insert(text));
            }
        }
    }

    /// Components in document order.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Length of the document this operation applies to.
    pub fn base_len(&self) -> usize {
        self.base_len
    }

    /// Length of the document this operation produces.
    pub fn target_len(&self) -> usize {
        self.target_len
    }

    /// True when applying the operation leaves every document unchanged.
    pub fn is_noop(&self) -> bool {
        self.components
            .iter()
            .all(|c| matches!(c, Component::Retain(_)))
    }

    /// Apply to `doc`, producing the post-image.
    ///
    /// `doc` is never modified; on [`OtError::LengthMismatch`] the caller's
    /// copy is exactly as it was.
    pub fn apply(&self, doc: &str) -> Result<String, OtError> {
        let actual = doc.chars().count();
        if actual != self.base_len {
            return Err(OtError::LengthMismatch {
                expected: self.base_len,
                actual,
            });
        }

        let mut out = String::with_capacity(doc.len());
        let mut chars = doc.chars();
        for component in &self.components {
            match component {
                Component::Retain(n) => out.extend(chars.by_ref().take(*n)),
                Component::Insert(text) => out.push_str(text),
                Component::Delete(n) => chars.by_ref().take(*n).for_each(drop),
            }
        }
        Ok(out)
    }

    /// Compose `self` followed by `next` into a single operation.
    ///
    /// `apply(doc, a.compose(b))` equals `apply(apply(doc, a), b)`.
    pub fn compose(&self, next: &Operation) -> Result<Operation, OtError> {
        if self.target_len != next.base_len {
            return Err(OtError::LengthMismatch {
                expected: self.target_len,
                actual: next.base_len,
            });
        }

        let mut out = Operation::new();
        let mut first = Cursor::new(self);
        let mut second = Cursor::new(next);

        loop {
            match (first.peek(), second.peek()) {
                (None, None) => break,
                (Some(Component::Delete(n)), _) => {
                    out.push(Component::Delete(*n));
                    first.advance();
                }
                (_, Some(Component::Insert(text))) => {
                    out.push(Component::Insert(text.clone()));
                    second.advance();
                }
                (None, _) | (_, None) => {
                    return Err(OtError::Malformed(
                        "compose: operations do not line up".to_string(),
                    ));
                }
                (Some(Component::Retain(a)), Some(Component::Retain(b))) => {
                    let n = (*a).min(*b);
                    out.push(Component::Retain(n));
                    first.consume(n);
                    second.consume(n);
                }
                (Some(Component::Insert(text)), Some(Component::Delete(b))) => {
                    // Inserted then deleted: neither survives.
                    let n = text.chars().count().min(*b);
                    first.consume(n);
                    second.consume(n);
                }
                (Some(Component::Insert(text)), Some(Component::Retain(b))) => {
                    let n = text.chars().count().min(*b);
                    out.push(Component::Insert(text.chars().take(n).collect()));
                    first.consume(n);
                    second.consume(n);
                }
                (Some(Component::Retain(a)), Some(Component::Delete(b))) => {
                    let n = (*a).min(*b);
                    out.push(Component::Delete(n));
                    first.consume(n);
                    second.consume(n);
                }
            }
        }
        Ok(out)
    }

    /// Transform two concurrent operations against each other.
    ///
    /// Both must apply to the same document. Returns `(self', other')` such
    /// that `apply(apply(doc, self), other') == apply(apply(doc, other), self')`.
    ///
    /// When both insert at the same offset, `self`'s text lands first. Callers
    /// pass the client-side operation as `self` everywhere (client and server
    /// alike), so every replica breaks the tie the same way.
    pub fn transform(&self, other: &Operation) -> Result<(Operation, Operation), OtError> {
        if self.base_len != other.base_len {
            return Err(OtError::LengthMismatch {
                expected: self.base_len,
                actual: other.base_len,
            });
        }

        let mut left = Operation::new();
        let mut right = Operation::new();
        let mut a = Cursor::new(self);
        let mut b = Cursor::new(other);

        loop {
            match (a.peek(), b.peek()) {
                (None, None) => break,
                (Some(Component::Insert(text)), _) => {
                    let n = text.chars().count();
                    left.push(Component::Insert(text.clone()));
                    right.push(Component::Retain(n));
                    a.advance();
                }
                (_, Some(Component::Insert(text))) => {
                    let n = text.chars().count();
                    left.push(Component::Retain(n));
                    right.push(Component::Insert(text.clone()));
                    b.advance();
                }
                (None, _) | (_, None) => {
                    return Err(OtError::Malformed(
                        "transform: operations do not line up".to_string(),
                    ));
                }
                (Some(Component::Retain(x)), Some(Component::Retain(y))) => {
                    let n = (*x).min(*y);
                    left.push(Component::Retain(n));
                    right.push(Component::Retain(n));
                    a.consume(n);
                    b.consume(n);
                }
                (Some(Component::Delete(x)), Some(Component::Delete(y))) => {
                    // Both removed the same characters.
                    let n = (*x).min(*y);
                    a.consume(n);
                    b.consume(n);
                }
                (Some(Component::Delete(x)), Some(Component::Retain(y))) => {
                    let n = (*x).min(*y);
                    left.push(Component::Delete(n));
                    a.consume(n);
                    b.consume(n);
                }
                (Some(Component::Retain(x)), Some(Component::Delete(y))) => {
                    let n = (*x).min(*y);
                    right.push(Component::Delete(n));
                    a.consume(n);
                    b.consume(n);
                }
            }
        }
        Ok((left, right))
    }

    /// Compact editor form: retain as a positive integer, delete as a negative
    /// integer, insert as a string. `[1, "a", -1, 3]`.
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.components
                .iter()
                .map(|c| match c {
                    Component::Retain(n) => Value::from(*n),
                    Component::Delete(n) => Value::from(-(*n as i64)),
                    Component::Insert(text) => Value::from(text.as_str()),
                })
                .collect(),
        )
    }

    /// Parse the compact editor form produced by [`Operation::to_json`].
    pub fn from_json(value: &Value) -> Result<Self, OtError> {
        let items = value
            .as_array()
            .ok_or_else(|| OtError::Malformed("expected an array".to_string()))?;

        let mut op = Operation::new();
        for item in items {
            let component = match item {
                Value::String(text) if !text.is_empty() => Component::Insert(text.clone()),
                Value::Number(n) => match n.as_i64() {
                    Some(i) if i > 0 => Component::Retain(i as usize),
                    Some(i) if i < 0 => Component::Delete(i.unsigned_abs() as usize),
                    _ => return Err(OtError::Malformed(format!("invalid length {n}"))),
                },
                other => return Err(OtError::Malformed(format!("unexpected item {other}"))),
            };
            op.try_push(component)?;
        }
        Ok(op)
    }
}

impl TryFrom<Vec<Component>> for Operation {
    type Error = OtError;

    fn try_from(components: Vec<Component>) -> Result<Self, Self::Error> {
        let mut op = Operation::new();
        for component in components {
            if component.is_empty() {
                return Err(OtError::Malformed("zero-length component".to_string()));
            }
            op.try_push(component)?;
        }
        Ok(op)
    }
}

impl From<Operation> for Vec<Component> {
    fn from(op: Operation) -> Self {
        op.components
    }
}

/// Splittable read head over an operation's components.
struct Cursor<'a> {
    rest: std::slice::Iter<'a, Component>,
    head: Option<Component>,
}

impl<'a> Cursor<'a> {
    fn new(op: &'a Operation) -> Self {
        let mut rest = op.components.iter();
        let head = rest.next().cloned();
        Self { rest, head }
    }

    fn peek(&self) -> Option<&Component> {
        self.head.as_ref()
    }

    fn advance(&mut self) {
        self.head = self.rest.next().cloned();
    }

    /// Consume `n` characters of the head; `n` never exceeds its length.
    fn consume(&mut self, n: usize) {
        let exhausted = match &mut self.head {
            Some(Component::Retain(len)) | Some(Component::Delete(len)) => {
                *len -= n;
                *len == 0
            }
            Some(Component::Insert(text)) => {
                let split = text.char_indices().nth(n).map_or(text.len(), |(i, _)| i);
                text.drain(..split);
                text.is_empty()
            }
            None => false,
        };
        if exhausted {
            self.advance();
        }
    }
}
