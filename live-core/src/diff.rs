//! Build an [`Operation`] from a before/after pair of full texts.
//!
//! The editor only reports whole buffers; this turns two snapshots into the
//! minimal retain/insert/delete walk between them (Myers diff via
//! `dissimilar`).

use dissimilar::Chunk;

use crate::operation::{Component, Operation};

/// Operation that turns `before` into `after`.
///
/// The result always satisfies `op.apply(before) == Ok(after)`. Identical
/// inputs yield a no-op (`is_noop()`), which callers use to skip sending.
pub fn text_operation(before: &str, after: &str) -> Operation {
    let mut op = Operation::new();
    for chunk in dissimilar::diff(before, after) {
        match chunk {
            Chunk::Equal(text) => op.push(Component::Retain(text.chars().count())),
            Chunk::Delete(text) => op.push(Component::Delete(text.chars().count())),
            Chunk::Insert(text) => op.push(Component::Insert(text.to_string())),
        }
    }
    op
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_substitution() {
        let op = text_operation("hello", "hallo");
        assert_eq!(op.apply("hello").unwrap(), "hallo");
        assert_eq!(op.base_len(), 5);
        assert_eq!(op.target_len(), 5);
    }

    #[test]
    fn test_identical_is_noop() {
        let op = text_operation("same text", "same text");
        assert!(op.is_noop());
        assert_eq!(op.base_len(), 9);
    }

    #[test]
    fn test_from_and_to_empty() {
        let grow = text_operation("", "fresh");
        assert_eq!(grow.apply("").unwrap(), "fresh");

        let shrink = text_operation("gone", "");
        assert_eq!(shrink.apply("gone").unwrap(), "");
        assert_eq!(shrink.components(), &[Component::Delete(4)]);
    }

    #[test]
    fn test_multibyte_lengths() {
        let op = text_operation("naïve café", "naive cafe");
        assert_eq!(op.base_len(), 10);
        assert_eq!(op.apply("naïve café").unwrap(), "naive cafe");
    }

    #[test]
    fn test_multiline_edit() {
        let before = "fn main() {\n    run();\n}\n";
        let after = "fn main() {\n    setup();\n    run();\n}\n";
        let op = text_operation(before, after);
        assert_eq!(op.apply(before).unwrap(), after);
    }
}
