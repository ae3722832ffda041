//! Typed identifiers shared across compiler components.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ATTR_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_RELATION_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a resolved attribute (a named, typed column).
///
/// Ids are stamped once, at first resolution, from a process-wide monotone
/// counter and are never reused. Two references carrying the same id denote
/// the same logical column regardless of display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttrId(
    /// Raw numeric id value.
    pub u64,
);

impl AttrId {
    /// Allocate a fresh id. Safe to call from multiple threads.
    pub fn next() -> Self {
        Self(NEXT_ATTR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for AttrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identity of a catalog relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationId(
    /// Raw numeric id value.
    pub u64,
);

impl RelationId {
    /// Allocate a fresh id. Safe to call from multiple threads.
    pub fn next() -> Self {
        Self(NEXT_RELATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::AttrId;

    #[test]
    fn attr_ids_are_monotone_and_unique() {
        let a = AttrId::next();
        let b = AttrId::next();
        assert!(b.0 > a.0);
        assert_ne!(a, b);
    }
}
