use std::fmt;

use serde::{Deserialize, Serialize};

/// Largest generation a cross-reference entry can carry (five decimal digits).
pub const MAX_GENERATION: u32 = 65_535;

/// Generation marking a free number that must never be handed out again.
///
/// Object 0 always carries it, and numbers removed under the
/// non-recycling policy are freed with it.
pub const UNREUSABLE_GENERATION: u32 = MAX_GENERATION;

/// Largest object number a store may hold.
///
/// Entries above it are ignored on load, so a session's number counter
/// starts well clear of `u32::MAX`. Saves that would exceed it fail.
pub const MAX_OBJECT_NUMBER: u32 = 8_388_607;

/// Reference to an indirect object: the stable object number plus the
/// generation it was written with.
///
/// Payloads carry `ObjectRef`s instead of pointers; resolving one is a
/// registry lookup by `number`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub number: u32,
    pub generation: u32,
}

impl ObjectRef {
    /// Create a reference.
    pub const fn new(number: u32, generation: u32) -> Self {
        Self { number, generation }
    }

    /// The reserved head of the free list (`0 65535`).
    pub const fn reserved() -> Self {
        Self::new(0, UNREUSABLE_GENERATION)
    }

    /// Returns `true` for object number 0.
    pub fn is_reserved(&self) -> bool {
        self.number == 0
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({} {})", self.number, self.generation)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_is_number_zero() {
        let r = ObjectRef::reserved();
        assert!(r.is_reserved());
        assert_eq!(r.generation, UNREUSABLE_GENERATION);
    }

    #[test]
    fn display_uses_reference_syntax() {
        assert_eq!(ObjectRef::new(12, 0).to_string(), "12 0 R");
    }

    #[test]
    fn ordering_is_by_number_then_generation() {
        assert!(ObjectRef::new(1, 5) < ObjectRef::new(2, 0));
        assert!(ObjectRef::new(2, 0) < ObjectRef::new(2, 1));
    }

    #[test]
    fn serde_roundtrip() {
        let r = ObjectRef::new(7, 3);
        let json = serde_json::to_string(&r).unwrap();
        let parsed: ObjectRef = serde_json::from_str(&json).unwrap();
        assert_eq!(r, parsed);
    }
}
