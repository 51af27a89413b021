//! Typed identifiers. Raw integers never cross crate boundaries as IDs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one operator instance inside an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(u64);

impl OpId {
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Ordinal position of a column within a batch schema. Only meaningful
/// together with the schema it was resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(u32);

impl FieldId {
    pub const fn new(ordinal: u32) -> Self {
        Self(ordinal)
    }

    /// `None` for schemas wider than `u32::MAX` columns.
    pub fn from_index(idx: usize) -> Option<Self> {
        u32::try_from(idx).ok().map(Self)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_index() {
        assert_eq!(OpId::new(3).to_string(), "op#3");
        assert_eq!(FieldId::from_index(7).map(FieldId::index), Some(7));
        assert_eq!(FieldId::new(2).to_string(), "$2");
    }
}
