//! Transfer decider: which output columns can take over an input column's
//! storage instead of being computed.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use vproj_core::id::FieldId;
use vproj_core::schema::Schema;
use vproj_planner::TypedExpr;

/// Ownership hand-off of input column `source` to output column `dest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferBinding {
    pub source: FieldId,
    pub dest: String,
}

/// Per-compilation decider. A source column is handed off at most once;
/// the first entry in projection order claims it.
#[derive(Debug)]
pub struct TransferDecider {
    enabled: bool,
    claimed: HashSet<FieldId>,
}

impl TransferDecider {
    /// Transfers are off when rows go through a selection vector (moving the
    /// buffer would hand over unselected rows) or when disabled by config.
    pub fn new(input: &Schema, enable_transfers: bool) -> Self {
        Self {
            enabled: enable_transfers && !input.has_selection_vector(),
            claimed: HashSet::new(),
        }
    }

    #[cfg(test)]
    fn enabled(&self) -> bool {
        self.enabled
    }

    /// `Some` if entry `name := expr` is satisfied by a transfer. Claims the
    /// source on success.
    pub fn decide(&mut self, name: &str, expr: &TypedExpr) -> Option<TransferBinding> {
        if !self.enabled {
            return None;
        }
        let source = expr.as_direct_read()?;
        if !self.claimed.insert(source) {
            return None;
        }
        Some(TransferBinding {
            source,
            dest: name.to_string(),
        })
    }

    #[cfg(test)]
    fn claimed(&self) -> usize {
        self.claimed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vproj_core::schema::{DataType, Field, SelectionVectorMode};
    use vproj_core::types::Scalar;
    use vproj_planner::PathSegment;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("a", DataType::Int32, false),
            Field::new("b", DataType::Utf8, true),
        ])
    }

    fn read(idx: u32, path: Vec<PathSegment>) -> TypedExpr {
        TypedExpr::ColumnRead {
            field_id: FieldId::new(idx),
            path,
            data_type: DataType::Int32,
        }
    }

    #[test]
    fn first_claim_wins() {
        let mut d = TransferDecider::new(&schema(), true);
        let x = d.decide("x", &read(0, vec![])).unwrap();
        assert_eq!(x.source, FieldId::new(0));
        assert_eq!(x.dest, "x");
        assert!(d.decide("y", &read(0, vec![])).is_none());
        assert!(d.decide("z", &read(1, vec![])).is_some());
        assert_eq!(d.claimed(), 2);
    }

    #[test]
    fn only_bare_reads_transfer() {
        let mut d = TransferDecider::new(&schema(), true);
        assert!(d.decide("p", &read(1, vec![PathSegment::Index(0)])).is_none());
        let lit = TypedExpr::Literal {
            value: Scalar::I32(1),
            data_type: DataType::Int32,
        };
        assert!(d.decide("l", &lit).is_none());
        // a rejected read path does not claim the source
        assert!(d.decide("b", &read(1, vec![])).is_some());
    }

    #[test]
    fn selection_vector_disables_transfers() {
        let sv = schema().with_selection(SelectionVectorMode::Indirect);
        let mut d = TransferDecider::new(&sv, true);
        assert!(!d.enabled());
        assert!(d.decide("a", &read(0, vec![])).is_none());

        let mut off = TransferDecider::new(&schema(), false);
        assert!(off.decide("a", &read(0, vec![])).is_none());
    }
}
