//! Materialized expression trees.
//!
//! Produced by a `Materializer`, consumed by the projection operator, which
//! only needs to know two things about a tree: whether it is a bare read of a
//! single input column, and its result type.

use serde::{Deserialize, Serialize};

use vproj_core::id::FieldId;
use vproj_core::schema::DataType;
use vproj_core::types::Scalar;

use crate::logical::PathSegment;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedExpr {
    /// Read of an input column, optionally through a read path.
    ColumnRead {
        field_id: FieldId,
        path: Vec<PathSegment>,
        data_type: DataType,
    },
    Literal {
        value: Scalar,
        data_type: DataType,
    },
    Call {
        func: String,
        args: Vec<TypedExpr>,
        data_type: DataType,
    },
    Cast {
        expr: Box<TypedExpr>,
        data_type: DataType,
    },
}

impl TypedExpr {
    pub fn data_type(&self) -> DataType {
        match self {
            TypedExpr::ColumnRead { data_type, .. }
            | TypedExpr::Literal { data_type, .. }
            | TypedExpr::Call { data_type, .. }
            | TypedExpr::Cast { data_type, .. } => *data_type,
        }
    }

    /// The source field if this is a plain column read with no read path.
    pub fn as_direct_read(&self) -> Option<FieldId> {
        match self {
            TypedExpr::ColumnRead { field_id, path, .. } if path.is_empty() => Some(*field_id),
            _ => None,
        }
    }

    /// Wrap in a cast unless already of type `to`.
    pub fn cast_to(self, to: DataType) -> TypedExpr {
        if self.data_type() == to {
            self
        } else {
            TypedExpr::Cast {
                expr: Box::new(self),
                data_type: to,
            }
        }
    }
}

/// Apply a read path to a value. Out-of-range indexes read as `Null`.
pub fn read_path(value: &Scalar, path: &[PathSegment]) -> Scalar {
    let mut cur = value.clone();
    for seg in path {
        cur = match (cur, seg) {
            (Scalar::Str(s), PathSegment::Index(i)) => s
                .chars()
                .nth(*i)
                .map(|c| Scalar::Str(c.to_string()))
                .unwrap_or(Scalar::Null),
            (Scalar::Bin(b), PathSegment::Index(i)) => b
                .get(*i)
                .map(|byte| Scalar::I32(i32::from(*byte)))
                .unwrap_or(Scalar::Null),
            // Materialization rejects every other combination.
            _ => Scalar::Null,
        };
    }
    cur
}
