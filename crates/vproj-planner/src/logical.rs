//! Untyped projection lists as handed over by the query planner.
//!
//! A `ProjectionSpec` is an ordered list of `NamedExpr`s. The special entry
//! `* AS *` (see `NamedExpr::wildcard`) means "every input column, unchanged".

use serde::{Deserialize, Serialize};

use vproj_core::schema::DataType;
use vproj_core::types::Scalar;

use crate::error::PlanError;

pub const WILDCARD: &str = "*";

/// One step below a column's root name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    /// `.name`
    Field(String),
    /// `[index]`
    Index(usize),
}

/// Column reference: a root name plus an optional read path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaPath {
    pub root: String,
    pub segments: Vec<PathSegment>,
}

impl SchemaPath {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            segments: vec![],
        }
    }

    pub fn with_segment(mut self, segment: PathSegment) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.root == WILDCARD && self.segments.is_empty()
    }

    pub fn has_read_path(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Parse `name`, `name.field`, `name[3]`, or `*`.
    pub fn parse(src: &str) -> Result<Self, PlanError> {
        let bad = |reason: &str| PlanError::Path {
            path: src.to_string(),
            reason: reason.to_string(),
        };
        let src_trim = src.trim();
        let root_end = src_trim
            .find(|c| c == '.' || c == '[')
            .unwrap_or(src_trim.len());
        let root = &src_trim[..root_end];
        if root.is_empty() {
            return Err(bad("missing column name"));
        }
        let mut path = SchemaPath::new(root);
        let mut rest = &src_trim[root_end..];
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('.') {
                let end = after
                    .find(|c| c == '.' || c == '[')
                    .unwrap_or(after.len());
                if end == 0 {
                    return Err(bad("empty field name"));
                }
                path.segments
                    .push(PathSegment::Field(after[..end].to_string()));
                rest = &after[end..];
            } else if let Some(after) = rest.strip_prefix('[') {
                let close = after.find(']').ok_or_else(|| bad("unclosed '['"))?;
                let idx = after[..close]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| bad("index must be a non-negative integer"))?;
                path.segments.push(PathSegment::Index(idx));
                rest = &after[close + 1..];
            } else {
                return Err(bad("unexpected character"));
            }
        }
        if path.root == WILDCARD && path.has_read_path() {
            return Err(bad("wildcard cannot have a read path"));
        }
        Ok(path)
    }
}

impl std::fmt::Display for SchemaPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.root)?;
        for seg in &self.segments {
            match seg {
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

/// Untyped scalar expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalExpr {
    Column(SchemaPath),
    Literal(Scalar),
    Call { func: String, args: Vec<LogicalExpr> },
    Cast { expr: Box<LogicalExpr>, to: DataType },
}

impl LogicalExpr {
    pub fn col(name: impl Into<String>) -> Self {
        LogicalExpr::Column(SchemaPath::new(name))
    }

    pub fn path(path: SchemaPath) -> Self {
        LogicalExpr::Column(path)
    }

    pub fn lit(value: Scalar) -> Self {
        LogicalExpr::Literal(value)
    }

    pub fn call(func: impl Into<String>, args: Vec<LogicalExpr>) -> Self {
        LogicalExpr::Call {
            func: func.into(),
            args,
        }
    }

    pub fn cast(expr: LogicalExpr, to: DataType) -> Self {
        LogicalExpr::Cast {
            expr: Box::new(expr),
            to,
        }
    }
}

/// Output column definition: `expr AS name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedExpr {
    pub name: String,
    pub expr: LogicalExpr,
}

impl NamedExpr {
    pub fn new(name: impl Into<String>, expr: LogicalExpr) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }

    /// `column AS column`.
    pub fn column(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), LogicalExpr::col(name))
    }

    pub fn wildcard() -> Self {
        Self::new(WILDCARD, LogicalExpr::col(WILDCARD))
    }

    pub fn is_wildcard(&self) -> bool {
        self.name == WILDCARD && matches!(&self.expr, LogicalExpr::Column(p) if p.is_wildcard())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectionSpec {
    pub exprs: Vec<NamedExpr>,
}

impl ProjectionSpec {
    pub fn new(exprs: Vec<NamedExpr>) -> Self {
        Self { exprs }
    }

    /// `SELECT *`
    pub fn wildcard() -> Self {
        Self::new(vec![NamedExpr::wildcard()])
    }

    /// A single wildcard anywhere switches the whole projection to pass-through.
    pub fn is_any_wildcard(&self) -> bool {
        self.exprs.iter().any(NamedExpr::is_wildcard)
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}
