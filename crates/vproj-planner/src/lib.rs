#![forbid(unsafe_code)]
//! vproj-planner: everything upstream of the projection operator that it
//! consumes as a service.
//!
//! - `logical`: projection lists (`ProjectionSpec`) over untyped expressions
//! - `materialize`: resolves expressions against an input schema into
//!   `TypedExpr` trees, aggregating every type/reference error
//! - `functions`: the scalar function registry used for both typing and evaluation
//! - `dsl`: a small YAML surface for writing projection lists
//!
//! NOTE: No execution or allocation here; the operator crate owns that.

pub mod dsl;
pub mod error;
pub mod functions;
pub mod logical;
pub mod materialize;
pub mod typed;

pub use dsl::yaml::{parse_yaml_projection, ConfigOverrides, ParsedProjection};
pub use error::PlanError;
pub use functions::{EvalError, FunctionRegistry, ScalarFunction};
pub use logical::{LogicalExpr, NamedExpr, PathSegment, ProjectionSpec, SchemaPath};
pub use materialize::{Materializer, SchemaMaterializer, TypeError};
pub use typed::TypedExpr;
