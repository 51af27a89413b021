//! Expression materialization: resolve names and types of a `LogicalExpr`
//! against an input schema, producing a `TypedExpr`.

use std::sync::Arc;

use thiserror::Error;

use vproj_core::schema::{DataType, Schema};
use vproj_core::types::Scalar;

use crate::functions::{can_cast, FunctionRegistry};
use crate::logical::{LogicalExpr, PathSegment, SchemaPath};
use crate::typed::TypedExpr;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TypeError {
    pub message: String,
}

impl TypeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Turns untyped expressions into typed ones for a given input schema.
pub trait Materializer: Send + Sync {
    /// Every problem found in `expr` is reported, not just the first.
    fn materialize(&self, expr: &LogicalExpr, schema: &Schema)
        -> Result<TypedExpr, Vec<TypeError>>;
}

/// Default materializer backed by a function registry.
#[derive(Debug, Clone)]
pub struct SchemaMaterializer {
    registry: Arc<FunctionRegistry>,
}

impl Default for SchemaMaterializer {
    fn default() -> Self {
        Self::new(Arc::new(FunctionRegistry::builtin().clone()))
    }
}

impl SchemaMaterializer {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    fn resolve(
        &self,
        expr: &LogicalExpr,
        schema: &Schema,
        errors: &mut Vec<TypeError>,
    ) -> Option<TypedExpr> {
        match expr {
            LogicalExpr::Column(path) => resolve_column(path, schema, errors),
            LogicalExpr::Literal(value) => match value.data_type() {
                Some(data_type) => Some(TypedExpr::Literal {
                    value: value.clone(),
                    data_type,
                }),
                None => {
                    errors.push(TypeError::new(
                        "untyped null literal; wrap it in a cast",
                    ));
                    None
                }
            },
            LogicalExpr::Cast { expr, to } => {
                if let LogicalExpr::Literal(Scalar::Null) = expr.as_ref() {
                    return Some(TypedExpr::Literal {
                        value: Scalar::Null,
                        data_type: *to,
                    });
                }
                let inner = self.resolve(expr, schema, errors)?;
                let from = inner.data_type();
                if !can_cast(from, *to) {
                    errors.push(TypeError::new(format!("cannot cast {from} to {to}")));
                    return None;
                }
                Some(inner.cast_to(*to))
            }
            LogicalExpr::Call { func, args } => {
                let before = errors.len();
                let typed: Vec<Option<TypedExpr>> = args
                    .iter()
                    .map(|a| self.resolve(a, schema, errors))
                    .collect();
                let Some(function) = self.registry.get(func) else {
                    errors.push(TypeError::new(format!("unknown function '{func}'")));
                    return None;
                };
                if !function.arity.accepts(args.len()) {
                    errors.push(TypeError::new(format!(
                        "function '{}' expects {} argument(s), got {}",
                        function.name,
                        function.arity,
                        args.len()
                    )));
                    return None;
                }
                if errors.len() > before {
                    return None;
                }
                let typed: Vec<TypedExpr> = typed.into_iter().flatten().collect();
                let arg_types: Vec<DataType> = typed.iter().map(TypedExpr::data_type).collect();
                let sig = match (function.resolve)(&arg_types) {
                    Ok(sig) => sig,
                    Err(reason) => {
                        errors.push(TypeError::new(format!("{}: {reason}", function.name)));
                        return None;
                    }
                };
                let args = typed
                    .into_iter()
                    .zip(sig.args.iter())
                    .map(|(arg, to)| arg.cast_to(*to))
                    .collect();
                Some(TypedExpr::Call {
                    func: function.name.to_string(),
                    args,
                    data_type: sig.ret,
                })
            }
        }
    }
}

fn resolve_column(
    path: &SchemaPath,
    schema: &Schema,
    errors: &mut Vec<TypeError>,
) -> Option<TypedExpr> {
    if path.is_wildcard() {
        errors.push(TypeError::new("'*' is only valid as a whole projection entry"));
        return None;
    }
    let Some(field_id) = schema.field_id(&path.root) else {
        errors.push(TypeError::new(format!("unknown column '{}'", path.root)));
        return None;
    };
    let mut data_type = schema.field_by_id(field_id)?.data_type;
    for seg in &path.segments {
        data_type = match (seg, data_type) {
            (PathSegment::Index(_), DataType::Utf8) => DataType::Utf8,
            (PathSegment::Index(_), DataType::Binary) => DataType::Int32,
            (PathSegment::Index(i), dt) => {
                errors.push(TypeError::new(format!(
                    "cannot index [{i}] into {dt} in '{path}'"
                )));
                return None;
            }
            (PathSegment::Field(name), dt) => {
                errors.push(TypeError::new(format!(
                    "type {dt} has no member '{name}' in '{path}'"
                )));
                return None;
            }
        };
    }
    Some(TypedExpr::ColumnRead {
        field_id,
        path: path.segments.clone(),
        data_type,
    })
}

impl Materializer for SchemaMaterializer {
    fn materialize(
        &self,
        expr: &LogicalExpr,
        schema: &Schema,
    ) -> Result<TypedExpr, Vec<TypeError>> {
        let mut errors = Vec::new();
        match self.resolve(expr, schema, &mut errors) {
            Some(typed) if errors.is_empty() => Ok(typed),
            _ => {
                if errors.is_empty() {
                    errors.push(TypeError::new("expression could not be resolved"));
                }
                Err(errors)
            }
        }
    }
}
