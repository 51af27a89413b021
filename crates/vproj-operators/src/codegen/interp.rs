//! Default compiler: each typed expression becomes a tree of boxed closures.

use std::collections::HashSet;
use std::sync::Arc;

use vproj_core::types::{Column, RowBatch, Scalar};
use vproj_planner::functions::{cast_scalar, FunctionRegistry};
use vproj_planner::typed::read_path;
use vproj_planner::{EvalError, TypedExpr};

use super::{CompileError, ExecutableProjector, ProjectorCompiler, WritePlan};

type RowFn = Box<dyn Fn(&RowBatch, usize) -> Result<Scalar, EvalError> + Send + Sync>;

struct SlotWriter {
    slot: usize,
    eval: RowFn,
}

pub struct InterpretedProjector {
    writers: Vec<SlotWriter>,
}

impl ExecutableProjector for InterpretedProjector {
    fn project_records(
        &self,
        input: &RowBatch,
        outputs: &mut [Column],
        start: usize,
        end: usize,
    ) -> Result<usize, EvalError> {
        if outputs.len() < self.writers.len() {
            return Err(EvalError::Write {
                column: String::from("<outputs>"),
                reason: format!(
                    "routine writes {} slots, {} columns supplied",
                    self.writers.len(),
                    outputs.len()
                ),
            });
        }
        for row in start..end {
            for w in &self.writers {
                let value = (w.eval)(input, row)?;
                let out = &mut outputs[w.slot];
                match out.try_set(row - start, value) {
                    Ok(true) => {}
                    Ok(false) => return Ok(row),
                    Err(e) => {
                        return Err(EvalError::Write {
                            column: out.name.clone(),
                            reason: e.to_string(),
                        })
                    }
                }
            }
        }
        Ok(end)
    }

    fn slots(&self) -> usize {
        self.writers.len()
    }
}

#[derive(Debug, Clone)]
pub struct InterpretedCompiler {
    registry: Arc<FunctionRegistry>,
}

impl Default for InterpretedCompiler {
    fn default() -> Self {
        Self::new(Arc::new(FunctionRegistry::builtin().clone()))
    }
}

impl InterpretedCompiler {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self { registry }
    }

    fn build(&self, slot: usize, fields: usize, expr: &TypedExpr) -> Result<RowFn, CompileError> {
        let f: RowFn = match expr {
            TypedExpr::ColumnRead { field_id, path, .. } => {
                let idx = field_id.index();
                if idx >= fields {
                    return Err(CompileError::FieldOutOfRange {
                        slot,
                        field: *field_id,
                    });
                }
                let path = path.clone();
                Box::new(move |batch: &RowBatch, row: usize| {
                    let value = batch
                        .value(idx, row)
                        .ok_or(EvalError::MissingInput { field: idx, row })?;
                    if path.is_empty() {
                        Ok(value.clone())
                    } else {
                        Ok(read_path(value, &path))
                    }
                })
            }
            TypedExpr::Literal { value, .. } => {
                let value = value.clone();
                Box::new(move |_: &RowBatch, _: usize| Ok(value.clone()))
            }
            TypedExpr::Cast { expr, data_type } => {
                let inner = self.build(slot, fields, expr)?;
                let to = *data_type;
                Box::new(move |batch: &RowBatch, row: usize| cast_scalar(&inner(batch, row)?, to))
            }
            TypedExpr::Call { func, args, .. } => {
                let function = self
                    .registry
                    .get(func)
                    .cloned()
                    .ok_or_else(|| CompileError::UnknownFunction {
                        slot,
                        func: func.clone(),
                    })?;
                if !function.arity.accepts(args.len()) {
                    return Err(CompileError::Arity {
                        slot,
                        func: func.clone(),
                        expected: function.arity.to_string(),
                        got: args.len(),
                    });
                }
                let args = args
                    .iter()
                    .map(|a| self.build(slot, fields, a))
                    .collect::<Result<Vec<_>, _>>()?;
                Box::new(move |batch: &RowBatch, row: usize| {
                    let values = args
                        .iter()
                        .map(|a| a(batch, row))
                        .collect::<Result<Vec<_>, _>>()?;
                    function.invoke(&values)
                })
            }
        };
        Ok(f)
    }
}

impl ProjectorCompiler for InterpretedCompiler {
    fn compile(&self, plan: &WritePlan) -> Result<Arc<dyn ExecutableProjector>, CompileError> {
        let fields = plan.input_schema.len();
        let mut seen = HashSet::new();
        let mut writers = Vec::with_capacity(plan.writes.len());
        for w in &plan.writes {
            if w.slot >= plan.writes.len() || !seen.insert(w.slot) {
                return Err(CompileError::BadSlot { slot: w.slot });
            }
            let actual = w.expr.data_type();
            if actual != w.field.data_type {
                return Err(CompileError::TypeMismatch {
                    slot: w.slot,
                    column: w.field.name.clone(),
                    expected: w.field.data_type,
                    actual,
                });
            }
            writers.push(SlotWriter {
                slot: w.slot,
                eval: self.build(w.slot, fields, &w.expr)?,
            });
        }
        Ok(Arc::new(InterpretedProjector { writers }))
    }
}
