//! Schema compiler: rebuilds the projection for a new input schema.
//!
//! Materialize every entry, route each one through the transfer decider or
//! the evaluator binding, lay the output out in declaration order, and
//! compile the evaluation routine. Either everything succeeds and a complete
//! `CompiledProjection` is returned, or nothing is.

use std::sync::Arc;

use vproj_core::error::Error as CoreError;
use vproj_core::hash::Hash256;
use vproj_core::id::FieldId;
use vproj_core::schema::{Field, Schema, SelectionVectorMode};
use vproj_planner::{Materializer, ProjectionSpec, TypedExpr};

use crate::codegen::{ExecutableProjector, ProjectorCompiler, WritePlan};
use crate::project::eval::EvalBinding;
use crate::project::transfer::{TransferBinding, TransferDecider};
use crate::traits::{EntryError, OpError};

/// Where output column `i` comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSlot {
    Transfer(TransferBinding),
    /// Index into the evaluation outputs of the compiled routine.
    Eval(usize),
}

pub struct CompiledProjection {
    pub input_schema: Schema,
    pub output_schema: Schema,
    pub layout: Vec<OutputSlot>,
    pub eval_fields: Vec<Field>,
    pub projector: Arc<dyn ExecutableProjector>,
    pub plan_hash: Hash256,
    /// `*` projection: every input column is transferred, selection included.
    pub wildcard: bool,
}

impl CompiledProjection {
    pub fn transfers(&self) -> impl Iterator<Item = &TransferBinding> {
        self.layout.iter().filter_map(|s| match s {
            OutputSlot::Transfer(b) => Some(b),
            OutputSlot::Eval(_) => None,
        })
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers().count()
    }

    pub fn eval_count(&self) -> usize {
        self.eval_fields.len()
    }
}

impl std::fmt::Debug for CompiledProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledProjection")
            .field("output_schema", &self.output_schema)
            .field("layout", &self.layout)
            .field("plan_hash", &self.plan_hash.short())
            .field("wildcard", &self.wildcard)
            .finish()
    }
}

pub struct SchemaCompiler<'a> {
    materializer: &'a dyn Materializer,
    compiler: &'a dyn ProjectorCompiler,
    enable_transfers: bool,
}

impl<'a> SchemaCompiler<'a> {
    pub fn new(
        materializer: &'a dyn Materializer,
        compiler: &'a dyn ProjectorCompiler,
        enable_transfers: bool,
    ) -> Self {
        Self {
            materializer,
            compiler,
            enable_transfers,
        }
    }

    pub fn compile(
        &self,
        input: &Schema,
        spec: &ProjectionSpec,
    ) -> Result<CompiledProjection, OpError> {
        if spec.is_any_wildcard() {
            self.compile_wildcard(input)
        } else {
            self.compile_explicit(input, spec)
        }
    }

    fn compile_wildcard(&self, input: &Schema) -> Result<CompiledProjection, OpError> {
        let layout = input
            .fields
            .iter()
            .enumerate()
            .map(|(idx, f)| {
                let source = FieldId::from_index(idx).ok_or_else(|| {
                    CoreError::Schema(format!("column {idx} beyond the addressable range"))
                })?;
                Ok(OutputSlot::Transfer(TransferBinding {
                    source,
                    dest: f.name.clone(),
                }))
            })
            .collect::<Result<Vec<_>, CoreError>>()?;
        let plan = WritePlan::new(input.clone());
        let projector = self.compiler.compile(&plan)?;
        Ok(CompiledProjection {
            input_schema: input.clone(),
            output_schema: input.clone(),
            layout,
            eval_fields: vec![],
            projector,
            plan_hash: plan.fingerprint()?,
            wildcard: true,
        })
    }

    fn compile_explicit(
        &self,
        input: &Schema,
        spec: &ProjectionSpec,
    ) -> Result<CompiledProjection, OpError> {
        let mut typed: Vec<TypedExpr> = Vec::with_capacity(spec.len());
        let mut failures = Vec::new();
        for (index, entry) in spec.exprs.iter().enumerate() {
            match self.materializer.materialize(&entry.expr, input) {
                Ok(t) => typed.push(t),
                Err(errors) => failures.push(EntryError {
                    index,
                    name: entry.name.clone(),
                    errors,
                }),
            }
        }
        if !failures.is_empty() {
            return Err(OpError::SchemaResolution(failures));
        }

        let mut decider = TransferDecider::new(input, self.enable_transfers);
        let mut binding = EvalBinding::new(input.clone());
        let mut layout = Vec::with_capacity(spec.len());
        let mut fields = Vec::with_capacity(spec.len());
        for (entry, expr) in spec.exprs.iter().zip(typed) {
            match decider.decide(&entry.name, &expr) {
                Some(t) => {
                    let src = input.field_by_id(t.source).ok_or_else(|| {
                        OpError::Storage(vproj_core::error::Error::Invariant(format!(
                            "transfer source {} outside input schema",
                            t.source
                        )))
                    })?;
                    fields.push(src.with_name(&entry.name));
                    layout.push(OutputSlot::Transfer(t));
                }
                None => {
                    let (field, slot) = binding.bind(&entry.name, expr);
                    fields.push(field);
                    layout.push(OutputSlot::Eval(slot));
                }
            }
        }

        let eval_fields = binding.fields();
        let (plan, projector) = binding.compile(self.compiler)?;
        Ok(CompiledProjection {
            input_schema: input.clone(),
            // evaluation writes dense rows; the selection vector stops here
            output_schema: Schema::new(fields).with_selection(SelectionVectorMode::None),
            layout,
            eval_fields,
            projector,
            plan_hash: plan.fingerprint()?,
            wildcard: false,
        })
    }
}
