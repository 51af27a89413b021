//! Projection operator.
//!
//! Pulls batches from an upstream `BatchSource` and emits exactly the
//! requested columns. Each output column is either a zero-copy transfer of an
//! input column or the result of a compiled expression routine. When an
//! evaluation column runs out of room, the batch is finished over several
//! pulls (see `remainder`).
//!
//! Ownership:
//! - the operator owns its output `RowBatch`; it is replaced on every pull;
//! - transferred columns are moved out of the upstream batch after the
//!   routine ran over it. While a remainder is pending, the input slot keeps
//!   a handle on the same storage so later passes can read and emit the
//!   remaining rows;
//! - a fully consumed upstream batch is cleared.

pub mod eval;
pub mod remainder;
pub mod setup;
pub mod transfer;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use vproj_core::config::ProjectConfig;
use vproj_core::error::Error as CoreError;
use vproj_core::id::OpId;
use vproj_core::schema::Schema;
use vproj_core::types::{Column, RowBatch};
use vproj_mem::ColumnAllocator;
use vproj_planner::{Materializer, ProjectionSpec};

use crate::codegen::ProjectorCompiler;
use crate::events::{EventSink, ProjectEvent};
use crate::traits::{BatchSource, IterOutcome, OpError};

use remainder::{ExecState, PassOutcome};
use setup::{CompiledProjection, OutputSlot, SchemaCompiler};

pub use remainder::outcome;
pub use transfer::{TransferBinding, TransferDecider};

/// Shared services an operator is built with.
#[derive(Clone)]
pub struct ProjectContext {
    pub materializer: Arc<dyn Materializer>,
    pub compiler: Arc<dyn ProjectorCompiler>,
    pub allocator: Arc<dyn ColumnAllocator>,
    pub sink: Arc<dyn EventSink>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStats {
    pub batches_in: u64,
    pub batches_out: u64,
    pub rows_in: u64,
    pub rows_out: u64,
    pub remainder_pulls: u64,
    pub recompiles: u64,
    /// Column transfers performed (one per transferred column per pass).
    pub transfers: u64,
    /// Evaluation columns filled (one per computed column per pass).
    pub evals: u64,
}

pub struct ProjectOperator<S> {
    id: OpId,
    upstream: S,
    spec: ProjectionSpec,
    config: ProjectConfig,
    ctx: ProjectContext,
    compiled: Option<CompiledProjection>,
    state: ExecState,
    output: RowBatch,
    stats: ProjectStats,
    aborted: bool,
}

impl<S: BatchSource> ProjectOperator<S> {
    pub fn new(
        id: OpId,
        upstream: S,
        spec: ProjectionSpec,
        config: ProjectConfig,
        ctx: ProjectContext,
    ) -> Self {
        Self {
            id,
            upstream,
            spec,
            config,
            ctx,
            compiled: None,
            state: ExecState::Normal,
            output: RowBatch::empty(),
            stats: ProjectStats::default(),
            aborted: false,
        }
    }

    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn stats(&self) -> ProjectStats {
        self.stats
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    pub fn has_remainder(&self) -> bool {
        self.state.has_remainder()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn compiled(&self) -> Option<&CompiledProjection> {
        self.compiled.as_ref()
    }

    pub fn upstream(&self) -> &S {
        &self.upstream
    }

    pub fn into_upstream(self) -> S {
        self.upstream
    }

    /// Rebuild the projection for the upstream's current schema. Any pending
    /// remainder is discarded.
    pub fn schema_changed(&mut self) -> Result<(), OpError> {
        if self.aborted {
            return Err(OpError::Aborted);
        }
        if let ExecState::Remainder { offset } = self.state {
            self.ctx.sink.emit(&ProjectEvent::RemainderDiscarded {
                op: self.id,
                offset,
            });
            self.upstream.batch_mut().clear();
        }
        self.state = ExecState::Normal;
        self.output = RowBatch::empty();
        let schema = self.upstream.schema();
        let res = self.install(&schema);
        self.check(res)
    }

    fn check<T>(&mut self, res: Result<T, OpError>) -> Result<T, OpError> {
        if let Err(e) = &res {
            self.abort(e);
        }
        res
    }

    fn abort(&mut self, err: &OpError) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        self.state = ExecState::Normal;
        self.output = RowBatch::empty();
        #[cfg(feature = "tracing")]
        tracing::warn!(op = %self.id, error = %err, "projection aborted");
        self.ctx.sink.emit(&ProjectEvent::Aborted {
            op: self.id,
            error: err.to_string(),
        });
    }

    fn install(&mut self, schema: &Schema) -> Result<(), OpError> {
        let compiler = SchemaCompiler::new(
            self.ctx.materializer.as_ref(),
            self.ctx.compiler.as_ref(),
            self.config.enable_transfers,
        );
        match compiler.compile(schema, &self.spec) {
            Ok(compiled) => {
                self.ctx.sink.emit(&ProjectEvent::Compiled {
                    op: self.id,
                    plan: compiled.plan_hash,
                    transfers: compiled.transfer_count(),
                    evals: compiled.eval_count(),
                    wildcard: compiled.wildcard,
                });
                self.compiled = Some(compiled);
                self.state = ExecState::Normal;
                self.stats.recompiles += 1;
                Ok(())
            }
            Err(e) => {
                // never run a routine bound to a superseded schema
                if matches!(e, OpError::Compile(_)) {
                    self.compiled = None;
                }
                Err(e)
            }
        }
    }

    fn pull(&mut self) -> Result<IterOutcome, OpError> {
        if let ExecState::Remainder { offset } = self.state {
            self.stats.remainder_pulls += 1;
            self.run_pass(offset)?;
            return Ok(IterOutcome::Ok);
        }

        let upstream = self.upstream.next()?;
        if upstream == IterOutcome::None {
            self.output = RowBatch::empty();
            return Ok(IterOutcome::None);
        }

        let schema = self.upstream.schema();
        let stale = match &self.compiled {
            Some(c) => upstream == IterOutcome::OkNewSchema || c.input_schema != schema,
            None => true,
        };
        if stale {
            self.install(&schema)?;
        }

        self.stats.batches_in += 1;
        self.stats.rows_in += self.upstream.batch().num_rows() as u64;
        self.run_pass(0)?;
        Ok(if stale {
            IterOutcome::OkNewSchema
        } else {
            IterOutcome::Ok
        })
    }

    /// Run the compiled routine over `[start, rows)` of the upstream batch
    /// and publish the result as the output batch.
    fn run_pass(&mut self, start: usize) -> Result<(), OpError> {
        let Self {
            id,
            upstream,
            config,
            ctx,
            compiled,
            state,
            output,
            stats,
            ..
        } = self;
        let compiled = compiled.as_ref().ok_or_else(|| {
            OpError::Storage(CoreError::Invariant("no compiled projection".into()))
        })?;

        // Release the previous output before sizing the new one.
        *output = RowBatch::empty();

        let input = upstream.batch_mut();
        let end = input.num_rows();
        let rows = end.saturating_sub(start);

        let widths = vec![config.var_width_bytes_per_row; compiled.eval_fields.len()];
        let mut evals = allocate_evals(ctx, compiled, rows, &widths)?;
        let written = compiled
            .projector
            .project_records(input, &mut evals, start, end)?;
        let mut pass = remainder::outcome(start, end, written)?;
        if pass.emitted() == 0 && rows > 0 {
            // Row `start` is wider than a whole buffer. Measure it and give
            // it a pass of its own.
            drop(evals);
            let widths = measure_row(compiled, input, start)?;
            #[cfg(feature = "tracing")]
            tracing::debug!(op = %id, row = start, ?widths, "sizing a single wide row");
            evals = allocate_evals(ctx, compiled, 1, &widths)?;
            let written = compiled
                .projector
                .project_records(input, &mut evals, start, start + 1)?;
            if written != start + 1 {
                return Err(OpError::Storage(CoreError::Invariant(format!(
                    "row {start} does not fit a buffer sized from its own width"
                ))));
            }
            pass = remainder::outcome(start, end, written)?;
        }

        let emitted = pass.emitted();
        for col in &mut evals {
            col.set_value_count(emitted)?;
        }

        let selection = if compiled.wildcard {
            input.take_selection()
        } else {
            None
        };

        let mut evals: Vec<Option<Column>> = evals.into_iter().map(Some).collect();
        let mut columns = Vec::with_capacity(compiled.layout.len());
        for slot in &compiled.layout {
            match slot {
                OutputSlot::Eval(i) => {
                    let col = evals.get_mut(*i).and_then(Option::take).ok_or_else(|| {
                        OpError::Storage(CoreError::Invariant(format!(
                            "evaluation slot {i} missing"
                        )))
                    })?;
                    columns.push(col);
                }
                OutputSlot::Transfer(binding) => {
                    let src = input.column_mut(binding.source.index()).ok_or_else(|| {
                        OpError::Storage(CoreError::Invariant(format!(
                            "transfer source {} missing from input batch",
                            binding.source
                        )))
                    })?;
                    let kept = pass.is_pending().then(|| src.clone());
                    let mut moved = src.transfer_to(binding.dest.clone());
                    moved.slide(start);
                    if let Some(copy) = kept {
                        *src = copy;
                    }
                    columns.push(moved);
                }
            }
        }

        let mut batch = RowBatch::new(columns);
        batch = match selection {
            Some(sel) => batch.with_selection(sel),
            None => {
                batch.set_row_count(emitted);
                batch
            }
        };
        *output = batch;

        stats.batches_out += 1;
        stats.rows_out += emitted as u64;
        stats.transfers += compiled.transfer_count() as u64;
        stats.evals += compiled.eval_count() as u64;

        ctx.sink.emit(&ProjectEvent::BatchEmitted {
            op: *id,
            start,
            rows: emitted,
            complete: !pass.is_pending(),
        });
        match pass {
            PassOutcome::Complete { .. } => input.clear(),
            PassOutcome::Pending { offset, .. } => ctx.sink.emit(&ProjectEvent::RemainderPending {
                op: *id,
                offset,
            }),
        }
        *state = pass.next_state();
        Ok(())
    }
}

/// One empty output column per evaluation slot, `widths[i]` bytes per row.
fn allocate_evals(
    ctx: &ProjectContext,
    compiled: &CompiledProjection,
    rows: usize,
    widths: &[usize],
) -> Result<Vec<Column>, OpError> {
    compiled
        .eval_fields
        .iter()
        .zip(widths)
        .map(|(field, &width)| {
            ctx.allocator
                .allocate(field, rows, width)
                .map_err(|source| OpError::Alloc {
                    column: field.name.clone(),
                    source,
                })
        })
        .collect()
}

/// Variable-width bytes each evaluation slot produces for `row`.
fn measure_row(
    compiled: &CompiledProjection,
    input: &RowBatch,
    row: usize,
) -> Result<Vec<usize>, OpError> {
    let mut scratch: Vec<Column> = compiled
        .eval_fields
        .iter()
        .map(|f| Column::with_capacity(f, 1, None))
        .collect();
    compiled
        .projector
        .project_records(input, &mut scratch, row, row + 1)?;
    Ok(scratch.iter().map(|c| c.bytes_used().max(1)).collect())
}

impl<S: BatchSource> BatchSource for ProjectOperator<S> {
    fn next(&mut self) -> Result<IterOutcome, OpError> {
        if self.aborted {
            return Err(OpError::Aborted);
        }
        let res = self.pull();
        self.check(res)
    }

    fn schema(&self) -> Schema {
        match &self.compiled {
            Some(c) => c.output_schema.clone(),
            None => Schema::empty(),
        }
    }

    fn batch(&self) -> &RowBatch {
        &self.output
    }

    fn batch_mut(&mut self) -> &mut RowBatch {
        &mut self.output
    }
}
