//! Runtime: wire a projection operator to its services, drive it to
//! exhaustion, and emit a `RunSummary`.
//!
//! - The engine owns the hard memory budget (`vproj-mem::MemoryBudgetImpl`)
//!   and the allocator built on it; every operator it creates shares them.
//! - The projector compiler is shared too, behind a plan-hash cache unless
//!   `compile_cache` is off.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use vproj_core::budget::MemoryBudget;
use vproj_core::config::ProjectConfig;
use vproj_core::id::OpId;
use vproj_core::types::RowBatch;
use vproj_mem::{BudgetAllocator, MemoryBudgetImpl};
use vproj_operators::{
    BatchSource, CachingCompiler, EventSink, InterpretedCompiler, IterOutcome, OpError,
    ProjectContext, ProjectOperator, ProjectorCompiler, TracingSink,
};
use vproj_planner::functions::FunctionRegistry;
use vproj_planner::{parse_yaml_projection, PlanError, ProjectionSpec, SchemaMaterializer};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("projection: {0}")]
    Plan(#[from] PlanError),
    #[error("operator: {0}")]
    Operator(#[from] OpError),
    #[error("serialization: {0}")]
    Serde(String),
}

/// What one run did. Serializable for logs and tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub op: OpId,
    pub engine_version: String,
    pub pulls: u64,
    pub batches_out: u64,
    pub rows_in: u64,
    pub rows_out: u64,
    pub remainder_pulls: u64,
    /// Pulls that reported `OkNewSchema`.
    pub schema_changes: u64,
    /// Short fingerprints of every write plan installed, in order.
    pub plan_hashes: Vec<String>,
    pub peak_memory_bytes: usize,
    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl RunSummary {
    pub fn to_json(&self) -> Result<String, ExecError> {
        serde_json::to_string_pretty(self).map_err(|e| ExecError::Serde(e.to_string()))
    }
}

/// Engine owns the memory budget, allocator, compiler, and event sink.
pub struct Engine {
    cfg: ProjectConfig,
    budget: MemoryBudgetImpl,
    ctx: ProjectContext,
    next_op: AtomicU64,
}

impl Engine {
    pub fn new(cfg: ProjectConfig) -> Result<Self, ExecError> {
        Self::with_sink(cfg, Arc::new(TracingSink))
    }

    pub fn with_sink(cfg: ProjectConfig, sink: Arc<dyn EventSink>) -> Result<Self, ExecError> {
        cfg.validate().map_err(|e| ExecError::Config(e.to_string()))?;
        let budget = MemoryBudgetImpl::new(cfg.mem_cap_bytes);
        let registry = Arc::new(FunctionRegistry::builtin().clone());
        let interp = InterpretedCompiler::new(Arc::clone(&registry));
        let compiler: Arc<dyn ProjectorCompiler> = if cfg.compile_cache {
            Arc::new(CachingCompiler::new(interp))
        } else {
            Arc::new(interp)
        };
        let ctx = ProjectContext {
            materializer: Arc::new(SchemaMaterializer::new(registry)),
            compiler,
            allocator: Arc::new(BudgetAllocator::new(budget.clone(), cfg.max_batch_rows)),
            sink,
        };
        Ok(Self {
            cfg,
            budget,
            ctx,
            next_op: AtomicU64::new(1),
        })
    }

    /// Engine configured by a YAML projection's `config:` block on top of
    /// `base`, together with the parsed projection.
    pub fn from_yaml(
        base: ProjectConfig,
        yaml_src: &str,
        sink: Arc<dyn EventSink>,
    ) -> Result<(Self, ProjectionSpec), ExecError> {
        let parsed = parse_yaml_projection(yaml_src)?;
        let mut cfg = base;
        parsed.config.apply(&mut cfg);
        Ok((Self::with_sink(cfg, sink)?, parsed.spec))
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.cfg
    }

    pub fn budget(&self) -> &MemoryBudgetImpl {
        &self.budget
    }

    /// Bytes held by live output columns across every operator of this engine.
    pub fn used_bytes(&self) -> usize {
        self.budget.used_bytes()
    }

    /// Build a projection operator over `source`.
    pub fn project<S: BatchSource>(&self, source: S, spec: ProjectionSpec) -> ProjectOperator<S> {
        let id = OpId::new(self.next_op.fetch_add(1, Ordering::Relaxed));
        ProjectOperator::new(id, source, spec, self.cfg.clone(), self.ctx.clone())
    }

    /// Pull until exhaustion, discarding output.
    pub fn run<S: BatchSource>(
        &self,
        source: S,
        spec: ProjectionSpec,
    ) -> Result<RunSummary, ExecError> {
        self.run_with(source, spec, |_| {})
    }

    /// Pull until exhaustion, handing every output batch to `consume`.
    pub fn run_with<S, F>(
        &self,
        source: S,
        spec: ProjectionSpec,
        mut consume: F,
    ) -> Result<RunSummary, ExecError>
    where
        S: BatchSource,
        F: FnMut(&RowBatch),
    {
        let started_ms = now_millis();
        let mut op = self.project(source, spec);
        let mut pulls = 0u64;
        let mut schema_changes = 0u64;
        let mut plan_hashes = Vec::new();

        loop {
            pulls += 1;
            let outcome = op.next()?;
            match outcome {
                IterOutcome::None => break,
                IterOutcome::OkNewSchema => {
                    schema_changes += 1;
                    if let Some(c) = op.compiled() {
                        plan_hashes.push(c.plan_hash.short());
                    }
                }
                IterOutcome::Ok => {}
            }
            consume(op.batch());

            #[cfg(feature = "tracing")]
            tracing::trace!(
                op = %op.id(),
                rows = op.batch().num_rows(),
                remainder = op.has_remainder(),
                used = self.budget.used_bytes(),
                "pulled batch"
            );
        }

        let stats = op.stats();
        Ok(RunSummary {
            op: op.id(),
            engine_version: vproj_core::VERSION.to_string(),
            pulls,
            batches_out: stats.batches_out,
            rows_in: stats.rows_in,
            rows_out: stats.rows_out,
            remainder_pulls: stats.remainder_pulls,
            schema_changes,
            plan_hashes,
            peak_memory_bytes: self.budget.peak_bytes(),
            started_ms,
            finished_ms: now_millis(),
        })
    }
}

// --- helpers ---

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use vproj_core::schema::DataType;
    use vproj_core::types::{Column, Scalar};
    use vproj_operators::{MemorySource, NoopSink};
    use vproj_planner::{LogicalExpr, NamedExpr};

    fn batch(n: i32) -> RowBatch {
        RowBatch::new(vec![Column::new(
            "a",
            DataType::Int32,
            (0..n).map(Scalar::I32).collect(),
        )])
    }

    #[test]
    fn run_counts_rows_and_schema_changes() {
        let engine = Engine::with_sink(ProjectConfig::default(), Arc::new(NoopSink)).unwrap();
        let spec = ProjectionSpec::new(vec![
            NamedExpr::column("a"),
            NamedExpr::new(
                "neg",
                LogicalExpr::call("negate", vec![LogicalExpr::col("a")]),
            ),
        ]);
        let mut seen = 0;
        let summary = engine
            .run_with(MemorySource::new(vec![batch(5), batch(3)]), spec, |b| {
                seen += b.num_rows()
            })
            .unwrap();
        assert_eq!(seen, 8);
        assert_eq!(summary.rows_in, 8);
        assert_eq!(summary.rows_out, 8);
        assert_eq!(summary.schema_changes, 1);
        assert_eq!(summary.plan_hashes.len(), 1);
        // two batches and the final None
        assert_eq!(summary.pulls, 3);
        assert!(summary.peak_memory_bytes > 0);
        assert!(summary.finished_ms >= summary.started_ms);
        assert!(summary.to_json().unwrap().contains("\"rows_out\": 8"));
    }

    #[test]
    fn invalid_config_rejected() {
        let cfg = ProjectConfig {
            max_batch_rows: 0,
            ..Default::default()
        };
        assert!(matches!(Engine::new(cfg), Err(ExecError::Config(_))));
    }

    #[test]
    fn yaml_config_block_applies() {
        let src = "config: { var_width_bytes_per_row: 16 }\nproject: [a]";
        let (engine, spec) =
            Engine::from_yaml(ProjectConfig::default(), src, Arc::new(NoopSink)).unwrap();
        assert_eq!(engine.config().var_width_bytes_per_row, 16);
        assert_eq!(spec.len(), 1);
    }

    #[test]
    fn operator_ids_are_unique() {
        let engine = Engine::with_sink(ProjectConfig::default(), Arc::new(NoopSink)).unwrap();
        let a = engine.project(MemorySource::new(vec![]), ProjectionSpec::wildcard());
        let b = engine.project(MemorySource::new(vec![]), ProjectionSpec::wildcard());
        assert_ne!(a.id(), b.id());
    }
}
