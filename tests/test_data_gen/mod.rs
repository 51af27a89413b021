//! Batch builders shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use vproj_core::config::ProjectConfig;
use vproj_core::id::OpId;
use vproj_core::schema::DataType;
use vproj_core::types::{Column, RowBatch, Scalar};
use vproj_mem::{BudgetAllocator, MemoryBudgetImpl};
use vproj_operators::{
    InterpretedCompiler, MemorySource, ProjectContext, ProjectOperator, RecordingSink,
};
use vproj_planner::{ProjectionSpec, SchemaMaterializer};

pub fn int_column(name: &str, n: usize) -> Column {
    Column::new(name, DataType::Int64, (0..n as i64).map(Scalar::I64).collect())
}

pub fn str_column(name: &str, values: impl IntoIterator<Item = String>) -> Column {
    Column::new(name, DataType::Utf8, values.into_iter().map(Scalar::Str).collect())
}

/// `{a: Int64, b: Utf8}` with `b[i] = "row-i"`.
pub fn int_and_string(n: usize) -> RowBatch {
    RowBatch::new(vec![
        int_column("a", n),
        str_column("b", (0..n).map(|i| format!("row-{i}"))),
    ])
}

/// `{id: Int64, s: Utf8}` where the first `wide` rows carry `wide_len`-byte
/// strings and the rest `narrow_len`-byte strings.
pub fn mixed_width(n: usize, wide: usize, wide_len: usize, narrow_len: usize) -> RowBatch {
    let strings = (0..n).map(|i| {
        let len = if i < wide { wide_len } else { narrow_len };
        let digit = char::from(b'a' + (i % 26) as u8);
        std::iter::repeat(digit).take(len).collect::<String>()
    });
    RowBatch::new(vec![int_column("id", n), str_column("s", strings)])
}

pub struct Harness {
    pub budget: MemoryBudgetImpl,
    pub sink: Arc<RecordingSink>,
    pub ctx: ProjectContext,
}

impl Harness {
    pub fn new(mem_cap: usize) -> Self {
        let budget = MemoryBudgetImpl::new(mem_cap);
        let sink = Arc::new(RecordingSink::new());
        let ctx = ProjectContext {
            materializer: Arc::new(SchemaMaterializer::default()),
            compiler: Arc::new(InterpretedCompiler::default()),
            allocator: Arc::new(BudgetAllocator::new(budget.clone(), 1 << 16)),
            sink: sink.clone(),
        };
        Self { budget, sink, ctx }
    }

    pub fn operator(
        &self,
        batches: Vec<RowBatch>,
        spec: ProjectionSpec,
        config: ProjectConfig,
    ) -> ProjectOperator<MemorySource> {
        self.operator_over(MemorySource::new(batches), spec, config)
    }

    pub fn operator_over(
        &self,
        source: MemorySource,
        spec: ProjectionSpec,
        config: ProjectConfig,
    ) -> ProjectOperator<MemorySource> {
        ProjectOperator::new(OpId::new(1), source, spec, config, self.ctx.clone())
    }
}

/// Config with a given variable-width growth hint.
pub fn hint(bytes_per_row: usize) -> ProjectConfig {
    ProjectConfig {
        var_width_bytes_per_row: bytes_per_row,
        ..Default::default()
    }
}
