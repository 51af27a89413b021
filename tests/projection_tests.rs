//! End-to-end behaviour of the projection operator over in-memory upstreams.

mod test_data_gen;

use test_data_gen::*;
use vproj_core::budget::MemoryBudget;
use vproj_core::config::ProjectConfig;
use vproj_core::schema::DataType;
use vproj_core::types::{Column, RowBatch, Scalar};
use vproj_operators::{BatchSource, IterOutcome, MemorySource, OpError, OutputSlot, ProjectEvent};
use vproj_planner::{LogicalExpr, NamedExpr, ProjectionSpec, SchemaPath};

fn upper(col: &str) -> LogicalExpr {
    LogicalExpr::call("upper", vec![LogicalExpr::col(col)])
}

fn length(col: &str) -> LogicalExpr {
    LogicalExpr::call("length", vec![LogicalExpr::col(col)])
}

/// Pull until the upstream is drained, collecting every logical output row.
fn drain<S: BatchSource>(op: &mut S) -> (Vec<Vec<Scalar>>, Vec<usize>) {
    let mut rows = Vec::new();
    let mut passes = Vec::new();
    while op.next().unwrap() != IterOutcome::None {
        let batch = op.batch();
        passes.push(batch.num_rows());
        for r in 0..batch.num_rows() {
            rows.push(batch.row(r).unwrap());
        }
    }
    (rows, passes)
}

#[test]
fn test_row_count_and_order_survive_remainders() {
    let h = Harness::new(1 << 24);
    let input = mixed_width(50, 50, 9, 9);
    let expected: Vec<Vec<Scalar>> = (0..50).map(|r| input.row(r).unwrap()).collect();

    let spec = ProjectionSpec::new(vec![
        NamedExpr::column("id"),
        NamedExpr::column("s"),
        NamedExpr::new("u", upper("s")),
        NamedExpr::new("n", length("s")),
    ]);
    let mut op = h.operator(vec![input], spec, hint(4));
    let (rows, passes) = drain(&mut op);

    assert!(passes.len() > 1, "hint of 4 bytes must force remainders");
    assert_eq!(passes.iter().sum::<usize>(), 50);
    assert_eq!(rows.len(), 50);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row[0], expected[i][0], "id at row {i}");
        assert_eq!(row[1], expected[i][1], "transferred s at row {i}");
        let Scalar::Str(s) = &expected[i][1] else {
            panic!("expected a string at row {i}");
        };
        assert_eq!(row[2], Scalar::Str(s.to_uppercase()));
        assert_eq!(row[3], Scalar::I32(9));
    }
}

#[test]
fn test_transferred_column_not_truncated_in_storage() {
    let h = Harness::new(1 << 24);
    let spec = ProjectionSpec::new(vec![
        NamedExpr::column("id"),
        NamedExpr::new("u", upper("s")),
    ]);
    // 8-byte strings, 4 bytes of room per row: 5 of 10 rows fit
    let mut op = h.operator(vec![mixed_width(10, 10, 8, 8)], spec, hint(4));

    assert_eq!(op.next().unwrap(), IterOutcome::OkNewSchema);
    let batch = op.batch();
    assert_eq!(batch.num_rows(), 5);
    assert_eq!(batch.columns[0].len(), 10);
    assert_eq!(batch.columns[1].len(), 5);
    assert!(op.has_remainder());
}

#[test]
fn test_pending_transfer_shares_input_storage() {
    let h = Harness::new(1 << 24);
    let spec = ProjectionSpec::new(vec![
        NamedExpr::column("id"),
        NamedExpr::new("u", upper("s")),
    ]);
    let mut op = h.operator(vec![mixed_width(10, 10, 8, 8)], spec, hint(4));

    assert_eq!(op.next().unwrap(), IterOutcome::OkNewSchema);
    assert!(op.has_remainder());
    let out_id = &op.batch().columns[0];
    let in_id = &op.upstream().batch().columns[0];
    assert!(out_id.shares_storage(in_id), "pending input holds a second copy");
    assert_eq!(in_id.stored_len(), 10);
    assert_eq!(in_id.reserved_bytes(), 0);

    assert_eq!(op.next().unwrap(), IterOutcome::Ok);
    assert!(op.batch().columns[0].shares_storage(&op.upstream().batch().columns[0]));
    assert_eq!(op.batch().value(0, 0), Some(&Scalar::I64(5)));
}

#[test]
fn test_row_wider_than_any_hinted_buffer() {
    let h = Harness::new(1 << 26);
    let wide = 250 * 65_536 + 1;
    let input = RowBatch::new(vec![
        int_column("id", 3),
        str_column("s", ["x".repeat(wide), "b".into(), "c".into()]),
    ]);
    let spec = ProjectionSpec::new(vec![
        NamedExpr::column("id"),
        NamedExpr::new("n", length("s")),
        NamedExpr::new("u", upper("s")),
    ]);
    let mut op = h.operator(vec![input], spec, ProjectConfig::default());

    assert_eq!(op.next().unwrap(), IterOutcome::OkNewSchema);
    assert_eq!(op.batch().num_rows(), 1);
    assert_eq!(op.batch().value(1, 0), Some(&Scalar::I32(wide as i32)));
    assert_eq!(op.batch().columns[2].bytes_used(), wide);
    assert!(op.has_remainder());

    assert_eq!(op.next().unwrap(), IterOutcome::Ok);
    assert_eq!(op.batch().num_rows(), 2);
    assert_eq!(op.batch().value(2, 1), Some(&Scalar::Str("C".into())));
    assert!(!op.has_remainder());
    assert_eq!(op.next().unwrap(), IterOutcome::None);
    assert_eq!(h.budget.used_bytes(), 0);
}

#[test]
fn test_wide_row_beyond_budget_is_an_alloc_error() {
    let h = Harness::new(1 << 20);
    let input = RowBatch::new(vec![str_column("s", ["y".repeat(2 << 20)])]);
    let spec = ProjectionSpec::new(vec![NamedExpr::new("u", upper("s"))]);
    let mut op = h.operator(vec![input], spec, ProjectConfig::default());
    assert!(matches!(op.next(), Err(OpError::Alloc { ref column, .. }) if column == "u"));
    assert_eq!(h.budget.used_bytes(), 0);
}

#[test]
fn test_wildcard_transfers_every_column() {
    let h = Harness::new(1 << 24);
    let input = int_and_string(5);
    let expected = input.clone();
    let mut op = h.operator(vec![input], ProjectionSpec::wildcard(), ProjectConfig::default());

    assert_eq!(op.next().unwrap(), IterOutcome::OkNewSchema);
    let compiled = op.compiled().unwrap();
    assert!(compiled.wildcard);
    assert_eq!(compiled.transfer_count(), 2);
    assert_eq!(compiled.eval_count(), 0);

    let out = op.batch();
    assert_eq!(out.num_rows(), 5);
    assert_eq!(out.schema(), expected.schema());
    for r in 0..5 {
        assert_eq!(out.row(r), expected.row(r));
    }
    // nothing evaluated, nothing allocated
    assert_eq!(h.budget.peak_bytes(), 0);
}

#[test]
fn test_duplicate_source_transfers_once() {
    let h = Harness::new(1 << 24);
    let spec = ProjectionSpec::new(vec![
        NamedExpr::new("x", LogicalExpr::col("a")),
        NamedExpr::new("y", LogicalExpr::col("a")),
    ]);
    let mut op = h.operator(vec![int_and_string(6)], spec, ProjectConfig::default());
    op.next().unwrap();

    let compiled = op.compiled().unwrap();
    assert_eq!(compiled.transfer_count(), 1);
    assert_eq!(compiled.eval_count(), 1);
    assert!(matches!(compiled.layout[0], OutputSlot::Transfer(_)));
    assert_eq!(compiled.layout[1], OutputSlot::Eval(0));

    let out = op.batch();
    assert_eq!(out.columns[0].values(), out.columns[1].values());
    assert_eq!(out.columns[0].values().len(), 6);
    // only the evaluated copy is charged to the budget
    assert_eq!(out.columns[0].reserved_bytes(), 0);
    assert!(out.columns[1].reserved_bytes() > 0);
}

#[test]
fn test_duplicate_source_survives_remainder() {
    let h = Harness::new(1 << 24);
    let spec = ProjectionSpec::new(vec![
        NamedExpr::new("x", LogicalExpr::col("s")),
        NamedExpr::new("y", LogicalExpr::col("s")),
    ]);
    let mut op = h.operator(vec![mixed_width(12, 12, 8, 8)], spec, hint(4));
    let (rows, passes) = drain(&mut op);
    assert!(passes.len() > 1);
    assert_eq!(rows.len(), 12);
    for row in rows {
        assert_eq!(row[0], row[1]);
    }
}

#[test]
fn test_remainder_resumes_where_it_stopped() {
    let h = Harness::new(1 << 24);
    let spec = ProjectionSpec::new(vec![
        NamedExpr::column("id"),
        NamedExpr::new("u", upper("s")),
    ]);
    // 400 rows of 10 bytes fill the first 4000-byte buffer exactly; the
    // remaining 600 rows of 4 bytes fill the second one exactly
    let input = mixed_width(1000, 400, 10, 4);
    let row_400 = input.value(1, 400).cloned().unwrap();
    let mut op = h.operator(vec![input, mixed_width(3, 0, 1, 1)], spec, hint(4));

    assert_eq!(op.next().unwrap(), IterOutcome::OkNewSchema);
    assert_eq!(op.batch().num_rows(), 400);
    assert!(op.has_remainder());
    assert_eq!(op.upstream().pulls(), 1);

    assert_eq!(op.next().unwrap(), IterOutcome::Ok);
    assert_eq!(op.batch().num_rows(), 600);
    assert!(!op.has_remainder());
    assert_eq!(op.upstream().pulls(), 1, "continuation must not pull");
    assert_eq!(op.batch().value(0, 0), Some(&Scalar::I64(400)));
    let Scalar::Str(s) = row_400 else {
        panic!("row 400 is a string");
    };
    assert_eq!(op.batch().value(1, 0), Some(&Scalar::Str(s.to_uppercase())));

    // fresh input is accepted once the remainder cleared
    assert_eq!(op.next().unwrap(), IterOutcome::Ok);
    assert_eq!(op.batch().num_rows(), 3);
    assert_eq!(op.upstream().pulls(), 2);

    let pending: Vec<_> = h
        .sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ProjectEvent::RemainderPending { offset, .. } => Some(offset),
            _ => None,
        })
        .collect();
    assert_eq!(pending, vec![400]);
    assert_eq!(op.stats().remainder_pulls, 1);
}

#[test]
fn test_schema_change_discards_remainder() {
    let h = Harness::new(1 << 24);
    let spec = ProjectionSpec::new(vec![
        NamedExpr::new("len", length("s")),
        NamedExpr::new("u", upper("s")),
    ]);
    let second = RowBatch::new(vec![
        str_column("s", ["x", "yy", "zzz"].map(String::from)),
        int_column("extra", 3),
    ]);
    let mut op = h.operator(vec![mixed_width(10, 10, 8, 8), second], spec, hint(4));

    op.next().unwrap();
    assert!(op.has_remainder());

    op.schema_changed().unwrap();
    assert!(!op.has_remainder());
    assert_eq!(op.batch().num_rows(), 0);
    assert_eq!(h.sink.count("project.remainder_discarded"), 1);

    assert_eq!(op.next().unwrap(), IterOutcome::OkNewSchema);
    let out = op.batch();
    assert_eq!(out.num_rows(), 3);
    let lens: Vec<_> = (0..3).map(|r| out.value(0, r).cloned().unwrap()).collect();
    assert_eq!(lens, vec![Scalar::I32(1), Scalar::I32(2), Scalar::I32(3)]);
    assert_eq!(out.value(1, 2), Some(&Scalar::Str("ZZZ".into())));
    assert_eq!(op.stats().recompiles, 3);
    assert_eq!(op.next().unwrap(), IterOutcome::None);
}

#[test]
fn test_selection_vector_forces_evaluation() {
    let h = Harness::new(1 << 24);
    let input = int_and_string(5).with_selection(vec![4, 2, 0]);
    let spec = ProjectionSpec::new(vec![NamedExpr::column("a"), NamedExpr::column("b")]);
    let mut op = h.operator(vec![input], spec, ProjectConfig::default());
    op.next().unwrap();

    let compiled = op.compiled().unwrap();
    assert_eq!(compiled.transfer_count(), 0);
    assert_eq!(compiled.eval_count(), 2);

    let out = op.batch();
    assert!(out.selection().is_none());
    assert_eq!(out.num_rows(), 3);
    assert_eq!(out.columns[0].values(), &[Scalar::I64(4), Scalar::I64(2), Scalar::I64(0)]);
    assert_eq!(out.value(1, 1), Some(&Scalar::Str("row-2".into())));
}

#[test]
fn test_wildcard_carries_selection_vector() {
    let h = Harness::new(1 << 24);
    let input = int_and_string(5).with_selection(vec![3, 1]);
    let mut op = h.operator(vec![input], ProjectionSpec::wildcard(), ProjectConfig::default());
    op.next().unwrap();

    let out = op.batch();
    assert_eq!(out.selection(), Some(&[3u32, 1][..]));
    assert_eq!(out.num_rows(), 2);
    assert_eq!(out.value(0, 0), Some(&Scalar::I64(3)));
    assert_eq!(out.value(1, 1), Some(&Scalar::Str("row-1".into())));
}

#[test]
fn test_transfers_can_be_disabled() {
    let h = Harness::new(1 << 24);
    let config = ProjectConfig {
        enable_transfers: false,
        ..Default::default()
    };
    let spec = ProjectionSpec::new(vec![NamedExpr::column("a"), NamedExpr::column("b")]);
    let mut op = h.operator(vec![int_and_string(4)], spec, config);
    op.next().unwrap();
    assert_eq!(op.compiled().unwrap().transfer_count(), 0);
    assert_eq!(op.batch().num_rows(), 4);
    assert_eq!(op.batch().value(0, 3), Some(&Scalar::I64(3)));
}

#[test]
fn test_computed_fields_are_nullable_and_typed() {
    let h = Harness::new(1 << 24);
    let spec = ProjectionSpec::new(vec![
        NamedExpr::new("a_id", LogicalExpr::col("a")),
        NamedExpr::new(
            "half",
            LogicalExpr::call(
                "divide",
                vec![LogicalExpr::col("a"), LogicalExpr::lit(Scalar::F64(2.0))],
            ),
        ),
    ]);
    let mut op = h.operator(vec![int_and_string(3)], spec, ProjectConfig::default());
    op.next().unwrap();
    let schema = op.schema();
    assert_eq!(schema.fields[0].name, "a_id");
    assert_eq!(schema.fields[1].data_type, DataType::Float64);
    assert!(schema.fields[1].nullable);
    assert_eq!(op.batch().value(1, 1), Some(&Scalar::F64(0.5)));
}

#[test]
fn test_resolution_errors_are_aggregated() {
    let h = Harness::new(1 << 24);
    let spec = ProjectionSpec::new(vec![
        NamedExpr::column("a"),
        NamedExpr::column("missing"),
        NamedExpr::new("bad", LogicalExpr::call("no_such_fn", vec![])),
    ]);
    let mut op = h.operator(vec![int_and_string(3)], spec, ProjectConfig::default());
    match op.next() {
        Err(OpError::SchemaResolution(entries)) => {
            let idx: Vec<_> = entries.iter().map(|e| e.index).collect();
            assert_eq!(idx, vec![1, 2]);
            assert_eq!(entries[0].name, "missing");
        }
        other => panic!("expected a resolution error, got {other:?}"),
    }
    assert!(op.compiled().is_none());
    assert!(matches!(op.next(), Err(OpError::Aborted)));
}

#[test]
fn test_allocation_failure_is_fatal() {
    let h = Harness::new(16);
    let spec = ProjectionSpec::new(vec![NamedExpr::new("u", upper("b"))]);
    let mut op = h.operator(vec![int_and_string(100)], spec, ProjectConfig::default());
    assert!(matches!(op.next(), Err(OpError::Alloc { ref column, .. }) if column == "u"));
    assert!(op.is_aborted());
    assert_eq!(h.budget.used_bytes(), 0);
}

#[test]
fn test_evaluation_failure_is_fatal() {
    let h = Harness::new(1 << 24);
    let spec = ProjectionSpec::new(vec![NamedExpr::new(
        "n",
        LogicalExpr::cast(LogicalExpr::col("b"), DataType::Int64),
    )]);
    let mut op = h.operator(vec![int_and_string(2)], spec, ProjectConfig::default());
    assert!(matches!(op.next(), Err(OpError::Eval(_))));
    assert_eq!(h.sink.count("project.aborted"), 1);
}

#[test]
fn test_upstream_error_propagates() {
    let h = Harness::new(1 << 24);
    let mut src = MemorySource::new(vec![int_and_string(2)]);
    src.push_error("connection reset");
    let mut op = h.operator_over(src, ProjectionSpec::wildcard(), ProjectConfig::default());
    op.next().unwrap();
    assert!(matches!(op.next(), Err(OpError::Upstream(m)) if m == "connection reset"));
    assert!(op.is_aborted());
}

#[test]
fn test_output_memory_released_with_operator() {
    let h = Harness::new(1 << 24);
    let spec = ProjectionSpec::new(vec![NamedExpr::new("u", upper("b"))]);
    let mut op = h.operator(vec![int_and_string(64)], spec, ProjectConfig::default());
    op.next().unwrap();
    assert!(h.budget.used_bytes() > 0);
    assert_eq!(op.batch().reserved_bytes(), h.budget.used_bytes());
    drop(op);
    assert_eq!(h.budget.used_bytes(), 0);
}

#[test]
fn test_string_index_read_path() {
    let h = Harness::new(1 << 24);
    let spec = ProjectionSpec::new(vec![NamedExpr::new(
        "first",
        LogicalExpr::path(SchemaPath::parse("b[0]").unwrap()),
    )]);
    let input = RowBatch::new(vec![Column::new(
        "b",
        DataType::Utf8,
        vec![Scalar::Str("hello".into()), Scalar::Str(String::new()), Scalar::Null],
    )]);
    let mut op = h.operator(vec![input], spec, ProjectConfig::default());
    op.next().unwrap();
    let out = op.batch();
    assert_eq!(op.compiled().unwrap().transfer_count(), 0);
    assert_eq!(out.value(0, 0), Some(&Scalar::Str("h".into())));
    assert_eq!(out.value(0, 1), Some(&Scalar::Null));
    assert_eq!(out.value(0, 2), Some(&Scalar::Null));
}
