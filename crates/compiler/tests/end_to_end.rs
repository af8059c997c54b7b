//! End-to-end tests: compiled circuits evaluated over table changes.

use zsql_circuit::OperatorKind;
use zsql_compiler::{CircuitCompiler, CompilerOptions};
use zsql_core::{DataType, Value};
use zsql_incremental::{CircuitRunner, ZSet};
use zsql_plan::{
    AggKind, AggregateCall, ColumnDef, FieldCollation, JoinType, Plan, PlanId, RexNode, RexOp,
    RowType, SqlType, Statement, WindowGroup,
};

fn int() -> SqlType {
    SqlType::scalar(DataType::Int32)
}

fn row(values: &[Option<i32>]) -> Value {
    Value::tuple(values.iter().map(|v| Value::from(*v)).collect())
}

fn ints(values: &[i32]) -> Value {
    Value::tuple(values.iter().map(|v| Value::Int32(*v)).collect())
}

fn zset(rows: Vec<(Value, i64)>) -> ZSet {
    rows.into_iter().collect()
}

/// Compiles the tables and a view built by `view`, and returns a runner
/// that has taken one step over empty tables.
fn run<F>(tables: &[(&str, RowType)], view: F) -> CircuitRunner
where
    F: FnOnce(&mut Plan) -> PlanId,
{
    let mut compiler = CircuitCompiler::new(CompilerOptions::default());
    for (name, row_type) in tables {
        let columns = row_type
            .fields
            .iter()
            .map(|f| ColumnDef::new(f.name.clone(), f.ty.clone()))
            .collect();
        compiler.compile(&Statement::create_table(*name, columns)).unwrap();
    }
    let mut plan = Plan::new();
    let root = view(&mut plan);
    compiler.compile(&Statement::create_view("v", plan, root)).unwrap();
    let mut runner = CircuitRunner::new(compiler.get_final_circuit("test")).unwrap();
    runner.step().unwrap();
    runner
}

#[test]
fn filter_and_project() {
    let t = RowType::of(&[("x", int())]);
    let mut runner = run(&[("t", t.clone())], |plan| {
        let scan = plan.scan("t", t.clone());
        let filter = plan.filter(scan, RexNode::gt(RexNode::input_ref(0, int()), RexNode::int32(1)));
        let plus = RexNode::arithmetic(RexOp::Plus, RexNode::input_ref(0, int()), RexNode::int32(10), int());
        plan.project(filter, vec![plus], &["y"])
    });

    let delta = zset(vec![(ints(&[1]), 1), (ints(&[2]), 1), (ints(&[3]), 2)]);
    let changes = runner.on_table_change("t", &delta).unwrap();
    assert_eq!(changes["v"], zset(vec![(ints(&[12]), 1), (ints(&[13]), 2)]));

    let changes = runner.on_table_change("t", &ZSet::singleton(ints(&[3]), -1)).unwrap();
    assert_eq!(changes["v"], ZSet::singleton(ints(&[13]), -1));
}

#[test]
fn count_over_empty_table_is_zero() {
    let t = RowType::of(&[("x", int())]);
    let mut runner = run(&[("t", t.clone())], |plan| {
        let scan = plan.scan("t", t.clone());
        plan.aggregate(scan, vec![], vec![AggregateCall::count_star()])
    });
    let count = |n: i64| Value::tuple(vec![Value::Int64(n)]);
    assert_eq!(runner.view("v"), Some(&ZSet::singleton(count(0), 1)));

    let delta = zset(vec![(ints(&[1]), 1), (ints(&[2]), 1)]);
    let changes = runner.on_table_change("t", &delta).unwrap();
    assert_eq!(changes["v"], zset(vec![(count(0), -1), (count(2), 1)]));

    let changes = runner.on_table_change("t", &-&delta).unwrap();
    assert_eq!(changes["v"], zset(vec![(count(2), -1), (count(0), 1)]));
}

#[test]
fn grouped_sum_skips_nulls() {
    let t = RowType::of(&[("g", int()), ("x", int().nullable())]);
    let mut runner = run(&[("t", t.clone())], |plan| {
        let scan = plan.scan("t", t.clone());
        let sum = AggregateCall::new(AggKind::Sum, vec![1], int().nullable());
        plan.aggregate(scan, vec![0], vec![sum])
    });
    let delta = zset(vec![
        (row(&[Some(1), Some(5)]), 1),
        (row(&[Some(1), None]), 1),
        (row(&[Some(1), Some(7)]), 1),
        (row(&[Some(2), None]), 1),
    ]);
    let changes = runner.on_table_change("t", &delta).unwrap();
    assert_eq!(
        changes["v"],
        zset(vec![(row(&[Some(1), Some(12)]), 1), (row(&[Some(2), None]), 1)])
    );
}

#[test]
fn left_join_pads_unmatched_rows() {
    let a = RowType::of(&[("k", int()), ("v", int())]);
    let b = RowType::of(&[("k", int())]);
    let mut runner = run(&[("a", a.clone()), ("b", b.clone())], |plan| {
        let left = plan.scan("a", a.clone());
        let right = plan.scan("b", b.clone());
        let cond = RexNode::eq(RexNode::input_ref(0, int()), RexNode::input_ref(2, int()));
        plan.join(left, right, cond, JoinType::Left)
    });

    runner
        .on_table_change("a", &zset(vec![(ints(&[1, 10]), 1), (ints(&[2, 20]), 1)]))
        .unwrap();
    assert_eq!(
        runner.view("v"),
        Some(&zset(vec![
            (row(&[Some(1), Some(10), None]), 1),
            (row(&[Some(2), Some(20), None]), 1),
        ]))
    );

    let changes = runner.on_table_change("b", &ZSet::singleton(ints(&[1]), 1)).unwrap();
    assert_eq!(
        changes["v"],
        zset(vec![
            (row(&[Some(1), Some(10), None]), -1),
            (row(&[Some(1), Some(10), Some(1)]), 1),
        ])
    );
}

#[test]
fn null_keys_never_join() {
    let a = RowType::of(&[("k", int().nullable()), ("v", int())]);
    let b = RowType::of(&[("k", int())]);
    let mut runner = run(&[("a", a.clone()), ("b", b.clone())], |plan| {
        let left = plan.scan("a", a.clone());
        let right = plan.scan("b", b.clone());
        let cond = RexNode::eq(RexNode::input_ref(0, int().nullable()), RexNode::input_ref(2, int()));
        plan.join(left, right, cond, JoinType::Inner)
    });

    runner.on_table_change("b", &ZSet::singleton(ints(&[1]), 1)).unwrap();
    let changes = runner
        .on_table_change(
            "a",
            &zset(vec![(row(&[None, Some(1)]), 1), (row(&[Some(1), Some(2)]), 1)]),
        )
        .unwrap();
    assert_eq!(changes["v"], ZSet::singleton(row(&[Some(1), Some(2), Some(1)]), 1));
}

#[test]
fn shared_subplan_is_compiled_once() {
    let t = RowType::of(&[("x", int())]);
    let mut runner = run(&[("t", t.clone())], |plan| {
        let scan = plan.scan("t", t.clone());
        let filter = plan.filter(scan, RexNode::gt(RexNode::input_ref(0, int()), RexNode::int32(0)));
        plan.union(vec![filter, filter], true)
    });
    let filters = runner
        .circuit()
        .operators()
        .filter(|(_, op)| matches!(op.kind, OperatorKind::Filter { .. }))
        .count();
    assert_eq!(filters, 1);

    let changes = runner.on_table_change("t", &ZSet::singleton(ints(&[4]), 1)).unwrap();
    assert_eq!(changes["v"], ZSet::singleton(ints(&[4]), 2));
}

#[test]
fn row_number_filter_keeps_top_rows_per_partition() {
    let t = RowType::of(&[("g", int()), ("x", int())]);
    let int64 = SqlType::scalar(DataType::Int64);
    let mut runner = run(&[("t", t.clone())], |plan| {
        let scan = plan.scan("t", t.clone());
        let number = AggregateCall::new(AggKind::RowNumber, vec![], int64.clone());
        let window = plan.window(
            scan,
            vec![WindowGroup::new(vec![0], vec![FieldCollation::asc(1)], vec![number])],
            vec![],
        );
        let limit = RexNode::lt_eq(RexNode::input_ref(2, int64.clone()), RexNode::int32(2));
        plan.filter(window, limit)
    });
    assert!(runner
        .circuit()
        .operators()
        .all(|(_, op)| !matches!(op.kind, OperatorKind::Filter { .. })));
    let ranked = |g: i32, x: i32, n: i64| Value::tuple(vec![Value::Int32(g), Value::Int32(x), Value::Int64(n)]);

    let delta = zset(vec![
        (ints(&[1, 5]), 1),
        (ints(&[1, 3]), 1),
        (ints(&[1, 4]), 1),
        (ints(&[2, 7]), 1),
    ]);
    runner.on_table_change("t", &delta).unwrap();
    assert_eq!(
        runner.view("v"),
        Some(&zset(vec![(ranked(1, 3, 1), 1), (ranked(1, 4, 2), 1), (ranked(2, 7, 1), 1)]))
    );

    let changes = runner.on_table_change("t", &ZSet::singleton(ints(&[1, 3]), -1)).unwrap();
    assert_eq!(
        changes["v"],
        zset(vec![
            (ranked(1, 3, 1), -1),
            (ranked(1, 4, 2), -1),
            (ranked(1, 4, 1), 1),
            (ranked(1, 5, 2), 1),
        ])
    );
}

#[test]
fn order_by_produces_a_sorted_vector() {
    let t = RowType::of(&[("x", int())]);
    let mut runner = run(&[("t", t.clone())], |plan| {
        let scan = plan.scan("t", t.clone());
        plan.sort(scan, vec![FieldCollation::desc(0)], None, None)
    });
    runner
        .on_table_change("t", &zset(vec![(ints(&[2]), 1), (ints(&[9]), 1), (ints(&[5]), 1)]))
        .unwrap();
    let sorted = Value::Array(vec![ints(&[9]), ints(&[5]), ints(&[2])]);
    assert_eq!(runner.view("v"), Some(&ZSet::singleton(sorted, 1)));
}

#[test]
fn unsupported_constructs_are_reported() {
    let t = RowType::of(&[("x", int())]);
    let mut compiler = CircuitCompiler::new(CompilerOptions::default());
    compiler
        .compile(&Statement::create_table("t", vec![ColumnDef::new("x", int())]))
        .unwrap();

    let mut plan = Plan::new();
    let scan = plan.scan("t", t.clone());
    let offset = plan.sort(scan, vec![FieldCollation::asc(0)], Some(RexNode::int32(3)), Some(RexNode::int32(1)));
    let err = compiler.compile(&Statement::create_view("v", plan, offset)).unwrap_err();
    assert!(err.is_unimplemented());

    let mut plan = Plan::new();
    let left = plan.scan("t", t.clone());
    let right = plan.scan("t", t.clone());
    let cond = RexNode::eq(RexNode::input_ref(0, int()), RexNode::input_ref(1, int()));
    let semi = plan.join(left, right, cond, JoinType::Semi);
    let err = compiler.compile(&Statement::create_view("w", plan, semi)).unwrap_err();
    assert!(err.is_unimplemented());
}

/// Runs `view` over t = {1 x3, 2} and u = {1, 5} and returns the view contents.
fn set_operation<F>(view: F) -> ZSet
where
    F: FnOnce(&mut Plan, PlanId, PlanId) -> PlanId,
{
    let x = RowType::of(&[("x", int())]);
    let mut runner = run(&[("t", x.clone()), ("u", x.clone())], |plan| {
        let t = plan.scan("t", x.clone());
        let u = plan.scan("u", x.clone());
        view(plan, t, u)
    });
    runner.on_table_change("t", &zset(vec![(ints(&[1]), 3), (ints(&[2]), 1)])).unwrap();
    runner.on_table_change("u", &zset(vec![(ints(&[1]), 1), (ints(&[5]), 1)])).unwrap();
    runner.view("v").cloned().unwrap_or_default()
}

#[test]
fn union_all_keeps_duplicates_and_union_removes_them() {
    let all = set_operation(|plan, t, u| plan.union(vec![t, u], true));
    assert_eq!(all, zset(vec![(ints(&[1]), 4), (ints(&[2]), 1), (ints(&[5]), 1)]));

    let distinct = set_operation(|plan, t, u| plan.union(vec![t, u], false));
    assert_eq!(distinct, zset(vec![(ints(&[1]), 1), (ints(&[2]), 1), (ints(&[5]), 1)]));
}

#[test]
fn except_subtracts_distinct_rows() {
    let all = set_operation(|plan, t, u| plan.minus(vec![t, u], true));
    assert_eq!(all, zset(vec![(ints(&[2]), 1), (ints(&[5]), -1)]));

    let distinct = set_operation(|plan, t, u| plan.minus(vec![t, u], false));
    assert_eq!(distinct, ZSet::singleton(ints(&[2]), 1));
}

#[test]
fn intersect_keeps_common_rows_once() {
    let both = set_operation(|plan, t, u| plan.intersect(vec![t, u], false));
    assert_eq!(both, ZSet::singleton(ints(&[1]), 1));

    let single = set_operation(|plan, t, _| plan.intersect(vec![t], false));
    assert_eq!(single, zset(vec![(ints(&[1]), 1), (ints(&[2]), 1)]));
}
