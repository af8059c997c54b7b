//! Benchmarks for zsql-compiler.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use zsql_compiler::{CircuitCompiler, CompilerOptions};
use zsql_core::{DataType, Value};
use zsql_incremental::{CircuitRunner, ZSet};
use zsql_plan::{
    AggKind, AggregateCall, ColumnDef, JoinType, Plan, PlanId, RexNode, RowType, SqlType, Statement,
};

fn int() -> SqlType {
    SqlType::scalar(DataType::Int32)
}

fn tables(compiler: &mut CircuitCompiler) {
    for name in ["a", "b"] {
        compiler
            .compile(&Statement::create_table(
                name,
                vec![ColumnDef::new("k", int()), ColumnDef::new("v", int())],
            ))
            .unwrap();
    }
}

/// `SELECT a.k, SUM(b.v) FROM a JOIN b ON a.k = b.k GROUP BY a.k`
fn join_aggregate(plan: &mut Plan) -> PlanId {
    let row = RowType::of(&[("k", int()), ("v", int())]);
    let a = plan.scan("a", row.clone());
    let b = plan.scan("b", row);
    let cond = RexNode::eq(RexNode::input_ref(0, int()), RexNode::input_ref(2, int()));
    let join = plan.join(a, b, cond, JoinType::Inner);
    let sum = AggregateCall::new(AggKind::Sum, vec![3], int().nullable());
    plan.aggregate(join, vec![0], vec![sum])
}

fn compile_views(count: usize) -> zsql_circuit::Circuit {
    let mut compiler = CircuitCompiler::new(CompilerOptions::default());
    tables(&mut compiler);
    for i in 0..count {
        let mut plan = Plan::new();
        let root = join_aggregate(&mut plan);
        let view = Statement::create_view(format!("v{}", i), plan, root);
        compiler.compile(&view).unwrap();
    }
    compiler.get_final_circuit("bench")
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    for count in [1, 10, 50] {
        group.bench_with_input(BenchmarkId::new("join_aggregate_views", count), &count, |b, &count| {
            b.iter(|| compile_views(black_box(count)))
        });
    }

    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("update");

    for size in [10, 100] {
        let mut runner = CircuitRunner::new(compile_views(1)).unwrap();
        let rows: ZSet = (0..size)
            .map(|i| (Value::tuple(vec![Value::Int32(i % 10), Value::Int32(i)]), 1))
            .collect();
        runner.on_table_change("a", &rows).unwrap();
        runner.on_table_change("b", &rows).unwrap();
        let delta = ZSet::singleton(Value::tuple(vec![Value::Int32(3), Value::Int32(1)]), 1);
        group.bench_with_input(BenchmarkId::new("single_row", size), &delta, |b, delta| {
            b.iter(|| {
                runner.on_table_change("b", black_box(delta)).unwrap();
                runner.on_table_change("b", &-delta).unwrap();
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_update);
criterion_main!(benches);
