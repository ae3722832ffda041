//! Full compile pipeline: unresolved plan -> Analyzer -> Optimizer.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arrow_schema::DataType;
use quill_common::{CompilerConfig, QuillError};
use quill_planner::{
    Analyzer, BinaryOp, Expr, JoinType, LogicalPlan, MemoryCatalog, Optimizer, TraceHook,
};

fn catalog() -> Arc<MemoryCatalog> {
    let mut c = MemoryCatalog::new();
    c.register_table(
        "users",
        vec![
            ("id", DataType::Int64, false),
            ("age", DataType::Int32, true),
            ("name", DataType::Utf8, false),
        ],
    );
    c.register_table(
        "orders",
        vec![
            ("user_id", DataType::Int64, false),
            ("total", DataType::Float64, true),
        ],
    );
    Arc::new(c)
}

fn scan(name: &str) -> Arc<LogicalPlan> {
    Arc::new(LogicalPlan::UnresolvedRelation {
        name: name.to_string(),
    })
}

fn col(name: &str) -> Arc<Expr> {
    Arc::new(Expr::Column(name.to_string()))
}

fn compile(plan: LogicalPlan) -> quill_common::Result<Arc<LogicalPlan>> {
    let cfg = CompilerConfig::default();
    let analyzed = Analyzer::new(catalog()).analyze(&Arc::new(plan), &cfg)?;
    assert!(analyzed.strictly_typed(), "analysis must produce a strictly typed plan");
    Optimizer::new().optimize(&analyzed, &cfg)
}

#[test]
fn tautological_filter_compiles_to_bare_relation() {
    let plan = LogicalPlan::Filter {
        predicate: Arc::new(Expr::BinaryOp {
            left: Arc::new(Expr::BinaryOp {
                left: Arc::new(Expr::int64(1)),
                op: BinaryOp::Plus,
                right: Arc::new(Expr::int64(2)),
            }),
            op: BinaryOp::Gt,
            right: Arc::new(Expr::int64(2)),
        }),
        input: scan("users"),
    };
    let compiled = compile(plan).expect("compile");
    assert!(
        matches!(compiled.as_ref(), LogicalPlan::Relation { name, .. } if name == "users"),
        "expected bare relation, got:\n{}",
        compiled.pretty_tree()
    );
}

#[test]
fn filter_splits_across_join_through_pipeline() {
    let predicate = Arc::new(Expr::And(
        Arc::new(Expr::And(
            Arc::new(Expr::BinaryOp {
                left: col("id"),
                op: BinaryOp::Eq,
                right: Arc::new(Expr::int64(1)),
            }),
            Arc::new(Expr::BinaryOp {
                left: col("total"),
                op: BinaryOp::Gt,
                right: Arc::new(Expr::int64(10)),
            }),
        )),
        Arc::new(Expr::BinaryOp {
            left: col("id"),
            op: BinaryOp::Eq,
            right: col("user_id"),
        }),
    ));
    let plan = LogicalPlan::Filter {
        predicate,
        input: Arc::new(LogicalPlan::Join {
            left: scan("users"),
            right: scan("orders"),
            join_type: JoinType::Inner,
            condition: None,
        }),
    };

    let compiled = compile(plan).expect("compile");
    let LogicalPlan::Join {
        left,
        right,
        condition,
        ..
    } = compiled.as_ref()
    else {
        panic!("expected join at root, got:\n{}", compiled.pretty_tree());
    };
    assert!(
        matches!(left.as_ref(), LogicalPlan::Filter { input, .. }
            if matches!(input.as_ref(), LogicalPlan::Relation { name, .. } if name == "users")),
        "per-side conjunct should be pushed to users:\n{}",
        compiled.pretty_tree()
    );
    assert!(
        matches!(right.as_ref(), LogicalPlan::Filter { input, .. }
            if matches!(input.as_ref(), LogicalPlan::Relation { name, .. } if name == "orders")),
        "per-side conjunct should be pushed to orders:\n{}",
        compiled.pretty_tree()
    );
    assert!(
        condition.is_some(),
        "cross-side conjunct should become the join condition:\n{}",
        compiled.pretty_tree()
    );
}

#[test]
fn star_expands_through_subquery_and_subquery_is_stripped() {
    let plan = LogicalPlan::Project {
        exprs: vec![Arc::new(Expr::Star)],
        input: Arc::new(LogicalPlan::Subquery {
            alias: "u".to_string(),
            input: scan("users"),
        }),
    };
    let compiled = compile(plan).expect("compile");
    let out = compiled.output();
    assert_eq!(
        out.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
        vec!["id", "age", "name"]
    );
    fn has_subquery(p: &LogicalPlan) -> bool {
        matches!(p, LogicalPlan::Subquery { .. })
            || p.children().iter().any(|c| has_subquery(c))
    }
    assert!(!has_subquery(&compiled));
}

#[test]
fn optimizer_preserves_the_analyzed_schema() {
    let cfg = CompilerConfig::default();
    let plan = LogicalPlan::Project {
        exprs: vec![
            col("name"),
            Arc::new(Expr::BinaryOp {
                left: col("age"),
                op: BinaryOp::Plus,
                right: Arc::new(Expr::int64(1)),
            }),
        ],
        input: Arc::new(LogicalPlan::Filter {
            predicate: Arc::new(Expr::IsNotNull(col("age"))),
            input: scan("users"),
        }),
    };
    let analyzed = Analyzer::new(catalog())
        .analyze(&Arc::new(plan), &cfg)
        .expect("analyze");
    let optimized = Optimizer::new().optimize(&analyzed, &cfg).expect("optimize");

    let before = analyzed.output();
    let after = optimized.output();
    assert_eq!(before.len(), after.len());
    for (x, y) in before.iter().zip(after.iter()) {
        assert_eq!(x.name, y.name);
        assert_eq!(x.data_type, y.data_type);
    }
}

#[test]
fn self_join_is_rejected_end_to_end() {
    let plan = LogicalPlan::Join {
        left: scan("users"),
        right: scan("users"),
        join_type: JoinType::Inner,
        condition: None,
    };
    let err = compile(plan).expect_err("must fail");
    assert!(
        matches!(err, QuillError::Unsupported(ref msg) if msg == "Self-join is not supported yet"),
        "{err}"
    );
}

#[test]
fn compile_is_idempotent_on_optimized_plans() {
    let cfg = CompilerConfig::default();
    let plan = LogicalPlan::Filter {
        predicate: Arc::new(Expr::BinaryOp {
            left: col("age"),
            op: BinaryOp::GtEq,
            right: Arc::new(Expr::int64(21)),
        }),
        input: Arc::new(LogicalPlan::Filter {
            predicate: Arc::new(Expr::boolean(true)),
            input: scan("users"),
        }),
    };
    let once = compile(plan).expect("compile");
    let twice = Optimizer::new().optimize(&once, &cfg).expect("re-optimize");
    assert_eq!(once.as_ref(), twice.as_ref());
}

#[test]
fn trace_hook_observes_optimizer_rewrites() {
    let cfg = CompilerConfig::default();
    let plan = LogicalPlan::Filter {
        predicate: Arc::new(Expr::BinaryOp {
            left: Arc::new(Expr::int64(1)),
            op: BinaryOp::Lt,
            right: Arc::new(Expr::int64(2)),
        }),
        input: scan("users"),
    };
    let analyzed = Analyzer::new(catalog())
        .analyze(&Arc::new(plan), &cfg)
        .expect("analyze");

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let hook: TraceHook = Arc::new(move |_rule, before, after| {
        assert_ne!(before, after, "trace fires only on change");
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let optimizer = Optimizer::new();
    optimizer.set_trace(hook);
    optimizer.optimize(&analyzed, &cfg).expect("optimize");
    assert!(hits.load(Ordering::SeqCst) > 0, "folding must be traced");
}
