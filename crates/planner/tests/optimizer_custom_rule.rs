use std::sync::Arc;

use arrow_schema::DataType;
use quill_common::{CompilerConfig, RelationId};
use quill_planner::{Attribute, BinaryOp, Expr, LiteralValue, LogicalPlan, Optimizer, Rule};

struct GtToGte11Rule;

impl Rule for GtToGte11Rule {
    fn name(&self) -> &str {
        "test_gt_to_gte_11"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> quill_common::Result<Arc<LogicalPlan>> {
        Ok(plan.transform_expressions_down(&|e| {
            let Expr::BinaryOp {
                left,
                op: BinaryOp::Gt,
                right,
            } = e.as_ref()
            else {
                return None;
            };
            let Expr::Literal {
                value: LiteralValue::Int64(10),
                ..
            } = right.as_ref()
            else {
                return None;
            };
            Some(Arc::new(Expr::BinaryOp {
                left: Arc::clone(left),
                op: BinaryOp::GtEq,
                right: Arc::new(Expr::int64(11)),
            }))
        }))
    }
}

#[test]
fn custom_optimizer_rule_rewrites_gt_to_gte_11() {
    let x = Attribute::new("x", DataType::Int64, false);
    let plan = Arc::new(LogicalPlan::Filter {
        predicate: Arc::new(Expr::BinaryOp {
            left: Arc::new(x.to_column()),
            op: BinaryOp::Gt,
            right: Arc::new(Expr::int64(10)),
        }),
        input: Arc::new(LogicalPlan::Relation {
            name: "t".to_string(),
            id: RelationId::next(),
            schema: vec![x],
        }),
    });

    let optimizer = Optimizer::new();
    optimizer.register_rule(Arc::new(GtToGte11Rule));
    let optimized = optimizer
        .optimize(&plan, &CompilerConfig::default())
        .expect("optimize");
    match optimized.as_ref() {
        LogicalPlan::Filter { predicate, .. } => match predicate.as_ref() {
            Expr::BinaryOp { op, right, .. } => {
                assert_eq!(*op, BinaryOp::GtEq);
                match right.as_ref() {
                    Expr::Literal {
                        value: LiteralValue::Int64(v),
                        ..
                    } => assert_eq!(*v, 11),
                    other => panic!("expected rewritten right literal, got {other:?}"),
                }
            }
            other => panic!("expected binary predicate, got {other:?}"),
        },
        other => panic!("expected filter with rewritten predicate, got {other:?}"),
    }
}
