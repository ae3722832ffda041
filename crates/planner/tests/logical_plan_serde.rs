use std::sync::Arc;

use arrow_schema::DataType;
use quill_common::RelationId;
use quill_planner::{Attribute, BinaryOp, Expr, JoinType, LogicalPlan};

#[test]
fn logical_plan_is_serializable() {
    // Simple plan: join -> filter -> limit
    let a = Attribute::new("a", DataType::Int64, false);
    let b = Attribute::new("b", DataType::Utf8, true);
    let plan = LogicalPlan::Limit {
        count: Arc::new(Expr::int64(10)),
        input: Arc::new(LogicalPlan::Filter {
            predicate: Arc::new(Expr::BinaryOp {
                left: Arc::new(a.to_column()),
                op: BinaryOp::Gt,
                right: Arc::new(Expr::int64(1)),
            }),
            input: Arc::new(LogicalPlan::Join {
                left: Arc::new(LogicalPlan::Relation {
                    name: "l".to_string(),
                    id: RelationId::next(),
                    schema: vec![a],
                }),
                right: Arc::new(LogicalPlan::Relation {
                    name: "r".to_string(),
                    id: RelationId::next(),
                    schema: vec![b],
                }),
                join_type: JoinType::Inner,
                condition: None,
            }),
        }),
    };

    let s = serde_json::to_string(&plan).unwrap();
    let back: LogicalPlan = serde_json::from_str(&s).unwrap();
    assert_eq!(back, plan);
}
