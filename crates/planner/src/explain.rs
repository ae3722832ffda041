use crate::expr::Expr;
use crate::logical_plan::{JoinType, LogicalPlan};

/// Render a logical plan as human-readable multiline text.
pub fn explain_logical(plan: &LogicalPlan) -> String {
    let mut s = String::new();
    fmt_plan(plan, 0, &mut s);
    s
}

/// Render an expression on a single line.
pub fn explain_expr(e: &Expr) -> String {
    fmt_expr(e)
}

fn fmt_plan(plan: &LogicalPlan, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match plan {
        LogicalPlan::UnresolvedRelation { name } => {
            out.push_str(&format!("{pad}UnresolvedRelation name={name}\n"));
        }
        LogicalPlan::Relation { name, id, schema } => {
            out.push_str(&format!(
                "{pad}Relation name={name} id={id} cols=[{}]\n",
                fmt_schema(schema)
            ));
        }
        LogicalPlan::LocalRelation { rows, schema } => {
            out.push_str(&format!(
                "{pad}LocalRelation rows={} cols=[{}]\n",
                rows.len(),
                fmt_schema(schema)
            ));
        }
        LogicalPlan::Project { exprs, input } => {
            out.push_str(&format!("{pad}Project\n"));
            for e in exprs {
                out.push_str(&format!("{pad}  {}\n", fmt_expr(e)));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Filter { predicate, input } => {
            out.push_str(&format!("{pad}Filter {}\n", fmt_expr(predicate)));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Join {
            left,
            right,
            join_type,
            condition,
        } => {
            let cond = condition
                .as_ref()
                .map(|c| fmt_expr(c))
                .unwrap_or_else(|| "none".to_string());
            out.push_str(&format!(
                "{pad}Join type={} on={cond}\n",
                fmt_join_type(*join_type)
            ));
            out.push_str(&format!("{pad}  left:\n"));
            fmt_plan(left, indent + 2, out);
            out.push_str(&format!("{pad}  right:\n"));
            fmt_plan(right, indent + 2, out);
        }
        LogicalPlan::Limit { count, input } => {
            out.push_str(&format!("{pad}Limit n={}\n", fmt_expr(count)));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Subquery { alias, input } => {
            out.push_str(&format!("{pad}Subquery alias={alias}\n"));
            fmt_plan(input, indent + 1, out);
        }
    }
}

fn fmt_join_type(t: JoinType) -> &'static str {
    match t {
        JoinType::Inner => "inner",
        JoinType::LeftOuter => "left_outer",
        JoinType::RightOuter => "right_outer",
        JoinType::FullOuter => "full_outer",
    }
}

fn fmt_schema(schema: &[crate::expr::Attribute]) -> String {
    schema
        .iter()
        .map(|a| {
            format!(
                "{}#{} {}{}",
                a.name,
                a.id,
                a.data_type,
                if a.nullable { "?" } else { "" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn fmt_expr(e: &Expr) -> String {
    match e {
        Expr::Literal { value, data_type } => {
            if value.is_null() {
                format!("NULL:{data_type}")
            } else {
                format!("{value}")
            }
        }
        Expr::Column(name) => format!("'{name}"),
        Expr::ColumnRef(attr) => format!("{}#{}", attr.name, attr.id),
        Expr::Star => "*".to_string(),
        Expr::Alias { child, name, id } => {
            format!("{} AS {name}#{id}", fmt_expr(child))
        }
        Expr::Cast { child, to_type } => format!("cast({} as {to_type})", fmt_expr(child)),
        Expr::Not(x) => format!("NOT ({})", fmt_expr(x)),
        Expr::And(a, b) => format!("({}) AND ({})", fmt_expr(a), fmt_expr(b)),
        Expr::Or(a, b) => format!("({}) OR ({})", fmt_expr(a), fmt_expr(b)),
        Expr::BinaryOp { left, op, right } => {
            format!("({}) {} ({})", fmt_expr(left), op.symbol(), fmt_expr(right))
        }
        Expr::If {
            cond,
            then,
            otherwise,
        } => format!(
            "if({}, {}, {})",
            fmt_expr(cond),
            fmt_expr(then),
            fmt_expr(otherwise)
        ),
        Expr::Coalesce(args) => format!(
            "coalesce({})",
            args.iter().map(|a| fmt_expr(a)).collect::<Vec<_>>().join(", ")
        ),
        Expr::IsNull(x) => format!("({}) IS NULL", fmt_expr(x)),
        Expr::IsNotNull(x) => format!("({}) IS NOT NULL", fmt_expr(x)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_schema::DataType;
    use quill_common::RelationId;

    use super::{explain_expr, explain_logical};
    use crate::expr::{Attribute, BinaryOp, Expr};
    use crate::logical_plan::LogicalPlan;

    #[test]
    fn explain_renders_nested_filter() {
        let a = Attribute::new("a", DataType::Int64, false);
        let plan = LogicalPlan::Filter {
            predicate: Arc::new(Expr::BinaryOp {
                left: Arc::new(a.to_column()),
                op: BinaryOp::Gt,
                right: Arc::new(Expr::int64(1)),
            }),
            input: Arc::new(LogicalPlan::Relation {
                name: "t".to_string(),
                id: RelationId::next(),
                schema: vec![a.clone()],
            }),
        };
        let ex = explain_logical(&plan);
        assert!(ex.contains(&format!("Filter (a#{}) > (1)", a.id)), "{ex}");
        assert!(ex.contains("Relation name=t"), "{ex}");
    }

    #[test]
    fn explain_expr_marks_unresolved_columns() {
        assert_eq!(explain_expr(&Expr::Column("x".to_string())), "'x");
        assert_eq!(explain_expr(&Expr::Star), "*");
    }
}
