//! Relational operator tree for Quill query plans.
//!
//! Like expressions, plans are immutable `Arc`-shared trees. A plan moves
//! monotonically through `unresolved -> resolved -> strictly typed` during
//! analysis; optimization preserves strict typing.

use std::collections::HashSet;
use std::sync::Arc;

use arrow_schema::DataType;
use quill_common::{AttrId, RelationId, Result};
use serde::{Deserialize, Serialize};

use crate::expr::{Attribute, Expr, ExprRewriter, LiteralValue};

/// Supported join kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    /// Rows matching on both sides.
    Inner,
    /// All left rows; right side null-extended.
    LeftOuter,
    /// All right rows; left side null-extended.
    RightOuter,
    /// All rows from both sides, null-extended where unmatched.
    FullOuter,
}

/// A relational operator node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalPlan {
    /// Named relation not yet bound to the catalog.
    UnresolvedRelation {
        /// Relation name as written.
        name: String,
    },
    /// Catalog-backed base relation with a stamped schema.
    Relation {
        /// Relation name.
        name: String,
        /// Catalog identity.
        id: RelationId,
        /// Output columns, ids stamped at registration.
        schema: Vec<Attribute>,
    },
    /// Inline rows, used for literal data and for filters folded to false.
    LocalRelation {
        /// Row values, one vector per row, in schema order.
        rows: Vec<Vec<LiteralValue>>,
        /// Output columns.
        schema: Vec<Attribute>,
    },
    /// Column selection/computation.
    Project {
        /// Projected expressions in output order.
        exprs: Vec<Arc<Expr>>,
        /// Input plan.
        input: Arc<LogicalPlan>,
    },
    /// Row selection.
    Filter {
        /// Boolean predicate.
        predicate: Arc<Expr>,
        /// Input plan.
        input: Arc<LogicalPlan>,
    },
    /// Binary join.
    Join {
        /// Left input.
        left: Arc<LogicalPlan>,
        /// Right input.
        right: Arc<LogicalPlan>,
        /// Join kind.
        join_type: JoinType,
        /// Optional boolean join condition.
        condition: Option<Arc<Expr>>,
    },
    /// Row-count bound.
    Limit {
        /// Row count expression; strictly typed plans carry Int64 here.
        count: Arc<Expr>,
        /// Input plan.
        input: Arc<LogicalPlan>,
    },
    /// Named subquery wrapper; stripped at the end of analysis.
    Subquery {
        /// Subquery alias.
        alias: String,
        /// Wrapped plan.
        input: Arc<LogicalPlan>,
    },
}

/// Partial plan rewriter: `None` means "no match, keep the node".
pub type PlanRewriter<'a> = &'a dyn Fn(&Arc<LogicalPlan>) -> Option<Arc<LogicalPlan>>;

/// Fallible partial plan rewriter.
pub type TryPlanRewriter<'a> = &'a dyn Fn(&Arc<LogicalPlan>) -> Result<Option<Arc<LogicalPlan>>>;

impl LogicalPlan {
    /// Direct child plans.
    pub fn children(&self) -> Vec<Arc<LogicalPlan>> {
        match self {
            LogicalPlan::UnresolvedRelation { .. }
            | LogicalPlan::Relation { .. }
            | LogicalPlan::LocalRelation { .. } => vec![],
            LogicalPlan::Project { input, .. }
            | LogicalPlan::Filter { input, .. }
            | LogicalPlan::Limit { input, .. }
            | LogicalPlan::Subquery { input, .. } => vec![Arc::clone(input)],
            LogicalPlan::Join { left, right, .. } => {
                vec![Arc::clone(left), Arc::clone(right)]
            }
        }
    }

    /// Expressions held by this node itself (children excluded).
    pub fn expressions(&self) -> Vec<Arc<Expr>> {
        match self {
            LogicalPlan::Project { exprs, .. } => exprs.iter().map(Arc::clone).collect(),
            LogicalPlan::Filter { predicate, .. } => vec![Arc::clone(predicate)],
            LogicalPlan::Join { condition, .. } => condition.iter().map(Arc::clone).collect(),
            LogicalPlan::Limit { count, .. } => vec![Arc::clone(count)],
            _ => vec![],
        }
    }

    /// Ordered attributes this node produces.
    ///
    /// Outer joins mark the null-extended side nullable. Unresolved nodes
    /// produce an empty schema; callers gate on [`LogicalPlan::resolved`].
    pub fn output(&self) -> Vec<Attribute> {
        match self {
            LogicalPlan::UnresolvedRelation { .. } => vec![],
            LogicalPlan::Relation { schema, .. } | LogicalPlan::LocalRelation { schema, .. } => {
                schema.clone()
            }
            LogicalPlan::Project { exprs, .. } => {
                exprs.iter().filter_map(|e| e.to_attribute()).collect()
            }
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Limit { input, .. }
            | LogicalPlan::Subquery { input, .. } => input.output(),
            LogicalPlan::Join {
                left,
                right,
                join_type,
                ..
            } => {
                let (left_nullable, right_nullable) = match join_type {
                    JoinType::Inner => (false, false),
                    JoinType::LeftOuter => (false, true),
                    JoinType::RightOuter => (true, false),
                    JoinType::FullOuter => (true, true),
                };
                let mut out = Vec::new();
                for a in left.output() {
                    out.push(if left_nullable { a.with_nullable(true) } else { a });
                }
                for a in right.output() {
                    out.push(if right_nullable { a.with_nullable(true) } else { a });
                }
                out
            }
        }
    }

    /// Ids of attributes read by this node's own expressions.
    pub fn references(&self) -> HashSet<AttrId> {
        let mut out = HashSet::new();
        for e in self.expressions() {
            out.extend(e.references());
        }
        out
    }

    /// Whether no unresolved relation, column, or star remains in this node
    /// or any descendant.
    pub fn resolved(&self) -> bool {
        if matches!(self, LogicalPlan::UnresolvedRelation { .. }) {
            return false;
        }
        self.expressions().iter().all(|e| e.resolved())
            && self.children().iter().all(|c| c.resolved())
    }

    /// Whether the plan is resolved and every contained expression satisfies
    /// its operator signature, with operator-shape checks on top.
    pub fn strictly_typed(&self) -> bool {
        if !self.children().iter().all(|c| c.strictly_typed()) {
            return false;
        }
        if matches!(self, LogicalPlan::UnresolvedRelation { .. }) {
            return false;
        }
        if !self.expressions().iter().all(|e| e.strictly_typed()) {
            return false;
        }
        match self {
            LogicalPlan::Filter { predicate, .. } => predicate.data_type() == DataType::Boolean,
            LogicalPlan::Join { condition, .. } => condition
                .as_ref()
                .map_or(true, |c| c.data_type() == DataType::Boolean),
            LogicalPlan::Limit { count, .. } => count.data_type() == DataType::Int64,
            LogicalPlan::Project { exprs, .. } => {
                exprs.iter().all(|e| e.to_attribute().is_some())
            }
            _ => true,
        }
    }

    /// Indented textual rendering for diagnostics and error payloads.
    pub fn pretty_tree(&self) -> String {
        crate::explain::explain_logical(self)
    }

    /// Rebuild this node with each child plan mapped through `f`, reusing
    /// the original allocation when nothing changed.
    pub fn map_children(
        self: &Arc<Self>,
        f: &mut dyn FnMut(&Arc<LogicalPlan>) -> Arc<LogicalPlan>,
    ) -> Arc<LogicalPlan> {
        self.try_map_children(&mut |c| Ok(f(c)))
            .unwrap_or_else(|_| Arc::clone(self))
    }

    /// Fallible form of [`LogicalPlan::map_children`].
    pub fn try_map_children(
        self: &Arc<Self>,
        f: &mut dyn FnMut(&Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>>,
    ) -> Result<Arc<LogicalPlan>> {
        match self.as_ref() {
            LogicalPlan::UnresolvedRelation { .. }
            | LogicalPlan::Relation { .. }
            | LogicalPlan::LocalRelation { .. } => Ok(Arc::clone(self)),
            LogicalPlan::Project { exprs, input } => {
                let new = f(input)?;
                if Arc::ptr_eq(&new, input) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(LogicalPlan::Project {
                        exprs: exprs.clone(),
                        input: new,
                    }))
                }
            }
            LogicalPlan::Filter { predicate, input } => {
                let new = f(input)?;
                if Arc::ptr_eq(&new, input) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(LogicalPlan::Filter {
                        predicate: Arc::clone(predicate),
                        input: new,
                    }))
                }
            }
            LogicalPlan::Join {
                left,
                right,
                join_type,
                condition,
            } => {
                let (nl, nr) = (f(left)?, f(right)?);
                if Arc::ptr_eq(&nl, left) && Arc::ptr_eq(&nr, right) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(LogicalPlan::Join {
                        left: nl,
                        right: nr,
                        join_type: *join_type,
                        condition: condition.clone(),
                    }))
                }
            }
            LogicalPlan::Limit { count, input } => {
                let new = f(input)?;
                if Arc::ptr_eq(&new, input) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(LogicalPlan::Limit {
                        count: Arc::clone(count),
                        input: new,
                    }))
                }
            }
            LogicalPlan::Subquery { alias, input } => {
                let new = f(input)?;
                if Arc::ptr_eq(&new, input) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(LogicalPlan::Subquery {
                        alias: alias.clone(),
                        input: new,
                    }))
                }
            }
        }
    }

    /// Pre-order rewrite over the plan tree.
    pub fn transform_down(self: &Arc<Self>, f: PlanRewriter<'_>) -> Arc<LogicalPlan> {
        let node = f(self).unwrap_or_else(|| Arc::clone(self));
        node.map_children(&mut |c| c.transform_down(f))
    }

    /// Post-order rewrite over the plan tree.
    pub fn transform_up(self: &Arc<Self>, f: PlanRewriter<'_>) -> Arc<LogicalPlan> {
        let node = self.map_children(&mut |c| c.transform_up(f));
        f(&node).unwrap_or(node)
    }

    /// Fallible pre-order rewrite.
    pub fn try_transform_down(
        self: &Arc<Self>,
        f: TryPlanRewriter<'_>,
    ) -> Result<Arc<LogicalPlan>> {
        let node = match f(self)? {
            Some(n) => n,
            None => Arc::clone(self),
        };
        node.try_map_children(&mut |c| c.try_transform_down(f))
    }

    /// Fallible post-order rewrite.
    pub fn try_transform_up(
        self: &Arc<Self>,
        f: TryPlanRewriter<'_>,
    ) -> Result<Arc<LogicalPlan>> {
        let node = self.try_map_children(&mut |c| c.try_transform_up(f))?;
        Ok(f(&node)?.unwrap_or(node))
    }

    /// Rebuild this node with each of its own expression fields mapped
    /// through `f`. Child plans are left untouched.
    pub fn map_expressions(
        self: &Arc<Self>,
        f: &mut dyn FnMut(&Arc<Expr>) -> Arc<Expr>,
    ) -> Arc<LogicalPlan> {
        self.try_map_expressions(&mut |e| Ok(f(e)))
            .unwrap_or_else(|_| Arc::clone(self))
    }

    /// Fallible form of [`LogicalPlan::map_expressions`].
    pub fn try_map_expressions(
        self: &Arc<Self>,
        f: &mut dyn FnMut(&Arc<Expr>) -> Result<Arc<Expr>>,
    ) -> Result<Arc<LogicalPlan>> {
        match self.as_ref() {
            LogicalPlan::Project { exprs, input } => {
                let mut changed = false;
                let mut new_exprs = Vec::with_capacity(exprs.len());
                for e in exprs {
                    let new = f(e)?;
                    changed |= !Arc::ptr_eq(&new, e);
                    new_exprs.push(new);
                }
                if changed {
                    Ok(Arc::new(LogicalPlan::Project {
                        exprs: new_exprs,
                        input: Arc::clone(input),
                    }))
                } else {
                    Ok(Arc::clone(self))
                }
            }
            LogicalPlan::Filter { predicate, input } => {
                let new = f(predicate)?;
                if Arc::ptr_eq(&new, predicate) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(LogicalPlan::Filter {
                        predicate: new,
                        input: Arc::clone(input),
                    }))
                }
            }
            LogicalPlan::Join {
                left,
                right,
                join_type,
                condition: Some(cond),
            } => {
                let new = f(cond)?;
                if Arc::ptr_eq(&new, cond) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(LogicalPlan::Join {
                        left: Arc::clone(left),
                        right: Arc::clone(right),
                        join_type: *join_type,
                        condition: Some(new),
                    }))
                }
            }
            LogicalPlan::Limit { count, input } => {
                let new = f(count)?;
                if Arc::ptr_eq(&new, count) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Arc::new(LogicalPlan::Limit {
                        count: new,
                        input: Arc::clone(input),
                    }))
                }
            }
            _ => Ok(Arc::clone(self)),
        }
    }

    /// Pre-order expression rewrite across the whole plan: every expression
    /// field of every node is rewritten with [`Expr::transform_down`].
    pub fn transform_expressions_down(
        self: &Arc<Self>,
        f: ExprRewriter<'_>,
    ) -> Arc<LogicalPlan> {
        self.transform_down(&|p| {
            let mapped = p.map_expressions(&mut |e| e.transform_down(f));
            if Arc::ptr_eq(&mapped, p) {
                None
            } else {
                Some(mapped)
            }
        })
    }

    /// Post-order expression rewrite across the whole plan.
    pub fn transform_expressions_up(self: &Arc<Self>, f: ExprRewriter<'_>) -> Arc<LogicalPlan> {
        self.transform_down(&|p| {
            let mapped = p.map_expressions(&mut |e| e.transform_up(f));
            if Arc::ptr_eq(&mapped, p) {
                None
            } else {
                Some(mapped)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOp;

    fn relation(name: &str, cols: &[(&str, DataType, bool)]) -> Arc<LogicalPlan> {
        Arc::new(LogicalPlan::Relation {
            name: name.to_string(),
            id: RelationId::next(),
            schema: cols
                .iter()
                .map(|(n, dt, nullable)| Attribute::new(*n, dt.clone(), *nullable))
                .collect(),
        })
    }

    #[test]
    fn filter_preserves_child_output() {
        let rel = relation("t", &[("a", DataType::Int64, false)]);
        let filter = LogicalPlan::Filter {
            predicate: Arc::new(Expr::boolean(true)),
            input: Arc::clone(&rel),
        };
        assert_eq!(filter.output(), rel.output());
    }

    #[test]
    fn outer_join_marks_null_extended_side_nullable() {
        let left = relation("l", &[("a", DataType::Int64, false)]);
        let right = relation("r", &[("b", DataType::Int64, false)]);
        let join = LogicalPlan::Join {
            left,
            right,
            join_type: JoinType::LeftOuter,
            condition: None,
        };
        let out = join.output();
        assert!(!out[0].nullable);
        assert!(out[1].nullable, "right side of a left outer join is nullable");
    }

    #[test]
    fn unresolved_relation_is_not_resolved() {
        let plan = LogicalPlan::UnresolvedRelation {
            name: "t".to_string(),
        };
        assert!(!plan.resolved());
        assert!(!plan.strictly_typed());
    }

    #[test]
    fn project_with_star_is_unresolved() {
        let rel = relation("t", &[("a", DataType::Int64, false)]);
        let plan = LogicalPlan::Project {
            exprs: vec![Arc::new(Expr::Star)],
            input: rel,
        };
        assert!(!plan.resolved());
    }

    #[test]
    fn transform_down_shares_untouched_branches() {
        let left = relation("l", &[("a", DataType::Int64, false)]);
        let right = relation("r", &[("b", DataType::Int64, false)]);
        let join = Arc::new(LogicalPlan::Join {
            left: Arc::clone(&left),
            right,
            join_type: JoinType::Inner,
            condition: None,
        });

        let unchanged = join.transform_down(&|_| None);
        assert!(Arc::ptr_eq(&unchanged, &join));

        let rewritten = join.transform_down(&|p| match p.as_ref() {
            LogicalPlan::Relation { name, .. } if name == "r" => {
                Some(Arc::new(LogicalPlan::UnresolvedRelation {
                    name: "swapped".to_string(),
                }))
            }
            _ => None,
        });
        match rewritten.as_ref() {
            LogicalPlan::Join {
                left: new_left,
                right: new_right,
                ..
            } => {
                assert!(Arc::ptr_eq(new_left, &left), "left branch is shared");
                assert!(matches!(
                    new_right.as_ref(),
                    LogicalPlan::UnresolvedRelation { .. }
                ));
            }
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn strictly_typed_requires_boolean_filter() {
        let rel = relation("t", &[("a", DataType::Int64, false)]);
        let a = rel.output()[0].clone();
        let bad = LogicalPlan::Filter {
            predicate: Arc::new(a.to_column()),
            input: Arc::clone(&rel),
        };
        assert!(bad.resolved());
        assert!(!bad.strictly_typed());

        let good = LogicalPlan::Filter {
            predicate: Arc::new(Expr::BinaryOp {
                left: Arc::new(a.to_column()),
                op: BinaryOp::Gt,
                right: Arc::new(Expr::int64(1)),
            }),
            input: rel,
        };
        assert!(good.strictly_typed());
    }
}
