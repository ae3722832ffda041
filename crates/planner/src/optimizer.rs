use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use quill_common::{AttrId, CompilerConfig, QuillError, Result};

use crate::explain::explain_logical;
use crate::expr::{Expr, LiteralValue};
use crate::logical_plan::{JoinType, LogicalPlan};
use crate::rules::{Rule, RuleBatch, RuleExecutor, TraceHook};

/// Algebraic optimizer over strictly typed plans.
///
/// Runs one unlimited fixed-point batch. Rule order matters: constant
/// folding runs before predicate simplification so folded true/false
/// branches collapse, and CNF conversion precedes filter push-down so
/// conjuncts can be split and pushed independently.
#[derive(Default)]
pub struct Optimizer {
    custom_rules: RwLock<Vec<Arc<dyn Rule>>>,
    trace: RwLock<Option<TraceHook>>,
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .custom_rules
            .read()
            .map(|r| r.len())
            .unwrap_or_default();
        f.debug_struct("Optimizer")
            .field("custom_rules", &count)
            .finish()
    }
}

impl Optimizer {
    /// Create an optimizer with the built-in rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a custom rule to the optimization batch. Custom rules run
    /// after the built-in rules in every fixed-point pass.
    pub fn register_rule(&self, rule: Arc<dyn Rule>) {
        self.custom_rules
            .write()
            .expect("custom rule lock poisoned")
            .push(rule);
    }

    /// Install a callback fired whenever a rule changes the plan.
    pub fn set_trace(&self, hook: TraceHook) {
        *self.trace.write().expect("trace hook lock poisoned") = Some(hook);
    }

    /// Optimize a strictly typed plan into a semantically equivalent one.
    pub fn optimize(
        &self,
        plan: &Arc<LogicalPlan>,
        cfg: &CompilerConfig,
    ) -> Result<Arc<LogicalPlan>> {
        if !plan.strictly_typed() {
            return Err(QuillError::Internal(format!(
                "optimizer input is not strictly typed:\n{}",
                explain_logical(plan)
            )));
        }

        let mut rule_list: Vec<Arc<dyn Rule>> = vec![
            Arc::new(FoldConstants),
            Arc::new(FoldLogicalPredicates),
            Arc::new(NullPropagation),
            Arc::new(CnfConversion {
                max_conjuncts: cfg.cnf_conjunct_limit,
            }),
            Arc::new(EliminateCommonPredicates),
            Arc::new(ReduceNegations),
            Arc::new(ReduceCasts),
            Arc::new(ReduceAliases),
            Arc::new(ReduceProjects),
            Arc::new(ReduceFilters),
            Arc::new(FoldConstantFilters),
            Arc::new(PushFiltersThroughProjects),
            Arc::new(PushFiltersThroughJoins {
                max_conjuncts: cfg.cnf_conjunct_limit,
            }),
            Arc::new(PushProjectsThroughLimits),
            Arc::new(ReduceLimits),
        ];
        rule_list.extend(
            self.custom_rules
                .read()
                .expect("custom rule lock poisoned")
                .iter()
                .cloned(),
        );

        let executor =
            RuleExecutor::new(vec![RuleBatch::fixed_point("optimizations", rule_list)])
                .with_safety_ceiling(cfg.max_fixed_point_passes);
        let trace = self
            .trace
            .read()
            .expect("trace hook lock poisoned")
            .clone();
        let optimized = executor.execute(plan, trace.as_ref())?;
        ensure_schema_preserved(plan, &optimized)?;
        Ok(optimized)
    }
}

/// Output schema must survive optimization: same names, datatypes, order.
/// Nullability may narrow when conditional branches fold away, so it is not
/// compared here.
fn ensure_schema_preserved(
    before: &Arc<LogicalPlan>,
    after: &Arc<LogicalPlan>,
) -> Result<()> {
    let b = before.output();
    let a = after.output();
    let same = b.len() == a.len()
        && b.iter()
            .zip(a.iter())
            .all(|(x, y)| x.name == y.name && x.data_type == y.data_type);
    if same {
        Ok(())
    } else {
        Err(QuillError::Internal(format!(
            "optimization changed the output schema\nbefore:\n{}after:\n{}",
            explain_logical(before),
            explain_logical(after)
        )))
    }
}

// -----------------------------
// Expression-level rules
// -----------------------------

fn is_true(e: &Expr) -> bool {
    matches!(
        e,
        Expr::Literal {
            value: LiteralValue::Boolean(true),
            ..
        }
    )
}

fn is_false(e: &Expr) -> bool {
    matches!(
        e,
        Expr::Literal {
            value: LiteralValue::Boolean(false),
            ..
        }
    )
}

fn is_null_literal(e: &Expr) -> bool {
    matches!(
        e,
        Expr::Literal {
            value: LiteralValue::Null,
            ..
        }
    )
}

/// Replaces every foldable expression with the literal it evaluates to.
struct FoldConstants;

impl Rule for FoldConstants {
    fn name(&self) -> &str {
        "fold_constants"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        Ok(plan.transform_expressions_up(&|e| {
            // Aliases carry projection identity and must survive folding.
            if matches!(e.as_ref(), Expr::Literal { .. } | Expr::Alias { .. }) {
                return None;
            }
            if !e.foldable() {
                return None;
            }
            let value = e.evaluate()?;
            Some(Arc::new(Expr::Literal {
                value,
                data_type: e.data_type(),
            }))
        }))
    }
}

/// Boolean identities over literal true/false and duplicate operands.
struct FoldLogicalPredicates;

impl Rule for FoldLogicalPredicates {
    fn name(&self) -> &str {
        "fold_logical_predicates"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        Ok(plan.transform_expressions_down(&|e| match e.as_ref() {
            Expr::Or(l, r) => {
                if is_true(l) || is_true(r) {
                    return Some(Arc::new(Expr::boolean(true)));
                }
                if is_false(l) {
                    return Some(Arc::clone(r));
                }
                if is_false(r) {
                    return Some(Arc::clone(l));
                }
                if l.same_or_equal(r) {
                    return Some(Arc::clone(l));
                }
                None
            }
            Expr::And(l, r) => {
                if is_false(l) || is_false(r) {
                    return Some(Arc::new(Expr::boolean(false)));
                }
                if is_true(l) {
                    return Some(Arc::clone(r));
                }
                if is_true(r) {
                    return Some(Arc::clone(l));
                }
                if l.same_or_equal(r) {
                    return Some(Arc::clone(l));
                }
                None
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                if is_true(cond) {
                    return Some(Arc::clone(then));
                }
                if is_false(cond) {
                    return Some(Arc::clone(otherwise));
                }
                None
            }
            _ => None,
        }))
    }
}

/// Null-strict operator collapse plus null tests over non-nullable inputs.
///
/// Restricted to the `BinaryOp` variant: every comparison and arithmetic
/// operator is null-strict, while `And`/`Or`/`If`/`Coalesce` are separate
/// variants with their own null semantics.
struct NullPropagation;

impl Rule for NullPropagation {
    fn name(&self) -> &str {
        "null_propagation"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        Ok(plan.transform_expressions_down(&|e| match e.as_ref() {
            Expr::BinaryOp { left, right, .. } => {
                if is_null_literal(left) || is_null_literal(right) {
                    Some(Arc::new(Expr::Cast {
                        child: Arc::new(Expr::literal(LiteralValue::Null)),
                        to_type: e.data_type(),
                    }))
                } else {
                    None
                }
            }
            Expr::IsNull(child) => {
                if !child.nullable() {
                    Some(Arc::new(Expr::boolean(false)))
                } else {
                    None
                }
            }
            Expr::IsNotNull(child) => {
                if !child.nullable() {
                    Some(Arc::new(Expr::boolean(true)))
                } else {
                    None
                }
            }
            Expr::Coalesce(args) if args.len() == 1 => {
                let only = &args[0];
                if is_null_literal(only) {
                    Some(Arc::new(Expr::Cast {
                        child: Arc::new(Expr::literal(LiteralValue::Null)),
                        to_type: e.data_type(),
                    }))
                } else if !only.nullable() {
                    Some(Arc::clone(only))
                } else {
                    None
                }
            }
            _ => None,
        }))
    }
}

/// Rewrites filter predicates into conjunctive normal form so later rules
/// can split and push conjuncts independently. Skipped when distribution
/// would exceed the conjunct cap.
struct CnfConversion {
    max_conjuncts: usize,
}

impl Rule for CnfConversion {
    fn name(&self) -> &str {
        "cnf_conversion"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        Ok(plan.transform_down(&|p| {
            let LogicalPlan::Filter { predicate, input } = p.as_ref() else {
                return None;
            };
            let cnf = to_cnf(predicate, self.max_conjuncts)?;
            if cnf.as_ref() == predicate.as_ref() {
                return None;
            }
            Some(Arc::new(LogicalPlan::Filter {
                predicate: cnf,
                input: Arc::clone(input),
            }))
        }))
    }
}

/// CNF of `e`, or `None` when conversion would exceed `limit` conjuncts.
fn to_cnf(e: &Arc<Expr>, limit: usize) -> Option<Arc<Expr>> {
    let conjuncts = cnf_list(&nnf(e), limit)?;
    Some(combine_conjuncts(conjuncts))
}

/// Negation normal form: `Not` pushed onto atoms via De Morgan and
/// double-negation elimination.
fn nnf(e: &Arc<Expr>) -> Arc<Expr> {
    match e.as_ref() {
        Expr::And(a, b) => Arc::new(Expr::And(nnf(a), nnf(b))),
        Expr::Or(a, b) => Arc::new(Expr::Or(nnf(a), nnf(b))),
        Expr::Not(x) => negate(x),
        _ => Arc::clone(e),
    }
}

fn negate(e: &Arc<Expr>) -> Arc<Expr> {
    match e.as_ref() {
        Expr::Not(x) => nnf(x),
        Expr::And(a, b) => Arc::new(Expr::Or(negate(a), negate(b))),
        Expr::Or(a, b) => Arc::new(Expr::And(negate(a), negate(b))),
        _ => Arc::new(Expr::Not(Arc::clone(e))),
    }
}

/// Conjunct list of an NNF expression, distributing Or over And.
fn cnf_list(e: &Arc<Expr>, limit: usize) -> Option<Vec<Arc<Expr>>> {
    match e.as_ref() {
        Expr::And(a, b) => {
            let mut l = cnf_list(a, limit)?;
            let r = cnf_list(b, limit)?;
            if l.len() + r.len() > limit {
                return None;
            }
            l.extend(r);
            Some(l)
        }
        Expr::Or(a, b) => {
            let l = cnf_list(a, limit)?;
            let r = cnf_list(b, limit)?;
            if l.len().saturating_mul(r.len()) > limit {
                return None;
            }
            let mut out = Vec::with_capacity(l.len() * r.len());
            for x in &l {
                for y in &r {
                    out.push(Arc::new(Expr::Or(Arc::clone(x), Arc::clone(y))));
                }
            }
            Some(out)
        }
        _ => Some(vec![Arc::clone(e)]),
    }
}

/// Conjuncts of a predicate, flattening nested `And`s.
fn split_conjuncts(e: &Arc<Expr>) -> Vec<Arc<Expr>> {
    match e.as_ref() {
        Expr::And(a, b) => {
            let mut v = split_conjuncts(a);
            v.extend(split_conjuncts(b));
            v
        }
        _ => vec![Arc::clone(e)],
    }
}

/// Left-fold a non-empty conjunct list back into a predicate.
fn combine_conjuncts(mut v: Vec<Arc<Expr>>) -> Arc<Expr> {
    if v.is_empty() {
        return Arc::new(Expr::boolean(true));
    }
    let first = v.remove(0);
    v.into_iter()
        .fold(first, |acc, e| Arc::new(Expr::And(acc, e)))
}

/// Duplicate operand elimination, keyed on structural equality modulo
/// aliases.
struct EliminateCommonPredicates;

impl Rule for EliminateCommonPredicates {
    fn name(&self) -> &str {
        "eliminate_common_predicates"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        Ok(plan.transform_expressions_down(&|e| match e.as_ref() {
            Expr::And(l, r) | Expr::Or(l, r) if l.same_or_equal(r) => Some(Arc::clone(l)),
            Expr::If {
                then, otherwise, ..
            } if then.same_or_equal(otherwise) => {
                // If(c, x, x) evaluates to x for every value of c, null
                // included.
                Some(Arc::clone(then))
            }
            _ => None,
        }))
    }
}

/// Negation rewrites: double negation, comparison inversion, complementary
/// operands. Rewrites that are unsound for nullable inputs under
/// three-valued logic are guarded on non-nullability.
struct ReduceNegations;

fn complementary(l: &Arc<Expr>, r: &Arc<Expr>) -> bool {
    let pair = |a: &Arc<Expr>, b: &Arc<Expr>| {
        matches!(b.as_ref(), Expr::Not(inner) if a.same_or_equal(inner) && !a.nullable())
    };
    pair(l, r) || pair(r, l)
}

impl Rule for ReduceNegations {
    fn name(&self) -> &str {
        "reduce_negations"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        Ok(plan.transform_expressions_down(&|e| match e.as_ref() {
            Expr::Not(x) => match x.as_ref() {
                Expr::Not(inner) => Some(Arc::clone(inner)),
                Expr::BinaryOp { left, op, right } => op.negated().map(|neg| {
                    Arc::new(Expr::BinaryOp {
                        left: Arc::clone(left),
                        op: neg,
                        right: Arc::clone(right),
                    })
                }),
                Expr::IsNull(c) => Some(Arc::new(Expr::IsNotNull(Arc::clone(c)))),
                Expr::IsNotNull(c) => Some(Arc::new(Expr::IsNull(Arc::clone(c)))),
                _ => None,
            },
            Expr::If {
                cond,
                then,
                otherwise,
            } => match cond.as_ref() {
                Expr::Not(inner) if !inner.nullable() => Some(Arc::new(Expr::If {
                    cond: Arc::clone(inner),
                    then: Arc::clone(otherwise),
                    otherwise: Arc::clone(then),
                })),
                _ => None,
            },
            Expr::And(l, r) if complementary(l, r) => Some(Arc::new(Expr::boolean(false))),
            Expr::Or(l, r) if complementary(l, r) => Some(Arc::new(Expr::boolean(true))),
            _ => None,
        }))
    }
}

/// Identity and nested cast elimination.
///
/// Dropping the inner cast of `cast(cast(e))` is safe because analysis only
/// inserts widening casts; a narrowing inner cast would make this rewrite
/// observable.
struct ReduceCasts;

impl Rule for ReduceCasts {
    fn name(&self) -> &str {
        "reduce_casts"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        Ok(plan.transform_expressions_down(&|e| {
            let Expr::Cast { child, to_type } = e.as_ref() else {
                return None;
            };
            if child.data_type() == *to_type {
                return Some(Arc::clone(child));
            }
            if let Expr::Cast { child: inner, .. } = child.as_ref() {
                return Some(Arc::new(Expr::Cast {
                    child: Arc::clone(inner),
                    to_type: to_type.clone(),
                }));
            }
            None
        }))
    }
}

/// Collapses alias-of-alias chains onto the outermost name and id.
struct ReduceAliases;

impl Rule for ReduceAliases {
    fn name(&self) -> &str {
        "reduce_aliases"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        Ok(plan.transform_expressions_up(&|e| {
            let Expr::Alias { child, name, id } = e.as_ref() else {
                return None;
            };
            let Expr::Alias { child: inner, .. } = child.as_ref() else {
                return None;
            };
            Some(Arc::new(Expr::Alias {
                child: Arc::clone(inner),
                name: name.clone(),
                id: *id,
            }))
        }))
    }
}

// -----------------------------
// Plan-level rules
// -----------------------------

/// Map from a projection's output ids to the expressions producing them.
fn substitution_map(exprs: &[Arc<Expr>]) -> HashMap<AttrId, Arc<Expr>> {
    let mut map = HashMap::new();
    for e in exprs {
        match e.as_ref() {
            Expr::Alias { child, id, .. } => {
                map.insert(*id, Arc::clone(child));
            }
            Expr::ColumnRef(attr) => {
                map.insert(attr.id, Arc::clone(e));
            }
            _ => {}
        }
    }
    map
}

/// Replace attribute references whose id appears in `map` with the mapped
/// expression.
fn substitute(e: &Arc<Expr>, map: &HashMap<AttrId, Arc<Expr>>) -> Arc<Expr> {
    e.transform_down(&|x| match x.as_ref() {
        Expr::ColumnRef(attr) => map.get(&attr.id).map(Arc::clone),
        _ => None,
    })
}

/// Substitute inside a projection expression while preserving the name and
/// id it exposes: a bare reference whose substitute is a computation gets
/// re-aliased under its original identity.
fn substitute_projection(e: &Arc<Expr>, map: &HashMap<AttrId, Arc<Expr>>) -> Arc<Expr> {
    match e.as_ref() {
        Expr::Alias { child, name, id } => {
            let new = substitute(child, map);
            if Arc::ptr_eq(&new, child) {
                Arc::clone(e)
            } else {
                Arc::new(Expr::Alias {
                    child: new,
                    name: name.clone(),
                    id: *id,
                })
            }
        }
        Expr::ColumnRef(attr) => match map.get(&attr.id) {
            Some(sub) if matches!(sub.as_ref(), Expr::ColumnRef(_)) => Arc::clone(sub),
            Some(sub) => Arc::new(Expr::Alias {
                child: Arc::clone(sub),
                name: attr.name.clone(),
                id: attr.id,
            }),
            None => Arc::clone(e),
        },
        _ => substitute(e, map),
    }
}

/// Removes identity projections and merges nested ones.
struct ReduceProjects;

impl Rule for ReduceProjects {
    fn name(&self) -> &str {
        "reduce_projects"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        Ok(plan.transform_down(&|p| {
            let LogicalPlan::Project { exprs, input } = p.as_ref() else {
                return None;
            };

            let child_out = input.output();
            if exprs.len() == child_out.len() {
                let identity = exprs.iter().zip(child_out.iter()).all(|(e, a)| {
                    matches!(e.as_ref(), Expr::ColumnRef(c) if c.id == a.id)
                });
                if identity {
                    return Some(Arc::clone(input));
                }
            }

            if let LogicalPlan::Project {
                exprs: inner,
                input: grandchild,
            } = input.as_ref()
            {
                let map = substitution_map(inner);
                let merged = exprs
                    .iter()
                    .map(|e| substitute_projection(e, &map))
                    .collect();
                return Some(Arc::new(LogicalPlan::Project {
                    exprs: merged,
                    input: Arc::clone(grandchild),
                }));
            }
            None
        }))
    }
}

/// Merges adjacent filters into one conjunction.
struct ReduceFilters;

impl Rule for ReduceFilters {
    fn name(&self) -> &str {
        "reduce_filters"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        Ok(plan.transform_down(&|p| {
            let LogicalPlan::Filter {
                predicate: outer,
                input,
            } = p.as_ref()
            else {
                return None;
            };
            let LogicalPlan::Filter {
                predicate: inner,
                input: grandchild,
            } = input.as_ref()
            else {
                return None;
            };
            Some(Arc::new(LogicalPlan::Filter {
                predicate: Arc::new(Expr::And(Arc::clone(inner), Arc::clone(outer))),
                input: Arc::clone(grandchild),
            }))
        }))
    }
}

/// Removes always-true filters and replaces always-false filters with an
/// empty local relation carrying the same schema.
struct FoldConstantFilters;

impl Rule for FoldConstantFilters {
    fn name(&self) -> &str {
        "fold_constant_filters"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        Ok(plan.transform_down(&|p| {
            let LogicalPlan::Filter { predicate, input } = p.as_ref() else {
                return None;
            };
            if is_true(predicate) {
                return Some(Arc::clone(input));
            }
            if is_false(predicate) {
                return Some(Arc::new(LogicalPlan::LocalRelation {
                    rows: vec![],
                    schema: input.output(),
                }));
            }
            None
        }))
    }
}

/// Moves filters below projections, substituting projected expressions into
/// the predicate.
struct PushFiltersThroughProjects;

impl Rule for PushFiltersThroughProjects {
    fn name(&self) -> &str {
        "push_filters_through_projects"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        Ok(plan.transform_down(&|p| {
            let LogicalPlan::Filter { predicate, input } = p.as_ref() else {
                return None;
            };
            let LogicalPlan::Project {
                exprs,
                input: below,
            } = input.as_ref()
            else {
                return None;
            };
            let map = substitution_map(exprs);
            let pushed = substitute(predicate, &map);
            Some(Arc::new(LogicalPlan::Project {
                exprs: exprs.clone(),
                input: Arc::new(LogicalPlan::Filter {
                    predicate: pushed,
                    input: Arc::clone(below),
                }),
            }))
        }))
    }
}

/// Splits an inner-join filter into per-side pushdowns and a residual join
/// condition.
struct PushFiltersThroughJoins {
    max_conjuncts: usize,
}

impl Rule for PushFiltersThroughJoins {
    fn name(&self) -> &str {
        "push_filters_through_joins"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        Ok(plan.transform_down(&|p| {
            let LogicalPlan::Filter { predicate, input } = p.as_ref() else {
                return None;
            };
            let LogicalPlan::Join {
                left,
                right,
                join_type: JoinType::Inner,
                condition,
            } = input.as_ref()
            else {
                return None;
            };

            let normalized =
                to_cnf(predicate, self.max_conjuncts).unwrap_or_else(|| Arc::clone(predicate));
            let conjuncts = split_conjuncts(&normalized);

            let left_ids: HashSet<AttrId> = left.output().iter().map(|a| a.id).collect();
            let right_ids: HashSet<AttrId> = right.output().iter().map(|a| a.id).collect();

            let mut push_left = Vec::new();
            let mut push_right = Vec::new();
            let mut keep = Vec::new();
            for c in conjuncts {
                let refs = c.references();
                if refs.iter().all(|id| left_ids.contains(id)) {
                    push_left.push(c);
                } else if refs.iter().all(|id| right_ids.contains(id)) {
                    push_right.push(c);
                } else {
                    keep.push(c);
                }
            }

            let new_left = if push_left.is_empty() {
                Arc::clone(left)
            } else {
                Arc::new(LogicalPlan::Filter {
                    predicate: combine_conjuncts(push_left),
                    input: Arc::clone(left),
                })
            };
            let new_right = if push_right.is_empty() {
                Arc::clone(right)
            } else {
                Arc::new(LogicalPlan::Filter {
                    predicate: combine_conjuncts(push_right),
                    input: Arc::clone(right),
                })
            };

            let mut residual: Vec<Arc<Expr>> = condition.iter().cloned().collect();
            residual.extend(keep);
            let new_condition = if residual.is_empty() {
                None
            } else {
                Some(combine_conjuncts(residual))
            };

            Some(Arc::new(LogicalPlan::Join {
                left: new_left,
                right: new_right,
                join_type: JoinType::Inner,
                condition: new_condition,
            }))
        }))
    }
}

/// Moves projections below limits; projection is row-preserving so the
/// bound is unaffected.
struct PushProjectsThroughLimits;

impl Rule for PushProjectsThroughLimits {
    fn name(&self) -> &str {
        "push_projects_through_limits"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        Ok(plan.transform_down(&|p| {
            let LogicalPlan::Project { exprs, input } = p.as_ref() else {
                return None;
            };
            let LogicalPlan::Limit {
                count,
                input: below,
            } = input.as_ref()
            else {
                return None;
            };
            Some(Arc::new(LogicalPlan::Limit {
                count: Arc::clone(count),
                input: Arc::new(LogicalPlan::Project {
                    exprs: exprs.clone(),
                    input: Arc::clone(below),
                }),
            }))
        }))
    }
}

/// Collapses stacked limits onto the tighter bound.
struct ReduceLimits;

impl Rule for ReduceLimits {
    fn name(&self) -> &str {
        "reduce_limits"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        Ok(plan.transform_down(&|p| {
            let LogicalPlan::Limit { count: outer, input } = p.as_ref() else {
                return None;
            };
            let LogicalPlan::Limit {
                count: inner,
                input: grandchild,
            } = input.as_ref()
            else {
                return None;
            };
            let tighter = Arc::new(Expr::If {
                cond: Arc::new(Expr::BinaryOp {
                    left: Arc::clone(outer),
                    op: crate::expr::BinaryOp::Lt,
                    right: Arc::clone(inner),
                }),
                then: Arc::clone(outer),
                otherwise: Arc::clone(inner),
            });
            Some(Arc::new(LogicalPlan::Limit {
                count: tighter,
                input: Arc::clone(grandchild),
            }))
        }))
    }
}
