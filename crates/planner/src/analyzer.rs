use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use arrow_schema::DataType;
use quill_common::{CompilerConfig, QuillError, RelationId, Result};

use crate::explain::{explain_expr, explain_logical};
use crate::expr::{is_numeric, wider_numeric, Attribute, Expr};
use crate::logical_plan::LogicalPlan;
use crate::rules::{Rule, RuleBatch, RuleExecutor, TraceHook};

/// The analyzer needs relation schemas to resolve names.
/// The embedding engine provides this from its catalog.
pub trait Catalog: Send + Sync {
    /// Return the resolved base relation registered under `name`.
    fn lookup_relation(&self, name: &str) -> Result<Arc<LogicalPlan>>;
}

/// In-memory [`Catalog`].
///
/// Attribute ids are stamped once at registration, so repeated lookups of
/// the same table return identical attribute identities. That is what makes
/// `Join(t, t)` detectable as a self-join.
#[derive(Default)]
pub struct MemoryCatalog {
    tables: HashMap<String, Arc<LogicalPlan>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table and return its stamped relation plan.
    pub fn register_table(
        &mut self,
        name: &str,
        columns: Vec<(&str, DataType, bool)>,
    ) -> Arc<LogicalPlan> {
        let schema = columns
            .into_iter()
            .map(|(n, dt, nullable)| Attribute::new(n, dt, nullable))
            .collect();
        let rel = Arc::new(LogicalPlan::Relation {
            name: name.to_string(),
            id: RelationId::next(),
            schema,
        });
        self.tables.insert(name.to_string(), Arc::clone(&rel));
        rel
    }
}

impl Catalog for MemoryCatalog {
    fn lookup_relation(&self, name: &str) -> Result<Arc<LogicalPlan>> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| QuillError::TableNotFound(name.to_string()))
    }
}

/// Logical-plan semantic analyzer.
///
/// Runs one unlimited fixed-point batch of resolution rules over the input.
///
/// Guarantees:
/// - unresolved relations are bound through the catalog;
/// - `*` projections are expanded and unresolved columns become attribute
///   references with stable ids;
/// - implicit casts are inserted along the numeric widening lattice;
/// - the output is strictly typed, or analysis fails; a partially resolved
///   plan is never returned.
pub struct Analyzer {
    catalog: Arc<dyn Catalog>,
    trace: RwLock<Option<TraceHook>>,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer").finish_non_exhaustive()
    }
}

impl Analyzer {
    /// Create an analyzer over the given catalog.
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            trace: RwLock::new(None),
        }
    }

    /// Install a callback fired whenever a rule changes the plan.
    pub fn set_trace(&self, hook: TraceHook) {
        *self.trace.write().expect("trace hook lock poisoned") = Some(hook);
    }

    /// Analyze a logical plan and return its strictly typed form.
    pub fn analyze(
        &self,
        plan: &Arc<LogicalPlan>,
        cfg: &CompilerConfig,
    ) -> Result<Arc<LogicalPlan>> {
        let batches = vec![RuleBatch::fixed_point(
            "resolution",
            vec![
                Arc::new(ExpandStars) as Arc<dyn Rule>,
                Arc::new(ResolveRelations {
                    catalog: Arc::clone(&self.catalog),
                }),
                Arc::new(ResolveReferences),
                Arc::new(ResolveSelfJoins),
                Arc::new(ApplyImplicitCasts),
                Arc::new(EliminateSubqueries),
            ],
        )];
        let executor =
            RuleExecutor::new(batches).with_safety_ceiling(cfg.max_fixed_point_passes);
        let trace = self
            .trace
            .read()
            .expect("trace hook lock poisoned")
            .clone();
        let analyzed = executor.execute(plan, trace.as_ref())?;

        if !analyzed.resolved() {
            return Err(QuillError::Resolution {
                attr: first_unresolved_name(&analyzed).unwrap_or_else(|| "*".to_string()),
                reason: "plan is not fully resolved after analysis".to_string(),
                plan: explain_logical(&analyzed),
            });
        }
        if !analyzed.strictly_typed() {
            return Err(QuillError::Internal(format!(
                "analysis produced a resolved but not strictly typed plan:\n{}",
                explain_logical(&analyzed)
            )));
        }
        Ok(analyzed)
    }
}

fn first_unresolved_name(plan: &LogicalPlan) -> Option<String> {
    if let LogicalPlan::UnresolvedRelation { name } = plan {
        return Some(name.clone());
    }
    for e in plan.expressions() {
        if let Some(n) = first_unresolved_in_expr(&e) {
            return Some(n);
        }
    }
    for c in plan.children() {
        if let Some(n) = first_unresolved_name(&c) {
            return Some(n);
        }
    }
    None
}

fn first_unresolved_in_expr(e: &Expr) -> Option<String> {
    match e {
        Expr::Column(name) => Some(name.clone()),
        Expr::Star => Some("*".to_string()),
        other => other
            .children()
            .iter()
            .find_map(|c| first_unresolved_in_expr(c)),
    }
}

// -------------------------
// Resolution rules
// -------------------------

/// Expands `*` in projections over resolved inputs into the input's output
/// columns, in order.
struct ExpandStars;

impl Rule for ExpandStars {
    fn name(&self) -> &str {
        "expand_stars"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        plan.try_transform_up(&|p| {
            let LogicalPlan::Project { exprs, input } = p.as_ref() else {
                return Ok(None);
            };
            if !input.resolved() || !exprs.iter().any(|e| matches!(e.as_ref(), Expr::Star)) {
                return Ok(None);
            }
            let mut expanded: Vec<Arc<Expr>> = Vec::new();
            for e in exprs {
                if matches!(e.as_ref(), Expr::Star) {
                    expanded.extend(input.output().iter().map(|a| Arc::new(a.to_column())));
                } else {
                    expanded.push(Arc::clone(e));
                }
            }
            Ok(Some(Arc::new(LogicalPlan::Project {
                exprs: expanded,
                input: Arc::clone(input),
            })))
        })
    }
}

/// Binds unresolved relations through the catalog.
struct ResolveRelations {
    catalog: Arc<dyn Catalog>,
}

impl Rule for ResolveRelations {
    fn name(&self) -> &str {
        "resolve_relations"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        plan.try_transform_up(&|p| match p.as_ref() {
            LogicalPlan::UnresolvedRelation { name } => {
                Ok(Some(self.catalog.lookup_relation(name)?))
            }
            _ => Ok(None),
        })
    }
}

/// Binds unresolved column names against the concatenated outputs of a
/// node's (already strictly typed) children, and gives bare projection
/// expressions an implicit alias so `Project` output stays well defined.
struct ResolveReferences;

impl Rule for ResolveReferences {
    fn name(&self) -> &str {
        "resolve_references"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        plan.try_transform_up(&|p| {
            if !p.children().iter().all(|c| c.strictly_typed()) {
                return Ok(None);
            }
            let inputs: Vec<Attribute> =
                p.children().iter().flat_map(|c| c.output()).collect();

            let resolved = p.try_map_expressions(&mut |e| {
                e.try_transform_up(&|x| match x.as_ref() {
                    Expr::Column(name) => {
                        let candidates: Vec<&Attribute> =
                            inputs.iter().filter(|a| a.name == *name).collect();
                        match candidates.len() {
                            0 => Err(QuillError::Resolution {
                                attr: name.clone(),
                                reason: "No candidate input attribute(s) found".to_string(),
                                plan: explain_logical(p),
                            }),
                            1 => Ok(Some(Arc::new(candidates[0].to_column()))),
                            _ => Err(QuillError::Resolution {
                                attr: name.clone(),
                                reason: format!(
                                    "ambiguous reference; candidates: {}",
                                    candidates
                                        .iter()
                                        .map(|a| format!("{}#{} {}", a.name, a.id, a.data_type))
                                        .collect::<Vec<_>>()
                                        .join(", ")
                                ),
                                plan: explain_logical(p),
                            }),
                        }
                    }
                    _ => Ok(None),
                })
            })?;

            let aliased = alias_bare_projections(&resolved);
            if Arc::ptr_eq(&aliased, p) {
                Ok(None)
            } else {
                Ok(Some(aliased))
            }
        })
    }
}

/// Wraps resolved, unnamed projection expressions in an alias named after
/// their rendered form. Idempotent: named expressions are left alone.
fn alias_bare_projections(plan: &Arc<LogicalPlan>) -> Arc<LogicalPlan> {
    let LogicalPlan::Project { exprs, input } = plan.as_ref() else {
        return Arc::clone(plan);
    };
    let mut changed = false;
    let mut new_exprs = Vec::with_capacity(exprs.len());
    for e in exprs {
        let bare = e.resolved()
            && e.to_attribute().is_none()
            && !matches!(e.as_ref(), Expr::Star);
        if bare {
            changed = true;
            let name = explain_expr(e);
            new_exprs.push(Arc::new(Expr::alias(Arc::clone(e), name)));
        } else {
            new_exprs.push(Arc::clone(e));
        }
    }
    if changed {
        Arc::new(LogicalPlan::Project {
            exprs: new_exprs,
            input: Arc::clone(input),
        })
    } else {
        Arc::clone(plan)
    }
}

/// Rejects joins whose sides expose the same attribute ids.
///
/// Intentionally conservative: lifting this requires renaming the
/// right-hand attributes, which resolution does not do yet.
struct ResolveSelfJoins;

impl Rule for ResolveSelfJoins {
    fn name(&self) -> &str {
        "resolve_self_joins"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        plan.try_transform_down(&|p| {
            if let LogicalPlan::Join { left, right, .. } = p.as_ref() {
                if left.resolved() && right.resolved() {
                    let l: Vec<_> = left.output().iter().map(|a| a.id).collect();
                    let r: Vec<_> = right.output().iter().map(|a| a.id).collect();
                    if !l.is_empty() && l == r {
                        return Err(QuillError::Unsupported(
                            "Self-join is not supported yet".to_string(),
                        ));
                    }
                }
            }
            Ok(None)
        })
    }
}

/// Inserts the casts required to satisfy operator signatures, following the
/// numeric widening lattice. Fails when no cast suffices.
struct ApplyImplicitCasts;

impl Rule for ApplyImplicitCasts {
    fn name(&self) -> &str {
        "apply_implicit_casts"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        plan.try_transform_up(&|p| {
            if !p.resolved() {
                return Ok(None);
            }
            let coerced = p.try_map_expressions(&mut |e| {
                e.try_transform_up(&coerce_expr)
            })?;
            let coerced = coerce_operator_shapes(&coerced)?;
            if Arc::ptr_eq(&coerced, p) {
                Ok(None)
            } else {
                Ok(Some(coerced))
            }
        })
    }
}

/// Boolean/integer contexts imposed by the operators themselves rather than
/// by expressions: filter predicates, join conditions, limit counts.
fn coerce_operator_shapes(plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
    match plan.as_ref() {
        LogicalPlan::Filter { predicate, input } => {
            match predicate.data_type() {
                DataType::Boolean => Ok(Arc::clone(plan)),
                DataType::Null => Ok(Arc::new(LogicalPlan::Filter {
                    predicate: cast_to(predicate, DataType::Boolean),
                    input: Arc::clone(input),
                })),
                other => Err(type_check(predicate, format!(
                    "filter predicate must be boolean, got {other}"
                ))),
            }
        }
        LogicalPlan::Join {
            left,
            right,
            join_type,
            condition: Some(cond),
        } => match cond.data_type() {
            DataType::Boolean => Ok(Arc::clone(plan)),
            DataType::Null => Ok(Arc::new(LogicalPlan::Join {
                left: Arc::clone(left),
                right: Arc::clone(right),
                join_type: *join_type,
                condition: Some(cast_to(cond, DataType::Boolean)),
            })),
            other => Err(type_check(cond, format!(
                "join condition must be boolean, got {other}"
            ))),
        },
        LogicalPlan::Limit { count, input } => {
            let dt = count.data_type();
            if dt == DataType::Int64 {
                Ok(Arc::clone(plan))
            } else if dt == DataType::Null || is_numeric(&dt) {
                Ok(Arc::new(LogicalPlan::Limit {
                    count: cast_to(count, DataType::Int64),
                    input: Arc::clone(input),
                }))
            } else {
                Err(type_check(count, format!(
                    "limit count must be an integer, got {dt}"
                )))
            }
        }
        _ => Ok(Arc::clone(plan)),
    }
}

/// Per-operator strictly typed form. Applied post-order so child casts are
/// already in place when a parent is examined.
fn coerce_expr(e: &Arc<Expr>) -> Result<Option<Arc<Expr>>> {
    match e.as_ref() {
        Expr::Not(child) => {
            let new = coerce_boolean_operand(child, "NOT")?;
            if Arc::ptr_eq(&new, child) {
                Ok(None)
            } else {
                Ok(Some(Arc::new(Expr::Not(new))))
            }
        }
        Expr::And(l, r) => {
            let (nl, nr) = (
                coerce_boolean_operand(l, "AND")?,
                coerce_boolean_operand(r, "AND")?,
            );
            if Arc::ptr_eq(&nl, l) && Arc::ptr_eq(&nr, r) {
                Ok(None)
            } else {
                Ok(Some(Arc::new(Expr::And(nl, nr))))
            }
        }
        Expr::Or(l, r) => {
            let (nl, nr) = (
                coerce_boolean_operand(l, "OR")?,
                coerce_boolean_operand(r, "OR")?,
            );
            if Arc::ptr_eq(&nl, l) && Arc::ptr_eq(&nr, r) {
                Ok(None)
            } else {
                Ok(Some(Arc::new(Expr::Or(nl, nr))))
            }
        }
        Expr::BinaryOp { left, op, right } => {
            let (nl, nr) = if op.is_comparison() {
                coerce_for_compare(e, left, right)?
            } else {
                coerce_for_arith(e, *op, left, right)?
            };
            if Arc::ptr_eq(&nl, left) && Arc::ptr_eq(&nr, right) {
                Ok(None)
            } else {
                Ok(Some(Arc::new(Expr::BinaryOp {
                    left: nl,
                    op: *op,
                    right: nr,
                })))
            }
        }
        Expr::If {
            cond,
            then,
            otherwise,
        } => {
            let nc = coerce_boolean_operand(cond, "IF")?;
            let target = unify_types(&then.data_type(), &otherwise.data_type())
                .ok_or_else(|| {
                    type_check(
                        e,
                        format!(
                            "cannot unify branch types {} and {}",
                            then.data_type(),
                            otherwise.data_type()
                        ),
                    )
                })?;
            let (nt, ne) = (cast_if_needed(then, &target), cast_if_needed(otherwise, &target));
            if Arc::ptr_eq(&nc, cond) && Arc::ptr_eq(&nt, then) && Arc::ptr_eq(&ne, otherwise) {
                Ok(None)
            } else {
                Ok(Some(Arc::new(Expr::If {
                    cond: nc,
                    then: nt,
                    otherwise: ne,
                })))
            }
        }
        Expr::Coalesce(args) if !args.is_empty() => {
            let mut target = args[0].data_type();
            for a in &args[1..] {
                target = unify_types(&target, &a.data_type()).ok_or_else(|| {
                    type_check(
                        e,
                        format!(
                            "cannot unify coalesce argument types {target} and {}",
                            a.data_type()
                        ),
                    )
                })?;
            }
            let mut changed = false;
            let mut new_args = Vec::with_capacity(args.len());
            for a in args {
                let new = cast_if_needed(a, &target);
                changed |= !Arc::ptr_eq(&new, a);
                new_args.push(new);
            }
            if changed {
                Ok(Some(Arc::new(Expr::Coalesce(new_args))))
            } else {
                Ok(None)
            }
        }
        _ => Ok(None),
    }
}

fn coerce_boolean_operand(e: &Arc<Expr>, op_name: &str) -> Result<Arc<Expr>> {
    match e.data_type() {
        DataType::Boolean => Ok(Arc::clone(e)),
        DataType::Null => Ok(cast_to(e, DataType::Boolean)),
        other => Err(type_check(
            e,
            format!("{op_name} requires boolean operands, got {other}"),
        )),
    }
}

/// Comparison coercion: null casts to the other side, numerics widen, equal
/// types pass through.
fn coerce_for_compare(
    parent: &Arc<Expr>,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
) -> Result<(Arc<Expr>, Arc<Expr>)> {
    let (lt, rt) = (left.data_type(), right.data_type());
    if lt == rt {
        return Ok((Arc::clone(left), Arc::clone(right)));
    }
    if lt == DataType::Null {
        return Ok((cast_to(left, rt), Arc::clone(right)));
    }
    if rt == DataType::Null {
        return Ok((Arc::clone(left), cast_to(right, lt)));
    }
    if is_numeric(&lt) && is_numeric(&rt) {
        let target = wider_numeric(&lt, &rt).ok_or_else(|| {
            type_check(parent, "failed to determine numeric widening type".to_string())
        })?;
        return Ok((cast_if_needed(left, &target), cast_if_needed(right, &target)));
    }
    Err(type_check(
        parent,
        format!("cannot compare types {lt} and {rt}"),
    ))
}

/// Arithmetic coercion: operands widen to the wider numeric type; division
/// always produces Float64.
fn coerce_for_arith(
    parent: &Arc<Expr>,
    op: crate::expr::BinaryOp,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
) -> Result<(Arc<Expr>, Arc<Expr>)> {
    let (lt, rt) = (left.data_type(), right.data_type());

    let (lt, left_cast) = if lt == DataType::Null && is_numeric(&rt) {
        (rt.clone(), true)
    } else {
        (lt, false)
    };
    let (rt, right_cast) = if rt == DataType::Null && is_numeric(&lt) {
        (lt.clone(), true)
    } else {
        (rt, false)
    };
    if !is_numeric(&lt) || !is_numeric(&rt) {
        return Err(type_check(
            parent,
            format!("arithmetic requires numeric operands, got {lt} and {rt}"),
        ));
    }

    let target = if op == crate::expr::BinaryOp::Divide {
        DataType::Float64
    } else {
        wider_numeric(&lt, &rt).ok_or_else(|| {
            type_check(parent, "failed to determine numeric widening type".to_string())
        })?
    };
    let nl = if left_cast || left.data_type() != target {
        cast_to(left, target.clone())
    } else {
        Arc::clone(left)
    };
    let nr = if right_cast || right.data_type() != target {
        cast_to(right, target.clone())
    } else {
        Arc::clone(right)
    };
    Ok((nl, nr))
}

fn unify_types(a: &DataType, b: &DataType) -> Option<DataType> {
    if a == b {
        return Some(a.clone());
    }
    if *a == DataType::Null {
        return Some(b.clone());
    }
    if *b == DataType::Null {
        return Some(a.clone());
    }
    if is_numeric(a) && is_numeric(b) {
        return wider_numeric(a, b);
    }
    None
}

fn cast_if_needed(e: &Arc<Expr>, to: &DataType) -> Arc<Expr> {
    if e.data_type() == *to {
        Arc::clone(e)
    } else {
        cast_to(e, to.clone())
    }
}

fn cast_to(e: &Arc<Expr>, to: DataType) -> Arc<Expr> {
    Arc::new(Expr::Cast {
        child: Arc::clone(e),
        to_type: to,
    })
}

fn type_check(e: &Arc<Expr>, reason: impl Into<String>) -> QuillError {
    QuillError::TypeCheck {
        expr: explain_expr(e),
        reason: reason.into(),
    }
}

/// Strips subquery wrappers once everything beneath them is resolved.
struct EliminateSubqueries;

impl Rule for EliminateSubqueries {
    fn name(&self) -> &str {
        "eliminate_subqueries"
    }

    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>> {
        plan.try_transform_down(&|p| match p.as_ref() {
            LogicalPlan::Subquery { input, .. } => Ok(Some(Arc::clone(input))),
            _ => Ok(None),
        })
    }
}
