//! Rule abstraction and the batch executor driving analysis/optimization.
//!
//! Rules are values: each implements [`Rule::apply`] as a pure function from
//! plan to plan. Batches group rules under a strategy; `FixedPoint` batches
//! re-run their rules until a full pass leaves the plan unchanged, with a
//! safety ceiling guarding against non-convergent rule sets.

use std::sync::Arc;

use quill_common::{QuillError, Result};
use tracing::{debug, trace};

use crate::logical_plan::LogicalPlan;

/// A named plan rewrite.
///
/// Rules hold no mutable state; a rule that does not match must return the
/// input plan unchanged (same `Arc` where possible, so the executor can
/// detect convergence by pointer equality before falling back to structural
/// comparison).
pub trait Rule: Send + Sync {
    /// Rule name for traces and diagnostics.
    fn name(&self) -> &str;

    /// Rewrite the plan, or return it unchanged when the rule does not match.
    fn apply(&self, plan: &Arc<LogicalPlan>) -> Result<Arc<LogicalPlan>>;
}

/// Iteration strategy for a rule batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Exactly one pass over the rules.
    Once,
    /// Run passes until a fixed point, optionally capped. `None` means
    /// unlimited, bounded only by the executor safety ceiling.
    FixedPoint(Option<usize>),
}

/// An ordered group of rules sharing one strategy.
pub struct RuleBatch {
    /// Batch name for traces.
    pub name: String,
    /// Iteration strategy.
    pub strategy: Strategy,
    /// Rules in application order.
    pub rules: Vec<Arc<dyn Rule>>,
}

impl RuleBatch {
    /// Batch applying its rules exactly once.
    pub fn once(name: impl Into<String>, rules: Vec<Arc<dyn Rule>>) -> Self {
        Self {
            name: name.into(),
            strategy: Strategy::Once,
            rules,
        }
    }

    /// Batch iterating to a fixed point with no pass cap.
    pub fn fixed_point(name: impl Into<String>, rules: Vec<Arc<dyn Rule>>) -> Self {
        Self {
            name: name.into(),
            strategy: Strategy::FixedPoint(None),
            rules,
        }
    }
}

/// Callback invoked with `(rule_name, before, after)` whenever a rule
/// changes the plan.
pub type TraceHook = Arc<dyn Fn(&str, &LogicalPlan, &LogicalPlan) + Send + Sync>;

/// Drives an ordered sequence of rule batches over a plan.
pub struct RuleExecutor {
    batches: Vec<RuleBatch>,
    safety_ceiling: usize,
}

impl RuleExecutor {
    /// Executor with the default safety ceiling.
    pub fn new(batches: Vec<RuleBatch>) -> Self {
        Self {
            batches,
            safety_ceiling: 100,
        }
    }

    /// Override the pass ceiling for unlimited fixed-point batches.
    pub fn with_safety_ceiling(mut self, passes: usize) -> Self {
        self.safety_ceiling = passes;
        self
    }

    /// Run all batches in order. Fails with an internal error when an
    /// unlimited fixed-point batch has not converged within the ceiling.
    pub fn execute(
        &self,
        plan: &Arc<LogicalPlan>,
        trace_hook: Option<&TraceHook>,
    ) -> Result<Arc<LogicalPlan>> {
        let mut current = Arc::clone(plan);
        for batch in &self.batches {
            current = self.execute_batch(batch, current, trace_hook)?;
        }
        Ok(current)
    }

    fn execute_batch(
        &self,
        batch: &RuleBatch,
        plan: Arc<LogicalPlan>,
        trace_hook: Option<&TraceHook>,
    ) -> Result<Arc<LogicalPlan>> {
        let max_passes = match batch.strategy {
            Strategy::Once => 1,
            Strategy::FixedPoint(Some(cap)) => cap,
            Strategy::FixedPoint(None) => self.safety_ceiling,
        };

        let mut current = plan;
        let mut pass = 0;
        loop {
            if pass >= max_passes {
                match batch.strategy {
                    Strategy::FixedPoint(None) => {
                        return Err(QuillError::Internal(format!(
                            "rule batch '{}' did not converge within {} passes",
                            batch.name, self.safety_ceiling
                        )));
                    }
                    _ => break,
                }
            }

            let pass_start = Arc::clone(&current);
            for rule in &batch.rules {
                let next = rule.apply(&current)?;
                let changed =
                    !Arc::ptr_eq(&next, &current) && next.as_ref() != current.as_ref();
                if changed {
                    debug!(batch = %batch.name, rule = %rule.name(), "rule changed plan");
                    if let Some(hook) = trace_hook {
                        hook(rule.name(), current.as_ref(), next.as_ref());
                    }
                }
                current = next;
            }
            pass += 1;
            trace!(batch = %batch.name, pass, "batch pass complete");

            if matches!(batch.strategy, Strategy::Once) {
                break;
            }
            let converged = Arc::ptr_eq(&current, &pass_start)
                || current.as_ref() == pass_start.as_ref();
            if converged {
                break;
            }
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quill_common::QuillError;

    use super::{Rule, RuleBatch, RuleExecutor, Strategy};
    use crate::logical_plan::LogicalPlan;

    fn unresolved(name: &str) -> Arc<LogicalPlan> {
        Arc::new(LogicalPlan::UnresolvedRelation {
            name: name.to_string(),
        })
    }

    /// Renames the relation once, then stops matching.
    struct RenameOnce;

    impl Rule for RenameOnce {
        fn name(&self) -> &str {
            "rename_once"
        }

        fn apply(
            &self,
            plan: &Arc<LogicalPlan>,
        ) -> quill_common::Result<Arc<LogicalPlan>> {
            match plan.as_ref() {
                LogicalPlan::UnresolvedRelation { name } if name == "before" => {
                    Ok(unresolved("after"))
                }
                _ => Ok(Arc::clone(plan)),
            }
        }
    }

    /// Never stops producing a new plan.
    struct NeverConverges;

    impl Rule for NeverConverges {
        fn name(&self) -> &str {
            "never_converges"
        }

        fn apply(
            &self,
            plan: &Arc<LogicalPlan>,
        ) -> quill_common::Result<Arc<LogicalPlan>> {
            match plan.as_ref() {
                LogicalPlan::UnresolvedRelation { name } => {
                    Ok(unresolved(&format!("{name}x")))
                }
                _ => Ok(Arc::clone(plan)),
            }
        }
    }

    #[test]
    fn fixed_point_stops_when_plan_stops_changing() {
        let executor = RuleExecutor::new(vec![RuleBatch::fixed_point(
            "test",
            vec![Arc::new(RenameOnce)],
        )]);
        let out = executor.execute(&unresolved("before"), None).expect("execute");
        assert!(matches!(
            out.as_ref(),
            LogicalPlan::UnresolvedRelation { name } if name == "after"
        ));
    }

    #[test]
    fn unlimited_batch_fails_past_safety_ceiling() {
        let executor = RuleExecutor::new(vec![RuleBatch::fixed_point(
            "test",
            vec![Arc::new(NeverConverges)],
        )])
        .with_safety_ceiling(8);
        let err = executor
            .execute(&unresolved("t"), None)
            .expect_err("must hit ceiling");
        assert!(matches!(err, QuillError::Internal(_)), "{err}");
    }

    #[test]
    fn capped_batch_stops_quietly_at_cap() {
        let executor = RuleExecutor::new(vec![RuleBatch {
            name: "test".to_string(),
            strategy: Strategy::FixedPoint(Some(3)),
            rules: vec![Arc::new(NeverConverges)],
        }]);
        let out = executor.execute(&unresolved("t"), None).expect("execute");
        assert!(matches!(
            out.as_ref(),
            LogicalPlan::UnresolvedRelation { name } if name == "txxx"
        ));
    }

    #[test]
    fn once_batch_runs_single_pass() {
        let executor = RuleExecutor::new(vec![RuleBatch::once(
            "test",
            vec![Arc::new(NeverConverges)],
        )]);
        let out = executor.execute(&unresolved("t"), None).expect("execute");
        assert!(matches!(
            out.as_ref(),
            LogicalPlan::UnresolvedRelation { name } if name == "tx"
        ));
    }

    #[test]
    fn trace_hook_fires_only_on_change() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        let hook: super::TraceHook = Arc::new(move |_rule, _before, _after| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        let executor = RuleExecutor::new(vec![RuleBatch::fixed_point(
            "test",
            vec![Arc::new(RenameOnce)],
        )]);
        executor
            .execute(&unresolved("before"), Some(&hook))
            .expect("execute");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
