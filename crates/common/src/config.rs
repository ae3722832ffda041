use serde::{Deserialize, Serialize};

/// Compiler configuration shared by the analyzer and optimizer pipelines.
///
/// All knobs are design parameters, not correctness switches: lowering a
/// ceiling can only turn a rewrite into a no-op or surface a non-convergent
/// rule set earlier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Safety ceiling for unlimited fixed-point rule batches. A batch that
    /// has not converged after this many passes fails with an internal
    /// error, which indicates a non-convergent rule set.
    #[serde(default = "default_max_fixed_point_passes")]
    pub max_fixed_point_passes: usize,

    /// Maximum number of conjuncts CNF conversion may produce. Above this
    /// threshold the conversion is skipped and the predicate is kept as
    /// written, avoiding exponential blow-up during distribution.
    #[serde(default = "default_cnf_conjunct_limit")]
    pub cnf_conjunct_limit: usize,
}

fn default_max_fixed_point_passes() -> usize {
    100
}

fn default_cnf_conjunct_limit() -> usize {
    16
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_fixed_point_passes: default_max_fixed_point_passes(),
            cnf_conjunct_limit: default_cnf_conjunct_limit(),
        }
    }
}
