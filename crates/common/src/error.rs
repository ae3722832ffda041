use thiserror::Error;

/// Canonical Quill error taxonomy used across crates.
///
/// Classification guidance:
/// - [`QuillError::TableNotFound`]: catalog lookup failed for a relation name
/// - [`QuillError::Resolution`]: a name/reference could not be bound to an attribute
/// - [`QuillError::TypeCheck`]: no implicit cast chain satisfies an operator signature
/// - [`QuillError::Unsupported`]: well-formed plan shape the compiler intentionally rejects
/// - [`QuillError::Internal`]: rule non-convergence or invariant violation; always a bug
#[derive(Debug, Error)]
pub enum QuillError {
    /// Catalog has no relation registered under the requested name.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Attribute resolution failed with zero or ambiguous candidates.
    ///
    /// Carries the offending reference, the failure reason, and the pretty
    /// form of the plan node where resolution stopped.
    #[error("cannot resolve `{attr}`: {reason}\n{plan}")]
    Resolution {
        /// The unresolved attribute name.
        attr: String,
        /// Why resolution failed (no candidates, or an enumeration of the
        /// ambiguous ones).
        reason: String,
        /// Pretty-printed plan at the failure point.
        plan: String,
    },

    /// Implicit coercion could not produce a strictly typed expression.
    #[error("type check failed for `{expr}`: {reason}")]
    TypeCheck {
        /// Pretty form of the offending expression.
        expr: String,
        /// Why no cast chain satisfies the operator signature.
        reason: String,
    },

    /// Valid plan shape the compiler intentionally does not support.
    ///
    /// Examples:
    /// - self-joins (pending attribute renaming support)
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Invariant violation inside the compiler itself.
    ///
    /// Examples:
    /// - a fixed-point rule batch exceeding its safety ceiling
    /// - an unresolved reference surviving analysis
    #[error("internal error: {0}")]
    Internal(String),
}

/// Standard Quill result alias.
pub type Result<T> = std::result::Result<T, QuillError>;
