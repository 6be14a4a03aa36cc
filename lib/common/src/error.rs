use dbflow_model::BsonField;

/// Errors raised while building, rewriting, or lowering a workflow.
///
/// Most variants name a specific invariant violation the compiler core
/// detects at construction or at a later pass; `Internal` is the catch-all
/// for states that should be unreachable given those invariants, kept
/// instead of a panic so a caller embedding this crate never sees one.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum WorkflowError {
    /// A rewrite over a [`dbflow_model::Grouped`] value changed its
    /// structural shape: a value stopped being a group-accumulator
    /// application.
    #[error("reference rewrite changed the shape of a grouped value at {field}")]
    RewriteChangedGroupShape { field: BsonField },

    /// A `FoldLeft` arm's expression was never reduced to a value the
    /// finalizer could absorb into a JS op.
    #[error("fold-left arm was not reduced to a terminal expression")]
    FoldLeftArmNotReduced,

    /// A `FoldLeft` was built with no tail stages.
    #[error("fold-left has no tail stages to fold")]
    EmptyFoldLeftTail,

    /// A `Join` was built with an empty set of arms.
    #[error("join has no arms to join")]
    EmptyJoinSet,

    /// Any other invariant violation, kept as a message rather than a new
    /// variant because it does not yet recur often enough to be worth
    /// naming.
    #[error("internal error: {0}")]
    Internal(String),
}

/// The result type threaded through `dbflow-logical` and `dbflow-physical`.
pub type WorkflowResult<T> = Result<T, WorkflowError>;
