//! Error types shared by all fitting and linear-algebra routines.

use thiserror::Error;

/// Result type for fitting operations.
pub type FitResult<T> = Result<T, FitError>;

/// Errors that can occur during fitting or linear-algebra operations.
///
/// Budget exhaustion (iteration or evaluation caps) is deliberately *not* an
/// error: those routines return their best point with `converged: false` in
/// the result struct, so batch callers can count soft failures without
/// unwinding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// Undersized buffers, non-positive dimensions, tolerances outside their
    /// valid range, or inconsistent bounds. Detected before any computation;
    /// caller data is never partially mutated.
    #[error("invalid input in {context}")]
    InvalidInput { context: String },

    /// The objective evaluated to NaN or infinity at the initial guess.
    /// Distinct from a mid-search failure because no recovery point exists.
    #[error("{context}: objective is not finite at the initial point")]
    NonFiniteAtStart { context: String },

    /// The objective became NaN or infinite during the search. The routine
    /// has restored the initial point and re-evaluated the objective there,
    /// so any state kept by the objective reflects the returned parameters.
    #[error("{context}: objective became non-finite during the search")]
    NonFiniteObjective { context: String },

    /// A zero pivot or zero column norm was detected; the linear system
    /// cannot be solved.
    #[error("singular linear system in {context}")]
    SingularMatrix { context: String },

    /// More active variables than the problem admits (BVLS warm start with
    /// too many free parameters, or active-set overflow).
    #[error("too many active variables in {context}")]
    TooManyActive { context: String },
}
