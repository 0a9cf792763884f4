//! Derivative-free function minimization.
//!
//! - [`powell`]: direction-set method with Brent line searches
//! - [`nelder_mead`]: downhill simplex
//! - [`minimize_scalar_bounded`]: one-dimensional bracketing search

mod line_search;
pub mod nelder_mead;
pub mod powell;
pub mod scalar;

pub use nelder_mead::{nelder_mead, SimplexOptions};
pub use powell::powell;
pub use scalar::{minimize_scalar_bounded, ScalarOptions, ScalarResult};

/// Options for [`powell`].
#[derive(Debug, Clone)]
pub struct MinimizeOptions {
    /// Fractional tolerance on the objective; the search stops once a full
    /// round of line searches improves the value by less than this fraction
    /// twice in a row. Must lie in (0, 1).
    pub ftol: f64,
    /// Maximum number of direction-set rounds.
    pub max_iter: usize,
    /// Iteration cap for each Brent line search.
    pub line_search_max_iter: usize,
}

impl Default for MinimizeOptions {
    fn default() -> Self {
        Self {
            ftol: 1e-8,
            max_iter: 100,
            line_search_max_iter: 100,
        }
    }
}

/// Result of a multidimensional minimization.
#[derive(Debug, Clone)]
pub struct MinimizeResult {
    /// Best parameters found.
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub fun: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Number of objective evaluations.
    pub nfev: usize,
    /// False when the iteration budget ran out before the tolerance was met;
    /// the best point found is still returned.
    pub converged: bool,
}
