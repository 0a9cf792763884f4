//! nlfit - Derivative-free minimization and constrained least squares
//!
//! Numerical routines for fitting nonlinear models to measured data:
//! derivative-free minimizers and linear least-squares solvers of the kind
//! used when fitting compartmental and graphical models to time-activity
//! curves, where gradients of the objective are unavailable or unreliable.
//!
//! # Modules
//!
//! - [`minimize`] - Powell's direction set method, Nelder-Mead simplex, and
//!   a bounded one-dimensional search
//! - [`least_squares`] - Bounded-variable least squares (BVLS), weighted
//!   line fits with errors in both coordinates, and robust line estimators
//! - [`linalg`] - The Householder and QR kernels behind the solvers
//!
//! # Conventions
//!
//! Objectives are plain closures, `Fn(&[f64]) -> f64` for the
//! multidimensional minimizers. Solvers return a result struct carrying the
//! solution together with iteration counts and a `converged` flag; running
//! out of budget is reported through that flag rather than as an error, so
//! the best point found is never lost. Hard failures, such as inconsistent
//! input or an objective turning non-finite, are [`FitError`] values.
//!
//! Parameters are fixed by passing a zero initial step, and diagnostics go
//! through the `log` crate at debug and trace level.
//!
//! # Example
//!
//! ```
//! use nlfit::minimize::{powell, MinimizeOptions};
//!
//! let rosenbrock = |p: &[f64]| {
//!     let a = 1.0 - p[0];
//!     let b = p[1] - p[0] * p[0];
//!     a * a + 100.0 * b * b
//! };
//! let result = powell(rosenbrock, &[-1.2, 1.0], &[0.1, 0.1], &MinimizeOptions::default())?;
//! assert!(result.converged);
//! assert!((result.x[0] - 1.0).abs() < 1e-3);
//! # Ok::<(), nlfit::FitError>(())
//! ```

pub mod error;
pub mod least_squares;
pub mod linalg;
pub mod minimize;

pub use error::{FitError, FitResult};
pub use least_squares::{
    bvls, llsq_perpendicular, llsq_weighted, median_line, BvlsOptions, BvlsResult, BvlsState,
    PerpendicularFit, WeightedLineFit,
};
pub use minimize::{
    minimize_scalar_bounded, nelder_mead, powell, MinimizeOptions, MinimizeResult, ScalarOptions,
    ScalarResult, SimplexOptions,
};
