//! Linear least-squares solvers.
//!
//! - [`bvls`]: bounded-variable least squares by the Lawson-Hanson
//!   active-set method, with warm starts
//! - [`llsq_weighted`]: iterative line fit with errors in both coordinates
//! - [`llsq_perpendicular`], [`median_line`]: robust non-iterative line fits

pub mod bvls;
pub mod linear;

pub use bvls::{bvls, weight_problem, weight_problem_squared, BvlsOptions, BvlsResult, BvlsState};
pub use linear::{
    best_llsq_weighted, llsq_perpendicular, llsq_perpendicular_filtered, llsq_weighted,
    median_line, quadratic_roots, BestLineFit, PerpendicularFit, TrimFrom, WeightedLineFit,
};
