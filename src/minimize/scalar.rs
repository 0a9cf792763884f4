//! Bounded one-dimensional minimization by bracketing and quadratic
//! interpolation.

use log::{debug, trace};

use crate::error::{FitError, FitResult};

/// Options for [`minimize_scalar_bounded`].
#[derive(Debug, Clone)]
pub struct ScalarOptions {
    /// Required bracket width; must be positive and smaller than the
    /// initial step.
    pub tol: f64,
    /// Budget of objective evaluations, at least 5.
    pub max_eval: usize,
}

impl Default for ScalarOptions {
    fn default() -> Self {
        Self {
            tol: 1e-6,
            max_eval: 1000,
        }
    }
}

/// Result of a [`minimize_scalar_bounded`] search.
#[derive(Debug, Clone, Copy)]
pub struct ScalarResult {
    /// Best parameter value found.
    pub x: f64,
    /// Objective value at `x`.
    pub fun: f64,
    /// Number of objective evaluations.
    pub nfev: usize,
    /// False when the evaluation budget ran out before the bracket shrank
    /// to the tolerance.
    pub converged: bool,
}

/// Minimizes a function of one variable inside `[bounds.0, bounds.1]`.
///
/// First expands a three-point bracket `p1 < p2 < p3` with `f1 > f2 < f3`
/// by doubling jumps away from the start, bisecting toward a bound when the
/// minimum collides with one. The bracket is then shrunk with the minimum
/// of the Lagrange quadratic through the three points, nudged away from
/// coincident abscissas and forced to the larger side when the bracket
/// grows more than 100 times as long on one side.
///
/// Equal bounds fix the parameter; the objective is evaluated once and the
/// result is converged. Running out of evaluations returns the best point
/// with `converged` false.
///
/// # Arguments
/// * `f` - Objective of one variable
/// * `x0` - Starting point, inside the bounds
/// * `bounds` - Lower and upper limit for the parameter
/// * `delta` - Initial step, larger than the tolerance
/// * `options` - Tolerance and evaluation budget
pub fn minimize_scalar_bounded<F>(
    f: F,
    x0: f64,
    bounds: (f64, f64),
    delta: f64,
    options: &ScalarOptions,
) -> FitResult<ScalarResult>
where
    F: Fn(f64) -> f64,
{
    let (xl, xu) = bounds;
    if xl > xu || x0 < xl || x0 > xu {
        return Err(FitError::InvalidInput {
            context: "minimize_scalar_bounded: start must lie within ordered bounds".to_string(),
        });
    }
    if !(delta > 0.0) || !(options.tol > 0.0) {
        return Err(FitError::InvalidInput {
            context: "minimize_scalar_bounded: delta and tol must be positive".to_string(),
        });
    }
    if options.tol >= delta {
        return Err(FitError::InvalidInput {
            context: "minimize_scalar_bounded: tol must be smaller than delta".to_string(),
        });
    }
    if options.max_eval < 5 {
        return Err(FitError::InvalidInput {
            context: "minimize_scalar_bounded: at least 5 evaluations are needed".to_string(),
        });
    }
    debug!("minimize_scalar_bounded: x0={x0} bounds=({xl},{xu}) delta={delta}");

    let tol = options.tol;
    let mut nevals = 0usize;
    let mut f2 = f(x0);
    nevals += 1;
    // Equal bounds leave nothing to optimize.
    if xl >= xu {
        return Ok(ScalarResult {
            x: x0,
            fun: f2,
            nfev: nevals,
            converged: true,
        });
    }

    // Seed three in-bound points around the start.
    let mut p2 = x0;
    let mut p1 = (p2 - delta).max(xl);
    let mut p3 = (p2 + delta).min(xu);
    let mut f1 = f(p1);
    nevals += 1;
    let mut f3 = f(p3);
    nevals += 1;
    if p2 == p1 || p2 == p3 {
        p2 = 0.5 * (p1 + p3);
        f2 = f(p2);
        nevals += 1;
    }

    // Expand away from the start with doubling jumps until the middle point
    // is lowest, keeping p1 < p2 < p3 throughout.
    let mut jump_size = delta;
    while !(f1 > f2 && f2 < f3) {
        if nevals >= options.max_eval {
            return Ok(ScalarResult {
                x: p2,
                fun: f2,
                nfev: nevals,
                converged: false,
            });
        }
        if p3 - p1 < tol {
            trace!("minimize_scalar_bounded: tolerance reached while bracketing");
            let (x, fun) = if f1 < f2 && f1 < f3 {
                (p1, f1)
            } else if f2 < f1 && f2 < f3 {
                (p2, f2)
            } else {
                (p3, f3)
            };
            return Ok(ScalarResult {
                x,
                fun,
                nfev: nevals,
                converged: true,
            });
        }
        if f1 < f3 {
            // Step left; when colliding with the lower bound, or when p1 and
            // p2 read the same, bisect to pull them apart.
            if p1 == xl || (f1 == f2 && (xu - xl) < jump_size) {
                p3 = p2;
                f3 = f2;
                p2 = 0.5 * (p1 + p2);
                f2 = f(p2);
                nevals += 1;
            } else {
                p3 = p2;
                f3 = f2;
                p2 = p1;
                f2 = f1;
                p1 = (p1 - jump_size).max(xl);
                f1 = f(p1);
                nevals += 1;
                jump_size *= 2.0;
            }
        } else {
            // Step right, with the mirrored collision handling.
            if p3 == xu || (f2 == f3 && (xu - xl) < jump_size) {
                p1 = p2;
                f1 = f2;
                p2 = 0.5 * (p3 + p2);
                f2 = f(p2);
                nevals += 1;
            } else {
                p1 = p2;
                f1 = f2;
                p2 = p3;
                f2 = f3;
                p3 = (p3 + jump_size).min(xu);
                f3 = f(p3);
                nevals += 1;
                jump_size *= 2.0;
            }
        }
    }
    trace!("minimize_scalar_bounded: bracket ready after {nevals} evaluations");

    // Shrink the bracket with the minimum of the Lagrange quadratic through
    // the three points, maintaining f1 > f2 < f3 and p1 < p2 < p3.
    const TAU: f64 = 0.1;
    while nevals < options.max_eval && p3 - p1 > tol {
        let d = f1 * (p3 * p3 - p2 * p2) + f2 * (p1 * p1 - p3 * p3) + f3 * (p2 * p2 - p1 * p1);
        let d2 = 2.0 * (f1 * (p3 - p2) + f2 * (p1 - p3) + f3 * (p2 - p1));
        let mut p_min = if d2 == 0.0 || !(d / d2).is_finite() {
            p2
        } else {
            (d / d2).clamp(p1, p3)
        };

        // Keep the trial point a fraction of the interval away from the
        // abscissas already held.
        if p_min < p2 {
            let gap = (p2 - p1) * TAU;
            if (p1 - p_min).abs() < gap {
                p_min = p1 + gap;
            } else if (p2 - p_min).abs() < gap {
                p_min = p2 - gap;
            }
        } else {
            let gap = (p3 - p2) * TAU;
            if (p2 - p_min).abs() < gap {
                p_min = p2 + gap;
            } else if (p3 - p_min).abs() < gap {
                p_min = p3 - gap;
            }
        }

        // A bracket 100 times longer on one side gets contracted by forcing
        // the trial point onto the long side.
        let bracket_ratio = (p1 - p2).abs() / (p2 - p3).abs();
        if !(bracket_ratio < 100.0 && bracket_ratio > 0.01) {
            if bracket_ratio > 1.0 && p_min > p2 {
                p_min = 0.5 * (p1 + p2);
            } else if p_min < p2 {
                p_min = 0.5 * (p2 + p3);
            }
        }

        let f_min = f(p_min);
        nevals += 1;

        // Drop whichever endpoint the new point supersedes.
        if p_min < p2 {
            if f1 > f_min && f_min < f2 {
                p3 = p2;
                f3 = f2;
                p2 = p_min;
                f2 = f_min;
            } else {
                p1 = p_min;
                f1 = f_min;
            }
        } else if f2 > f_min && f_min < f3 {
            p1 = p2;
            f1 = f2;
            p2 = p_min;
            f2 = f_min;
        } else {
            p3 = p_min;
            f3 = f_min;
        }
    }
    debug!("minimize_scalar_bounded: x={p2} f={f2} nfev={nevals}");

    Ok(ScalarResult {
        x: p2,
        fun: f2,
        nfev: nevals,
        converged: p3 - p1 <= tol,
    })
}
