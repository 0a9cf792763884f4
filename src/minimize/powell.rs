//! Powell's direction set method for derivative-free minimization.
//!
//! After Numerical Recipes (Press et al.).

#![allow(clippy::needless_range_loop)]

use log::{debug, trace};

use super::line_search::line_minimize;
use super::{MinimizeOptions, MinimizeResult};
use crate::error::{FitError, FitResult};

/// A parameter whose initial step is below this is held fixed.
const FIXED_THRESHOLD: f64 = 1.0e-20;

/// Powell's direction set method for derivative-free minimization.
///
/// Starts from the coordinate directions scaled by `delta` and performs a
/// Brent line search along each in turn; after every round the net
/// displacement may replace the direction of largest decrease, building up
/// a mutually conjugate set. A parameter is held fixed by passing a zero
/// step in `delta`.
///
/// The tolerance test `2|f_prev - f| <= ftol (|f_prev| + |f|)` must pass on
/// two consecutive rounds before the search stops.
///
/// # Arguments
/// * `f` - Objective f: R^n -> R, typically a weighted sum of squares
/// * `x0` - Initial guess
/// * `delta` - Initial step per parameter; 0 fixes the parameter
/// * `options` - Tolerance and iteration caps
///
/// # Errors
/// * `InvalidInput` for an empty guess, mismatched `delta`, `ftol` outside
///   (0, 1) or a zero iteration cap
/// * `NonFiniteAtStart` when the objective is not finite at `x0`
/// * `NonFiniteObjective` when the value turns NaN or infinite mid-search;
///   the objective is re-evaluated at `x0` first so closures carrying state
///   end on a valid point
pub fn powell<F>(
    f: F,
    x0: &[f64],
    delta: &[f64],
    options: &MinimizeOptions,
) -> FitResult<MinimizeResult>
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    if n == 0 {
        return Err(FitError::InvalidInput {
            context: "powell: empty initial guess".to_string(),
        });
    }
    if delta.len() != n {
        return Err(FitError::InvalidInput {
            context: "powell: delta length does not match the guess".to_string(),
        });
    }
    if options.ftol <= 0.0 || options.ftol >= 1.0 {
        return Err(FitError::InvalidInput {
            context: "powell: ftol must lie in (0, 1)".to_string(),
        });
    }
    if options.max_iter < 1 {
        return Err(FitError::InvalidInput {
            context: "powell: at least one iteration is required".to_string(),
        });
    }
    debug!("powell: n={n} ftol={} max_iter={}", options.ftol, options.max_iter);

    let mut x = x0.to_vec();
    let mut fret = f(&x);
    let mut nfev = 1;
    if !fret.is_finite() {
        return Err(FitError::NonFiniteAtStart {
            context: "powell: objective is not finite at the initial point".to_string(),
        });
    }

    let fixed: Vec<bool> = delta.iter().map(|d| d.abs() < FIXED_THRESHOLD).collect();

    // Direction set, one column per parameter, starting from the scaled
    // coordinate axes.
    let mut dirs: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let mut d = vec![0.0; n];
            d[i] = delta[i];
            d
        })
        .collect();

    let mut pt = x.clone();
    let mut xit = vec![0.0; n];
    let mut ptt = vec![0.0; n];
    let mut ftol_confirmed = false;
    let mut iter = 0;
    loop {
        iter += 1;
        trace!("powell: iteration {iter} fret={fret}");
        let fp = fret;
        let mut ibig = 0;
        let mut del = 0.0_f64;

        // Line-minimize along every free direction, remembering which one
        // gave the largest decrease.
        for i in 0..n {
            if fixed[i] {
                continue;
            }
            for j in 0..n {
                xit[j] = if fixed[j] { 0.0 } else { dirs[i][j] };
            }
            let fptt = fret;
            let (fnew, ls_iter, evals) = line_minimize(&f, &mut x, &mut xit, options.line_search_max_iter);
            fret = fnew;
            nfev += evals;
            trace!("powell: direction {i} line search took {ls_iter} iterations");
            if (fptt - fret).abs() > del {
                del = (fptt - fret).abs();
                ibig = i;
            }
        }

        // The tolerance must hold twice in a row before stopping.
        if 2.0 * (fp - fret).abs() <= options.ftol * (fp.abs() + fret.abs()) {
            if ftol_confirmed || iter >= options.max_iter {
                break;
            }
            ftol_confirmed = true;
        } else {
            ftol_confirmed = false;
        }
        if iter >= options.max_iter {
            debug!("powell: iteration cap reached");
            break;
        }

        // Extrapolated point and the average direction moved this round.
        for j in 0..n {
            ptt[j] = 2.0 * x[j] - pt[j];
            xit[j] = x[j] - pt[j];
            pt[j] = x[j];
        }
        let fptt = f(&ptt);
        nfev += 1;
        if fptt < fp {
            let sq = |v: f64| v * v;
            let t = 2.0 * (fp - 2.0 * fret + fptt) * sq(fp - fret - del) - del * sq(fp - fptt);
            if t < 0.0 {
                // The average direction is worth keeping: minimize along it
                // and put it in place of the best old direction.
                let (fnew, _, evals) = line_minimize(&f, &mut x, &mut xit, options.line_search_max_iter);
                fret = fnew;
                nfev += evals;
                dirs[ibig] = dirs[n - 1].clone();
                dirs[n - 1] = xit.clone();
            }
        }
    }
    debug!("powell: finished after {iter} iterations, {nfev} evaluations");

    if !fret.is_finite() {
        // Leave any state carried by the closure at the valid initial point.
        let _ = f(x0);
        return Err(FitError::NonFiniteObjective {
            context: "powell: objective value became non-finite during the search".to_string(),
        });
    }

    // Evaluate once more so the final point is the last one the closure saw.
    fret = f(&x);
    nfev += 1;
    Ok(MinimizeResult {
        x,
        fun: fret,
        iterations: iter,
        nfev,
        converged: iter < options.max_iter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rosenbrock(p: &[f64]) -> f64 {
        let a = 1.0 - p[0];
        let b = p[1] - p[0] * p[0];
        a * a + 100.0 * b * b
    }

    #[test]
    fn test_powell_quadratic_bowl() {
        let f = |p: &[f64]| (p[0] - 1.0).powi(2) + (p[1] + 2.5).powi(2) + 3.0;
        let result = powell(f, &[0.0, 0.0], &[0.5, 0.5], &MinimizeOptions::default())
            .expect("powell failed");
        assert!(result.converged);
        assert_relative_eq!(result.x[0], 1.0, epsilon = 1e-4);
        assert_relative_eq!(result.x[1], -2.5, epsilon = 1e-4);
        assert_relative_eq!(result.fun, 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_powell_rosenbrock() {
        let options = MinimizeOptions {
            ftol: 1e-10,
            max_iter: 500,
            ..Default::default()
        };
        let result = powell(rosenbrock, &[-1.2, 1.0], &[0.1, 0.1], &options)
            .expect("powell failed");
        assert!(result.converged);
        assert_relative_eq!(result.x[0], 1.0, epsilon = 1e-4);
        assert_relative_eq!(result.x[1], 1.0, epsilon = 1e-4);
        assert!(result.fun < 1e-8);
    }

    #[test]
    fn test_powell_never_increases_objective() {
        // The search is deterministic, so truncating it at successive
        // iteration caps reads out the objective value committed at the
        // end of each outer iteration; that sequence must never rise.
        let mut prev = rosenbrock(&[-1.2, 1.0]);
        for cap in 1..=6 {
            let options = MinimizeOptions {
                max_iter: cap,
                ..Default::default()
            };
            let result = powell(rosenbrock, &[-1.2, 1.0], &[0.1, 0.1], &options)
                .expect("powell failed");
            assert!(
                result.fun <= prev,
                "objective rose between iterations {} and {cap}",
                cap - 1
            );
            prev = result.fun;
        }
    }

    #[test]
    fn test_powell_fixed_parameter_untouched() {
        // Zero delta pins the second parameter exactly.
        let f = |p: &[f64]| (p[0] - 4.0).powi(2) + p[1] * p[1];
        let result = powell(f, &[0.0, 7.0], &[0.5, 0.0], &MinimizeOptions::default())
            .expect("powell failed");
        assert_eq!(result.x[1], 7.0);
        assert_relative_eq!(result.x[0], 4.0, epsilon = 1e-4);
    }

    #[test]
    fn test_powell_non_finite_start() {
        let f = |_: &[f64]| f64::NAN;
        assert!(matches!(
            powell(f, &[1.0], &[0.1], &MinimizeOptions::default()),
            Err(FitError::NonFiniteAtStart { .. })
        ));
    }

    #[test]
    fn test_powell_non_finite_mid_search_restores_start() {
        use std::cell::{Cell, RefCell};
        // Finite at the start, NaN once the search is underway.  The
        // error path must leave the closure's last-seen point at the
        // initial guess.
        let calls = Cell::new(0usize);
        let last_seen = RefCell::new(Vec::new());
        let f = |p: &[f64]| {
            calls.set(calls.get() + 1);
            *last_seen.borrow_mut() = p.to_vec();
            if calls.get() > 10 {
                f64::NAN
            } else {
                (p[0] - 2.0).powi(2) + (p[1] + 1.0).powi(2)
            }
        };
        let start = [0.5, 0.5];
        let options = MinimizeOptions {
            max_iter: 5,
            ..Default::default()
        };
        assert!(matches!(
            powell(f, &start, &[0.1, 0.1], &options),
            Err(FitError::NonFiniteObjective { .. })
        ));
        assert!(calls.get() > 10);
        assert_eq!(*last_seen.borrow(), start.to_vec());
    }

    #[test]
    fn test_powell_rejects_bad_ftol() {
        let f = |p: &[f64]| p[0] * p[0];
        let options = MinimizeOptions {
            ftol: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            powell(f, &[1.0], &[0.1], &options),
            Err(FitError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_powell_idempotent() {
        let options = MinimizeOptions::default();
        let r1 = powell(rosenbrock, &[0.5, 0.5], &[0.1, 0.1], &options).expect("powell failed");
        let r2 = powell(rosenbrock, &[0.5, 0.5], &[0.1, 0.1], &options).expect("powell failed");
        assert_eq!(r1.x, r2.x);
        assert_eq!(r1.nfev, r2.nfev);
    }
}
