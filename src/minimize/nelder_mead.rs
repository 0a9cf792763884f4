//! Nelder-Mead downhill simplex minimization.

#![allow(clippy::needless_range_loop)]

use log::{debug, trace};

use super::MinimizeResult;
use crate::error::{FitError, FitResult};

/// Options for [`nelder_mead`].
#[derive(Debug, Clone)]
pub struct SimplexOptions {
    /// Stop once the best objective value drops to this or below.
    pub max_err: f64,
    /// Budget of objective evaluations; checked between batches of 100
    /// simplex moves, so it can be overshot by up to a batch.
    pub max_iter: usize,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            max_err: 1e-10,
            max_iter: 5000,
        }
    }
}

/// Reflects the worst vertex through the centroid by `factor` into scratch
/// row `m`, then replaces the worst vertex with whichever of the scratch and
/// reflection rows is better.
fn gen_new<F>(
    f: &F,
    p: &mut [Vec<f64>],
    r: &mut [f64],
    c: &[f64],
    worst: usize,
    new_pnt: usize,
    m: usize,
    factor: f64,
) where
    F: Fn(&[f64]) -> f64,
{
    let n = c.len();
    for i in 0..n {
        p[m][i] = c[i] + factor * (c[i] - p[worst][i]);
    }
    r[m] = f(&p[m]);
    if r[m] < r[new_pnt] {
        for i in 0..n {
            p[worst][i] = p[m][i];
        }
        r[worst] = r[m];
    } else {
        for i in 0..n {
            p[worst][i] = p[new_pnt][i];
        }
        r[worst] = r[new_pnt];
    }
}

/// Downhill simplex minimization.
///
/// Intended for nonnegative objectives such as weighted sums of squares;
/// any parameter constraints must be enforced inside the objective itself,
/// for example by returning a penalty value. A parameter is held fixed by
/// passing a zero step in `delta`.
///
/// Each move reflects the worst vertex through the centroid of the others,
/// expanding by 2 when the reflection beats the best vertex and contracting
/// by half toward or past the centroid when it does not; only the worst
/// vertex is ever replaced. The search also stops when the best value
/// repeats exactly between two batches of moves, which counts as converged.
pub fn nelder_mead<F>(
    f: F,
    x0: &[f64],
    delta: &[f64],
    options: &SimplexOptions,
) -> FitResult<MinimizeResult>
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    if n == 0 {
        return Err(FitError::InvalidInput {
            context: "nelder_mead: empty initial guess".to_string(),
        });
    }
    if delta.len() != n {
        return Err(FitError::InvalidInput {
            context: "nelder_mead: delta length does not match the guess".to_string(),
        });
    }
    debug!(
        "nelder_mead: n={n} max_err={} max_iter={}",
        options.max_err, options.max_iter
    );

    // Vertices 0..=n, plus a reflection row and a scratch row.
    let new_pnt = n + 1;
    let new2 = n + 2;
    let mut p: Vec<Vec<f64>> = vec![x0.to_vec(); n + 3];
    let mut r = vec![0.0; n + 3];
    let mut d = delta.to_vec();
    let mut it = 0usize;

    // Build the starting simplex by stepping each vertex away from the
    // previous one, alternating the step sign on the diagonal.
    for meas in 0..=n {
        it += 1;
        r[meas] = f(&p[meas]);
        let (head, tail) = p.split_at_mut(meas + 1);
        for i in 0..n {
            if i == meas {
                d[i] = -d[i];
            }
            tail[0][i] = head[meas][i] + d[i];
        }
    }

    let mut c = vec![0.0; n];
    let mut last_chi = 1.0e30;
    let mut best = 0usize;
    let mut stalled = false;
    loop {
        for _ in 0..100 {
            // Rank the vertices.
            let mut max = 0.0_f64;
            let mut min = 1.0e30_f64;
            let mut worst = 0usize;
            for i in 0..=n {
                if r[i] > max {
                    max = r[i];
                    worst = i;
                }
                if r[i] < min {
                    min = r[i];
                    best = i;
                }
            }
            let mut min2 = 1.0e30_f64;
            let mut next_best = 0usize;
            for i in 0..=n {
                if r[i] < min2 && r[i] > min {
                    min2 = r[i];
                    next_best = i;
                }
            }

            // Centroid of all vertices but the worst.
            for i in 0..n {
                c[i] = 0.0;
                for meas in 0..=n {
                    if meas != worst {
                        c[i] += p[meas][i];
                    }
                }
                c[i] /= n as f64;
            }

            // Reflect the worst vertex away from the centroid.
            for i in 0..n {
                p[new_pnt][i] = 2.0 * c[i] - p[worst][i];
            }
            r[new_pnt] = f(&p[new_pnt]);
            it += 1;

            if r[new_pnt] < r[best] {
                // Better than the best so far: expand in this direction.
                gen_new(&f, &mut p, &mut r, &c, worst, new_pnt, new2, 2.0);
                it += 1;
            } else if r[new_pnt] > r[worst] {
                // Worse than the worst: contract between worst and centroid.
                gen_new(&f, &mut p, &mut r, &c, worst, new_pnt, new2, -0.5);
                it += 1;
            } else if r[next_best] < r[new_pnt] && r[new_pnt] < r[worst] {
                // Middling: contract between centroid and the reflection.
                gen_new(&f, &mut p, &mut r, &c, worst, new_pnt, new2, 0.5);
                it += 1;
            } else {
                for i in 0..n {
                    p[worst][i] = p[new_pnt][i];
                }
                r[worst] = r[new_pnt];
            }
        }
        trace!("nelder_mead: it={it} best={}", r[best]);

        // An exactly repeated best value means the simplex has collapsed.
        if r[best] == last_chi {
            stalled = true;
            break;
        }
        last_chi = r[best];

        if !(r[best] > options.max_err && it <= options.max_iter) {
            break;
        }
    }
    debug!("nelder_mead: finished, {it} evaluations, best={}", r[best]);

    let converged = stalled || r[best] <= options.max_err;
    Ok(MinimizeResult {
        x: p[best].clone(),
        fun: r[best],
        iterations: it,
        nfev: it,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_nelder_mead_quadratic_bowl() {
        let f = |p: &[f64]| (p[0] - 1.0).powi(2) + (p[1] - 2.0).powi(2);
        let result = nelder_mead(f, &[0.0, 0.0], &[0.5, 0.5], &SimplexOptions::default())
            .expect("nelder_mead failed");
        assert!(result.converged);
        assert_relative_eq!(result.x[0], 1.0, epsilon = 1e-4);
        assert_relative_eq!(result.x[1], 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_nelder_mead_fixed_parameter() {
        // A zero step keeps every vertex at the same coordinate, so the
        // parameter can never move.
        let f = |p: &[f64]| (p[0] - 3.0).powi(2) + p[1].powi(2);
        let options = SimplexOptions {
            max_err: 1e-12,
            max_iter: 10_000,
        };
        let result =
            nelder_mead(f, &[0.0, 2.0], &[0.5, 0.0], &options).expect("nelder_mead failed");
        assert_eq!(result.x[1], 2.0);
        assert_relative_eq!(result.x[0], 3.0, epsilon = 1e-4);
    }

    #[test]
    fn test_nelder_mead_stall_counts_as_converged() {
        // A constant objective can never improve; the exact-repeat check
        // must stop the search instead of burning the whole budget.
        let f = |_: &[f64]| 5.0;
        let result = nelder_mead(f, &[1.0, 1.0], &[0.5, 0.5], &SimplexOptions::default())
            .expect("nelder_mead failed");
        assert!(result.converged);
        assert_eq!(result.fun, 5.0);
        assert!(result.nfev < SimplexOptions::default().max_iter);
    }

    #[test]
    fn test_nelder_mead_budget_exhaustion_is_soft() {
        let f = |p: &[f64]| {
            let a = 1.0 - p[0];
            let b = p[1] - p[0] * p[0];
            a * a + 100.0 * b * b
        };
        let options = SimplexOptions {
            max_err: 1e-30,
            max_iter: 50,
        };
        let result = nelder_mead(f, &[-1.2, 1.0], &[0.1, 0.1], &options).expect("nelder_mead failed");
        assert!(!result.converged);
        assert!(result.fun.is_finite());
    }

    #[test]
    fn test_nelder_mead_empty_guess() {
        let f = |_: &[f64]| 0.0;
        assert!(matches!(
            nelder_mead(f, &[], &[], &SimplexOptions::default()),
            Err(FitError::InvalidInput { .. })
        ));
    }
}
