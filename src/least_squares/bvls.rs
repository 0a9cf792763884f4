//! Bounded-value least squares (BVLS).
//!
//! Solves `min ||A x - b||` subject to `lower[i] <= x[i] <= upper[i]` with an
//! active-set method: variables start pinned at a bound and are moved into
//! the active (free) set one at a time by a Kuhn-Tucker test, with the free
//! subsystem re-solved by [`qr_solve_compact`] after every change.
//!
//! Follows the algorithm of Lawson & Hanson, "Solving Least Squares
//! Problems", and the Fortran codes of Parker, Stark and Burkardt.

use log::{debug, trace};

use crate::error::{FitError, FitResult};
use crate::linalg::qr::qr_solve_compact;

/// Stopping rule: converged once sqrt(obj) <= ||b|| * EPS.
const EPS: f64 = 1.0e-13;

/// Options for [`bvls`].
#[derive(Debug, Clone)]
pub struct BvlsOptions {
    /// Maximum number of main-loop iterations; 0 means `max(3, 3n)`.
    pub max_iter: usize,
}

impl Default for BvlsOptions {
    fn default() -> Self {
        Self { max_iter: 0 }
    }
}

/// Partition of the parameters into bound and active sets.
///
/// Returned on success and accepted back as a warm start, so a caller solving
/// a sequence of similar problems can skip the cold-start phase. The encoding
/// (signed one-based indices, bound count in the terminal slot) is private.
#[derive(Debug, Clone)]
pub struct BvlsState {
    istate: Vec<i32>,
}

impl BvlsState {
    /// Number of parameters pinned at a bound.
    pub fn bound_count(&self) -> usize {
        *self.istate.last().unwrap_or(&0) as usize
    }

    /// Number of parameters free to vary.
    pub fn active_count(&self) -> usize {
        self.istate.len().saturating_sub(1) - self.bound_count()
    }
}

/// Result of a [`bvls`] solve.
#[derive(Debug, Clone)]
pub struct BvlsResult {
    /// Solution vector, every component within its bounds.
    pub x: Vec<f64>,
    /// Euclidean norm of the residual `||A x - b||` at the solution.
    pub residual_norm: f64,
    /// Main-loop iterations performed.
    pub iterations: usize,
    /// Final active/bound partition, reusable as a warm start.
    pub state: BvlsState,
    /// False when the iteration cap was reached before convergence; the best
    /// point found is still returned.
    pub converged: bool,
}

/// Solves `min ||A x - b||` subject to `lower <= x <= upper`.
///
/// # Arguments
/// * `m` - Number of samples (rows of A, length of b)
/// * `n` - Number of parameters; must not exceed `m` unless enough variables
///   stay pinned at their bounds
/// * `a` - Matrix A as n consecutive m-length columns (column-major)
/// * `b` - Right-hand side, length m
/// * `lower`, `upper` - Per-parameter bounds, `lower[i] <= upper[i]`
/// * `warm_start` - State from a previous solve; active variables are
///   re-initialized to the midpoint of their bounds
/// * `options` - Iteration cap
///
/// # Errors
/// * `InvalidInput` for inconsistent bounds, a degenerate overall bound range
///   (below 1e-10), or undersized buffers
/// * `TooManyActive` if a warm start frees more than `min(m, n)` variables,
///   or the active set overflows during the solve
pub fn bvls(
    m: usize,
    n: usize,
    a: &[f64],
    b: &[f64],
    lower: &[f64],
    upper: &[f64],
    warm_start: Option<&BvlsState>,
    options: &BvlsOptions,
) -> FitResult<BvlsResult> {
    if n < 1 || m < 1 || a.len() < n * m || b.len() != m || lower.len() != n || upper.len() != n {
        return Err(FitError::InvalidInput {
            context: "bvls: dimension mismatch".to_string(),
        });
    }
    debug!("bvls: m={m} n={n} warm={}", warm_start.is_some());

    let max_iter = if options.max_iter < 3 {
        3 * n.max(1)
    } else {
        options.max_iter
    };

    // mm is the smaller matrix dimension; at most mm variables can be active.
    let mm = m.min(n);

    // Bound consistency, and the overall range must leave room to move.
    {
        let mut max_range = 0.0_f64;
        for ni in 0..n {
            let d = upper[ni] - lower[ni];
            if d < 0.0 {
                return Err(FitError::InvalidInput {
                    context: format!("bvls: inconsistent bounds at {ni}"),
                });
            }
            max_range = max_range.max(d);
        }
        if max_range < 1.0e-10 {
            return Err(FitError::InvalidInput {
                context: "bvls: no free variables within bounds".to_string(),
            });
        }
    }

    // Cold start binds every variable at its lower bound; a warm start takes
    // the caller's partition as-is.
    let mut istate: Vec<i32>;
    let mut nbound: usize;
    let warm = warm_start.is_some();
    match warm_start {
        None => {
            istate = vec![0; n + 1];
            nbound = n;
            // One-based indices so the sign can encode which bound.
            for ni in 0..nbound {
                istate[ni] = -((1 + ni) as i32);
            }
            istate[n] = nbound as i32;
        }
        Some(state) => {
            if state.istate.len() != n + 1 {
                return Err(FitError::InvalidInput {
                    context: "bvls: warm-start state size mismatch".to_string(),
                });
            }
            istate = state.istate.clone();
            nbound = istate[n] as usize;
            if nbound > n
                || istate[..n]
                    .iter()
                    .any(|&s| s == 0 || s.unsigned_abs() as usize > n)
            {
                return Err(FitError::InvalidInput {
                    context: "bvls: corrupt warm-start state".to_string(),
                });
            }
        }
    }
    let mut nact = n - nbound;
    if nact > mm {
        return Err(FitError::TooManyActive {
            context: "bvls: warm-start solution frees too many variables".to_string(),
        });
    }
    // A warm start with nothing active has no subsystem to re-solve; run
    // the normal candidate selection on the first pass instead.
    let warm = warm && nact > 0;

    let mut x = vec![0.0; n];
    for ni in 0..nbound {
        let i = istate[ni].unsigned_abs() as usize - 1;
        x[i] = if istate[ni] < 0 { lower[i] } else { upper[i] };
    }
    // Warm-started active variables begin at the midpoint of their bounds, in
    // case the first QR lands out of bounds and the step-limit path runs
    // before any gradient pass.
    for ni in nbound..n {
        let i = istate[ni].unsigned_abs() as usize - 1;
        x[i] = 0.5 * (lower[i] + upper[i]);
    }

    let bnorm = b.iter().map(|v| v * v).sum::<f64>().sqrt();
    trace!("bvls: initial bnorm={bnorm}");

    // Scratch: mm columns for the reduced QR system, one column for the
    // residual, one for the QR right-hand side.
    let mut act = vec![0.0; m * (mm + 2)];
    let mut w = vec![0.0; n];
    let mut zz = vec![0.0; m];

    let mut skip_gradient = false;
    let mut obj = 0.0_f64;
    // Component that most wants to become active.
    let mut iact = 0usize;
    // One-based index of the variable that determined the last step fraction
    // (0 = unset) and the bound it hit; excluded from immediate re-selection.
    let mut aindx = 0usize;
    let mut aindx_sign = 0i32;
    // Sign of the bound the candidate came from, when the QR trial was
    // entered from the selection step; basis of the instability test.
    let mut from_select = 0i32;

    let finish = |x: Vec<f64>, rnorm: f64, iter: usize, conv: bool, istate: Vec<i32>| BvlsResult {
        x,
        residual_norm: rnorm,
        iterations: iter,
        state: BvlsState { istate },
        converged: conv,
    };

    for iter in 1..=max_iter {
        trace!("bvls: iteration {iter}");

        if !skip_gradient {
            // Residual r = b - A x, negative gradient w = A^T r, and the
            // objective r^T r. The residual lives in column mm of act.
            for wi in w.iter_mut() {
                *wi = 0.0;
            }
            obj = 0.0;
            for mi in 0..m {
                let mut ri = b[mi];
                for ni in 0..n {
                    ri -= a[mi + ni * m] * x[ni];
                }
                obj += ri * ri;
                for ni in 0..n {
                    w[ni] += a[mi + ni * m] * ri;
                }
                act[mi + mm * m] = ri;
            }
            trace!("bvls: obj={obj}");

            // Converged when the misfit is negligible against ||b||, or all
            // variables are active (except on the first warm-start pass).
            if obj.sqrt() <= bnorm * EPS || (iter > 1 && nbound == 0) {
                debug!("bvls: converged after {iter} iterations");
                istate[n] = nbound as i32;
                return Ok(finish(x, obj.sqrt(), iter, true, istate));
            }

            // Add the active components back so the residual reflects only
            // the bound ones.
            for ni in nbound..n {
                let i = istate[ni].unsigned_abs() as usize - 1;
                for mi in 0..m {
                    act[mi + mm * m] += a[mi + i * m] * x[i];
                }
            }
        }

        // A warm start needs an immediate QR trial; otherwise select the
        // bound variable whose gradient most violates optimality.
        if !(warm && iter == 1) {
            let mut it;
            loop {
                let mut worst = 0.0_f64;
                it = 1usize;
                for ni in 0..nbound {
                    let i = istate[ni].unsigned_abs() as usize - 1;
                    let bad = if istate[ni] < 0 { -w[i] } else { w[i] };
                    if bad < worst {
                        it = ni + 1;
                        worst = bad;
                        iact = i;
                    }
                }

                // Kuhn-Tucker condition met: no bound variable wants in.
                if worst >= 0.0 {
                    debug!("bvls: Kuhn-Tucker condition met after {iter} iterations");
                    istate[n] = nbound as i32;
                    return Ok(finish(x, obj.sqrt(), iter, true, istate));
                }

                // Anti-cycling: if the last successful active-set change
                // moved this very variable to a bound, zero its gradient
                // term and re-select.
                if aindx > 0 && iact == aindx - 1 {
                    w[aindx - 1] = 0.0;
                } else {
                    break;
                }
            }

            if istate[it - 1] == 0 {
                return Err(FitError::InvalidInput {
                    context: "bvls: corrupt active-set state".to_string(),
                });
            }

            // Undo the candidate's contribution to the residual.
            let bnd = if istate[it - 1] > 0 {
                upper[iact]
            } else {
                lower[iact]
            };
            for mi in 0..m {
                act[mi + mm * m] += bnd * a[mi + iact * m];
            }

            // Remember which bound the candidate came from: if the QR trial
            // pushes it back beyond that bound, the gradient test was wrong
            // and the variable must not enter.
            from_select = istate[it - 1];

            // Swap with the rightmost bound variable and unbind it.
            istate[it - 1] = istate[nbound - 1];
            nbound -= 1;
            nact += 1;
            istate[nbound] = (1 + iact) as i32;
            if mm < nact {
                return Err(FitError::TooManyActive {
                    context: "bvls: active set exceeds the sample count".to_string(),
                });
            }
        }

        // Trial loop: QR-solve the free subsystem, then either commit the
        // feasible solution or step as far as the bounds allow and re-bind
        // whichever variable hit one. Each pass removes at least one active
        // variable, so this terminates within nact steps.
        loop {
            skip_gradient = false;

            // Load the active columns for QR, most recent addition last for
            // stability, and copy the residual in as the right-hand side.
            for mi in 0..m {
                act[mi + (mm + 1) * m] = act[mi + mm * m];
                for ni in nbound..n {
                    let i = istate[ni].unsigned_abs() as usize - 1;
                    act[mi + (nact + nbound - ni - 1) * m] = a[mi + i * m];
                }
            }

            let qr_ok = {
                let (cols, bcol) = act.split_at_mut((mm + 1) * m);
                qr_solve_compact(m, nact, &mut cols[..nact * m], &mut bcol[..m], &mut zz).is_ok()
            };

            // Linear dependence, or an instability that moves the variable
            // just introduced away from the feasible region: push it back to
            // its bound, zero its gradient term, and go re-select.
            if !qr_ok
                || (from_select > 0 && zz[nact - 1] > upper[iact])
                || (from_select < 0 && zz[nact - 1] < lower[iact])
            {
                nbound += 1;
                if upper[iact] > x[iact] {
                    istate[nbound - 1] = -istate[nbound - 1];
                }
                nact -= 1;
                for mi in 0..m {
                    act[mi + mm * m] -= x[iact] * a[mi + iact * m];
                }
                from_select = 0;
                w[iact] = 0.0;
                skip_gradient = true;
                trace!("bvls: trial rejected, re-selecting candidate");
                break;
            }

            // The newcomer is in; the variable bound last is allowed back.
            if from_select != 0 {
                aindx = 0;
            }
            from_select = 0;

            // Strict feasibility check of the QR solution.
            let mut feasible = true;
            let mut index_holder = 0usize;
            for ni in 0..nact {
                index_holder = ni;
                let i = istate[ni + nbound].unsigned_abs() as usize - 1;
                if zz[nact - ni - 1] < lower[i] || zz[nact - ni - 1] > upper[i] {
                    trace!("bvls: new iterate is not feasible");
                    feasible = false;
                    break;
                }
            }
            if feasible {
                for ni in 0..nact {
                    let i = istate[ni + nbound].unsigned_abs() as usize - 1;
                    x[i] = zz[nact - ni - 1];
                }
                // Commit and return to the gradient pass.
                break;
            }

            // Largest step fraction alpha that keeps every active variable
            // within bounds; the variable that set it lands exactly on one.
            let mut alpha = 2.0_f64;
            let mut alf = alpha;
            for ni in index_holder..nact {
                let i = istate[ni + nbound].unsigned_abs() as usize - 1;
                if zz[nact - ni - 1] > upper[i] {
                    alf = (upper[i] - x[i]) / (zz[nact - ni - 1] - x[i]);
                }
                if zz[nact - ni - 1] < lower[i] {
                    alf = (lower[i] - x[i]) / (zz[nact - ni - 1] - x[i]);
                }
                if alf < alpha {
                    alpha = alf;
                    aindx = 1 + i;
                    aindx_sign = if zz[nact - ni - 1] - lower[i] < 0.0 { -1 } else { 1 };
                }
            }
            for ni in 0..nact {
                let i = istate[ni + nbound].unsigned_abs() as usize - 1;
                x[i] += alpha * (zz[nact - ni - 1] - x[i]);
            }

            // Bind the variable that determined alpha, plus any component
            // now infeasible by round-off, to the appropriate bound, and
            // correct the residual for each one moved.
            let noldb = nbound;
            for ni in 0..nact {
                let i = istate[ni + noldb].unsigned_abs() as usize - 1;
                if upper[i] - x[i] <= 0.0 || (aindx > 0 && i == aindx - 1 && aindx_sign > 0) {
                    x[i] = upper[i];
                    istate[ni + noldb] = istate[nbound];
                    istate[nbound] = (1 + i) as i32;
                    nbound += 1;
                    for mi in 0..m {
                        act[mi + mm * m] -= upper[i] * a[mi + i * m];
                    }
                } else if x[i] - lower[i] <= 0.0 || (aindx > 0 && i == aindx - 1 && aindx_sign < 0)
                {
                    x[i] = lower[i];
                    istate[ni + noldb] = istate[nbound];
                    istate[nbound] = -((1 + i) as i32);
                    nbound += 1;
                    for mi in 0..m {
                        act[mi + mm * m] -= lower[i] * a[mi + i * m];
                    }
                }
            }
            nact = n - nbound;

            if nact == 0 {
                break;
            }
        }
    }

    debug!("bvls: iteration cap {max_iter} reached without convergence");
    istate[n] = nbound as i32;
    Ok(finish(x, obj.sqrt(), max_iter, false, istate))
}

/// Scales each row of the column-major system `A x ~ b` by the square root
/// of its weight, so a following least-squares solve minimizes the weighted
/// residual. Weights at or below 1e-20 zero the row out of the fit.
pub fn weight_problem(
    m: usize,
    n: usize,
    a: &mut [f64],
    b: &mut [f64],
    weights: &[f64],
) -> FitResult<()> {
    if n < 1 || m < 1 || a.len() < n * m || b.len() != m || weights.len() != m {
        return Err(FitError::InvalidInput {
            context: "weight_problem: dimension mismatch".to_string(),
        });
    }
    for mi in 0..m {
        let w = if weights[mi] <= 1.0e-20 {
            0.0
        } else {
            weights[mi].sqrt()
        };
        for ni in 0..n {
            a[mi + ni * m] *= w;
        }
        b[mi] *= w;
    }
    Ok(())
}

/// Like [`weight_problem`] but the caller supplies weights already
/// square-rooted; they are multiplied in as-is. Faster when the same system
/// is weighted many times.
pub fn weight_problem_squared(
    m: usize,
    n: usize,
    a: &mut [f64],
    b: &mut [f64],
    sweights: &[f64],
) -> FitResult<()> {
    if n < 1 || m < 1 || a.len() < n * m || b.len() != m || sweights.len() != m {
        return Err(FitError::InvalidInput {
            context: "weight_problem_squared: dimension mismatch".to_string(),
        });
    }
    for mi in 0..m {
        for ni in 0..n {
            a[mi + ni * m] *= sweights[mi];
        }
        b[mi] *= sweights[mi];
    }
    Ok(())
}
