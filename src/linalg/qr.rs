//! QR decomposition and least-squares solves.
//!
//! Two solver paths are provided. The general path factors a row-major
//! `Vec<Vec<f64>>` matrix with [`qr_decompose`] and solves with
//! [`qr_solve_factored`]; [`qr_solve`] wraps both. The compact path
//! [`qr_solve_compact`] applies Householder rotations directly to a flattened
//! column-major buffer and is the allocation-light inner solver for BVLS,
//! which calls it once per trial step.

use log::trace;

use super::householder;
use crate::error::{FitError, FitResult};

/// Solution of a least-squares system, produced by [`qr_solve_factored`].
#[derive(Debug, Clone)]
pub struct QrSolution {
    /// Solution vector x (length n).
    pub x: Vec<f64>,
    /// Residual b - Ax (length m).
    pub residual: Vec<f64>,
    /// Squared Euclidean norm of the residual.
    pub residual_norm_sq: f64,
}

/// Factors a general m x n matrix in place into A = QR.
///
/// Q is stored as packed Householder vectors in the strict lower triangle of
/// `a` together with the coefficients written to `tau`; R occupies the
/// diagonal and upper triangle. This is the LAPACK storage scheme: the full
/// Q is the product `Q_1 Q_2 .. Q_k` with `Q_i = I - tau_i * h_i * h_i^T`
/// and `h_i = [1, A(i+1,i), .., A(m-1,i)]`.
///
/// `tau` must have length `min(m, n)`.
pub fn qr_decompose(a: &mut [Vec<f64>], tau: &mut [f64]) -> FitResult<()> {
    let m = a.len();
    let n = if m > 0 { a[0].len() } else { 0 };
    let mn_min = m.min(n);
    if mn_min < 1 || tau.len() != mn_min {
        return Err(FitError::InvalidInput {
            context: "qr_decompose: empty matrix or tau size mismatch".to_string(),
        });
    }

    for i in 0..mn_min {
        // Reduce column i to a multiple of the i-th unit vector; the
        // reflection vector stays in the lower triangle of that column.
        let mut h: Vec<f64> = (i..m).map(|row| a[row][i]).collect();
        tau[i] = householder::transform(&mut h);
        for (row, &hv) in (i..m).zip(h.iter()) {
            a[row][i] = hv;
        }
        // Propagate the reflection to the trailing columns.
        if i + 1 < n {
            householder::apply_left(tau[i], &h, a, i, i + 1);
        }
    }
    Ok(())
}

/// Solves the least-squares system `A x ~ b` for m >= n from a factorization
/// produced by [`qr_decompose`].
///
/// Forms `Q^T b`, back-substitutes `R x = Q^T b`, and reconstructs the
/// residual as `Q (Q^T b - R x)`. A zero diagonal entry of R means the
/// system is singular.
pub fn qr_solve_factored(qr: &[Vec<f64>], tau: &[f64], b: &[f64]) -> FitResult<QrSolution> {
    let m = qr.len();
    let n = if m > 0 { qr[0].len() } else { 0 };
    if n < 1 || m < n || b.len() != m || tau.len() != m.min(n) {
        return Err(FitError::InvalidInput {
            context: "qr_solve_factored: dimension mismatch".to_string(),
        });
    }
    let mn_min = m.min(n);

    // residual = Q^T b
    let mut residual = b.to_vec();
    for i in 0..mn_min {
        let h: Vec<f64> = (i..m).map(|row| qr[row][i]).collect();
        householder::apply_vector(tau[i], &h, &mut residual[i..]);
    }

    // Back-substitute R x = Q^T b.
    let mut x: Vec<f64> = residual[..n].to_vec();
    for i in (0..n).rev() {
        for j in (i + 1)..n {
            let xj = x[j];
            x[i] -= qr[i][j] * xj;
        }
        if qr[i][i] == 0.0 {
            return Err(FitError::SingularMatrix {
                context: format!("qr_solve_factored: zero diagonal at {i}"),
            });
        }
        x[i] /= qr[i][i];
    }

    // residual = b - A x = Q (Q^T b - R x): zero the first n entries of
    // Q^T b and apply the reflections in reverse.
    for r in residual[..n].iter_mut() {
        *r = 0.0;
    }
    for i in (0..mn_min).rev() {
        let h: Vec<f64> = (i..m).map(|row| qr[row][i]).collect();
        householder::apply_vector(tau[i], &h, &mut residual[i..]);
    }
    let residual_norm_sq = residual.iter().map(|r| r * r).sum();

    Ok(QrSolution {
        x,
        residual,
        residual_norm_sq,
    })
}

/// Solves `min ||A x - b||` for an overdetermined system (m >= n).
///
/// Composite of [`qr_decompose`] and [`qr_solve_factored`]; `a` is consumed
/// as factorization scratch. Fails if any solution component is NaN.
pub fn qr_solve(a: &mut [Vec<f64>], b: &[f64]) -> FitResult<QrSolution> {
    let m = a.len();
    let n = if m > 0 { a[0].len() } else { 0 };
    if n < 1 || m < n || b.len() != m {
        return Err(FitError::InvalidInput {
            context: "qr_solve: need m >= n >= 1 and matching b".to_string(),
        });
    }
    let mut tau = vec![0.0; n];
    qr_decompose(a, &mut tau)?;
    let solution = qr_solve_factored(a, &tau, b)?;
    if solution.x.iter().any(|x| x.is_nan()) {
        return Err(FitError::SingularMatrix {
            context: "qr_solve: solution contains NaN".to_string(),
        });
    }
    Ok(solution)
}

/// Solves `A x ~ b` with successive Householder rotations on a flattened
/// column-major buffer (Lawson-Hanson style).
///
/// `a` holds n consecutive m-length columns and is destroyed, as is `b`;
/// this keeps the routine allocation-free so BVLS can call it many times
/// cheaply. The solution is written to `x` and the sum of squared residuals
/// returned. A column with exactly zero remaining norm, or a zero pivot,
/// reports the system as singular.
pub fn qr_solve_compact(
    m: usize,
    n: usize,
    a: &mut [f64],
    b: &mut [f64],
    x: &mut [f64],
) -> FitResult<f64> {
    if n < 1 || m < n {
        return Err(FitError::InvalidInput {
            context: "qr_solve_compact: need m >= n >= 1".to_string(),
        });
    }
    if a.len() < n * m || b.len() < m || x.len() < n {
        return Err(FitError::InvalidInput {
            context: "qr_solve_compact: undersized buffer".to_string(),
        });
    }

    // Zero the output so a singular exit leaves defined values.
    for xi in x[..n].iter_mut() {
        *xi = 0.0;
    }

    // Rotate A into upper triangular form, carrying b along.
    for ni in 0..n {
        let mut sq = 0.0;
        for mi in ni..m {
            sq += a[mi + ni * m] * a[mi + ni * m];
        }
        if sq == 0.0 {
            trace!("qr_solve_compact: zero column norm at {ni}");
            return Err(FitError::SingularMatrix {
                context: format!("qr_solve_compact: zero column norm at {ni}"),
            });
        }
        let qv1 = -sq.sqrt().copysign(a[ni + ni * m]);
        let u1 = a[ni + ni * m] - qv1;
        a[ni + ni * m] = qv1;
        let ni1 = ni + 1;
        // Rotate the remaining columns of the sub-matrix.
        for nj in ni1..n {
            let mut dot = u1 * a[ni + nj * m];
            for mi in ni1..m {
                dot += a[mi + nj * m] * a[mi + ni * m];
            }
            let c = dot / (qv1 * u1).abs();
            for mi in ni1..m {
                a[mi + nj * m] -= c * a[mi + ni * m];
            }
            a[ni + nj * m] -= c * u1;
        }
        // Rotate the right-hand side.
        let mut dot = u1 * b[ni];
        for mi in ni1..m {
            dot += b[mi] * a[mi + ni * m];
        }
        let c = dot / (qv1 * u1).abs();
        b[ni] -= c * u1;
        for mi in ni1..m {
            b[mi] -= c * a[mi + ni * m];
        }
    }

    // Back-substitution.
    for ni in 0..n {
        let k = n - ni - 1;
        let mut s = b[k];
        for nj in (k + 1)..n {
            s -= a[k + nj * m] * x[nj];
        }
        if a[k + k * m] == 0.0 {
            return Err(FitError::SingularMatrix {
                context: format!("qr_solve_compact: zero pivot at {k}"),
            });
        }
        x[k] = s / a[k + k * m];
    }

    let mut r2 = 0.0;
    for bi in b[n..m].iter() {
        r2 += bi * bi;
    }
    Ok(r2)
}

/// Scales each row of `a` and the matching entry of `b` by the square root
/// of its weight, so a following least-squares solve minimizes the weighted
/// residual.
///
/// Weights at or below 1e-100 are replaced by a tiny nonzero floor instead
/// of zero, which would destroy the row.
pub fn weight_rows(a: &mut [Vec<f64>], b: &mut [f64], weights: &[f64]) -> FitResult<()> {
    let m = a.len();
    if m < 1 || b.len() != m || weights.len() != m {
        return Err(FitError::InvalidInput {
            context: "weight_rows: dimension mismatch".to_string(),
        });
    }
    for mi in 0..m {
        let w = if weights[mi] <= 1.0e-100 {
            1.0e-50
        } else {
            weights[mi].sqrt()
        };
        for v in a[mi].iter_mut() {
            *v *= w;
        }
        b[mi] *= w;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // Deterministic generator for test matrices; the crate itself has no
    // randomness.
    fn splitmix64(state: &mut u64) -> f64 {
        *state = state.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = *state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z = z ^ (z >> 31);
        (z >> 11) as f64 / (1u64 << 53) as f64
    }

    fn mat_vec(a: &[Vec<f64>], x: &[f64]) -> Vec<f64> {
        a.iter()
            .map(|row| row.iter().zip(x.iter()).map(|(r, v)| r * v).sum())
            .collect()
    }

    #[test]
    fn test_qr_solve_round_trip() {
        // Random full-rank systems: b = A x must recover x.
        let mut state = 42u64;
        for &(m, n) in &[(3usize, 2usize), (6, 4), (10, 5)] {
            let mut a: Vec<Vec<f64>> = (0..m)
                .map(|_| (0..n).map(|_| 2.0 * splitmix64(&mut state) - 1.0).collect())
                .collect();
            // Boost the diagonal so the system is well conditioned.
            for i in 0..n {
                a[i][i] += 3.0;
            }
            let x_true: Vec<f64> = (0..n).map(|i| 1.0 + i as f64).collect();
            let b = mat_vec(&a, &x_true);
            let x_norm = x_true.iter().map(|v| v * v).sum::<f64>().sqrt();

            let solution = qr_solve(&mut a, &b).expect("qr_solve failed");
            for (xi, ti) in solution.x.iter().zip(x_true.iter()) {
                assert!((xi - ti).abs() < 1e-9 * x_norm, "m={m} n={n}: {xi} vs {ti}");
            }
            assert!(solution.residual_norm_sq < 1e-18);
        }
    }

    #[test]
    fn test_qr_solve_overdetermined_residual() {
        // 3 samples, 1 parameter: least-squares slope of b ~ a*x.
        let mut a = vec![vec![1.0], vec![2.0], vec![3.0]];
        let b = vec![2.0, 4.1, 5.9];
        let solution = qr_solve(&mut a, &b).expect("qr_solve failed");
        // Normal-equation solution: sum(a*b)/sum(a*a)
        let expected = (2.0 + 2.0 * 4.1 + 3.0 * 5.9) / 14.0;
        assert_relative_eq!(solution.x[0], expected, epsilon = 1e-12);
        assert!(solution.residual_norm_sq > 0.0);
    }

    #[test]
    fn test_qr_solve_singular() {
        // An all-zero column leaves a zero diagonal entry in R.
        let mut a = vec![vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0]];
        let b = vec![1.0, 2.0, 3.0];
        assert!(matches!(
            qr_solve(&mut a, &b),
            Err(FitError::SingularMatrix { .. })
        ));
    }

    #[test]
    fn test_qr_solve_underdetermined_rejected() {
        let mut a = vec![vec![1.0, 2.0, 3.0]];
        let b = vec![1.0];
        assert!(matches!(
            qr_solve(&mut a, &b),
            Err(FitError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_qr_solve_compact_matches_general() {
        let m = 5;
        let n = 3;
        let mut state = 7u64;
        let rows: Vec<Vec<f64>> = (0..m)
            .map(|i| {
                (0..n)
                    .map(|j| 2.0 * splitmix64(&mut state) - 1.0 + if i == j { 3.0 } else { 0.0 })
                    .collect()
            })
            .collect();
        let b: Vec<f64> = (0..m).map(|_| splitmix64(&mut state)).collect();

        let mut a_general = rows.clone();
        let general = qr_solve(&mut a_general, &b).expect("qr_solve failed");

        // Column-major copy for the compact solver.
        let mut a_flat = vec![0.0; m * n];
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                a_flat[i + j * m] = v;
            }
        }
        let mut b_flat = b.clone();
        let mut x = vec![0.0; n];
        let r2 = qr_solve_compact(m, n, &mut a_flat, &mut b_flat, &mut x)
            .expect("qr_solve_compact failed");

        for j in 0..n {
            assert_relative_eq!(x[j], general.x[j], epsilon = 1e-10);
        }
        assert_relative_eq!(r2, general.residual_norm_sq, epsilon = 1e-10);
    }

    #[test]
    fn test_qr_solve_compact_zero_column() {
        let m = 3;
        let n = 2;
        let mut a = vec![0.0; m * n];
        // First column nonzero, second all zero.
        a[0] = 1.0;
        a[1] = 2.0;
        a[2] = 3.0;
        let mut b = vec![1.0, 1.0, 1.0];
        let mut x = vec![0.0; n];
        assert!(matches!(
            qr_solve_compact(m, n, &mut a, &mut b, &mut x),
            Err(FitError::SingularMatrix { .. })
        ));
        // Output was zeroed on the singular exit.
        assert_eq!(x, vec![0.0, 0.0]);
    }

    #[test]
    fn test_weight_rows() {
        let mut a = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let mut b = vec![1.0, 2.0];
        weight_rows(&mut a, &mut b, &[4.0, 9.0]).expect("weight_rows failed");
        assert_relative_eq!(a[0][0], 2.0);
        assert_relative_eq!(a[1][1], 12.0);
        assert_relative_eq!(b[1], 6.0);
    }

    #[test]
    fn test_weight_rows_floor() {
        // A zero weight must not wipe out the row entirely.
        let mut a = vec![vec![1.0], vec![1.0]];
        let mut b = vec![1.0, 1.0];
        weight_rows(&mut a, &mut b, &[0.0, 1.0]).expect("weight_rows failed");
        assert!(a[0][0] > 0.0);
        assert!(a[0][0] < 1e-40);
    }
}
