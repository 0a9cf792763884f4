//! Householder reflections, the orthogonal primitive behind QR.
//!
//! A transform `P = I - tau * h * h^T` zeroes every element of a vector
//! except the first. The reflection vector is stored with an implicit
//! leading 1: `apply_left` and `apply_vector` never read `h[0]`.

/// Euclidean norm of a vector.
#[inline]
pub fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Prepares a Householder transformation `P = I - tau * h * h^T` that zeroes
/// all elements of `v` except the first.
///
/// On return `v[0]` holds `beta = -sign(v[0]) * hypot(v[0], ||v[1..]||)` and
/// `v[1..]` holds the reflection vector scaled so its implicit leading
/// element is 1. Returns the scalar `tau`.
///
/// If the norm of `v[1..]` is zero or NaN the identity transform (`tau = 0`)
/// is returned and `v` is left unchanged.
pub fn transform(v: &mut [f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let vnorm = norm(&v[1..]);
    if vnorm.is_nan() || vnorm == 0.0 {
        return 0.0;
    }

    let alpha = v[0];
    let beta = -(if alpha >= 0.0 { 1.0 } else { -1.0 }) * alpha.hypot(vnorm);
    let tau = (beta - alpha) / beta;

    // Scale so that the implicit first element of the reflection vector is 1.
    // Without scaling it would be (alpha - beta). If that difference has
    // underflowed, rescale in two steps through machine epsilon so the
    // division cannot overflow.
    let s = alpha - beta;
    v[0] = beta;
    if s.abs() > f64::MIN_POSITIVE {
        for x in v[1..].iter_mut() {
            *x /= s;
        }
    } else {
        for x in v[1..].iter_mut() {
            *x *= f64::EPSILON / s;
        }
        for x in v[1..].iter_mut() {
            *x /= f64::EPSILON;
        }
    }

    tau
}

/// Applies the transform `(I - tau * h * h^T) * M` in place to the block of
/// `matrix` starting at `(row0, col0)`.
///
/// `h[0]` is treated as 1 regardless of its stored value; `h` must cover the
/// rows `row0..`. A no-op when `tau == 0`.
pub fn apply_left(tau: f64, h: &[f64], matrix: &mut [Vec<f64>], row0: usize, col0: usize) {
    if tau == 0.0 {
        return;
    }
    let m = matrix.len();
    let n = matrix[0].len();
    for j in col0..n {
        // wj = h^T * column j, with h[0] = 1
        let mut wj = matrix[row0][j];
        for i in (row0 + 1)..m {
            wj += h[i - row0] * matrix[i][j];
        }
        matrix[row0][j] -= tau * wj;
        for i in (row0 + 1)..m {
            matrix[i][j] -= tau * h[i - row0] * wj;
        }
    }
}

/// Applies the transform `w = (I - tau * h * h^T) * w` in place.
///
/// `h[0]` is treated as 1 regardless of its stored value. A no-op when
/// `tau == 0`.
pub fn apply_vector(tau: f64, h: &[f64], w: &mut [f64]) {
    if tau == 0.0 || w.is_empty() {
        return;
    }
    let mut d = w[0];
    for i in 1..w.len() {
        d += h[i] * w[i];
    }
    w[0] -= tau * d;
    for i in 1..w.len() {
        w[i] -= tau * h[i] * d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_norm() {
        assert_relative_eq!(norm(&[3.0, 4.0]), 5.0);
        assert_eq!(norm(&[]), 0.0);
    }

    #[test]
    fn test_transform_zeroes_tail() {
        let mut v = vec![2.0, 1.0, 2.0];
        let original = v.clone();
        let tau = transform(&mut v);
        assert!(tau != 0.0);
        // beta = -sign(2) * hypot(2, sqrt(5)) = -3
        assert_relative_eq!(v[0], -3.0, epsilon = 1e-12);

        // Applying the reflection to the original vector must send it to
        // (beta, 0, 0).
        let mut w = original;
        apply_vector(tau, &v, &mut w);
        assert_relative_eq!(w[0], -3.0, epsilon = 1e-12);
        assert!(w[1].abs() < 1e-12);
        assert!(w[2].abs() < 1e-12);
    }

    #[test]
    fn test_transform_degenerate_tail() {
        // Zero sub-norm: identity transform, vector untouched.
        let mut v = vec![5.0, 0.0, 0.0];
        let tau = transform(&mut v);
        assert_eq!(tau, 0.0);
        assert_eq!(v, vec![5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_transform_nan_tail() {
        let mut v = vec![1.0, f64::NAN];
        assert_eq!(transform(&mut v), 0.0);
    }

    #[test]
    fn test_apply_left_identity_when_tau_zero() {
        let mut m = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        apply_left(0.0, &[1.0, 1.0], &mut m, 0, 0);
        assert_eq!(m, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_apply_vector_matches_explicit_product() {
        let mut v = vec![3.0, 1.0, -2.0];
        let tau = transform(&mut v);
        // Build the explicit reflection vector with leading 1.
        let h = vec![1.0, v[1], v[2]];
        let w0 = [1.0, 2.0, 3.0];
        let mut w = w0;
        apply_vector(tau, &v, &mut w);
        // Explicit (I - tau h h^T) w
        let d: f64 = h.iter().zip(w0.iter()).map(|(a, b)| a * b).sum();
        for i in 0..3 {
            assert_relative_eq!(w[i], w0[i] - tau * h[i] * d, epsilon = 1e-12);
        }
    }
}
