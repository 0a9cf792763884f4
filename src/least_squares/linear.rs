//! Straight-line fits: weighted errors-in-both-coordinates regression,
//! perpendicular-distance regression, and a repeated-median estimator.

use log::{debug, trace};

use crate::error::{FitError, FitResult};

/// Result of [`llsq_weighted`].
#[derive(Debug, Clone)]
pub struct WeightedLineFit {
    /// Estimated slope.
    pub slope: f64,
    /// Estimated intercept.
    pub intercept: f64,
    /// `sqrt(WSS) / wsum`, the normalized weighted sum of squares.
    pub nwss: f64,
    /// Effective combined weights used on the final iteration.
    pub weights: Vec<f64>,
    /// Expected standard deviation of the slope, when requested.
    pub slope_sd: Option<f64>,
    /// Expected standard deviation of the intercept, when requested.
    pub intercept_sd: Option<f64>,
    /// Fitted x coordinates (points projected onto the line), when requested.
    pub fitted_x: Option<Vec<f64>>,
    /// Fitted y coordinates, when requested.
    pub fitted_y: Option<Vec<f64>>,
}

/// Iterative linear least-squares fit with errors in both coordinates.
///
/// Fits `y = slope * x + intercept` where each point carries separate
/// weights `wx[i]` and `wy[i]`, assigned as inverses of the coordinate
/// variances, `w = 1 / sd^2`. A point is excluded by setting either of its
/// weights to zero. Follows Reed (Am J Phys 1992;60:59-62), which builds on
/// the York and Lybanon algorithms.
///
/// With `with_variances` the parameter standard deviations and the fitted
/// points are estimated as well; they apply the `S/(N-2)` correction, so
/// relative weights of the right proportions give usable sigmas even when
/// the absolute scale of the weights is off.
///
/// Degenerate data (constant x, or fewer than two points with positive
/// weight) returns an all-zero fit rather than an error.
pub fn llsq_weighted(
    x: &[f64],
    y: &[f64],
    wx: &[f64],
    wy: &[f64],
    tol: f64,
    with_variances: bool,
) -> FitResult<WeightedLineFit> {
    let n = x.len();
    if n < 2 || y.len() != n || wx.len() != n || wy.len() != n {
        return Err(FitError::InvalidInput {
            context: "llsq_weighted: need at least 2 points with matching weights".to_string(),
        });
    }
    if tol < 1.0e-100 {
        return Err(FitError::InvalidInput {
            context: "llsq_weighted: tolerance must be positive".to_string(),
        });
    }
    debug!("llsq_weighted: n={n} tol={tol}");

    let zero_fit = |weights: Vec<f64>| WeightedLineFit {
        slope: 0.0,
        intercept: 0.0,
        nwss: 0.0,
        weights,
        slope_sd: with_variances.then_some(0.0),
        intercept_sd: with_variances.then_some(0.0),
        fitted_x: None,
        fitted_y: None,
    };

    // Two points define the line exactly.
    if n == 2 {
        let f = x[1] - x[0];
        if f == 0.0 {
            return Ok(zero_fit(vec![0.0; 2]));
        }
        let slope = (y[1] - y[0]) / f;
        return Ok(WeightedLineFit {
            slope,
            intercept: y[0] - slope * x[0],
            nwss: 0.0,
            weights: vec![1.0; 2],
            slope_sd: with_variances.then_some(0.0),
            intercept_sd: with_variances.then_some(0.0),
            fitted_x: None,
            fitted_y: None,
        });
    }

    // Initial slope and intercept from unweighted regression.
    let (mut xsum, mut ysum, mut x2sum, mut xysum) = (0.0, 0.0, 0.0, 0.0);
    for i in 0..n {
        xsum += x[i];
        ysum += y[i];
        x2sum += x[i] * x[i];
        xysum += x[i] * y[i];
    }
    let delta = n as f64 * x2sum - xsum * xsum;
    if delta == 0.0 {
        debug!("llsq_weighted: x values are all equal");
        return Ok(zero_fit(vec![0.0; n]));
    }
    let mut m = (n as f64 * xysum - xsum * ysum) / delta;
    let mut c = (x2sum * ysum - xsum * xysum) / delta;
    trace!("llsq_weighted: initial guess intercept={c} slope={m}");

    let mut w = vec![0.0; n];
    let mut xb = 0.0;
    let mut yb = 0.0;
    let mut wsum = 0.0;
    let mut ss = 0.0;
    let mut niter = 0;
    let mut prev = m + 2.0 * tol;
    while (m - prev).abs() > tol && niter < 20 {
        prev = m;
        niter += 1;

        // Effective weights combine both coordinate weights through the
        // current slope.
        let m2 = m * m;
        let mut nn = 0;
        for i in 0..n {
            if wx[i] <= 0.0 || wy[i] <= 0.0 {
                w[i] = 0.0;
            } else {
                w[i] = wx[i] * wy[i] / (m2 * wy[i] + wx[i]);
                nn += 1;
            }
        }
        if nn < 2 {
            debug!("llsq_weighted: fewer than two points with positive weight");
            return Ok(zero_fit(w));
        }

        // Barycentre of the weighted data.
        xb = 0.0;
        yb = 0.0;
        wsum = 0.0;
        for i in 0..n {
            xb += w[i] * x[i];
            yb += w[i] * y[i];
            wsum += w[i];
        }
        if wsum <= 0.0 {
            return Err(FitError::SingularMatrix {
                context: "llsq_weighted: nonpositive weight sum".to_string(),
            });
        }
        xb /= wsum;
        yb /= wsum;

        // The slope is a root of a quadratic in the barycentric coordinates.
        let (mut qa, mut qb, mut qc) = (0.0, 0.0, 0.0);
        for i in 0..n {
            if w[i] > 0.0 {
                let u = x[i] - xb;
                let v = y[i] - yb;
                let w2 = w[i] * w[i];
                qa += w2 * u * v / wx[i];
                qb += w2 * (u * u / wy[i] - v * v / wx[i]);
                qc += -w2 * u * v / wy[i];
            }
        }
        if qa == 0.0 {
            m = 0.0;
            ss = 0.0;
            for i in 0..n {
                let f = y[i] - yb;
                ss += w[i] * f * f;
            }
        } else if qa == 1.0 {
            // Quadratic reduces to a linear form.
            m = -qc / qb;
            ss = 0.0;
            for i in 0..n {
                let f = (y[i] - yb) - m * (x[i] - xb);
                ss += w[i] * f * f;
            }
        } else {
            let discr = qb * qb - 4.0 * qa * qc;
            let sqdis = if discr <= 0.0 { 0.0 } else { discr.sqrt() };
            let m_1 = (-qb + sqdis) / (2.0 * qa);
            let m_2 = (-qb - sqdis) / (2.0 * qa);
            // Pick the root with the lower weighted sum of squares.
            let (mut s1, mut s2) = (0.0, 0.0);
            for i in 0..n {
                let u = x[i] - xb;
                let v = y[i] - yb;
                let f1 = v - m_1 * u;
                let f2 = v - m_2 * u;
                s1 += w[i] * f1 * f1;
                s2 += w[i] * f2 * f2;
            }
            if s1 <= s2 {
                m = m_1;
                ss = s1;
            } else {
                m = m_2;
                ss = s2;
            }
        }
        c = yb - m * xb;
        trace!("llsq_weighted: iteration {niter} intercept={c} slope={m}");
    }
    debug!("llsq_weighted: intercept={c} slope={m} wss={ss} iterations={niter}");

    let mut fit = WeightedLineFit {
        slope: m,
        intercept: c,
        nwss: ss.sqrt() / wsum,
        weights: w,
        slope_sd: None,
        intercept_sd: None,
        fitted_x: None,
        fitted_y: None,
    };
    if !with_variances {
        return Ok(fit);
    }
    let w = &fit.weights;

    // Project the data onto the fitted line through the Lagrangian
    // multiplier of each point.
    let mut cx = vec![0.0; n];
    let mut cy = vec![0.0; n];
    for i in 0..n {
        if w[i] > 0.0 {
            let f = w[i] * (c + m * x[i] - y[i]);
            cx[i] = x[i] - f * m / wx[i];
            cy[i] = y[i] + f / wy[i];
        } else {
            cx[i] = x[i];
            cy[i] = y[i];
        }
    }

    // Parameter variances per Reed 1992, lowest-order Taylor terms only.
    let nn = w.iter().filter(|&&wi| wi > 0.0).count();
    if nn < 3 {
        fit.slope_sd = Some(0.0);
        fit.intercept_sd = Some(0.0);
        fit.fitted_x = Some(cx);
        fit.fitted_y = Some(cy);
        return Ok(fit);
    }

    // Barycentre of the projected points.
    let mut xb = 0.0;
    let mut yb = 0.0;
    let mut wsum = 0.0;
    for i in 0..n {
        xb += w[i] * cx[i];
        yb += w[i] * cy[i];
        wsum += w[i];
    }
    if wsum <= 0.0 {
        return Err(FitError::SingularMatrix {
            context: "llsq_weighted: nonpositive weight sum".to_string(),
        });
    }
    xb /= wsum;
    yb /= wsum;

    let m2 = m * m;
    let (mut qa, mut qb, mut qc) = (0.0, 0.0, 0.0);
    let (mut hh, mut jj) = (0.0, 0.0);
    for i in 0..n {
        if w[i] > 0.0 {
            let u = cx[i] - xb;
            let v = cy[i] - yb;
            let w2 = w[i] * w[i];
            qa += w2 * u * v / wx[i];
            qb += w2 * (u * u / wy[i] - v * v / wx[i]);
            qc += -w2 * u * v / wy[i];
            hh += w2 * v / wx[i];
            jj += w2 * u / wx[i];
        }
    }
    hh *= -2.0 * m / wsum;
    jj *= -2.0 * m / wsum;

    let (mut aa, mut bb, mut cc) = (0.0, 0.0, 0.0);
    for i in 0..n {
        if w[i] > 0.0 {
            let u = cx[i] - xb;
            let v = cy[i] - yb;
            let w2 = w[i] * w[i];
            aa += w[i] * w2 * u * v / (wx[i] * wx[i]);
            bb -= w2
                * (4.0 * m * (w[i] / wx[i]) * (u * u / wy[i] - v * v / wx[i])
                    - 2.0 * v * hh / wx[i]
                    + 2.0 * u * jj / wy[i]);
            cc -= (w2 / wy[i]) * (4.0 * m * w[i] * u * v / wx[i] + v * jj + u * hh);
        }
    }
    if m != 0.0 {
        aa = 4.0 * m * aa - wsum * hh * jj / m;
    } else {
        aa = 0.0;
    }

    let mut varm = 0.0;
    let mut varc = 0.0;
    let denom = 2.0 * m * qa + qb - aa * m2 + bb * m - cc;
    for j in 0..n {
        if w[j] <= 0.0 {
            continue;
        }
        let (mut dd, mut ee, mut ff, mut gg) = (0.0, 0.0, 0.0, 0.0);
        for i in 0..n {
            if w[i] > 0.0 {
                let u = cx[i] - xb;
                let v = cy[i] - yb;
                let w2 = w[i] * w[i];
                let kron = if i == j { 1.0 } else { 0.0 };
                let f = kron - w[j] / wsum;
                dd += (w2 * v / wx[i]) * f;
                ee += (w2 * u / wy[i]) * f;
                ff += (w2 * v / wy[i]) * f;
                gg += (w2 * u / wx[i]) * f;
            }
        }
        ee *= 2.0;
        // Derivatives of slope and intercept with respect to the jth point.
        let dmx = -(m2 * dd + m * ee - ff) / denom;
        let dmy = -(m2 * gg - 2.0 * m * dd - ee / 2.0) / denom;
        let dcx = (hh - m * jj - xb) * dmx - m * w[j] / wsum;
        let dcy = (hh - m * jj - xb) * dmy + w[j] / wsum;
        varm += dmy * dmy / wy[j] + dmx * dmx / wx[j];
        varc += dcy * dcy / wy[j] + dcx * dcx / wx[j];
    }
    varm *= ss / (nn - 2) as f64;
    varc *= ss / (nn - 2) as f64;
    trace!("llsq_weighted: varm={varm} varc={varc}");

    fit.slope_sd = Some(varm.sqrt());
    fit.intercept_sd = Some(varc.sqrt());
    fit.fitted_x = Some(cx);
    fit.fitted_y = Some(cy);
    Ok(fit)
}

/// Which end of the data [`best_llsq_weighted`] trims points from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimFrom {
    /// Drop leading points, keeping the tail.
    Start,
    /// Drop trailing points, keeping the head.
    End,
}

/// Result of [`best_llsq_weighted`]: the winning fit plus the data range
/// that produced it.
#[derive(Debug, Clone)]
pub struct BestLineFit {
    /// Fit over the selected range, with variances and fitted points.
    pub fit: WeightedLineFit,
    /// Index of the first point included.
    pub start: usize,
    /// Number of points included, zero-weight points counted in.
    pub count: usize,
}

/// Finds the best weighted line fit over contiguous subranges of the data,
/// trimming points from one end, and refits the winning range at a tighter
/// slope tolerance with variances. `min_count` must be at least 4.
pub fn best_llsq_weighted(
    x: &[f64],
    y: &[f64],
    wx: &[f64],
    wy: &[f64],
    min_count: usize,
    trim: TrimFrom,
) -> FitResult<BestLineFit> {
    let nr = x.len();
    if nr < min_count || nr < 2 || y.len() != nr || wx.len() != nr || wy.len() != nr {
        return Err(FitError::InvalidInput {
            context: "best_llsq_weighted: too few points for the requested range".to_string(),
        });
    }
    if min_count < 4 {
        return Err(FitError::InvalidInput {
            context: "best_llsq_weighted: min_count must be at least 4".to_string(),
        });
    }

    // Search the range giving the lowest normalized WSS.
    let mut best: Option<(usize, usize, f64)> = None;
    let ranges: Vec<(usize, usize)> = match trim {
        TrimFrom::Start => (0..nr - min_count).map(|from| (from, nr - 1)).collect(),
        TrimFrom::End => (min_count - 1..nr).map(|to| (0, to)).collect(),
    };
    for (from, to) in ranges {
        let fit = llsq_weighted(
            &x[from..=to],
            &y[from..=to],
            &wx[from..=to],
            &wy[from..=to],
            1.0e-10,
            false,
        );
        if let Ok(f) = fit {
            trace!("best_llsq_weighted: range {from}-{to} nwss={}", f.nwss);
            if best.map_or(true, |(_, _, nwss)| f.nwss < nwss) {
                best = Some((from, to, f.nwss));
            }
        }
    }
    let (from, to, _) = best.ok_or_else(|| FitError::SingularMatrix {
        context: "best_llsq_weighted: no subrange could be fitted".to_string(),
    })?;

    // Refit the winner at higher resolution, now with variances.
    let fit = llsq_weighted(
        &x[from..=to],
        &y[from..=to],
        &wx[from..=to],
        &wy[from..=to],
        1.0e-15,
        true,
    )?;
    Ok(BestLineFit {
        fit,
        start: from,
        count: to - from + 1,
    })
}

/// Result of [`llsq_perpendicular`].
#[derive(Debug, Clone, Copy)]
pub struct PerpendicularFit {
    /// Estimated slope.
    pub slope: f64,
    /// Estimated intercept.
    pub intercept: f64,
    /// Mean of squared perpendicular distances to the fitted line.
    pub ssd: f64,
}

/// Non-iterative line fit minimizing perpendicular distances.
///
/// The slope is a root of a quadratic in the centered second moments; of the
/// two roots the one with the smaller sum of squared distances wins. Based
/// on Varga & Szabo (J Cereb Blood Flow Metab 2002;22:240-244).
pub fn llsq_perpendicular(x: &[f64], y: &[f64]) -> FitResult<PerpendicularFit> {
    let nr = x.len();
    if nr < 2 || y.len() != nr {
        return Err(FitError::InvalidInput {
            context: "llsq_perpendicular: need at least 2 points".to_string(),
        });
    }
    let mx = x.iter().sum::<f64>() / nr as f64;
    let my = y.iter().sum::<f64>() / nr as f64;
    let (mut qxx, mut qyy, mut qxy) = (0.0, 0.0, 0.0);
    for i in 0..nr {
        let a = x[i] - mx;
        let b = y[i] - my;
        qxx += a * a;
        qyy += b * b;
        qxy += a * b;
    }
    if qxx < 1.0e-100 || qyy < 1.0e-100 {
        return Err(FitError::SingularMatrix {
            context: "llsq_perpendicular: data has no spread on one axis".to_string(),
        });
    }
    let (m1, m2) = quadratic_roots(qxy, qxx - qyy, -qxy).ok_or_else(|| {
        FitError::SingularMatrix {
            context: "llsq_perpendicular: slope quadratic has no real roots".to_string(),
        }
    })?;

    let ssd_for = |m: f64| {
        let c = my - m * mx;
        let h = m.hypot(-1.0);
        x.iter()
            .zip(y)
            .map(|(&xi, &yi)| {
                let d = (m * xi - yi + c) / h;
                d * d
            })
            .sum::<f64>()
    };
    let ssd1 = ssd_for(m1);
    let ssd2 = if m2 != m1 { ssd_for(m2) } else { ssd1 };
    let (slope, ssd) = if ssd2 < ssd1 { (m2, ssd2) } else { (m1, ssd1) };
    Ok(PerpendicularFit {
        slope,
        intercept: my - slope * mx,
        ssd: ssd / nr as f64,
    })
}

/// [`llsq_perpendicular`] over data that may contain NaNs; any pair with a
/// NaN in either coordinate is dropped before the fit.
pub fn llsq_perpendicular_filtered(x: &[f64], y: &[f64]) -> FitResult<PerpendicularFit> {
    let mut nx = Vec::with_capacity(x.len());
    let mut ny = Vec::with_capacity(y.len());
    for (&xi, &yi) in x.iter().zip(y) {
        if !xi.is_nan() && !yi.is_nan() {
            nx.push(xi);
            ny.push(yi);
        }
    }
    llsq_perpendicular(&nx, &ny)
}

/// Real roots of `a x^2 + b x + c = 0`, smaller first; `None` when there are
/// none. A linear equation or double root returns both slots equal. Uses the
/// sign-matched form of the quadratic formula to avoid cancellation.
pub fn quadratic_roots(a: f64, b: f64, c: f64) -> Option<(f64, f64)> {
    if a == 0.0 {
        if b == 0.0 {
            return None;
        }
        let r = -c / b;
        return Some((r, r));
    }
    let discriminant = b * b - 4.0 * a * c;
    if discriminant > 0.0 {
        if b == 0.0 {
            let r = (0.5 * discriminant.sqrt() / a).abs();
            Some((-r, r))
        } else {
            let sgnb = if b > 0.0 { 1.0 } else { -1.0 };
            let temp = -0.5 * (b + sgnb * discriminant.sqrt());
            let r1 = temp / a;
            let r2 = c / temp;
            Some(if r1 < r2 { (r1, r2) } else { (r2, r1) })
        }
    } else if discriminant == 0.0 {
        let r = -0.5 * b / a;
        Some((r, r))
    } else {
        None
    }
}

/// Distribution-free slope and intercept by repeated medians over all point
/// pairs (Siegel, Biometrika 1982;69:242-244). Insensitive to outliers and
/// needs no weights; NaN pairs and vertical pairs are skipped. Returns
/// `(slope, intercept)`.
pub fn median_line(x: &[f64], y: &[f64]) -> FitResult<(f64, f64)> {
    let nr = x.len();
    if nr < 2 || y.len() != nr {
        return Err(FitError::InvalidInput {
            context: "median_line: need at least 2 points".to_string(),
        });
    }
    let mut slopes = Vec::with_capacity(nr * (nr - 1) / 2);
    let mut intercepts = Vec::with_capacity(nr * (nr - 1) / 2);
    for i in 0..nr - 1 {
        for j in i + 1..nr {
            if x[i].is_nan() || x[j].is_nan() || y[i].is_nan() || y[j].is_nan() {
                continue;
            }
            let d = x[j] - x[i];
            if d == 0.0 {
                continue;
            }
            let s = (y[j] - y[i]) / d;
            slopes.push(s);
            intercepts.push(y[i] - s * x[i]);
        }
    }
    if slopes.len() < 2 {
        return Err(FitError::InvalidInput {
            context: "median_line: fewer than two usable point pairs".to_string(),
        });
    }
    slopes.sort_by(f64::total_cmp);
    intercepts.sort_by(f64::total_cmp);
    let k = slopes.len();
    let med = |v: &[f64]| {
        if k % 2 == 1 {
            v[k / 2]
        } else {
            0.5 * (v[k / 2] + v[k / 2 - 1])
        }
    };
    Ok((med(&slopes), med(&intercepts)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_llsq_weighted_exact_line() {
        // Noise-free y = 2x + 1 with uniform weights.
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y: Vec<f64> = x.iter().map(|&xi| 2.0 * xi + 1.0).collect();
        let w = [1.0; 5];
        let fit = llsq_weighted(&x, &y, &w, &w, 1e-12, false).expect("fit failed");
        assert_relative_eq!(fit.slope, 2.0, epsilon = 1e-10);
        assert_relative_eq!(fit.intercept, 1.0, epsilon = 1e-10);
        assert!(fit.nwss < 1e-10);
    }

    #[test]
    fn test_llsq_weighted_two_points() {
        let fit = llsq_weighted(&[1.0, 3.0], &[2.0, 8.0], &[1.0, 1.0], &[1.0, 1.0], 1e-10, false)
            .expect("fit failed");
        assert_relative_eq!(fit.slope, 3.0);
        assert_relative_eq!(fit.intercept, -1.0);
    }

    #[test]
    fn test_llsq_weighted_constant_x() {
        // Vertical data cannot define a slope; the zero fit comes back.
        let fit = llsq_weighted(
            &[2.0, 2.0, 2.0],
            &[1.0, 2.0, 3.0],
            &[1.0, 1.0, 1.0],
            &[1.0, 1.0, 1.0],
            1e-10,
            false,
        )
        .expect("fit failed");
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.intercept, 0.0);
    }

    #[test]
    fn test_llsq_weighted_zero_weight_excludes_point() {
        // A wild outlier with zero weight must not affect the fit.
        let x = [0.0, 1.0, 2.0, 3.0, 10.0];
        let mut y: Vec<f64> = x.iter().map(|&xi| 0.5 * xi + 2.0).collect();
        y[4] = 1000.0;
        let wx = [1.0, 1.0, 1.0, 1.0, 0.0];
        let wy = [1.0, 1.0, 1.0, 1.0, 1.0];
        let fit = llsq_weighted(&x, &y, &wx, &wy, 1e-12, false).expect("fit failed");
        assert_relative_eq!(fit.slope, 0.5, epsilon = 1e-8);
        assert_relative_eq!(fit.intercept, 2.0, epsilon = 1e-8);
        assert_eq!(fit.weights[4], 0.0);
    }

    #[test]
    fn test_llsq_weighted_variances() {
        // Slightly noisy line; sigmas must come out positive and small, and
        // fitted points must lie on the returned line.
        let x = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [1.02, 2.98, 5.01, 6.97, 9.03, 10.99];
        let w = [1.0; 6];
        let fit = llsq_weighted(&x, &y, &w, &w, 1e-12, true).expect("fit failed");
        assert_relative_eq!(fit.slope, 2.0, epsilon = 0.05);
        let ssd = fit.slope_sd.expect("no slope sd");
        assert!(ssd > 0.0 && ssd < 0.1);
        let cx = fit.fitted_x.expect("no fitted x");
        let cy = fit.fitted_y.expect("no fitted y");
        for (xi, yi) in cx.iter().zip(&cy) {
            assert_relative_eq!(*yi, fit.slope * xi + fit.intercept, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_best_llsq_weighted_finds_linear_tail() {
        // Curved start, linear tail: trimming from the start should keep a
        // range whose fit has the tail's slope.
        let x: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&xi| if xi < 4.0 { xi * xi * 0.2 } else { 3.0 * xi - 8.8 })
            .collect();
        let w = vec![1.0; 12];
        let best = best_llsq_weighted(&x, &y, &w, &w, 4, TrimFrom::Start).expect("search failed");
        assert!(best.start >= 3);
        assert_relative_eq!(best.fit.slope, 3.0, epsilon = 0.05);
    }

    #[test]
    fn test_llsq_perpendicular_symmetry() {
        // Perpendicular regression of y = x data must give slope 1 exactly
        // regardless of which axis carries the noise.
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y = [0.1, 0.9, 2.1, 2.9, 4.1];
        let fit = llsq_perpendicular(&x, &y).expect("fit failed");
        assert_relative_eq!(fit.slope, 1.0, epsilon = 0.05);
        assert!(fit.ssd > 0.0);
    }

    #[test]
    fn test_llsq_perpendicular_no_spread() {
        assert!(matches!(
            llsq_perpendicular(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]),
            Err(FitError::SingularMatrix { .. })
        ));
    }

    #[test]
    fn test_llsq_perpendicular_filtered_skips_nan() {
        let x = [0.0, 1.0, f64::NAN, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 5.0, 7.0];
        let fit = llsq_perpendicular_filtered(&x, &y).expect("fit failed");
        assert_relative_eq!(fit.slope, 2.0, epsilon = 1e-8);
        assert_relative_eq!(fit.intercept, 1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_quadratic_roots() {
        // (x-2)(x+3) = x^2 + x - 6
        let (r1, r2) = quadratic_roots(1.0, 1.0, -6.0).expect("no roots");
        assert_relative_eq!(r1, -3.0);
        assert_relative_eq!(r2, 2.0);
        // Double root.
        let (r1, r2) = quadratic_roots(1.0, -2.0, 1.0).expect("no roots");
        assert_eq!(r1, r2);
        assert_relative_eq!(r1, 1.0);
        // Linear form.
        let (r1, r2) = quadratic_roots(0.0, 2.0, -4.0).expect("no root");
        assert_eq!(r1, r2);
        assert_relative_eq!(r1, 2.0);
        // No real roots, and the degenerate constant equation.
        assert!(quadratic_roots(1.0, 0.0, 1.0).is_none());
        assert!(quadratic_roots(0.0, 0.0, 1.0).is_none());
    }

    #[test]
    fn test_median_line_ignores_outliers() {
        // One gross outlier must not move the repeated-median estimate.
        let x = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut y: Vec<f64> = x.iter().map(|&xi| 1.5 * xi + 0.5).collect();
        y[3] = 100.0;
        let (slope, ic) = median_line(&x, &y).expect("fit failed");
        assert_relative_eq!(slope, 1.5, epsilon = 1e-10);
        assert_relative_eq!(ic, 0.5, epsilon = 1e-10);
    }

    #[test]
    fn test_median_line_vertical_pairs_skipped() {
        let x = [1.0, 1.0, 2.0, 3.0];
        let y = [0.0, 5.0, 2.0, 4.0];
        assert!(median_line(&x, &y).is_ok());
    }
}
