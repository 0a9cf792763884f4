//! One-dimensional minimization along a direction in parameter space.
//!
//! Golden-section bracketing followed by Brent's parabolic interpolation,
//! after Numerical Recipes (Press et al.).

/// Restriction of an n-dimensional objective to the line
/// `origin + t * direction`. Counts every evaluation.
pub(crate) struct Projection<'a, F> {
    f: &'a F,
    origin: &'a [f64],
    direction: &'a [f64],
    point: Vec<f64>,
    pub nfev: usize,
}

impl<'a, F> Projection<'a, F>
where
    F: Fn(&[f64]) -> f64,
{
    pub fn new(f: &'a F, origin: &'a [f64], direction: &'a [f64]) -> Self {
        Self {
            f,
            origin,
            direction,
            point: vec![0.0; origin.len()],
            nfev: 0,
        }
    }

    pub fn eval(&mut self, t: f64) -> f64 {
        for (pi, (oi, di)) in self
            .point
            .iter_mut()
            .zip(self.origin.iter().zip(self.direction))
        {
            *pi = oi + t * di;
        }
        self.nfev += 1;
        (self.f)(&self.point)
    }
}

/// Expands an initial interval `[ax, bx]` downhill with golden-ratio steps
/// until three abscissas `ax < bx < cx` (or the reverse) satisfy
/// `fa >= fb <= fc`. Parabolic extrapolation is tried first, limited to
/// `GLIMIT` times the current step.
///
/// Returns `(ax, bx, cx, fa, fb, fc)`.
pub(crate) fn bracket_minimum<F>(
    proj: &mut Projection<F>,
    mut ax: f64,
    mut bx: f64,
) -> (f64, f64, f64, f64, f64, f64)
where
    F: Fn(&[f64]) -> f64,
{
    const GOLD: f64 = 1.618034;
    const GLIMIT: f64 = 100.0;
    const TINY: f64 = 1.0e-20;

    let mut fa = proj.eval(ax);
    let mut fb = proj.eval(bx);
    // Search downhill from a to b.
    if fb > fa {
        std::mem::swap(&mut ax, &mut bx);
        std::mem::swap(&mut fa, &mut fb);
    }
    let mut cx = bx + GOLD * (bx - ax);
    let mut fc = proj.eval(cx);
    while fb > fc {
        // Parabolic extrapolation from a, b, c; TINY guards the division.
        let r = (bx - ax) * (fb - fc);
        let q = (bx - cx) * (fb - fa);
        let mut u =
            bx - ((bx - cx) * q - (bx - ax) * r) / (2.0 * (q - r).abs().max(TINY).copysign(q - r));
        let ulim = bx + GLIMIT * (cx - bx);
        let mut fu;
        if (bx - u) * (u - cx) > 0.0 {
            // u lies between b and c.
            fu = proj.eval(u);
            if fu < fc {
                return (bx, u, cx, fb, fu, fc);
            } else if fu > fb {
                return (ax, bx, u, fa, fb, fu);
            }
            // Parabolic fit was no use; take the default golden step.
            u = cx + GOLD * (cx - bx);
            fu = proj.eval(u);
        } else if (cx - u) * (u - ulim) > 0.0 {
            // u lies between c and the step limit.
            fu = proj.eval(u);
            if fu < fc {
                let unext = cx + GOLD * (cx - bx);
                // The shifted-in slot gets a fresh evaluation at u.
                let funext = proj.eval(u);
                bx = cx;
                cx = u;
                u = unext;
                fb = fc;
                fc = fu;
                fu = funext;
            }
        } else if (u - ulim) * (ulim - cx) >= 0.0 {
            // Cap the parabolic step at its maximum allowed value.
            u = ulim;
            fu = proj.eval(u);
        } else {
            u = cx + GOLD * (cx - bx);
            fu = proj.eval(u);
        }
        ax = bx;
        bx = cx;
        cx = u;
        fa = fb;
        fb = fc;
        fc = fu;
    }
    (ax, bx, cx, fa, fb, fc)
}

/// Brent's method on a bracketed minimum: parabolic interpolation through
/// the three best points so far, falling back to golden-section steps when
/// the parabola misbehaves. `bx` must lie between `ax` and `cx` with a
/// function value no greater than either end.
///
/// Returns `(xmin, f(xmin), iterations)`.
pub(crate) fn brent<F>(
    proj: &mut Projection<F>,
    ax: f64,
    bx: f64,
    cx: f64,
    tol: f64,
    max_iter: usize,
) -> (f64, f64, usize)
where
    F: Fn(&[f64]) -> f64,
{
    const CGOLD: f64 = 0.3819660;
    const ZEPS: f64 = 1.0e-10;

    let (mut a, mut b) = if ax < cx { (ax, cx) } else { (cx, ax) };
    let mut x = bx;
    let mut w = bx;
    let mut v = bx;
    let mut fx = proj.eval(x);
    let mut fw = fx;
    let mut fv = fx;
    let mut d = 0.0_f64;
    let mut e = 0.0_f64;

    for iter in 0..max_iter {
        let xm = 0.5 * (a + b);
        let tol1 = tol * x.abs() + ZEPS;
        let tol2 = 2.0 * tol1;
        if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
            return (x, fx, iter);
        }
        if e.abs() > tol1 {
            // Trial parabolic fit through x, w, v.
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            let etemp = e;
            e = d;
            if p.abs() >= (0.5 * q * etemp).abs() || p <= q * (a - x) || p >= q * (b - x) {
                e = if x >= xm { a - x } else { b - x };
                d = CGOLD * e;
            } else {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = tol1.copysign(xm - x);
                }
            }
        } else {
            e = if x >= xm { a - x } else { b - x };
            d = CGOLD * e;
        }
        let u = if d.abs() >= tol1 {
            x + d
        } else {
            x + tol1.copysign(d)
        };
        let fu = proj.eval(u);
        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            w = x;
            x = u;
            fv = fw;
            fw = fx;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                w = u;
                fv = fw;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }
    (x, fx, max_iter)
}

/// Minimizes `f` along the direction `xi` from the point `p`. On return `p`
/// has moved to the line minimum and `xi` holds the displacement actually
/// taken. Returns `(f(p), line-search iterations, evaluations)`.
pub(crate) fn line_minimize<F>(
    f: &F,
    p: &mut [f64],
    xi: &mut [f64],
    max_iter: usize,
) -> (f64, usize, usize)
where
    F: Fn(&[f64]) -> f64,
{
    let (xmin, fret, iterations, nfev) = {
        let mut proj = Projection::new(f, &*p, &*xi);
        let (ax, bx, cx, _, _, _) = bracket_minimum(&mut proj, 0.0, 1.0);
        let (xmin, fret, iterations) = brent(&mut proj, ax, bx, cx, 2.0e-4, max_iter);
        (xmin, fret, iterations, proj.nfev)
    };
    for (pi, xii) in p.iter_mut().zip(xi.iter_mut()) {
        *xii *= xmin;
        *pi += *xii;
    }
    (fret, iterations, nfev)
}
