//! # Curve smoothing and fitting

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use util::maths::poly_val;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Smooth `y` with a Savitzky-Golay filter.
///
/// A polynomial of `order` is least squares fitted to each `window` samples
/// centred on the output sample. The first and last half windows are taken
/// from the fit to the first and last full window. `window` must be odd. If
/// the signal is shorter than the window the largest odd window that fits is
/// used, and if that is no longer than `order` the signal is returned as is.
///
/// Returns `None` if the fit is singular.
pub fn savgol_filter(y: &[f64], window: usize, order: usize) -> Option<Vec<f64>> {
    let mut window = window.min(y.len());
    if window % 2 == 0 {
        window = window.saturating_sub(1);
    }
    if window <= order {
        return Some(y.to_vec())
    }

    let half = (window / 2) as isize;

    // Least squares projection for a window centred on t = 0, with t scaled
    // into [-1, 1] to keep the normal equations well conditioned
    let scale = (half as f64).max(1.0);
    let a = DMatrix::from_fn(window, order + 1, |r, c| {
        ((r as isize - half) as f64 / scale).powi(c as i32)
    });
    let at = a.transpose();
    let proj = (&at * &a).try_inverse()? * at;

    // Evaluate the polynomial fitted to `samples` at offset `t`
    let eval = |samples: &[f64], t: f64| -> f64 {
        let coeffs = &proj * DVector::from_column_slice(samples);
        coeffs.iter()
            .enumerate()
            .map(|(k, c)| c * (t / scale).powi(k as i32))
            .sum()
    };

    let n = y.len();
    let h = half as usize;
    let mut out = vec![0.0; n];

    // Interior, which is a convolution with the first row of the projection
    for i in h..(n - h) {
        out[i] = proj.row(0)
            .iter()
            .zip(y[(i - h)..=(i + h)].iter())
            .map(|(c, v)| c * v)
            .sum();
    }

    // Edges
    let first = &y[..window];
    let last = &y[(n - window)..];
    for i in 0..h {
        out[i] = eval(first, i as f64 - half as f64);
        out[n - h + i] = eval(last, (i + 1) as f64);
    }

    Some(out)
}

/// Least squares fit of `x = a*y^2 + b*y + c`, returning `[a, b, c]`.
///
/// Returns `None` if there are too few distinct `y` values for a unique fit.
pub fn polyfit_2(x: &[f64], y: &[f64]) -> Option<[f64; 3]> {
    if x.len() != y.len() || x.len() < 3 {
        return None
    }

    let mut m = Matrix3::<f64>::zeros();
    let mut r = Vector3::<f64>::zeros();

    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let p = [yi * yi, yi, 1.0];
        for row in 0..3 {
            for col in 0..3 {
                m[(row, col)] += p[row] * p[col];
            }
            r[row] += p[row] * xi;
        }
    }

    let sol = m.lu().solve(&r)?;

    if sol.iter().any(|v| !v.is_finite()) {
        return None
    }

    Some([sol[0], sol[1], sol[2]])
}

/// Radius of curvature of `x = a*y^2 + b*y + c` at `y`.
///
/// Straight lines have an infinite radius.
pub fn radius_of_curvature(coeffs: &[f64; 3], y: f64) -> f64 {
    let [a, b, _] = *coeffs;

    if a.abs() < f64::EPSILON {
        return f64::INFINITY
    }

    // Slope from the derivative of the fit
    let slope = poly_val(y, &[2.0 * a, b]);

    (1.0 + slope.powi(2)).powf(1.5) / (2.0 * a).abs()
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_savgol_preserves_cubic() {
        // A cubic passes through a cubic filter unchanged, edges included
        let y: Vec<f64> = (0..120)
            .map(|i| {
                let t = i as f64 / 10.0;
                0.1 * t.powi(3) - t.powi(2) + 2.0 * t + 5.0
            })
            .collect();

        let s = savgol_filter(&y, 51, 3).unwrap();

        assert_eq!(s.len(), y.len());
        for (a, b) in s.iter().zip(y.iter()) {
            assert!((a - b).abs() < 1e-6, "{} != {}", a, b);
        }
    }

    #[test]
    fn test_savgol_smooths() {
        // Alternating noise on a constant is removed in the interior
        let y: Vec<f64> = (0..101)
            .map(|i| 10.0 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();

        let s = savgol_filter(&y, 51, 3).unwrap();

        assert!((s[50] - 10.0).abs() < 0.1);
    }

    #[test]
    fn test_savgol_short() {
        let y = vec![1.0, 2.0, 3.0];
        assert_eq!(savgol_filter(&y, 51, 3).unwrap(), y);
    }

    #[test]
    fn test_polyfit() {
        let y: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let x: Vec<f64> = y.iter().map(|y| 0.5 * y * y - 2.0 * y + 3.0).collect();

        let c = polyfit_2(&x, &y).unwrap();
        assert!((c[0] - 0.5).abs() < 1e-6);
        assert!((c[1] + 2.0).abs() < 1e-6);
        assert!((c[2] - 3.0).abs() < 1e-6);

        // Not enough distinct rows
        assert!(polyfit_2(&[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0]).is_none());
    }

    #[test]
    fn test_radius() {
        // Vertex of x = y^2 / 20 has radius 10
        assert!((radius_of_curvature(&[0.05, 0.0, 0.0], 0.0) - 10.0).abs() < 1e-9);
        assert!(radius_of_curvature(&[0.0, 1.0, 0.0], 3.0).is_infinite());
        assert!(radius_of_curvature(&[-0.05, 0.0, 0.0], 0.0) > 0.0);
    }
}
