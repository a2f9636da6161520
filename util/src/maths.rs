//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Apply polynomial coefficients to a value.
///
/// Coefficients are highest power first, i.e. `[a, b, c]` is `a*x^2 + b*x + c`.
pub fn poly_val<T>(value: T, coeffs: &[T]) -> T
where
    T: Float + std::ops::AddAssign
{
    let mut res = T::zero();

    for c in coeffs.iter() {
        res = res * value + *c;
    }

    res
}

/// Return `num` evenly spaced samples over `[start, stop]`, both ends included.
pub fn linspace<T>(start: T, stop: T, num: usize) -> Vec<T>
where
    T: Float
{
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / T::from(num - 1).unwrap_or_else(T::one);
            (0..num)
                .map(|i| start + step * T::from(i).unwrap_or_else(T::zero))
                .collect()
        }
    }
}

/// One dimensional piecewise linear interpolation.
///
/// `xp` must be increasing. Values of `x` outside of `xp` are clamped to the
/// first or last value of `fp`. If `xp` is empty `None` is returned.
pub fn interp<T>(x: T, xp: &[T], fp: &[T]) -> Option<T>
where
    T: Float
{
    if xp.is_empty() || xp.len() != fp.len() {
        return None;
    }

    if x <= xp[0] {
        return Some(fp[0]);
    }
    if x >= xp[xp.len() - 1] {
        return Some(fp[fp.len() - 1]);
    }

    // Find the first sample above x, the segment is then [i - 1, i]
    let i = xp.iter().position(|v| *v > x)?;
    let (x0, x1) = (xp[i - 1], xp[i]);
    let (f0, f1) = (fp[i - 1], fp[i]);

    if x1 == x0 {
        return Some(f1);
    }

    Some(f0 + (x - x0) * (f1 - f0) / (x1 - x0))
}
