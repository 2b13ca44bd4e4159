//! Numeric helpers shared by the transition model.

/// Gaussian window `exp(-((b - a) / std)^2 / 2)`.
///
/// Symmetric in `a` and `b`, in (0, 1], and exactly 1 when `a == b`.
pub fn gaussian_window(a: f64, b: f64, std: f64) -> f64 {
    let fraction = (b - a) / std;
    (-(fraction * fraction) / 2.0).exp()
}

/// Index of the first occurrence of the maximum value.
///
/// Returns `None` for an empty slice, or when no value beats negative
/// infinity (NaN never does).
pub fn arg_max_first(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, &value) in values.iter().enumerate() {
        let current = best.map_or(f64::NEG_INFINITY, |(_, max)| max);
        if value > current {
            best = Some((index, value));
        }
    }
    best.map(|(index, _)| index)
}
