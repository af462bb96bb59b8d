use ndarray::Array2;

use crate::error::Result;
use crate::frame::Frame;

use super::reduce_finite;

/// Per-pixel median of the finite samples across frames.
///
/// Uses `select_nth_unstable` for O(n) median without full sort.
/// Pixels with no finite sample are NaN.
pub fn nan_median_stack(frames: &[Frame]) -> Result<Array2<f32>> {
    reduce_finite(frames, |samples| compute_median(samples) as f32)
}

/// Median of the finite values of a plane, or `None` when there are none.
pub fn nan_median(values: impl Iterator<Item = f32>) -> Option<f64> {
    let mut finite: Vec<f32> = values.filter(|v| !v.is_nan()).collect();
    if finite.is_empty() {
        None
    } else {
        Some(compute_median(&mut finite))
    }
}

pub(crate) fn compute_median(pixel_values: &mut [f32]) -> f64 {
    let n = pixel_values.len();
    if n == 1 {
        pixel_values[0] as f64
    } else if n % 2 == 1 {
        let mid = n / 2;
        *pixel_values
            .select_nth_unstable_by(mid, |a, b| a.total_cmp(b))
            .1 as f64
    } else {
        let mid = n / 2;
        pixel_values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        pixel_values[..mid].select_nth_unstable_by(mid - 1, |a, b| a.total_cmp(b));
        (pixel_values[mid - 1] as f64 + pixel_values[mid] as f64) / 2.0
    }
}
