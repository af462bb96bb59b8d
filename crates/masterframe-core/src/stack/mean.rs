use ndarray::Array2;

use crate::error::Result;
use crate::frame::Frame;

use super::reduce_finite;

/// Per-pixel mean of the finite samples across frames.
pub fn nan_mean_stack(frames: &[Frame]) -> Result<Array2<f32>> {
    reduce_finite(frames, |samples| mean(samples) as f32)
}

/// Per-pixel population standard deviation (ddof = 0) of the finite samples.
pub fn nan_std_stack(frames: &[Frame]) -> Result<Array2<f32>> {
    reduce_finite(frames, |samples| {
        let m = mean(samples);
        let var = samples
            .iter()
            .map(|&v| {
                let d = v as f64 - m;
                d * d
            })
            .sum::<f64>()
            / samples.len() as f64;
        var.sqrt() as f32
    })
}

/// Sum of the finite values of a plane (0 when there are none).
pub fn nan_sum(values: impl Iterator<Item = f32>) -> f64 {
    values.filter(|v| !v.is_nan()).map(|v| v as f64).sum()
}

fn mean(samples: &[f32]) -> f64 {
    samples.iter().map(|&v| v as f64).sum::<f64>() / samples.len() as f64
}
