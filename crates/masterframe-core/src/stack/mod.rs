pub mod mask;
pub mod mean;
pub mod median;

use ndarray::{Array2, ArrayViewMut1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{MasterError, Result};
use crate::frame::{Frame, MasterPlanes};

/// Per-pixel statistic used for the value plane of a master.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistic {
    #[default]
    Median,
    Mean,
}

impl std::fmt::Display for Statistic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Median => write!(f, "Median"),
            Self::Mean => write!(f, "Mean"),
        }
    }
}

/// Combine equally shaped frames into a value plane and an uncertainty plane,
/// ignoring NaN samples.
pub fn combine_planes(frames: &[Frame], statistic: Statistic) -> Result<MasterPlanes> {
    let value = match statistic {
        Statistic::Median => median::nan_median_stack(frames)?,
        Statistic::Mean => mean::nan_mean_stack(frames)?,
    };
    let sigma = mean::nan_std_stack(frames)?;
    Ok(MasterPlanes { value, sigma })
}

/// Reduce the finite samples of every pixel position with `reduce`.
///
/// Parallelizes at the row level for images >= 256x256.
pub(crate) fn reduce_finite<F>(frames: &[Frame], reduce: F) -> Result<Array2<f32>>
where
    F: Fn(&mut [f32]) -> f32 + Sync,
{
    if frames.is_empty() {
        return Err(MasterError::EmptySequence);
    }

    let (h, w) = frames[0].dim();
    if let Some(odd) = frames.iter().find(|f| f.dim() != (h, w)) {
        return Err(MasterError::ShapeMismatch {
            expected: (h, w),
            actual: odd.dim(),
        });
    }
    let n = frames.len();

    let fill_row = |row: usize, mut out: ArrayViewMut1<f32>, samples: &mut Vec<f32>| {
        for col in 0..w {
            samples.clear();
            samples.extend(
                frames
                    .iter()
                    .map(|f| f.data[[row, col]])
                    .filter(|v| !v.is_nan()),
            );
            out[col] = if samples.is_empty() {
                f32::NAN
            } else {
                reduce(samples)
            };
        }
    };

    let mut result = Array2::<f32>::zeros((h, w));
    if h * w >= PARALLEL_PIXEL_THRESHOLD && n > 1 {
        result
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, out)| {
                let mut samples = Vec::with_capacity(n);
                fill_row(row, out, &mut samples);
            });
    } else {
        let mut samples = Vec::with_capacity(n);
        for (row, out) in result.axis_iter_mut(Axis(0)).enumerate() {
            fill_row(row, out, &mut samples);
        }
    }
    Ok(result)
}
