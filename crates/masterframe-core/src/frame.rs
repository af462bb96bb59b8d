use ndarray::Array2;

use crate::io::fits::FitsHeader;

/// A single calibration image.
/// Pixel values are f32 detector counts; NaN marks undefined pixels.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<f32>,
    /// Header cards the frame was read with. Empty for computed frames.
    pub header: FitsHeader,
}

impl Frame {
    pub fn new(data: Array2<f32>) -> Self {
        Self::with_header(data, FitsHeader::new())
    }

    pub fn with_header(data: Array2<f32>, header: FitsHeader) -> Self {
        Self { data, header }
    }

    /// Observation date (`DATE-OBS`) of the frame, if recorded.
    pub fn date_obs(&self) -> Option<&str> {
        self.header.get_str("DATE-OBS")
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// True when at least one pixel holds a finite value.
    pub fn has_finite(&self) -> bool {
        self.data.iter().any(|v| v.is_finite())
    }
}

/// Combined master image: value plane plus per-pixel uncertainty.
#[derive(Clone, Debug)]
pub struct MasterPlanes {
    pub value: Array2<f32>,
    pub sigma: Array2<f32>,
}

/// Descriptive metadata shared by both planes of a master artifact.
#[derive(Clone, Debug, Default)]
pub struct MasterMetadata {
    pub chip: u8,
    pub exposure_time: f64,
    /// Reference julian date (mean of the constituent timestamps).
    pub jd: f64,
    pub source_count: usize,
    pub band: Option<String>,
    pub field: Option<String>,
    pub dark_time_diff: Option<f64>,
    /// Cards of the representative raw frame, carried into the artifact.
    pub source_header: FitsHeader,
}
