/// Number of chips in the camera mosaic. Chips are numbered 1..=CHIP_COUNT.
pub const CHIP_COUNT: u8 = 10;

/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Time difference recorded when no master dark qualified for a flat.
pub const NO_DARK_TIME_DIFF: f64 = -999.0;

/// Default saturation level (counts) for raw flats.
pub const DEFAULT_SATURATION_THRESHOLD: f32 = 40_000.0;

/// A frame with more than this fraction of saturated pixels is masked out.
pub const SATURATED_FRACTION_LIMIT: f64 = 0.1;

/// Default brightness floor (counts) below which a master flat is bad.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 15_000.0;

/// A master dark built from fewer frames than this is bad.
pub const MIN_DARK_FRAMES: usize = 3;

/// A dome master flat built from fewer frames than this is bad.
pub const MIN_DOME_FLAT_FRAMES: usize = 2;

/// Default dark selection tolerance, in days.
pub const DEFAULT_DARK_TOLERANCE: f64 = 1.0;

/// Field-name token identifying dome flats.
pub const DEFAULT_DOME_MARKER: &str = "flat_round";

/// Raw flats with a median below this are graded `lower`.
pub const RAW_FLAT_LOWER_LIMIT: f64 = 18_000.0;

/// Raw flats with a median above this are graded `over`.
pub const RAW_FLAT_OVER_LIMIT: f64 = 45_000.0;

/// Largest image (width * height) accepted from a FITS header.
pub const MAX_FRAME_PIXELS: usize = 1 << 28;
