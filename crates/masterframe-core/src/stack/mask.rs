use crate::consts::SATURATED_FRACTION_LIMIT;
use crate::frame::Frame;

/// Fraction of pixels strictly above `threshold`.
pub fn saturated_fraction(frame: &Frame, threshold: f32) -> f64 {
    let total = frame.data.len();
    if total == 0 {
        return 0.0;
    }
    let saturated = frame.data.iter().filter(|&&v| v > threshold).count();
    saturated as f64 / total as f64
}

/// Replace the whole frame with NaN when more than 10% of its pixels are
/// above `threshold`. Returns true when the frame was masked.
pub fn mask_saturated(frame: &mut Frame, threshold: f32) -> bool {
    if saturated_fraction(frame, threshold) > SATURATED_FRACTION_LIMIT {
        frame.data.fill(f32::NAN);
        true
    } else {
        false
    }
}
