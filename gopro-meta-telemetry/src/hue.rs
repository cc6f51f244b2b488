//! Hue histogram blending.
//!
//! The camera reports dominant hues per frame as `(hue, weight)` pairs in a
//! 0-255 encoding. Blending maps each hue to a fully saturated color
//! (HSL with S = 1, L = 0.5) and averages the colors by weight.
//!
//! This is the only place raw hue and weight codes are converted into
//! degrees and proportions. Stored samples keep the raw encoding.

use derive_more::{Display, Error};
use rgb::RGB8;

/// Raw encoding maximum for hue and weight codes.
const RAW_MAX: f64 = 255.0;

/// Degrees in a full hue circle.
const HUE_CIRCLE: f64 = 360.0;

/// Width of one HSL sector in degrees.
const SECTOR_DEGREES: f64 = 60.0;

const SATURATION: f64 = 1.0;
const LIGHTNESS: f64 = 0.5;

/// Errors from [`blend_hues`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum BlendError {
    /// Hue and weight slices have different lengths.
    #[display("hue/weight length mismatch: {hues} hues, {weights} weights")]
    LengthMismatch { hues: usize, weights: usize },
    /// The weights sum to zero (or there are none), so they cannot be normalized.
    #[display("invalid weights: total weight is zero")]
    InvalidWeights,
}

/// Convert a raw 0-255 hue code to degrees in `[0, 360)`.
#[inline]
#[must_use]
pub fn raw_hue_to_degrees(raw: u8) -> f64 {
    f64::from(raw) * HUE_CIRCLE / RAW_MAX
}

/// Convert a hue in degrees to RGB channels in `[0.0, 1.0]`.
///
/// Saturation and lightness are fixed at 1 and 0.5, giving the purest color
/// for each hue. Hues outside `[0, 360)` wrap around.
#[must_use]
pub fn hue_to_rgb(degrees: f64) -> [f64; 3] {
    let h = degrees.rem_euclid(HUE_CIRCLE);

    let chroma = (1.0 - (2.0 * LIGHTNESS - 1.0).abs()) * SATURATION;
    let secondary = chroma * (1.0 - ((h / SECTOR_DEGREES) % 2.0 - 1.0).abs());
    let offset = LIGHTNESS - chroma / 2.0;

    let (r, g, b) = if h < 60.0 {
        (chroma, secondary, 0.0)
    } else if h < 120.0 {
        (secondary, chroma, 0.0)
    } else if h < 180.0 {
        (0.0, chroma, secondary)
    } else if h < 240.0 {
        (0.0, secondary, chroma)
    } else if h < 300.0 {
        (secondary, 0.0, chroma)
    } else {
        (chroma, 0.0, secondary)
    };

    [r + offset, g + offset, b + offset]
}

/// Blend a hue histogram into a single color.
///
/// `raw_hues` and `raw_weights` are parallel slices in the camera's 0-255
/// encoding. Weights are normalized to proportions, each hue is converted
/// to a vivid RGB color and the colors are averaged by weight.
///
/// # Errors
///
/// Returns [`BlendError::LengthMismatch`] if the slices differ in length and
/// [`BlendError::InvalidWeights`] if the weights sum to zero, which includes
/// empty input.
pub fn blend_hues(raw_hues: &[u8], raw_weights: &[u8]) -> Result<RGB8, BlendError> {
    if raw_hues.len() != raw_weights.len() {
        return Err(BlendError::LengthMismatch {
            hues: raw_hues.len(),
            weights: raw_weights.len(),
        });
    }

    let total: u32 = raw_weights.iter().map(|&w| u32::from(w)).sum();
    if total == 0 {
        return Err(BlendError::InvalidWeights);
    }
    let total = f64::from(total);

    let mut blended = [0.0f64; 3];
    for (&hue, &weight) in raw_hues.iter().zip(raw_weights) {
        let proportion = f64::from(weight) / total;
        let rgb = hue_to_rgb(raw_hue_to_degrees(hue));
        for (acc, channel) in blended.iter_mut().zip(rgb) {
            *acc += channel * proportion;
        }
    }

    Ok(RGB8::new(
        quantize(blended[0]),
        quantize(blended[1]),
        quantize(blended[2]),
    ))
}

/// Scale a `[0.0, 1.0]` channel to `u8`, rounding half away from zero.
#[inline]
fn quantize(channel: f64) -> u8 {
    // Proportions sum to 1, so the value is already in [0, 255]; the clamp
    // only absorbs floating-point drift.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let value = (channel * RAW_MAX).round().clamp(0.0, RAW_MAX) as u8;
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_rgb_close(actual: [f64; 3], expected: [f64; 3]) {
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "expected {expected:?}, got {actual:?}");
        }
    }

    #[test]
    fn test_primary_hues() {
        assert_rgb_close(hue_to_rgb(0.0), [1.0, 0.0, 0.0]);
        assert_rgb_close(hue_to_rgb(120.0), [0.0, 1.0, 0.0]);
        assert_rgb_close(hue_to_rgb(240.0), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_secondary_hues() {
        assert_rgb_close(hue_to_rgb(60.0), [1.0, 1.0, 0.0]);
        assert_rgb_close(hue_to_rgb(180.0), [0.0, 1.0, 1.0]);
        assert_rgb_close(hue_to_rgb(300.0), [1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_hue_wraps_around() {
        assert_rgb_close(hue_to_rgb(360.0), hue_to_rgb(0.0));
        assert_rgb_close(hue_to_rgb(-120.0), hue_to_rgb(240.0));
        assert_rgb_close(hue_to_rgb(480.0), hue_to_rgb(120.0));
    }

    #[test]
    fn test_mid_sector_hue() {
        // 30° is halfway between red and yellow
        assert_rgb_close(hue_to_rgb(30.0), [1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_raw_hue_conversion() {
        assert!((raw_hue_to_degrees(0) - 0.0).abs() < f64::EPSILON);
        assert!((raw_hue_to_degrees(170) - 240.0).abs() < 1e-9);
        assert!((raw_hue_to_degrees(85) - 120.0).abs() < 1e-9);
        assert!(raw_hue_to_degrees(255) <= HUE_CIRCLE);
    }

    #[test]
    fn test_blend_single_red() {
        assert_eq!(blend_hues(&[0], &[255]), Ok(RGB8::new(255, 0, 0)));
    }

    #[test]
    fn test_blend_weight_scale_irrelevant() {
        // Only proportions matter
        assert_eq!(blend_hues(&[85], &[1]), Ok(RGB8::new(0, 255, 0)));
        assert_eq!(blend_hues(&[85], &[200]), Ok(RGB8::new(0, 255, 0)));
    }

    #[test]
    fn test_blend_red_and_blue() {
        // 0° and 240° at equal weight: half red, half blue
        assert_eq!(blend_hues(&[0, 170], &[128, 128]), Ok(RGB8::new(128, 0, 128)));
    }

    #[test]
    fn test_blend_uneven_weights() {
        // Three parts red to one part green
        assert_eq!(blend_hues(&[0, 85], &[90, 30]), Ok(RGB8::new(191, 64, 0)));
    }

    #[test]
    fn test_blend_zero_weight_entries_ignored() {
        assert_eq!(blend_hues(&[0, 170], &[10, 0]), Ok(RGB8::new(255, 0, 0)));
    }

    #[test]
    fn test_blend_empty_is_invalid() {
        assert_eq!(blend_hues(&[], &[]), Err(BlendError::InvalidWeights));
    }

    #[test]
    fn test_blend_zero_weights_is_invalid() {
        assert_eq!(blend_hues(&[1], &[0]), Err(BlendError::InvalidWeights));
        assert_eq!(blend_hues(&[1, 2, 3], &[0, 0, 0]), Err(BlendError::InvalidWeights));
    }

    #[test]
    fn test_blend_length_mismatch() {
        assert_eq!(
            blend_hues(&[0, 10], &[255]),
            Err(BlendError::LengthMismatch {
                hues: 2,
                weights: 1
            })
        );
    }

    #[test]
    fn test_blend_is_deterministic() {
        let hues = [12, 90, 200, 250];
        let weights = [40, 3, 255, 17];
        assert_eq!(blend_hues(&hues, &weights), blend_hues(&hues, &weights));
    }

    #[test]
    fn test_blend_full_weight_no_overflow() {
        // Many maximal weights must not overflow the accumulator
        let hues = [0u8; 300];
        let weights = [255u8; 300];
        assert_eq!(blend_hues(&hues, &weights), Ok(RGB8::new(255, 0, 0)));
    }

    #[test]
    fn test_error_display() {
        let err = BlendError::LengthMismatch {
            hues: 3,
            weights: 1,
        };
        assert_eq!(err.to_string(), "hue/weight length mismatch: 3 hues, 1 weights");
        assert_eq!(
            BlendError::InvalidWeights.to_string(),
            "invalid weights: total weight is zero"
        );
    }
}
