//! Per-stream telemetry sample types.
//!
//! All timestamps are device clock milliseconds. Field names match the JSON
//! documents produced by the extractor and consumed by the viewer.

use rgb::RGB8;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::hue::{blend_hues, raw_hue_to_degrees, BlendError};
use crate::locate::Timestamped;

/// Hue entries stored inline in `SmallVec` (the camera reports a handful per frame)
const MAX_INLINE_HUES: usize = 8;

/// GPS fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above the WGS84 ellipsoid
    pub altitude: f64,
    pub timestamp: i64,
}

/// Accelerometer reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerationSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: i64,
}

/// Face detection box.
///
/// Box coordinates are as reported by the camera. The store drops
/// detections with non-positive confidence or box values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceSample {
    pub confidence: f64,
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    #[serde(default)]
    pub smile: f64,
    #[serde(default)]
    pub blink: f64,
    pub timestamp: i64,
}

impl FaceSample {
    /// Returns `true` if the detection has a positive confidence and a box
    /// with strictly positive position and size.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.confidence > 0.0 && self.x > 0.0 && self.y > 0.0 && self.w > 0.0 && self.h > 0.0
    }
}

/// Average frame luminance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LuminanceSample {
    pub luminance: u8,
    pub timestamp: i64,
}

/// One bucket of a hue histogram, in the camera's raw 0-255 encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HueWeight {
    pub hue: u8,
    pub weight: u8,
}

impl HueWeight {
    /// Hue in degrees, `[0, 360]`.
    #[must_use]
    pub fn hue_degrees(&self) -> f64 {
        raw_hue_to_degrees(self.hue)
    }

    /// Weight as a percentage, `[0, 100]`.
    #[must_use]
    pub fn weight_percent(&self) -> f64 {
        f64::from(self.weight) * 100.0 / 255.0
    }
}

/// Dominant hues of a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HueSample {
    pub hues: SmallVec<[HueWeight; MAX_INLINE_HUES]>,
    pub timestamp: i64,
}

impl HueSample {
    /// Blend this frame's hues into a single color.
    ///
    /// # Errors
    ///
    /// Returns [`BlendError::InvalidWeights`] if the frame has no hues or
    /// all weights are zero.
    pub fn blend(&self) -> Result<RGB8, BlendError> {
        let hues: SmallVec<[u8; MAX_INLINE_HUES]> = self.hues.iter().map(|h| h.hue).collect();
        let weights: SmallVec<[u8; MAX_INLINE_HUES]> =
            self.hues.iter().map(|h| h.weight).collect();
        blend_hues(&hues, &weights)
    }
}

/// Blended display color of a hue sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSample {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub timestamp: i64,
}

impl ColorSample {
    #[must_use]
    pub fn new(color: RGB8, timestamp: i64) -> Self {
        Self {
            red: color.r,
            green: color.g,
            blue: color.b,
            timestamp,
        }
    }
}

macro_rules! impl_timestamped {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Timestamped for $ty {
                #[inline]
                fn timestamp(&self) -> i64 {
                    self.timestamp
                }
            }
        )*
    };
}

impl_timestamped!(
    GpsSample,
    AccelerationSample,
    FaceSample,
    LuminanceSample,
    HueSample,
    ColorSample,
);

/// All telemetry streams of one video, as exchanged in JSON.
///
/// Missing streams deserialize as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySet {
    #[serde(default)]
    pub gps: Vec<GpsSample>,
    #[serde(default)]
    pub acceleration: Vec<AccelerationSample>,
    #[serde(default)]
    pub faces: Vec<FaceSample>,
    #[serde(default)]
    pub luminance: Vec<LuminanceSample>,
    #[serde(default)]
    pub hues: Vec<HueSample>,
}
