//! Telemetry store: owns the per-stream sample arrays and the current
//! playback time, and answers "current sample" queries for each stream.
//!
//! Setters are the only mutators. Queries are recomputed on demand; there
//! is no caching, so a query always reflects the latest setter call.

use log::{debug, warn};
use serde::Serialize;

use crate::config::{ReferenceStream, StoreConfig};
use crate::hue::BlendError;
use crate::locate::{locate, Timestamped};
use crate::sample::{
    AccelerationSample, ColorSample, FaceSample, GpsSample, HueSample, LuminanceSample,
    TelemetrySet,
};

/// Current sample of every stream at one playback time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub video_time: f64,
    pub center: (f64, f64),
    pub gps: Option<GpsSample>,
    pub acceleration: Option<AccelerationSample>,
    pub face: Option<FaceSample>,
    pub luminance: Option<LuminanceSample>,
    pub hue: Option<HueSample>,
    /// Blended hue color, absent when there is no hue sample or its weights
    /// cannot be blended
    pub color: Option<ColorSample>,
}

#[derive(Debug, Clone, Default)]
pub struct TelemetryStore {
    gps: Vec<GpsSample>,
    acceleration: Vec<AccelerationSample>,
    faces: Vec<FaceSample>,
    luminance: Vec<LuminanceSample>,
    hues: Vec<HueSample>,
    video_current_time: f64,
    video_url: String,
    config: StoreConfig,
}

/// Log how many samples a stream holds and warn if they are out of order.
fn check_stream<T: Timestamped>(stream: &str, samples: &[T]) {
    debug!("{stream}: stored {} samples", samples.len());
    if let Some(index) = samples
        .windows(2)
        .position(|pair| pair[1].timestamp() < pair[0].timestamp())
    {
        warn!(
            "{stream}: samples not sorted by timestamp (index {} goes back in time), lookups may miss",
            index + 1
        );
    }
}

fn first_timestamp<T: Timestamped>(samples: &[T]) -> Option<i64> {
    samples.first().map(Timestamped::timestamp)
}

impl TelemetryStore {
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Replace every stream with the contents of `set`.
    pub fn load(&mut self, set: TelemetrySet) {
        let TelemetrySet {
            gps,
            acceleration,
            faces,
            luminance,
            hues,
        } = set;
        self.set_gps_data(gps);
        self.set_acceleration_data(acceleration);
        self.set_face_data(faces);
        self.set_luminance_data(luminance);
        self.set_hue_data(hues);
    }

    pub fn set_gps_data(&mut self, data: Vec<GpsSample>) {
        check_stream("gps", &data);
        self.gps = data;
    }

    pub fn set_acceleration_data(&mut self, data: Vec<AccelerationSample>) {
        check_stream("acceleration", &data);
        self.acceleration = data;
    }

    /// Store face detections, dropping those with non-positive confidence
    /// or box values.
    pub fn set_face_data(&mut self, mut data: Vec<FaceSample>) {
        let received = data.len();
        data.retain(FaceSample::is_valid);
        if data.len() != received {
            debug!("faces: dropped {} invalid detections", received - data.len());
        }
        check_stream("faces", &data);
        self.faces = data;
    }

    pub fn set_luminance_data(&mut self, data: Vec<LuminanceSample>) {
        check_stream("luminance", &data);
        self.luminance = data;
    }

    /// Store hue histograms as-is, in the raw 0-255 encoding.
    ///
    /// Conversion to degrees and proportions happens only when blending.
    pub fn set_hue_data(&mut self, data: Vec<HueSample>) {
        check_stream("hues", &data);
        self.hues = data;
    }

    pub fn set_video_current_time(&mut self, seconds: f64) {
        self.video_current_time = seconds;
    }

    pub fn set_video_url(&mut self, url: impl Into<String>) {
        self.video_url = url.into();
    }

    #[must_use]
    pub fn gps_data(&self) -> &[GpsSample] {
        &self.gps
    }

    #[must_use]
    pub fn acceleration_data(&self) -> &[AccelerationSample] {
        &self.acceleration
    }

    #[must_use]
    pub fn face_data(&self) -> &[FaceSample] {
        &self.faces
    }

    #[must_use]
    pub fn luminance_data(&self) -> &[LuminanceSample] {
        &self.luminance
    }

    #[must_use]
    pub fn hue_data(&self) -> &[HueSample] {
        &self.hues
    }

    #[must_use]
    pub fn video_current_time(&self) -> f64 {
        self.video_current_time
    }

    #[must_use]
    pub fn video_url(&self) -> &str {
        &self.video_url
    }

    /// Mean `(latitude, longitude)` of all GPS samples, or the configured
    /// default center when there are none.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn center(&self) -> (f64, f64) {
        if self.gps.is_empty() {
            return self.config.default_center;
        }
        let count = self.gps.len() as f64;
        let (lat_sum, lng_sum) = self
            .gps
            .iter()
            .fold((0.0, 0.0), |(lat, lng), p| (lat + p.latitude, lng + p.longitude));
        (lat_sum / count, lng_sum / count)
    }

    fn current<'a, T: Timestamped>(&self, samples: &'a [T], start_time: Option<i64>) -> Option<&'a T> {
        locate(samples, start_time?, self.video_current_time)
    }

    #[must_use]
    pub fn current_gps(&self) -> Option<&GpsSample> {
        self.current(&self.gps, first_timestamp(&self.gps))
    }

    #[must_use]
    pub fn current_acceleration(&self) -> Option<&AccelerationSample> {
        self.current(&self.acceleration, first_timestamp(&self.acceleration))
    }

    #[must_use]
    pub fn current_face(&self) -> Option<&FaceSample> {
        self.current(&self.faces, first_timestamp(&self.faces))
    }

    /// Current luminance sample, measured against the reference stream
    /// selected by [`StoreConfig::luminance_reference`].
    #[must_use]
    pub fn current_luminance(&self) -> Option<&LuminanceSample> {
        let start_time = match self.config.luminance_reference {
            ReferenceStream::Own => first_timestamp(&self.luminance),
            ReferenceStream::Acceleration => first_timestamp(&self.acceleration),
        };
        self.current(&self.luminance, start_time)
    }

    #[must_use]
    pub fn current_hue(&self) -> Option<&HueSample> {
        self.current(&self.hues, first_timestamp(&self.hues))
    }

    /// Blended color of the current hue sample.
    ///
    /// # Errors
    ///
    /// Returns [`BlendError::InvalidWeights`] if the current hue sample has
    /// no hues or only zero weights.
    pub fn current_color(&self) -> Result<Option<ColorSample>, BlendError> {
        self.current_hue()
            .map(|sample| {
                sample
                    .blend()
                    .map(|rgb| ColorSample::new(rgb, sample.timestamp))
            })
            .transpose()
    }

    /// Collect the current sample of every stream.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let color = self.current_color().unwrap_or_else(|e| {
            debug!("No color at {:.3}s: {e}", self.video_current_time);
            None
        });
        Snapshot {
            video_time: self.video_current_time,
            center: self.center(),
            gps: self.current_gps().copied(),
            acceleration: self.current_acceleration().copied(),
            face: self.current_face().copied(),
            luminance: self.current_luminance().copied(),
            hue: self.current_hue().cloned(),
            color,
        }
    }
}
