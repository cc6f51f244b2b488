//! Telemetry lookup logic for GoPro Meta
//!
//! This library holds the per-stream telemetry samples extracted from an
//! action camera video and answers "which sample belongs to this playback
//! time?" for each stream. It also blends per-frame hue histograms into a
//! single display color. It is UI-agnostic and can be tested without a
//! video player attached.
//!
//! The two pure building blocks are [`locate`] (nearest sample within a
//! ±0.5 s window) and [`blend_hues`] (hue histogram to `RGB8`). The
//! [`TelemetryStore`] owns the sample arrays and wires both together.

pub mod config;
pub mod hue;
pub mod locate;
pub mod sample;
pub mod store;

pub use config::{LogLevel, ReferenceStream, StoreConfig, UnknownLogLevel};
pub use hue::{blend_hues, hue_to_rgb, BlendError};
pub use locate::{elapsed_seconds, locate, Timestamped, TOLERANCE_SECS};
pub use rgb::RGB8;
pub use sample::{
    AccelerationSample, ColorSample, FaceSample, GpsSample, HueSample, HueWeight,
    LuminanceSample, TelemetrySet,
};
pub use store::{Snapshot, TelemetryStore};
