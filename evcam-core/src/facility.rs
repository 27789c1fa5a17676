//! Capability interfaces a device may expose.
//!
//! A [`Device`](crate::device::Device) holds any subset of these behind
//! `Arc<dyn Trait>` handles. The camera session requires the events stream,
//! the decoder and the geometry; everything else is optional.

use crate::types::{CdEvent, SensorGeometry, Timestamp, TriggerEvent};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::Path;

/// Outcome of [`EventsStream::wait_next_buffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// A buffer of this many raw bytes is available.
    Ready(usize),
    /// Nothing yet; poll again.
    Empty,
    /// The stream was stopped or its source is exhausted.
    EndOfStream,
    /// Data transfer broke.
    Failed,
}

/// Source of raw sensor bytes.
///
/// Every method takes `&self`: the acquisition thread blocks in
/// [`wait_next_buffer`](Self::wait_next_buffer) while other threads call
/// [`stop`](Self::stop) or toggle recording.
pub trait EventsStream: Send + Sync {
    fn start(&self);

    /// Unblocks a pending [`wait_next_buffer`](Self::wait_next_buffer).
    fn stop(&self);

    /// Blocks until data is available, the stream is stopped, or it fails.
    fn wait_next_buffer(&self) -> WaitResult;

    /// The buffer made available by the last successful poll.
    fn latest_raw_data(&self) -> Bytes;

    /// Starts copying every polled buffer to `path`. Returns false if the
    /// destination cannot be opened.
    fn log_raw_data(&self, path: &Path) -> bool;

    /// Stops and flushes the raw data log. No-op when not logging.
    fn stop_log_raw_data(&self);

    /// True while raw data is still being logged. A write failure ends the log.
    fn is_logging(&self) -> bool;
}

/// Receives decoded events. Slices are only valid for the duration of the call.
pub trait EventSink {
    fn on_cd_events(&mut self, events: &[CdEvent]);
    fn on_trigger_events(&mut self, events: &[TriggerEvent]);
}

/// Converts raw bytes into typed events.
pub trait Decoder: Send {
    /// Decodes `raw` and forwards events to `sink`. State carries over
    /// between calls so a stream may be split at any event boundary.
    fn decode(&mut self, raw: &[u8], sink: &mut dyn EventSink);

    fn last_timestamp(&self) -> Timestamp;

    fn raw_event_size_bytes(&self) -> usize;
}

/// Start/stop control of a live sensor.
pub trait DeviceControl: Send + Sync {
    fn start(&self);
    fn stop(&self);
    fn reset(&self);
}

pub trait Geometry: Send + Sync {
    fn geometry(&self) -> SensorGeometry;
}

/// Sensor version information reported by a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorInfo {
    pub major_version: u16,
    pub minor_version: u16,
    pub name: String,
}

pub trait HwIdentification: Send + Sync {
    fn serial(&self) -> String;
    fn sensor_info(&self) -> SensorInfo;
}

/// Low-level bias access.
pub trait LlBiases: Send + Sync {
    fn set(&self, name: &str, value: i32) -> bool;
    fn get(&self, name: &str) -> Option<i32>;
    fn all(&self) -> BTreeMap<String, i32>;
}

/// Rectangular region of the sensor, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub trait RoiControl: Send + Sync {
    fn set_window(&self, window: RoiWindow) -> bool;
    fn enable(&self, enabled: bool) -> bool;
}

pub trait TriggerOutControl: Send + Sync {
    fn set_period(&self, period_us: u32) -> bool;
    fn set_duty_cycle(&self, ratio: f64) -> bool;
    fn enable(&self) -> bool;
    fn disable(&self) -> bool;
}

pub trait AntiFlickerControl: Send + Sync {
    fn enable(&self, enabled: bool) -> bool;
    fn set_frequency_band(&self, low_hz: u32, high_hz: u32) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseFilterType {
    Stc,
    Trail,
}

pub trait NoiseFilterControl: Send + Sync {
    fn enable(&self, filter: NoiseFilterType, threshold_us: u32) -> bool;
    fn disable(&self) -> bool;
}
