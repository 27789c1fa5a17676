//! Camera session core for event cameras.
//!
//! This crate drives an event camera, live or replayed from an EVT 3.0 RAW
//! recording, through a single [`Camera`] handle: it owns the device, runs an
//! acquisition thread that pulls raw buffers and decodes them, dispatches
//! decoded events to user callbacks, paces file replay at wall-clock speed
//! on request, and records the raw stream to disk.
//!
//! # Example
//!
//! ```no_run
//! use evcam_core::Camera;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let camera = Camera::from_file("recording.raw", true)?;
//! let count = Arc::new(AtomicUsize::new(0));
//! let seen = Arc::clone(&count);
//! camera.add_cd_callback(move |events| {
//!     seen.fetch_add(events.len(), Ordering::Relaxed);
//! })?;
//!
//! camera.start()?;
//! while camera.is_running() {
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! camera.stop()?;
//! println!("Decoded {} CD events", count.load(Ordering::Relaxed));
//! # Ok::<(), evcam_core::CameraError>(())
//! ```
//!
//! Live cameras are reached through a [`DeviceDiscovery`] implementation
//! provided by a hardware backend; this crate ships [`FileOnlyDiscovery`],
//! which only knows about RAW files.

pub mod biases;
pub mod callbacks;
pub mod camera;
pub mod config;
pub mod device;
pub mod error;
pub mod evt3;
pub mod facility;
pub mod logger;
pub mod output;
pub mod raw_file;
pub mod types;

// Re-export commonly used types
pub use biases::Biases;
pub use camera::Camera;
pub use config::CameraConfig;
pub use device::{
    list_online_sources, Device, DeviceDiscovery, FileOnlyDiscovery, OnlineSourceType,
};
pub use error::{CameraError, ErrorKind, Feature};
pub use evt3::Evt3Decoder;
pub use output::{CdCsvWriter, FieldOrder, TriggerCsvWriter};
pub use raw_file::RawFileConfig;
pub use types::{
    CallbackId, CameraConfiguration, CameraGeneration, CameraStatus, CdEvent, SensorGeometry,
    Timestamp, TriggerEvent,
};
