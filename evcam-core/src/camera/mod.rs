//! Camera session: device lifecycle, acquisition thread and recording.
//!
//! A [`Camera`] wraps a [`Device`] opened either from a live source through a
//! [`DeviceDiscovery`] implementation, or from an EVT 3.0 RAW file. Starting
//! the camera spawns an acquisition thread that pulls raw buffers from the
//! device's events stream, decodes them when CD or trigger callbacks are
//! registered, and hands them to the registered callbacks.
//!
//! All callbacks run on the acquisition thread, except status changes
//! triggered by [`Camera::start`] and [`Camera::stop`], which run on the
//! calling thread.

mod pump;
mod realtime;
mod session;

use crate::biases::Biases;
use crate::config::CameraConfig;
use crate::device::{
    list_online_sources, Device, DeviceDiscovery, FileOnlyDiscovery, OnlineSourceType,
};
use crate::error::{CameraError, Feature};
use crate::facility::{AntiFlickerControl, NoiseFilterControl, RoiControl, TriggerOutControl};
use crate::raw_file::RawFileConfig;
use crate::types::{
    CallbackId, CameraConfiguration, CameraGeneration, CameraStatus, CdEvent, SensorGeometry,
    Timestamp, TriggerEvent,
};
use session::Session;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Handle on a camera session.
///
/// A default-constructed camera is uninitialized: every operation on it
/// fails with [`CameraError::NotInitialized`] (or returns `false` for the
/// callback removal methods).
#[derive(Default)]
pub struct Camera {
    session: Option<Arc<Session>>,
}

impl Camera {
    /// An uninitialized camera.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the first available live camera, preferring embedded sources
    /// over USB ones.
    pub fn from_first_available(discovery: &dyn DeviceDiscovery) -> Result<Self, CameraError> {
        let sources = list_online_sources(discovery);
        let serial = [OnlineSourceType::Embedded, OnlineSourceType::Usb]
            .iter()
            .find_map(|kind| sources.get(kind).and_then(|serials| serials.first()))
            .ok_or_else(|| CameraError::CameraNotFound("no camera available".to_string()))?;
        Self::open_live(discovery, serial)
    }

    /// Opens the `index`-th camera of the given source type, in the order
    /// reported by [`list_online_sources`].
    pub fn from_source(
        discovery: &dyn DeviceDiscovery,
        source: OnlineSourceType,
        index: usize,
    ) -> Result<Self, CameraError> {
        let sources = list_online_sources(discovery);
        let serial = sources
            .get(&source)
            .and_then(|serials| serials.get(index))
            .ok_or_else(|| {
                CameraError::CameraNotFound(format!("no {source:?} camera at index {index}"))
            })?;
        Self::open_live(discovery, serial)
    }

    /// Opens the live camera with the given serial number.
    pub fn from_serial(discovery: &dyn DeviceDiscovery, serial: &str) -> Result<Self, CameraError> {
        Self::open_live(discovery, serial)
    }

    /// Opens a RAW recording with the default read-ahead settings.
    pub fn from_file(path: impl AsRef<Path>, emulate_real_time: bool) -> Result<Self, CameraError> {
        Self::from_file_with(
            &FileOnlyDiscovery,
            path,
            &RawFileConfig::default(),
            emulate_real_time,
        )
    }

    /// Opens a RAW recording through `discovery`.
    ///
    /// With `emulate_real_time`, the acquisition thread paces playback so
    /// that event timestamps advance at wall-clock speed.
    pub fn from_file_with(
        discovery: &dyn DeviceDiscovery,
        path: impl AsRef<Path>,
        config: &RawFileConfig,
        emulate_real_time: bool,
    ) -> Result<Self, CameraError> {
        let session = open_file_session(discovery, path.as_ref(), config, emulate_real_time)?;
        Ok(Self {
            session: Some(Arc::new(session)),
        })
    }

    /// Replaces the current session by a RAW recording, stopping the
    /// camera first. The previous session is kept if opening fails.
    pub fn open_raw_file(
        &mut self,
        discovery: &dyn DeviceDiscovery,
        path: impl AsRef<Path>,
        config: &RawFileConfig,
        emulate_real_time: bool,
    ) -> Result<(), CameraError> {
        if let Some(session) = &self.session {
            session.stop()?;
        }
        let session = open_file_session(discovery, path.as_ref(), config, emulate_real_time)?;
        self.session = Some(Arc::new(session));
        Ok(())
    }

    fn open_live(discovery: &dyn DeviceDiscovery, serial: &str) -> Result<Self, CameraError> {
        let device = discovery
            .open(serial)
            .ok_or_else(|| CameraError::CameraNotFound(serial.to_string()))?;
        let session = Session::live(device, serial.to_string(), CameraConfig::from_env())?;
        Ok(Self {
            session: Some(Arc::new(session)),
        })
    }

    fn session(&self) -> Result<&Arc<Session>, CameraError> {
        self.session.as_ref().ok_or(CameraError::NotInitialized)
    }

    /// Starts acquisition. Returns `Ok(false)` if the acquisition thread
    /// already exists.
    pub fn start(&self) -> Result<bool, CameraError> {
        self.session()?.start()
    }

    /// Stops acquisition and any ongoing recording. Returns `Ok(false)` if
    /// the camera was not started.
    pub fn stop(&self) -> Result<bool, CameraError> {
        self.session()?.stop()
    }

    /// Whether the acquisition thread is pulling data.
    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| session.is_running())
            .unwrap_or(false)
    }

    /// Records raw data to `path` with its extension replaced by `.raw`.
    ///
    /// For live cameras the current biases are saved next to it with a
    /// `.bias` extension. Any ongoing recording is stopped first.
    pub fn start_recording(&self, path: impl AsRef<Path>) -> Result<(), CameraError> {
        self.session()?.start_recording(path.as_ref())
    }

    pub fn stop_recording(&self) -> Result<(), CameraError> {
        self.session()?.stop_recording();
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| session.is_recording())
            .unwrap_or(false)
    }

    pub fn add_runtime_error_callback<F>(&self, cb: F) -> Result<CallbackId, CameraError>
    where
        F: Fn(&CameraError) + Send + Sync + 'static,
    {
        Ok(self.session()?.callbacks.add_runtime_error(cb))
    }

    pub fn remove_runtime_error_callback(&self, id: CallbackId) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.callbacks.remove_runtime_error(id))
    }

    pub fn add_status_change_callback<F>(&self, cb: F) -> Result<CallbackId, CameraError>
    where
        F: Fn(CameraStatus) + Send + Sync + 'static,
    {
        Ok(self.session()?.callbacks.add_status_change(cb))
    }

    pub fn remove_status_change_callback(&self, id: CallbackId) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.callbacks.remove_status_change(id))
    }

    /// Registers a callback on decoded CD events. Decoding only runs while
    /// at least one CD or trigger callback is registered.
    pub fn add_cd_callback<F>(&self, cb: F) -> Result<CallbackId, CameraError>
    where
        F: Fn(&[CdEvent]) + Send + Sync + 'static,
    {
        Ok(self.session()?.callbacks.add_cd(cb))
    }

    pub fn remove_cd_callback(&self, id: CallbackId) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.callbacks.remove_cd(id))
    }

    pub fn add_ext_trigger_callback<F>(&self, cb: F) -> Result<CallbackId, CameraError>
    where
        F: Fn(&[TriggerEvent]) + Send + Sync + 'static,
    {
        Ok(self.session()?.callbacks.add_trigger(cb))
    }

    pub fn remove_ext_trigger_callback(&self, id: CallbackId) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.callbacks.remove_trigger(id))
    }

    /// Registers a callback on every raw buffer pulled from the stream.
    pub fn add_raw_data_callback<F>(&self, cb: F) -> Result<CallbackId, CameraError>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        Ok(self.session()?.callbacks.add_raw_data(cb))
    }

    pub fn remove_raw_data_callback(&self, id: CallbackId) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.callbacks.remove_raw_data(id))
    }

    pub fn geometry(&self) -> Result<SensorGeometry, CameraError> {
        Ok(self.session()?.geometry)
    }

    /// Sensor generation, when the device identifies its hardware.
    pub fn generation(&self) -> Result<Option<CameraGeneration>, CameraError> {
        Ok(self.session()?.generation)
    }

    pub fn configuration(&self) -> Result<&CameraConfiguration, CameraError> {
        Ok(&self.session()?.configuration)
    }

    /// The underlying device, for facilities this type does not wrap.
    pub fn device(&self) -> Result<&Device, CameraError> {
        Ok(&self.session()?.device)
    }

    /// Timestamp of the most recent decoded event.
    pub fn last_decoded_timestamp(&self) -> Result<Timestamp, CameraError> {
        Ok(self.session()?.last_timestamp.load(Ordering::SeqCst))
    }

    pub fn biases(&self) -> Result<&Biases, CameraError> {
        let session = self.live_session(Feature::Biases)?;
        session
            .biases
            .as_ref()
            .ok_or(CameraError::Unsupported(Feature::Biases))
    }

    pub fn roi(&self) -> Result<&dyn RoiControl, CameraError> {
        let session = self.live_session(Feature::Roi)?;
        session
            .roi
            .as_deref()
            .ok_or(CameraError::Unsupported(Feature::Roi))
    }

    pub fn trigger_out(&self) -> Result<&dyn TriggerOutControl, CameraError> {
        let session = self.live_session(Feature::TriggerOut)?;
        session
            .trigger_out
            .as_deref()
            .ok_or(CameraError::Unsupported(Feature::TriggerOut))
    }

    pub fn antiflicker_module(&self) -> Result<&dyn AntiFlickerControl, CameraError> {
        let session = self.live_session(Feature::AntiFlicker)?;
        session
            .antiflicker
            .as_deref()
            .ok_or(CameraError::Unsupported(Feature::AntiFlicker))
    }

    pub fn noise_filter_module(&self) -> Result<&dyn NoiseFilterControl, CameraError> {
        let session = self.live_session(Feature::NoiseFilter)?;
        session
            .noise_filter
            .as_deref()
            .ok_or(CameraError::Unsupported(Feature::NoiseFilter))
    }

    fn live_session(&self, feature: Feature) -> Result<&Arc<Session>, CameraError> {
        let session = self.session()?;
        if session.from_file {
            return Err(CameraError::UnavailableFromFile(feature));
        }
        Ok(session)
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            if let Err(e) = session.stop() {
                debug!(error = %e, "Failed to stop camera on drop");
            }
        }
    }
}

fn open_file_session(
    discovery: &dyn DeviceDiscovery,
    path: &Path,
    config: &RawFileConfig,
    emulate_real_time: bool,
) -> Result<Session, CameraError> {
    if !path.exists() {
        return Err(CameraError::FileDoesNotExist(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(CameraError::NotARegularFile(path.to_path_buf()));
    }
    if path.extension().and_then(|ext| ext.to_str()) != Some("raw") {
        return Err(CameraError::WrongExtension(path.to_path_buf()));
    }

    let device = discovery.open_raw_file(path, config)?;
    Session::file(device, path, emulate_real_time, CameraConfig::from_env())
}
