//! State shared between the camera handle and its acquisition thread.

use crate::biases::Biases;
use crate::callbacks::CallbackRegistry;
use crate::config::CameraConfig;
use crate::device::Device;
use crate::error::CameraError;
use crate::facility::{
    AntiFlickerControl, Decoder, DeviceControl, EventsStream, Geometry, HwIdentification, LlBiases,
    NoiseFilterControl, RoiControl, TriggerOutControl,
};
use crate::types::{CameraConfiguration, CameraGeneration, CameraStatus, SensorGeometry};
use parking_lot::{Condvar, Mutex};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Progress of the acquisition thread within one start/stop cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunThreadStatus {
    NotStarted,
    Started,
    Running,
    Stopped,
}

pub(crate) struct RunThread {
    pub(crate) status: RunThreadStatus,
    handle: Option<JoinHandle<()>>,
}

pub(crate) struct Session {
    pub(crate) device: Device,
    pub(crate) from_file: bool,
    pub(crate) emulate_real_time: bool,
    pub(crate) config: CameraConfig,
    pub(crate) configuration: CameraConfiguration,

    pub(crate) stream: Arc<dyn EventsStream>,
    pub(crate) decoder: Arc<Mutex<dyn Decoder>>,
    pub(crate) device_control: Option<Arc<dyn DeviceControl>>,
    pub(crate) geometry: SensorGeometry,
    pub(crate) generation: Option<CameraGeneration>,
    pub(crate) biases: Option<Biases>,
    pub(crate) roi: Option<Arc<dyn RoiControl>>,
    pub(crate) trigger_out: Option<Arc<dyn TriggerOutControl>>,
    pub(crate) antiflicker: Option<Arc<dyn AntiFlickerControl>>,
    pub(crate) noise_filter: Option<Arc<dyn NoiseFilterControl>>,

    pub(crate) callbacks: CallbackRegistry,

    // run-thread lock: guards the thread handle and the start/stop handshake
    pub(crate) run_thread: Mutex<RunThread>,
    pub(crate) run_thread_cond: Condvar,
    // set by the pump once its main loop is entered
    pump_started: Mutex<bool>,
    pump_started_cond: Condvar,

    is_running: AtomicBool,
    is_recording: AtomicBool,
    pub(crate) last_timestamp: AtomicU64,
}

fn required<T: ?Sized + Send + Sync + 'static>(
    device: &Device,
    name: &'static str,
) -> Result<Arc<T>, CameraError> {
    device
        .facility::<T>()
        .ok_or(CameraError::MissingFacility(name))
}

impl Session {
    fn build(
        device: Device,
        serial: String,
        from_file: bool,
        emulate_real_time: bool,
        config: CameraConfig,
    ) -> Result<Self, CameraError> {
        let stream = required::<dyn EventsStream>(&device, "events stream")?;
        let geometry = required::<dyn Geometry>(&device, "geometry")?.geometry();
        let decoder = required::<Mutex<dyn Decoder>>(&device, "decoder")?;
        let generation = device.facility::<dyn HwIdentification>().map(|id| {
            let info = id.sensor_info();
            CameraGeneration::new(info.major_version, info.minor_version)
        });
        let last_timestamp = decoder.lock().last_timestamp();

        // live-only facilities
        let (device_control, biases, roi, trigger_out, antiflicker, noise_filter) = if from_file {
            (None, None, None, None, None, None)
        } else {
            (
                Some(required::<dyn DeviceControl>(&device, "device control")?),
                device.facility::<dyn LlBiases>().map(Biases::new),
                device.facility::<dyn RoiControl>(),
                device.facility::<dyn TriggerOutControl>(),
                device.facility::<dyn AntiFlickerControl>(),
                device.facility::<dyn NoiseFilterControl>(),
            )
        };

        Ok(Self {
            from_file,
            emulate_real_time,
            config,
            configuration: CameraConfiguration {
                serial_number: serial,
            },
            stream,
            decoder,
            device_control,
            geometry,
            generation,
            biases,
            roi,
            trigger_out,
            antiflicker,
            noise_filter,
            callbacks: CallbackRegistry::new(),
            run_thread: Mutex::new(RunThread {
                status: RunThreadStatus::NotStarted,
                handle: None,
            }),
            run_thread_cond: Condvar::new(),
            pump_started: Mutex::new(false),
            pump_started_cond: Condvar::new(),
            is_running: AtomicBool::new(false),
            is_recording: AtomicBool::new(false),
            last_timestamp: AtomicU64::new(last_timestamp),
            device,
        })
    }

    pub(crate) fn live(device: Device, serial: String, config: CameraConfig) -> Result<Self, CameraError> {
        let session = Self::build(device, serial, false, false, config)?;
        info!(serial = %session.configuration.serial_number, "Opened camera");
        Ok(session)
    }

    pub(crate) fn file(
        device: Device,
        path: &Path,
        emulate_real_time: bool,
        config: CameraConfig,
    ) -> Result<Self, CameraError> {
        let serial = required::<dyn HwIdentification>(&device, "hardware identification")?.serial();
        let session = Self::build(device, serial, true, emulate_real_time, config)?;
        info!(path = %path.display(), emulate_real_time, "Opened RAW file");
        Ok(session)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// True while a recording is open and the stream still logs to it.
    pub(crate) fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::SeqCst) && self.stream.is_logging()
    }

    /// Updates the running flag, notifying status callbacks on edges only.
    pub(crate) fn set_is_running(&self, running: bool) {
        if self.is_running.swap(running, Ordering::SeqCst) != running {
            let status = if running {
                CameraStatus::Started
            } else {
                CameraStatus::Stopped
            };
            info!(%status, "Camera status changed");
            self.callbacks.notify_status(status);
        }
    }

    pub(crate) fn mark_pump_started(&self) {
        *self.pump_started.lock() = true;
        self.pump_started_cond.notify_all();
    }

    /// Spawns the acquisition thread and waits until its main loop runs.
    ///
    /// Returns false if a thread already exists, even one that has finished
    /// on its own: it must be reaped by [`stop`](Self::stop) first.
    pub(crate) fn start(self: &Arc<Self>) -> Result<bool, CameraError> {
        {
            let mut run = self.run_thread.lock();
            if run.handle.is_some() {
                return Ok(false);
            }

            *self.pump_started.lock() = false;
            let pump = Arc::clone(self);
            let handle = thread::Builder::new()
                .name("evcam-acquisition".to_string())
                .spawn(move || pump.run())?;
            run.handle = Some(handle);

            self.set_is_running(true);
            run.status = RunThreadStatus::Started;
        }
        self.run_thread_cond.notify_all();

        let mut started = self.pump_started.lock();
        while !*started {
            self.pump_started_cond.wait(&mut started);
        }
        Ok(true)
    }

    /// Stops and joins the acquisition thread, then closes any recording.
    ///
    /// Called from a callback on the acquisition thread itself, the thread is
    /// told to stop but not joined; its handle is reaped by a later `stop()`.
    pub(crate) fn stop(&self) -> Result<bool, CameraError> {
        let mut run = self.run_thread.lock();
        loop {
            if run.handle.is_none() {
                return Ok(false);
            }
            if matches!(run.status, RunThreadStatus::Running | RunThreadStatus::Stopped) {
                break;
            }
            self.run_thread_cond.wait(&mut run);
        }
        run.status = RunThreadStatus::Stopped;

        self.set_is_running(false);
        self.stream.stop();
        if let Some(control) = &self.device_control {
            control.stop();
        }

        let on_pump_thread = run
            .handle
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id());
        if on_pump_thread {
            debug!("Stop requested from the acquisition thread, join deferred");
        } else if let Some(handle) = run.handle.take() {
            // the pump reports its own failures through runtime error callbacks
            if handle.join().is_err() {
                warn!("Acquisition thread panicked");
            }
        }
        drop(run);
        self.run_thread_cond.notify_all();

        // only now is every pulled buffer in the recording
        self.stop_recording();
        Ok(true)
    }

    pub(crate) fn start_recording(&self, path: &Path) -> Result<(), CameraError> {
        self.stop_recording();

        let base = path.with_extension("");
        if let Some(biases) = &self.biases {
            biases.save_to_file(&sibling(&base, "bias"))?;
        }

        let raw_path = sibling(&base, "raw");
        if !self.stream.log_raw_data(&raw_path) {
            return Err(CameraError::CouldNotOpenFile(raw_path));
        }
        self.is_recording.store(true, Ordering::SeqCst);
        info!(path = %raw_path.display(), "Recording started");
        Ok(())
    }

    pub(crate) fn stop_recording(&self) {
        self.stream.stop_log_raw_data();
        if self.is_recording.swap(false, Ordering::SeqCst) {
            info!("Recording stopped");
        }
    }
}

/// `base` with `.ext` appended, keeping any dots already in the file name.
fn sibling(base: &Path, ext: &str) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(".");
    path.push(ext);
    PathBuf::from(path)
}
