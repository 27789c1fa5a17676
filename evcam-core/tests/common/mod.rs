//! Shared fixtures: EVT 3.0 encoding, RAW files and a scripted live device.

#![allow(dead_code)]

use bytes::Bytes;
use evcam_core::device::{ConnectionType, Device, DeviceDiscovery, SourceInfo};
use evcam_core::facility::{
    Decoder, DeviceControl, EventsStream, Geometry, HwIdentification, LlBiases, SensorInfo,
    WaitResult,
};
use evcam_core::logger::RawDataLogger;
use evcam_core::{Evt3Decoder, SensorGeometry};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const HEADER: &[u8] = b"% format EVT3;width=640;height=480\n% serial_number 00ABCDEF\n% sensor_generation 4.1\n% end\n";

/// Encodes one CD event per timestamp as TIME_HIGH, TIME_LOW, ADDR_Y, ADDR_X.
pub fn encode_cd_events(timestamps: impl IntoIterator<Item = u64>) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, t) in timestamps.into_iter().enumerate() {
        let x = (i % 640) as u16;
        let y = (i % 480) as u16;
        let polarity = (i % 2) as u16;
        for word in [
            0x8000 | ((t >> 12) & 0xFFF) as u16,
            0x6000 | (t & 0xFFF) as u16,
            y,
            0x2000 | (polarity << 11) | x,
        ] {
            out.extend_from_slice(&word.to_le_bytes());
        }
    }
    out
}

/// `count` events spaced `step` microseconds apart from `first`.
pub fn evenly_spaced(first: u64, step: u64, count: u64) -> Vec<u8> {
    encode_cd_events((0..count).map(|i| first + i * step))
}

pub fn write_raw_file(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();
    file.write_all(HEADER).unwrap();
    file.write_all(body).unwrap();
    path
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub enum Item {
    Data(Vec<u8>),
    Fail,
}

#[derive(Default)]
struct StreamState {
    queue: VecDeque<Item>,
    stopped: bool,
    latest: Bytes,
}

/// Live events stream fed by the test, blocking until an item is pushed.
#[derive(Default)]
pub struct ScriptedStream {
    state: Mutex<StreamState>,
    cond: Condvar,
    logger: RawDataLogger,
    /// Calls to `wait_next_buffer`.
    pub polls: AtomicUsize,
}

impl ScriptedStream {
    pub fn push(&self, item: Item) {
        self.state.lock().queue.push_back(item);
        self.cond.notify_all();
    }

    /// Items pushed but not yet pulled.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }
}

impl EventsStream for ScriptedStream {
    fn start(&self) {
        self.state.lock().stopped = false;
    }

    fn stop(&self) {
        self.state.lock().stopped = true;
        self.cond.notify_all();
    }

    fn wait_next_buffer(&self) -> WaitResult {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        loop {
            if state.stopped {
                return WaitResult::EndOfStream;
            }
            match state.queue.pop_front() {
                Some(Item::Data(data)) => {
                    let n = data.len();
                    state.latest = Bytes::from(data);
                    self.logger.write(&state.latest);
                    return WaitResult::Ready(n);
                }
                Some(Item::Fail) => return WaitResult::Failed,
                None => self.cond.wait(&mut state),
            }
        }
    }

    fn latest_raw_data(&self) -> Bytes {
        self.state.lock().latest.clone()
    }

    fn log_raw_data(&self, path: &Path) -> bool {
        self.logger.open(path, HEADER).is_ok()
    }

    fn stop_log_raw_data(&self) {
        self.logger.close();
    }

    fn is_logging(&self) -> bool {
        self.logger.is_logging()
    }
}

#[derive(Default)]
pub struct CountingControl {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub resets: AtomicUsize,
    pub panic_on_start: AtomicBool,
}

impl DeviceControl for CountingControl {
    fn start(&self) {
        if self.panic_on_start.load(Ordering::SeqCst) {
            panic!("device refused to start");
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MemoryBiases(Mutex<BTreeMap<String, i32>>);

impl LlBiases for MemoryBiases {
    fn set(&self, name: &str, value: i32) -> bool {
        self.0.lock().insert(name.to_string(), value);
        true
    }

    fn get(&self, name: &str) -> Option<i32> {
        self.0.lock().get(name).copied()
    }

    fn all(&self) -> BTreeMap<String, i32> {
        self.0.lock().clone()
    }
}

struct FixedGeometry;

impl Geometry for FixedGeometry {
    fn geometry(&self) -> SensorGeometry {
        SensorGeometry {
            width: 640,
            height: 480,
        }
    }
}

struct FixedIdentification(String);

impl HwIdentification for FixedIdentification {
    fn serial(&self) -> String {
        self.0.clone()
    }

    fn sensor_info(&self) -> SensorInfo {
        SensorInfo {
            major_version: 4,
            minor_version: 1,
            name: "IMX636".to_string(),
        }
    }
}

/// Handles on the facilities of one scripted live camera.
#[derive(Clone)]
pub struct LiveRig {
    pub serial: String,
    pub stream: Arc<ScriptedStream>,
    pub control: Arc<CountingControl>,
    pub biases: Option<Arc<MemoryBiases>>,
}

impl LiveRig {
    pub fn new(serial: &str) -> Self {
        Self {
            serial: serial.to_string(),
            stream: Arc::new(ScriptedStream::default()),
            control: Arc::new(CountingControl::default()),
            biases: None,
        }
    }

    pub fn with_biases(mut self, values: &[(&str, i32)]) -> Self {
        let biases = MemoryBiases::default();
        for (name, value) in values {
            biases.set(name, *value);
        }
        self.biases = Some(Arc::new(biases));
        self
    }

    pub fn device(&self) -> Device {
        let decoder: Arc<Mutex<dyn Decoder>> = Arc::new(Mutex::new(Evt3Decoder::new()));
        let mut device = Device::new()
            .with_facility::<dyn EventsStream>(self.stream.clone())
            .with_facility::<Mutex<dyn Decoder>>(decoder)
            .with_facility::<dyn Geometry>(Arc::new(FixedGeometry))
            .with_facility::<dyn DeviceControl>(self.control.clone())
            .with_facility::<dyn HwIdentification>(Arc::new(FixedIdentification(
                self.serial.clone(),
            )));
        if let Some(biases) = &self.biases {
            device.add_facility::<dyn LlBiases>(biases.clone());
        }
        device
    }
}

/// Discovery over a fixed set of scripted cameras.
#[derive(Default)]
pub struct ScriptedDiscovery {
    sources: Vec<SourceInfo>,
    rigs: HashMap<String, LiveRig>,
}

impl ScriptedDiscovery {
    pub fn with(mut self, rig: LiveRig, connection: ConnectionType) -> Self {
        self.sources.push(SourceInfo {
            serial: rig.serial.clone(),
            connection,
        });
        self.rigs.insert(rig.serial.clone(), rig);
        self
    }

    pub fn rig(&self, serial: &str) -> &LiveRig {
        &self.rigs[serial]
    }
}

impl DeviceDiscovery for ScriptedDiscovery {
    fn list_available_sources(&self) -> Vec<SourceInfo> {
        self.sources.clone()
    }

    fn open(&self, serial: &str) -> Option<Device> {
        self.rigs.get(serial).map(LiveRig::device)
    }
}
