//! Device backed by an EVT 3.0 RAW recording.

use crate::device::Device;
use crate::error::CameraError;
use crate::evt3::{Evt3Decoder, RawFileHeader, RAW_EVENT_SIZE_BYTES};
use crate::facility::{Decoder, EventsStream, Geometry, HwIdentification, SensorInfo, WaitResult};
use crate::logger::RawDataLogger;
use crate::types::{CameraGeneration, SensorGeometry};
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Read-ahead settings for file replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFileConfig {
    /// Raw events pulled from disk per poll.
    pub n_events_to_read: usize,
}

impl Default for RawFileConfig {
    fn default() -> Self {
        Self {
            n_events_to_read: 1_000_000,
        }
    }
}

struct ReaderState {
    reader: BufReader<File>,
    latest: Bytes,
}

/// Events stream reading a RAW file in large chunks.
pub struct FileEventsStream {
    state: Mutex<ReaderState>,
    stopped: AtomicBool,
    header: RawFileHeader,
    read_size: usize,
    logger: RawDataLogger,
}

impl FileEventsStream {
    fn new(reader: BufReader<File>, header: RawFileHeader, config: &RawFileConfig) -> Self {
        Self {
            state: Mutex::new(ReaderState {
                reader,
                latest: Bytes::new(),
            }),
            stopped: AtomicBool::new(true),
            header,
            read_size: config.n_events_to_read.max(1) * RAW_EVENT_SIZE_BYTES,
            logger: RawDataLogger::new(),
        }
    }
}

impl EventsStream for FileEventsStream {
    fn start(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn wait_next_buffer(&self) -> WaitResult {
        if self.stopped.load(Ordering::SeqCst) {
            return WaitResult::EndOfStream;
        }

        let mut state = self.state.lock();
        let mut chunk = vec![0u8; self.read_size];
        let mut filled = 0;
        while filled < chunk.len() {
            match state.reader.read(&mut chunk[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Failed to read RAW file");
                    return WaitResult::Failed;
                }
            }
        }

        if filled == 0 {
            debug!("Reached end of RAW file");
            return WaitResult::EndOfStream;
        }

        chunk.truncate(filled);
        state.latest = Bytes::from(chunk);
        self.logger.write(&state.latest);
        WaitResult::Ready(filled)
    }

    fn latest_raw_data(&self) -> Bytes {
        self.state.lock().latest.clone()
    }

    fn log_raw_data(&self, path: &Path) -> bool {
        match self.logger.open(path, self.header.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot open raw data log");
                false
            }
        }
    }

    fn stop_log_raw_data(&self) {
        self.logger.close();
    }

    fn is_logging(&self) -> bool {
        self.logger.is_logging()
    }
}

struct FileGeometry(SensorGeometry);

impl Geometry for FileGeometry {
    fn geometry(&self) -> SensorGeometry {
        self.0
    }
}

struct FileIdentification {
    serial: String,
    generation: Option<CameraGeneration>,
}

impl HwIdentification for FileIdentification {
    fn serial(&self) -> String {
        self.serial.clone()
    }

    fn sensor_info(&self) -> SensorInfo {
        let generation = self.generation.unwrap_or_default();
        SensorInfo {
            major_version: generation.major,
            minor_version: generation.minor,
            name: String::new(),
        }
    }
}

/// Opens `path` as a device exposing the events stream, an EVT 3.0
/// decoder, the geometry and the hardware identification of the recording.
pub fn open(path: &Path, config: &RawFileConfig) -> Result<Device, CameraError> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = RawFileHeader::read(&mut reader)?;

    if let Some(encoding) = header.encoding() {
        if encoding != "EVT3" {
            return Err(CameraError::InvalidRawFile {
                path: path.to_path_buf(),
                reason: format!("unsupported event encoding {encoding}"),
            });
        }
    }

    debug!(path = %path.display(), encoding = ?header.encoding(), "Opened RAW file");

    let geometry = FileGeometry(header.geometry().unwrap_or_default());
    let identification = FileIdentification {
        serial: header.serial_number().unwrap_or_default().to_string(),
        generation: header.sensor_generation(),
    };
    let decoder: Arc<Mutex<dyn Decoder>> = Arc::new(Mutex::new(Evt3Decoder::new()));
    let stream = FileEventsStream::new(reader, header, config);

    Ok(Device::new()
        .with_facility::<dyn EventsStream>(Arc::new(stream))
        .with_facility::<Mutex<dyn Decoder>>(decoder)
        .with_facility::<dyn Geometry>(Arc::new(geometry))
        .with_facility::<dyn HwIdentification>(Arc::new(identification)))
}
