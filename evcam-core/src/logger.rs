//! Raw byte recording shared by events stream implementations.

use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

struct Destination {
    path: PathBuf,
    writer: BufWriter<File>,
}

/// Copies raw buffers to a file while enabled.
///
/// Streams call [`write`](Self::write) on every buffer they hand out, so
/// the recording holds exactly what the acquisition thread pulled.
#[derive(Default)]
pub struct RawDataLogger {
    destination: Mutex<Option<Destination>>,
}

impl RawDataLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `path` and writes `header` to it, closing any previous log.
    pub fn open(&self, path: &Path, header: &[u8]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(header)?;

        let previous = self.destination.lock().replace(Destination {
            path: path.to_path_buf(),
            writer,
        });
        if let Some(previous) = previous {
            finish(previous);
        }
        info!(path = %path.display(), "Raw data logging started");
        Ok(())
    }

    pub fn is_logging(&self) -> bool {
        self.destination.lock().is_some()
    }

    /// Appends `data` if logging. A write failure ends the recording.
    pub fn write(&self, data: &[u8]) {
        let mut destination = self.destination.lock();
        let Some(dest) = destination.as_mut() else {
            return;
        };
        if let Err(e) = dest.writer.write_all(data) {
            warn!(path = %dest.path.display(), error = %e, "Raw data logging aborted");
            *destination = None;
        }
    }

    /// Flushes and closes the current log, if any.
    pub fn close(&self) {
        let destination = self.destination.lock().take();
        if let Some(destination) = destination {
            finish(destination);
        }
    }
}

fn finish(mut destination: Destination) {
    match destination.writer.flush() {
        Ok(()) => info!(path = %destination.path.display(), "Raw data logging stopped"),
        Err(e) => warn!(path = %destination.path.display(), error = %e, "Failed to flush raw data log"),
    }
}
