//! Text header of RAW recordings.
//!
//! RAW files may start with `%`-prefixed lines such as:
//!
//! ```text
//! % date 2023-03-29 16:37:46
//! % format EVT3;height=720;width=1280
//! % serial_number 00050423
//! % sensor_generation 4.2
//! % end
//! ```

use crate::types::{CameraGeneration, SensorGeometry};
use std::collections::BTreeMap;
use std::io::{self, BufRead};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFileHeader {
    fields: BTreeMap<String, String>,
    /// Header exactly as read, so a recording can reproduce it.
    raw: Vec<u8>,
}

impl RawFileHeader {
    /// Consumes the header lines of `reader`, leaving it at the first data byte.
    pub fn read<R: BufRead>(reader: &mut R) -> io::Result<Self> {
        let mut header = Self::default();

        loop {
            let peeked = reader.fill_buf()?;
            if peeked.first() != Some(&b'%') {
                break;
            }

            let mut line = Vec::new();
            reader.read_until(b'\n', &mut line)?;
            header.raw.extend_from_slice(&line);

            let line = String::from_utf8_lossy(&line);
            if line.trim_end() == "% end" {
                break;
            }
            header.add_line(&line);
        }

        Ok(header)
    }

    /// Builds a header for a fresh recording.
    pub fn with_fields<'a>(fields: impl IntoIterator<Item = (&'a str, String)>) -> Self {
        let mut header = Self::default();
        for (key, value) in fields {
            header.raw.extend_from_slice(format!("% {key} {value}\n").as_bytes());
            header.fields.insert(key.to_string(), value);
        }
        header.raw.extend_from_slice(b"% end\n");
        header
    }

    fn add_line(&mut self, line: &str) {
        let Some(body) = line.trim_end().strip_prefix('%') else {
            return;
        };
        let body = body.trim_start();
        match body.split_once(' ') {
            Some((key, value)) => self.fields.insert(key.to_string(), value.trim().to_string()),
            None => self.fields.insert(body.to_string(), String::new()),
        };
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Event encoding named by `% format` (e.g. `EVT3`) or `% evt`.
    pub fn encoding(&self) -> Option<String> {
        if let Some(format) = self.get("format") {
            return format.split(';').next().map(|s| s.trim().to_uppercase());
        }
        self.get("evt").map(|version| match version {
            "3.0" => "EVT3".to_string(),
            "2.0" => "EVT2".to_string(),
            other => format!("EVT{other}"),
        })
    }

    /// Geometry from `% format ...;width=W;height=H` or `% geometry WxH`.
    pub fn geometry(&self) -> Option<SensorGeometry> {
        if let Some(format) = self.get("format") {
            let mut width = None;
            let mut height = None;
            for (name, value) in format.split(';').filter_map(|p| p.split_once('=')) {
                match name {
                    "width" => width = value.parse().ok(),
                    "height" => height = value.parse().ok(),
                    _ => {}
                }
            }
            if let (Some(width), Some(height)) = (width, height) {
                return Some(SensorGeometry { width, height });
            }
        }

        let (w, h) = self.get("geometry")?.split_once('x')?;
        Some(SensorGeometry {
            width: w.parse().ok()?,
            height: h.parse().ok()?,
        })
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.get("serial_number")
    }

    /// Parses `% sensor_generation MAJOR.MINOR`.
    pub fn sensor_generation(&self) -> Option<CameraGeneration> {
        let (major, minor) = self.get("sensor_generation")?.split_once('.')?;
        Some(CameraGeneration::new(major.parse().ok()?, minor.parse().ok()?))
    }
}
