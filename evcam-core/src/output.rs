//! CSV export of decoded events.

use crate::types::{CdEvent, SensorGeometry, TriggerEvent};
use std::fmt;
use std::io::{self, BufWriter, Write};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FieldOrderError {
    #[error("Format must have exactly 4 fields: x, y, p, t")]
    WrongFieldCount,

    #[error("Unknown field: {0}. Use x, y, p, t")]
    UnknownField(String),

    #[error("Duplicate field: {0}")]
    DuplicateField(String),
}

/// One column of a CD event row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    X,
    Y,
    Polarity,
    Timestamp,
}

impl Field {
    fn name(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Polarity => "polarity",
            Self::Timestamp => "timestamp",
        }
    }

    #[inline]
    fn value(self, event: &CdEvent) -> u64 {
        match self {
            Self::X => event.x as u64,
            Self::Y => event.y as u64,
            Self::Polarity => event.polarity as u64,
            Self::Timestamp => event.timestamp,
        }
    }
}

/// Column order of CD event rows, parsed from strings like `"t,x,y,p"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldOrder([Field; 4]);

impl FieldOrder {
    pub const XYPT: Self = Self([Field::X, Field::Y, Field::Polarity, Field::Timestamp]);
    pub const TXYP: Self = Self([Field::Timestamp, Field::X, Field::Y, Field::Polarity]);

    pub fn fields(&self) -> [Field; 4] {
        self.0
    }

    /// Column header line, without the trailing newline.
    pub fn header(&self) -> String {
        self.0.map(Field::name).join(",")
    }
}

impl Default for FieldOrder {
    fn default() -> Self {
        Self::XYPT
    }
}

impl fmt::Display for FieldOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header())
    }
}

impl FromStr for FieldOrder {
    type Err = FieldOrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<String> = s.split(',').map(|p| p.trim().to_lowercase()).collect();
        if parts.len() != 4 {
            return Err(FieldOrderError::WrongFieldCount);
        }

        let mut fields = [Field::X; 4];
        for (i, part) in parts.into_iter().enumerate() {
            let field = match part.as_str() {
                "x" => Field::X,
                "y" => Field::Y,
                "p" | "pol" | "polarity" => Field::Polarity,
                "t" | "time" | "timestamp" => Field::Timestamp,
                _ => return Err(FieldOrderError::UnknownField(part)),
            };
            if fields[..i].contains(&field) {
                return Err(FieldOrderError::DuplicateField(part));
            }
            fields[i] = field;
        }
        Ok(Self(fields))
    }
}

/// Buffered CSV writer for CD events.
pub struct CdCsvWriter<W: Write> {
    writer: BufWriter<W>,
    order: FieldOrder,
    rows: u64,
}

impl<W: Write> CdCsvWriter<W> {
    pub fn new(writer: W, order: FieldOrder) -> Self {
        Self {
            writer: BufWriter::new(writer),
            order,
            rows: 0,
        }
    }

    /// Writes the `%geometry:W,H` line followed by the column header.
    pub fn write_header(&mut self, geometry: Option<SensorGeometry>) -> io::Result<()> {
        if let Some(geometry) = geometry {
            writeln!(self.writer, "%geometry:{},{}", geometry.width, geometry.height)?;
        }
        writeln!(self.writer, "{}", self.order.header())
    }

    pub fn write_events(&mut self, events: &[CdEvent]) -> io::Result<()> {
        let [a, b, c, d] = self.order.fields();
        for event in events {
            writeln!(
                self.writer,
                "{},{},{},{}",
                a.value(event),
                b.value(event),
                c.value(event),
                d.value(event)
            )?;
        }
        self.rows += events.len() as u64;
        Ok(())
    }

    /// Rows written so far, header excluded.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Buffered CSV writer for external trigger events.
pub struct TriggerCsvWriter<W: Write> {
    writer: BufWriter<W>,
    rows: u64,
}

impl<W: Write> TriggerCsvWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            rows: 0,
        }
    }

    pub fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.writer, "value,id,timestamp")
    }

    pub fn write_events(&mut self, events: &[TriggerEvent]) -> io::Result<()> {
        for event in events {
            writeln!(self.writer, "{},{},{}", event.value, event.id, event.timestamp)?;
        }
        self.rows += events.len() as u64;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
