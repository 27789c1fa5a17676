//! Event and status types shared by the camera session and its facilities.

use std::fmt;

/// Timestamp in microseconds, as reported by the sensor clock.
pub type Timestamp = u64;

/// Identifier returned when registering a callback on a camera.
///
/// Identifiers are unique per camera across every callback kind.
pub type CallbackId = u64;

/// A decoded Change Detection (CD) event.
///
/// CD events represent brightness changes detected by the event camera sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct CdEvent {
    /// X coordinate of the pixel
    pub x: u16,
    /// Y coordinate of the pixel
    pub y: u16,
    /// Event polarity: 0 = OFF (decrease), 1 = ON (increase in brightness)
    pub polarity: u8,
    /// Timestamp in microseconds
    pub timestamp: Timestamp,
}

impl CdEvent {
    #[inline]
    pub fn new(x: u16, y: u16, polarity: u8, timestamp: Timestamp) -> Self {
        Self {
            x,
            y,
            polarity,
            timestamp,
        }
    }
}

/// An external trigger event: an edge detected on a trigger input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct TriggerEvent {
    /// Edge polarity: 0 = falling edge, 1 = rising edge
    pub value: u8,
    /// Trigger channel ID
    pub id: u8,
    /// Timestamp in microseconds
    pub timestamp: Timestamp,
}

impl TriggerEvent {
    #[inline]
    pub fn new(value: u8, id: u8, timestamp: Timestamp) -> Self {
        Self {
            value,
            id,
            timestamp,
        }
    }
}

/// Sensor array size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorGeometry {
    pub width: u32,
    pub height: u32,
}

impl Default for SensorGeometry {
    fn default() -> Self {
        // Gen4 sensor geometry
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Public-facing streaming state reported to status-change callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStatus {
    Started,
    Stopped,
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => f.write_str("started"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Version of the sensor a camera or recording was produced with.
///
/// Generations are ordered by major then minor version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CameraGeneration {
    pub major: u16,
    pub minor: u16,
}

impl CameraGeneration {
    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for CameraGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Static description of an opened camera.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraConfiguration {
    pub serial_number: String,
}
