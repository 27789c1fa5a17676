//! Error type returned by camera sessions and their facilities.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Optional device capability that a caller tried to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Biases,
    Roi,
    TriggerOut,
    AntiFlicker,
    NoiseFilter,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Biases => "biases",
            Self::Roi => "ROI",
            Self::TriggerOut => "trigger out",
            Self::AntiFlicker => "anti-flicker module",
            Self::NoiseFilter => "noise filter module",
        };
        f.write_str(name)
    }
}

/// Broad class of a [`CameraError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input from the caller: missing device, bad file, unwritable path.
    Configuration,
    /// The session was used before being constructed, or the device is incomplete.
    Initialization,
    /// The event stream broke while acquiring.
    Runtime,
    /// The session is valid but the capability is not available.
    FeatureUnavailable,
    Io,
}

/// Errors that can occur while opening or driving a camera.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera not initialized")]
    NotInitialized,

    #[error("Camera not found: {0}")]
    CameraNotFound(String),

    #[error("Opening RAW file at {}: not an existing file", .0.display())]
    FileDoesNotExist(PathBuf),

    #[error("{} is not a regular file", .0.display())]
    NotARegularFile(PathBuf),

    #[error("Expected .raw as extension for the provided input file {}", .0.display())]
    WrongExtension(PathBuf),

    #[error("The RAW file at {} could not be read: {reason}", .path.display())]
    InvalidRawFile { path: PathBuf, reason: String },

    #[error(
        "Could not open file '{}' to record. Make sure it is a valid filename and that you have permissions to write it",
        .0.display()
    )]
    CouldNotOpenFile(PathBuf),

    #[error("Invalid bias file, line {line}: {content}")]
    InvalidBiasFile { line: usize, content: String },

    #[error("Device does not expose the required {0} facility")]
    MissingFacility(&'static str),

    #[error("Data transfer failed")]
    DataTransferFailed,

    #[error("{0} not available on this device")]
    Unsupported(Feature),

    #[error("Cannot use {0} when running from a file")]
    UnavailableFromFile(Feature),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CameraError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CameraNotFound(_)
            | Self::FileDoesNotExist(_)
            | Self::NotARegularFile(_)
            | Self::WrongExtension(_)
            | Self::InvalidRawFile { .. }
            | Self::CouldNotOpenFile(_)
            | Self::InvalidBiasFile { .. } => ErrorKind::Configuration,
            Self::NotInitialized | Self::MissingFacility(_) => ErrorKind::Initialization,
            Self::DataTransferFailed => ErrorKind::Runtime,
            Self::Unsupported(_) | Self::UnavailableFromFile(_) => ErrorKind::FeatureUnavailable,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}
