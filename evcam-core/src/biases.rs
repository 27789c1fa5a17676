//! Sensor bias access and persistence.
//!
//! Bias files hold one `value % name` entry per line; lines starting with
//! `%` are comments.

use crate::error::CameraError;
use crate::facility::LlBiases;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub struct Biases {
    facility: Arc<dyn LlBiases>,
}

impl Biases {
    pub fn new(facility: Arc<dyn LlBiases>) -> Self {
        Self { facility }
    }

    pub fn set(&self, name: &str, value: i32) -> bool {
        self.facility.set(name, value)
    }

    pub fn get(&self, name: &str) -> Option<i32> {
        self.facility.get(name)
    }

    pub fn all(&self) -> BTreeMap<String, i32> {
        self.facility.all()
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), CameraError> {
        let contents = format_biases(&self.all());
        fs::write(path, contents)?;
        debug!(path = %path.display(), "Saved biases");
        Ok(())
    }

    /// Applies every bias listed in `path`. Returns the names the device rejected.
    pub fn load_from_file(&self, path: &Path) -> Result<Vec<String>, CameraError> {
        let contents = fs::read_to_string(path)?;
        let rejected = parse_biases(&contents)?
            .into_iter()
            .filter(|(name, value)| !self.set(name, *value))
            .map(|(name, _)| name)
            .collect();
        Ok(rejected)
    }
}

fn format_biases(biases: &BTreeMap<String, i32>) -> String {
    let mut out = String::new();
    for (name, value) in biases {
        let _ = writeln!(out, "{value:<8}% {name}");
    }
    out
}

fn parse_biases(contents: &str) -> Result<Vec<(String, i32)>, CameraError> {
    let mut biases = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('%') {
            continue;
        }

        let invalid = || CameraError::InvalidBiasFile {
            line: index + 1,
            content: line.to_string(),
        };
        let (value, name) = line.split_once('%').ok_or_else(invalid)?;
        let value = value.trim().parse().map_err(|_| invalid())?;
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid());
        }
        biases.push((name.to_string(), value));
    }
    Ok(biases)
}
