//! Device sessions and the providers that open them.

use crate::error::CameraError;
use crate::raw_file::{self, RawFileConfig};
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// An opened device: a set of facilities keyed by their capability type.
///
/// ```
/// use std::sync::Arc;
/// use evcam_core::device::Device;
/// use evcam_core::facility::Geometry;
/// use evcam_core::types::SensorGeometry;
///
/// struct Fixed;
/// impl Geometry for Fixed {
///     fn geometry(&self) -> SensorGeometry {
///         SensorGeometry { width: 640, height: 480 }
///     }
/// }
///
/// let mut device = Device::new();
/// device.add_facility::<dyn Geometry>(Arc::new(Fixed));
/// assert_eq!(device.facility::<dyn Geometry>().unwrap().geometry().width, 640);
/// ```
#[derive(Default)]
pub struct Device {
    facilities: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Device {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `facility` under capability `T`, replacing any previous one.
    pub fn add_facility<T>(&mut self, facility: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.facilities.insert(TypeId::of::<T>(), Box::new(facility));
    }

    pub fn with_facility<T>(mut self, facility: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.add_facility(facility);
        self
    }

    /// Looks up capability `T`. Absence is a normal outcome.
    pub fn facility<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.facilities
            .get(&TypeId::of::<T>())
            .and_then(|f| f.downcast_ref::<Arc<T>>())
            .cloned()
    }

    pub fn has_facility<T>(&self) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.facilities.contains_key(&TypeId::of::<T>())
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("facilities", &self.facilities.len())
            .finish()
    }
}

/// Physical link of a discovered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Mipi,
    Usb,
    Network,
}

/// Online source categories, in the order cameras are picked by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OnlineSourceType {
    Embedded,
    Usb,
    Remote,
}

impl From<ConnectionType> for OnlineSourceType {
    fn from(connection: ConnectionType) -> Self {
        match connection {
            ConnectionType::Mipi => Self::Embedded,
            ConnectionType::Usb => Self::Usb,
            ConnectionType::Network => Self::Remote,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub serial: String,
    pub connection: ConnectionType,
}

/// Serials of connected cameras grouped by source type, each list sorted.
pub type AvailableSources = BTreeMap<OnlineSourceType, Vec<String>>;

/// Finds and opens devices. Implemented by hardware plugins.
pub trait DeviceDiscovery {
    fn list_available_sources(&self) -> Vec<SourceInfo>;

    fn open(&self, serial: &str) -> Option<Device>;

    /// Opens a recording. The default reads EVT 3.0 RAW files.
    fn open_raw_file(&self, path: &Path, config: &RawFileConfig) -> Result<Device, CameraError> {
        raw_file::open(path, config)
    }
}

/// Provider with no hardware attached: only recordings can be opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileOnlyDiscovery;

impl DeviceDiscovery for FileOnlyDiscovery {
    fn list_available_sources(&self) -> Vec<SourceInfo> {
        Vec::new()
    }

    fn open(&self, _serial: &str) -> Option<Device> {
        None
    }
}

/// Groups the sources reported by `discovery` by type, with sorted serials.
pub fn list_online_sources(discovery: &dyn DeviceDiscovery) -> AvailableSources {
    let mut sources = AvailableSources::new();
    for source in discovery.list_available_sources() {
        sources
            .entry(source.connection.into())
            .or_default()
            .push(source.serial);
    }
    for serials in sources.values_mut() {
        serials.sort();
    }
    sources
}
