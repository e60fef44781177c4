/*!
 * Bluetooth Object Model
 * The applet's view of BlueZ adapters and devices
 */

pub mod cache;
pub mod manager;
pub mod rfkill;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use cache::DeviceCache;
pub use manager::BluetoothManager;

pub const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";
pub const DEVICE_INTERFACE: &str = "org.bluez.Device1";

/// D-Bus object path of an adapter or device, e.g. `/org/bluez/hci0/dev_00_11_22_33_44_55`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectPath {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}

impl From<String> for ObjectPath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

impl AsRef<str> for ObjectPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Loosely typed BlueZ property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Strings(Vec<String>),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Adapter,
    Device,
}

impl ObjectKind {
    pub fn from_interface(interface: &str) -> Option<Self> {
        match interface {
            ADAPTER_INTERFACE => Some(ObjectKind::Adapter),
            DEVICE_INTERFACE => Some(ObjectKind::Device),
            _ => None,
        }
    }
}

/// A cached adapter or device with its last known properties.
#[derive(Debug, Clone, PartialEq)]
pub struct BluezObject {
    pub path: ObjectPath,
    pub kind: ObjectKind,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl BluezObject {
    pub fn new(path: impl Into<ObjectPath>, kind: ObjectKind) -> Self {
        Self {
            path: path.into(),
            kind,
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Missing or non-boolean properties read as `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(PropertyValue::as_bool).unwrap_or(false)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(PropertyValue::as_int)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropertyValue::as_str)
    }

    pub fn alias(&self) -> &str {
        self.text("Alias")
            .or_else(|| self.text("Name"))
            .unwrap_or_else(|| self.path.as_str())
    }

    /// Owning adapter of a device.
    pub fn adapter(&self) -> Option<ObjectPath> {
        self.text("Adapter").map(ObjectPath::from)
    }
}

/// Raw change reported by the BlueZ watcher.
#[derive(Debug, Clone, PartialEq)]
pub enum BluezUpdate {
    /// Full resync after the daemon (re)appears.
    Snapshot(Vec<BluezObject>),
    ObjectAdded(BluezObject),
    ObjectRemoved { path: ObjectPath, kind: ObjectKind },
    PropertiesChanged {
        path: ObjectPath,
        kind: ObjectKind,
        changed: Vec<(String, PropertyValue)>,
    },
    /// `org.bluez` gained or lost its bus owner.
    ManagerState(bool),
}
