//! Per-connection device state.
//!
//! `DeviceInfo` mirrors what the device has confirmed (oper side) and what
//! the caller intends (config side), keyed by row class and logical key.
//! Rows reference rows (locator refs, logical-switch refs); references are
//! stored as keys, never as owning pointers, so the cyclic row graph stays
//! representable. The dependency queue holds mutation jobs until their
//! referenced rows become available.

mod info;
mod queue;

pub use info::{
    DeviceData, DeviceDataStatus, DeviceInfo, RemoteMcastMac, RemoteUcastMac,
};
pub use queue::{DependencyQueue, DependentJob};

use std::fmt;

/// The row classes tracked by the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowClass {
    LogicalSwitch,
    PhysicalSwitch,
    PhysicalLocator,
    PhysicalPort,
    Tunnel,
    RemoteUcastMac,
    RemoteMcastMac,
    LocalUcastMac,
    LocalMcastMac,
}

impl RowClass {
    pub fn as_str(self) -> &'static str {
        match self {
            RowClass::LogicalSwitch => "logical_switch",
            RowClass::PhysicalSwitch => "physical_switch",
            RowClass::PhysicalLocator => "physical_locator",
            RowClass::PhysicalPort => "physical_port",
            RowClass::Tunnel => "tunnel",
            RowClass::RemoteUcastMac => "remote_ucast_mac",
            RowClass::RemoteMcastMac => "remote_mcast_mac",
            RowClass::LocalUcastMac => "local_ucast_mac",
            RowClass::LocalMcastMac => "local_mcast_mac",
        }
    }
}

impl fmt::Display for RowClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logical row identifier, opaque to the registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey(String);

impl DeviceKey {
    pub fn new(key: impl Into<String>) -> Self {
        DeviceKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceKey {
    fn from(key: &str) -> Self {
        DeviceKey(key.to_string())
    }
}

impl From<String> for DeviceKey {
    fn from(key: String) -> Self {
        DeviceKey(key)
    }
}
