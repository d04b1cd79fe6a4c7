//! Device Types and State
//!
//! A `Device` is identified either by its USB serial number or by the
//! IPv4 address and port it is connected through. Instances are created
//! and updated only by the registry, so every holder of an `Arc<Device>`
//! observes state changes made by later discovery passes.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::address::Ip4Address;
use crate::broker::ExecutionBroker;
use crate::features::{Battery, BusyBox, BuildProp, FileSystem, PackageManager, SuperUser};

/// Connection state as reported by `adb devices`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    /// State token not recognized
    Unknown,
    /// Device is offline
    Offline,
    /// Device is not authorized (need to accept on device)
    Unauthorized,
    /// Device is online and ready (`device` in the tool's output)
    Online,
    /// Device is in recovery mode
    Recovery,
    /// Device is in bootloader mode
    Bootloader,
    /// Authorization prompt is pending on the device
    Authorizing,
}

impl DeviceState {
    /// Map a state token exactly as the tool emits it
    pub fn from_token(token: &str) -> Self {
        match token {
            "device" => DeviceState::Online,
            "offline" => DeviceState::Offline,
            "unauthorized" => DeviceState::Unauthorized,
            "recovery" => DeviceState::Recovery,
            "bootloader" => DeviceState::Bootloader,
            "authorizing" => DeviceState::Authorizing,
            _ => DeviceState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Unknown => "unknown",
            DeviceState::Offline => "offline",
            DeviceState::Unauthorized => "unauthorized",
            DeviceState::Online => "device",
            DeviceState::Recovery => "recovery",
            DeviceState::Bootloader => "bootloader",
            DeviceState::Authorizing => "authorizing",
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, DeviceState::Online)
    }

    /// Why commands may not target a device in this state, if they may not
    pub fn targeting_restriction(&self) -> Option<&'static str> {
        match self {
            DeviceState::Offline => Some("commands cannot target offline devices"),
            DeviceState::Unauthorized => Some("host must be authorized by the device first"),
            DeviceState::Unknown => Some("device is in an unrecognized state"),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique key of a device
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DeviceIdentity {
    /// USB serial number (emulators report `emulator-<port>` here too)
    Usb(String),
    /// TCP/IP connection
    Tcp(Ip4Address),
}

impl DeviceIdentity {
    /// Classify a raw identity token from the device list
    pub fn parse(token: &str) -> Self {
        if Ip4Address::is_ip4_address(token) {
            if let Ok(address) = token.parse() {
                return DeviceIdentity::Tcp(address);
            }
        }
        DeviceIdentity::Usb(token.to_string())
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self, DeviceIdentity::Tcp(_))
    }
}

impl fmt::Display for DeviceIdentity {
    /// The value passed after the targeting flag
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceIdentity::Usb(serial) => f.write_str(serial),
            DeviceIdentity::Tcp(address) => address.fmt(f),
        }
    }
}

impl From<Ip4Address> for DeviceIdentity {
    fn from(address: Ip4Address) -> Self {
        DeviceIdentity::Tcp(address)
    }
}

/// Mutable part of a device, replaced wholesale on rediscovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeviceDetails {
    pub state: DeviceState,
    pub product: String,
    pub model: String,
    pub device_name: String,
    pub transport_id: Option<u32>,
}

/// A known Android device
#[derive(Debug)]
pub struct Device {
    identity: DeviceIdentity,
    details: RwLock<DeviceDetails>,
}

impl Device {
    pub(crate) fn new(identity: DeviceIdentity, details: DeviceDetails) -> Self {
        Self {
            identity,
            details: RwLock::new(details),
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn state(&self) -> DeviceState {
        self.details.read().state
    }

    pub fn product(&self) -> String {
        self.details.read().product.clone()
    }

    pub fn model(&self) -> String {
        self.details.read().model.clone()
    }

    pub fn device_name(&self) -> String {
        self.details.read().device_name.clone()
    }

    pub fn transport_id(&self) -> Option<u32> {
        self.details.read().transport_id
    }

    /// USB serial number, if connected over USB
    pub fn serial(&self) -> Option<&str> {
        match &self.identity {
            DeviceIdentity::Usb(serial) => Some(serial),
            DeviceIdentity::Tcp(_) => None,
        }
    }

    /// IPv4 address, if connected over TCP/IP
    pub fn address(&self) -> Option<&Ip4Address> {
        match &self.identity {
            DeviceIdentity::Tcp(address) => Some(address),
            DeviceIdentity::Usb(_) => None,
        }
    }

    pub fn is_connected_via_tcp(&self) -> bool {
        self.identity.is_tcp()
    }

    pub fn is_emulator(&self) -> bool {
        self.serial().is_some_and(|s| s.starts_with("emulator-"))
    }

    pub fn is_usable(&self) -> bool {
        self.state().is_usable()
    }

    /// Get display name
    pub fn display_name(&self) -> String {
        let model = self.model();
        if model.is_empty() {
            self.identity.to_string()
        } else {
            format!("{} ({})", model.replace('_', " "), self.identity)
        }
    }

    pub(crate) fn set_state(&self, state: DeviceState) -> DeviceState {
        std::mem::replace(&mut self.details.write().state, state)
    }

    pub(crate) fn update(&self, details: DeviceDetails) -> DeviceState {
        std::mem::replace(&mut *self.details.write(), details).state
    }

    /// Point-in-time copy for display and serialization
    pub fn summary(&self) -> DeviceSummary {
        let details = self.details.read();
        DeviceSummary {
            identity: self.identity.to_string(),
            connection: if self.identity.is_tcp() { "tcp" } else { "usb" },
            state: details.state,
            product: details.product.clone(),
            model: details.model.clone(),
            device_name: details.device_name.clone(),
            transport_id: details.transport_id,
        }
    }

    pub fn battery(self: &Arc<Self>, broker: &Arc<ExecutionBroker>) -> Battery {
        Battery::new(Arc::clone(self), Arc::clone(broker))
    }

    pub fn build_prop(self: &Arc<Self>, broker: &Arc<ExecutionBroker>) -> BuildProp {
        BuildProp::new(Arc::clone(self), Arc::clone(broker))
    }

    pub fn file_system(self: &Arc<Self>, broker: &Arc<ExecutionBroker>) -> FileSystem {
        FileSystem::new(Arc::clone(self), Arc::clone(broker))
    }

    pub fn package_manager(self: &Arc<Self>, broker: &Arc<ExecutionBroker>) -> PackageManager {
        PackageManager::new(Arc::clone(self), Arc::clone(broker))
    }

    pub fn super_user(self: &Arc<Self>, broker: &Arc<ExecutionBroker>) -> SuperUser {
        SuperUser::new(Arc::clone(self), Arc::clone(broker))
    }

    pub fn busybox(self: &Arc<Self>, broker: &Arc<ExecutionBroker>) -> BusyBox {
        BusyBox::new(Arc::clone(self), Arc::clone(broker))
    }
}

/// Serializable snapshot of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub identity: String,
    pub connection: &'static str,
    pub state: DeviceState,
    pub product: String,
    pub model: String,
    pub device_name: String,
    pub transport_id: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(state: DeviceState) -> DeviceDetails {
        DeviceDetails {
            state,
            product: "sdk_gphone64".into(),
            model: "Pixel_7".into(),
            device_name: "emu64".into(),
            transport_id: None,
        }
    }

    #[test]
    fn test_state_tokens() {
        assert_eq!(DeviceState::from_token("device"), DeviceState::Online);
        assert_eq!(DeviceState::from_token("unauthorized"), DeviceState::Unauthorized);
        assert_eq!(DeviceState::from_token("authorizing"), DeviceState::Authorizing);
        // Tokens are case-sensitive
        assert_eq!(DeviceState::from_token("Device"), DeviceState::Unknown);
        assert_eq!(DeviceState::from_token("sideload"), DeviceState::Unknown);

        for state in [DeviceState::Online, DeviceState::Recovery, DeviceState::Bootloader] {
            assert_eq!(DeviceState::from_token(state.as_str()), state);
        }
    }

    #[test]
    fn test_targeting_restrictions() {
        assert!(DeviceState::Offline.targeting_restriction().is_some());
        assert!(DeviceState::Unauthorized.targeting_restriction().is_some());
        assert!(DeviceState::Unknown.targeting_restriction().is_some());
        assert!(DeviceState::Online.targeting_restriction().is_none());
        assert!(DeviceState::Bootloader.targeting_restriction().is_none());
        assert!(DeviceState::Recovery.targeting_restriction().is_none());
    }

    #[test]
    fn test_identity_classification() {
        assert_eq!(
            DeviceIdentity::parse("emulator-5554"),
            DeviceIdentity::Usb("emulator-5554".into())
        );

        let tcp = DeviceIdentity::parse("192.168.1.5:5555");
        assert!(tcp.is_tcp());
        assert_eq!(tcp.to_string(), "192.168.1.5:5555");

        // Out-of-range octets are not an address, keep the raw token
        assert!(!DeviceIdentity::parse("999.1.1.1").is_tcp());
    }

    #[test]
    fn test_device_accessors() {
        let device = Device::new(
            DeviceIdentity::Usb("emulator-5554".into()),
            details(DeviceState::Online),
        );
        assert!(device.is_emulator());
        assert!(device.is_usable());
        assert_eq!(device.serial(), Some("emulator-5554"));
        assert!(device.address().is_none());
        assert_eq!(device.display_name(), "Pixel 7 (emulator-5554)");

        let previous = device.set_state(DeviceState::Offline);
        assert_eq!(previous, DeviceState::Online);
        assert!(!device.is_usable());
    }

    #[test]
    fn test_summary() {
        let address = Ip4Address::from_address("10.0.0.7", 0).unwrap();
        let device = Device::new(address.into(), details(DeviceState::Recovery));
        let summary = device.summary();
        assert_eq!(summary.identity, "10.0.0.7:5555");
        assert_eq!(summary.connection, "tcp");
        assert_eq!(summary.state, DeviceState::Recovery);
    }
}
