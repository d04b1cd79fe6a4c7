//! Battery state from `dumpsys battery`

use std::sync::Arc;

use serde::Serialize;

use super::DeviceTarget;
use crate::broker::ExecutionBroker;
use crate::device::Device;
use crate::error::{BridgeError, BridgeResult};

/// Charging status, as Android's `BatteryManager` codes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BatteryStatus {
    #[default]
    Unknown,
    Charging,
    Discharging,
    NotCharging,
    Full,
}

impl BatteryStatus {
    /// Unrecognized codes map to `Unknown`
    pub fn from_code(code: u32) -> Self {
        match code {
            2 => BatteryStatus::Charging,
            3 => BatteryStatus::Discharging,
            4 => BatteryStatus::NotCharging,
            5 => BatteryStatus::Full,
            _ => BatteryStatus::Unknown,
        }
    }
}

/// Battery health, as Android's `BatteryManager` codes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BatteryHealth {
    #[default]
    Unknown,
    Good,
    Overheat,
    Dead,
    OverVoltage,
    UnspecifiedFailure,
    Cold,
}

impl BatteryHealth {
    pub fn from_code(code: u32) -> Self {
        match code {
            2 => BatteryHealth::Good,
            3 => BatteryHealth::Overheat,
            4 => BatteryHealth::Dead,
            5 => BatteryHealth::OverVoltage,
            6 => BatteryHealth::UnspecifiedFailure,
            7 => BatteryHealth::Cold,
            _ => BatteryHealth::Unknown,
        }
    }
}

/// One reading of the battery service
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BatteryInfo {
    pub ac_powered: bool,
    pub usb_powered: bool,
    pub wireless_powered: bool,
    /// Microamperes
    pub max_charging_current: u64,
    /// Microvolts
    pub max_charging_voltage: u64,
    /// Microampere-hours
    pub charge_counter: u64,
    pub status: BatteryStatus,
    pub health: BatteryHealth,
    pub present: bool,
    pub level: u32,
    pub scale: u32,
    /// Volts
    pub voltage: f64,
    /// Degrees Celsius
    pub temperature: f64,
    pub technology: String,
}

fn number<T: std::str::FromStr>(key: &str, value: &str) -> BridgeResult<T> {
    value
        .parse()
        .map_err(|_| BridgeError::parse("battery state", format!("{key}: {value:?}")))
}

impl BatteryInfo {
    /// Parse `dumpsys battery` output
    pub fn parse(output: &str) -> BridgeResult<Self> {
        let mut info = BatteryInfo::default();
        let mut fields = 0;

        for line in output.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "ac powered" => info.ac_powered = value == "true",
                "usb powered" => info.usb_powered = value == "true",
                "wireless powered" => info.wireless_powered = value == "true",
                "max charging current" => info.max_charging_current = number(&key, value)?,
                "max charging voltage" => info.max_charging_voltage = number(&key, value)?,
                "charge counter" => info.charge_counter = number(&key, value)?,
                "status" => info.status = BatteryStatus::from_code(number(&key, value)?),
                "health" => info.health = BatteryHealth::from_code(number(&key, value)?),
                "present" => info.present = value == "true",
                "level" => info.level = number(&key, value)?,
                "scale" => info.scale = number(&key, value)?,
                "voltage" => info.voltage = number::<f64>(&key, value)? / 1000.0,
                "temperature" => info.temperature = number::<f64>(&key, value)? / 10.0,
                "technology" => info.technology = value.to_string(),
                _ => continue,
            }
            fields += 1;
        }

        if fields == 0 {
            return Err(BridgeError::parse("battery state", "no battery fields in output"));
        }
        Ok(info)
    }

    /// Whether any power source is connected
    pub fn is_charging(&self) -> bool {
        self.ac_powered || self.usb_powered || self.wireless_powered
    }

    /// Charge level in percent of `scale`
    pub fn percentage(&self) -> Option<f64> {
        (self.scale > 0).then(|| f64::from(self.level) * 100.0 / f64::from(self.scale))
    }
}

/// Battery of one device
pub struct Battery {
    target: DeviceTarget,
}

impl Battery {
    pub(crate) fn new(device: Arc<Device>, broker: Arc<ExecutionBroker>) -> Self {
        Self {
            target: DeviceTarget::new(device, broker),
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        self.target.device()
    }

    /// Current battery reading
    pub async fn info(&self) -> BridgeResult<BatteryInfo> {
        let output = self.target.shell_output("dumpsys", &["battery"]).await?;
        BatteryInfo::parse(&output)
    }

    pub async fn level(&self) -> BridgeResult<u32> {
        Ok(self.info().await?.level)
    }

    pub async fn is_charging(&self) -> BridgeResult<bool> {
        Ok(self.info().await?.is_charging())
    }

    pub async fn status(&self) -> BridgeResult<BatteryStatus> {
        Ok(self.info().await?.status)
    }

    pub async fn health(&self) -> BridgeResult<BatteryHealth> {
        Ok(self.info().await?.health)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMPSYS: &str = "\
Current Battery Service state:
  AC powered: false
  USB powered: true
  Wireless powered: false
  Max charging current: 500000
  Max charging voltage: 5000000
  Charge counter: 2826000
  status: 2
  health: 2
  present: true
  level: 85
  scale: 100
  voltage: 4275
  temperature: 281
  technology: Li-ion
";

    #[test]
    fn test_parse_dumpsys() {
        let info = BatteryInfo::parse(DUMPSYS).unwrap();

        assert!(info.usb_powered);
        assert!(!info.ac_powered);
        assert!(info.is_charging());
        assert_eq!(info.max_charging_current, 500_000);
        assert_eq!(info.charge_counter, 2_826_000);
        assert_eq!(info.status, BatteryStatus::Charging);
        assert_eq!(info.health, BatteryHealth::Good);
        assert_eq!(info.level, 85);
        assert!((info.voltage - 4.275).abs() < 1e-9);
        assert!((info.temperature - 28.1).abs() < 1e-9);
        assert_eq!(info.technology, "Li-ion");
        assert_eq!(info.percentage(), Some(85.0));
    }

    #[test]
    fn test_codes() {
        assert_eq!(BatteryStatus::from_code(5), BatteryStatus::Full);
        assert_eq!(BatteryStatus::from_code(42), BatteryStatus::Unknown);
        assert_eq!(BatteryHealth::from_code(7), BatteryHealth::Cold);
        assert_eq!(BatteryHealth::from_code(0), BatteryHealth::Unknown);
    }

    #[test]
    fn test_bad_output() {
        assert!(BatteryInfo::parse("/system/bin/sh: dumpsys: not found\n").is_err());
        assert!(BatteryInfo::parse("  level: high\n").is_err());
    }
}
