//! IPv4 device addresses
//!
//! Devices connected over TCP/IP are identified by address and port. A port
//! of zero means "the adb default", 5555.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{BridgeError, BridgeResult};

/// Port adbd listens on in TCP/IP mode
pub const ADB_DEFAULT_PORT: u16 = 5555;

static IP4_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[0-9]{1,3}\.){3}[0-9]{1,3}(?::[0-9]{1,5})?$").expect("valid IPv4 pattern")
});

/// IPv4 address plus port of a TCP-connected device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Ip4Address {
    ip: Ipv4Addr,
    port: u16,
}

impl Ip4Address {
    /// Build from an address string; port 0 selects the default port
    pub fn from_address(address: &str, port: u16) -> BridgeResult<Self> {
        let ip = address
            .parse::<Ipv4Addr>()
            .map_err(|_| BridgeError::InvalidAddress(address.to_string()))?;
        Ok(Self::from_ip(ip, port))
    }

    pub fn from_ip(ip: Ipv4Addr, port: u16) -> Self {
        let port = if port == 0 { ADB_DEFAULT_PORT } else { port };
        Self { ip, port }
    }

    /// Whether `candidate` looks like `a.b.c.d` or `a.b.c.d:port`
    pub fn is_ip4_address(candidate: &str) -> bool {
        IP4_PATTERN.is_match(candidate)
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn octets(&self) -> [u8; 4] {
        self.ip.octets()
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for Ip4Address {
    type Err = BridgeError;

    /// Parse `a.b.c.d` or `a.b.c.d:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::is_ip4_address(s) {
            return Err(BridgeError::InvalidAddress(s.to_string()));
        }

        match s.split_once(':') {
            Some((address, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| BridgeError::InvalidAddress(s.to_string()))?;
                Self::from_address(address, port)
            }
            None => Self::from_address(s, 0),
        }
    }
}

impl fmt::Display for Ip4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_port_means_default() {
        let addr = Ip4Address::from_address("192.168.1.5", 0).unwrap();
        assert_eq!(addr.port(), ADB_DEFAULT_PORT);
        assert_eq!(addr.to_string(), "192.168.1.5:5555");
    }

    #[test]
    fn test_explicit_port() {
        let addr = Ip4Address::from_address("10.0.0.2", 5037).unwrap();
        assert_eq!(addr.to_string(), "10.0.0.2:5037");
        assert_eq!(addr.octets(), [10, 0, 0, 2]);
    }

    #[test]
    fn test_parse() {
        let addr: Ip4Address = "192.168.1.5:40001".parse().unwrap();
        assert_eq!(addr.port(), 40001);

        let addr: Ip4Address = "192.168.200.250".parse().unwrap();
        assert_eq!(addr.to_string(), "192.168.200.250:5555");
    }

    #[test]
    fn test_rejects_non_addresses() {
        assert!(!Ip4Address::is_ip4_address("emulator-5554"));
        assert!(!Ip4Address::is_ip4_address("R58M12ABCDE"));
        assert!("300.1.1.1".parse::<Ip4Address>().is_err());
        assert!("1.2.3.4:99999".parse::<Ip4Address>().is_err());
        assert!(Ip4Address::from_address("localhost", 0).is_err());
    }
}
