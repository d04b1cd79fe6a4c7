//! System properties via `getprop` / `setprop`

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::{shell_quote, DeviceTarget};
use crate::broker::ExecutionBroker;
use crate::device::Device;
use crate::error::{BridgeError, BridgeResult};

/// `[key]: [value]` as printed by a bare `getprop`
static PROPERTY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(?P<key>[^\]]+)\]:\s*\[(?P<value>.*)\]$").expect("valid getprop pattern"));

const RELEASE_KEY: &str = "ro.build.version.release";
const SDK_KEY: &str = "ro.build.version.sdk";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildProperty {
    pub key: String,
    pub value: String,
}

impl BuildProperty {
    /// Parse the full `getprop` listing; lines that are not properties are skipped
    pub fn parse_listing(output: &str) -> Vec<BuildProperty> {
        output
            .lines()
            .filter_map(|line| PROPERTY_LINE.captures(line.trim()))
            .map(|caps| BuildProperty {
                key: caps["key"].to_string(),
                value: caps["value"].to_string(),
            })
            .collect()
    }
}

/// Build properties of one device
pub struct BuildProp {
    target: DeviceTarget,
}

impl BuildProp {
    pub(crate) fn new(device: Arc<Device>, broker: Arc<ExecutionBroker>) -> Self {
        Self {
            target: DeviceTarget::new(device, broker),
        }
    }

    pub async fn properties(&self) -> BridgeResult<Vec<BuildProperty>> {
        let output = self.target.shell_checked("getprop", &[]).await?;
        Ok(BuildProperty::parse_listing(&output))
    }

    /// Single property; unset properties read as `None`
    pub async fn property(&self, key: &str) -> BridgeResult<Option<String>> {
        let key = shell_quote(key);
        let output = self.target.shell_checked("getprop", &[key.as_str()]).await?;
        let value = output.trim();
        Ok((!value.is_empty()).then(|| value.to_string()))
    }

    pub async fn set_property(&self, key: &str, value: &str) -> BridgeResult<()> {
        let (key, value) = (shell_quote(key), shell_quote(value));
        self.target
            .shell_checked("setprop", &[key.as_str(), value.as_str()])
            .await?;
        Ok(())
    }

    /// Android release, e.g. `14`
    pub async fn android_version(&self) -> BridgeResult<Option<String>> {
        self.property(RELEASE_KEY).await
    }

    /// API level
    pub async fn sdk_version(&self) -> BridgeResult<u32> {
        let value = self
            .property(SDK_KEY)
            .await?
            .ok_or_else(|| BridgeError::parse("sdk version", format!("{SDK_KEY} is not set")))?;
        value
            .parse()
            .map_err(|_| BridgeError::parse("sdk version", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use crate::testing::{retry_busy, FakeBridge};

    #[test]
    fn test_parse_listing() {
        let output = "\
[dalvik.vm.heapsize]: [512m]
[ro.build.fingerprint]: [google/sdk_gphone64_x86_64/emu64xa:14/UE1A.230829.036/10788291:user/release-keys]
[ro.build.version.sdk]: [34]
[persist.sys.empty]: []
garbage line
";
        let props = BuildProperty::parse_listing(output);
        assert_eq!(props.len(), 4);
        assert_eq!(props[0].key, "dalvik.vm.heapsize");
        assert_eq!(props[0].value, "512m");
        // Values may contain colons
        assert!(props[1].value.contains(":user/"));
        assert_eq!(props[2].value, "34");
        assert_eq!(props[3].value, "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_set_property_with_spaces() {
        let bridge = FakeBridge::new();
        let props = bridge.device("R58M").build_prop(&bridge.broker);

        retry_busy(|| props.set_property("persist.sys.locale", "en US")).await.unwrap();
        props.set_property("persist.sys.motd", "it's $HOME").await.unwrap();

        assert_eq!(props.property("persist.sys.locale").await.unwrap().as_deref(), Some("en US"));
        assert_eq!(props.property("persist.sys.motd").await.unwrap().as_deref(), Some("it's $HOME"));
        assert_eq!(props.property("persist.sys.unset").await.unwrap(), None);

        let listing = props.properties().await.unwrap();
        assert!(listing.contains(&BuildProperty {
            key: "persist.sys.locale".into(),
            value: "en US".into(),
        }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_getprop_is_an_error() {
        let bridge = FakeBridge::new();
        let props = bridge.device("R58M").build_prop(&bridge.broker);
        std::fs::write(bridge.root().join("getprop-fails"), "").unwrap();

        let err = retry_busy(|| props.property(SDK_KEY)).await.unwrap_err();
        match err {
            BridgeError::CommandFailed { output, .. } => {
                assert!(output.contains("property service unavailable"))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(props.properties().await.is_err());
        assert!(props.sdk_version().await.is_err());
    }
}
