//! Device Discovery
//!
//! Parses the verbose device list and feeds the registry. Each line has
//! five leading fields, optionally followed by extra `key:value` tokens:
//!
//! ```text
//! List of devices attached
//! emulator-5554  device product:sdk_gphone64 model:Pixel_7 device:emu64 transport_id:1
//! 1d36d8f1       device usb:1-4 product:OnePlus6 model:ONEPLUS_A6000 device:OnePlus6
//! ```
//!
//! The `usb:` bus path of USB-attached devices is skipped.
//!
//! A malformed line is rejected on its own; the rest of the listing is
//! still applied.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::broker::ExecutionBroker;
use crate::command::Command;
use crate::device::{Device, DeviceIdentity, DeviceState};
use crate::error::{BridgeError, BridgeResult};
use crate::registry::{DeviceObservation, DeviceRegistry};

const PRODUCT_KEY: &str = "product:";
const MODEL_KEY: &str = "model:";
const DEVICE_KEY: &str = "device:";
const TRANSPORT_ID_KEY: &str = "transport_id";
const USB_KEY: &str = "usb:";

/// What one discovery pass changed
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Devices listed in this pass, in listing order
    pub updated: Vec<Arc<Device>>,
    /// Lines that did not match the expected layout
    pub rejected: Vec<BridgeError>,
    /// Known devices missing from the listing, now offline
    pub stale: Vec<Arc<Device>>,
}

fn is_ignored(line: &str) -> bool {
    line.is_empty()
        || line.starts_with('*')
        || line.get(..4).is_some_and(|head| head.eq_ignore_ascii_case("list"))
}

fn is_field_token(token: &str) -> bool {
    token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '-' | '_'))
}

/// Parse one line of `devices -l` output
///
/// Returns `Ok(None)` for blank, header and daemon status lines.
pub fn parse_device_line(line: &str) -> BridgeResult<Option<DeviceObservation>> {
    let line = line.trim();
    if is_ignored(line) {
        return Ok(None);
    }

    let malformed = || BridgeError::MalformedDeviceLine {
        line: line.to_string(),
    };

    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    // USB-attached devices carry their bus path before the product field
    if tokens.get(2).is_some_and(|token| token.starts_with(USB_KEY)) {
        tokens.remove(2);
    }

    let [identity, state, product, model, device_name, extra @ ..] = tokens.as_slice() else {
        return Err(malformed());
    };

    if !tokens[..5].iter().all(|token| is_field_token(token)) {
        return Err(malformed());
    }

    let product = product.strip_prefix(PRODUCT_KEY).ok_or_else(malformed)?;
    let model = model.strip_prefix(MODEL_KEY).ok_or_else(malformed)?;
    let device_name = device_name.strip_prefix(DEVICE_KEY).ok_or_else(malformed)?;

    let transport_id = extra
        .iter()
        .filter_map(|token| token.split_once(':'))
        .find(|(key, _)| *key == TRANSPORT_ID_KEY)
        .and_then(|(_, value)| value.parse().ok());

    Ok(Some(DeviceObservation {
        identity: DeviceIdentity::parse(identity),
        state: DeviceState::from_token(state),
        product: product.to_string(),
        model: model.to_string(),
        device_name: device_name.to_string(),
        transport_id,
    }))
}

/// Apply a full device listing to `registry`
pub fn ingest_listing(registry: &DeviceRegistry, listing: &str) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();
    let mut seen = HashSet::new();

    for line in listing.lines() {
        match parse_device_line(line) {
            Ok(Some(observation)) => {
                debug!("Parsed device line: {:?}", observation);
                seen.insert(observation.identity.clone());
                report.updated.push(registry.upsert(observation));
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Skipping device line: {}", e);
                // Still listed, so not stale
                if let Some(token) = line.split_whitespace().next() {
                    seen.insert(DeviceIdentity::parse(token));
                }
                report.rejected.push(e);
            }
        }
    }

    report.stale = registry.mark_absent(&seen);
    report
}

/// Run `devices -l` through the broker and update its registry
///
/// A listing that failed or timed out leaves the registry untouched.
pub async fn refresh(broker: &ExecutionBroker) -> BridgeResult<DiscoveryReport> {
    let output = broker.run_checked(&Command::list_devices_long()).await?;

    let report = ingest_listing(broker.registry(), &output);
    info!(
        "Discovery: {} listed, {} rejected, {} went offline",
        report.updated.len(),
        report.rejected.len(),
        report.stale.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emulator_line() {
        let observation = parse_device_line("emulator-5554 device product:sdk model:Pixel device:generic_x86")
            .unwrap()
            .unwrap();

        assert_eq!(observation.identity, DeviceIdentity::Usb("emulator-5554".into()));
        assert_eq!(observation.state, DeviceState::Online);
        assert_eq!(observation.product, "sdk");
        assert_eq!(observation.model, "Pixel");
        assert_eq!(observation.device_name, "generic_x86");
        assert_eq!(observation.transport_id, None);
    }

    #[test]
    fn test_tcp_line_with_transport_id() {
        let observation = parse_device_line(
            "192.168.1.5:5555       device product:walleye model:Pixel_2 device:walleye transport_id:3",
        )
        .unwrap()
        .unwrap();

        assert!(observation.identity.is_tcp());
        assert_eq!(observation.identity.to_string(), "192.168.1.5:5555");
        assert_eq!(observation.transport_id, Some(3));
    }

    #[test]
    fn test_usb_bus_path_is_skipped() {
        let observation = parse_device_line(
            "1d36d8f1               device usb:1-4 product:OnePlus6 model:ONEPLUS_A6000 device:OnePlus6 transport_id:2",
        )
        .unwrap()
        .unwrap();

        assert_eq!(observation.identity, DeviceIdentity::Usb("1d36d8f1".into()));
        assert_eq!(observation.product, "OnePlus6");
        assert_eq!(observation.model, "ONEPLUS_A6000");
        assert_eq!(observation.device_name, "OnePlus6");
        assert_eq!(observation.transport_id, Some(2));
    }

    #[test]
    fn test_ignored_lines() {
        for line in [
            "",
            "   ",
            "List of devices attached",
            "list of devices attached",
            "* daemon not running; starting now at tcp:5037",
            "* daemon started successfully",
        ] {
            assert!(parse_device_line(line).unwrap().is_none(), "{line:?}");
        }
    }

    #[test]
    fn test_malformed_lines() {
        for line in [
            "R58M unauthorized usb:1-1 transport_id:2",
            "emulator-5554 device model:Pixel product:sdk device:generic_x86",
            "emulator-5554 device product:sdk model:Pix#el device:generic_x86",
        ] {
            let err = parse_device_line(line).unwrap_err();
            assert!(matches!(err, BridgeError::MalformedDeviceLine { .. }), "{line:?}");
        }
    }

    #[test]
    fn test_unrecognized_state_is_unknown() {
        let observation = parse_device_line("0A1B sideload product:a model:b device:c")
            .unwrap()
            .unwrap();
        assert_eq!(observation.state, DeviceState::Unknown);
    }

    #[test]
    fn test_one_bad_line_does_not_abort() {
        let registry = DeviceRegistry::new();
        let listing = "\
List of devices attached
emulator-5554 device product:sdk model:Pixel device:generic_x86
emulator-5556 device product sdk model Pixel
192.168.1.5:5555 offline product:walleye model:Pixel_2 device:walleye
R58M recovery product:r8q model:SM_G780F device:r8q
";

        let report = ingest_listing(&registry, listing);
        assert_eq!(report.updated.len(), 3);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(registry.len(), 3);

        let emulator = registry.lookup_str("emulator-5554").unwrap();
        assert_eq!(emulator.state(), DeviceState::Online);
        assert_eq!(emulator.product(), "sdk");
        assert_eq!(emulator.model(), "Pixel");
        assert!(!emulator.is_connected_via_tcp());
    }

    #[test]
    fn test_repeated_passes_reuse_instances() {
        let registry = DeviceRegistry::new();
        let first = ingest_listing(&registry, "emulator-5554 device product:sdk model:Pixel device:x86\n");
        let second = ingest_listing(&registry, "emulator-5554 offline product:sdk model:Pixel device:x86\n");

        assert!(Arc::ptr_eq(&first.updated[0], &second.updated[0]));
        assert_eq!(first.updated[0].state(), DeviceState::Offline);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_devices_go_stale() {
        let registry = DeviceRegistry::new();
        ingest_listing(
            &registry,
            "a device product:p model:m device:d\nb device product:p model:m device:d\n",
        );

        let report = ingest_listing(&registry, "a device product:p model:m device:d\n");
        assert_eq!(report.stale.len(), 1);
        assert_eq!(report.stale[0].identity().to_string(), "b");
        assert_eq!(registry.lookup_str("b").unwrap().state(), DeviceState::Offline);
    }

    #[test]
    fn test_rejected_line_is_not_stale() {
        let registry = DeviceRegistry::new();
        ingest_listing(&registry, "R58M device product:r8q model:SM_G780F device:r8q\n");

        let report = ingest_listing(&registry, "R58M unauthorized usb:1-1 transport_id:2\n");
        assert!(report.stale.is_empty());
        assert_eq!(report.rejected.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_refresh_through_broker() {
        use crate::toolchain::ToolLocator;

        let dir = tempfile::tempdir().unwrap();
        // `/bin/sh devices -l` runs `<scratch>/devices` as a script
        std::fs::write(
            dir.path().join("devices"),
            "cat <<'EOF'\n\
             * daemon started successfully\n\
             List of devices attached\n\
             emulator-5554          device product:sdk model:Pixel device:generic_x86 transport_id:1\n\
             10.0.0.7:5555          device product:r8q model:SM_G780F device:r8q transport_id:4\n\
             \n\
             EOF\n",
        )
        .unwrap();

        let registry = Arc::new(DeviceRegistry::new());
        let broker = ExecutionBroker::new(
            ToolLocator::fixed("/bin/sh", "/bin/sh"),
            Arc::clone(&registry),
            dir.path(),
        );

        let report = refresh(&broker).await.unwrap();
        assert_eq!(report.updated.len(), 2);
        assert!(report.rejected.is_empty());

        let tcp = registry.lookup_str("10.0.0.7:5555").unwrap();
        assert!(tcp.is_connected_via_tcp());
        assert_eq!(tcp.transport_id(), Some(4));
        assert_eq!(broker.launched_processes(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_listing_keeps_registry() {
        use crate::toolchain::ToolLocator;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("devices"), "echo 'cannot connect to daemon'\nexit 1\n").unwrap();

        let registry = Arc::new(DeviceRegistry::new());
        ingest_listing(&registry, "a device product:p model:m device:d\n");
        let broker = ExecutionBroker::new(
            ToolLocator::fixed("/bin/sh", "/bin/sh"),
            Arc::clone(&registry),
            dir.path(),
        );

        let err = refresh(&broker).await.unwrap_err();
        assert!(matches!(err, BridgeError::CommandFailed { .. }));
        assert_eq!(registry.lookup_str("a").unwrap().state(), DeviceState::Online);
    }
}
