//! Stand-in bridge tool for tests that target a device
//!
//! The fake `adb` drops `-s <id>`, joins everything after `shell` with
//! spaces and evaluates the result, which is what adb and the device shell
//! do together. Host tools (`cp`, `cat`, ...) play the device's; `su`,
//! `setprop` and `getprop` come from `device.sh`.

use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::broker::ExecutionBroker;
use crate::device::{Device, DeviceIdentity, DeviceState};
use crate::error::{BridgeError, BridgeResult};
use crate::registry::{DeviceObservation, DeviceRegistry};
use crate::toolchain::ToolLocator;

/// ETXTBSY on Linux and macOS
const TEXT_FILE_BUSY: i32 = 26;

const FAKE_ADB: &str = r##"#!/bin/sh
if [ "$1" = "-s" ]; then shift 2; fi
if [ "$1" != "shell" ]; then
    echo "unsupported: $*"
    exit 1
fi
shift
. "$(dirname "$0")/device.sh"
eval "$*"
"##;

const DEVICE_SH: &str = r##"DEVICE_ROOT=$(dirname "$0")
PROPS="$DEVICE_ROOT/props"

su() {
    printf 'su'
    for arg in "$@"; do
        printf ' [%s]' "$arg"
    done
    printf '\n'
}

setprop() {
    if [ $# -ne 2 ]; then
        echo "setprop: need 2 args, got $#"
        return 1
    fi
    printf '%s=%s\n' "$1" "$2" >> "$PROPS"
}

getprop() {
    if [ -f "$DEVICE_ROOT/getprop-fails" ]; then
        echo "getprop: property service unavailable"
        return 1
    fi
    [ -f "$PROPS" ] || return 0
    if [ $# -eq 0 ]; then
        sed 's/^\([^=]*\)=\(.*\)$/[\1]: [\2]/' "$PROPS"
    else
        grep "^$1=" "$PROPS" | tail -n 1 | cut -d= -f2-
    fi
}
"##;

pub(crate) struct FakeBridge {
    dir: TempDir,
    pub(crate) broker: Arc<ExecutionBroker>,
    pub(crate) registry: Arc<DeviceRegistry>,
}

impl FakeBridge {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let adb = dir.path().join("adb");
        std::fs::write(&adb, FAKE_ADB).unwrap();
        std::fs::set_permissions(&adb, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(dir.path().join("device.sh"), DEVICE_SH).unwrap();

        let registry = Arc::new(DeviceRegistry::new());
        let broker = ExecutionBroker::new(
            ToolLocator::fixed(adb.clone(), adb),
            Arc::clone(&registry),
            dir.path(),
        );

        Self {
            dir,
            broker: Arc::new(broker),
            registry,
        }
    }

    /// Directory holding the fake tool; doubles as the scratch dir
    pub(crate) fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Register an online USB device
    pub(crate) fn device(&self, serial: &str) -> Arc<Device> {
        self.registry.upsert(DeviceObservation {
            identity: DeviceIdentity::Usb(serial.into()),
            state: DeviceState::Online,
            product: "r8q".into(),
            model: "SM_G780F".into(),
            device_name: "r8q".into(),
            transport_id: None,
        })
    }
}

/// Retry while a concurrent fork still holds the freshly written tool open
pub(crate) async fn retry_busy<T, F, Fut>(mut run: F) -> BridgeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BridgeResult<T>>,
{
    for _ in 0..50 {
        match run().await {
            Err(BridgeError::ProcessLaunch { source, .. })
                if source.raw_os_error() == Some(TEXT_FILE_BUSY) =>
            {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            other => return other,
        }
    }
    run().await
}
