//! Tool Locator
//!
//! Finds the adb and fastboot binaries. Search order:
//! 1. explicit path from the configuration
//! 2. `platform-tools` of the configured / detected Android SDK
//! 3. the library's own install directory
//! 4. `PATH`

use std::path::{Path, PathBuf};

use droidctl_core::{BridgeConfig, LibraryDirs};
use tracing::debug;
use which::which;

use crate::command::CommandKind;
use crate::error::{BridgeError, BridgeResult};

const ADB_BIN: &str = "adb";
const FASTBOOT_BIN: &str = "fastboot";

fn executable_name(base: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", base)
    } else {
        base.to_string()
    }
}

/// Resolves tool binaries per command kind
#[derive(Debug, Clone, Default)]
pub struct ToolLocator {
    bridge_override: Option<PathBuf>,
    flash_override: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
    use_path: bool,
}

impl ToolLocator {
    /// Locator following the configured search order
    pub fn from_config(config: &BridgeConfig, dirs: &LibraryDirs) -> Self {
        let mut search_dirs = Vec::new();
        if let Some(sdk) = config.get_sdk_path() {
            search_dirs.push(sdk.join("platform-tools"));
        }
        search_dirs.push(dirs.platform_tools());

        Self {
            bridge_override: config.tools.bridge_path.clone(),
            flash_override: config.tools.flash_path.clone(),
            search_dirs,
            use_path: true,
        }
    }

    /// Locator that only ever returns the given binaries
    pub fn fixed(bridge: impl Into<PathBuf>, flash: impl Into<PathBuf>) -> Self {
        Self {
            bridge_override: Some(bridge.into()),
            flash_override: Some(flash.into()),
            search_dirs: Vec::new(),
            use_path: false,
        }
    }

    /// Path of the binary that runs commands of `kind`
    pub fn resolve(&self, kind: CommandKind) -> BridgeResult<PathBuf> {
        let (base, explicit) = match kind {
            CommandKind::Bridge | CommandKind::BridgeShell => (ADB_BIN, &self.bridge_override),
            CommandKind::Flash => (FASTBOOT_BIN, &self.flash_override),
        };
        let file_name = executable_name(base);
        let mut searched = Vec::new();

        if let Some(path) = explicit {
            if is_file(path) {
                return Ok(path.clone());
            }
            searched.push(path.clone());
        }

        for dir in &self.search_dirs {
            let candidate = dir.join(&file_name);
            if is_file(&candidate) {
                debug!("Found {} at {:?}", base, candidate);
                return Ok(candidate);
            }
            searched.push(candidate);
        }

        if self.use_path {
            if let Ok(found) = which(&file_name) {
                debug!("Found {} on PATH at {:?}", base, found);
                return Ok(found);
            }
            searched.push(PathBuf::from(format!("$PATH/{}", file_name)));
        }

        Err(BridgeError::ToolNotFound {
            tool: kind.tool_name(),
            searched,
        })
    }

    /// Check if the bridge tool is available
    pub fn is_available(&self) -> bool {
        self.resolve(CommandKind::Bridge).is_ok()
    }
}

fn is_file(path: &Path) -> bool {
    path.is_file()
}
