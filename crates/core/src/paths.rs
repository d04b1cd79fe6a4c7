//! Library directories
//!
//! droidctl keeps its files under a single home directory:
//!
//! ```text
//! ~/.droidctl/
//!   tmp/                  scratch space, working directory of every tool process
//!   lib/platform-tools/   locally installed adb / fastboot binaries
//! ```

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{CoreError, Result};

const HOME_DIR_NAME: &str = ".droidctl";
const SCRATCH_DIR_NAME: &str = "tmp";
const LIB_DIR_NAME: &str = "lib";
const PLATFORM_TOOLS_DIR_NAME: &str = "platform-tools";

/// Resolved set of library directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryDirs {
    home: PathBuf,
}

impl LibraryDirs {
    /// Locate the library home under the user's home directory
    pub fn discover() -> Result<Self> {
        let home = dirs::home_dir().ok_or(CoreError::NoHomeDirectory)?;
        Ok(Self::at(home.join(HOME_DIR_NAME)))
    }

    /// Use an explicit library home
    pub fn at(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Scratch directory; tool processes run with this as their working directory
    pub fn scratch(&self) -> PathBuf {
        self.home.join(SCRATCH_DIR_NAME)
    }

    pub fn lib(&self) -> PathBuf {
        self.home.join(LIB_DIR_NAME)
    }

    /// Where locally installed platform tools are looked up
    pub fn platform_tools(&self) -> PathBuf {
        self.lib().join(PLATFORM_TOOLS_DIR_NAME)
    }

    /// Create the scratch and lib directories if they are missing
    pub fn create_all(&self) -> Result<()> {
        for dir in [self.scratch(), self.lib()] {
            if !dir.exists() {
                debug!("Creating library directory {:?}", dir);
                std::fs::create_dir_all(&dir)?;
            }
        }
        Ok(())
    }
}
