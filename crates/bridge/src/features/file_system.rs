//! Device file system access through `adb shell`, `adb pull` and `adb push`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::{shell_quote, DeviceTarget, PermissionSet};
use crate::broker::ExecutionBroker;
use crate::device::Device;
use crate::error::{BridgeError, BridgeResult};

const TRANSFER_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Pipe,
    Socket,
    Other,
}

impl FileKind {
    /// From the type character leading an `ls -l` mode string
    pub fn from_mode_char(c: char) -> Self {
        match c {
            '-' => FileKind::File,
            'd' => FileKind::Directory,
            'l' => FileKind::Symlink,
            'c' => FileKind::CharDevice,
            'b' => FileKind::BlockDevice,
            'p' => FileKind::Pipe,
            's' => FileKind::Socket,
            _ => FileKind::Other,
        }
    }
}

/// One line of `ls -l`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub kind: FileKind,
    pub permissions: PermissionSet,
    pub links: u32,
    pub owner: String,
    pub group: String,
    /// Bytes; zero for device nodes
    pub size: u64,
    /// Modification time as printed by `ls`
    pub modified: String,
    pub link_target: Option<String>,
}

/// Take `n` whitespace separated fields, returning them and the untouched rest
fn take_fields(line: &str, n: usize) -> Option<(Vec<&str>, &str)> {
    let mut fields = Vec::with_capacity(n);
    let mut rest = line.trim_start();
    for _ in 0..n {
        if rest.is_empty() {
            return None;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    Some((fields, rest))
}

fn is_iso_date(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() == 10 && bytes[4] == b'-' && bytes[7] == b'-'
}

impl FileEntry {
    /// Parse one `ls -l` line (toybox and busybox layouts)
    pub fn parse_ls_line(line: &str) -> Option<FileEntry> {
        let (head, rest) = take_fields(line, 5)?;
        let mode = head[0];
        let kind = FileKind::from_mode_char(mode.chars().next()?);
        let permissions = PermissionSet::from_mode_string(mode).ok()?;
        let links = head[1].parse().ok()?;

        // Device nodes print `major, minor` in place of the size
        let (size, rest) = if head[4].ends_with(',') {
            let (_, rest) = take_fields(rest, 1)?;
            (0, rest)
        } else {
            (head[4].parse().ok()?, rest)
        };

        // toybox: `2023-10-01 12:00`, busybox: `Jan  8 07:41`
        let date_fields = if is_iso_date(rest.split_whitespace().next()?) { 2 } else { 3 };
        let (date, name) = take_fields(rest, date_fields)?;
        if name.is_empty() {
            return None;
        }

        let (name, link_target) = match (kind, name.split_once(" -> ")) {
            (FileKind::Symlink, Some((name, target))) => (name, Some(target.to_string())),
            _ => (name, None),
        };

        Some(FileEntry {
            name: name.to_string(),
            kind,
            permissions,
            links,
            owner: head[2].to_string(),
            group: head[3].to_string(),
            size,
            modified: date.join(" "),
            link_target,
        })
    }

    /// Parse a whole listing, skipping the `total` line and anything unreadable
    pub fn parse_listing(output: &str) -> Vec<FileEntry> {
        output
            .lines()
            .filter(|line| !line.trim().is_empty() && !line.starts_with("total "))
            .filter_map(|line| {
                let entry = Self::parse_ls_line(line);
                if entry.is_none() {
                    debug!("Skipping ls line {:?}", line);
                }
                entry
            })
            .collect()
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// File system of one device
pub struct FileSystem {
    target: DeviceTarget,
}

impl FileSystem {
    pub(crate) fn new(device: Arc<Device>, broker: Arc<ExecutionBroker>) -> Self {
        Self {
            target: DeviceTarget::new(device, broker),
        }
    }

    /// Permissions of `path` from `stat -c %a`
    pub async fn permissions(&self, path: &str) -> BridgeResult<PermissionSet> {
        let quoted = shell_quote(path);
        let output = self
            .target
            .shell_checked("stat", &["-c", "%a", quoted.as_str()])
            .await?;
        PermissionSet::from_stat_output(&output)
    }

    /// Whether `path` exists, from the exit code of `test -e`
    pub async fn exists(&self, path: &str) -> BridgeResult<bool> {
        let quoted = shell_quote(path);
        let result = self.target.shell("test", &["-e", quoted.as_str()]).await?;
        if result.timed_out {
            return Err(BridgeError::CommandFailed {
                command: format!("test -e {}", path),
                output: "timed out".to_string(),
            });
        }
        Ok(result.exit_code == 0)
    }

    /// Entries of the directory `dir`
    pub async fn list(&self, dir: &str) -> BridgeResult<Vec<FileEntry>> {
        let quoted = shell_quote(dir);
        let output = self.target.shell_checked("ls", &["-l", quoted.as_str()]).await?;
        Ok(FileEntry::parse_listing(&output))
    }

    /// Create `path`, with missing parents when `parents` is set
    pub async fn mkdir(&self, path: &str, parents: bool) -> BridgeResult<()> {
        let quoted = shell_quote(path);
        let mut args = Vec::with_capacity(2);
        if parents {
            args.push("-p");
        }
        args.push(quoted.as_str());
        self.target.shell_checked("mkdir", &args).await?;
        Ok(())
    }

    pub async fn remove(&self, path: &str, recursive: bool) -> BridgeResult<()> {
        let quoted = shell_quote(path);
        let mut args = vec!["-f"];
        if recursive {
            args.push("-r");
        }
        args.push(quoted.as_str());
        self.target.shell_checked("rm", &args).await?;
        Ok(())
    }

    /// Create an empty file, or bump the modification time of an existing one
    pub async fn touch(&self, path: &str) -> BridgeResult<()> {
        let quoted = shell_quote(path);
        self.target.shell_checked("touch", &[quoted.as_str()]).await?;
        Ok(())
    }

    /// Contents of a text file; every line comes back terminated by `\n`
    pub async fn read_to_string(&self, path: &str) -> BridgeResult<String> {
        let quoted = shell_quote(path);
        self.target.shell_checked("cat", &[quoted.as_str()]).await
    }

    /// Copy a file or directory tree; an existing `destination` is never overwritten
    pub async fn copy(&self, source: &str, destination: &str) -> BridgeResult<()> {
        self.ensure_vacant(destination).await?;
        let (source, destination) = (shell_quote(source), shell_quote(destination));
        self.target
            .shell_checked("cp", &["-r", source.as_str(), destination.as_str()])
            .await?;
        Ok(())
    }

    /// Move `source` to `destination`, refusing to replace an existing entry
    pub async fn rename(&self, source: &str, destination: &str) -> BridgeResult<()> {
        self.ensure_vacant(destination).await?;
        let (source, destination) = (shell_quote(source), shell_quote(destination));
        self.target
            .shell_checked("mv", &[source.as_str(), destination.as_str()])
            .await?;
        Ok(())
    }

    async fn ensure_vacant(&self, path: &str) -> BridgeResult<()> {
        if self.exists(path).await? {
            debug!("Refusing to overwrite {}", path);
            return Err(BridgeError::AlreadyExists(path.to_string()));
        }
        Ok(())
    }

    /// Copy `remote` from the device to `local` on the host
    pub async fn pull(&self, remote: &str, local: &Path) -> BridgeResult<PathBuf> {
        let local_arg = local.to_string_lossy();
        self.target
            .bridge_checked("pull", &[remote, &*local_arg], Some(TRANSFER_TIMEOUT))
            .await?;
        Ok(local.to_path_buf())
    }

    /// Copy `local` from the host to `remote` on the device
    pub async fn push(&self, local: &Path, remote: &str) -> BridgeResult<()> {
        if !local.exists() {
            return Err(BridgeError::InvalidCommand(format!(
                "{} does not exist",
                local.display()
            )));
        }
        let local_arg = local.to_string_lossy();
        self.target
            .bridge_checked("push", &[&*local_arg, remote], Some(TRANSFER_TIMEOUT))
            .await?;
        Ok(())
    }
}
