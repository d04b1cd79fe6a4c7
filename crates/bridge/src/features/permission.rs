//! Unix permission bits as reported by `stat` and `ls -l`

use std::fmt;

use serde::Serialize;

use crate::error::{BridgeError, BridgeResult};

/// One `rwx` triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Permission {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Permission {
    pub const NONE: Permission = Permission::from_bits(0);
    pub const ALL: Permission = Permission::from_bits(7);

    /// From the low three bits of `bits`
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            read: bits & 4 != 0,
            write: bits & 2 != 0,
            execute: bits & 1 != 0,
        }
    }

    /// From one octal digit, `0`..=`7`
    pub fn from_octal(digit: u8) -> Option<Self> {
        (digit <= 7).then(|| Self::from_bits(digit))
    }

    pub fn octal(&self) -> u8 {
        (u8::from(self.read) << 2) | (u8::from(self.write) << 1) | u8::from(self.execute)
    }

    /// Parse a three character `rwx` group, e.g. `r-x`
    pub fn from_symbolic(triple: &str) -> BridgeResult<Self> {
        let invalid = || BridgeError::parse("permission", triple);
        let chars: Vec<char> = triple.chars().collect();
        let [r, w, x] = chars.as_slice() else {
            return Err(invalid());
        };

        let flag = |c: char, expected: char| match c.to_ascii_lowercase() {
            '-' => Ok(false),
            c if c == expected => Ok(true),
            _ => Err(invalid()),
        };

        // Setuid, setgid and sticky replace the execute slot
        let execute = match *x {
            's' | 't' => true,
            'S' | 'T' => false,
            c => flag(c, 'x')?,
        };

        Ok(Self {
            read: flag(*r, 'r')?,
            write: flag(*w, 'w')?,
            execute,
        })
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.read { 'r' } else { '-' };
        let w = if self.write { 'w' } else { '-' };
        let x = if self.execute { 'x' } else { '-' };
        write!(f, "{r}{w}{x}")
    }
}

/// Owner, group and other permissions of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct PermissionSet {
    pub owner: Permission,
    pub group: Permission,
    pub other: Permission,
}

impl PermissionSet {
    pub fn new(owner: Permission, group: Permission, other: Permission) -> Self {
        Self { owner, group, other }
    }

    /// Same permission for everyone
    pub fn uniform(permission: Permission) -> Self {
        Self::new(permission, permission, permission)
    }

    /// Parse `stat -c %a` output; the leading three octal digits are used
    pub fn from_stat_output(output: &str) -> BridgeResult<Self> {
        let output = output.trim();
        // A fourth digit (setuid etc.) precedes the triple
        let digits = match output.len() {
            4 => output.get(1..).unwrap_or(output),
            _ => output,
        };

        let octal: Vec<u8> = digits
            .chars()
            .take(3)
            .map(|c| c.to_digit(8).map(|d| d as u8))
            .collect::<Option<_>>()
            .ok_or_else(|| BridgeError::parse("stat permissions", output))?;

        match octal.as_slice() {
            [owner, group, other] => Ok(Self::new(
                Permission::from_bits(*owner),
                Permission::from_bits(*group),
                Permission::from_bits(*other),
            )),
            _ => Err(BridgeError::parse("stat permissions", output)),
        }
    }

    /// Parse the mode column of `ls -l`, e.g. `drwxr-x--x`
    pub fn from_mode_string(mode: &str) -> BridgeResult<Self> {
        let invalid = || BridgeError::parse("mode string", mode);
        if !mode.is_ascii() {
            return Err(invalid());
        }
        let bits = mode.get(1..10).ok_or_else(invalid)?;
        Ok(Self::new(
            Permission::from_symbolic(&bits[0..3])?,
            Permission::from_symbolic(&bits[3..6])?,
            Permission::from_symbolic(&bits[6..9])?,
        ))
    }

    /// Three digit octal form, e.g. `755`
    pub fn octal(&self) -> String {
        format!("{}{}{}", self.owner.octal(), self.group.octal(), self.other.octal())
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.owner, self.group, self.other)
    }
}
