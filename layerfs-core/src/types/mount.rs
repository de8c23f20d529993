//! Mount options and slot capability resolution.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::flags::SlotFlags;
use crate::error::LayerError;

/// How the union detects changes made directly on a branch, bypassing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Udba {
    /// Never check
    None,
    /// Revalidate cached state on access
    Reval,
    /// Watch branch directories with change notification
    Notify,
}

impl Udba {
    pub fn as_str(&self) -> &'static str {
        match self {
            Udba::None => "none",
            Udba::Reval => "reval",
            Udba::Notify => "notify",
        }
    }
}

impl fmt::Display for Udba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Udba {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Udba::None),
            "reval" => Ok(Udba::Reval),
            "notify" | "hnotify" | "inotify" => Ok(Udba::Notify),
            _ => Err(LayerError::InvalidOption {
                option: format!("udba={}", s),
                reason: "unknown udba mode".to_string(),
            }),
        }
    }
}

/// Options a union mount was created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountOptions {
    /// Keep an external index of branch inode -> virtual inode numbers
    pub xino: bool,

    /// Branch change detection mode
    pub udba: Udba,

    /// Truncate the index store files when they grow
    pub trunc_xino: bool,

    /// Pseudo-link hard links across branches
    pub plink: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            xino: true,
            udba: Udba::Reval,
            trunc_xino: false,
            plink: true,
        }
    }
}

impl MountOptions {
    /// Creates a new MountOptions with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new builder for MountOptions.
    pub fn builder() -> MountOptionsBuilder {
        MountOptionsBuilder::new()
    }

    /// Loads options from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LayerError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Capability flags for installing a branch inode under a virtual inode.
    ///
    /// `XINO` follows the mount's index store option. `HNOTIFY` is only
    /// granted to directories, and only when udba is notification based.
    pub fn slot_flags(&self, is_dir: bool) -> SlotFlags {
        let mut flags = SlotFlags::empty();
        if self.xino {
            flags |= SlotFlags::XINO;
        }
        if is_dir && self.udba == Udba::Notify {
            flags |= SlotFlags::HNOTIFY;
        }
        flags
    }
}

impl FromStr for MountOptions {
    type Err = LayerError;

    /// Parses a comma separated mount option string such as
    /// `"xino,udba=notify,noplink"`. Later options override earlier ones.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut builder = MountOptionsBuilder::new();
        for opt in s.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            builder = match opt.split_once('=') {
                Some(("udba", mode)) => builder.udba(mode.parse()?),
                Some(("xino", _)) => builder.xino(true),
                Some((key, _)) => {
                    return Err(LayerError::InvalidOption {
                        option: opt.to_string(),
                        reason: format!("'{}' does not take a value", key),
                    })
                }
                None => match opt {
                    "xino" => builder.xino(true),
                    "noxino" => builder.xino(false),
                    "trunc_xino" => builder.trunc_xino(true),
                    "notrunc_xino" => builder.trunc_xino(false),
                    "plink" => builder.plink(true),
                    "noplink" => builder.plink(false),
                    _ => {
                        return Err(LayerError::InvalidOption {
                            option: opt.to_string(),
                            reason: "unknown option".to_string(),
                        })
                    }
                },
            };
        }
        Ok(builder.build())
    }
}

impl fmt::Display for MountOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},udba={},{},{}",
            if self.xino { "xino" } else { "noxino" },
            self.udba,
            if self.trunc_xino { "trunc_xino" } else { "notrunc_xino" },
            if self.plink { "plink" } else { "noplink" },
        )
    }
}

/// Builder for MountOptions with a fluent interface.
pub struct MountOptionsBuilder {
    options: MountOptions,
}

impl MountOptionsBuilder {
    /// Creates a new builder with default options.
    pub fn new() -> Self {
        Self {
            options: MountOptions::default(),
        }
    }

    pub fn xino(mut self, enabled: bool) -> Self {
        self.options.xino = enabled;
        self
    }

    pub fn udba(mut self, udba: Udba) -> Self {
        self.options.udba = udba;
        self
    }

    pub fn trunc_xino(mut self, enabled: bool) -> Self {
        self.options.trunc_xino = enabled;
        self
    }

    pub fn plink(mut self, enabled: bool) -> Self {
        self.options.plink = enabled;
        self
    }

    /// Builds the final MountOptions.
    pub fn build(self) -> MountOptions {
        self.options
    }
}

impl Default for MountOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
