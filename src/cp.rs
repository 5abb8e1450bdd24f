//! CP identity and the directory that resolves it.
//!
//! The hardware-configuration backend is a collaborator: the core only
//! needs a stable key (name, architecture, side, MAU type) to compute
//! log paths. [`CpDirectory`] is the seam; [`ConfiguredDirectory`] backs
//! it with the `[[cp]]` tables from the configuration file.

use std::{fmt, path::PathBuf, str::FromStr};

use serde::Deserialize;

/// CP architecture class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Architecture {
    /// Two redundant sides, A and B.
    DualSided,
    /// Blade cluster: single-sided, no side concept.
    BladeCluster,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DualSided => "dual-sided",
            Self::BladeCluster => "blade-cluster",
        })
    }
}

/// MAU configuration of a CP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MauType {
    /// Hardware MAU board; no per-endpoint logs.
    Maub,
    /// Software MAU with per-endpoint log trees.
    Maus,
}

/// One half of a dual-sided CP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::A, Side::B];

    /// Directory name under the CP's log root.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::A => "cpa",
            Self::B => "cpb",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::A => "A",
            Self::B => "B",
        })
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a" | "cpa" => Ok(Self::A),
            "b" | "cpb" => Ok(Self::B),
            _ => Err(format!("invalid side '{s}', expected a or b")),
        }
    }
}

/// Identity of one CP as resolved by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CpInfo {
    pub name: String,
    pub id: u16,
    pub architecture: Architecture,

    #[serde(default)]
    pub mau: Option<MauType>,

    /// Board magazine address, when known.
    #[serde(default)]
    pub magazine: Option<String>,

    /// Board slot, when known.
    #[serde(default)]
    pub slot: Option<u8>,
}

impl CpInfo {
    pub fn has_maus(&self) -> bool {
        self.mau == Some(MauType::Maus)
    }

    /// Root of this CP's log tree: `<data_root>/<name lower-cased>`.
    pub fn log_root(&self, data_root: &std::path::Path) -> PathBuf {
        data_root.join(self.name.to_lowercase())
    }
}

/// Read-only lookup of CP identities.
///
/// Misses return `None`; callers decide whether that is an error.
pub trait CpDirectory {
    /// Finds a CP by name (case-insensitive) or numeric id.
    fn lookup(&self, name_or_id: &str) -> Option<CpInfo>;

    /// The CP to use when none is named: only defined for one-CP systems.
    fn default_cp(&self) -> Option<CpInfo>;

    /// Every known CP, in declaration order.
    fn all(&self) -> Vec<CpInfo>;
}

/// A directory backed by configured CP entries.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredDirectory {
    cps: Vec<CpInfo>,
}

impl ConfiguredDirectory {
    pub fn new(cps: Vec<CpInfo>) -> Self {
        Self { cps }
    }
}

impl CpDirectory for ConfiguredDirectory {
    fn lookup(&self, name_or_id: &str) -> Option<CpInfo> {
        let id = name_or_id.parse::<u16>().ok();
        self.cps
            .iter()
            .find(|cp| cp.name.eq_ignore_ascii_case(name_or_id) || Some(cp.id) == id)
            .cloned()
    }

    fn default_cp(&self) -> Option<CpInfo> {
        match self.cps.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        }
    }

    fn all(&self) -> Vec<CpInfo> {
        self.cps.clone()
    }
}

#[cfg(test)]
pub(crate) fn dual_sided(name: &str) -> CpInfo {
    CpInfo {
        name: name.into(),
        id: 1,
        architecture: Architecture::DualSided,
        mau: Some(MauType::Maus),
        magazine: None,
        slot: None,
    }
}

#[cfg(test)]
pub(crate) fn blade(name: &str) -> CpInfo {
    CpInfo {
        name: name.into(),
        id: 1001,
        architecture: Architecture::BladeCluster,
        mau: None,
        magazine: Some("1.2.0.4".into()),
        slot: Some(3),
    }
}
