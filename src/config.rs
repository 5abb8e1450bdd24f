//! cplog configuration.
//!
//! Loaded from `--config`, else `$CPLOG_CONFIG`, else `~/.cplog/config.toml`.
//! A missing default file means built-in defaults; a missing file that was
//! named explicitly is an error.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cp::{ConfiguredDirectory, CpInfo};
use crate::error::LogError;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CPLOG_CONFIG";

/// cplog configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Config {
    /// Per-installation log data path. CP log trees live below it.
    pub data_root: PathBuf,

    /// Where transferred archives are moved to.
    pub support_data: PathBuf,

    /// Parent of transfer staging directories. System temp dir when unset.
    pub staging_root: Option<PathBuf>,

    /// External compression program.
    pub archiver: String,

    /// CPs known to this installation.
    #[serde(rename = "cp")]
    pub cps: Vec<CpInfo>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("/data/cps/logs"),
            support_data: PathBuf::from("/data/support_data"),
            staging_root: None,
            archiver: "zip".to_string(),
            cps: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from `explicit`, `$CPLOG_CONFIG`, or the default path.
    pub fn load(explicit: Option<&Path>) -> Result<Self, LogError> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        match named {
            Some(path) => Self::load_from(&path),
            None => match Self::path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => {
                    tracing::debug!("no config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Load and validate one config file.
    pub fn load_from(path: &Path) -> Result<Self, LogError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| LogError::io(format!("failed to read {}", path.display()), e))?;
        let config = Self::parse(&contents).map_err(|message| LogError::Config {
            path: path.to_path_buf(),
            message,
        })?;
        tracing::debug!(path = %path.display(), cps = config.cps.len(), "config loaded");
        Ok(config)
    }

    fn parse(contents: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(contents).map_err(|e| e.to_string())?;

        if config.archiver.trim().is_empty() {
            return Err("archiver is empty".to_string());
        }
        for (i, cp) in config.cps.iter().enumerate() {
            if cp.name.is_empty() {
                return Err(format!("cp entry {} has an empty name", i + 1));
            }
            let duplicate = config.cps[..i]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(&cp.name) || other.id == cp.id);
            if duplicate {
                return Err(format!("cp {} (id {}) is defined twice", cp.name, cp.id));
            }
        }
        Ok(config)
    }

    /// The default config file path: `~/.cplog/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".cplog").join("config.toml"))
    }

    /// Parent directory for staging.
    pub fn staging_root(&self) -> PathBuf {
        self.staging_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// The CP directory backed by the `[[cp]]` tables.
    pub fn directory(&self) -> ConfiguredDirectory {
        ConfiguredDirectory::new(self.cps.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::cp::{Architecture, CpDirectory, MauType};

    const SAMPLE: &str = r#"
data-root = "/srv/logs"
archiver = "/usr/bin/zip"

[[cp]]
name = "CP1"
id = 1
architecture = "dual-sided"
mau = "maus"

[[cp]]
name = "BC0"
id = 1001
architecture = "blade-cluster"
magazine = "1.2.0.4"
slot = 3
"#;

    #[test]
    fn parses_sample_with_defaults_for_missing_keys() {
        let config = Config::parse(SAMPLE).unwrap();

        assert_eq!(config.data_root, PathBuf::from("/srv/logs"));
        assert_eq!(config.support_data, PathBuf::from("/data/support_data"));
        assert_eq!(config.archiver, "/usr/bin/zip");
        assert_eq!(config.cps.len(), 2);
        assert_eq!(config.cps[0].mau, Some(MauType::Maus));
        assert_eq!(config.cps[1].architecture, Architecture::BladeCluster);
        assert_eq!(config.cps[1].slot, Some(3));

        let directory = config.directory();
        assert_eq!(directory.lookup("bc0").unwrap().id, 1001);
        assert!(directory.default_cp().is_none());
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.data_root, PathBuf::from("/data/cps/logs"));
        assert_eq!(config.archiver, "zip");
        assert_eq!(config.staging_root(), std::env::temp_dir());
        assert!(config.cps.is_empty());
    }

    #[test]
    fn rejects_unknown_keys_and_bad_architecture() {
        assert!(Config::parse("data_root = \"/x\"").is_err());

        let bad = "[[cp]]\nname = \"CP1\"\nid = 1\narchitecture = \"quad\"\n";
        assert!(Config::parse(bad).is_err());
    }

    #[test]
    fn rejects_duplicate_cps() {
        let dup = "[[cp]]\nname = \"CP1\"\nid = 1\narchitecture = \"dual-sided\"\n\
                   [[cp]]\nname = \"cp1\"\nid = 2\narchitecture = \"dual-sided\"\n";
        let err = Config::parse(dup).unwrap_err();
        assert!(err.contains("defined twice"), "{err}");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, LogError::Io { .. }));
    }

    #[test]
    fn invalid_file_reports_its_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "data-root = 7").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(&err, LogError::Config { path: p, .. } if p == &path));
        assert_eq!(err.exit_code(), 5);
    }
}
