//! Resolved build configuration.
//!
//! Mirrors the subset of a melange-style YAML manifest the emission core
//! actually consumes: `package` and `subpackages`. `environment` and
//! `pipeline` are accepted but kept untyped since populating the workspace
//! from them is an external collaborator's job (see crate docs).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// A single copyright declaration: a license identifier plus the paths it covers.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Copyright {
    pub license: String,
    #[serde(default)]
    pub paths: Vec<String>,
}

/// The three dependency sets a package (or subpackage) declares, plus an
/// optional tie-breaker used by the package manager's provider resolution.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Dependencies {
    #[serde(default)]
    pub runtime: Vec<String>,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub replaces: Vec<String>,
    #[serde(default)]
    pub provider_priority: Option<u32>,
}

/// Booleans controlling Dependency Scanner behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Options {
    #[serde(rename = "no-commands", default)]
    pub no_commands: bool,
    #[serde(rename = "no-depends", default)]
    pub no_depends: bool,
    #[serde(rename = "no-provides", default)]
    pub no_provides: bool,
}

/// A trigger scriptlet: the script body plus the path globs that activate it.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Trigger {
    pub script: String,
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Scripts the package manager executes around install/deinstall/upgrade.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Scriptlets {
    #[serde(default)]
    pub trigger: Option<Trigger>,
    #[serde(rename = "pre-install", default)]
    pub pre_install: Option<String>,
    #[serde(rename = "post-install", default)]
    pub post_install: Option<String>,
    #[serde(rename = "pre-deinstall", default)]
    pub pre_deinstall: Option<String>,
    #[serde(rename = "post-deinstall", default)]
    pub post_deinstall: Option<String>,
    #[serde(rename = "pre-upgrade", default)]
    pub pre_upgrade: Option<String>,
    #[serde(rename = "post-upgrade", default)]
    pub post_upgrade: Option<String>,
}

/// The origin package's metadata: what ends up in `.PKGINFO` for the main
/// package, and what every subpackage inherits version/epoch from.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub epoch: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub commit: String,
    #[serde(default)]
    pub copyright: Vec<Copyright>,
    #[serde(default)]
    pub dependencies: Dependencies,
    #[serde(default)]
    pub options: Options,
    #[serde(default)]
    pub scriptlets: Scriptlets,
}

/// A derived package sharing the origin's version/epoch but with its own
/// file set, dependencies, options, and scriptlets.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Subpackage {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub dependencies: Dependencies,
    #[serde(default)]
    pub options: Options,
    #[serde(default)]
    pub scriptlets: Scriptlets,
}

/// The full resolved build configuration. Only `package` and `subpackages`
/// are modeled; `environment`/`pipeline` round-trip as opaque YAML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Configuration {
    pub package: PackageInfo,
    #[serde(default)]
    pub subpackages: Vec<Subpackage>,
    #[serde(default)]
    pub environment: serde_yaml::Value,
    #[serde(default)]
    pub pipeline: serde_yaml::Value,
}

impl Configuration {
    /// Load and parse a configuration document from disk.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse a configuration document from a YAML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }
}

impl std::str::FromStr for Configuration {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
