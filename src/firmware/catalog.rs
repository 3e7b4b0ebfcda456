use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dfu::{DfuError, DfuResult, Model};

/// Release name that resolves to the catalog's designated latest release.
pub const LATEST: &str = "latest";

const BUILTIN_CATALOG: &str = include_str!("firmwares.json");

/// One installable release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareRelease {
    pub name: String,
    pub commit: String,
    #[serde(default)]
    pub changelog: Vec<String>,
    /// Per-model and per-channel compatibility flags.
    #[serde(default)]
    pub compatibility: BTreeMap<String, bool>,
    #[serde(default)]
    pub available: bool,
    /// Supported UI languages, keyed by model number.
    #[serde(default, alias = "langages")]
    pub languages: BTreeMap<String, Vec<String>>,
}

impl FirmwareRelease {
    /// Whether the release is flagged as compatible with `model`.
    pub fn is_compatible(&self, model: Model) -> bool {
        self.compatibility
            .get(model.name())
            .copied()
            .unwrap_or(false)
    }
}

/// Ordered list of releases plus the name of the latest one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareCatalog {
    pub latest: String,
    pub firmwares: Vec<FirmwareRelease>,
}

impl FirmwareCatalog {
    /// The catalog shipped with the installer.
    pub fn builtin() -> DfuResult<Self> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_json(json: &str) -> DfuResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Map `"latest"` to the designated release name.
    pub fn resolve_name<'a>(&'a self, name: &'a str) -> &'a str {
        if name == LATEST {
            &self.latest
        } else {
            name
        }
    }

    /// Look a release up by name, `"latest"` included.
    pub fn find(&self, name: &str) -> Option<&FirmwareRelease> {
        let name = self.resolve_name(name);
        self.firmwares.iter().find(|release| release.name == name)
    }

    /// Like [`find`](Self::find), failing with `FirmwareNotFound`.
    pub fn resolve(&self, name: &str) -> DfuResult<&FirmwareRelease> {
        self.find(name).ok_or_else(|| DfuError::FirmwareNotFound {
            name: self.resolve_name(name).to_string(),
        })
    }
}
