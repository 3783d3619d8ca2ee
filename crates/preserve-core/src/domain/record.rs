//! Registry-side records: what a registry stores and hands back.

use serde::{Deserialize, Serialize};
use url::Url;

use super::ids::Cpid;

/// A registry record pointing at stored content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub manifest_cpid: Cpid,

    /// Label identifier of the representation the content conforms to.
    pub ril_cpid: Cpid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Url>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,

    /// Assigned by the registry on each accepted submit.
    #[serde(default)]
    pub version: u32,
}

impl Manifest {
    pub fn new(manifest_cpid: Cpid, ril_cpid: Cpid) -> Self {
        Self {
            manifest_cpid,
            ril_cpid,
            resource_name: None,
            location: None,
            categories: Vec::new(),
            version: 0,
        }
    }
}

/// Representation information label as stored in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepInfoLabel {
    pub cpid: Cpid,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

/// Confirmed record returned by a registry after a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RegistryObject {
    Manifest(Manifest),
    Label(RepInfoLabel),
}

impl RegistryObject {
    pub fn cpid(&self) -> &Cpid {
        match self {
            RegistryObject::Manifest(manifest) => &manifest.manifest_cpid,
            RegistryObject::Label(label) => &label.cpid,
        }
    }
}
