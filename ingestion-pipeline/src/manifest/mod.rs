//! `tooth.json` manifests across schema versions.
//!
//! A raw manifest is validated and decoded into [`Manifest`], then walked
//! edge by edge (`V1 -> V2 -> V3`) until it reaches the canonical
//! [`ManifestV3`]. Each edge is a pure function on already-validated input.

mod schema;

use common::error::AppError;
use serde_json::Value;
use thiserror::Error;

pub use schema::{LegacyInformation, ManifestInfo, ManifestV1, ManifestV2, ManifestV3};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("unsupported format_version {0}")]
    UnsupportedFormat(String),
    #[error("field `{field}`: {detail}")]
    Malformed { field: String, detail: String },
}

impl From<ManifestError> for AppError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::UnsupportedFormat(version) => AppError::UnsupportedFormat(version),
            malformed @ ManifestError::Malformed { .. } => {
                AppError::MalformedManifest(malformed.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    V1(ManifestV1),
    V2(ManifestV2),
    V3(ManifestV3),
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ManifestError> {
    serde_json::from_value(value).map_err(|err| ManifestError::Malformed {
        field: "$".to_string(),
        detail: err.to_string(),
    })
}

impl Manifest {
    pub fn from_json(raw: &str) -> Result<Self, ManifestError> {
        let value: Value = serde_json::from_str(raw).map_err(|err| ManifestError::Malformed {
            field: "$".to_string(),
            detail: err.to_string(),
        })?;
        Self::from_value(value)
    }

    /// Dispatches on `format_version`, runs that version's structural
    /// validator and decodes into the typed shape.
    pub fn from_value(value: Value) -> Result<Self, ManifestError> {
        let tag = value
            .get("format_version")
            .ok_or_else(|| ManifestError::Malformed {
                field: "format_version".to_string(),
                detail: "missing".to_string(),
            })?;

        match tag.as_u64() {
            Some(1) => {
                schema::validate_v1(&value)?;
                Ok(Manifest::V1(decode(value)?))
            }
            Some(2) => {
                schema::validate_v2(&value)?;
                Ok(Manifest::V2(decode(value)?))
            }
            Some(3) => {
                schema::validate_v3(&value)?;
                Ok(Manifest::V3(decode(value)?))
            }
            _ => Err(ManifestError::UnsupportedFormat(tag.to_string())),
        }
    }
}

/// Which dependency entries carry the host platform's version range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyKeys {
    pub primary: String,
    pub legacy: Option<String>,
}

impl DependencyKeys {
    pub fn levilamina() -> Self {
        Self {
            primary: "github.com/LiteLDev/LeviLamina".to_string(),
            legacy: Some("github.com/liteldev/levilamina".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManifestMigrator {
    keys: DependencyKeys,
}

impl ManifestMigrator {
    pub fn new(keys: DependencyKeys) -> Self {
        Self { keys }
    }

    /// Applies transitions until the manifest is canonical.
    pub fn migrate(&self, manifest: Manifest) -> ManifestV3 {
        let mut current = manifest;
        loop {
            current = match current {
                Manifest::V1(v1) => Manifest::V2(v1_to_v2(v1)),
                Manifest::V2(v2) => Manifest::V3(v2_to_v3(v2, &self.keys)),
                Manifest::V3(v3) => return v3,
            };
        }
    }

    pub fn migrate_json(&self, raw: &str) -> Result<ManifestV3, ManifestError> {
        Manifest::from_json(raw).map(|manifest| self.migrate(manifest))
    }
}

pub fn v1_to_v2(v1: ManifestV1) -> ManifestV2 {
    let dependencies = v1
        .dependencies
        .into_iter()
        .map(|(path, ranges)| {
            let range = ranges
                .iter()
                .map(|(lower, upper)| format!("{lower} {upper}"))
                .collect::<Vec<_>>()
                .join(" || ");
            (path, range)
        })
        .collect();

    ManifestV2 {
        tooth: v1.tooth,
        version: v1.version,
        info: ManifestInfo {
            name: v1.information.name,
            description: v1.information.description,
            author: v1.information.author,
            tags: v1.information.tags.unwrap_or_default(),
            avatar_url: String::new(),
            source: None,
        },
        dependencies,
    }
}

pub fn v2_to_v3(v2: ManifestV2, keys: &DependencyKeys) -> ManifestV3 {
    let platform_requirement = v2
        .dependencies
        .get(&keys.primary)
        .or_else(|| {
            keys.legacy
                .as_ref()
                .and_then(|legacy| v2.dependencies.get(legacy))
        })
        .cloned()
        .unwrap_or_default();

    ManifestV3 {
        tooth: v2.tooth,
        version: v2.version,
        info: v2.info,
        dependencies: v2.dependencies,
        platform_requirement,
    }
}
