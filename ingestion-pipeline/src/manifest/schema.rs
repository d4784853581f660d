//! Typed shapes of each `tooth.json` schema version and the structural
//! validators that gate decoding into them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ManifestError;

/// The `information` block used by schema version 1.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LegacyInformation {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestV1 {
    #[serde(default)]
    pub tooth: String,
    #[serde(default)]
    pub version: String,
    pub information: LegacyInformation,
    /// Dependency path to a list of `[lower, upper]` bounds.
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<(String, String)>>,
}

/// The `info` block shared by schema versions 2 and 3.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ManifestInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestV2 {
    pub tooth: String,
    pub version: String,
    pub info: ManifestInfo,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

/// Canonical manifest shape every older version migrates into.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ManifestV3 {
    pub tooth: String,
    pub version: String,
    pub info: ManifestInfo,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Version range of the host platform this package requires; empty when unknown.
    #[serde(default)]
    pub platform_requirement: String,
}

fn malformed(field: &str, detail: &str) -> ManifestError {
    ManifestError::Malformed {
        field: field.to_string(),
        detail: detail.to_string(),
    }
}

fn root_object(value: &Value) -> Result<&Map<String, Value>, ManifestError> {
    value
        .as_object()
        .ok_or_else(|| malformed("$", "manifest must be a JSON object"))
}

fn required_object<'a>(
    parent: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ManifestError> {
    match parent.get(key) {
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(malformed(path, "expected an object")),
        None => Err(malformed(path, "missing")),
    }
}

fn required_string(parent: &Map<String, Value>, key: &str, path: &str) -> Result<(), ManifestError> {
    match parent.get(key) {
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err(malformed(path, "expected a string")),
        None => Err(malformed(path, "missing")),
    }
}

fn optional_string(parent: &Map<String, Value>, key: &str, path: &str) -> Result<(), ManifestError> {
    match parent.get(key) {
        None | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(malformed(path, "expected a string")),
    }
}

fn optional_string_array(
    parent: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<(), ManifestError> {
    match parent.get(key) {
        None => Ok(()),
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => Ok(()),
        Some(_) => Err(malformed(path, "expected an array of strings")),
    }
}

fn validate_info(info: &Map<String, Value>) -> Result<(), ManifestError> {
    required_string(info, "name", "info.name")?;
    optional_string(info, "description", "info.description")?;
    optional_string(info, "author", "info.author")?;
    optional_string(info, "avatar_url", "info.avatar_url")?;
    optional_string(info, "source", "info.source")?;
    optional_string_array(info, "tags", "info.tags")
}

fn validate_string_dependencies(root: &Map<String, Value>) -> Result<(), ManifestError> {
    match root.get("dependencies") {
        None => Ok(()),
        Some(Value::Object(deps)) => {
            for (path, range) in deps {
                if !range.is_string() {
                    return Err(malformed(
                        &format!("dependencies.{path}"),
                        "expected a version range string",
                    ));
                }
            }
            Ok(())
        }
        Some(_) => Err(malformed("dependencies", "expected an object")),
    }
}

pub fn validate_v1(value: &Value) -> Result<(), ManifestError> {
    let root = root_object(value)?;
    optional_string(root, "tooth", "tooth")?;
    optional_string(root, "version", "version")?;

    let information = required_object(root, "information", "information")?;
    required_string(information, "name", "information.name")?;
    optional_string(information, "description", "information.description")?;
    optional_string(information, "author", "information.author")?;
    optional_string_array(information, "tags", "information.tags")?;

    match root.get("dependencies") {
        None => Ok(()),
        Some(Value::Object(deps)) => {
            for (path, ranges) in deps {
                let field = format!("dependencies.{path}");
                let Some(ranges) = ranges.as_array() else {
                    return Err(malformed(&field, "expected a list of [lower, upper] pairs"));
                };
                let well_formed = ranges.iter().all(|pair| {
                    pair.as_array()
                        .is_some_and(|bounds| bounds.len() == 2 && bounds.iter().all(Value::is_string))
                });
                if !well_formed {
                    return Err(malformed(&field, "expected a list of [lower, upper] pairs"));
                }
            }
            Ok(())
        }
        Some(_) => Err(malformed("dependencies", "expected an object")),
    }
}

pub fn validate_v2(value: &Value) -> Result<(), ManifestError> {
    let root = root_object(value)?;
    required_string(root, "tooth", "tooth")?;
    required_string(root, "version", "version")?;
    validate_info(required_object(root, "info", "info")?)?;
    validate_string_dependencies(root)
}

pub fn validate_v3(value: &Value) -> Result<(), ManifestError> {
    validate_v2(value)?;
    let root = root_object(value)?;
    optional_string(root, "platform_requirement", "platform_requirement")
}
