use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::LazyLock,
};

use common::{
    error::AppError,
    storage::types::package::{Contributor, PackageRecord, VersionRecord},
    utils::timestamp::{canonical, parse_timestamp},
};
use regex::Regex;
use tracing::warn;

static CATEGORY_TAG: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+:[a-z0-9-]+$").ok());

/// Whether `tag` has the `category:value` shape used for faceted filtering.
pub fn is_category_tag(tag: &str) -> bool {
    CATEGORY_TAG
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(tag))
}

/// One version as reported by a source, before timestamp normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawVersion {
    pub version: String,
    pub released_at: String,
    pub source: String,
    pub package_manager: String,
    pub platform_version_requirement: Option<String>,
}

/// Everything the adapters learned about one package, possibly from several
/// sources, prior to normalization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawPackage {
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub author: String,
    pub tags: Vec<String>,
    pub avatar_url: String,
    pub project_url: String,
    pub hotness: f64,
    pub contributors: Vec<Contributor>,
    pub versions: Vec<RawVersion>,
    pub source: String,
    pub package_manager: String,
}

impl From<PackageRecord> for RawPackage {
    fn from(record: PackageRecord) -> Self {
        Self {
            identifier: record.identifier,
            name: record.name,
            description: record.description,
            author: record.author,
            tags: record.tags,
            avatar_url: record.avatar_url,
            project_url: record.project_url,
            hotness: record.hotness,
            contributors: record.contributors,
            versions: record
                .versions
                .into_iter()
                .map(|v| RawVersion {
                    version: v.version,
                    released_at: v.released_at,
                    source: v.source,
                    package_manager: v.package_manager,
                    platform_version_requirement: v.platform_version_requirement,
                })
                .collect(),
            source: record.source,
            package_manager: record.package_manager,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizerConfig {
    /// Raw tag to canonical tag. Tags without an entry pass through.
    pub tag_replacements: BTreeMap<String, String>,
    /// Sources in the order their versions win a duplicate version string.
    pub source_precedence: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        let tag_replacements = [
            ("endstone", "platform:endstone"),
            ("levilamina", "platform:levilamina"),
            ("mod", "type:mod"),
            ("plugin", "type:mod"),
            ("modpack", "type:modpack"),
            ("addon", "type:addon"),
            ("world", "type:world"),
        ]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();

        Self {
            tag_replacements,
            source_precedence: vec!["github".to_string(), "pypi".to_string()],
        }
    }
}

/// Turns a [`RawPackage`] into a canonical [`PackageRecord`].
///
/// Deterministic and idempotent: normalizing the output of a previous run
/// yields the same record.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn normalize(&self, raw: RawPackage) -> Result<PackageRecord, AppError> {
        let tags = self.canonical_tags(&raw.tags);
        let contributors = filter_contributors(raw.contributors);
        let versions = self.reconcile_versions(&raw.identifier, raw.versions);

        let Some(updated) = versions.first().map(|v| v.released_at.clone()) else {
            return Err(AppError::EmptyVersionSet(raw.identifier));
        };

        Ok(PackageRecord {
            identifier: raw.identifier,
            name: raw.name,
            description: raw.description,
            author: raw.author,
            tags,
            avatar_url: raw.avatar_url,
            project_url: raw.project_url,
            hotness: raw.hotness,
            updated,
            contributors,
            versions,
            source: raw.source,
            package_manager: raw.package_manager,
        })
    }

    /// Replaces, deduplicates, then orders category tags before free tags.
    pub fn canonical_tags(&self, raw: &[String]) -> Vec<String> {
        let unique: BTreeSet<&str> = raw
            .iter()
            .map(|tag| {
                self.config
                    .tag_replacements
                    .get(tag)
                    .map_or(tag.as_str(), String::as_str)
            })
            .collect();

        let (mut categorized, free): (Vec<&str>, Vec<&str>) =
            unique.into_iter().partition(|tag| is_category_tag(tag));
        categorized.extend(free);
        categorized.into_iter().map(str::to_string).collect()
    }

    fn precedence_rank(&self, source: &str) -> usize {
        self.config
            .source_precedence
            .iter()
            .position(|known| known == source)
            .unwrap_or(self.config.source_precedence.len())
    }

    fn reconcile_versions(&self, identifier: &str, raw: Vec<RawVersion>) -> Vec<VersionRecord> {
        let mut ranked = raw;
        // Stable: equal ranks keep the order the adapter produced.
        ranked.sort_by_key(|v| self.precedence_rank(&v.source));

        let mut seen = HashSet::new();
        let mut versions = Vec::with_capacity(ranked.len());
        for version in ranked {
            if seen.contains(&version.version) {
                continue;
            }

            let Some(released_at) = parse_timestamp(&version.released_at) else {
                warn!(
                    identifier,
                    version = %version.version,
                    released_at = %version.released_at,
                    "Skipping version with unparseable release timestamp"
                );
                continue;
            };

            seen.insert(version.version.clone());
            versions.push((
                released_at,
                VersionRecord {
                    version: version.version,
                    released_at: canonical(released_at),
                    source: version.source,
                    package_manager: version.package_manager,
                    platform_version_requirement: version.platform_version_requirement,
                },
            ));
        }

        versions.sort_by(|(a, _), (b, _)| b.cmp(a));
        versions.into_iter().map(|(_, record)| record).collect()
    }
}

fn filter_contributors(raw: Vec<Contributor>) -> Vec<Contributor> {
    let mut contributors: Vec<Contributor> = raw
        .into_iter()
        .filter(|c| !c.username.is_empty())
        .collect();
    contributors.sort_by(|a, b| b.contributions.cmp(&a.contributions));
    contributors
}
