use crate::stored_object;

/// A single contributor as reported by the code host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contributor {
    pub username: String,
    pub contributions: u64,
}

/// One published version of a package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub version: String,
    /// Canonical `YYYY-MM-DDTHH:MM:SS.mmmZ` timestamp.
    pub released_at: String,
    pub source: String,
    pub package_manager: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_version_requirement: Option<String>,
}

/// The canonical, normalized package as served by the search API.
///
/// Produced only by the normalizer; `updated` always equals
/// `versions[0].released_at` and `versions` is sorted newest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub author: String,
    pub tags: Vec<String>,
    pub avatar_url: String,
    pub project_url: String,
    pub hotness: f64,
    pub updated: String,
    pub contributors: Vec<Contributor>,
    pub versions: Vec<VersionRecord>,
    pub source: String,
    pub package_manager: String,
}

stored_object!(PackageDocument, "package", {
    identifier: String,
    name: String,
    description: String,
    author: String,
    tags: Vec<String>,
    avatar_url: String,
    project_url: String,
    hotness: f64,
    updated: String,
    contributors: Vec<Contributor>,
    versions: Vec<VersionRecord>,
    source: String,
    package_manager: String,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime")]
    expires_at: DateTime<Utc>
});

impl PackageDocument {
    /// `created_at` is the first publication; `now` is this write.
    pub fn from_record(
        record: PackageRecord,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: record.identifier.clone(),
            created_at,
            updated_at: now,
            identifier: record.identifier,
            name: record.name,
            description: record.description,
            author: record.author,
            tags: record.tags,
            avatar_url: record.avatar_url,
            project_url: record.project_url,
            hotness: record.hotness,
            updated: record.updated,
            contributors: record.contributors,
            versions: record.versions,
            source: record.source,
            package_manager: record.package_manager,
            expires_at,
        }
    }

    pub fn into_record(self) -> PackageRecord {
        PackageRecord {
            identifier: self.identifier,
            name: self.name,
            description: self.description,
            author: self.author,
            tags: self.tags,
            avatar_url: self.avatar_url,
            project_url: self.project_url,
            hotness: self.hotness,
            updated: self.updated,
            contributors: self.contributors,
            versions: self.versions,
            source: self.source,
            package_manager: self.package_manager,
        }
    }
}
