use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Datetime as SurrealDatetime;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        filter::{Filter, SetField, TextField},
        types::{
            package::{PackageDocument, PackageRecord},
            StoredObject,
        },
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Hotness,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortKey::Hotness => "hotness",
            SortKey::Updated => "updated",
        })
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        })
    }
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "hotness" => Ok(Self::Hotness),
            "updated" => Ok(Self::Updated),
            other => Err(format!("unknown sort key '{other}'")),
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort order '{other}'")),
        }
    }
}

/// One page of matches plus the total number of live matches.
#[derive(Debug, Clone, PartialEq)]
pub struct PackagePage {
    pub items: Vec<PackageRecord>,
    pub total: u64,
}

impl PackagePage {
    fn empty(total: u64) -> Self {
        Self {
            items: Vec::new(),
            total,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: u64,
}

/// TTL-bounded package index backed by SurrealDB.
///
/// Every record carries an absolute `expires_at`; reads never return a record
/// past that instant, and [`PackageStore::spawn_sweeper`] removes them
/// physically. Writes are last-write-wins per identifier.
#[derive(Clone)]
pub struct PackageStore {
    db: Arc<SurrealDbClient>,
}

impl PackageStore {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Arc<SurrealDbClient> {
        &self.db
    }

    pub async fn upsert(&self, record: PackageRecord, ttl: Duration) -> Result<(), AppError> {
        self.upsert_at(record, ttl, Utc::now()).await
    }

    pub async fn upsert_at(
        &self,
        record: PackageRecord,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let ttl = ChronoDuration::from_std(ttl)
            .map_err(|err| AppError::Validation(format!("ttl out of range: {err}")))?;
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AppError::Validation("ttl overflows the calendar".to_string()))?;

        let identifier = record.identifier.clone();
        let created_at = self
            .db
            .get_item::<PackageDocument>(&identifier)
            .await?
            .filter(|existing| existing.expires_at > now)
            .map_or(now, |existing| existing.created_at);
        let document = PackageDocument::from_record(record, created_at, now, expires_at);

        let _stored: Option<PackageDocument> = self
            .db
            .client
            .upsert((PackageDocument::table_name(), identifier.as_str()))
            .content(document)
            .await?;

        debug!(identifier = %identifier, expires_at = %expires_at, "Package upserted");
        Ok(())
    }

    pub async fn fetch(&self, identifier: &str) -> Result<Option<PackageRecord>, AppError> {
        self.fetch_at(identifier, Utc::now()).await
    }

    pub async fn fetch_at(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PackageRecord>, AppError> {
        let document: Option<PackageDocument> = self.db.get_item(identifier).await?;

        Ok(document
            .filter(|doc| doc.expires_at > now)
            .map(PackageDocument::into_record))
    }

    pub async fn query(
        &self,
        filter: &Filter,
        sort: SortKey,
        order: SortOrder,
        offset: usize,
        limit: usize,
    ) -> Result<PackagePage, AppError> {
        self.query_at(filter, sort, order, offset, limit, Utc::now())
            .await
    }

    pub async fn query_at(
        &self,
        filter: &Filter,
        sort: SortKey,
        order: SortOrder,
        offset: usize,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<PackagePage, AppError> {
        let mut clause = ClauseBuilder::default();
        let condition = clause.render(filter);

        let mut counted = self
            .db
            .client
            .query(format!(
                "SELECT count() AS count FROM type::table($table) \
                 WHERE expires_at > $now AND {condition} GROUP ALL;"
            ))
            .bind(("table", PackageDocument::table_name()))
            .bind(("now", SurrealDatetime::from(now)))
            .bind(clause.params.clone())
            .await?;
        let count: Option<CountRow> = counted.take(0)?;
        let total = count.map_or(0, |row| row.count);

        // Past the last match there is nothing to fetch; SurrealDB also
        // rejects START values beyond the signed range.
        if u64::try_from(offset).unwrap_or(u64::MAX) >= total {
            return Ok(PackagePage::empty(total));
        }
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut response = self
            .db
            .client
            .query(format!(
                "SELECT * FROM type::table($table) WHERE expires_at > $now AND {condition} \
                 ORDER BY {sort} {order} LIMIT $limit START $offset;"
            ))
            .bind(("table", PackageDocument::table_name()))
            .bind(("now", SurrealDatetime::from(now)))
            .bind(("limit", limit))
            .bind(("offset", offset))
            .bind(clause.params)
            .await?;

        let documents: Vec<PackageDocument> = response.take(0)?;

        Ok(PackagePage {
            items: documents
                .into_iter()
                .map(PackageDocument::into_record)
                .collect(),
            total,
        })
    }

    /// Physically removes every record whose TTL has elapsed.
    pub async fn sweep_expired(&self) -> Result<usize, AppError> {
        self.sweep_expired_at(Utc::now()).await
    }

    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let mut response = self
            .db
            .client
            .query("DELETE type::table($table) WHERE expires_at <= $now RETURN BEFORE")
            .bind(("table", PackageDocument::table_name()))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let removed: Vec<PackageDocument> = response.take(0)?;
        Ok(removed.len())
    }

    /// Runs [`PackageStore::sweep_expired`] every `every` until `shutdown` fires.
    pub fn spawn_sweeper(&self, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        debug!("Expiry sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        match store.sweep_expired().await {
                            Ok(0) => {}
                            Ok(removed) => info!(removed, "Swept expired packages"),
                            Err(err) => warn!(error = %err, "Expiry sweep failed"),
                        }
                    }
                }
            }
        })
    }
}

fn text_column(field: TextField) -> &'static str {
    match field {
        TextField::Name => "name",
        TextField::Description => "description",
        TextField::Author => "author",
    }
}

fn set_column(field: SetField) -> &'static str {
    match field {
        SetField::Tags => "tags",
        SetField::VersionStrings => "versions.version",
        SetField::VersionSources => "versions.source",
        SetField::PackageManagers => "versions.packageManager",
        SetField::Contributors => "contributors.username",
    }
}

/// Renders a [`Filter`] into a SurrealQL condition. User values never reach
/// the query text; each one becomes a numbered parameter.
#[derive(Default)]
struct ClauseBuilder {
    params: BTreeMap<String, String>,
}

impl ClauseBuilder {
    fn bind(&mut self, value: String) -> String {
        let name = format!("p{}", self.params.len());
        self.params.insert(name.clone(), value);
        name
    }

    fn render(&mut self, filter: &Filter) -> String {
        match filter {
            Filter::MatchAll => "true".to_string(),
            Filter::And(children) => self.render_group(children, " AND ", "true"),
            Filter::Or(children) => self.render_group(children, " OR ", "false"),
            Filter::TextContains { field, value } => {
                let param = self.bind(value.to_lowercase());
                format!(
                    "string::contains(string::lowercase({}), ${param})",
                    text_column(*field)
                )
            }
            Filter::SetContains { field, value } => {
                let param = self.bind(value.clone());
                format!("{} CONTAINS ${param}", set_column(*field))
            }
        }
    }

    fn render_group(&mut self, children: &[Filter], joiner: &str, empty: &str) -> String {
        if children.is_empty() {
            return empty.to_string();
        }

        let mut parts = Vec::with_capacity(children.len());
        for child in children {
            parts.push(self.render(child));
        }
        format!("({})", parts.join(joiner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::package::VersionRecord;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    async fn store() -> PackageStore {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized()
            .await
            .expect("Failed to initialize schema");
        PackageStore::new(Arc::new(db))
    }

    fn record(identifier: &str, name: &str, hotness: f64, updated: &str, tags: &[&str]) -> PackageRecord {
        PackageRecord {
            identifier: identifier.to_string(),
            name: name.to_string(),
            description: format!("{name} description"),
            author: "someone".to_string(),
            tags: tags.iter().map(ToString::to_string).collect(),
            hotness,
            updated: updated.to_string(),
            versions: vec![VersionRecord {
                version: "1.0.0".to_string(),
                released_at: updated.to_string(),
                source: "github".to_string(),
                package_manager: "lip".to_string(),
                platform_version_requirement: None,
            }],
            source: "github".to_string(),
            ..Default::default()
        }
    }

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_upsert_then_fetch() {
        let store = store().await;
        let pkg = record("github:acme/widget", "Widget", 5.0, "2024-01-01T00:00:00.000Z", &["type:mod"]);

        store.upsert(pkg.clone(), TTL).await.expect("upsert");

        let fetched = store.fetch("github:acme/widget").await.expect("fetch");
        assert_eq!(fetched, Some(pkg));
        assert_eq!(store.fetch("github:acme/missing").await.expect("fetch"), None);
    }

    #[tokio::test]
    async fn test_record_is_evicted_once_ttl_elapses() {
        let store = store().await;
        let now = Utc::now();
        let pkg = record("github:acme/widget", "Widget", 5.0, "2024-01-01T00:00:00.000Z", &[]);

        store.upsert_at(pkg, TTL, now).await.expect("upsert");

        let before = store
            .fetch_at("github:acme/widget", now + ChronoDuration::seconds(59))
            .await
            .expect("fetch");
        assert!(before.is_some());

        let after = store
            .fetch_at("github:acme/widget", now + ChronoDuration::seconds(60))
            .await
            .expect("fetch");
        assert_eq!(after, None);
    }

    #[tokio::test]
    async fn test_reupsert_resets_ttl_and_overwrites() {
        let store = store().await;
        let now = Utc::now();
        let first = record("github:acme/widget", "Widget", 5.0, "2024-01-01T00:00:00.000Z", &[]);
        let second = record("github:acme/widget", "Widget Pro", 9.0, "2024-02-01T00:00:00.000Z", &[]);

        store.upsert_at(first, TTL, now).await.expect("first upsert");
        store
            .upsert_at(second.clone(), TTL, now + ChronoDuration::seconds(50))
            .await
            .expect("second upsert");

        let fetched = store
            .fetch_at("github:acme/widget", now + ChronoDuration::seconds(90))
            .await
            .expect("fetch");
        assert_eq!(fetched, Some(second));
    }

    #[tokio::test]
    async fn test_reupsert_keeps_first_publication_time() {
        let store = store().await;
        let first_seen = Utc::now();
        let refreshed = first_seen + ChronoDuration::seconds(50);
        let pkg = record("github:acme/widget", "Widget", 5.0, "2024-01-01T00:00:00.000Z", &[]);

        store.upsert_at(pkg.clone(), TTL, first_seen).await.expect("first upsert");
        store.upsert_at(pkg, TTL, refreshed).await.expect("second upsert");

        let document: PackageDocument = store
            .db()
            .get_item("github:acme/widget")
            .await
            .expect("select")
            .expect("stored document");
        assert_eq!(document.created_at, first_seen);
        assert_eq!(document.updated_at, refreshed);
        assert_eq!(document.expires_at, refreshed + ChronoDuration::seconds(60));
    }

    #[tokio::test]
    async fn test_offset_past_last_match_yields_empty_page() {
        let store = store().await;
        store
            .upsert(
                record("github:a/alpha", "Alpha", 1.0, "2024-03-01T00:00:00.000Z", &[]),
                TTL,
            )
            .await
            .expect("upsert");

        for offset in [1, usize::MAX] {
            let page = store
                .query(&Filter::MatchAll, SortKey::Hotness, SortOrder::Desc, offset, 20)
                .await
                .expect("query");

            assert!(page.items.is_empty());
            assert_eq!(page.total, 1);
        }
    }

    #[tokio::test]
    async fn test_query_filters_sorts_and_counts() {
        let store = store().await;
        let now = Utc::now();
        for pkg in [
            record("github:a/alpha", "Alpha", 1.0, "2024-03-01T00:00:00.000Z", &["platform:endstone"]),
            record("github:a/beta", "Beta", 3.0, "2024-01-01T00:00:00.000Z", &["platform:endstone"]),
            record("github:a/gamma", "Gamma", 2.0, "2024-02-01T00:00:00.000Z", &["platform:levilamina"]),
        ] {
            store.upsert_at(pkg, TTL, now).await.expect("upsert");
        }

        let page = store
            .query_at(
                &Filter::all(vec![Filter::tag("platform:endstone")]),
                SortKey::Hotness,
                SortOrder::Desc,
                0,
                10,
                now,
            )
            .await
            .expect("query");
        let names: Vec<_> = page.items.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Beta", "Alpha"]);
        assert_eq!(page.total, 2);

        let page = store
            .query_at(&Filter::MatchAll, SortKey::Updated, SortOrder::Asc, 1, 1, now)
            .await
            .expect("query");
        let names: Vec<_> = page.items.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Gamma"]);
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_text_match_is_case_insensitive_substring() {
        let store = store().await;
        let now = Utc::now();
        store
            .upsert_at(
                record("github:a/alpha", "SuperAlpha", 1.0, "2024-03-01T00:00:00.000Z", &[]),
                TTL,
                now,
            )
            .await
            .expect("upsert");

        let filter = Filter::all(vec![Filter::Or(vec![
            Filter::text(TextField::Name, "ALPHA"),
            Filter::tag("ALPHA"),
        ])]);
        let page = store
            .query_at(&filter, SortKey::Hotness, SortOrder::Desc, 0, 10, now)
            .await
            .expect("query");
        assert_eq!(page.total, 1);

        let page = store
            .query_at(
                &Filter::contains(SetField::PackageManagers, "lip"),
                SortKey::Hotness,
                SortOrder::Desc,
                0,
                10,
                now,
            )
            .await
            .expect("query");
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_query_hides_expired_and_sweeper_removes_them() {
        let store = store().await;
        let now = Utc::now();
        store
            .upsert_at(
                record("github:a/old", "Old", 1.0, "2024-01-01T00:00:00.000Z", &[]),
                TTL,
                now,
            )
            .await
            .expect("upsert");
        store
            .upsert_at(
                record("github:a/new", "New", 1.0, "2024-01-01T00:00:00.000Z", &[]),
                Duration::from_secs(600),
                now,
            )
            .await
            .expect("upsert");

        let later = now + ChronoDuration::seconds(61);
        let page = store
            .query_at(&Filter::MatchAll, SortKey::Hotness, SortOrder::Desc, 0, 10, later)
            .await
            .expect("query");
        assert_eq!(page.total, 1);
        assert_eq!(page.items.first().map(|p| p.name.as_str()), Some("New"));

        let removed = store.sweep_expired_at(later).await.expect("sweep");
        assert_eq!(removed, 1);

        let raw: Option<PackageDocument> = store
            .db()
            .get_item("github:a/old")
            .await
            .expect("raw fetch");
        assert!(raw.is_none());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let store = store().await;
        let shutdown = CancellationToken::new();
        let handle = store.spawn_sweeper(Duration::from_millis(10), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .expect("sweeper panicked");
    }

    #[test]
    fn test_clause_builder_binds_every_value() {
        let mut builder = ClauseBuilder::default();
        let filter = Filter::all(vec![
            Filter::Or(vec![
                Filter::text(TextField::Author, "Acme"),
                Filter::tag("type:mod"),
            ]),
            Filter::Or(Vec::new()),
        ]);

        let rendered = builder.render(&filter);

        assert_eq!(
            rendered,
            "((string::contains(string::lowercase(author), $p0) OR tags CONTAINS $p1) AND false)"
        );
        assert_eq!(builder.params.get("p0").map(String::as_str), Some("acme"));
        assert_eq!(builder.params.get("p1").map(String::as_str), Some("type:mod"));
    }

    #[test]
    fn test_sort_parameters_parse_lowercase_names() {
        assert_eq!("updated".parse::<SortKey>(), Ok(SortKey::Updated));
        assert_eq!("asc".parse::<SortOrder>(), Ok(SortOrder::Asc));
        assert!("Hotness".parse::<SortKey>().is_err());
        assert!("up".parse::<SortOrder>().is_err());
    }
}
