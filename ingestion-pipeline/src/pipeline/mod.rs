mod config;

pub use config::{CrawlConfig, CrawlTuning};

use std::{collections::HashSet, sync::Arc, time::Instant};

use common::{error::AppError, storage::store::PackageStore};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    normalize::Normalizer,
    sources::{RepoDescriptor, SourceAdapter},
};

/// Summary of one adapter's pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub adapter: &'static str,
    pub discovered: usize,
    pub published: usize,
    /// Packages with nothing publishable this cycle.
    pub withheld: usize,
    pub failed: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackageOutcome {
    Published,
    Withheld,
    Failed,
}

/// Drives every registered adapter through discovery, normalization and
/// indexing.
pub struct CrawlPipeline {
    store: PackageStore,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    normalizer: Normalizer,
    config: CrawlConfig,
}

impl CrawlPipeline {
    pub fn new(
        store: PackageStore,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        normalizer: Normalizer,
        config: CrawlConfig,
    ) -> Self {
        Self {
            store,
            adapters,
            normalizer,
            config,
        }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Runs one pass per adapter, in registration order. A failing adapter
    /// does not stop the ones after it.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> Vec<CrawlReport> {
        let started = Instant::now();
        let mut reports = Vec::with_capacity(self.adapters.len());

        for adapter in &self.adapters {
            if shutdown.is_cancelled() {
                break;
            }
            match self.run_pass(adapter.as_ref(), shutdown).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    warn!(adapter = adapter.name(), error = %err, "Crawl pass aborted; retrying next cycle");
                }
            }
        }

        info!(
            adapters = reports.len(),
            published = reports.iter().map(|r| r.published).sum::<usize>(),
            elapsed_ms = started.elapsed().as_millis(),
            "Crawl cycle finished"
        );
        reports
    }

    /// Crawls a single adapter. Per-package failures are counted and skipped;
    /// discovery and store failures abort the pass.
    #[tracing::instrument(skip_all, fields(adapter = adapter.name()))]
    pub async fn run_pass(
        &self,
        adapter: &dyn SourceAdapter,
        shutdown: &CancellationToken,
    ) -> Result<CrawlReport, AppError> {
        let mut report = CrawlReport {
            adapter: adapter.name(),
            ..CrawlReport::default()
        };

        // Code search reports one hit per matching file, so a repository can
        // show up more than once per pass.
        let mut seen = HashSet::new();
        let mut outcomes = std::pin::pin!(adapter
            .discover()
            .filter_map(move |discovered| {
                futures::future::ready(match discovered {
                    Ok(repo) if !seen.insert(repo.clone()) => None,
                    other => Some(other),
                })
            })
            .map(|discovered| async move {
                let repo = discovered?;
                self.ingest(adapter, &repo).await
            })
            .buffer_unordered(self.config.tuning.fetch_concurrency.max(1))
            .take_until(shutdown.cancelled()));

        while let Some(outcome) = outcomes.next().await {
            report.discovered += 1;
            match outcome? {
                PackageOutcome::Published => report.published += 1,
                PackageOutcome::Withheld => report.withheld += 1,
                PackageOutcome::Failed => report.failed += 1,
            }
        }
        report.cancelled = shutdown.is_cancelled();

        info!(
            discovered = report.discovered,
            published = report.published,
            withheld = report.withheld,
            failed = report.failed,
            cancelled = report.cancelled,
            "Crawl pass finished"
        );
        Ok(report)
    }

    async fn ingest(
        &self,
        adapter: &dyn SourceAdapter,
        repo: &RepoDescriptor,
    ) -> Result<PackageOutcome, AppError> {
        let identifier = repo.identifier();

        let raw = match adapter.fetch_facts(repo).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(%identifier, "Nothing publishable; package withheld");
                return Ok(PackageOutcome::Withheld);
            }
            Err(err) => {
                warn!(%identifier, error = %err, "Failed to fetch package");
                return Ok(PackageOutcome::Failed);
            }
        };

        let record = match self.normalizer.normalize(raw) {
            Ok(record) => record,
            Err(AppError::EmptyVersionSet(_)) => {
                debug!(%identifier, "No resolvable versions; package withheld");
                return Ok(PackageOutcome::Withheld);
            }
            Err(err) => {
                warn!(%identifier, error = %err, "Failed to normalize package");
                return Ok(PackageOutcome::Failed);
            }
        };

        self.store.upsert(record, self.config.record_ttl).await?;
        debug!(%identifier, "Package published");
        Ok(PackageOutcome::Published)
    }
}
