#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod manifest;
pub mod normalize;
pub mod pipeline;
pub mod sources;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use common::error::AppError;
pub use normalize::{Normalizer, NormalizerConfig};
pub use pipeline::{CrawlConfig, CrawlPipeline, CrawlReport, CrawlTuning};
pub use sources::{default_adapters, SourceAdapter};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Admits one crawl cycle at a time.
#[derive(Debug, Clone, Default)]
pub struct CycleGate {
    running: Arc<AtomicBool>,
}

/// Held for the duration of a cycle; dropping it reopens the gate.
#[derive(Debug)]
pub struct CycleGuard {
    running: Arc<AtomicBool>,
}

impl CycleGate {
    pub fn try_begin(&self) -> Option<CycleGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard {
                running: Arc::clone(&self.running),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// What the scheduler did before it was stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles_started: usize,
    pub triggers_skipped: usize,
}

/// Triggers a crawl cycle every `pipeline.config().interval` until `shutdown`
/// is cancelled. A trigger that fires while a cycle is still running is
/// skipped.
pub async fn run_crawl_loop(
    pipeline: Arc<CrawlPipeline>,
    shutdown: CancellationToken,
) -> Result<SchedulerStats, AppError> {
    let gate = CycleGate::default();
    let mut stats = SchedulerStats::default();
    let mut ticker = tokio::time::interval(pipeline.config().interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let Some(guard) = gate.try_begin() else {
                    stats.triggers_skipped += 1;
                    warn!("Previous crawl cycle still running; skipping trigger");
                    continue;
                };
                stats.cycles_started += 1;

                let pipeline = Arc::clone(&pipeline);
                let shutdown = shutdown.clone();
                in_flight = Some(tokio::spawn(async move {
                    let _guard = guard;
                    pipeline.run_cycle(&shutdown).await;
                }));
            }
        }
    }

    info!(
        cycles_started = stats.cycles_started,
        triggers_skipped = stats.triggers_skipped,
        "Crawl scheduler stopping"
    );
    if let Some(handle) = in_flight {
        handle.await?;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::AtomicUsize, time::Duration};

    use async_trait::async_trait;
    use common::storage::{db::SurrealDbClient, store::PackageStore};
    use futures::stream::BoxStream;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::*;
    use crate::{normalize::RawPackage, sources::RepoDescriptor};

    /// Discovers one repository and then takes far longer than the
    /// scheduler interval to fetch it.
    #[derive(Default)]
    struct SlowAdapter {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl SourceAdapter for SlowAdapter {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn discover(&self) -> BoxStream<'_, Result<RepoDescriptor, AppError>> {
            Box::pin(futures::stream::iter([Ok(RepoDescriptor::new("acme", "slow"))]))
        }

        async fn fetch_facts(&self, _repo: &RepoDescriptor) -> Result<Option<RawPackage>, AppError> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    async fn slow_pipeline(adapter: Arc<SlowAdapter>) -> Arc<CrawlPipeline> {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![adapter];
        Arc::new(CrawlPipeline::new(
            PackageStore::new(Arc::new(db)),
            adapters,
            Normalizer::new(NormalizerConfig::default()),
            CrawlConfig {
                tuning: CrawlTuning {
                    fetch_concurrency: 1,
                },
                record_ttl: Duration::from_secs(60),
                interval: Duration::from_millis(20),
            },
        ))
    }

    #[tokio::test]
    async fn slow_cycle_causes_later_triggers_to_be_skipped() {
        let adapter = Arc::new(SlowAdapter::default());
        let pipeline = slow_pipeline(Arc::clone(&adapter)).await;
        let shutdown = CancellationToken::new();

        let scheduler = tokio::spawn(run_crawl_loop(pipeline, shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();

        let stats = scheduler
            .await
            .expect("scheduler task")
            .expect("scheduler result");

        assert_eq!(stats.cycles_started, 1);
        assert!(stats.triggers_skipped >= 1);
        assert_eq!(adapter.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn gate_admits_one_cycle_at_a_time() {
        let gate = CycleGate::default();

        let guard = gate.try_begin().expect("gate starts open");
        assert!(gate.is_running());
        assert!(gate.try_begin().is_none());

        drop(guard);
        assert!(!gate.is_running());
        assert!(gate.try_begin().is_some());
    }

    #[test]
    fn clones_share_the_same_gate() {
        let gate = CycleGate::default();
        let other = gate.clone();

        let _guard = gate.try_begin().expect("gate starts open");
        assert!(other.try_begin().is_none());
    }
}
