use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::adapter::AdapterSet;
use crate::config::WatchConfig;
use crate::delivery::{DeliveryOutcome, Pacer, Pipeline};
use crate::diff::{classify, Cursor, Verdict};
use crate::sink::ChannelSink;
use crate::source::types::SourceConfig;
use crate::store::{CursorStore, SourceRegistry};
use crate::telemetry::{self};
use crate::telemetry::ops::poll::Phase as PollPhase;

/// Outcome of one source within a cycle.
#[derive(Debug, Default, Serialize)]
pub struct SourceReport {
    pub source_id: i32,
    pub verdict: Option<&'static str>,
    pub candidates: usize,
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Set when the source was abandoned for this cycle.
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct CycleReport {
    pub sources: Vec<SourceReport>,
}

impl CycleReport {
    pub fn delivered(&self) -> usize { self.sources.iter().map(|s| s.delivered).sum() }
    pub fn skipped(&self) -> usize { self.sources.iter().map(|s| s.skipped).sum() }
    pub fn failed(&self) -> usize { self.sources.iter().map(|s| s.failed).sum() }
    pub fn failed_sources(&self) -> usize { self.sources.iter().filter(|s| s.error.is_some()).count() }

    #[cfg(test)]
    pub fn source(&self, source_id: i32) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source_id == source_id)
    }
}

pub struct Scheduler {
    registry: Arc<dyn SourceRegistry>,
    store: Arc<dyn CursorStore>,
    adapters: AdapterSet,
    pipeline: Pipeline,
    cfg: WatchConfig,
}

impl Scheduler {
    pub fn new(
        registry: Arc<dyn SourceRegistry>,
        store: Arc<dyn CursorStore>,
        adapters: AdapterSet,
        sink: Arc<dyn ChannelSink>,
        cfg: WatchConfig,
    ) -> Self {
        let pipeline = Pipeline::new(store.clone(), sink);
        Self { registry, store, adapters, pipeline, cfg }
    }

    /// Poll until `cancel` fires. Only the sleep between cycles is interrupted; a running cycle completes.
    pub async fn run(&self, cancel: CancellationToken) {
        let log = telemetry::poll();
        log.info_kv("scheduler started", [("interval_secs", self.cfg.poll_interval.as_secs().to_string())]);
        loop {
            if cancel.is_cancelled() {
                break;
            }
            if let Err(e) = self.run_cycle().await {
                log.error_kv("cycle failed", [("error", format!("{e:#}"))]);
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.cfg.poll_interval) => {}
            }
        }
        log.info("scheduler stopped");
    }

    /// One pass over every active source. `Err` only when the source list itself cannot be read.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let log = telemetry::poll();
        let _c = log.span(&PollPhase::Cycle).entered();

        let sources = self.registry.active_sources().await.context("load active sources")?;
        let mut pacer = Pacer::new(self.cfg.delivery_spacing);
        let mut report = CycleReport::default();

        for (i, source) in sources.iter().enumerate() {
            if i > 0 {
                sleep(self.cfg.inter_source_delay).await;
            }
            let _s = log
                .span_kv(&PollPhase::Source, [("source_id", source.source_id.to_string()), ("kind", source.kind.as_str().to_string())])
                .entered();

            let mut sr = SourceReport { source_id: source.source_id, ..Default::default() };
            if let Err(e) = self.poll_source(&mut pacer, source, &mut sr).await {
                log.error_kv("source failed", [("source_id", source.source_id.to_string()), ("error", format!("{e:#}"))]);
                sr.error = Some(format!("{e:#}"));
            }
            log.source_summary(sr.source_id, sr.delivered, sr.skipped, sr.failed);
            report.sources.push(sr);
        }

        log.cycle_totals(report.sources.len(), report.failed_sources(), report.delivered(), report.skipped(), report.failed());
        Ok(report)
    }

    async fn poll_source(&self, pacer: &mut Pacer, source: &SourceConfig, sr: &mut SourceReport) -> Result<()> {
        let log = telemetry::poll();
        let adapter = self
            .adapters
            .get(source.kind)
            .ok_or_else(|| anyhow!("no adapter for kind {}", source.kind.as_str()))?;

        let candidates = {
            let _p = log.span(&PollPhase::FetchCandidates).entered();
            timeout(self.cfg.fetch_timeout, adapter.fetch_candidates(source))
                .await
                .map_err(|_| anyhow!("candidate fetch timed out after {:?}", self.cfg.fetch_timeout))?
                .context("fetch candidates")?
        };
        sr.candidates = candidates.len();

        let (plan, known_count) = {
            let _p = log.span(&PollPhase::Classify).entered();
            let mut cursor = self.store.load(source.source_id).await?.unwrap_or_default();
            let known = self.store.delivered_among(source.source_id, &candidates).await?;
            // a bookmark with nothing ever delivered behind it is still a cold start
            if !cursor.is_empty() && known.is_empty() && !self.store.has_any_delivered(source.source_id).await? {
                cursor = Cursor::default();
            }
            (classify(&candidates, &cursor, &known), known.len())
        };
        sr.verdict = Some(plan.verdict.as_str());

        let kv = [
            ("source_id", source.source_id.to_string()),
            ("verdict", plan.verdict.as_str().to_string()),
            ("candidates", candidates.len().to_string()),
            ("known", known_count.to_string()),
            ("new", plan.to_deliver.len().to_string()),
        ];
        if plan.verdict == Verdict::ContinuityLoss {
            log.warn_kv("listing shares nothing with delivery history, sending newest only", kv);
        } else {
            log.info_kv("classified", kv);
        }

        {
            let _p = log.span(&PollPhase::Deliver).entered();
            for identifier in &plan.to_deliver {
                let item = [("source_id", source.source_id.to_string()), ("identifier", identifier.clone())];
                match self.pipeline.deliver(pacer, adapter.as_ref(), source, identifier).await? {
                    DeliveryOutcome::Delivered => {
                        sr.delivered += 1;
                        log.info_kv("delivered", item);
                    }
                    DeliveryOutcome::Skipped(reason) => {
                        sr.skipped += 1;
                        log.info_kv(&format!("skipped ({})", reason.as_str()), item);
                    }
                    DeliveryOutcome::Failed(err) => {
                        sr.failed += 1;
                        let [a, b] = item;
                        log.error_kv("send failed, will retry next cycle", [a, b, ("error", err.to_string())]);
                    }
                }
            }
        }

        let _p = log.span(&PollPhase::SaveCursor).entered();
        self.store.save(source.source_id, &plan.cursor).await.context("save cursor")?;
        Ok(())
    }
}
