//! Per-item delivery: detail fetch, formatting, send, mark.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::{sleep_until, Instant};
use url::Url;

use crate::adapter::SourceAdapter;
use crate::sink::{ChannelSink, SinkError, MAX_ALBUM};
use crate::source::types::SourceConfig;
use crate::store::CursorStore;
use crate::telemetry;

pub mod format;

pub use format::format_message;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyDelivered,
    /// Detail page gone or not fetchable right now.
    Unavailable,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadyDelivered => "already_delivered",
            SkipReason::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered,
    Skipped(SkipReason),
    /// Not marked; the item is offered again next cycle.
    Failed(SinkError),
}

/// Keeps a minimum gap between successive sends within one cycle.
pub struct Pacer {
    spacing: Duration,
    last_send: Option<Instant>,
}

impl Pacer {
    pub fn new(spacing: Duration) -> Self { Self { spacing, last_send: None } }

    async fn wait(&self) {
        if let Some(last) = self.last_send {
            sleep_until(last + self.spacing).await;
        }
    }

    fn mark(&mut self) { self.last_send = Some(Instant::now()); }
}

pub struct Pipeline {
    store: Arc<dyn CursorStore>,
    sink: Arc<dyn ChannelSink>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn CursorStore>, sink: Arc<dyn ChannelSink>) -> Self { Self { store, sink } }

    /// Deliver one identifier. `Err` only for store failures; sink and detail
    /// problems come back as an outcome.
    pub async fn deliver(
        &self,
        pacer: &mut Pacer,
        adapter: &dyn SourceAdapter,
        source: &SourceConfig,
        identifier: &str,
    ) -> Result<DeliveryOutcome> {
        let log = telemetry::poll();

        if self.store.is_delivered(source.source_id, identifier).await? {
            return Ok(DeliveryOutcome::Skipped(SkipReason::AlreadyDelivered));
        }

        let record = match adapter.fetch_detail(identifier).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                log.info_kv("detail unavailable", [("source_id", source.source_id.to_string()), ("identifier", identifier.to_string())]);
                return Ok(DeliveryOutcome::Skipped(SkipReason::Unavailable));
            }
            Err(e) => {
                log.warn_kv(
                    "detail fetch failed",
                    [("source_id", source.source_id.to_string()), ("identifier", identifier.to_string()), ("error", format!("{e:#}"))],
                );
                return Ok(DeliveryOutcome::Skipped(SkipReason::Unavailable));
            }
        };

        let message = format_message(&record, source.kind);
        let images = usable_images(&record.images);

        if let Err(err) = self.send(pacer, &source.destination, &message, &images).await {
            return Ok(DeliveryOutcome::Failed(err));
        }

        self.store
            .mark_delivered(source.source_id, identifier)
            .await
            .with_context(|| format!("mark {identifier} delivered for source {}", source.source_id))?;
        Ok(DeliveryOutcome::Delivered)
    }

    async fn send(&self, pacer: &mut Pacer, destination: &str, message: &str, images: &[String]) -> Result<(), SinkError> {
        pacer.wait().await;
        let res = match images {
            [] => self.sink.send_text(destination, message).await,
            [one] => self.sink.send_image(destination, message, one).await,
            many => self.sink.send_album(destination, message, many).await,
        };
        pacer.mark();

        match res {
            Err(SinkError::MediaRejected { description }) => {
                telemetry::poll().warn_kv("media rejected, sending text", [("reason", description)]);
                pacer.wait().await;
                let res = self.sink.send_text(destination, message).await;
                pacer.mark();
                res
            }
            other => other,
        }
    }
}

/// Absolute http(s) URLs only, at most one album's worth.
fn usable_images(images: &[String]) -> Vec<String> {
    images
        .iter()
        .filter(|src| Url::parse(src).is_ok_and(|u| matches!(u.scheme(), "http" | "https")))
        .take(MAX_ALBUM)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::DeliveryRecord;
    use crate::source::types::SourceKind;
    use crate::store::memory::MemoryStore;
    use crate::testing::{source, RecordingSink, ScriptedAdapter, SendKind};
    use reqwest::StatusCode;

    struct Harness {
        store: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
        adapter: ScriptedAdapter,
        pipeline: Pipeline,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        let pipeline = Pipeline::new(store.clone(), sink.clone());
        Harness { store, sink, adapter: ScriptedAdapter::new(), pipeline }
    }

    fn with_images(n: usize) -> DeliveryRecord {
        DeliveryRecord {
            url: "https://www.olx.uz/d/obyavlenie/a-ID1.html".into(),
            title: Some("Cobalt".into()),
            images: (0..n).map(|i| format!("https://img.test/{i}.jpg")).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn delivered_item_is_marked_and_sent_once() {
        let h = harness();
        let src = source(1, SourceKind::Olx);
        let mut pacer = Pacer::new(Duration::ZERO);

        let out = h.pipeline.deliver(&mut pacer, &h.adapter, &src, "/d/a").await.unwrap();
        assert!(matches!(out, DeliveryOutcome::Delivered));
        assert!(h.store.delivered(1).contains("/d/a"));

        let again = h.pipeline.deliver(&mut pacer, &h.adapter, &src, "/d/a").await.unwrap();
        assert!(matches!(again, DeliveryOutcome::Skipped(SkipReason::AlreadyDelivered)));
        assert_eq!(h.sink.sent().len(), 1);
        assert_eq!(h.adapter.detail_calls().len(), 1);
    }

    #[tokio::test]
    async fn unavailable_detail_is_skipped_and_not_marked() {
        let h = harness();
        let src = source(1, SourceKind::Avtoelon);
        h.adapter.set_detail("/a/show/1", None);
        h.adapter.fail_detail("/a/show/2");
        let mut pacer = Pacer::new(Duration::ZERO);

        for id in ["/a/show/1", "/a/show/2"] {
            let out = h.pipeline.deliver(&mut pacer, &h.adapter, &src, id).await.unwrap();
            assert!(matches!(out, DeliveryOutcome::Skipped(SkipReason::Unavailable)));
        }
        assert!(h.store.delivered(1).is_empty());
        assert!(h.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn send_failure_leaves_item_unmarked() {
        let h = harness();
        let src = source(1, SourceKind::Olx);
        h.sink.fail_next(SinkError::Api { status: StatusCode::FORBIDDEN, description: "bot was kicked".into() });
        let mut pacer = Pacer::new(Duration::ZERO);

        let out = h.pipeline.deliver(&mut pacer, &h.adapter, &src, "/d/a").await.unwrap();
        assert!(matches!(out, DeliveryOutcome::Failed(SinkError::Api { .. })));
        assert!(h.store.delivered(1).is_empty());

        let retry = h.pipeline.deliver(&mut pacer, &h.adapter, &src, "/d/a").await.unwrap();
        assert!(matches!(retry, DeliveryOutcome::Delivered));
    }

    #[tokio::test]
    async fn send_shape_follows_image_count() {
        let h = harness();
        let src = source(1, SourceKind::Olx);
        h.adapter.set_detail("/d/none", Some(with_images(0)));
        h.adapter.set_detail("/d/one", Some(with_images(1)));
        h.adapter.set_detail("/d/many", Some(with_images(14)));
        let mut pacer = Pacer::new(Duration::ZERO);

        for id in ["/d/none", "/d/one", "/d/many"] {
            h.pipeline.deliver(&mut pacer, &h.adapter, &src, id).await.unwrap();
        }
        let sent = h.sink.sent();
        assert_eq!(sent.iter().map(|s| s.kind.clone()).collect::<Vec<_>>(), vec![SendKind::Text, SendKind::Image, SendKind::Album]);
        assert_eq!(sent[2].images.len(), MAX_ALBUM);
        assert!(sent.iter().all(|s| s.destination == "@chan1"));
    }

    #[tokio::test]
    async fn relative_images_are_dropped_before_sending() {
        let h = harness();
        let src = source(1, SourceKind::Olx);
        let mut rec = with_images(0);
        rec.images = vec!["/static/a.jpg".into(), "data:image/png;base64,AAA".into(), "https://img.test/ok.jpg".into()];
        h.adapter.set_detail("/d/a", Some(rec));
        let mut pacer = Pacer::new(Duration::ZERO);

        h.pipeline.deliver(&mut pacer, &h.adapter, &src, "/d/a").await.unwrap();
        let sent = h.sink.sent();
        assert_eq!(sent[0].kind, SendKind::Image);
        assert_eq!(sent[0].images, vec!["https://img.test/ok.jpg".to_string()]);
    }

    #[tokio::test]
    async fn all_unusable_images_send_text() {
        let h = harness();
        let src = source(1, SourceKind::Olx);
        let mut rec = with_images(0);
        rec.images = vec!["/static/a.jpg".into(), "data:image/png;base64,AAA".into()];
        h.adapter.set_detail("/d/a", Some(rec));
        let mut pacer = Pacer::new(Duration::ZERO);

        let out = h.pipeline.deliver(&mut pacer, &h.adapter, &src, "/d/a").await.unwrap();
        assert!(matches!(out, DeliveryOutcome::Delivered));
        let sent = h.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, SendKind::Text);
        assert!(sent[0].images.is_empty());
    }

    #[tokio::test]
    async fn rejected_media_falls_back_to_text() {
        let h = harness();
        let src = source(1, SourceKind::Olx);
        h.adapter.set_detail("/d/a", Some(with_images(3)));
        h.sink.reject_media();
        let mut pacer = Pacer::new(Duration::ZERO);

        let out = h.pipeline.deliver(&mut pacer, &h.adapter, &src, "/d/a").await.unwrap();
        assert!(matches!(out, DeliveryOutcome::Delivered));
        let sent = h.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, SendKind::Text);
        assert!(sent[0].message.contains("<b>Cobalt</b>"));
    }

    #[tokio::test]
    async fn successive_sends_are_spaced() {
        let h = harness();
        let src = source(1, SourceKind::Olx);
        let spacing = Duration::from_millis(40);
        let mut pacer = Pacer::new(spacing);

        let start = Instant::now();
        for id in ["/d/a", "/d/b", "/d/c"] {
            h.pipeline.deliver(&mut pacer, &h.adapter, &src, id).await.unwrap();
        }
        assert!(start.elapsed() >= spacing * 2);
        assert_eq!(h.sink.sent().len(), 3);
    }
}
