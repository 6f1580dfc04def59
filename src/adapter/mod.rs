//! Source adapters: turn a listing page into ordered identifiers and one item into a detail record.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::source::types::{SourceConfig, SourceKind};

mod avtoelon;
pub mod fetch;
mod olx;

/// Images kept per record; also the sink's album limit.
pub const MAX_IMAGES: usize = 10;

/// Detail data for one listing, fetched right before delivery.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub url: String,
    pub title: Option<String>,
    pub price: Option<String>,
    pub location: Option<String>,
    /// Site attributes in page order, e.g. ("Пробег", "120 000 км").
    pub attributes: Vec<(String, String)>,
    pub images: Vec<String>,
    pub description: Option<String>,
}

impl DeliveryRecord {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Identifiers newest-first, sponsored and filtered entries removed, no duplicates.
    async fn fetch_candidates(&self, source: &SourceConfig) -> Result<Vec<String>>;

    /// `Ok(None)` when the item is no longer available.
    async fn fetch_detail(&self, identifier: &str) -> Result<Option<DeliveryRecord>>;
}

/// Scraping adapter for one site kind.
pub struct HttpAdapter {
    kind: SourceKind,
    client: Client,
}

impl HttpAdapter {
    pub fn new(kind: SourceKind, client: Client) -> Self { Self { kind, client } }

    fn detail_url(&self, identifier: &str) -> Result<String> {
        let base = Url::parse(self.kind.base_url())?;
        let url = base.join(identifier).with_context(|| format!("join {identifier}"))?;
        Ok(url.to_string())
    }
}

#[async_trait]
impl SourceAdapter for HttpAdapter {
    async fn fetch_candidates(&self, source: &SourceConfig) -> Result<Vec<String>> {
        let html = fetch::fetch_listing(&self.client, &source.url).await?;
        let filter = source.filter_text.as_deref();
        let ids = match self.kind {
            SourceKind::Olx => olx::parse_listing(&html, filter),
            SourceKind::Avtoelon => avtoelon::parse_listing(&html, filter),
        };
        Ok(ids)
    }

    async fn fetch_detail(&self, identifier: &str) -> Result<Option<DeliveryRecord>> {
        let url = self.detail_url(identifier)?;
        let Some(html) = fetch::fetch_detail(&self.client, &url).await? else { return Ok(None) };
        let record = match self.kind {
            SourceKind::Olx => olx::parse_detail(&html, &url),
            SourceKind::Avtoelon => avtoelon::parse_detail(&html, &url),
        };
        Ok(record)
    }
}

/// Adapter lookup by source kind.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<SourceKind, Arc<dyn SourceAdapter>>,
}

impl AdapterSet {
    /// Scraping adapters for every supported kind over one shared client.
    pub fn http(client: Client) -> Self {
        let mut set = Self::default();
        for kind in [SourceKind::Olx, SourceKind::Avtoelon] {
            set.insert(kind, Arc::new(HttpAdapter::new(kind, client.clone())));
        }
        set
    }

    pub fn insert(&mut self, kind: SourceKind, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(kind, adapter);
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&kind).cloned()
    }
}

// -------- helpers shared by site modules --------

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !out.contains(&value) { out.push(value); }
}

/// Case-insensitive substring match of the filter against a listing title.
fn title_excluded(title: &str, filter: Option<&str>) -> bool {
    match filter.map(str::trim) {
        Some(f) if !f.is_empty() => title.to_lowercase().contains(&f.to_lowercase()),
        _ => false,
    }
}

fn absolutize(base: &str, src: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(src.trim()).ok().map(|u| u.to_string())
}
