use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

/// Supported listing sites. Each kind has its own adapter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Olx,
    Avtoelon,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Olx => "olx",
            SourceKind::Avtoelon => "avtoelon",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "olx" => Ok(SourceKind::Olx),
            "avtoelon" => Ok(SourceKind::Avtoelon),
            other => bail!("unknown source kind: {other}"),
        }
    }

    /// Site root that relative listing hrefs are joined against.
    pub fn base_url(&self) -> &'static str {
        match self {
            SourceKind::Olx => "https://www.olx.uz",
            SourceKind::Avtoelon => "https://avtoelon.uz",
        }
    }

    /// Registration-time check that a listing URL belongs to this kind's site.
    pub fn validate_listing_url(&self, raw: &str) -> Result<Url> {
        let Ok(url) = Url::parse(raw) else { bail!("Invalid URL: {raw}") };
        if url.scheme() != "https" {
            bail!("{} listing URL must use https: {raw}", self.as_str());
        }
        let expected = Url::parse(self.base_url())?;
        if url.host_str() != expected.host_str() {
            bail!("URL must start with {} for kind {}", self.base_url(), self.as_str());
        }
        Ok(url)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Active,
    Deleted,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Active => "active",
            SourceStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(SourceStatus::Active),
            "deleted" => Ok(SourceStatus::Deleted),
            other => bail!("unknown source status: {other}"),
        }
    }
}

/// One watched listing page and where its new items go.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceConfig {
    pub source_id: i32,
    pub kind: SourceKind,
    pub url: String,
    pub destination: String,
    pub filter_text: Option<String>,
    pub status: SourceStatus,
}

// Envelope types for `source` subcommands

#[derive(Serialize)]
pub struct SourceAddPlan {
    pub action: &'static str,
    pub kind: SourceKind,
    pub url: String,
    pub destination: String,
    pub filter_text: Option<String>,
}

#[derive(Serialize)]
pub struct SourceAddResult {
    pub source_id: i32,
    pub url: String,
}

#[derive(Serialize)]
pub struct SourceRow {
    #[serde(flatten)]
    pub source: SourceConfig,
    pub delivered: i64,
    pub added_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct SourceList {
    pub sources: Vec<SourceRow>,
}

#[derive(Serialize)]
pub struct SourceRemovePlan {
    pub action: &'static str,
    pub source_id: i32,
}

#[derive(Serialize)]
pub struct SourceRemoveResult {
    pub source_id: i32,
    pub removed: bool,
}
