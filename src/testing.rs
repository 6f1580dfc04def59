//! Scripted adapter and recording sink for pipeline and scheduler tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::adapter::{DeliveryRecord, SourceAdapter};
use crate::sink::{ChannelSink, SinkError};
use crate::source::types::{SourceConfig, SourceKind, SourceStatus};

pub fn source(source_id: i32, kind: SourceKind) -> SourceConfig {
    SourceConfig {
        source_id,
        kind,
        url: format!("{}/list/{source_id}", kind.base_url()),
        destination: format!("@chan{source_id}"),
        filter_text: None,
        status: SourceStatus::Active,
    }
}

pub fn ids(s: &[&str]) -> Vec<String> { s.iter().map(|x| x.to_string()).collect() }

#[derive(Default)]
pub struct ScriptedAdapter {
    candidates: Mutex<HashMap<i32, Vec<String>>>,
    failing: Mutex<HashSet<i32>>,
    hanging: Mutex<HashSet<i32>>,
    details: Mutex<HashMap<String, Option<DeliveryRecord>>>,
    failing_details: Mutex<HashSet<String>>,
    detail_calls: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    pub fn new() -> Self { Self::default() }

    pub fn set_candidates(&self, source_id: i32, ids: Vec<String>) {
        self.candidates.lock().unwrap().insert(source_id, ids);
    }

    pub fn fail_candidates(&self, source_id: i32) {
        self.failing.lock().unwrap().insert(source_id);
    }

    /// Listing fetch never completes within any sane timeout.
    pub fn hang_candidates(&self, source_id: i32) {
        self.hanging.lock().unwrap().insert(source_id);
    }

    pub fn set_detail(&self, identifier: &str, record: Option<DeliveryRecord>) {
        self.details.lock().unwrap().insert(identifier.to_string(), record);
    }

    pub fn fail_detail(&self, identifier: &str) {
        self.failing_details.lock().unwrap().insert(identifier.to_string());
    }

    pub fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    async fn fetch_candidates(&self, source: &SourceConfig) -> Result<Vec<String>> {
        let hang = self.hanging.lock().unwrap().contains(&source.source_id);
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.lock().unwrap().contains(&source.source_id) {
            bail!("listing fetch failed for source {}", source.source_id);
        }
        Ok(self.candidates.lock().unwrap().get(&source.source_id).cloned().unwrap_or_default())
    }

    async fn fetch_detail(&self, identifier: &str) -> Result<Option<DeliveryRecord>> {
        self.detail_calls.lock().unwrap().push(identifier.to_string());
        if self.failing_details.lock().unwrap().contains(identifier) {
            bail!("detail fetch failed for {identifier}");
        }
        if let Some(scripted) = self.details.lock().unwrap().get(identifier) {
            return Ok(scripted.clone());
        }
        Ok(Some(DeliveryRecord {
            url: format!("https://example.test{identifier}"),
            title: Some(identifier.to_string()),
            ..Default::default()
        }))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendKind {
    Text,
    Image,
    Album,
}

#[derive(Clone, Debug)]
pub struct SentMessage {
    pub kind: SendKind,
    pub destination: String,
    pub message: String,
    pub images: Vec<String>,
}

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<SentMessage>>,
    failures: Mutex<VecDeque<SinkError>>,
    reject_media: Mutex<bool>,
}

impl RecordingSink {
    pub fn new() -> Self { Self::default() }

    /// The next call fails with `err` instead of being recorded.
    pub fn fail_next(&self, err: SinkError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn reject_media(&self) {
        *self.reject_media.lock().unwrap() = true;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, kind: SendKind, destination: &str, message: &str, images: &[String]) -> Result<(), SinkError> {
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if kind != SendKind::Text && *self.reject_media.lock().unwrap() {
            return Err(SinkError::MediaRejected { description: "Bad Request: wrong file identifier/HTTP URL specified".into() });
        }
        self.sent.lock().unwrap().push(SentMessage {
            kind,
            destination: destination.to_string(),
            message: message.to_string(),
            images: images.to_vec(),
        });
        Ok(())
    }
}

#[async_trait]
impl ChannelSink for RecordingSink {
    async fn send_text(&self, destination: &str, message: &str) -> Result<(), SinkError> {
        self.record(SendKind::Text, destination, message, &[])
    }

    async fn send_image(&self, destination: &str, message: &str, image: &str) -> Result<(), SinkError> {
        self.record(SendKind::Image, destination, message, &[image.to_string()])
    }

    async fn send_album(&self, destination: &str, message: &str, images: &[String]) -> Result<(), SinkError> {
        self.record(SendKind::Album, destination, message, images)
    }
}
