use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const ACCEPT_LANG: &str = "ru-RU,ru;q=0.9,en;q=0.8";

/// Client shared by all adapters. Listing sites serve stripped pages to unknown agents.
pub fn build_client(timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANG));
    let client = Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .context("build http client")?;
    Ok(client)
}

/// Listing page. Any non-2xx status is an error for the whole source this cycle.
pub async fn fetch_listing(client: &Client, url: &str) -> Result<String> {
    let text = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?
        .error_for_status()?
        .text()
        .await?;
    Ok(text)
}

/// Detail page. `None` for any non-2xx status: the item may have been removed since listing.
pub async fn fetch_detail(client: &Client, url: &str) -> Result<Option<String>> {
    let rsp = client.get(url).send().await.with_context(|| format!("GET {url}"))?;
    if !rsp.status().is_success() {
        return Ok(None);
    }
    let text = rsp.text().await?;
    Ok(Some(text))
}
