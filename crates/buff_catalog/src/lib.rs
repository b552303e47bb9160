/// skinarb-live — Buff Catalog
///
/// Page 1 is fetched first to learn `total_page`, the remaining pages go
/// through a small worker pool. Buff bans aggressively, so each worker sleeps
/// a long randomized cool-down after every page, success or not, and a failed
/// page is never retried within the same pass.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{ACCEPT, CACHE_CONTROL, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const BUFF_API_BASE_URL: &str = "https://buff.163.com/api/market/goods";
pub const PAGE_SIZE: u32 = 80;
pub const DEFAULT_WORKERS: usize = 1;

/// Cool-down between pages per worker, in ms (60–110 s).
const COOLDOWN_MS: std::ops::Range<u64> = 60_000..110_000;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 YaBrowser/25.10.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";

// ── Buff structs ─────────────────────────────────────────────────────────────

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct BuffItem {
    pub id:               i64,
    #[serde(rename = "market_hash_name")]
    pub name:             String,
    pub sell_min_price:   String,
    pub sell_num:         u32,
    pub goods_info:       GoodsInfo,
    pub steam_market_url: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct GoodsInfo {
    pub icon_url:        String,
    pub steam_price_cny: String,
    pub info:            GoodsTagInfo,
}

/// Buff nests the wear tag under `info.tags.exterior`; older payloads had it
/// directly under `info.exterior`.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct GoodsTagInfo {
    pub tags:     Option<GoodsTags>,
    pub exterior: Option<LocalizedTag>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct GoodsTags {
    pub exterior: Option<LocalizedTag>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct LocalizedTag {
    pub localized_name: String,
}

impl BuffItem {
    pub fn exterior(&self) -> &str {
        let info = &self.goods_info.info;
        info.tags
            .as_ref()
            .and_then(|t| t.exterior.as_ref())
            .or(info.exterior.as_ref())
            .map(|t| t.localized_name.as_str())
            .unwrap_or("")
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct BuffApiResponse {
    code: String,
    data: BuffPageData,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct BuffPageData {
    items:      Option<Vec<BuffItem>>,
    total_page: u32,
}

/// One validated page.
#[derive(Debug, Clone)]
pub struct CatalogPage {
    pub items:      Vec<BuffItem>,
    pub total_page: u32,
}

/// Decodes a page body. A syntactically valid response is not enough: the API
/// code must be "OK" and the item list must be present.
pub fn parse_page(page: u32, body: &str) -> Result<CatalogPage> {
    let resp: BuffApiResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => {
            warn!("Buff page {page}: body is not JSON ({e}), first 300: {}", body_head(body, 300));
            return Err(anyhow!("Buff page {page}: JSON parse failed: {e}"));
        }
    };

    if resp.code != "OK" {
        bail!("Buff API error on page {page}: code '{}'", resp.code);
    }
    let items = resp
        .data
        .items
        .ok_or_else(|| anyhow!("Buff API error on page {page}: null item list"))?;

    Ok(CatalogPage { items, total_page: resp.data.total_page })
}

/// At most `max` bytes of `body`, cut back to a char boundary. Error pages
/// from Buff are often Chinese.
fn body_head(body: &str, max: usize) -> &str {
    let mut end = body.len().min(max);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

// ── Source ───────────────────────────────────────────────────────────────────

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<CatalogPage>;
}

pub struct BuffClient {
    client:   reqwest::Client,
    base_url: String,
}

impl BuffClient {
    /// `client` should be the rotating proxy client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client, base_url: BUFF_API_BASE_URL.to_string() }
    }
}

#[async_trait]
impl CatalogSource for BuffClient {
    async fn fetch_page(&self, page: u32) -> Result<CatalogPage> {
        let url = format!("{}?game=csgo&page_num={}&page_size={}", self.base_url, page, PAGE_SIZE);

        let resp = self.client
            .get(&url)
            .header(CACHE_CONTROL, "no-cache")
            .header(USER_AGENT, BROWSER_UA)
            .header(ACCEPT, BROWSER_ACCEPT)
            .header("sec-fetch-site", "none")
            .send()
            .await
            .with_context(|| format!("Buff request via proxy failed (page {page})"))?;

        let status = resp.status();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = resp
            .text()
            .await
            .with_context(|| format!("Buff body read failed (page {page})"))?;

        if status != StatusCode::OK {
            bail!("Buff HTTP {status} (page {page})");
        }
        debug!("Buff page {page}: {} bytes, content-type {content_type}", body.len());

        parse_page(page, &body)
    }
}

// ── Worker pool ──────────────────────────────────────────────────────────────

/// Fetches every catalog page. Fails only if page 1 fails; later pages that
/// fail are logged and dropped.
pub async fn fetch_all<S>(source: Arc<S>, workers: usize) -> Result<Vec<BuffItem>>
where
    S: CatalogSource + ?Sized + 'static,
{
    info!("Buff: fetching page 1 to learn the page count...");
    let first = source.fetch_page(1).await.context("Buff page 1 failed")?;
    let total_pages = first.total_page.max(1);
    let workers = workers.max(1);
    info!("Buff: {total_pages} pages total, {workers} workers");

    let (job_tx, job_rx) = mpsc::channel::<u32>(total_pages as usize);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let (res_tx, mut res_rx) = mpsc::unbounded_channel::<Vec<BuffItem>>();

    let _ = res_tx.send(first.items);

    let mut handles = Vec::with_capacity(workers);
    for id in 1..=workers {
        handles.push(tokio::spawn(worker(id, Arc::clone(&source), Arc::clone(&job_rx), res_tx.clone())));
    }
    drop(res_tx);

    for page in 2..=total_pages {
        if job_tx.send(page).await.is_err() {
            warn!("Buff: job queue closed early at page {page}");
            break;
        }
    }
    drop(job_tx);

    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Buff worker crashed: {e}");
        }
    }
    info!("Buff: all workers finished");

    let mut all = Vec::new();
    while let Some(batch) = res_rx.recv().await {
        all.extend(batch);
    }
    info!("Buff: collected {} items across all pages", all.len());
    Ok(all)
}

async fn worker<S>(
    id:      usize,
    source:  Arc<S>,
    jobs:    Arc<Mutex<mpsc::Receiver<u32>>>,
    results: mpsc::UnboundedSender<Vec<BuffItem>>,
) where
    S: CatalogSource + ?Sized,
{
    loop {
        let next = {
            let mut rx = jobs.lock().await;
            rx.recv().await
        };
        let Some(page) = next else { break };

        debug!("[worker {id}] starting page {page}");
        match source.fetch_page(page).await {
            Ok(p) => {
                info!("[worker {id}] page {page} done, {} items", p.items.len());
                let _ = results.send(p.items);
            }
            Err(e) => warn!("[worker {id}] page {page} failed: {e:#}"),
        }

        let pause = Duration::from_millis(rand::thread_rng().gen_range(COOLDOWN_MS));
        sleep(pause).await;
    }
}
