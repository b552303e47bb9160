/// skinarb-live — Steam Price
///
/// `priceoverview` is the only per-item Steam endpoint that works without a
/// session, and it answers 429 after a handful of requests per IP. Lookups go
/// through a short TTL cache, and misses go through a retry loop that backs
/// off much harder on 429 than on ordinary failures.

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

pub const STEAM_PRICEOVERVIEW_URL: &str = "https://steamcommunity.com/market/priceoverview/";
/// 5 = RUB
pub const STEAM_CURRENCY: &str = "5";
/// CS2
pub const STEAM_APPID: &str = "730";

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(25);
pub const MAX_ATTEMPTS: u32 = 5;

const RATE_LIMIT_BASE_MS: u64 = 800;
const RATE_LIMIT_JITTER_MS: std::ops::Range<u64> = 0..400;
const ERROR_BASE_MS: u64 = 250;
const ERROR_JITTER_MS: std::ops::Range<u64> = 100..600;

const FALLBACK_TIMEOUT: Duration = Duration::from_secs(12);
const STEAM_UA: &str = "Mozilla/5.0 (Linux; Android 6.0; Nexus 5 Build/MRA58N) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Mobile Safari/537.36 Edg/142.0.0.0";

#[derive(Debug, Error)]
pub enum SteamError {
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("json decode: {0}")]
    Decode(String),
    #[error("no price field in steam response")]
    NoPrice,
    #[error("cannot parse price '{raw}': {reason}")]
    Parse { raw: String, reason: String },
    #[error("steam fetch failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<SteamError> },
}

impl SteamError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SteamError::RateLimited)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SteamQuote {
    pub price: f64,
    /// Exactly what Steam returned, e.g. "1 234,56 pуб."
    pub raw:   String,
}

#[derive(Debug, Clone)]
pub struct SteamCacheEntry {
    pub price:      f64,
    pub raw:        String,
    pub fetched_at: Instant,
    pub expires_at: Instant,
}

// ── Price string parsing ─────────────────────────────────────────────────────

/// Normalizes a localized Steam price string and parses it.
///
/// Everything outside `[0-9.,]` is dropped, then separators left dangling at
/// the end (the dot of "pуб.") are trimmed. With both separators present the
/// comma is a thousands separator; with only a comma it is the decimal point.
/// A leading separator stays a decimal point, so ",5" is 0.5.
pub fn parse_steam_price(raw: &str) -> Result<f64, SteamError> {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let mut s = digits.trim_end_matches(|c: char| c == '.' || c == ',').to_string();

    if s.is_empty() {
        return Err(SteamError::Parse { raw: raw.to_string(), reason: "empty price string".into() });
    }

    if s.contains('.') && s.contains(',') {
        s = s.replace(',', "");
    } else if s.contains(',') {
        s = s.replace(',', ".");
    }
    if s.starts_with('.') {
        s.insert(0, '0');
    }

    s.parse::<f64>().map_err(|e| SteamError::Parse {
        raw:    raw.to_string(),
        reason: format!("'{s}': {e}"),
    })
}

// ── Source ───────────────────────────────────────────────────────────────────

/// One upstream lookup, no retries.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_once(&self, market_hash_name: &str) -> Result<SteamQuote, SteamError>;
}

#[async_trait]
impl<T: PriceSource + ?Sized> PriceSource for Arc<T> {
    async fn fetch_once(&self, market_hash_name: &str) -> Result<SteamQuote, SteamError> {
        (**self).fetch_once(market_hash_name).await
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct PriceOverview {
    lowest_price: Option<String>,
    median_price: Option<String>,
}

pub struct SteamClient {
    client: reqwest::Client,
}

impl SteamClient {
    /// Uses the shared rotating client when given; otherwise a small direct
    /// client with a 12s timeout.
    pub fn new(shared: Option<reqwest::Client>) -> Self {
        let client = shared.unwrap_or_else(|| {
            reqwest::Client::builder()
                .timeout(FALLBACK_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new())
        });
        Self { client }
    }
}

#[async_trait]
impl PriceSource for SteamClient {
    async fn fetch_once(&self, market_hash_name: &str) -> Result<SteamQuote, SteamError> {
        let resp = self.client
            .get(STEAM_PRICEOVERVIEW_URL)
            .query(&[
                ("currency", STEAM_CURRENCY),
                ("appid", STEAM_APPID),
                ("market_hash_name", market_hash_name),
            ])
            .header(USER_AGENT, STEAM_UA)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => {}
            StatusCode::TOO_MANY_REQUESTS => return Err(SteamError::RateLimited),
            other => return Err(SteamError::Status(other.as_u16())),
        }

        let body: PriceOverview = resp
            .json()
            .await
            .map_err(|e| SteamError::Decode(e.to_string()))?;

        let raw = pick_raw_price(body).ok_or(SteamError::NoPrice)?;
        let price = parse_steam_price(&raw)?;
        Ok(SteamQuote { price, raw })
    }
}

fn pick_raw_price(body: PriceOverview) -> Option<String> {
    let non_empty = |s: &String| !s.is_empty();
    body.lowest_price
        .filter(non_empty)
        .or_else(|| body.median_price.filter(non_empty))
}

// ── Retry policy ─────────────────────────────────────────────────────────────

/// Deterministic part of the wait after failed attempt `attempt` (1-based).
pub fn backoff_base(rate_limited: bool, attempt: u32) -> Duration {
    let base = if rate_limited { RATE_LIMIT_BASE_MS } else { ERROR_BASE_MS };
    Duration::from_millis(base << attempt.saturating_sub(1).min(16))
}

fn backoff_delay(err: &SteamError, attempt: u32) -> Duration {
    let jitter = if err.is_rate_limited() { RATE_LIMIT_JITTER_MS } else { ERROR_JITTER_MS };
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(jitter));
    backoff_base(err.is_rate_limited(), attempt) + jitter
}

// ── Cache ────────────────────────────────────────────────────────────────────

pub struct SteamPriceCache<S> {
    source:  S,
    ttl:     Duration,
    entries: RwLock<HashMap<String, SteamCacheEntry>>,
}

impl<S: PriceSource> SteamPriceCache<S> {
    pub fn new(source: S, ttl: Duration) -> Self {
        Self { source, ttl, entries: RwLock::new(HashMap::new()) }
    }

    /// Cached price if still live, otherwise a fresh (retried) lookup.
    /// Failures are never cached.
    pub async fn get_price(&self, market_hash_name: &str) -> Result<SteamQuote, SteamError> {
        if let Some(hit) = self.lookup(market_hash_name).await {
            return Ok(hit);
        }

        let quote = self.fetch_with_retry(market_hash_name).await?;

        let now = Instant::now();
        let entry = SteamCacheEntry {
            price:      quote.price,
            raw:        quote.raw.clone(),
            fetched_at: now,
            expires_at: now + self.ttl,
        };
        self.entries.write().await.insert(market_hash_name.to_string(), entry);
        Ok(quote)
    }

    async fn lookup(&self, market_hash_name: &str) -> Option<SteamQuote> {
        let entries = self.entries.read().await;
        let e = entries.get(market_hash_name)?;
        let now = Instant::now();
        if now >= e.expires_at {
            return None;
        }
        debug!(
            item = market_hash_name,
            age_ms = now.duration_since(e.fetched_at).as_millis() as u64,
            "steam cache hit"
        );
        Some(SteamQuote { price: e.price, raw: e.raw.clone() })
    }

    pub async fn fetch_with_retry(&self, market_hash_name: &str) -> Result<SteamQuote, SteamError> {
        let mut attempt = 1;
        loop {
            let err = match self.source.fetch_once(market_hash_name).await {
                Ok(q) => return Ok(q),
                Err(e) => e,
            };

            if attempt >= MAX_ATTEMPTS {
                warn!("steam '{market_hash_name}': giving up after {attempt} attempts: {err}");
                return Err(SteamError::Exhausted { attempts: attempt, last: Box::new(err) });
            }

            let wait = backoff_delay(&err, attempt);
            debug!("steam '{market_hash_name}' attempt {attempt} failed ({err}), retrying in {wait:?}");
            sleep(wait).await;
            attempt += 1;
        }
    }

    /// Entries currently stored, live or stale.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
