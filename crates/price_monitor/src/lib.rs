/// skinarb-live — Price Monitor
///
/// Bulk order-book snapshot from market.csgo.com (RUB): one request returns
/// price + volume for every listed item. The snapshot is all-or-nothing: a
/// failed or suspicious refresh never replaces the map that is already loaded.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const MARKET_ORDERS_URL: &str = "https://market.csgo.com/api/v2/prices/orders/RUB.json";

// ── market.csgo.com structs ──────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct MarketOrdersResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    items:   Vec<MarketOrderItem>,
}

#[derive(Deserialize, Debug)]
struct MarketOrderItem {
    market_hash_name: String,
    price:            f64,
    #[serde(default)]
    volume:           u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderBookEntry {
    pub price:  f64,   // RUB
    pub volume: u32,
}

pub type OrderBookMap = HashMap<String, OrderBookEntry>;

/// Entry with its name attached, for ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub name:   String,
    pub price:  f64,
    pub volume: u32,
}

/// Decodes and validates a snapshot body into a fresh map.
pub fn parse_snapshot(body: &str) -> Result<OrderBookMap> {
    let resp: MarketOrdersResponse = serde_json::from_str(body)
        .context("Market JSON parse failed")?;

    if !resp.success {
        bail!("Market responded with success=false");
    }
    if resp.items.is_empty() {
        bail!("Market responded with an empty item list");
    }

    Ok(resp
        .items
        .into_iter()
        .map(|it| (it.market_hash_name, OrderBookEntry { price: it.price, volume: it.volume }))
        .collect())
}

/// Error for a non-2xx snapshot response, quoting at most 200 bytes of the
/// body (cut on a char boundary).
fn http_error(status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    anyhow!("Market HTTP {status}: {}", &body[..end])
}

// ── PriceMonitor ─────────────────────────────────────────────────────────────

pub struct PriceMonitor {
    client:   reqwest::Client,
    url:      String,
    snapshot: RwLock<Arc<OrderBookMap>>,
}

impl PriceMonitor {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_url(client, MARKET_ORDERS_URL)
    }

    pub fn with_url(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url:      url.into(),
            snapshot: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Fetch + decode + swap. On any error the previous snapshot stays.
    pub async fn refresh(&self) -> Result<usize> {
        info!("Refreshing market.csgo.com order book...");
        let resp = self.client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Market request failed")?;

        let status = resp.status();
        let body = resp.text().await.context("Market body read failed")?;
        if !status.is_success() {
            return Err(http_error(status, &body));
        }
        debug!("Market snapshot body: {} bytes", body.len());

        self.apply_body(&body).await
    }

    /// Decode/validate half of `refresh`. The map is built before the write
    /// lock is taken; the lock only covers the swap.
    pub async fn apply_body(&self, body: &str) -> Result<usize> {
        let fresh = parse_snapshot(body)?;
        let count = fresh.len();
        self.install(fresh).await;
        info!("Market order book updated: {count} items");
        Ok(count)
    }

    pub async fn install(&self, map: OrderBookMap) {
        let fresh = Arc::new(map);
        *self.snapshot.write().await = fresh;
    }

    /// Shared handle to the current complete map.
    pub async fn snapshot(&self) -> Arc<OrderBookMap> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Top `n` entries by traded volume, highest first.
    pub async fn top_by_volume(&self, n: usize) -> Vec<RankedEntry> {
        let snap = self.snapshot().await;
        let mut ranked: Vec<RankedEntry> = snap
            .iter()
            .map(|(name, e)| RankedEntry { name: name.clone(), price: e.price, volume: e.volume })
            .collect();
        ranked.sort_by(|a, b| b.volume.cmp(&a.volume).then_with(|| a.name.cmp(&b.name)));
        ranked.truncate(n);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"{"success":true,"currency":"RUB","items":[
        {"market_hash_name":"AK-47 | Redline (Field-Tested)","price":1200.5,"volume":340},
        {"market_hash_name":"AWP | Asiimov (Battle-Scarred)","price":5400.0,"volume":12},
        {"market_hash_name":"Sticker | Crown (Foil)","price":98000.0,"volume":2}]}"#;

    #[tokio::test]
    async fn good_snapshot_is_installed() {
        let pm = PriceMonitor::new(reqwest::Client::new());
        assert_eq!(pm.apply_body(GOOD).await.unwrap(), 3);

        let snap = pm.snapshot().await;
        let ak = snap.get("AK-47 | Redline (Field-Tested)").unwrap();
        assert_eq!(ak.price, 1200.5);
        assert_eq!(ak.volume, 340);
    }

    #[tokio::test]
    async fn bad_refresh_keeps_previous_snapshot() {
        let pm = PriceMonitor::new(reqwest::Client::new());
        pm.apply_body(GOOD).await.unwrap();
        let before = pm.snapshot().await;

        let bad_bodies = [
            r#"{"success":false,"items":[{"market_hash_name":"x","price":1.0,"volume":1}]}"#,
            r#"{"success":true,"items":[]}"#,
            r#"{"success":true,"items":[{"market_hash_name":"x","price":"#,
            "<html>502 Bad Gateway</html>",
        ];
        for body in bad_bodies {
            assert!(pm.apply_body(body).await.is_err(), "accepted: {body}");
        }

        let after = pm.snapshot().await;
        assert_eq!(*before, *after);
        let mut keys: Vec<_> = after.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec![
            "AK-47 | Redline (Field-Tested)",
            "AWP | Asiimov (Battle-Scarred)",
            "Sticker | Crown (Foil)",
        ]);
    }

    #[tokio::test]
    async fn readers_keep_their_snapshot_across_a_swap() {
        let pm = PriceMonitor::new(reqwest::Client::new());
        pm.apply_body(GOOD).await.unwrap();
        let held = pm.snapshot().await;

        pm.apply_body(r#"{"success":true,"items":[{"market_hash_name":"only","price":1.0,"volume":9}]}"#)
            .await
            .unwrap();

        assert_eq!(held.len(), 3);
        assert_eq!(pm.snapshot().await.len(), 1);
    }

    #[test]
    fn http_error_quotes_cyrillic_body_without_panicking() {
        let body = "x".repeat(199) + "Сервис недоступен";
        let err = http_error(reqwest::StatusCode::BAD_GATEWAY, &body).to_string();
        assert!(err.starts_with("Market HTTP 502 Bad Gateway: "));
        assert!(err.ends_with(&"x".repeat(199)));

        let short = http_error(reqwest::StatusCode::FORBIDDEN, "Доступ запрещён").to_string();
        assert!(short.ends_with("Доступ запрещён"));
    }

    #[tokio::test]
    async fn top_by_volume_sorts_descending() {
        let pm = PriceMonitor::new(reqwest::Client::new());
        pm.apply_body(GOOD).await.unwrap();

        let top = pm.top_by_volume(2).await;
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].volume, 340);
        assert_eq!(top[1].volume, 12);

        assert_eq!(pm.top_by_volume(50).await.len(), 3);
    }
}
