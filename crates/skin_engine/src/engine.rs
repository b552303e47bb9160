/// skinarb-live — Engine
///
/// The one service instance. Owns the proxy pool, the shared client, every
/// source, the Steam cache and the result store; one analysis cycle at a time.

use anyhow::{Context, Result};
use arb_detector::{filter_json, merge, CombinedItem, FilterParams, ResultStore, Status};
use async_trait::async_trait;
use buff_catalog::{fetch_all, BuffClient, CatalogSource};
use logger::{now_iso, AnalysisAbortedEvent, AnalysisCompletedEvent, EventLogger, SourceStatusEvent};
use price_monitor::PriceMonitor;
use proxy_pool::{build_rotating_client, ProxyPool};
use std::sync::Arc;
use std::time::{Duration, Instant};
use steam_price::{PriceSource, SteamClient, SteamPriceCache};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::bridge::{BlobSink, FileBlobSink, Trigger, LATEST_BLOB_KEY};
use crate::config::{AnalysisMode, Config};
use crate::fanout::refresh_top_liquid;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("an analysis is already running")]
    AlreadyRunning,
    #[error("order book refresh failed: {0:#}")]
    OrderBook(anyhow::Error),
    #[error("catalog fetch failed: {0:#}")]
    Catalog(anyhow::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSummary {
    pub mode:       &'static str,
    pub items:      usize,
    pub profitable: usize,
    pub duration:   Duration,
}

pub struct Engine {
    config:   Config,
    proxies:  Arc<ProxyPool>,
    monitor:  PriceMonitor,
    catalog:  Arc<dyn CatalogSource>,
    steam:    Arc<SteamPriceCache<Arc<dyn PriceSource>>>,
    store:    ResultStore,
    sink:     Arc<dyn BlobSink>,
    events:   EventLogger,
    running:  Mutex<()>,
}

impl Engine {
    /// Production wiring: proxy file → rotating client → live sources.
    /// A missing or empty proxy file is an error.
    pub fn new(config: Config) -> Result<Self> {
        let proxies = Arc::new(
            ProxyPool::load(&config.proxy_file)
                .with_context(|| format!("proxy list {} unusable", config.proxy_file.display()))?,
        );
        let client = build_rotating_client(Arc::clone(&proxies)).context("HTTP client setup failed")?;

        let monitor = PriceMonitor::new(client.clone());
        let catalog: Arc<dyn CatalogSource> = Arc::new(BuffClient::new(client.clone()));
        let steam: Arc<dyn PriceSource> = Arc::new(SteamClient::new(Some(client)));
        let sink: Arc<dyn BlobSink> = Arc::new(FileBlobSink::new(config.results_dir.clone()));

        Ok(Self::from_parts(config, proxies, monitor, catalog, steam, sink))
    }

    pub fn from_parts(
        config:  Config,
        proxies: Arc<ProxyPool>,
        monitor: PriceMonitor,
        catalog: Arc<dyn CatalogSource>,
        steam:   Arc<dyn PriceSource>,
        sink:    Arc<dyn BlobSink>,
    ) -> Self {
        let events = EventLogger::new(config.log_dir.clone());
        let steam = Arc::new(SteamPriceCache::new(steam, config.steam_cache_ttl));
        Self {
            config,
            proxies,
            monitor,
            catalog,
            steam,
            store: ResultStore::new(),
            sink,
            events,
            running: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn monitor(&self) -> &PriceMonitor {
        &self.monitor
    }

    /// Re-reads the proxy file. A bad file keeps the current list.
    pub fn reload_proxies(&self) {
        match self.proxies.reload(&self.config.proxy_file) {
            Ok(n) => info!("Proxy list reloaded: {n} endpoints"),
            Err(e) => warn!("Proxy reload failed, keeping {} current endpoints: {e}", self.proxies.len()),
        }
    }

    /// One full cycle: order book, then the catalog merge or the Steam
    /// fan-out, then publish. Aborts without touching published results if
    /// the order book or Buff page 1 cannot be fetched.
    pub async fn run_full_analysis(&self) -> Result<AnalysisSummary, AnalysisError> {
        let _running = self.running.try_lock().map_err(|_| AnalysisError::AlreadyRunning)?;
        let started = Instant::now();
        info!("=== Analysis started ({}) ===", self.config.mode.label());

        match self.monitor.refresh().await {
            Ok(n) => self.events.log_or_warn(&SourceStatusEvent::ok("market", n)),
            Err(e) => {
                self.events.log_or_warn(&SourceStatusEvent::failed("market", format!("{e:#}")));
                self.record_abort(&format!("order book: {e:#}"));
                return Err(AnalysisError::OrderBook(e));
            }
        }

        self.analyze_current_book(started).await
    }

    /// Everything after the order-book refresh, against whatever snapshot
    /// the monitor currently holds.
    async fn analyze_current_book(&self, started: Instant) -> Result<AnalysisSummary, AnalysisError> {
        let (items, profitable) = match self.config.mode {
            AnalysisMode::Catalog => {
                let listings = match fetch_all(Arc::clone(&self.catalog), self.config.catalog_workers).await {
                    Ok(l) => l,
                    Err(e) => {
                        self.events.log_or_warn(&SourceStatusEvent::failed("buff", format!("{e:#}")));
                        self.record_abort(&format!("catalog: {e:#}"));
                        return Err(AnalysisError::Catalog(e));
                    }
                };
                self.events.log_or_warn(&SourceStatusEvent::ok("buff", listings.len()));

                let book = self.monitor.snapshot().await;
                let rows = merge(&listings, &book);
                let stats = (rows.len(), count_profitable(&rows));
                self.store.publish(rows).await;
                stats
            }
            AnalysisMode::TopLiquid(n) => {
                let report = refresh_top_liquid(
                    Arc::clone(&self.steam),
                    &self.monitor,
                    &self.store,
                    n,
                    self.config.steam_concurrency,
                )
                .await;
                self.events.log_or_warn(&SourceStatusEvent::ok("steam", report.priced));
                (report.priced, report.profitable)
            }
        };

        let summary = AnalysisSummary {
            mode: self.config.mode.label(),
            items,
            profitable,
            duration: started.elapsed(),
        };
        self.events.log_or_warn(&AnalysisCompletedEvent {
            ts:          now_iso(),
            event:       "ANALYSIS_COMPLETED",
            mode:        summary.mode.to_string(),
            items,
            profitable,
            duration_ms: summary.duration.as_millis() as u64,
        });
        info!(
            "=== Analysis done: {items} items, {profitable} profitable, {:.1}s ===",
            summary.duration.as_secs_f64()
        );
        Ok(summary)
    }

    fn record_abort(&self, reason: &str) {
        warn!("Analysis aborted: {reason}");
        self.events.log_or_warn(&AnalysisAbortedEvent {
            ts:     now_iso(),
            event:  "ANALYSIS_ABORTED",
            mode:   self.config.mode.label().to_string(),
            reason: reason.to_string(),
        });
    }

    /// Filters the latest results, running one analysis first if nothing has
    /// been published yet.
    pub async fn filter_latest_or_run(&self, params: &FilterParams) -> Vec<CombinedItem> {
        if self.store.published_at().await.is_none() {
            info!("No published results yet, running analysis before filtering");
            self.run_analysis().await;
        }
        self.store.filter_latest(params).await
    }
}

fn count_profitable(rows: &[CombinedItem]) -> usize {
    rows.iter()
        .filter(|r| r.status == Status::Profit || r.status_steam == Status::Profit)
        .count()
}

#[async_trait]
impl Trigger for Engine {
    async fn run_analysis(&self) -> Vec<u8> {
        let completed = match self.run_full_analysis().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Analysis did not complete: {e}");
                false
            }
        };

        let bytes = match self.store.to_json().await {
            Ok(b) => b,
            Err(e) => {
                warn!("Result serialization failed: {e}");
                return Vec::new();
            }
        };

        if completed {
            if let Err(e) = self.sink.put(LATEST_BLOB_KEY, &bytes).await {
                warn!("Blob write failed: {e:#}");
            }
        }
        bytes
    }

    async fn filter(&self, input: &[u8], params: &FilterParams) -> Vec<u8> {
        filter_json(input, params).unwrap_or_else(|e| {
            warn!("Filter rejected input: {e}");
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use buff_catalog::{BuffItem, CatalogPage};
    use price_monitor::{OrderBookEntry, OrderBookMap};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use steam_price::{SteamError, SteamQuote};

    struct OnePageCatalog {
        items: Vec<BuffItem>,
        fail:  bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CatalogSource for OnePageCatalog {
        async fn fetch_page(&self, page: u32) -> anyhow::Result<CatalogPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("HTTP 403 (page {page})");
            }
            Ok(CatalogPage { items: self.items.clone(), total_page: 1 })
        }
    }

    struct FixedSteam(f64);

    #[async_trait]
    impl PriceSource for FixedSteam {
        async fn fetch_once(&self, _name: &str) -> Result<SteamQuote, SteamError> {
            Ok(SteamQuote { price: self.0, raw: format!("{}", self.0) })
        }
    }

    #[derive(Default)]
    struct MemorySink {
        puts: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl BlobSink for MemorySink {
        async fn put(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
            self.puts.lock().await.push((key.to_string(), bytes.to_vec()));
            Ok(())
        }
    }

    fn listing(name: &str, cny: &str) -> BuffItem {
        BuffItem { id: 7, name: name.into(), sell_min_price: cny.into(), sell_num: 3, ..Default::default() }
    }

    fn log_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("skinarb-engine-{}-{tag}", std::process::id()))
    }

    /// Engine whose order-book URL points at a closed local port.
    fn engine(tag: &str, mode: AnalysisMode, catalog: OnePageCatalog, sink: Arc<MemorySink>) -> Engine {
        let config = Config { mode, log_dir: log_dir(tag), ..Config::default() };
        let monitor = PriceMonitor::with_url(reqwest::Client::new(), "http://127.0.0.1:9/orders.json");
        Engine::from_parts(
            config,
            Arc::new(ProxyPool::from_endpoints(vec!["http://127.0.0.1:8080".into()])),
            monitor,
            Arc::new(catalog),
            Arc::new(FixedSteam(150.0)),
            sink,
        )
    }

    fn catalog(items: Vec<BuffItem>, fail: bool) -> OnePageCatalog {
        OnePageCatalog { items, fail, calls: AtomicUsize::new(0) }
    }

    fn book() -> OrderBookMap {
        [
            ("AK-47 | Redline".to_string(), OrderBookEntry { price: 120.0, volume: 50 }),
            ("AWP | Asiimov".to_string(), OrderBookEntry { price: 900.0, volume: 2 }),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn catalog_cycle_merges_and_publishes() {
        let e = engine("catalog", AnalysisMode::Catalog, catalog(vec![
            listing("AK-47 | Redline", "1"),
            listing("AWP | Asiimov", "50"),
            listing("Sticker | Nobody", "2"),
            listing("Free", "0"),
        ], false), Arc::default());
        e.monitor().install(book()).await;

        let summary = e.analyze_current_book(Instant::now()).await.unwrap();
        assert_eq!(summary.mode, "catalog");
        assert_eq!(summary.items, 3);
        assert_eq!(summary.profitable, 1);

        let rows = e.store().snapshot().await;
        let redline = rows.iter().find(|r| r.name == "AK-47 | Redline").unwrap();
        assert_eq!(redline.status, Status::Profit);
        let asiimov = rows.iter().find(|r| r.name == "AWP | Asiimov").unwrap();
        assert_eq!(asiimov.status, Status::Illiquid);

        std::fs::remove_dir_all(log_dir("catalog")).ok();
    }

    #[tokio::test]
    async fn page_one_failure_keeps_previous_results() {
        let e = engine("page1", AnalysisMode::Catalog, catalog(vec![], true), Arc::default());
        e.monitor().install(book()).await;
        e.store().publish(vec![CombinedItem { name: "old".into(), ..Default::default() }]).await;

        let err = e.analyze_current_book(Instant::now()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Catalog(_)));
        assert_eq!(e.store().snapshot().await[0].name, "old");

        std::fs::remove_dir_all(log_dir("page1")).ok();
    }

    #[tokio::test(start_paused = true)]
    async fn top_liquid_cycle_uses_steam_fanout() {
        let e = engine("fanout", AnalysisMode::TopLiquid(111), catalog(vec![], true), Arc::default());
        e.monitor().install(book()).await;

        let summary = e.analyze_current_book(Instant::now()).await.unwrap();
        assert_eq!(summary.mode, "top_liquid");
        assert_eq!(summary.items, 2);

        let rows = e.store().snapshot().await;
        assert!(rows.iter().all(|r| r.status == Status::MarketVsSteam));
        assert_eq!(rows[0].name, "AK-47 | Redline");

        std::fs::remove_dir_all(log_dir("fanout")).ok();
    }

    #[tokio::test]
    async fn second_run_while_busy_is_rejected() {
        let e = engine("busy", AnalysisMode::Catalog, catalog(vec![], false), Arc::default());
        let _held = e.running.lock().await;
        assert!(matches!(e.run_full_analysis().await, Err(AnalysisError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn aborted_run_returns_published_json_and_skips_blob() {
        let sink = Arc::new(MemorySink::default());
        let e = engine("abort", AnalysisMode::Catalog, catalog(vec![], false), Arc::clone(&sink));
        e.store().publish(vec![CombinedItem { name: "kept".into(), ..Default::default() }]).await;

        let bytes = e.run_analysis().await;
        let rows: Vec<CombinedItem> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "kept");
        assert!(sink.puts.lock().await.is_empty());

        let log = std::fs::read_dir(log_dir("abort")).unwrap().next().unwrap().unwrap().path();
        let raw = std::fs::read_to_string(log).unwrap();
        assert!(raw.contains("ANALYSIS_ABORTED"));

        std::fs::remove_dir_all(log_dir("abort")).ok();
    }

    #[tokio::test]
    async fn trigger_filter_returns_empty_bytes_on_garbage() {
        let e = engine("filter", AnalysisMode::Catalog, catalog(vec![], false), Arc::default());
        let params = FilterParams { min_profit: 5.0, ..Default::default() };

        assert!(e.filter(b"<html>", &params).await.is_empty());

        let input = serde_json::to_vec(&vec![
            CombinedItem { name: "a".into(), profit_percent: 9.0, market_price: 10.0, ..Default::default() },
            CombinedItem { name: "b".into(), profit_percent: 1.0, market_price: 10.0, ..Default::default() },
        ])
        .unwrap();
        let out: Vec<CombinedItem> = serde_json::from_slice(&e.filter(&input, &params).await).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "a");
    }

    #[tokio::test]
    async fn reload_keeps_pool_when_file_is_missing() {
        let e = engine("reload", AnalysisMode::Catalog, catalog(vec![], false), Arc::default());
        e.reload_proxies();
        assert_eq!(e.proxies.len(), 1);
    }
}
