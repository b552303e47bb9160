/// skinarb-live — Steam Fan-out
///
/// Steam rate-limits per IP, so even with proxy rotation the launcher keeps
/// a permit budget, staggers task starts, and takes a short breather every
/// few dozen launches.

use arb_detector::{market_vs_steam, CombinedItem, ResultStore, PROFIT_THRESHOLD_PCT};
use price_monitor::PriceMonitor;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use steam_price::{PriceSource, SteamPriceCache};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const DEFAULT_TOP_N: usize = 100;
pub const MAX_TOP_N: usize = 300;
pub const DEFAULT_CONCURRENCY: usize = 44;

const START_JITTER_MS: std::ops::Range<u64> = 200..400;
const BURST_SIZE: usize = 30;
const BURST_PAUSE: Duration = Duration::from_millis(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanoutReport {
    pub selected:   usize,
    pub priced:     usize,
    pub profitable: usize,
}

pub fn clamp_top_n(top_n: usize) -> usize {
    match top_n {
        0 => DEFAULT_TOP_N,
        n => n.min(MAX_TOP_N),
    }
}

/// Prices the `top_n` highest-volume order-book items on Steam and publishes
/// the market-vs-steam rows, best margin first. Items whose Steam lookup
/// fails are left out.
pub async fn refresh_top_liquid<S>(
    cache:       Arc<SteamPriceCache<S>>,
    monitor:     &PriceMonitor,
    store:       &ResultStore,
    top_n:       usize,
    concurrency: usize,
) -> FanoutReport
where
    S: PriceSource + 'static,
{
    let top_n = clamp_top_n(top_n);
    let selected = monitor.top_by_volume(top_n).await;
    let concurrency = concurrency.max(1);
    info!("Steam fan-out: {} items, concurrency {concurrency}", selected.len());

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles = Vec::with_capacity(selected.len());

    for (launched, entry) in selected.iter().cloned().enumerate() {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(p) => p,
            Err(e) => {
                warn!("Steam fan-out semaphore closed: {e}");
                break;
            }
        };
        let cache = Arc::clone(&cache);

        handles.push(tokio::spawn(async move {
            let _permit = permit;
            let jitter = rand::thread_rng().gen_range(START_JITTER_MS);
            sleep(Duration::from_millis(jitter)).await;

            match cache.get_price(&entry.name).await {
                Ok(quote) => {
                    debug!("steam '{}': {} ({})", entry.name, quote.price, quote.raw);
                    let row = market_vs_steam(&entry.name, entry.price, entry.volume, quote.price, &quote.raw);
                    Some((entry.name, row))
                }
                Err(e) => {
                    warn!("steam '{}' skipped: {e}", entry.name);
                    None
                }
            }
        }));

        if (launched + 1) % BURST_SIZE == 0 {
            sleep(BURST_PAUSE).await;
        }
    }

    let mut by_name: HashMap<String, CombinedItem> = HashMap::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(Some((name, row))) => {
                by_name.insert(name, row);
            }
            Ok(None) => {}
            Err(e) => warn!("Steam fan-out task crashed: {e}"),
        }
    }

    let mut rows: Vec<CombinedItem> = by_name.into_values().collect();
    rows.sort_by(|a, b| b.profit_percent.total_cmp(&a.profit_percent));

    let report = FanoutReport {
        selected:   selected.len(),
        priced:     rows.len(),
        profitable: rows.iter().filter(|r| r.profit_percent > PROFIT_THRESHOLD_PCT).count(),
    };
    info!(
        "Steam fan-out done: {}/{} priced, {} above {PROFIT_THRESHOLD_PCT}%",
        report.priced, report.selected, report.profitable
    );
    store.publish(rows).await;
    report
}
