/// skinarb-live — Skin Analyzer
///
/// What it does:
///   1. Loads the proxy list (fatal if missing or empty)
///   2. Pulls the market.csgo.com order book
///   3. Either merges the whole Buff catalog against it (ANALYSIS_MODE=catalog)
///      or prices the most traded items on Steam (ANALYSIS_MODE=top_liquid)
///   4. Publishes the result set to RESULTS_DIR/latest-data.json
///
/// Runs once by default; ANALYSIS_INTERVAL_SECS > 0 turns it into a loop.
///
/// Run:
///   cargo run --bin skin-analyzer

use anyhow::Result;
use dotenv::dotenv;
use skin_engine::{Config, Engine, Trigger};
use std::env;
use std::fs::File;
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let config = Config::from_env();

    info!("=== skinarb-live analyzer ===");
    info!("Mode: {:?}", config.mode);
    info!("Proxies: {}", config.proxy_file.display());
    info!("Logs: {}/  Results: {}/", config.log_dir.display(), config.results_dir.display());

    // Single instance lock
    let lock_file_path = env::temp_dir().join("skinarb_analyzer.lock");
    let lock_file = match File::create(&lock_file_path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to create lock file at {:?}: {}", lock_file_path, e);
            return Ok(());
        }
    };

    let mut lock = fd_lock::RwLock::new(lock_file);
    let _write_guard = match lock.try_write() {
        Ok(guard) => {
            info!("Acquired single-instance lock.");
            guard
        }
        Err(_) => {
            warn!("Another instance of skin-analyzer is already running! Exiting.");
            return Ok(());
        }
    };

    let interval = config.analysis_interval;
    let engine = Engine::new(config)?;

    loop {
        let bytes = engine.run_analysis().await;
        info!("Cycle finished, {} bytes of results", bytes.len());

        let Some(every) = interval else { break };
        info!("Next cycle in {}s", every.as_secs());
        sleep(every).await;
        engine.reload_proxies();
    }

    Ok(())
}
