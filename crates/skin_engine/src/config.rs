use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::fanout::DEFAULT_CONCURRENCY;

pub const DEFAULT_TOP_LIQUID: usize = 111;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Order book + full Buff catalog.
    Catalog,
    /// Order book + Steam prices for the N most traded items.
    TopLiquid(usize),
}

impl AnalysisMode {
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisMode::Catalog => "catalog",
            AnalysisMode::TopLiquid(_) => "top_liquid",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub proxy_file:        PathBuf,
    pub log_dir:           PathBuf,
    pub results_dir:       PathBuf,
    pub mode:              AnalysisMode,
    pub steam_concurrency: usize,
    pub steam_cache_ttl:   Duration,
    pub catalog_workers:   usize,
    /// `None` = run once and exit.
    pub analysis_interval: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy_file:        PathBuf::from("proxies.txt"),
            log_dir:           PathBuf::from("logs"),
            results_dir:       PathBuf::from("data"),
            mode:              AnalysisMode::Catalog,
            steam_concurrency: DEFAULT_CONCURRENCY,
            steam_cache_ttl:   steam_price::DEFAULT_CACHE_TTL,
            catalog_workers:   buff_catalog::DEFAULT_WORKERS,
            analysis_interval: None,
        }
    }
}

impl Config {
    /// Reads the process environment. `.env` must already be loaded.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Unset or unparsable values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let num = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let path = |key: &str, fallback: PathBuf| {
            lookup(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from).unwrap_or(fallback)
        };

        let top_liquid = num("TOP_LIQUID").map(|n| n as usize).unwrap_or(DEFAULT_TOP_LIQUID);
        let mode = match lookup("ANALYSIS_MODE").as_deref().map(str::trim) {
            Some("top_liquid") => AnalysisMode::TopLiquid(top_liquid),
            _ => AnalysisMode::Catalog,
        };

        Self {
            proxy_file:        path("PROXY_FILE", d.proxy_file),
            log_dir:           path("LOG_DIR", d.log_dir),
            results_dir:       path("RESULTS_DIR", d.results_dir),
            mode,
            steam_concurrency: num("STEAM_CONCURRENCY").filter(|n| *n > 0).map(|n| n as usize).unwrap_or(d.steam_concurrency),
            steam_cache_ttl:   num("STEAM_CACHE_TTL_SECS").map(Duration::from_secs).unwrap_or(d.steam_cache_ttl),
            catalog_workers:   num("CATALOG_WORKERS").filter(|n| *n > 0).map(|n| n as usize).unwrap_or(d.catalog_workers),
            analysis_interval: num("ANALYSIS_INTERVAL_SECS").filter(|n| *n > 0).map(Duration::from_secs),
        }
    }
}
