/// skinarb-live — Skin Filter
///
/// Filters a combined result set (JSON array) by profit and market price.
///
/// Reads stdin when FILE is missing or "-". Thresholds fall back from flags
/// to MIN_PROFIT / MIN_PRICE / MAX_PRICE, then to 0, 0, 9999999.
/// Undecodable input prints nothing and exits non-zero.
///
/// Run:
///   cargo run --bin skin-filter -- data/latest-data.json --min-profit 5

use anyhow::{Context, Result};
use arb_detector::{filter_json, FilterParams};
use clap::Parser;
use dotenv::dotenv;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "skin-filter")]
#[command(about = "Filter a skinarb result set by profit percent and market price")]
struct Cli {
    /// JSON array of combined items; stdin when missing or "-"
    input: Option<PathBuf>,

    /// Minimum profitPercent (unparsable → 0)
    #[arg(long, env = "MIN_PROFIT")]
    min_profit: Option<String>,

    /// Minimum marketPrice in RUB (unparsable → 0)
    #[arg(long, env = "MIN_PRICE")]
    min_price: Option<String>,

    /// Maximum marketPrice in RUB (unparsable → 9999999)
    #[arg(long, env = "MAX_PRICE")]
    max_price: Option<String>,
}

impl Cli {
    fn params(&self) -> FilterParams {
        FilterParams::from_raw(
            self.min_profit.as_deref(),
            self.min_price.as_deref(),
            self.max_price.as_deref(),
        )
    }
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(p) if p != Path::new("-") => {
            std::fs::read(p).with_context(|| format!("cannot read {}", p.display()))
        }
        _ => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).context("cannot read stdin")?;
            Ok(buf)
        }
    }
}

fn main() -> Result<()> {
    dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn"))
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let params = cli.params();
    info!("Filter params: {params:?}");

    let input = read_input(cli.input.as_deref())?;
    let output = filter_json(&input, &params)?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(&output)?;
    stdout.write_all(b"\n")?;
    Ok(())
}
