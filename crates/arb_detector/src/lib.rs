/// skinarb-live — Arb Detector
///
/// Joins Buff listings (CNY), the market.csgo.com order book (RUB) and Steam
/// prices by `market_hash_name`, nets out commissions and labels each item.
/// Also owns the published result set and the filter query over it.

pub mod filter;
pub mod model;
pub mod profit;
pub mod store;

pub use filter::{filter_items, filter_json, FilterError, FilterParams};
pub use model::{CombinedItem, MarketOutcome, Status, SteamOutcome};
pub use profit::{classify_market, classify_steam, market_vs_steam, merge};
pub use store::ResultStore;

/// Fixed CNY → RUB conversion.
pub const CNY_TO_RUB_RATE: f64 = 11.354;
/// market.csgo.com seller fee.
pub const MARKET_COMMISSION: f64 = 0.10;
/// Steam + game fee.
pub const STEAM_COMMISSION: f64 = 0.15;
/// Below this order-book volume the price is not trusted.
pub const LIQUIDITY_THRESHOLD: u32 = 5;
/// "profit" needs strictly more than this margin, in percent.
pub const PROFIT_THRESHOLD_PCT: f64 = 2.0;

/// Wire sentinel: no counterpart data.
pub const PROFIT_PCT_ABSENT: f64 = -999.0;
/// Wire sentinel: counterpart present but illiquid.
pub const PROFIT_PCT_ILLIQUID: f64 = -998.0;
