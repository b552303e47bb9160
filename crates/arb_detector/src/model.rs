use serde::{Deserialize, Deserializer, Serialize};

use crate::{PROFIT_PCT_ABSENT, PROFIT_PCT_ILLIQUID, PROFIT_THRESHOLD_PCT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Loss,
    Illiquid,
    Profit,
    /// Fan-out rows: market price compared straight against Steam.
    MarketVsSteam,
}

impl Status {
    pub fn from_margin(percent: f64) -> Self {
        if percent > PROFIT_THRESHOLD_PCT { Status::Profit } else { Status::Loss }
    }

    /// Wire name → status. Older result sets carry `""` (or null) for unset
    /// statuses; anything unrecognized reads as `Loss`.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "illiquid" => Status::Illiquid,
            "profit" => Status::Profit,
            "market-vs-steam" => Status::MarketVsSteam,
            _ => Status::Loss,
        }
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Status::from_wire).unwrap_or_default())
    }
}

/// One output row. Field names are the JSON contract the frontend and the
/// filter API read.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinedItem {
    pub name:                 String,
    pub buff_id:              i64,
    pub icon_url:             String,
    pub exterior:             String,
    #[serde(rename = "buffPrice")]
    pub buff_price:           f64,
    #[serde(rename = "buffSellNum")]
    pub buff_sell_num:        u32,
    #[serde(rename = "marketPrice")]
    pub market_price:         f64,
    #[serde(rename = "marketVolume")]
    pub market_volume:        u32,
    #[serde(rename = "steamPrice")]
    pub steam_price:          f64,
    pub steam_market_url:     String,
    #[serde(rename = "profitPercent")]
    pub profit_percent:       f64,
    #[serde(rename = "profitRub")]
    pub profit_rub:           f64,
    pub status:               Status,
    #[serde(rename = "profitSteamPercent")]
    pub profit_steam_percent: f64,
    #[serde(rename = "statusSteam")]
    pub status_steam:         Status,
    pub steam_price_raw:      String,
}

/// Market side of one item, before it is flattened into sentinels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarketOutcome {
    Absent,
    Illiquid { price: f64, volume: u32 },
    Computed { price: f64, volume: u32, profit: f64, percent: f64 },
}

impl MarketOutcome {
    pub fn status(&self) -> Status {
        match self {
            MarketOutcome::Absent => Status::Loss,
            MarketOutcome::Illiquid { .. } => Status::Illiquid,
            MarketOutcome::Computed { percent, .. } => Status::from_margin(*percent),
        }
    }

    pub fn profit_percent(&self) -> f64 {
        match self {
            MarketOutcome::Absent => PROFIT_PCT_ABSENT,
            MarketOutcome::Illiquid { .. } => PROFIT_PCT_ILLIQUID,
            MarketOutcome::Computed { percent, .. } => *percent,
        }
    }

    pub fn profit(&self) -> f64 {
        match self {
            MarketOutcome::Computed { profit, .. } => *profit,
            _ => 0.0,
        }
    }

    pub fn price(&self) -> f64 {
        match self {
            MarketOutcome::Absent => 0.0,
            MarketOutcome::Illiquid { price, .. } | MarketOutcome::Computed { price, .. } => *price,
        }
    }

    pub fn volume(&self) -> u32 {
        match self {
            MarketOutcome::Absent => 0,
            MarketOutcome::Illiquid { volume, .. } | MarketOutcome::Computed { volume, .. } => *volume,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SteamOutcome {
    NoPrice,
    Computed { percent: f64 },
}

impl SteamOutcome {
    pub fn status(&self) -> Status {
        match self {
            SteamOutcome::NoPrice => Status::Loss,
            SteamOutcome::Computed { percent } => Status::from_margin(*percent),
        }
    }

    pub fn profit_percent(&self) -> f64 {
        match self {
            SteamOutcome::NoPrice => PROFIT_PCT_ABSENT,
            SteamOutcome::Computed { percent } => *percent,
        }
    }
}
