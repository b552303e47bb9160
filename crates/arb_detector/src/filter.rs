use thiserror::Error;

use crate::model::CombinedItem;

/// `max_price` when the caller gives none.
pub const DEFAULT_MAX_PRICE: f64 = 9_999_999.0;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("cannot decode item list: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("cannot encode filtered items: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    pub min_profit: f64,
    pub min_price:  f64,
    pub max_price:  f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self { min_profit: 0.0, min_price: 0.0, max_price: DEFAULT_MAX_PRICE }
    }
}

impl FilterParams {
    /// Query-string style parameters. Missing or unparsable minimums become
    /// 0, a missing or unparsable maximum becomes `DEFAULT_MAX_PRICE`.
    pub fn from_raw(min_profit: Option<&str>, min_price: Option<&str>, max_price: Option<&str>) -> Self {
        Self {
            min_profit: parse_param(min_profit).unwrap_or(0.0),
            min_price:  parse_param(min_price).unwrap_or(0.0),
            max_price:  parse_param(max_price).unwrap_or(DEFAULT_MAX_PRICE),
        }
    }

    pub fn matches(&self, item: &CombinedItem) -> bool {
        item.profit_percent >= self.min_profit
            && item.market_price >= self.min_price
            && item.market_price <= self.max_price
    }
}

fn parse_param(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok()).filter(|v| v.is_finite())
}

/// Matching subset, input order preserved.
pub fn filter_items(items: &[CombinedItem], params: &FilterParams) -> Vec<CombinedItem> {
    items.iter().filter(|it| params.matches(it)).cloned().collect()
}

/// JSON array in, JSON array out. Undecodable input is an error, not an
/// empty result.
pub fn filter_json(input: &[u8], params: &FilterParams) -> Result<Vec<u8>, FilterError> {
    let items: Vec<CombinedItem> = serde_json::from_slice(input).map_err(FilterError::Decode)?;
    let filtered = filter_items(&items, params);
    tracing::info!("Filter: {} items in, {} matched", items.len(), filtered.len());
    serde_json::to_vec(&filtered).map_err(FilterError::Encode)
}
