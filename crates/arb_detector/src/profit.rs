use buff_catalog::BuffItem;
use price_monitor::{OrderBookEntry, OrderBookMap};
use tracing::{debug, info, warn};

use crate::model::{CombinedItem, MarketOutcome, Status, SteamOutcome};
use crate::{CNY_TO_RUB_RATE, LIQUIDITY_THRESHOLD, MARKET_COMMISSION, PROFIT_PCT_ABSENT, STEAM_COMMISSION};

/// Buff price string (CNY) → RUB. Anything unparsable counts as 0.
pub fn cny_to_rub(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v * CNY_TO_RUB_RATE,
        _ => 0.0,
    }
}

/// Buy on Buff, sell on market.csgo.com.
pub fn classify_market(buff_price: f64, entry: Option<&OrderBookEntry>) -> MarketOutcome {
    let Some(e) = entry else {
        return MarketOutcome::Absent;
    };
    if e.volume < LIQUIDITY_THRESHOLD {
        return MarketOutcome::Illiquid { price: e.price, volume: e.volume };
    }

    let net = e.price * (1.0 - MARKET_COMMISSION);
    let profit = net - buff_price;
    MarketOutcome::Computed {
        price: e.price,
        volume: e.volume,
        profit,
        percent: profit / buff_price * 100.0,
    }
}

/// Buy on Buff, sell on Steam.
pub fn classify_steam(buff_price: f64, steam_price: f64) -> SteamOutcome {
    if steam_price <= 0.0 {
        return SteamOutcome::NoPrice;
    }
    let net = steam_price * (1.0 - STEAM_COMMISSION);
    SteamOutcome::Computed { percent: (net - buff_price) / buff_price * 100.0 }
}

/// One Buff listing against the order book. `None` for listings without a
/// name or with a zero Buff price.
pub fn combine(item: &BuffItem, order_book: &OrderBookMap) -> Option<CombinedItem> {
    let buff_price = cny_to_rub(&item.sell_min_price);
    let steam_price = cny_to_rub(&item.goods_info.steam_price_cny);
    if item.name.is_empty() || buff_price == 0.0 {
        return None;
    }

    let market = classify_market(buff_price, order_book.get(&item.name));
    let steam = classify_steam(buff_price, steam_price);

    Some(CombinedItem {
        name:                 item.name.clone(),
        buff_id:              item.id,
        icon_url:             item.goods_info.icon_url.clone(),
        exterior:             item.exterior().to_string(),
        buff_price,
        buff_sell_num:        item.sell_num,
        market_price:         market.price(),
        market_volume:        market.volume(),
        steam_price,
        steam_market_url:     item.steam_market_url.clone(),
        profit_percent:       market.profit_percent(),
        profit_rub:           market.profit(),
        status:               market.status(),
        profit_steam_percent: steam.profit_percent(),
        status_steam:         steam.status(),
        steam_price_raw:      String::new(),
    })
}

/// Full catalog pass. Output order follows the input; nothing is sorted.
pub fn merge(items: &[BuffItem], order_book: &OrderBookMap) -> Vec<CombinedItem> {
    info!("Analyzing {} Buff listings against {} order-book entries", items.len(), order_book.len());
    if order_book.is_empty() {
        warn!("Order book is empty, every listing will be 'loss'");
    }

    let combined: Vec<CombinedItem> = items.iter().filter_map(|it| combine(it, order_book)).collect();

    let profitable = combined.iter().filter(|c| c.status == Status::Profit).count();
    debug!("Merge: {} kept, {} skipped, {} profitable", combined.len(), items.len() - combined.len(), profitable);
    combined
}

/// Fan-out row: order-book price compared straight against Steam.
pub fn market_vs_steam(
    name:         &str,
    market_price: f64,
    volume:       u32,
    steam_price:  f64,
    steam_raw:    &str,
) -> CombinedItem {
    let profit_percent = if market_price > 0.0 {
        (steam_price - market_price) / market_price * 100.0
    } else {
        0.0
    };

    CombinedItem {
        name: name.to_string(),
        market_price,
        market_volume: volume,
        steam_price,
        steam_price_raw: steam_raw.to_string(),
        profit_percent,
        profit_rub: steam_price - market_price,
        status: Status::MarketVsSteam,
        profit_steam_percent: PROFIT_PCT_ABSENT,
        status_steam: Status::Loss,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PROFIT_PCT_ABSENT, PROFIT_PCT_ILLIQUID};
    use std::collections::HashMap;

    fn listing(name: &str, sell_cny: &str, steam_cny: &str) -> BuffItem {
        let mut it = BuffItem {
            id: 1,
            name: name.to_string(),
            sell_min_price: sell_cny.to_string(),
            sell_num: 10,
            ..Default::default()
        };
        it.goods_info.steam_price_cny = steam_cny.to_string();
        it
    }

    fn book(entries: &[(&str, f64, u32)]) -> OrderBookMap {
        entries
            .iter()
            .map(|(n, p, v)| (n.to_string(), OrderBookEntry { price: *p, volume: *v }))
            .collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn liquid_market_math() {
        let entry = OrderBookEntry { price: 120.0, volume: 50 };
        match classify_market(100.0, Some(&entry)) {
            MarketOutcome::Computed { profit, percent, .. } => {
                assert!(close(profit, 8.0));
                assert!(close(percent, 8.0));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(classify_market(100.0, Some(&entry)).status(), Status::Profit);
    }

    #[test]
    fn illiquid_ignores_prices() {
        let entry = OrderBookEntry { price: 120.0, volume: 3 };
        let out = classify_market(100.0, Some(&entry));
        assert_eq!(out.status(), Status::Illiquid);
        assert_eq!(out.profit_percent(), PROFIT_PCT_ILLIQUID);

        let huge = OrderBookEntry { price: 1e9, volume: 4 };
        assert_eq!(classify_market(1.0, Some(&huge)).status(), Status::Illiquid);
    }

    #[test]
    fn volume_at_threshold_is_liquid() {
        let entry = OrderBookEntry { price: 200.0, volume: LIQUIDITY_THRESHOLD };
        assert!(matches!(classify_market(100.0, Some(&entry)), MarketOutcome::Computed { .. }));
    }

    #[test]
    fn steam_side_math() {
        // 200 * 0.85 = 170 → +70%
        match classify_steam(100.0, 200.0) {
            SteamOutcome::Computed { percent } => assert!(close(percent, 70.0)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(classify_steam(100.0, 110.0).status(), Status::Loss);
        assert_eq!(classify_steam(100.0, 0.0), SteamOutcome::NoPrice);
        assert_eq!(classify_steam(100.0, -1.0), SteamOutcome::NoPrice);
    }

    #[test]
    fn absent_from_order_book() {
        let rows = merge(&[listing("Only On Buff", "10", "0")], &book(&[]));
        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert_eq!(r.status, Status::Loss);
        assert_eq!(r.profit_percent, PROFIT_PCT_ABSENT);
        assert_eq!(r.market_price, 0.0);
        assert_eq!(r.market_volume, 0);
        assert_eq!(r.profit_rub, 0.0);
        assert_eq!(r.profit_steam_percent, PROFIT_PCT_ABSENT);
        assert_eq!(r.status_steam, Status::Loss);
    }

    #[test]
    fn converts_cny_and_skips_unusable_listings() {
        let items = [
            listing("", "10", "20"),
            listing("Zero", "0", "20"),
            listing("Garbage", "n/a", "20"),
            listing("Kept", "10", "20"),
        ];
        let rows = merge(&items, &book(&[("Kept", 200.0, 100)]));

        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert!(close(r.buff_price, 113.54));
        assert!(close(r.steam_price, 227.08));
        assert!(close(r.profit_rub, 200.0 * 0.9 - 113.54));
        assert_eq!(r.status, Status::Profit);
        assert_eq!(r.status_steam, Status::Profit);
    }

    #[test]
    fn merged_rows_respect_status_invariants() {
        let items: Vec<BuffItem> = (0..40)
            .map(|i| listing(&format!("item-{i}"), &format!("{}", 1 + i * 3), &format!("{}", i * 5)))
            .collect();
        let ob = book(&[
            ("item-1", 50.0, 100),
            ("item-2", 5000.0, 2),
            ("item-3", 10.0, 5),
            ("item-4", 900.0, 40),
        ]);

        for r in merge(&items, &ob) {
            assert!(matches!(r.status, Status::Loss | Status::Illiquid | Status::Profit));
            assert!(matches!(r.status_steam, Status::Loss | Status::Profit));
            if r.profit_percent == PROFIT_PCT_ABSENT {
                assert!(!ob.contains_key(&r.name));
                assert_eq!(r.status, Status::Loss);
            }
            if r.profit_percent == PROFIT_PCT_ILLIQUID {
                assert_eq!(r.status, Status::Illiquid);
            }
            if r.status == Status::Profit {
                assert!(r.profit_percent > 2.0);
            }
        }
    }

    #[test]
    fn fan_out_row_compares_market_to_steam() {
        let row = market_vs_steam("M4A4 | Howl", 100.0, 80, 150.0, "150 pуб.");
        assert!(close(row.profit_percent, 50.0));
        assert!(close(row.profit_rub, 50.0));
        assert_eq!(row.status, Status::MarketVsSteam);
        assert_eq!(row.steam_price_raw, "150 pуб.");

        assert_eq!(market_vs_steam("free", 0.0, 1, 10.0, "10").profit_percent, 0.0);
    }
}
