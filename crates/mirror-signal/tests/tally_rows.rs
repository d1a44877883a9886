use mirror_core::{IndicatorBook, IndicatorSnapshot};
use mirror_signal::{is_leveraged_market, tally, TallyRules, TallyStatus};
use serde_json::json;

#[test]
fn test_store_rows_tally_in_book_order() {
    let rows: Vec<IndicatorSnapshot> = serde_json::from_value(json!([
        {
            "pair": "ETH/USDT", "exchange_id": "binance", "rsi": 28, "volume_ratio": 2.4,
            "change_15m": "0.35", "price": 3010, "bb_upper": 3000, "bb_lower": 2900,
            "created_at": "2026-10-16T08:00:00Z"
        },
        {
            "pair": "SOLUSD", "exchange": "delta", "rsi": null, "volume_ratio": 4,
            "price_change_15m": -1.1, "current_price": 140,
            "timestamp": "2026-10-16 08:00:05"
        },
        {
            "pair": "XRPUSD", "exchange": "delta", "rsi": 72, "volume_ratio": 1.1,
            "price_change_15m": -0.1, "current_price": 0.5,
            "timestamp": "2026-10-16T08:00:05Z"
        }
    ]))
    .unwrap();
    let book = IndicatorBook::from_rows(rows);
    let rules = TallyRules::default();
    let leveraged_exchanges = vec!["delta".to_string()];

    let statuses: Vec<(String, TallyStatus)> = book
        .iter()
        .map(|snap| {
            let leveraged = is_leveraged_market(&snap.pair, &snap.exchange, &leveraged_exchanges);
            (snap.pair.to_string(), tally(snap, leveraged, &rules).status)
        })
        .collect();

    assert_eq!(
        statuses,
        vec![
            ("ETH/USDT".to_string(), TallyStatus::Ready),
            ("SOLUSD".to_string(), TallyStatus::NoData),
            ("XRPUSD".to_string(), TallyStatus::NeedsOneMore),
        ]
    );
}
