//! Selection pipeline integration tests

use chrono::{Duration, Utc};
use reward_maker::config::Config;
use reward_maker::market::MarketRecord;
use reward_maker::selection::{per_market_cap, rank_candidates, select_top, SelectionError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn market(
    slug: &str,
    volume: f64,
    liquidity: f64,
    change: f64,
    competitiveness: f64,
) -> MarketRecord {
    MarketRecord {
        id: format!("id-{slug}"),
        condition_id: format!("0x{slug}"),
        slug: slug.to_string(),
        active: true,
        closed: false,
        accepting_orders: true,
        enable_order_book: true,
        restricted: false,
        rewards_min_size: dec!(50),
        rewards_max_spread: dec!(0.035),
        outcomes: vec!["Yes".to_string(), "No".to_string()],
        token_ids: vec![format!("{slug}-yes"), format!("{slug}-no")],
        competitiveness: Some(competitiveness),
        one_hour_price_change: Some(change),
        volume_24h: Some(volume),
        liquidity: Some(liquidity),
        end_date: Some(Utc::now() + Duration::days(30)),
        tick_size: Some(dec!(0.01)),
        min_order_size: Some(dec!(5)),
    }
}

fn universe() -> Vec<MarketRecord> {
    let mut thin = market("thin", 600.0, 100.0, 0.0, 0.0);
    thin.rewards_max_spread = dec!(0.02);

    let mut big = market("big", 1_000_000.0, 1_000_000.0, 0.0, 0.0);
    big.rewards_min_size = dec!(100);

    let mut expiring = market("expiring", 1_000_000.0, 1_000_000.0, 0.0, 0.0);
    expiring.end_date = Some(Utc::now() + Duration::days(3));

    let mut restricted = market("restricted", 1_000_000.0, 1_000_000.0, 0.0, 0.0);
    restricted.restricted = true;

    vec![
        thin,
        market("busy", 100_000.0, 20_000.0, 0.3, 0.9),
        big,
        market("stable", 50_000.0, 20_000.0, 0.0, 0.2),
        expiring,
        market("quiet", 1_000.0, 1_000.0, 0.01, 0.1),
        restricted,
    ]
}

#[test]
fn test_top_three_from_synthetic_universe() {
    let config = Config::default();
    let top = select_top(&universe(), &config, 3, Utc::now()).unwrap();

    let slugs: Vec<_> = top.iter().map(|m| m.slug()).collect();
    assert_eq!(slugs, vec!["stable", "busy", "quiet"]);

    // 2·ln(4.5) + ln(50001) + 0.5·ln(20001) − 1.5·0.2 − 0.8·(165 / 283.33..)
    let capital_ratio = 165.0 / (850.0 / 3.0);
    let expected = 2.0 * 4.5f64.ln() + 50_001f64.ln() + 0.5 * 20_001f64.ln()
        - 0.3
        - 0.8 * capital_ratio;
    assert!((top[0].score - expected).abs() < 1e-9);
    assert_eq!(top[0].capital_estimate, dec!(165));
}

#[test]
fn test_ranking_counts_and_drops() {
    let ranking = rank_candidates(&universe(), &Config::default(), Utc::now());
    assert_eq!(ranking.fetched, 7);
    // expiring and restricted fail eligibility, big fails capital
    assert_eq!(ranking.eligible, 5);
    assert_eq!(ranking.ranked.len(), 4);
    assert!(ranking.get("0xbig").is_none());
    assert_eq!(ranking.ranked[3].slug(), "thin");
}

#[test]
fn test_insufficient_candidates() {
    let err = select_top(&universe(), &Config::default(), 5, Utc::now()).unwrap_err();
    assert_eq!(
        err,
        SelectionError::InsufficientCandidates {
            needed: 5,
            available: 4
        }
    );
}

#[test]
fn test_selection_is_order_independent() {
    let config = Config::default();
    let now = Utc::now();
    let forward = rank_candidates(&universe(), &config, now);

    let mut reversed = universe();
    reversed.reverse();
    let backward = rank_candidates(&reversed, &config, now);

    let ids = |r: &reward_maker::selection::Ranking| -> Vec<String> {
        r.ranked.iter().map(|m| m.condition_id().to_string()).collect()
    };
    assert_eq!(ids(&forward), ids(&backward));
    assert_eq!(ids(&forward), ids(&rank_candidates(&universe(), &config, now)));
}

#[test]
fn test_equal_scores_break_ties_by_slug() {
    let records = vec![
        market("b-tie", 1_000.0, 1_000.0, 0.0, 0.0),
        market("a-tie", 1_000.0, 1_000.0, 0.0, 0.0),
    ];
    let ranking = rank_candidates(&records, &Config::default(), Utc::now());
    assert_eq!(ranking.ranked[0].slug(), "a-tie");
    assert_eq!(ranking.ranked[1].slug(), "b-tie");
}

#[test]
fn test_never_selects_infeasible() {
    let mut config = Config::default();
    config.capital.num_markets = 6;
    let cap = per_market_cap(&config);
    assert_eq!(cap, dec!(850) / Decimal::from(6));

    let ranking = rank_candidates(&universe(), &config, Utc::now());
    // 165 > 141.67: nothing fits a six-way split
    assert!(ranking.ranked.is_empty());
    assert!(ranking.ranked.iter().all(|m| m.capital_estimate <= m.per_market_cap));
}
