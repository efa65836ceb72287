//! Rotation hysteresis over a persisted active set

use chrono::{DateTime, Duration, TimeZone, Utc};
use reward_maker::config::RotationConfig;
use reward_maker::market::MarketRecord;
use reward_maker::rotation::{ActiveInstrumentState, RejectReason, RotationController};
use reward_maker::selection::ScoredMarket;
use reward_maker::store::StateStore;
use rust_decimal_macros::dec;

fn scored(slug: &str, score: f64) -> ScoredMarket {
    ScoredMarket {
        record: MarketRecord {
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
            competitiveness: None,
            one_hour_price_change: None,
            volume_24h: Some(1_000.0),
            liquidity: None,
            end_date: None,
            tick_size: None,
            min_order_size: None,
        },
        capital_estimate: dec!(165),
        per_market_cap: dec!(283),
        score,
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

fn slugs(active: &[ActiveInstrumentState]) -> Vec<String> {
    let mut slugs: Vec<_> = active.iter().map(|s| s.slug.clone()).collect();
    slugs.sort();
    slugs
}

#[test]
fn test_rotation_lifecycle_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");
    let controller = RotationController::new(&RotationConfig::default());

    // Cold start
    let store = StateStore::open(&db).unwrap();
    let ranked = vec![scored("a", 10.0), scored("b", 9.0), scored("c", 8.0), scored("d", 7.0)];
    let plan = controller.evaluate(&ranked, &[], 3, None, t0(), |_| true);
    assert_eq!(plan.fills.len(), 3);
    for candidate in &plan.fills {
        store.upsert_active(&ActiveInstrumentState::admit(candidate, t0())).unwrap();
    }

    // Strong newcomer one hour in: every incumbent is still in tenure
    let active = store.load_active().unwrap();
    let ranked = vec![scored("e", 100.0), scored("a", 10.0), scored("b", 9.0)];
    let now = t0() + Duration::hours(1);
    let plan = controller.evaluate(&ranked, &active, 3, None, now, |_| true);
    assert!(plan.rotation.is_none());
    assert_eq!(plan.rejections.len(), 3);
    assert!(plan.rejections.iter().all(|r| r.reason == RejectReason::Tenure));
    assert_eq!(plan.rejections[0].incumbent, "c");

    // Past tenure: evicts the weakest incumbent
    let now = t0() + Duration::hours(7);
    let plan = controller.evaluate(&ranked, &active, 3, None, now, |_| true);
    let rotation = plan.rotation.expect("rotation accepted");
    assert_eq!(rotation.evicted.slug, "c");
    let admitted = ActiveInstrumentState::admit(&rotation.admitted, now);
    store.apply_rotation(&rotation.evicted.condition_id, &admitted, now).unwrap();
    drop(store);

    // Restart
    let store = StateStore::open(&db).unwrap();
    let active = store.load_active().unwrap();
    assert_eq!(slugs(&active), vec!["a", "b", "e"]);
    let last_rotation = store.last_rotation().unwrap();
    assert_eq!(last_rotation, Some(now));

    // Cooldown holds regardless of score
    let ranked = vec![scored("f", 1_000.0), scored("g", 900.0), scored("e", 100.0)];
    let later = now + Duration::hours(1);
    let plan = controller.evaluate(&ranked, &active, 3, last_rotation, later, |_| true);
    assert!(plan.rotation.is_none());
    assert!(plan.rejections.iter().all(|r| r.reason == RejectReason::Cooldown));

    // After cooldown exactly one displacement happens even with two strong candidates
    let later = now + Duration::hours(12);
    let plan = controller.evaluate(&ranked, &active, 3, last_rotation, later, |_| true);
    let rotation = plan.rotation.expect("rotation accepted");
    assert_eq!(rotation.admitted.slug(), "f");
    assert_eq!(rotation.evicted.slug, "b");
}

#[test]
fn test_unsafe_incumbents_block_rotation() {
    let controller = RotationController::new(&RotationConfig::default());
    let entered = t0();
    let active: Vec<_> = [("a", 1.0), ("b", 2.0)]
        .iter()
        .map(|&(slug, score)| ActiveInstrumentState::admit(&scored(slug, score), entered))
        .collect();

    let ranked = vec![scored("z", 50.0)];
    let later = entered + Duration::days(1);
    let plan = controller.evaluate(&ranked, &active, 2, None, later, |_| false);
    assert!(plan.rotation.is_none());
    assert_eq!(plan.rejections.len(), 2);
    assert!(plan.rejections.iter().all(|r| r.reason == RejectReason::ShutdownSafety));
}

#[test]
fn test_vacancy_fill_ignores_cooldown() {
    let controller = RotationController::new(&RotationConfig::default());
    let now = t0();
    let active = vec![ActiveInstrumentState::admit(&scored("a", 5.0), now)];
    let ranked = vec![scored("a", 5.0), scored("b", 4.0)];

    let plan = controller.evaluate(&ranked, &active, 2, Some(now), now, |_| false);
    assert_eq!(plan.fills.len(), 1);
    assert_eq!(plan.fills[0].slug(), "b");
}
