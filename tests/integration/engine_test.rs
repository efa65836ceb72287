//! Orchestrator integration tests against in-process collaborators

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reward_maker::config::{Config, ExecutionMode, NetConfig};
use reward_maker::engine::{EngineDeps, Orchestrator};
use reward_maker::events::EventLog;
use reward_maker::execution::{
    ExecutionError, Fill, OpenOrder, OrderExecutor, OrderId, OrderRequest, PaperExecutor,
};
use reward_maker::market::{DiscoveryError, MarketRecord, MarketSource};
use reward_maker::orderbook::{BookError, BookSource, OrderBook, PriceLevel};
use reward_maker::store::StateStore;
use rust_decimal_macros::dec;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

fn market(slug: &str, volume: f64) -> MarketRecord {
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
        competitiveness: Some(0.1),
        one_hour_price_change: Some(0.0),
        volume_24h: Some(volume),
        liquidity: Some(1_000.0),
        end_date: Some(Utc::now() + ChronoDuration::days(30)),
        tick_size: Some(dec!(0.01)),
        min_order_size: Some(dec!(5)),
    }
}

/// Discovery backed by a mutable list; `None` simulates an outage
struct ScriptedSource {
    records: Mutex<Option<Vec<MarketRecord>>>,
}

impl ScriptedSource {
    fn new(records: Vec<MarketRecord>) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Some(records)),
        })
    }

    fn set(&self, records: Option<Vec<MarketRecord>>) {
        *self.records.lock().unwrap() = records;
    }
}

#[async_trait]
impl MarketSource for ScriptedSource {
    async fn fetch_markets(&self) -> Result<Vec<MarketRecord>, DiscoveryError> {
        self.records.lock().unwrap().clone().ok_or(DiscoveryError::Unavailable {
            attempts: 1,
            reason: "scripted outage".to_string(),
        })
    }
}

struct SymmetricBooks;

#[async_trait]
impl BookSource for SymmetricBooks {
    async fn fetch_book(&self, token_id: &str) -> Result<OrderBook, BookError> {
        Ok(OrderBook::from_levels(
            token_id,
            vec![PriceLevel { price: dec!(0.49), size: dec!(200) }],
            vec![PriceLevel { price: dec!(0.51), size: dec!(200) }],
            Utc::now(),
        ))
    }
}

/// Executor over a shared paper venue whose cancels can be made to fail
#[derive(Clone)]
struct StubExecutor {
    venue: PaperExecutor,
    mode: ExecutionMode,
    fail_cancels: Arc<AtomicBool>,
    place_calls: Arc<AtomicUsize>,
}

impl StubExecutor {
    fn new(venue: &PaperExecutor, mode: ExecutionMode) -> Self {
        Self {
            venue: venue.clone(),
            mode,
            fail_cancels: Arc::new(AtomicBool::new(false)),
            place_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn fail_cancels(&self, fail: bool) {
        self.fail_cancels.store(fail, Ordering::SeqCst);
    }

    fn place_calls(&self) -> usize {
        self.place_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderExecutor for StubExecutor {
    fn mode(&self) -> ExecutionMode {
        self.mode
    }

    async fn place(&self, order: &OrderRequest) -> Result<OrderId, ExecutionError> {
        self.place_calls.fetch_add(1, Ordering::SeqCst);
        self.venue.place(order).await
    }

    async fn cancel(&self, order_id: &str) -> Result<(), ExecutionError> {
        if self.fail_cancels.load(Ordering::SeqCst) {
            return Err(ExecutionError::Transport("connection reset".to_string()));
        }
        self.venue.cancel(order_id).await
    }

    async fn list_open(&self) -> Result<Vec<OpenOrder>, ExecutionError> {
        self.venue.list_open().await
    }

    async fn list_fills(&self) -> Result<Vec<Fill>, ExecutionError> {
        self.venue.list_fills().await
    }
}

fn config() -> Config {
    let mut config = Config::default();
    config.net = NetConfig {
        max_retries: 0,
        backoff_base_sec: 0.0,
        ..NetConfig::default()
    };
    config.timing.shutdown_timeout_sec = 5;
    config
}

/// Live settings with room for three instruments
fn live_config(cancel_on_exit: bool) -> Config {
    let mut config = config();
    config.live.max_markets_live = 3;
    config.live.cancel_on_exit = cancel_on_exit;
    config
}

/// Rotation gates that only the score bar can close
fn eager_rotation(mut config: Config) -> Config {
    config.rotation.rotation_cooldown_sec = 0;
    config.rotation.min_tenure_sec = 0;
    config
}

fn deps(source: Arc<ScriptedSource>, executor: PaperExecutor, dir: &Path) -> EngineDeps {
    deps_with(source, Arc::new(executor), config(), dir)
}

fn deps_with(
    source: Arc<ScriptedSource>,
    executor: Arc<dyn OrderExecutor>,
    config: Config,
    dir: &Path,
) -> EngineDeps {
    EngineDeps {
        config: Arc::new(config),
        source,
        books: Arc::new(SymmetricBooks),
        executor,
        store: Arc::new(StateStore::open(dir.join("state.db")).unwrap()),
        events: EventLog::open(dir.join("logs")).unwrap(),
    }
}

async fn open_for(venue: &PaperExecutor, slug: &str) -> usize {
    venue
        .list_open()
        .await
        .unwrap()
        .iter()
        .filter(|o| o.token_id.starts_with(slug))
        .count()
}

fn read_log(dir: &Path) -> String {
    std::fs::read_to_string(dir.join("logs").join("maker.jsonl")).unwrap_or_default()
}

async fn wait_for_log_count(dir: &Path, needle: &str, n: usize) -> usize {
    for _ in 0..300 {
        let count = read_log(dir).matches(needle).count();
        if count >= n {
            return count;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    read_log(dir).matches(needle).count()
}

fn four_markets() -> Vec<MarketRecord> {
    vec![
        market("alpha", 90_000.0),
        market("beta", 50_000.0),
        market("gamma", 20_000.0),
        market("delta", 5_000.0),
    ]
}

fn active_slugs(orchestrator: &Orchestrator) -> Vec<String> {
    let mut slugs: Vec<_> = orchestrator.active().iter().map(|s| s.slug.clone()).collect();
    slugs.sort();
    slugs
}

async fn wait_for_open_orders(executor: &PaperExecutor, n: usize) -> usize {
    for _ in 0..300 {
        let open = executor.list_open().await.unwrap().len();
        if open >= n {
            return open;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    executor.list_open().await.unwrap().len()
}

fn stopped() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(true);
    drop(tx);
    rx
}

#[tokio::test]
async fn test_cold_start_admits_top_markets_and_quotes() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::new(vec![
        market("alpha", 90_000.0),
        market("beta", 50_000.0),
        market("gamma", 20_000.0),
        market("delta", 5_000.0),
    ]);
    let executor = PaperExecutor::new();
    let mut orchestrator = Orchestrator::new(deps(source, executor.clone(), dir.path()));
    assert_eq!(orchestrator.target(), 3);

    orchestrator.rehydrate().unwrap();
    orchestrator.selection_tick().await.unwrap();
    assert_eq!(active_slugs(&orchestrator), vec!["alpha", "beta", "gamma"]);

    // three instruments × two tokens × two sides
    assert_eq!(wait_for_open_orders(&executor, 12).await, 12);

    orchestrator.run(stopped()).await.unwrap();

    let log = std::fs::read_to_string(dir.path().join("logs").join("maker.jsonl")).unwrap();
    assert!(log.contains("\"kind\":\"select_top_n\""));
    assert!(log.contains("\"kind\":\"instrument_admitted\""));
    assert!(log.contains("\"kind\":\"paper_heartbeat\""));
}

#[tokio::test]
async fn test_ineligible_incumbent_is_retired_and_backfilled() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = vec![
        market("alpha", 90_000.0),
        market("beta", 50_000.0),
        market("gamma", 20_000.0),
        market("delta", 5_000.0),
    ];
    let source = ScriptedSource::new(records.clone());
    let executor = PaperExecutor::new();
    let mut orchestrator = Orchestrator::new(deps(source.clone(), executor.clone(), dir.path()));

    orchestrator.rehydrate().unwrap();
    orchestrator.selection_tick().await.unwrap();
    assert_eq!(active_slugs(&orchestrator), vec!["alpha", "beta", "gamma"]);

    records[0].closed = true;
    source.set(Some(records));
    orchestrator.selection_tick().await.unwrap();
    assert_eq!(active_slugs(&orchestrator), vec!["beta", "delta", "gamma"]);

    // The retired instrument's orders were cancelled on eviction
    let open = executor.list_open().await.unwrap();
    assert!(open.iter().all(|o| !o.token_id.starts_with("alpha")));

    orchestrator.run(stopped()).await.unwrap();

    let log = std::fs::read_to_string(dir.path().join("logs").join("maker.jsonl")).unwrap();
    assert!(log.contains("\"kind\":\"instrument_retired\""));
    assert!(log.contains("\"reason\":\"closed\""));
}

#[tokio::test]
async fn test_discovery_outage_keeps_active_set() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::new(vec![
        market("alpha", 90_000.0),
        market("beta", 50_000.0),
        market("gamma", 20_000.0),
    ]);
    let engine = deps(source.clone(), PaperExecutor::new(), dir.path());
    let mut orchestrator = Orchestrator::new(engine);

    orchestrator.rehydrate().unwrap();
    orchestrator.selection_tick().await.unwrap();

    source.set(None);
    orchestrator.selection_tick().await.unwrap();
    assert_eq!(active_slugs(&orchestrator), vec!["alpha", "beta", "gamma"]);

    orchestrator.run(stopped()).await.unwrap();

    let log = std::fs::read_to_string(dir.path().join("logs").join("maker.jsonl")).unwrap();
    assert!(log.contains("\"kind\":\"discovery_failed\""));
}

#[tokio::test]
async fn test_restart_rehydrates_active_set() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::new(vec![
        market("alpha", 90_000.0),
        market("beta", 50_000.0),
        market("gamma", 20_000.0),
        market("delta", 5_000.0),
    ]);

    let mut first = Orchestrator::new(deps(source.clone(), PaperExecutor::new(), dir.path()));
    first.rehydrate().unwrap();
    first.selection_tick().await.unwrap();
    first.run(stopped()).await.unwrap();

    // A stronger newcomer cannot displace incumbents still in tenure
    source.set(Some(vec![
        market("omega", 1_000_000.0),
        market("alpha", 90_000.0),
        market("beta", 50_000.0),
        market("gamma", 20_000.0),
    ]));
    let mut second = Orchestrator::new(deps(source, PaperExecutor::new(), dir.path()));
    second.rehydrate().unwrap();
    assert_eq!(active_slugs(&second), vec!["alpha", "beta", "gamma"]);

    second.selection_tick().await.unwrap();
    assert_eq!(active_slugs(&second), vec!["alpha", "beta", "gamma"]);
    second.run(stopped()).await.unwrap();

    let log = std::fs::read_to_string(dir.path().join("logs").join("maker.jsonl")).unwrap();
    assert!(log.contains("\"kind\":\"rotation_rejected\""));
    assert!(log.contains("\"reason\":\"tenure\""));
}

#[tokio::test]
async fn test_retirement_waits_until_orders_are_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = four_markets();
    let source = ScriptedSource::new(records.clone());
    let venue = PaperExecutor::new();
    let executor = StubExecutor::new(&venue, ExecutionMode::Paper);
    let deps = deps_with(source.clone(), Arc::new(executor.clone()), config(), dir.path());
    let store = deps.store.clone();
    let mut orchestrator = Orchestrator::new(deps);

    orchestrator.rehydrate().unwrap();
    orchestrator.selection_tick().await.unwrap();
    assert_eq!(wait_for_open_orders(&venue, 12).await, 12);

    executor.fail_cancels(true);
    records[0].closed = true;
    source.set(Some(records));
    orchestrator.selection_tick().await.unwrap();

    // alpha stays active while its orders still rest
    assert_eq!(active_slugs(&orchestrator), vec!["alpha", "beta", "gamma"]);
    assert_eq!(open_for(&venue, "alpha").await, 4);
    assert!(store.load_active().unwrap().iter().any(|s| s.slug == "alpha"));

    executor.fail_cancels(false);
    orchestrator.selection_tick().await.unwrap();
    assert_eq!(active_slugs(&orchestrator), vec!["beta", "delta", "gamma"]);
    assert_eq!(open_for(&venue, "alpha").await, 0);
    assert!(!store.load_active().unwrap().iter().any(|s| s.slug == "alpha"));

    orchestrator.run(stopped()).await.unwrap();

    let log = read_log(dir.path());
    assert!(log.contains("\"kind\":\"retire_deferred\""));
    assert!(log.contains("\"kind\":\"instrument_retired\""));
}

#[tokio::test]
async fn test_live_restart_cancels_orders_of_ineligible_incumbent() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = four_markets();
    let source = ScriptedSource::new(records.clone());
    let venue = PaperExecutor::new();

    let executor = StubExecutor::new(&venue, ExecutionMode::Live);
    let first = deps_with(source.clone(), Arc::new(executor), live_config(false), dir.path());
    let mut first = Orchestrator::new(first);
    first.rehydrate().unwrap();
    first.selection_tick().await.unwrap();
    assert_eq!(wait_for_open_orders(&venue, 12).await, 12);
    first.run(stopped()).await.unwrap();
    assert_eq!(open_for(&venue, "alpha").await, 4);

    records[0].closed = true;
    source.set(Some(records));
    let executor = StubExecutor::new(&venue, ExecutionMode::Live);
    let second = deps_with(source, Arc::new(executor), live_config(false), dir.path());
    let store = second.store.clone();
    let mut second = Orchestrator::new(second);
    second.rehydrate().unwrap();
    second.selection_tick().await.unwrap();

    assert_eq!(active_slugs(&second), vec!["beta", "delta", "gamma"]);
    assert_eq!(open_for(&venue, "alpha").await, 0);
    assert!(store.live_orders(Some("0xalpha")).unwrap().is_empty());
    second.run(stopped()).await.unwrap();
}

#[tokio::test]
async fn test_live_restart_adopts_orders_without_placing_again() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::new(four_markets());
    let venue = PaperExecutor::new();
    let executor = StubExecutor::new(&venue, ExecutionMode::Live);

    let config = live_config(false);
    let deps = deps_with(source.clone(), Arc::new(executor.clone()), config, dir.path());
    let mut first = Orchestrator::new(deps);
    first.rehydrate().unwrap();
    first.selection_tick().await.unwrap();
    assert_eq!(wait_for_open_orders(&venue, 12).await, 12);
    first.run(stopped()).await.unwrap();
    assert_eq!(executor.place_calls(), 12);

    let heartbeats = read_log(dir.path()).matches("live_heartbeat").count();
    let deps = deps_with(source, Arc::new(executor.clone()), live_config(false), dir.path());
    let store = deps.store.clone();
    let mut second = Orchestrator::new(deps);
    second.rehydrate().unwrap();
    second.selection_tick().await.unwrap();
    assert_eq!(active_slugs(&second), vec!["alpha", "beta", "gamma"]);

    // every restarted worker completes a full quote cycle
    wait_for_log_count(dir.path(), "live_heartbeat", heartbeats + 3).await;
    assert_eq!(executor.place_calls(), 12);
    assert_eq!(venue.list_open().await.unwrap().len(), 12);
    assert_eq!(store.live_orders(None).unwrap().len(), 12);
    second.run(stopped()).await.unwrap();
}

#[tokio::test]
async fn test_accepted_rotation_cancels_incumbent_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::new(vec![
        market("alpha", 90_000.0),
        market("beta", 50_000.0),
        market("gamma", 20_000.0),
    ]);
    let venue = PaperExecutor::new();
    let executor = StubExecutor::new(&venue, ExecutionMode::Live);
    let config = eager_rotation(live_config(true));
    let deps = deps_with(source.clone(), Arc::new(executor), config, dir.path());
    let store = deps.store.clone();
    let mut orchestrator = Orchestrator::new(deps);

    orchestrator.rehydrate().unwrap();
    orchestrator.selection_tick().await.unwrap();
    assert_eq!(wait_for_open_orders(&venue, 12).await, 12);

    source.set(Some(vec![
        market("omega", 100_000_000.0),
        market("alpha", 90_000.0),
        market("beta", 50_000.0),
        market("gamma", 20_000.0),
    ]));
    orchestrator.selection_tick().await.unwrap();

    assert_eq!(active_slugs(&orchestrator), vec!["alpha", "beta", "omega"]);
    assert_eq!(open_for(&venue, "gamma").await, 0);
    assert!(store.live_orders(Some("0xgamma")).unwrap().is_empty());
    assert!(store.last_rotation().unwrap().is_some());
    let mut persisted: Vec<String> =
        store.load_active().unwrap().into_iter().map(|s| s.slug).collect();
    persisted.sort();
    assert_eq!(persisted, vec!["alpha", "beta", "omega"]);

    orchestrator.run(stopped()).await.unwrap();
    assert!(venue.list_open().await.unwrap().is_empty());

    let log = read_log(dir.path());
    assert!(log.contains("\"kind\":\"rotation_accepted\""));
}

#[tokio::test]
async fn test_unclean_incumbent_teardown_rolls_rotation_back() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::new(vec![
        market("alpha", 90_000.0),
        market("beta", 50_000.0),
        market("gamma", 20_000.0),
    ]);
    let venue = PaperExecutor::new();
    let executor = StubExecutor::new(&venue, ExecutionMode::Live);
    let config = eager_rotation(live_config(true));
    let deps = deps_with(source.clone(), Arc::new(executor.clone()), config, dir.path());
    let store = deps.store.clone();
    let mut orchestrator = Orchestrator::new(deps);

    orchestrator.rehydrate().unwrap();
    orchestrator.selection_tick().await.unwrap();
    assert_eq!(wait_for_open_orders(&venue, 12).await, 12);

    executor.fail_cancels(true);
    source.set(Some(vec![
        market("omega", 100_000_000.0),
        market("alpha", 90_000.0),
        market("beta", 50_000.0),
        market("gamma", 20_000.0),
    ]));
    orchestrator.selection_tick().await.unwrap();

    assert_eq!(active_slugs(&orchestrator), vec!["alpha", "beta", "gamma"]);
    assert_eq!(open_for(&venue, "gamma").await, 4);
    assert_eq!(open_for(&venue, "omega").await, 0);
    assert!(store.last_rotation().unwrap().is_none());

    let log = read_log(dir.path());
    assert!(log.contains("\"reason\":\"shutdown_safety\""));
    assert!(!log.contains("\"kind\":\"rotation_accepted\""));

    executor.fail_cancels(false);
    orchestrator.run(stopped()).await.unwrap();
    assert!(venue.list_open().await.unwrap().is_empty());
}
