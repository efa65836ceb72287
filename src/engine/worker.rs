//! Per-instrument quoting worker
//!
//! Each worker exclusively owns the resting orders of one instrument, one
//! per (token, side). Every poll it refreshes those orders, fetches a book
//! per outcome token, derives targets and replaces only what the churn
//! policy says must go. Order action failures beyond the retry budget
//! pause the worker: it cancels everything and stops placing for
//! `pause_sec`.

use crate::config::{Config, ExecutionMode};
use crate::events::{Event, EventLog, Heartbeat, SideQuote, TokenQuote};
use crate::execution::{
    with_retries, ExecutionError, OrderExecutor, OrderId, OrderRequest, OrderStatus, Side,
};
use crate::market::MarketRecord;
use crate::orderbook::BookSource;
use crate::quote::{quote_from_book, ChurnPolicy, QuoteTarget, RestingQuote};
use crate::rotation::ActiveInstrumentState;
use crate::store::{OrderRecord, StateStore, StoreError};
use crate::telemetry::{incr_counter, CounterMetric};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Shared collaborators handed to every worker
#[derive(Clone)]
pub struct WorkerDeps {
    pub config: Arc<Config>,
    pub books: Arc<dyn BookSource>,
    pub executor: Arc<dyn OrderExecutor>,
    pub store: Arc<StateStore>,
    pub events: EventLog,
}

/// Why a worker is being stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Displaced or retired: always cancel
    Evict,
    /// Process exit: cancel in live mode when `cancel_on_exit` is set
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkerState {
    Quoting,
    Paused { until: DateTime<Utc> },
    Stopped,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Quoting => "quoting",
            WorkerState::Paused { .. } => "paused",
            WorkerState::Stopped => "stopped",
        }
    }
}

/// Snapshot published after every cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub resting: usize,
    /// Orders whose last cancel attempt failed
    pub unresolved_cancels: usize,
}

impl WorkerStatus {
    /// All resting orders can be cancelled without leftovers
    pub fn can_stop_cleanly(&self) -> bool {
        self.unresolved_cancels == 0
    }
}

/// Outcome of cancelling a worker's orders on stop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    pub succeeded: usize,
    pub failed: Vec<OrderId>,
    /// Task did not finish in time or panicked
    pub incomplete: bool,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.incomplete
    }
}

/// Handle held by the orchestrator
pub struct WorkerHandle {
    pub condition_id: String,
    pub slug: String,
    stop_tx: watch::Sender<Option<StopMode>>,
    status_rx: watch::Receiver<WorkerStatus>,
    task: JoinHandle<StopReport>,
}

impl WorkerHandle {
    pub fn status(&self) -> WorkerStatus {
        self.status_rx.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal stop and wait up to `timeout` for the worker to wind down
    pub async fn stop(self, mode: StopMode, timeout: Duration) -> StopReport {
        let _ = self.stop_tx.send(Some(mode));
        let abort = self.task.abort_handle();

        match tokio::time::timeout(timeout, self.task).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                tracing::error!(slug = %self.slug, error = %e, "Worker task failed");
                StopReport {
                    incomplete: true,
                    ..StopReport::default()
                }
            }
            Err(_) => {
                tracing::error!(
                    slug = %self.slug,
                    timeout_s = timeout.as_secs(),
                    "Worker did not stop in time"
                );
                abort.abort();
                StopReport {
                    incomplete: true,
                    ..StopReport::default()
                }
            }
        }
    }
}

/// Spawn a worker for an admitted instrument
pub fn spawn(
    deps: WorkerDeps,
    market: MarketRecord,
    instrument: ActiveInstrumentState,
) -> WorkerHandle {
    let (stop_tx, stop_rx) = watch::channel(None);
    let (status_tx, status_rx) = watch::channel(WorkerStatus {
        state: WorkerState::Quoting,
        resting: 0,
        unresolved_cancels: 0,
    });

    let condition_id = instrument.condition_id.clone();
    let slug = instrument.slug.clone();
    let worker = Worker::new(deps, market, instrument, status_tx);
    let task = tokio::spawn(worker.run(stop_rx));

    WorkerHandle {
        condition_id,
        slug,
        stop_tx,
        status_rx,
        task,
    }
}

#[derive(Debug, Error)]
enum CycleFault {
    #[error("order action failed: {0}")]
    OrderAction(#[from] ExecutionError),
    #[error("persist failed: {0}")]
    Persist(#[from] StoreError),
}

#[derive(Debug, Clone)]
struct Resting {
    order_id: OrderId,
    price: Decimal,
    remaining: Decimal,
}

type SlotKey = (String, Side);

struct Worker {
    deps: WorkerDeps,
    market: MarketRecord,
    instrument: ActiveInstrumentState,
    policy: ChurnPolicy,
    live: bool,
    resting: HashMap<SlotKey, Resting>,
    unresolved: HashSet<OrderId>,
    state: WorkerState,
    status_tx: watch::Sender<WorkerStatus>,
}

impl Worker {
    fn new(
        deps: WorkerDeps,
        market: MarketRecord,
        instrument: ActiveInstrumentState,
        status_tx: watch::Sender<WorkerStatus>,
    ) -> Self {
        let policy = ChurnPolicy::new(&market, &deps.config.quote);
        let live = deps.executor.mode() == ExecutionMode::Live;
        Self {
            deps,
            market,
            instrument,
            policy,
            live,
            resting: HashMap::new(),
            unresolved: HashSet::new(),
            state: WorkerState::Quoting,
            status_tx,
        }
    }

    async fn run(mut self, mut stop_rx: watch::Receiver<Option<StopMode>>) -> StopReport {
        tracing::info!(slug = %self.instrument.slug, live = self.live, "Worker started");

        if let Err(fault) = self.reconcile().await {
            self.pause(fault).await;
        }

        let poll = Duration::from_secs(self.deps.config.timing.poll_interval_sec.max(1));
        loop {
            let requested = *stop_rx.borrow();
            if let Some(mode) = requested {
                return self.teardown(mode).await;
            }

            self.tick().await;

            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        return self.teardown(StopMode::Shutdown).await;
                    }
                }
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }

    /// Adopt orders persisted by a previous run so they are not placed twice
    ///
    /// Stored price and size stand in until the first refresh reconciles
    /// them against the executor.
    async fn reconcile(&mut self) -> Result<(), CycleFault> {
        if !self.live {
            return Ok(());
        }
        let persisted = self.deps.store.live_orders(Some(&self.instrument.condition_id))?;

        let mut duplicates = Vec::new();
        for order in persisted {
            let key = (order.token_id.clone(), order.side);
            if self.resting.contains_key(&key) {
                duplicates.push(order.order_id);
                continue;
            }
            self.resting.insert(
                key,
                Resting {
                    order_id: order.order_id,
                    price: order.price,
                    remaining: order.size,
                },
            );
        }

        if !self.resting.is_empty() {
            tracing::info!(
                slug = %self.instrument.slug,
                adopted = self.resting.len(),
                "Adopted persisted orders"
            );
        }

        for order_id in duplicates {
            self.cancel_untracked(&order_id).await?;
        }
        Ok(())
    }

    async fn tick(&mut self) {
        if let WorkerState::Paused { until } = self.state {
            if !self.resting.is_empty() {
                self.cancel_all().await;
            }
            if Utc::now() < until {
                self.publish();
                return;
            }
            tracing::info!(slug = %self.instrument.slug, "Worker resuming after pause");
            self.state = WorkerState::Quoting;
        }

        if let Err(fault) = self.quote_cycle().await {
            self.pause(fault).await;
        }
        self.publish();
    }

    async fn quote_cycle(&mut self) -> Result<(), CycleFault> {
        self.refresh_resting().await?;

        let mut tokens = Vec::with_capacity(self.instrument.outcome_tokens.len());
        for (outcome, token_id) in self.instrument.outcome_tokens.clone() {
            let mut quote = TokenQuote {
                outcome,
                token_id: token_id.clone(),
                midpoint: None,
                target: None,
                bid: SideQuote::default(),
                ask: SideQuote::default(),
                book_error: None,
            };

            match self.deps.books.fetch_book(&token_id).await {
                Ok(book) => {
                    let config = &self.deps.config.quote;
                    if let Some(target) = quote_from_book(&book, &self.market, config) {
                        quote.midpoint = Some(target.midpoint);
                        quote.target = Some(target);
                        quote.bid = self.quote_side(&token_id, Side::Buy, &target).await?;
                        quote.ask = self.quote_side(&token_id, Side::Sell, &target).await?;
                    }
                }
                Err(e) => {
                    incr_counter(CounterMetric::BookFailures, 1);
                    tracing::warn!(
                        slug = %self.instrument.slug,
                        token_id = %token_id,
                        error = %e,
                        "Book unavailable, quotes disabled this cycle"
                    );
                    quote.book_error = Some(e.to_string());
                }
            }
            tokens.push(quote);
        }

        let heartbeat = Heartbeat {
            slug: self.instrument.slug.clone(),
            condition_id: self.instrument.condition_id.clone(),
            status: self.state.as_str().to_string(),
            tokens,
            resting_orders: self.resting.len(),
        };
        let event = if self.live {
            Event::LiveHeartbeat(heartbeat)
        } else {
            Event::PaperHeartbeat(heartbeat)
        };
        self.deps.events.emit(&event);
        Ok(())
    }

    /// Keep, replace or place the order on one side of one token
    async fn quote_side(
        &mut self,
        token_id: &str,
        side: Side,
        target: &QuoteTarget,
    ) -> Result<SideQuote, CycleFault> {
        let key = (token_id.to_string(), side);
        let price = target.price(side);
        let mut view = SideQuote::default();

        let current = self.resting.get(&key).map(|r| RestingQuote {
            price: r.price,
            remaining_size: r.remaining,
        });
        if let Some(current) = current {
            view.resting_price = Some(current.price);
            view.in_band = Some(self.policy.is_in_band(
                current.price,
                current.remaining_size,
                target.midpoint,
            ));
            match self.policy.replace_reason(&current, target, side) {
                None => return Ok(view),
                Some(reason) => {
                    tracing::debug!(
                        slug = %self.instrument.slug,
                        token_id,
                        %side,
                        ?reason,
                        "Replacing order"
                    );
                    view.replace = Some(reason);
                    self.cancel_tracked(&key).await?;
                }
            }
        }

        if self.policy.is_placeable(price, target.size, target.midpoint) {
            self.place(token_id, side, price, target.size).await?;
            view.placed = true;
        } else {
            tracing::debug!(
                slug = %self.instrument.slug,
                token_id,
                %side,
                %price,
                "Target outside reward band, side left empty"
            );
        }
        Ok(view)
    }

    /// Pull remaining sizes from the executor and drop orders that left the book
    async fn refresh_resting(&mut self) -> Result<(), CycleFault> {
        if self.resting.is_empty() {
            return Ok(());
        }

        let executor = self.deps.executor.clone();
        let config = self.deps.config.clone();
        let open = with_retries(&config.net, || executor.list_open()).await?;
        let open: HashMap<&str, _> = open.iter().map(|o| (o.order_id.as_str(), o)).collect();

        let mut partial = Vec::new();
        let mut vanished = Vec::new();
        for (key, resting) in self.resting.iter_mut() {
            match open.get(resting.order_id.as_str()) {
                Some(order) => {
                    let remaining = order.remaining();
                    if remaining < resting.remaining {
                        partial.push(resting.order_id.clone());
                    }
                    resting.price = order.price;
                    resting.remaining = remaining;
                }
                None => vanished.push(key.clone()),
            }
        }

        for order_id in partial {
            self.persist_status(&order_id, OrderStatus::Partial)?;
        }
        if vanished.is_empty() {
            return Ok(());
        }

        let fills = with_retries(&config.net, || executor.list_fills()).await?;
        let filled: HashSet<&str> = fills.iter().map(|f| f.order_id.as_str()).collect();
        for key in vanished {
            if let Some(resting) = self.resting.remove(&key) {
                let status = if filled.contains(resting.order_id.as_str()) {
                    OrderStatus::Filled
                } else {
                    OrderStatus::Canceled
                };
                tracing::info!(
                    slug = %self.instrument.slug,
                    order_id = %resting.order_id,
                    status = status.as_str(),
                    "Order left the book"
                );
                self.unresolved.remove(&resting.order_id);
                self.persist_status(&resting.order_id, status)?;
            }
        }
        Ok(())
    }

    async fn place(
        &mut self,
        token_id: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Result<(), CycleFault> {
        let request = OrderRequest {
            token_id: token_id.to_string(),
            side,
            price,
            size,
        };
        let executor = self.deps.executor.clone();
        let config = self.deps.config.clone();
        let order_id = match with_retries(&config.net, || executor.place(&request)).await {
            Ok(order_id) => order_id,
            Err(ExecutionError::Unconfirmed(reason)) => {
                let Some(order_id) = self.find_unconfirmed(&request).await else {
                    return Err(ExecutionError::Unconfirmed(reason).into());
                };
                tracing::warn!(
                    slug = %self.instrument.slug,
                    %order_id,
                    %reason,
                    "Adopting unconfirmed placement"
                );
                order_id
            }
            Err(e) => return Err(e.into()),
        };
        incr_counter(CounterMetric::OrdersPlaced, 1);

        self.resting.insert(
            (token_id.to_string(), side),
            Resting {
                order_id: order_id.clone(),
                price,
                remaining: size,
            },
        );

        if self.live {
            let now = Utc::now();
            self.deps.store.insert_order(&OrderRecord {
                order_id,
                condition_id: self.instrument.condition_id.clone(),
                token_id: token_id.to_string(),
                side,
                price,
                size,
                status: OrderStatus::Open,
                created_at: now,
                updated_at: now,
            })?;
        }
        Ok(())
    }

    /// Untracked resting order matching a placement whose outcome was lost
    async fn find_unconfirmed(&self, request: &OrderRequest) -> Option<OrderId> {
        let executor = self.deps.executor.clone();
        let config = self.deps.config.clone();
        let open = match with_retries(&config.net, || executor.list_open()).await {
            Ok(open) => open,
            Err(e) => {
                tracing::warn!(
                    slug = %self.instrument.slug,
                    error = %e,
                    "Could not list open orders after unconfirmed placement"
                );
                return None;
            }
        };

        let tracked: HashSet<&str> = self.resting.values().map(|r| r.order_id.as_str()).collect();
        open.into_iter()
            .find(|o| {
                o.token_id == request.token_id
                    && o.side == request.side
                    && o.price == request.price
                    && o.original_size == request.size
                    && !tracked.contains(o.order_id.as_str())
            })
            .map(|o| o.order_id)
    }

    /// Cancel the order in a slot; it leaves the slot only once cancelled
    async fn cancel_tracked(&mut self, key: &SlotKey) -> Result<(), CycleFault> {
        let Some(order_id) = self.resting.get(key).map(|r| r.order_id.clone()) else {
            return Ok(());
        };

        match self.cancel_untracked(&order_id).await {
            Ok(()) => {
                self.resting.remove(key);
                Ok(())
            }
            Err(CycleFault::Persist(e)) => {
                self.resting.remove(key);
                Err(CycleFault::Persist(e))
            }
            Err(fault) => Err(fault),
        }
    }

    async fn cancel_untracked(&mut self, order_id: &str) -> Result<(), CycleFault> {
        let executor = self.deps.executor.clone();
        let config = self.deps.config.clone();
        match with_retries(&config.net, || executor.cancel(order_id)).await {
            Ok(()) | Err(ExecutionError::NotFound(_)) => {
                incr_counter(CounterMetric::OrdersCancelled, 1);
                self.unresolved.remove(order_id);
                self.persist_status(order_id, OrderStatus::Canceled)?;
                Ok(())
            }
            Err(e) => {
                incr_counter(CounterMetric::OrderFailures, 1);
                self.unresolved.insert(order_id.to_string());
                Err(e.into())
            }
        }
    }

    /// Best-effort cancel of every resting order
    async fn cancel_all(&mut self) -> StopReport {
        let mut report = StopReport::default();
        let keys: Vec<SlotKey> = self.resting.keys().cloned().collect();

        for key in keys {
            let order_id = match self.resting.get(&key) {
                Some(r) => r.order_id.clone(),
                None => continue,
            };
            match self.cancel_tracked(&key).await {
                Ok(()) => report.succeeded += 1,
                Err(CycleFault::Persist(e)) => {
                    report.succeeded += 1;
                    self.report_persist_failure("cancel", &e);
                }
                Err(CycleFault::OrderAction(e)) => {
                    tracing::error!(
                        slug = %self.instrument.slug,
                        %order_id,
                        error = %e,
                        "Cancel failed"
                    );
                    report.failed.push(order_id);
                }
            }
        }
        report
    }

    async fn pause(&mut self, fault: CycleFault) {
        if let CycleFault::Persist(e) = &fault {
            self.report_persist_failure("order", e);
        }

        let report = self.cancel_all().await;
        let pause_sec = self.deps.config.quote.pause_sec;
        let until = i64::try_from(pause_sec)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .and_then(|pause| Utc::now().checked_add_signed(pause))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.state = WorkerState::Paused { until };

        tracing::warn!(
            slug = %self.instrument.slug,
            reason = %fault,
            cancelled = report.succeeded,
            cancel_failures = report.failed.len(),
            pause_sec,
            "Worker paused"
        );
        self.deps.events.emit(&Event::InstrumentPaused {
            slug: self.instrument.slug.clone(),
            condition_id: self.instrument.condition_id.clone(),
            reason: fault.to_string(),
            pause_sec,
        });
        self.publish();
    }

    async fn teardown(mut self, mode: StopMode) -> StopReport {
        let cancel = match mode {
            StopMode::Evict => true,
            StopMode::Shutdown => self.live && self.deps.config.live.cancel_on_exit,
        };

        let report = if cancel {
            let report = self.cancel_all().await;
            self.deps.events.emit(&Event::ShutdownCancelAttempt {
                slug: self.instrument.slug.clone(),
                condition_id: self.instrument.condition_id.clone(),
                succeeded: report.succeeded,
                failed: report.failed.len(),
                failed_order_ids: report.failed.clone(),
            });
            report
        } else {
            tracing::info!(
                slug = %self.instrument.slug,
                resting = self.resting.len(),
                "Leaving orders resting on exit"
            );
            StopReport::default()
        };

        self.state = WorkerState::Stopped;
        self.publish();
        tracing::info!(
            slug = %self.instrument.slug,
            ?mode,
            cancelled = report.succeeded,
            failed = report.failed.len(),
            "Worker stopped"
        );
        report
    }

    fn persist_status(&self, order_id: &str, status: OrderStatus) -> Result<(), StoreError> {
        if self.live {
            self.deps.store.update_order_status(order_id, status, Utc::now())?;
        }
        Ok(())
    }

    fn report_persist_failure(&self, context: &str, error: &StoreError) {
        tracing::error!(
            slug = %self.instrument.slug,
            context,
            error = %error,
            "Failed to persist order state"
        );
        self.deps.events.emit(&Event::PersistFailed {
            context: format!("{}:{}", self.instrument.slug, context),
            error: error.to_string(),
        });
    }

    fn publish(&self) {
        self.status_tx.send_replace(WorkerStatus {
            state: self.state,
            resting: self.resting.len(),
            unresolved_cancels: self.unresolved.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetConfig;
    use crate::execution::{Fill, OpenOrder, PaperExecutor};
    use crate::market::fixtures::market;
    use crate::orderbook::{BookError, OrderBook, PriceLevel};
    use crate::selection::ScoredMarket;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticBooks;

    #[async_trait]
    impl BookSource for StaticBooks {
        async fn fetch_book(&self, token_id: &str) -> Result<OrderBook, BookError> {
            Ok(OrderBook::from_levels(
                token_id,
                vec![PriceLevel { price: dec!(0.49), size: dec!(100) }],
                vec![PriceLevel { price: dec!(0.51), size: dec!(100) }],
                Utc::now(),
            ))
        }
    }

    struct RejectingExecutor;

    #[async_trait]
    impl OrderExecutor for RejectingExecutor {
        fn mode(&self) -> ExecutionMode {
            ExecutionMode::Paper
        }
        async fn place(&self, _order: &OrderRequest) -> Result<OrderId, ExecutionError> {
            Err(ExecutionError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            })
        }
        async fn cancel(&self, order_id: &str) -> Result<(), ExecutionError> {
            Err(ExecutionError::NotFound(order_id.to_string()))
        }
        async fn list_open(&self) -> Result<Vec<OpenOrder>, ExecutionError> {
            Ok(Vec::new())
        }
        async fn list_fills(&self) -> Result<Vec<Fill>, ExecutionError> {
            Ok(Vec::new())
        }
    }

    /// Live executor whose placements rest but never get confirmed
    #[derive(Clone, Default)]
    struct UnconfirmedExecutor {
        inner: PaperExecutor,
        place_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OrderExecutor for UnconfirmedExecutor {
        fn mode(&self) -> ExecutionMode {
            ExecutionMode::Live
        }
        async fn place(&self, order: &OrderRequest) -> Result<OrderId, ExecutionError> {
            self.place_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.place(order).await?;
            Err(ExecutionError::Unconfirmed("response body unreadable".to_string()))
        }
        async fn cancel(&self, order_id: &str) -> Result<(), ExecutionError> {
            self.inner.cancel(order_id).await
        }
        async fn list_open(&self) -> Result<Vec<OpenOrder>, ExecutionError> {
            self.inner.list_open().await
        }
        async fn list_fills(&self) -> Result<Vec<Fill>, ExecutionError> {
            self.inner.list_fills().await
        }
    }

    fn test_config() -> Arc<Config> {
        let mut config = Config::default();
        config.net = NetConfig {
            max_retries: 0,
            backoff_base_sec: 0.0,
            ..NetConfig::default()
        };
        Arc::new(config)
    }

    fn deps(executor: Arc<dyn OrderExecutor>, dir: &std::path::Path) -> WorkerDeps {
        WorkerDeps {
            config: test_config(),
            books: Arc::new(StaticBooks),
            executor,
            store: Arc::new(StateStore::open_in_memory().unwrap()),
            events: EventLog::open(dir).unwrap(),
        }
    }

    fn instrument(slug: &str) -> (MarketRecord, ActiveInstrumentState) {
        let record = market(slug);
        let scored = ScoredMarket {
            record: record.clone(),
            capital_estimate: dec!(165),
            per_market_cap: dec!(283),
            score: 10.0,
        };
        (record, ActiveInstrumentState::admit(&scored, Utc::now()))
    }

    async fn wait_for<F>(handle: &WorkerHandle, cond: F) -> WorkerStatus
    where
        F: Fn(&WorkerStatus) -> bool,
    {
        for _ in 0..200 {
            let status = handle.status();
            if cond(&status) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.status()
    }

    #[tokio::test]
    async fn test_worker_quotes_both_sides_then_cancels_on_evict() {
        let dir = tempfile::tempdir().unwrap();
        let paper = PaperExecutor::new();
        let deps = deps(Arc::new(paper.clone()), dir.path());
        let log_path = deps.events.path().to_path_buf();
        let (record, state) = instrument("alpha");

        let handle = spawn(deps, record, state);
        let status = wait_for(&handle, |s| s.resting == 4).await;
        assert_eq!(status.resting, 4);
        assert_eq!(status.state, WorkerState::Quoting);

        let open = paper.list_open().await.unwrap();
        assert_eq!(open.len(), 4);
        assert!(open.iter().any(|o| o.side == Side::Buy && o.price == dec!(0.47)));
        assert!(open.iter().any(|o| o.side == Side::Sell && o.price == dec!(0.53)));
        assert!(open.iter().all(|o| o.original_size == dec!(55)));

        let report = handle.stop(StopMode::Evict, Duration::from_secs(5)).await;
        assert!(report.is_clean());
        assert_eq!(report.succeeded, 4);
        assert!(paper.list_open().await.unwrap().is_empty());

        let log = std::fs::read_to_string(log_path).unwrap();
        assert!(log.contains("\"kind\":\"paper_heartbeat\""));
        assert!(log.contains("\"kind\":\"shutdown_cancel_attempt\""));
    }

    #[tokio::test]
    async fn test_paper_shutdown_leaves_orders() {
        let dir = tempfile::tempdir().unwrap();
        let paper = PaperExecutor::new();
        let (record, state) = instrument("beta");

        let handle = spawn(deps(Arc::new(paper.clone()), dir.path()), record, state);
        wait_for(&handle, |s| s.resting == 4).await;

        let report = handle.stop(StopMode::Shutdown, Duration::from_secs(5)).await;
        assert_eq!(report, StopReport::default());
        assert_eq!(paper.list_open().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_rejected_placement_pauses_worker() {
        let dir = tempfile::tempdir().unwrap();
        let deps = deps(Arc::new(RejectingExecutor), dir.path());
        let log_path = deps.events.path().to_path_buf();
        let (record, state) = instrument("gamma");

        let handle = spawn(deps, record, state);
        let status = wait_for(&handle, |s| matches!(s.state, WorkerState::Paused { .. })).await;
        assert!(matches!(status.state, WorkerState::Paused { .. }));
        assert_eq!(status.resting, 0);
        assert!(status.can_stop_cleanly());

        handle.stop(StopMode::Evict, Duration::from_secs(5)).await;
        let log = std::fs::read_to_string(log_path).unwrap();
        assert!(log.contains("\"kind\":\"instrument_paused\""));
    }

    #[tokio::test]
    async fn test_unconfirmed_placement_is_adopted_not_repeated() {
        let dir = tempfile::tempdir().unwrap();
        let executor = UnconfirmedExecutor::default();
        let mut config = Config::default();
        config.net = NetConfig {
            max_retries: 3,
            backoff_base_sec: 0.0,
            ..NetConfig::default()
        };
        let deps = WorkerDeps {
            config: Arc::new(config),
            ..deps(Arc::new(executor.clone()), dir.path())
        };
        let store = deps.store.clone();
        let (record, state) = instrument("delta");
        let condition_id = state.condition_id.clone();

        let handle = spawn(deps, record, state);
        let status = wait_for(&handle, |s| s.resting == 4).await;
        assert_eq!(status.resting, 4);
        assert_eq!(status.state, WorkerState::Quoting);

        // one placement per slot, none repeated
        assert_eq!(executor.place_calls.load(Ordering::SeqCst), 4);
        assert_eq!(executor.inner.list_open().await.unwrap().len(), 4);
        assert_eq!(store.live_orders(Some(&condition_id)).unwrap().len(), 4);

        let report = handle.stop(StopMode::Evict, Duration::from_secs(5)).await;
        assert!(report.is_clean());
        assert!(executor.inner.list_open().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_live_restart_adopts_persisted_orders() {
        let dir = tempfile::tempdir().unwrap();
        let venue = PaperExecutor::new();
        let executor = UnconfirmedExecutor {
            inner: venue.clone(),
            ..UnconfirmedExecutor::default()
        };
        let deps = deps(Arc::new(executor.clone()), dir.path());
        let (record, state) = instrument("epsilon");

        let first = spawn(deps.clone(), record.clone(), state.clone());
        wait_for(&first, |s| s.resting == 4).await;
        // a crash leaves the orders resting and persisted
        first.task.abort();
        let _ = first.task.await;
        assert_eq!(executor.place_calls.load(Ordering::SeqCst), 4);

        let second = spawn(deps, record, state);
        let status = wait_for(&second, |s| s.resting == 4).await;
        assert_eq!(status.resting, 4);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(executor.place_calls.load(Ordering::SeqCst), 4);
        assert_eq!(venue.list_open().await.unwrap().len(), 4);
        second.stop(StopMode::Evict, Duration::from_secs(5)).await;
    }
}
