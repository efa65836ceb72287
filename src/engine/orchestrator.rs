//! Orchestrator
//!
//! Owns the active instrument set and one worker per instrument. Runs the
//! selection cycle on `selector_interval_sec`, applies the rotation plan
//! and supervises workers until shutdown.

use super::cycle::{run_selection_cycle, SelectionCycle};
use super::worker::{self, StopMode, StopReport, WorkerDeps, WorkerHandle};
use super::EngineError;
use crate::config::{Config, ExecutionMode};
use crate::events::{Event, EventLog};
use crate::execution::{with_retries, ExecutionError, OrderExecutor, OrderId, OrderStatus};
use crate::market::{MarketRecord, MarketSource};
use crate::orderbook::BookSource;
use crate::rotation::{ActiveInstrumentState, RejectReason, Rejection, Rotation, RotationController};
use crate::selection::{check, ScoredMarket};
use crate::store::{StateStore, StoreError};
use crate::telemetry::{incr_counter, set_gauge, CounterMetric, GaugeMetric};
use chrono::Utc;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Collaborators injected into the orchestrator
#[derive(Clone)]
pub struct EngineDeps {
    pub config: Arc<Config>,
    pub source: Arc<dyn MarketSource>,
    pub books: Arc<dyn BookSource>,
    pub executor: Arc<dyn OrderExecutor>,
    pub store: Arc<StateStore>,
    pub events: EventLog,
}

/// Retired instrument whose orders could not all be cancelled yet
#[derive(Debug, Clone)]
struct Stranded {
    reason: String,
    orders: Vec<OrderId>,
}

pub struct Orchestrator {
    deps: EngineDeps,
    mode: ExecutionMode,
    target: usize,
    controller: RotationController,
    active: Vec<ActiveInstrumentState>,
    markets: HashMap<String, MarketRecord>,
    workers: HashMap<String, WorkerHandle>,
    stranded: HashMap<String, Stranded>,
    last_rotation: Option<chrono::DateTime<Utc>>,
}

impl Orchestrator {
    pub fn new(deps: EngineDeps) -> Self {
        let mode = deps.executor.mode();
        let target = deps.config.target_markets(mode);
        let controller = RotationController::new(&deps.config.rotation);
        Self {
            deps,
            mode,
            target,
            controller,
            active: Vec::new(),
            markets: HashMap::new(),
            workers: HashMap::new(),
            stranded: HashMap::new(),
            last_rotation: None,
        }
    }

    pub fn active(&self) -> &[ActiveInstrumentState] {
        &self.active
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Restore the active set and last rotation from the store
    pub fn rehydrate(&mut self) -> Result<(), EngineError> {
        let store = &self.deps.store;
        store.record_runtime(self.mode, env!("CARGO_PKG_VERSION"))?;
        self.active = store.load_active()?;
        self.last_rotation = store.last_rotation()?;

        tracing::info!(
            mode = self.mode.as_str(),
            target = self.target,
            active = self.active.len(),
            last_rotation = ?self.last_rotation,
            "Orchestrator rehydrated"
        );
        Ok(())
    }

    /// Run until `shutdown` flips to true, then stop every worker
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), EngineError> {
        self.rehydrate()?;

        let timing = &self.deps.config.timing;
        let mut selector = interval(Duration::from_secs(timing.selector_interval_sec.max(1)));
        selector.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut housekeeping = interval(Duration::from_secs(timing.loop_interval_sec.max(1)));
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut result = Ok(());
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = selector.tick() => {
                    if let Err(e) = self.selection_tick().await {
                        tracing::error!(error = %e, "Unrecoverable engine error, shutting down");
                        result = Err(e);
                        break;
                    }
                }
                _ = housekeeping.tick() => self.housekeeping(),
            }
        }

        let shutdown_result = self.shutdown().await;
        result.and(shutdown_result)
    }

    /// One selection cycle followed by retirement, fills and rotation
    pub async fn selection_tick(&mut self) -> Result<(), EngineError> {
        let now = Utc::now();
        let cycle = match run_selection_cycle(
            self.deps.source.as_ref(),
            &self.deps.config,
            &self.deps.events,
            self.target,
            now,
        )
        .await
        {
            Ok(cycle) => cycle,
            Err(_) => return Ok(()),
        };
        self.apply_cycle(cycle).await
    }

    async fn apply_cycle(&mut self, cycle: SelectionCycle) -> Result<(), EngineError> {
        let now = Utc::now();

        for (condition_id, record) in &cycle.records {
            self.markets.insert(condition_id.clone(), record.clone());
        }

        self.retry_stranded().await?;
        self.retire_ineligible(&cycle).await?;
        self.retire_over_capacity().await?;
        self.ensure_workers();

        let plan = {
            let workers = &self.workers;
            let stranded = &self.stranded;
            self.controller.evaluate(
                &cycle.ranking.ranked,
                &self.active,
                self.target,
                self.last_rotation,
                now,
                |incumbent| {
                    !stranded.contains_key(&incumbent.condition_id)
                        && workers
                            .get(&incumbent.condition_id)
                            .map_or(true, |w| w.status().can_stop_cleanly())
                },
            )
        };

        for candidate in &plan.fills {
            self.admit(candidate)?;
        }

        for rejection in plan.rejections {
            self.reject(rejection);
        }

        if let Some(rotation) = plan.rotation {
            self.rotate(rotation).await?;
        }

        self.housekeeping();
        Ok(())
    }

    /// Retry retirements that left orders behind on an earlier tick
    async fn retry_stranded(&mut self) -> Result<(), EngineError> {
        let pending: Vec<(String, String)> = self
            .stranded
            .iter()
            .map(|(id, s)| (id.clone(), s.reason.clone()))
            .collect();
        for (condition_id, reason) in pending {
            self.retire(&condition_id, &reason).await?;
        }
        Ok(())
    }

    /// Retire incumbents that vanished from discovery or turned ineligible
    async fn retire_ineligible(&mut self, cycle: &SelectionCycle) -> Result<(), EngineError> {
        let now = Utc::now();
        let mut retiring = Vec::new();
        for state in &self.active {
            if self.stranded.contains_key(&state.condition_id) {
                continue;
            }
            let reason = match cycle.records.get(&state.condition_id) {
                None => "not_listed".to_string(),
                Some(record) => match check(record, &self.deps.config.filter, now) {
                    Ok(()) => continue,
                    Err(reason) => reason.as_str().to_string(),
                },
            };
            retiring.push((state.condition_id.clone(), reason));
        }

        for (condition_id, reason) in retiring {
            self.retire(&condition_id, &reason).await?;
        }
        Ok(())
    }

    /// Drop the weakest incumbents when the target shrank below the active set
    async fn retire_over_capacity(&mut self) -> Result<(), EngineError> {
        let excess = self.active.len().saturating_sub(self.target);
        let needed = excess.saturating_sub(self.stranded.len());
        if needed == 0 {
            return Ok(());
        }
        let mut weakest_first: Vec<&ActiveInstrumentState> = self
            .active
            .iter()
            .filter(|s| !self.stranded.contains_key(&s.condition_id))
            .collect();
        weakest_first.sort_by(|a, b| a.score_at_entry.total_cmp(&b.score_at_entry));
        let extra: Vec<String> = weakest_first
            .iter()
            .take(needed)
            .map(|s| s.condition_id.clone())
            .collect();

        for condition_id in extra {
            self.retire(&condition_id, "over_capacity").await?;
        }
        Ok(())
    }

    /// Drop an instrument once every one of its orders is gone
    ///
    /// When cancels fail the instrument stays active without a worker and
    /// the retirement is retried on the next selection tick.
    async fn retire(&mut self, condition_id: &str, reason: &str) -> Result<(), EngineError> {
        let Some(slug) = self
            .active
            .iter()
            .find(|s| s.condition_id == condition_id)
            .map(|s| s.slug.clone())
        else {
            self.stranded.remove(condition_id);
            return Ok(());
        };

        let carried = self
            .stranded
            .remove(condition_id)
            .map(|s| s.orders)
            .unwrap_or_default();
        let report = self.evict(condition_id, carried).await?;
        if !report.is_clean() {
            tracing::warn!(
                %slug,
                reason,
                failed = ?report.failed,
                incomplete = report.incomplete,
                "Retirement deferred, orders still resting"
            );
            self.deps.events.emit(&Event::RetireDeferred {
                slug,
                condition_id: condition_id.to_string(),
                reason: reason.to_string(),
                failed_order_ids: report.failed.clone(),
            });
            self.stranded.insert(
                condition_id.to_string(),
                Stranded {
                    reason: reason.to_string(),
                    orders: report.failed,
                },
            );
            return Ok(());
        }

        self.persist("retire", |store| store.remove_active(condition_id))?;
        let Some(pos) = self.active.iter().position(|s| s.condition_id == condition_id) else {
            return Ok(());
        };
        let state = self.active.remove(pos);

        tracing::info!(slug = %state.slug, reason, "Instrument retired");
        self.deps.events.emit(&Event::InstrumentRetired {
            slug: state.slug,
            condition_id: state.condition_id,
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn admit(&mut self, candidate: &ScoredMarket) -> Result<(), EngineError> {
        let state = ActiveInstrumentState::admit(candidate, Utc::now());
        self.persist("admit", |store| store.upsert_active(&state))?;

        tracing::info!(slug = %state.slug, score = state.score_at_entry, "Instrument admitted");
        self.deps.events.emit(&Event::InstrumentAdmitted {
            slug: state.slug.clone(),
            condition_id: state.condition_id.clone(),
            score: state.score_at_entry,
        });

        self.spawn_worker(candidate.record.clone(), state.clone());
        self.active.push(state);
        Ok(())
    }

    fn reject(&self, rejection: Rejection) {
        incr_counter(CounterMetric::RotationsRejected, 1);
        tracing::debug!(
            candidate = %rejection.candidate,
            incumbent = %rejection.incumbent,
            reason = rejection.reason.as_str(),
            "Rotation rejected"
        );
        self.deps.events.emit(&Event::RotationRejected(rejection));
    }

    /// Tear the incumbent down first; only a clean teardown admits the newcomer
    async fn rotate(&mut self, rotation: Rotation) -> Result<(), EngineError> {
        let Rotation { evicted, admitted } = rotation;
        let now = Utc::now();

        let report = self.evict(&evicted.condition_id, Vec::new()).await?;
        if !report.is_clean() {
            tracing::warn!(
                evicted = %evicted.slug,
                failed = ?report.failed,
                "Incumbent teardown incomplete, rolling back rotation"
            );
            if let Some(record) = self.markets.get(&evicted.condition_id).cloned() {
                self.spawn_worker(record, evicted.clone());
            }
            self.reject(Rejection {
                candidate: admitted.record.slug.clone(),
                candidate_score: admitted.score,
                incumbent: evicted.slug.clone(),
                incumbent_entry_score: evicted.score_at_entry,
                reason: RejectReason::ShutdownSafety,
            });
            return Ok(());
        }

        let state = ActiveInstrumentState::admit(&admitted, now);
        self.persist("rotation", |store| {
            store.apply_rotation(&evicted.condition_id, &state, now)
        })?;

        self.active.retain(|s| s.condition_id != evicted.condition_id);
        self.last_rotation = Some(now);
        incr_counter(CounterMetric::RotationsAccepted, 1);

        tracing::info!(
            evicted = %evicted.slug,
            evicted_entry_score = evicted.score_at_entry,
            admitted = %state.slug,
            admitted_score = state.score_at_entry,
            "Rotation accepted"
        );
        self.deps.events.emit(&Event::RotationAccepted {
            evicted: evicted.slug.clone(),
            evicted_entry_score: evicted.score_at_entry,
            admitted: state.slug.clone(),
            admitted_score: state.score_at_entry,
        });
        self.deps.events.emit(&Event::InstrumentAdmitted {
            slug: state.slug.clone(),
            condition_id: state.condition_id.clone(),
            score: state.score_at_entry,
        });

        self.spawn_worker(admitted.record, state.clone());
        self.active.push(state);
        Ok(())
    }

    /// Stop the worker, then cancel whatever it could not
    ///
    /// In live mode the store accounts for every order the instrument placed,
    /// including those of a worker that never ran or was aborted.
    async fn evict(
        &mut self,
        condition_id: &str,
        carried: Vec<OrderId>,
    ) -> Result<StopReport, EngineError> {
        let mut report = match self.workers.remove(condition_id) {
            Some(handle) => handle.stop(StopMode::Evict, self.shutdown_timeout()).await,
            None => StopReport::default(),
        };

        let mut pending = carried;
        for order_id in report.failed.drain(..) {
            if !pending.contains(&order_id) {
                pending.push(order_id);
            }
        }
        if self.mode == ExecutionMode::Live {
            for order in self.persist("evict", |store| store.live_orders(Some(condition_id)))? {
                if !pending.contains(&order.order_id) {
                    pending.push(order.order_id);
                }
            }
            report.incomplete = false;
        }

        let (succeeded, failed) = self.cancel_orders(pending).await?;
        report.succeeded += succeeded;
        report.failed = failed;
        Ok(report)
    }

    /// Cancel orders no worker owns; returns the count cancelled and the failures
    async fn cancel_orders(
        &self,
        order_ids: Vec<OrderId>,
    ) -> Result<(usize, Vec<OrderId>), EngineError> {
        let executor = self.deps.executor.clone();
        let net = self.deps.config.net.clone();
        let mut succeeded = 0;
        let mut failed = Vec::new();

        for order_id in order_ids {
            match with_retries(&net, || executor.cancel(&order_id)).await {
                Ok(()) | Err(ExecutionError::NotFound(_)) => {
                    succeeded += 1;
                    incr_counter(CounterMetric::OrdersCancelled, 1);
                    if self.mode == ExecutionMode::Live {
                        self.persist("cancel", |store| {
                            store
                                .update_order_status(&order_id, OrderStatus::Canceled, Utc::now())
                                .map(|_| ())
                        })?;
                    }
                }
                Err(e) => {
                    incr_counter(CounterMetric::OrderFailures, 1);
                    tracing::error!(%order_id, error = %e, "Cancel of unowned order failed");
                    failed.push(order_id);
                }
            }
        }
        Ok((succeeded, failed))
    }

    /// Start workers for active instruments that have none, or whose task ended
    fn ensure_workers(&mut self) {
        let finished: Vec<String> = self
            .workers
            .iter()
            .filter(|(_, w)| w.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        for condition_id in finished {
            tracing::warn!(%condition_id, "Worker exited unexpectedly, restarting");
            self.workers.remove(&condition_id);
        }

        let missing: Vec<ActiveInstrumentState> = self
            .active
            .iter()
            .filter(|s| !self.workers.contains_key(&s.condition_id))
            .filter(|s| !self.stranded.contains_key(&s.condition_id))
            .cloned()
            .collect();
        for state in missing {
            match self.markets.get(&state.condition_id).cloned() {
                Some(record) => self.spawn_worker(record, state),
                None => {
                    tracing::debug!(slug = %state.slug, "No market record yet, worker deferred")
                }
            }
        }
    }

    fn spawn_worker(&mut self, record: MarketRecord, state: ActiveInstrumentState) {
        let deps = WorkerDeps {
            config: self.deps.config.clone(),
            books: self.deps.books.clone(),
            executor: self.deps.executor.clone(),
            store: self.deps.store.clone(),
            events: self.deps.events.clone(),
        };
        let condition_id = state.condition_id.clone();
        let handle = worker::spawn(deps, record, state);
        self.workers.insert(condition_id, handle);
    }

    fn housekeeping(&mut self) {
        self.ensure_workers();
        let resting: usize = self.workers.values().map(|w| w.status().resting).sum();
        set_gauge(GaugeMetric::ActiveInstruments, self.active.len() as f64);
        set_gauge(GaugeMetric::RestingOrders, resting as f64);
    }

    /// Stop every worker concurrently, each bounded by the shutdown timeout
    async fn shutdown(&mut self) -> Result<(), EngineError> {
        let timeout = self.shutdown_timeout();
        let handles: Vec<WorkerHandle> = self.workers.drain().map(|(_, w)| w).collect();
        tracing::info!(workers = handles.len(), "Stopping workers");

        let reports = join_all(handles.into_iter().map(|h| {
            let slug = h.slug.clone();
            async move { (slug, h.stop(StopMode::Shutdown, timeout).await) }
        }))
        .await;

        let mut failed = Vec::new();
        for (slug, report) in reports {
            if report.incomplete {
                failed.push(format!("{slug}:incomplete"));
            }
            failed.extend(report.failed.into_iter().map(|id| format!("{slug}:{id}")));
        }

        if self.mode == ExecutionMode::Live && self.deps.config.live.cancel_on_exit {
            let stranded: Vec<(String, Stranded)> = self.stranded.drain().collect();
            for (condition_id, entry) in stranded {
                let (_, left) = self.cancel_orders(entry.orders).await?;
                failed.extend(left.into_iter().map(|id| format!("{condition_id}:{id}")));
            }
        }

        if failed.is_empty() {
            tracing::info!("Shutdown complete");
            Ok(())
        } else {
            tracing::error!(failed = ?failed, "Shutdown left orders uncancelled");
            Err(EngineError::ShutdownCancelIncomplete { failed })
        }
    }

    fn persist<T, F>(&self, context: &str, op: F) -> Result<T, EngineError>
    where
        F: FnOnce(&StateStore) -> Result<T, StoreError>,
    {
        op(&self.deps.store).map_err(|e| {
            tracing::error!(context, error = %e, "Failed to persist engine state");
            self.deps.events.emit(&Event::PersistFailed {
                context: context.to_string(),
                error: e.to_string(),
            });
            EngineError::Persist(e)
        })
    }

    fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.deps.config.timing.shutdown_timeout_sec)
    }
}
