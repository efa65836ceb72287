//! One selection cycle: discover, rank, summarize

use crate::config::Config;
use crate::events::{ChosenMarket, Event, EventLog};
use crate::market::{DiscoveryError, MarketRecord, MarketSource};
use crate::selection::{rank_candidates, Ranking};
use crate::telemetry::{incr_counter, set_gauge, CounterMetric, GaugeMetric};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Fresh discovery snapshot plus its ranking
#[derive(Debug, Clone)]
pub struct SelectionCycle {
    pub ranking: Ranking,
    /// Every fetched record keyed by condition id
    pub records: HashMap<String, MarketRecord>,
}

/// Discover markets and rank them
///
/// A discovery failure is logged, counted and emitted as
/// `discovery_failed`; the caller keeps its current active set.
pub async fn run_selection_cycle(
    source: &dyn MarketSource,
    config: &Config,
    events: &EventLog,
    target: usize,
    now: DateTime<Utc>,
) -> Result<SelectionCycle, DiscoveryError> {
    incr_counter(CounterMetric::SelectionCycles, 1);

    let records = match source.fetch_markets().await {
        Ok(records) => records,
        Err(e) => {
            incr_counter(CounterMetric::DiscoveryFailures, 1);
            tracing::warn!(error = %e, "Discovery failed, keeping current active set");
            events.emit(&Event::DiscoveryFailed { reason: e.to_string() });
            return Err(e);
        }
    };

    let ranking = rank_candidates(&records, config, now);
    set_gauge(GaugeMetric::EligibleMarkets, ranking.eligible as f64);
    set_gauge(GaugeMetric::FeasibleMarkets, ranking.ranked.len() as f64);

    if let Err(e) = ranking.require(target) {
        tracing::warn!(error = %e, "Fewer feasible markets than target");
    }

    let chosen: Vec<ChosenMarket> = ranking
        .top(target)
        .iter()
        .map(|c| ChosenMarket {
            slug: c.record.slug.clone(),
            condition_id: c.record.condition_id.clone(),
            score: c.score,
            capital_estimate: c.capital_estimate,
        })
        .collect();

    tracing::info!(
        fetched = ranking.fetched,
        eligible = ranking.eligible,
        feasible = ranking.ranked.len(),
        chosen = chosen.len(),
        "Selection cycle complete"
    );
    events.emit(&Event::SelectTopN {
        fetched: ranking.fetched,
        eligible: ranking.eligible,
        feasible: ranking.ranked.len(),
        chosen,
    });

    let records = records.into_iter().map(|r| (r.condition_id.clone(), r)).collect();
    Ok(SelectionCycle { ranking, records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::fixtures::market;
    use async_trait::async_trait;

    struct FixedSource(Vec<MarketRecord>);

    #[async_trait]
    impl MarketSource for FixedSource {
        async fn fetch_markets(&self) -> Result<Vec<MarketRecord>, DiscoveryError> {
            Ok(self.0.clone())
        }
    }

    struct DownSource;

    #[async_trait]
    impl MarketSource for DownSource {
        async fn fetch_markets(&self) -> Result<Vec<MarketRecord>, DiscoveryError> {
            Err(DiscoveryError::Unavailable {
                attempts: 3,
                reason: "connection refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_cycle_ranks_and_logs_summary() {
        let dir = tempfile::tempdir().unwrap();
        let events = EventLog::open(dir.path()).unwrap();
        let mut closed = market("closed");
        closed.closed = true;
        let source = FixedSource(vec![market("a"), market("b"), closed]);

        let cycle = run_selection_cycle(&source, &Config::default(), &events, 3, Utc::now())
            .await
            .unwrap();
        assert_eq!(cycle.ranking.fetched, 3);
        assert_eq!(cycle.ranking.eligible, 2);
        assert_eq!(cycle.records.len(), 3);

        let log = std::fs::read_to_string(events.path()).unwrap();
        assert!(log.contains("\"kind\":\"select_top_n\""));
    }

    #[tokio::test]
    async fn test_discovery_failure_emits_event() {
        let dir = tempfile::tempdir().unwrap();
        let events = EventLog::open(dir.path()).unwrap();

        let result =
            run_selection_cycle(&DownSource, &Config::default(), &events, 3, Utc::now()).await;
        assert!(result.is_err());

        let log = std::fs::read_to_string(events.path()).unwrap();
        assert!(log.contains("\"kind\":\"discovery_failed\""));
    }
}
