//! Select command implementation

use crate::config::{Config, ExecutionMode};
use crate::market::{GammaClient, GammaConfig, MarketSource};
use crate::selection::{rank_candidates, ScoredMarket};
use chrono::Utc;
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct SelectArgs {
    /// Write the chosen targets as JSON
    #[arg(long)]
    pub write: Option<PathBuf>,

    /// Number of markets to choose (defaults to capital.num_markets)
    #[arg(short, long)]
    pub n: Option<usize>,
}

/// Snapshot entry written by `--write`
#[derive(Debug, Serialize)]
struct TargetSnapshot<'a> {
    slug: &'a str,
    condition_id: &'a str,
    score: f64,
    capital_estimate: Decimal,
    per_market_cap: Decimal,
    rewards_min_size: Decimal,
    rewards_max_spread: Decimal,
    token_ids: &'a [String],
}

impl<'a> From<&'a ScoredMarket> for TargetSnapshot<'a> {
    fn from(m: &'a ScoredMarket) -> Self {
        Self {
            slug: &m.record.slug,
            condition_id: &m.record.condition_id,
            score: m.score,
            capital_estimate: m.capital_estimate,
            per_market_cap: m.per_market_cap,
            rewards_min_size: m.record.rewards_min_size,
            rewards_max_spread: m.record.rewards_max_spread,
            token_ids: &m.record.token_ids,
        }
    }
}

impl SelectArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let n = self.n.unwrap_or_else(|| config.target_markets(ExecutionMode::Paper));
        let client = GammaClient::with_config(GammaConfig::from_net(&config.net));
        let records = client.fetch_markets().await?;

        let ranking = rank_candidates(&records, config, Utc::now());
        println!(
            "fetched={} eligible={} feasible={}",
            ranking.fetched,
            ranking.eligible,
            ranking.ranked.len()
        );

        let chosen = match ranking.require(n) {
            Ok(chosen) => chosen,
            Err(e) => {
                tracing::warn!(error = %e, "Choosing every feasible market");
                ranking.top(n)
            }
        };

        for (rank, m) in chosen.iter().enumerate() {
            println!(
                "{:>2}. {:<60} score={:>8.4} capital={} min_size={} max_spread={}",
                rank + 1,
                m.record.slug,
                m.score,
                m.capital_estimate,
                m.record.rewards_min_size,
                m.record.rewards_max_spread
            );
        }

        if let Some(path) = &self.write {
            let snapshot: Vec<TargetSnapshot<'_>> =
                chosen.iter().map(TargetSnapshot::from).collect();
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
            tracing::info!(path = %path.display(), targets = snapshot.len(), "Targets written");
        }

        Ok(())
    }
}
