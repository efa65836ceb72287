//! Discover command implementation

use crate::config::Config;
use crate::market::{GammaClient, GammaConfig};
use crate::selection::check;
use chrono::Utc;
use clap::Args;

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Number of markets to fetch
    #[arg(short, long, default_value_t = 20)]
    pub n: usize,
}

impl DiscoverArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let client = GammaClient::with_config(GammaConfig::from_net(&config.net));
        let records = client.fetch_first(self.n).await?;
        let now = Utc::now();

        println!("fetched {} markets", records.len());
        for r in &records {
            let eligibility = match check(r, &config.filter, now) {
                Ok(()) => "eligible",
                Err(reason) => reason.as_str(),
            };
            println!(
                "  {:<60} min_size={} max_spread={} vol24h={} {}",
                r.slug,
                r.rewards_min_size,
                r.rewards_max_spread,
                r.volume_24h.map_or("-".to_string(), |v| format!("{v:.0}")),
                eligibility
            );
        }
        Ok(())
    }
}
