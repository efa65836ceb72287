//! Quote command implementation

use crate::config::Config;
use crate::market::{GammaClient, GammaConfig, MarketSource};
use crate::orderbook::{BookSource, ClobBookClient, ClobConfig};
use crate::quote::{quote_from_book, ChurnPolicy};
use clap::Args;

#[derive(Args, Debug)]
pub struct QuoteArgs {
    /// Market slug to quote
    #[arg(long)]
    pub slug: String,
}

impl QuoteArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let client = GammaClient::with_config(GammaConfig::from_net(&config.net));
        let records = client.fetch_markets().await?;
        let market = records
            .into_iter()
            .find(|r| r.slug == self.slug)
            .ok_or_else(|| anyhow::anyhow!("Market not found: {}", self.slug))?;

        let books = ClobBookClient::with_config(ClobConfig::from_net(&config.net));
        let policy = ChurnPolicy::new(&market, &config.quote);
        println!(
            "{} min_size={} max_spread={}",
            market.slug, market.rewards_min_size, market.rewards_max_spread
        );

        for (outcome, token_id) in market.outcome_tokens() {
            let book = match books.fetch_book(&token_id).await {
                Ok(book) => book,
                Err(e) => {
                    println!("  {outcome}: book unavailable ({e})");
                    continue;
                }
            };

            let best =
                |p: Option<rust_decimal::Decimal>| p.map_or("-".to_string(), |p| p.to_string());
            print!(
                "  {outcome}: best_bid={} best_ask={}",
                best(book.best_bid()),
                best(book.best_ask())
            );

            match quote_from_book(&book, &market, &config.quote) {
                Some(target) => println!(
                    " mid={} bid={} ({}) ask={} ({}) size={} tick={}",
                    target.midpoint,
                    target.bid,
                    placeable(policy.is_placeable(target.bid, target.size, target.midpoint)),
                    target.ask,
                    placeable(policy.is_placeable(target.ask, target.size, target.midpoint)),
                    target.size,
                    target.tick_size
                ),
                None => println!(" mid=- (book too thin)"),
            }
        }

        Ok(())
    }
}

fn placeable(ok: bool) -> &'static str {
    if ok {
        "in band"
    } else {
        "not placeable"
    }
}
