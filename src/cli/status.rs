//! Status command implementation

use crate::config::Config;
use crate::store::StateStore;

/// Print the persisted active set, last rotation and tracked orders
pub fn show_status(config: &Config) -> anyhow::Result<()> {
    if !config.storage.db_path.exists() {
        println!("No state at {} (never run)", config.storage.db_path.display());
        return Ok(());
    }
    let store = StateStore::open(&config.storage.db_path)?;

    println!("reward-maker status");
    println!("  Mode: {}", store.get_state("mode")?.unwrap_or_else(|| "-".to_string()));
    println!("  Version: {}", store.get_state("version")?.unwrap_or_else(|| "-".to_string()));
    match store.last_rotation()? {
        Some(ts) => println!("  Last rotation: {}", ts.to_rfc3339()),
        None => println!("  Last rotation: never"),
    }

    let active = store.load_active()?;
    println!("  Active instruments: {}", active.len());
    for state in &active {
        println!(
            "    {} score_at_entry={:.4} entered_at={}",
            state.slug,
            state.score_at_entry,
            state.entered_at.to_rfc3339()
        );
    }

    let orders = store.live_orders(None)?;
    println!("  Open orders: {}", orders.len());
    for order in &orders {
        println!(
            "    {} {} {} @ {} x {} ({})",
            order.order_id,
            order.token_id,
            order.side,
            order.price,
            order.size,
            order.status.as_str()
        );
    }
    Ok(())
}
