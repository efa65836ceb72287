//! Run command implementation

use crate::config::Config;
use crate::engine::{EngineDeps, Orchestrator};
use crate::events::EventLog;
use crate::execution::{GatewayConfig, GatewayExecutor, OrderExecutor, PaperExecutor};
use crate::market::{GammaClient, GammaConfig};
use crate::orderbook::{ClobBookClient, ClobConfig};
use crate::store::StateStore;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Place real orders through the order gateway
    #[arg(long)]
    pub live: bool,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub seconds: Option<u64>,
}

impl RunArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let config = Arc::new(config);

        let executor: Arc<dyn OrderExecutor> = if self.live {
            let gateway = GatewayConfig::from_config(&config.live, &config.net)?;
            tracing::warn!(
                gateway = %gateway.base_url,
                max_markets = config.live.max_markets_live,
                "LIVE mode: real orders will be placed"
            );
            Arc::new(GatewayExecutor::new(gateway))
        } else {
            Arc::new(PaperExecutor::new())
        };

        let store = Arc::new(StateStore::open(&config.storage.db_path)?);
        let events = EventLog::open(&config.storage.event_dir)?;
        tracing::info!(
            db = %config.storage.db_path.display(),
            events = %events.path().display(),
            "State and event log opened"
        );

        let deps = EngineDeps {
            config: config.clone(),
            source: Arc::new(GammaClient::with_config(GammaConfig::from_net(&config.net))),
            books: Arc::new(ClobBookClient::with_config(ClobConfig::from_net(&config.net))),
            executor,
            store,
            events,
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let seconds = self.seconds;
        tokio::spawn(async move {
            match seconds {
                Some(secs) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                            tracing::info!(seconds = secs, "Run duration elapsed");
                        }
                    }
                }
                None => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
            tracing::info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        });

        Orchestrator::new(deps).run(shutdown_rx).await?;
        Ok(())
    }
}
