//! Configuration types for reward-maker
//!
//! A single validated [`Config`] is built once at startup and passed
//! explicitly to every component.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on any configured interval, cooldown or timeout (one year)
pub const MAX_DURATION_SEC: u64 = 365 * 24 * 60 * 60;

/// Upper bound on the expiry buffer
pub const MAX_END_DATE_BUFFER_DAYS: i64 = 3_650;

/// Upper bound on a single retry backoff
pub const MAX_BACKOFF_SEC: f64 = 3_600.0;

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is outside its allowed range
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
    /// A secret referenced by env-var name is missing
    #[error("environment variable not set: {0}")]
    MissingEnv(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capital: CapitalConfig,
    pub filter: FilterConfig,
    pub timing: TimingConfig,
    pub rotation: RotationConfig,
    pub quote: QuoteConfig,
    pub net: NetConfig,
    pub live: LiveConfig,
    pub storage: StorageConfig,
    pub telemetry: TelemetryConfig,
}

/// Capital allocation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CapitalConfig {
    /// Total capital across all instruments (USDC)
    pub total_cap_usdc: Decimal,
    /// Fraction of total capital that may be committed
    pub usable_cap_frac: Decimal,
    /// Number of instruments traded at once
    pub num_markets: usize,
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            total_cap_usdc: dec!(1000),
            usable_cap_frac: dec!(0.85),
            num_markets: 3,
        }
    }
}

/// Market eligibility filtering
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Reject markets flagged as restricted
    pub exclude_restricted: bool,
    /// Minimum days between now and market expiry
    pub end_date_buffer_days: i64,
    /// Minimum 24h CLOB volume
    pub min_volume24h: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            exclude_restricted: true,
            end_date_buffer_days: 7,
            min_volume24h: 500.0,
        }
    }
}

/// Loop cadences
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Seconds between selection/rotation cycles
    pub selector_interval_sec: u64,
    /// Seconds between worker quote cycles
    pub poll_interval_sec: u64,
    /// Seconds between orchestrator housekeeping ticks
    pub loop_interval_sec: u64,
    /// Upper bound on waiting for a worker to wind down
    pub shutdown_timeout_sec: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            selector_interval_sec: 900,
            poll_interval_sec: 5,
            loop_interval_sec: 5,
            shutdown_timeout_sec: 30,
        }
    }
}

/// Rotation hysteresis
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Global minimum spacing between displacements
    pub rotation_cooldown_sec: u64,
    /// Minimum time an incumbent stays active before it can be displaced
    pub min_tenure_sec: u64,
    /// Candidate score must reach incumbent entry score times this
    pub score_replace_multiplier: f64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            rotation_cooldown_sec: 43_200,
            min_tenure_sec: 21_600,
            score_replace_multiplier: 1.25,
        }
    }
}

/// Quoting and churn parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuoteConfig {
    /// Multiplier on the reward minimum size
    pub size_buffer: Decimal,
    /// Fraction of the reward max spread used as half-spread
    pub half_spread_frac: Decimal,
    /// Minimum price move, in ticks, that forces a replace
    pub update_min_ticks: u32,
    /// How long a worker stays paused after repeated order failures
    pub pause_sec: u64,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            size_buffer: dec!(1.1),
            half_spread_frac: dec!(0.85),
            update_min_ticks: 2,
            pause_sec: 600,
        }
    }
}

/// Network clients
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    pub request_timeout_sec: u64,
    pub max_retries: u32,
    pub backoff_base_sec: f64,
    pub backoff_max_sec: f64,
    pub gamma_url: String,
    pub clob_url: String,
    pub page_limit: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            request_timeout_sec: 20,
            max_retries: 5,
            backoff_base_sec: 0.5,
            backoff_max_sec: 10.0,
            gamma_url: crate::market::GAMMA_API_URL.to_string(),
            clob_url: crate::orderbook::CLOB_API_URL.to_string(),
            page_limit: 100,
        }
    }
}

impl NetConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }

    /// Backoff before retry `attempt` (1-based), capped at `backoff_max_sec`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 2f64.powi(attempt.min(30) as i32);
        let secs = (self.backoff_base_sec * exp).min(self.backoff_max_sec).max(0.0);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }
}

/// Live trading safety rails
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Live mode only via explicit `--live`; must stay true
    pub enabled_by_flag_only: bool,
    /// Instrument cap while live
    pub max_markets_live: usize,
    /// Cancel resting orders on process shutdown
    pub cancel_on_exit: bool,
    /// Order gateway base URL
    pub gateway_url: String,
    /// Name of the env var holding the gateway API key
    pub api_key_env: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            enabled_by_flag_only: true,
            max_markets_live: 1,
            cancel_on_exit: true,
            gateway_url: "http://127.0.0.1:8787".to_string(),
            api_key_env: "PM_API_KEY".to_string(),
        }
    }
}

impl LiveConfig {
    /// Resolve the gateway API key from the environment
    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.api_key_env)
            .map_err(|_| ConfigError::MissingEnv(self.api_key_env.clone()))
    }
}

/// Persistence locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub event_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/pm_mm.db"),
            event_dir: PathBuf::from("logs"),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
}

/// Execution mode: paper trading or live
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Paper,
    Live,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Paper => "paper",
            ExecutionMode::Live => "live",
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &'static str) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid { field, reason })
        }

        if self.capital.total_cap_usdc <= Decimal::ZERO {
            return invalid("capital.total_cap_usdc", "must be positive");
        }
        let usable = self.capital.usable_cap_frac;
        if usable <= Decimal::ZERO || usable > Decimal::ONE {
            return invalid("capital.usable_cap_frac", "must be in (0, 1]");
        }
        if self.capital.num_markets == 0 {
            return invalid("capital.num_markets", "must be positive");
        }
        if !(0..=MAX_END_DATE_BUFFER_DAYS).contains(&self.filter.end_date_buffer_days) {
            return invalid("filter.end_date_buffer_days", "must be in [0, 3650]");
        }
        if !(self.filter.min_volume24h >= 0.0 && self.filter.min_volume24h.is_finite()) {
            return invalid("filter.min_volume24h", "must be finite and non-negative");
        }

        let intervals = [
            ("timing.selector_interval_sec", self.timing.selector_interval_sec),
            ("timing.poll_interval_sec", self.timing.poll_interval_sec),
            ("timing.loop_interval_sec", self.timing.loop_interval_sec),
            ("timing.shutdown_timeout_sec", self.timing.shutdown_timeout_sec),
            ("net.request_timeout_sec", self.net.request_timeout_sec),
        ];
        for (field, value) in intervals {
            if value == 0 || value > MAX_DURATION_SEC {
                return invalid(field, "must be in [1, 31536000]");
            }
        }
        let spans = [
            ("rotation.rotation_cooldown_sec", self.rotation.rotation_cooldown_sec),
            ("rotation.min_tenure_sec", self.rotation.min_tenure_sec),
            ("quote.pause_sec", self.quote.pause_sec),
        ];
        for (field, value) in spans {
            if value > MAX_DURATION_SEC {
                return invalid(field, "must be at most 31536000");
            }
        }

        let multiplier = self.rotation.score_replace_multiplier;
        if !(multiplier >= 1.0 && multiplier.is_finite()) {
            return invalid("rotation.score_replace_multiplier", "must be finite and at least 1.0");
        }
        if self.quote.size_buffer <= Decimal::ZERO {
            return invalid("quote.size_buffer", "must be positive");
        }
        let half_spread = self.quote.half_spread_frac;
        if half_spread <= Decimal::ZERO || half_spread > Decimal::ONE {
            return invalid("quote.half_spread_frac", "must be in (0, 1]");
        }
        if self.quote.update_min_ticks == 0 {
            return invalid("quote.update_min_ticks", "must be positive");
        }
        for (field, value) in [
            ("net.backoff_base_sec", self.net.backoff_base_sec),
            ("net.backoff_max_sec", self.net.backoff_max_sec),
        ] {
            if !(0.0..=MAX_BACKOFF_SEC).contains(&value) {
                return invalid(field, "must be in [0, 3600]");
            }
        }
        if self.net.page_limit == 0 {
            return invalid("net.page_limit", "must be positive");
        }
        if !self.live.enabled_by_flag_only {
            return invalid("live.enabled_by_flag_only", "must be true");
        }
        if self.live.max_markets_live == 0 {
            return invalid("live.max_markets_live", "must be positive");
        }
        Ok(())
    }

    /// Instruments to run concurrently in the given mode
    pub fn target_markets(&self, mode: ExecutionMode) -> usize {
        match mode {
            ExecutionMode::Paper => self.capital.num_markets,
            ExecutionMode::Live => self.capital.num_markets.min(self.live.max_markets_live),
        }
    }

    /// Human-readable summary with secrets left out
    pub fn redacted_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Capital:");
        let _ = writeln!(out, "  total_cap_usdc: {}", self.capital.total_cap_usdc);
        let _ = writeln!(out, "  usable_cap_frac: {}", self.capital.usable_cap_frac);
        let _ = writeln!(out, "  num_markets: {}", self.capital.num_markets);
        let _ = writeln!(out, "Filter:");
        let _ = writeln!(out, "  exclude_restricted: {}", self.filter.exclude_restricted);
        let _ = writeln!(out, "  end_date_buffer_days: {}", self.filter.end_date_buffer_days);
        let _ = writeln!(out, "  min_volume24h: {}", self.filter.min_volume24h);
        let _ = writeln!(out, "Timing:");
        let _ = writeln!(out, "  selector_interval_sec: {}", self.timing.selector_interval_sec);
        let _ = writeln!(out, "  poll_interval_sec: {}", self.timing.poll_interval_sec);
        let _ = writeln!(out, "Rotation:");
        let _ = writeln!(out, "  rotation_cooldown_sec: {}", self.rotation.rotation_cooldown_sec);
        let _ = writeln!(out, "  min_tenure_sec: {}", self.rotation.min_tenure_sec);
        let _ = writeln!(
            out,
            "  score_replace_multiplier: {}",
            self.rotation.score_replace_multiplier
        );
        let _ = writeln!(out, "Quote:");
        let _ = writeln!(out, "  size_buffer: {}", self.quote.size_buffer);
        let _ = writeln!(out, "  half_spread_frac: {}", self.quote.half_spread_frac);
        let _ = writeln!(out, "  update_min_ticks: {}", self.quote.update_min_ticks);
        let _ = writeln!(out, "Net:");
        let _ = writeln!(out, "  request_timeout_sec: {}", self.net.request_timeout_sec);
        let _ = writeln!(out, "  max_retries: {}", self.net.max_retries);
        let _ = writeln!(out, "Live:");
        let _ = writeln!(out, "  max_markets_live: {}", self.live.max_markets_live);
        let _ = writeln!(out, "  cancel_on_exit: {}", self.live.cancel_on_exit);
        let _ = writeln!(out, "  gateway_url: {}", self.live.gateway_url);
        let _ = writeln!(out, "  api_key_env: {} (value redacted)", self.live.api_key_env);
        out
    }
}
