//! Prometheus metrics

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Instruments currently quoted
    ActiveInstruments,
    /// Markets passing the eligibility filter last cycle
    EligibleMarkets,
    /// Markets passing eligibility and capital feasibility last cycle
    FeasibleMarkets,
    /// Resting orders across all workers
    RestingOrders,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    OrdersPlaced,
    OrdersCancelled,
    OrderFailures,
    BookFailures,
    RotationsAccepted,
    RotationsRejected,
    SelectionCycles,
    DiscoveryFailures,
}

impl GaugeMetric {
    fn name(self) -> &'static str {
        match self {
            GaugeMetric::ActiveInstruments => "reward_maker_active_instruments",
            GaugeMetric::EligibleMarkets => "reward_maker_eligible_markets",
            GaugeMetric::FeasibleMarkets => "reward_maker_feasible_markets",
            GaugeMetric::RestingOrders => "reward_maker_resting_orders",
        }
    }
}

impl CounterMetric {
    fn name(self) -> &'static str {
        match self {
            CounterMetric::OrdersPlaced => "reward_maker_orders_placed_total",
            CounterMetric::OrdersCancelled => "reward_maker_orders_cancelled_total",
            CounterMetric::OrderFailures => "reward_maker_order_failures_total",
            CounterMetric::BookFailures => "reward_maker_book_failures_total",
            CounterMetric::RotationsAccepted => "reward_maker_rotations_accepted_total",
            CounterMetric::RotationsRejected => "reward_maker_rotations_rejected_total",
            CounterMetric::SelectionCycles => "reward_maker_selection_cycles_total",
            CounterMetric::DiscoveryFailures => "reward_maker_discovery_failures_total",
        }
    }
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}

/// Increment a counter by `n`
pub fn incr_counter(metric: CounterMetric, n: u64) {
    metrics::counter!(metric.name()).increment(n);
}
