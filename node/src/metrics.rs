//! Prometheus metrics for the Kestrel chain core.
//!
//! Exposes counters, gauges, and histograms covering block processing,
//! reverts, database rollback and candidate collation. The [`NodeMetrics`]
//! struct owns a dedicated [`Registry`] that an exporter can encode into the
//! Prometheus text exposition format via [`NodeMetrics::encode`].

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

/// Central collection of all chain-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Blocks applied and persisted.
    pub blocks_accepted: IntCounter,
    /// Blocks that failed verification or application.
    pub blocks_rejected: IntCounter,
    /// Tip blocks reverted.
    pub blocks_reverted: IntCounter,
    /// Database rollback runs that restored integrity.
    pub rollbacks: IntCounter,
    /// Database rollback runs that gave up.
    pub rollback_failures: IntCounter,
    /// Pool transactions evicted during collation.
    pub collator_evictions: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Height of the current tip.
    pub chain_height: IntGauge,
    /// Wallets in the ledger.
    pub wallet_count: IntGauge,
    /// Round currently being forged.
    pub current_round: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Time spent applying one block to the ledger, in milliseconds.
    pub block_apply_time_ms: Histogram,
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        // Counters
        let blocks_accepted = register_int_counter_with_registry!(
            Opts::new("kestrel_blocks_accepted_total", "Total blocks accepted"),
            registry
        )
        .expect("failed to register blocks_accepted counter");

        let blocks_rejected = register_int_counter_with_registry!(
            Opts::new("kestrel_blocks_rejected_total", "Total blocks rejected"),
            registry
        )
        .expect("failed to register blocks_rejected counter");

        let blocks_reverted = register_int_counter_with_registry!(
            Opts::new("kestrel_blocks_reverted_total", "Total tip blocks reverted"),
            registry
        )
        .expect("failed to register blocks_reverted counter");

        let rollbacks = register_int_counter_with_registry!(
            Opts::new(
                "kestrel_rollbacks_total",
                "Database rollbacks that restored integrity"
            ),
            registry
        )
        .expect("failed to register rollbacks counter");

        let rollback_failures = register_int_counter_with_registry!(
            Opts::new(
                "kestrel_rollback_failures_total",
                "Database rollbacks that failed to restore integrity"
            ),
            registry
        )
        .expect("failed to register rollback_failures counter");

        let collator_evictions = register_int_counter_with_registry!(
            Opts::new(
                "kestrel_collator_evictions_total",
                "Invalid pool transactions evicted during collation"
            ),
            registry
        )
        .expect("failed to register collator_evictions counter");

        // Gauges
        let chain_height = register_int_gauge_with_registry!(
            Opts::new("kestrel_chain_height", "Height of the chain tip"),
            registry
        )
        .expect("failed to register chain_height gauge");

        let wallet_count = register_int_gauge_with_registry!(
            Opts::new("kestrel_wallet_count", "Wallets in the ledger"),
            registry
        )
        .expect("failed to register wallet_count gauge");

        let current_round = register_int_gauge_with_registry!(
            Opts::new("kestrel_current_round", "Round currently being forged"),
            registry
        )
        .expect("failed to register current_round gauge");

        // Histograms: exponential buckets covering 0.1 ms to ~1.6 s.
        let block_apply_time_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "kestrel_block_apply_time_ms",
                "Block apply time in milliseconds"
            )
            .buckets(
                prometheus::exponential_buckets(0.1, 2.0, 15)
                    .expect("static bucket layout is valid")
            ),
            registry
        )
        .expect("failed to register block_apply_time_ms histogram");

        Self {
            registry,
            blocks_accepted,
            blocks_rejected,
            blocks_reverted,
            rollbacks,
            rollback_failures,
            collator_evictions,
            chain_height,
            wallet_count,
            current_round,
            block_apply_time_ms,
        }
    }

    /// Render every metric in the Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        if TextEncoder::new().encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
