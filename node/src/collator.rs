//! Candidate transaction selection for the next forged block.

use crate::metrics::NodeMetrics;
use crate::tracing_spans::collation_span;
use crate::NodeError;
use kestrel_ledger::TransactionValidator;
use kestrel_store::TransactionPool;
use kestrel_transactions::Transaction;
use kestrel_types::Milestones;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pulls the highest-priority pool transactions that still apply to the
/// current ledger, within the milestone count limit and a byte budget.
pub struct CandidateCollator {
    pool: Arc<dyn TransactionPool + Send + Sync>,
    max_transaction_bytes: usize,
    metrics: Option<Arc<NodeMetrics>>,
}

impl CandidateCollator {
    pub fn new(pool: Arc<dyn TransactionPool + Send + Sync>, max_transaction_bytes: usize) -> Self {
        Self {
            pool,
            max_transaction_bytes,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<NodeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Candidates for the block after `last_height`, in pool priority order.
    ///
    /// Stops at the first transaction that would push the serialized total
    /// past the byte budget. A transaction failing validation is removed from
    /// the pool and skipped; it does not count against the budget. A failed
    /// eviction is logged and collation carries on.
    pub fn get_block_candidate_transactions(
        &self,
        milestones: &Milestones,
        last_height: u64,
        validator: &mut dyn TransactionValidator,
    ) -> Result<Vec<Transaction>, NodeError> {
        let height = last_height + 1;
        let max_transactions = milestones.get(height).max_transactions;
        let _span = collation_span(height, max_transactions).entered();

        self.pool.clean_up()?;
        let pending = self.pool.get_from_highest_priority(max_transactions as usize)?;

        let mut candidates = Vec::with_capacity(pending.len());
        let mut bytes = 0usize;
        for tx in pending {
            let size = tx.serialized_len();
            if bytes.saturating_add(size) > self.max_transaction_bytes {
                debug!(
                    bytes,
                    size,
                    budget = self.max_transaction_bytes,
                    "byte budget reached"
                );
                break;
            }
            if let Err(err) = validator.validate(&tx) {
                warn!(id = %tx.id, reason = %err, "evicting invalid pool transaction");
                match self.pool.remove_transaction(&tx) {
                    Ok(()) => {
                        if let Some(metrics) = &self.metrics {
                            metrics.collator_evictions.inc();
                        }
                    }
                    Err(err) => warn!(id = %tx.id, error = %err, "pool eviction failed"),
                }
                continue;
            }
            bytes += size;
            candidates.push(tx);
        }

        debug!(count = candidates.len(), bytes, "collated candidates");
        Ok(candidates)
    }
}
