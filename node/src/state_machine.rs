//! Block processing state machine.
//!
//! Drives the ledger through verification, application, revert and database
//! rollback, one operation at a time. Every outcome is reported as a
//! [`Dispatch`] token and published on the [`EventBus`]; the token alone
//! decides the next [`ChainState`].
//!
//! ```text
//!  Idle/Synced --begin_download--> Downloading --DOWNLOADED--> Verifying
//!  Verifying --> Accepting --ACCEPTED--> Synced
//!                Accepting --FAILURE--> Idle
//!  Idle/Synced --revert_tip--> Reverting --REVERTED--> Idle
//!  any --CORRUPTED--> RollingBack --SUCCESS--> Idle
//!                     RollingBack --FAILURE--> Corrupted (terminal)
//! ```

use crate::chain_event::{ChainEvent, EventBus};
use crate::config::{DatabaseRollbackConfig, NodeConfig};
use crate::metrics::NodeMetrics;
use crate::tracing_spans::{
    block_apply_span, block_revert_span, database_rollback_span, round_build_span,
};
use crate::NodeError;
use kestrel_consensus::{DposError, DposRoundEngine, RoundInfo};
use kestrel_ledger::{GenesisConfig, LedgerMutator, WalletLedger};
use kestrel_store::{Database, StateStore};
use kestrel_transactions::Block;
use kestrel_types::BlockId;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// The database rollback never rewinds below this height.
pub const GENESIS_FLOOR: u64 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChainState {
    Idle,
    Downloading,
    Verifying,
    Accepting,
    Reverting,
    RollingBack,
    /// Terminal: the database could not be restored.
    Corrupted,
    Synced,
}

impl ChainState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Accepting => "accepting",
            Self::Reverting => "reverting",
            Self::RollingBack => "rolling_back",
            Self::Corrupted => "corrupted",
            Self::Synced => "synced",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Corrupted)
    }

    /// State after `token` is dispatched from this state.
    pub fn next(self, token: Dispatch) -> ChainState {
        match (self, token) {
            (Self::Corrupted, _) => Self::Corrupted,
            (_, Dispatch::Accepted) => Self::Synced,
            (_, Dispatch::NoBlock) => Self::Synced,
            (_, Dispatch::Downloaded) => Self::Verifying,
            (_, Dispatch::Reverted) => Self::Idle,
            (_, Dispatch::Corrupted) => Self::RollingBack,
            (_, Dispatch::Success) => Self::Idle,
            (Self::RollingBack, Dispatch::Failure) => Self::Corrupted,
            (_, Dispatch::Failure) => Self::Idle,
        }
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome tokens consumed by the surrounding orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dispatch {
    Success,
    Failure,
    NoBlock,
    Downloaded,
    Accepted,
    Reverted,
    Corrupted,
}

impl Dispatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::NoBlock => "NOBLOCK",
            Self::Downloaded => "DOWNLOADED",
            Self::Accepted => "ACCEPTED",
            Self::Reverted => "REVERTED",
            Self::Corrupted => "CORRUPTED",
        }
    }
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct BlockchainMachine {
    state: ChainState,
    ledger: WalletLedger,
    mutator: LedgerMutator,
    rounds: DposRoundEngine,
    genesis: GenesisConfig,
    database: Arc<dyn Database + Send + Sync>,
    state_store: Arc<dyn StateStore + Send + Sync>,
    rollback: DatabaseRollbackConfig,
    events: EventBus,
    metrics: Arc<NodeMetrics>,
}

impl BlockchainMachine {
    pub fn new(
        config: &NodeConfig,
        database: Arc<dyn Database + Send + Sync>,
        state_store: Arc<dyn StateStore + Send + Sync>,
    ) -> Result<Self, NodeError> {
        let milestones = config.milestones()?;
        let mutator = LedgerMutator::new(milestones.clone(), config.exceptions()?);
        let mut ledger = WalletLedger::new();
        config.genesis.seed(&mut ledger);
        Ok(Self {
            state: ChainState::Idle,
            ledger,
            mutator,
            rounds: DposRoundEngine::new(milestones),
            genesis: config.genesis.clone(),
            database,
            state_store,
            rollback: config.database_rollback.clone(),
            events: EventBus::new(),
            metrics: Arc::new(NodeMetrics::new()),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<NodeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn ledger(&self) -> &WalletLedger {
        &self.ledger
    }

    pub fn mutator(&self) -> &LedgerMutator {
        &self.mutator
    }

    pub fn rounds(&self) -> &DposRoundEngine {
        &self.rounds
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Current tip as recorded in the state store.
    pub fn last_block(&self) -> Option<Block> {
        self.state_store.get_last_block()
    }

    /// Start fetching blocks from peers.
    pub fn begin_download(&mut self) -> Result<(), NodeError> {
        self.expect_state(&[ChainState::Idle, ChainState::Synced], "begin_download")?;
        self.state = ChainState::Downloading;
        Ok(())
    }

    /// Hand a downloaded batch to the machine and process it in order,
    /// stopping at the first block that is not accepted.
    ///
    /// Returns every token dispatched along the way.
    pub fn blocks_downloaded(&mut self, blocks: Vec<Block>) -> Result<Vec<Dispatch>, NodeError> {
        self.expect_state(&[ChainState::Downloading], "blocks_downloaded")?;
        if blocks.is_empty() {
            return Ok(vec![self.dispatch(ChainEvent::NoBlock)]);
        }

        let mut tokens = vec![self.dispatch(ChainEvent::BlocksDownloaded { count: blocks.len() })];
        for block in &blocks {
            let token = self.process_block(block)?;
            tokens.push(token);
            if token != Dispatch::Accepted {
                break;
            }
        }
        Ok(tokens)
    }

    /// Verify `block` against the tip, apply it to the ledger and persist it.
    pub fn process_block(&mut self, block: &Block) -> Result<Dispatch, NodeError> {
        self.expect_state(
            &[ChainState::Idle, ChainState::Synced, ChainState::Verifying],
            "process_block",
        )?;
        let _span = block_apply_span(block.height, &block.id.to_string()).entered();

        self.state = ChainState::Verifying;
        if let Err(reason) = self.verify_block(block) {
            return Ok(self.reject(block, reason));
        }

        self.state = ChainState::Accepting;
        let started = Instant::now();
        if let Err(err) = self.mutator.apply_block(&mut self.ledger, block) {
            if err.is_fatal() {
                return Ok(self.corrupted(format!("block {} unwind failed: {err}", block.height)));
            }
            self.state = ChainState::Reverting;
            return Ok(self.reject(block, err.to_string()));
        }

        if let Err(err) = self.database.save_block(block) {
            self.state = ChainState::Reverting;
            if let Err(undo) = self.mutator.undo_block(&mut self.ledger, block) {
                return Ok(self.corrupted(format!(
                    "block {} not persisted and could not be undone: {undo}",
                    block.height
                )));
            }
            return Ok(self.reject(block, format!("persisting failed: {err}")));
        }
        self.state_store.set_last_block(block);
        self.state_store.set_last_stored_block_height(block.height);

        self.metrics
            .block_apply_time_ms
            .observe(started.elapsed().as_secs_f64() * 1000.0);
        self.metrics.blocks_accepted.inc();
        self.metrics.chain_height.set(block.height as i64);
        self.metrics.wallet_count.set(self.ledger.len() as i64);

        if let Err(err) = self.advance_round(block.height) {
            error!(height = block.height, error = %err, "round build failed");
            self.state = ChainState::Idle;
            return Err(err.into());
        }

        debug!(height = block.height, transactions = block.transactions.len(), "block accepted");
        Ok(self.dispatch(ChainEvent::BlockAccepted {
            height: block.height,
            id: block.id.to_string(),
        }))
    }

    /// Undo the tip block and make its predecessor the tip.
    pub fn revert_tip(&mut self) -> Result<Dispatch, NodeError> {
        self.expect_state(&[ChainState::Idle, ChainState::Synced], "revert_tip")?;
        let tip = match self.state_store.get_last_block() {
            Some(tip) if !tip.is_genesis() => tip,
            _ => return Err(NodeError::InvalidBlock("no revertible tip".into())),
        };
        let _span = block_revert_span(tip.height, &tip.id.to_string()).entered();
        self.state = ChainState::Reverting;

        if let Err(err) = self.mutator.undo_block(&mut self.ledger, &tip) {
            return Ok(self.corrupted(format!("undo of block {} failed: {err}", tip.height)));
        }
        if let Err(err) = self.database.revert_block(&tip) {
            return Ok(self.corrupted(format!("database revert of block {} failed: {err}", tip.height)));
        }

        let previous = match self.previous_block(&tip) {
            Ok(previous) => previous,
            Err(reason) => return Ok(self.corrupted(reason)),
        };
        if previous.id != tip.previous_block {
            return Ok(self.corrupted(format!(
                "block {} links to {}, found {}",
                tip.height, tip.previous_block, previous.id
            )));
        }
        self.state_store.set_last_block(&previous);
        self.state_store.set_last_stored_block_height(previous.height);

        let closed_round = RoundInfo::is_new_round(tip.height + 1, self.rounds.milestones())?;
        if closed_round {
            if let Err(err) = self.rounds.revert_round(&mut self.ledger, tip.height) {
                error!(height = tip.height, error = %err, "round revert failed");
                self.state = ChainState::Idle;
                return Err(err.into());
            }
            self.record_round();
        }

        self.metrics.blocks_reverted.inc();
        self.metrics.chain_height.set(previous.height as i64);
        self.metrics.wallet_count.set(self.ledger.len() as i64);
        info!(from = tip.height, to = previous.height, "reverted tip");
        Ok(self.dispatch(ChainEvent::BlockReverted {
            height: previous.height,
            id: previous.id.to_string(),
        }))
    }

    /// Remove persisted blocks from the top until the database's own
    /// integrity check passes.
    ///
    /// Removes at most `steps` blocks per integrity check and at most
    /// `max_block_rewind` in total, and never rewinds below
    /// [`GENESIS_FLOOR`]. State-store setters run only on success.
    pub fn rollback_database(&mut self) -> Result<Dispatch, NodeError> {
        self.expect_state(
            &[ChainState::RollingBack, ChainState::Idle, ChainState::Synced],
            "rollback_database",
        )?;
        self.state = ChainState::RollingBack;
        let max_block_rewind = self.rollback.max_block_rewind;
        let steps = self.rollback.steps.max(1);

        let mut last = match self.database.get_last_block() {
            Ok(block) => block,
            Err(err) => {
                error!(error = %err, "cannot read last stored block");
                return Ok(self.rollback_failed(0, 0));
            }
        };
        let _span = database_rollback_span(last.height, max_block_rewind, steps).entered();

        let mut removed = 0u64;
        loop {
            let verified = match self.database.verify_blockchain() {
                Ok(verified) => verified,
                Err(err) => {
                    warn!(height = last.height, error = %err, "integrity check errored");
                    false
                }
            };
            info!(height = last.height, removed, verified, "rollback iteration");

            if verified {
                self.state_store.set_last_block(&last);
                self.state_store.set_last_stored_block_height(last.height);
                self.state_store.set_restored_database_integrity(true);
                self.metrics.rollbacks.inc();
                self.metrics.chain_height.set(last.height as i64);
                info!(height = last.height, removed, "database integrity restored");
                return Ok(self.dispatch(ChainEvent::RollbackSucceeded {
                    height: last.height,
                    removed,
                }));
            }
            if last.height <= GENESIS_FLOOR || removed >= max_block_rewind {
                return Ok(self.rollback_failed(last.height, removed));
            }

            let count = steps
                .min(max_block_rewind - removed)
                .min(last.height - GENESIS_FLOOR);
            if let Err(err) = self.database.remove_top_blocks(count) {
                error!(height = last.height, count, error = %err, "removing blocks failed");
                return Ok(self.rollback_failed(last.height, removed));
            }
            removed += count;
            last = match self.database.get_last_block() {
                Ok(block) => block,
                Err(err) => {
                    error!(error = %err, "cannot read last stored block");
                    return Ok(self.rollback_failed(0, removed));
                }
            };
        }
    }

    /// Rebuild the ledger from scratch by re-applying `blocks`, genesis
    /// first. Used once a database rollback has moved the stored tip.
    pub fn replay(&mut self, blocks: &[Block]) -> Result<(), NodeError> {
        self.expect_state(&[ChainState::Idle, ChainState::Synced], "replay")?;
        self.ledger.reset();
        self.genesis.seed(&mut self.ledger);
        self.rounds.reset();

        let mut previous = BlockId::ZERO;
        for (index, block) in blocks.iter().enumerate() {
            let expected = index as u64 + 1;
            if block.height != expected || block.previous_block != previous {
                self.state = ChainState::Idle;
                return Err(NodeError::InvalidBlock(format!(
                    "replay expected block {expected} on {previous}, got {} on {}",
                    block.height, block.previous_block
                )));
            }
            if let Err(err) = self.mutator.apply_block(&mut self.ledger, block) {
                error!(height = block.height, error = %err, "replay failed");
                self.state = ChainState::Idle;
                return Err(err.into());
            }
            self.advance_round(block.height)?;
            previous = block.id;
        }

        if let Some(tip) = blocks.last() {
            self.state_store.set_last_block(tip);
            self.metrics.chain_height.set(tip.height as i64);
        }
        self.metrics.wallet_count.set(self.ledger.len() as i64);
        info!(blocks = blocks.len(), wallets = self.ledger.len(), "ledger replayed");
        self.state = ChainState::Idle;
        Ok(())
    }

    fn verify_block(&self, block: &Block) -> Result<(), String> {
        match self.state_store.get_last_block() {
            Some(tip) => {
                if block.height != tip.height + 1 {
                    return Err(format!("expected height {}, got {}", tip.height + 1, block.height));
                }
                if block.previous_block != tip.id {
                    return Err(format!("does not follow tip {}", tip.id));
                }
            }
            None => {
                if !block.is_genesis() || !block.previous_block.is_zero() {
                    return Err("first block must be genesis".into());
                }
            }
        }
        if block.id != block.compute_id() {
            return Err("id does not match contents".into());
        }

        let milestone = self.mutator.milestones().get(block.height);
        if block.transactions.len() > milestone.max_transactions as usize {
            return Err(format!(
                "{} transactions exceed the limit of {}",
                block.transactions.len(),
                milestone.max_transactions
            ));
        }
        if !block.is_genesis() && block.reward != milestone.reward {
            return Err(format!("reward {} differs from {}", block.reward, milestone.reward));
        }
        if block.fee_sum() != Some(block.total_fee) {
            return Err(format!("total fee {} does not match transactions", block.total_fee));
        }
        Ok(())
    }

    /// Build the next round when `height` closes the current one.
    fn advance_round(&mut self, height: u64) -> Result<(), DposError> {
        let next = height + 1;
        if height == 1 || RoundInfo::is_new_round(next, self.rounds.milestones())? {
            let _span = round_build_span(next).entered();
            self.rounds.build_round(&mut self.ledger, next)?;
            self.record_round();
        }
        Ok(())
    }

    fn record_round(&self) {
        if let Some(round) = self.rounds.current_round() {
            self.metrics.current_round.set(round.info.round as i64);
        }
    }

    fn previous_block(&self, tip: &Block) -> Result<Block, String> {
        let cached = self
            .state_store
            .get_last_blocks(2)
            .into_iter()
            .find(|b| b.height + 1 == tip.height);
        if let Some(block) = cached {
            return Ok(block);
        }
        debug!(height = tip.height - 1, "previous block not cached, reading database");
        self.database
            .get_last_block()
            .map_err(|err| format!("cannot load block {}: {err}", tip.height - 1))
    }

    fn reject(&mut self, block: &Block, reason: String) -> Dispatch {
        warn!(height = block.height, id = %block.id, %reason, "block rejected");
        self.metrics.blocks_rejected.inc();
        self.dispatch(ChainEvent::BlockRejected {
            height: block.height,
            id: block.id.to_string(),
            reason,
        })
    }

    fn corrupted(&mut self, reason: String) -> Dispatch {
        error!(%reason, "corrupted chain");
        self.dispatch(ChainEvent::ChainCorrupted { reason })
    }

    fn rollback_failed(&mut self, height: u64, removed: u64) -> Dispatch {
        error!(height, removed, "database rollback failed");
        self.metrics.rollback_failures.inc();
        self.dispatch(ChainEvent::RollbackFailed { height, removed })
    }

    fn dispatch(&mut self, event: ChainEvent) -> Dispatch {
        let token = event.token();
        let from = self.state;
        self.state = from.next(token);
        debug!(%token, %from, to = %self.state, "dispatch");
        self.events.emit(&event);
        token
    }

    fn expect_state(&self, allowed: &[ChainState], event: &str) -> Result<(), NodeError> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(NodeError::InvalidTransition {
            state: self.state.to_string(),
            event: event.to_string(),
        })
    }
}
