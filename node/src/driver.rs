//! Async front end of the state machine.
//!
//! Callers on any task send [`ChainCommand`]s over a bounded channel; a single
//! driver task owns the [`BlockchainMachine`] and executes commands strictly
//! one at a time, replying through a oneshot channel. Ledger mutation is
//! therefore serial no matter how many producers there are.
//!
//! Commands reach the database, so each one runs on the blocking pool with
//! the machine moved in and handed back when it finishes.

use crate::state_machine::{BlockchainMachine, ChainState, Dispatch};
use crate::NodeError;
use kestrel_transactions::Block;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{self, JoinHandle};
use tracing::error;

/// Commands queued before senders wait for room.
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, NodeError>>;

/// One unit of work for the driver task.
pub enum ChainCommand {
    BeginDownload { reply: Reply<()> },
    BlocksDownloaded { blocks: Vec<Block>, reply: Reply<Vec<Dispatch>> },
    ProcessBlock { block: Block, reply: Reply<Dispatch> },
    RevertTip { reply: Reply<Dispatch> },
    RollbackDatabase { reply: Reply<Dispatch> },
    Replay { blocks: Vec<Block>, reply: Reply<()> },
    State { reply: oneshot::Sender<ChainState> },
}

/// Cloneable handle to a running driver task.
#[derive(Clone)]
pub struct ChainDriver {
    commands: mpsc::Sender<ChainCommand>,
}

impl ChainDriver {
    /// Move `machine` onto its own task. The task ends when every handle is
    /// dropped or `shutdown` fires, and hands the machine back. A dropped
    /// shutdown sender is not a shutdown.
    ///
    /// The machine is lost (`None`) only if the runtime shuts down under a
    /// running command; a panicking command panics the driver task.
    pub fn spawn(
        machine: BlockchainMachine,
        mut shutdown: broadcast::Receiver<()>,
    ) -> (Self, JoinHandle<Option<BlockchainMachine>>) {
        let (commands, mut rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let handle = tokio::spawn(async move {
            let mut machine = machine;
            let mut listening = true;
            loop {
                let command = tokio::select! {
                    biased;
                    signal = shutdown.recv(), if listening => match signal {
                        Err(broadcast::error::RecvError::Closed) => {
                            listening = false;
                            continue;
                        }
                        _ => {
                            tracing::info!("chain driver shutting down");
                            break;
                        }
                    },
                    command = rx.recv() => match command {
                        Some(command) => command,
                        None => break,
                    },
                };
                let running = task::spawn_blocking(move || {
                    execute(&mut machine, command);
                    machine
                });
                machine = match running.await {
                    Ok(machine) => machine,
                    Err(err) => match err.try_into_panic() {
                        Ok(payload) => std::panic::resume_unwind(payload),
                        Err(err) => {
                            error!(error = %err, "chain command cancelled, driver stopping");
                            return None;
                        }
                    },
                };
            }
            Some(machine)
        });
        (Self { commands }, handle)
    }

    pub async fn begin_download(&self) -> Result<(), NodeError> {
        self.request(|reply| ChainCommand::BeginDownload { reply }).await
    }

    pub async fn blocks_downloaded(&self, blocks: Vec<Block>) -> Result<Vec<Dispatch>, NodeError> {
        self.request(|reply| ChainCommand::BlocksDownloaded { blocks, reply }).await
    }

    pub async fn process_block(&self, block: Block) -> Result<Dispatch, NodeError> {
        self.request(|reply| ChainCommand::ProcessBlock { block, reply }).await
    }

    pub async fn revert_tip(&self) -> Result<Dispatch, NodeError> {
        self.request(|reply| ChainCommand::RevertTip { reply }).await
    }

    pub async fn rollback_database(&self) -> Result<Dispatch, NodeError> {
        self.request(|reply| ChainCommand::RollbackDatabase { reply }).await
    }

    pub async fn replay(&self, blocks: Vec<Block>) -> Result<(), NodeError> {
        self.request(|reply| ChainCommand::Replay { blocks, reply }).await
    }

    pub async fn state(&self) -> Result<ChainState, NodeError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(ChainCommand::State { reply })
            .await
            .map_err(|_| NodeError::DriverClosed)?;
        response.await.map_err(|_| NodeError::DriverClosed)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> ChainCommand,
    ) -> Result<T, NodeError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| NodeError::DriverClosed)?;
        response.await.map_err(|_| NodeError::DriverClosed)?
    }
}

fn execute(machine: &mut BlockchainMachine, command: ChainCommand) {
    // A dropped receiver only means the caller stopped waiting.
    match command {
        ChainCommand::BeginDownload { reply } => {
            let _ = reply.send(machine.begin_download());
        }
        ChainCommand::BlocksDownloaded { blocks, reply } => {
            let _ = reply.send(machine.blocks_downloaded(blocks));
        }
        ChainCommand::ProcessBlock { block, reply } => {
            let _ = reply.send(machine.process_block(&block));
        }
        ChainCommand::RevertTip { reply } => {
            let _ = reply.send(machine.revert_tip());
        }
        ChainCommand::RollbackDatabase { reply } => {
            let _ = reply.send(machine.rollback_database());
        }
        ChainCommand::Replay { blocks, reply } => {
            let _ = reply.send(machine.replay(&blocks));
        }
        ChainCommand::State { reply } => {
            let _ = reply.send(machine.state());
        }
    }
}
