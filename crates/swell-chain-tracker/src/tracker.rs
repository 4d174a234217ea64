//! The long-running consumer of chain events.
//!
//! Serializes every event through [`apply`](crate::transitions::apply),
//! forwards balance updates to subscribers, settles forged transactions
//! against the pessimistic index, and keeps the readiness flag and the
//! last-key-block-height watch up to date. Divergence reported by the
//! transition function is surfaced to the supervisor as a restart
//! request.

use std::{
    pin::pin,
    sync::Arc,
    time::Duration,
};

use swell_core::{
    balance::{
        BlockchainBalance,
        DiffIndex,
    },
    readiness::BlockchainReadiness,
};
use swell_eyre::eyre;
use tokio::{
    select,
    sync::{
        mpsc,
        watch,
    },
    time::{
        sleep,
        Sleep,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
    instrument,
    warn,
};

use crate::{
    metrics_init,
    portfolios::PessimisticPortfolios,
    status::{
        ChainEvent,
        LastBlockHeight,
        Status,
        StatusUpdate,
    },
    transitions,
    Config,
};

/// The authoritative balances for a set of `(address, asset)` keys.
///
/// Queried whenever a settled rollback leaves balances the new fork has
/// not re-observed; responses re-enter the tracker as
/// [`ChainEvent::DataReceived`].
#[async_trait::async_trait]
pub trait BalanceSource: Send + Sync {
    async fn balances(&self, index: DiffIndex) -> Result<BlockchainBalance, BalanceSourceError>;
}

#[derive(Debug, thiserror::Error)]
#[error("failed fetching balances from the source of truth")]
pub struct BalanceSourceError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

/// Exit value telling the supervisor whether to re-sync the chain.
#[derive(Debug, PartialEq, Eq)]
pub enum RestartOrShutdown {
    /// Re-sync the chain from the carried height, then run a new tracker.
    Restart { height: u32 },
    Shutdown,
}

impl std::fmt::Display for RestartOrShutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Restart {
                height,
            } => write!(f, "restarting from height {height}"),
            Self::Shutdown => f.write_str("shutting down"),
        }
    }
}

pub struct Builder {
    /// The status the tracker starts from, usually `Normal` with the fork
    /// the initial sync produced.
    pub initial_status: Status,
    pub events: mpsc::Receiver<ChainEvent>,
    pub balance_source: Arc<dyn BalanceSource>,
    pub portfolios: Arc<PessimisticPortfolios>,
    pub readiness: BlockchainReadiness,
    pub shutdown_token: CancellationToken,
    pub config: Config,
}

impl Builder {
    /// # Errors
    ///
    /// Returns an error if the configured balance update channel capacity
    /// is zero.
    pub fn build(self) -> eyre::Result<(ChainTracker, Handles)> {
        let Self {
            initial_status,
            events,
            balance_source,
            portfolios,
            readiness,
            shutdown_token,
            config,
        } = self;
        eyre::ensure!(
            config.event_channel_capacity > 0,
            "the balance update channel capacity must not be zero",
        );

        let (last_height_tx, last_height_rx) = watch::channel(initial_status.height_hint());
        let (balance_updates_tx, balance_updates_rx) =
            mpsc::channel(config.event_channel_capacity);
        let (data_tx, data_rx) = mpsc::channel(1);

        readiness.set(initial_status.is_normal());

        let tracker = ChainTracker {
            status: initial_status,
            events,
            data_tx,
            data_rx,
            balance_source,
            portfolios,
            readiness,
            last_height: last_height_tx,
            balance_updates: balance_updates_tx,
            resolve_timeout: Duration::from_millis(config.resolve_timeout_ms),
            shutdown_token,
            restart_height: None,
        };
        let handles = Handles {
            last_height: last_height_rx,
            balance_updates: balance_updates_rx,
        };
        Ok((tracker, handles))
    }
}

/// The subscriber-facing ends of the tracker's outputs.
pub struct Handles {
    pub last_height: watch::Receiver<u32>,
    pub balance_updates: mpsc::Receiver<BlockchainBalance>,
}

pub struct ChainTracker {
    status: Status,
    events: mpsc::Receiver<ChainEvent>,
    data_tx: mpsc::Sender<BlockchainBalance>,
    data_rx: mpsc::Receiver<BlockchainBalance>,
    balance_source: Arc<dyn BalanceSource>,
    portfolios: Arc<PessimisticPortfolios>,
    readiness: BlockchainReadiness,
    last_height: watch::Sender<u32>,
    balance_updates: mpsc::Sender<BlockchainBalance>,
    resolve_timeout: Duration,
    shutdown_token: CancellationToken,
    restart_height: Option<u32>,
}

impl ChainTracker {
    #[instrument(skip_all, err, ret(Display))]
    pub async fn run_until_stopped(mut self) -> eyre::Result<RestartOrShutdown> {
        info!(status = %self.status, "chain tracker is running");
        let mut resolve_timer = pin!(None::<Sleep>);
        if self.status.is_resolving() {
            resolve_timer.set(Some(sleep(self.resolve_timeout)));
        }

        loop {
            select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    return Ok(RestartOrShutdown::Shutdown);
                }

                () = async {
                    Option::as_pin_mut(resolve_timer.as_mut())
                        .expect("arm only enabled while the timer is set")
                        .await
                }, if resolve_timer.is_some() => {
                    warn!(
                        timeout = %humantime::format_duration(self.resolve_timeout),
                        "no authoritative balances arrived while resolving; forcing a re-sync",
                    );
                    metrics_init::increment_restarts_requested();
                    return Ok(RestartOrShutdown::Restart {
                        height: self.status.height_hint(),
                    });
                }

                Some(balances) = self.data_rx.recv() => {
                    self.handle_event(ChainEvent::DataReceived(balances)).await;
                }

                event = self.events.recv() => {
                    let Some(event) = event else {
                        info!("event channel closed, shutting down");
                        return Ok(RestartOrShutdown::Shutdown);
                    };
                    self.handle_event(event).await;
                }
            }

            if self.status.is_resolving() {
                if resolve_timer.is_none() {
                    resolve_timer.set(Some(sleep(self.resolve_timeout)));
                }
            } else {
                resolve_timer.set(None);
            }

            if let Some(height) = self.restart_height.take() {
                metrics_init::increment_restarts_requested();
                return Ok(RestartOrShutdown::Restart {
                    height,
                });
            }
        }
    }

    async fn handle_event(&mut self, event: ChainEvent) {
        metrics_init::increment_chain_events_processed();
        debug!(%event, "applying chain event");

        let confirmed_txs = match &event {
            ChainEvent::Appended(block) if block.is_key_block() => block.confirmed_txs.clone(),
            _ => Vec::new(),
        };
        let was_normal = self.status.is_normal();

        let previous = std::mem::replace(
            &mut self.status,
            Status::Normal {
                main_fork: crate::fork::Fork::empty(),
                current_height_hint: 0,
            },
        );
        let StatusUpdate {
            new_status,
            updated_balances,
            request_balances,
            updated_last_block_height,
        } = transitions::apply(previous, event);
        self.status = new_status;
        self.readiness.set(self.status.is_normal());
        if was_normal && !self.status.is_normal() {
            metrics_init::increment_rollbacks_entered();
        }

        if !confirmed_txs.is_empty() {
            self.portfolios.process_forged(&confirmed_txs);
        }

        if !updated_balances.is_empty()
            && self.balance_updates.send(updated_balances).await.is_err()
        {
            warn!("balance subscriber is gone, dropping balance update");
        }

        match updated_last_block_height {
            LastBlockHeight::NotChanged => {}
            LastBlockHeight::Updated(height) => {
                self.last_height.send_replace(height);
            }
            LastBlockHeight::RestartRequired(height) => {
                self.restart_height = Some(height);
            }
        }

        if !request_balances.is_empty() {
            self.spawn_balance_fetch(request_balances);
        }
    }

    /// Fetches authoritative balances off the event loop, retrying until
    /// the source answers or the tracker shuts down.
    fn spawn_balance_fetch(&self, index: DiffIndex) {
        let source = self.balance_source.clone();
        let data_tx = self.data_tx.clone();
        let token = self.shutdown_token.clone();
        tokio::spawn(async move {
            token
                .run_until_cancelled(async move {
                    loop {
                        match source.balances(index.clone()).await {
                            Ok(balances) => {
                                let _ = data_tx.send(balances).await;
                                break;
                            }
                            Err(error) => {
                                warn!(%error, "balance fetch failed, retrying");
                            }
                        }
                    }
                })
                .await;
        });
    }
}
