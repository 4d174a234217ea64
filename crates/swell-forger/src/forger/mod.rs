//! The forging scheduler.
//!
//! [`Forger::schedule_mining`] swaps in a fresh set of per-account key
//! block tasks, cancelling all prior attempts and the running micro block
//! chain before the new tasks are published. Tasks cancel cooperatively:
//! a cancelled attempt never reaches its coordinator submission, while a
//! submission already in flight completes.

mod key_block;
mod micro_chain;

use std::{
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use swell_core::{
    block::Block,
    readiness::BlockchainReadiness,
};
use swell_eyre::eyre;
use tokio::{
    select,
    time::sleep,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use self::key_block::AttemptError;
use crate::{
    traits::{
        Coordinator,
        History,
        KeyAccount,
        PeerChannels,
        PosCalculator,
        StateReader,
        TimeSource,
        UtxPool,
        Wallet,
    },
    Config,
};

pub struct Builder {
    pub config: Config,
    pub history: Arc<dyn History>,
    pub state: Arc<dyn StateReader>,
    pub utx: Arc<dyn UtxPool>,
    pub wallet: Arc<dyn Wallet>,
    pub time: Arc<dyn TimeSource>,
    pub coordinator: Arc<dyn Coordinator>,
    pub channels: Arc<dyn PeerChannels>,
    pub pos: Arc<dyn PosCalculator>,
    pub readiness: BlockchainReadiness,
    pub shutdown_token: CancellationToken,
}

impl Builder {
    /// # Errors
    ///
    /// Returns an error if the configured micro block interval is zero;
    /// the micro block chain would busy-loop otherwise.
    pub fn build(self) -> eyre::Result<Forger> {
        let Self {
            config,
            history,
            state,
            utx,
            wallet,
            time,
            coordinator,
            channels,
            pos,
            readiness,
            shutdown_token,
        } = self;
        eyre::ensure!(
            config.micro_block_interval_ms > 0,
            "the micro block interval must not be zero",
        );
        let scheduled_attempts = Mutex::new(ScheduledAttempts {
            token: shutdown_token.child_token(),
        });
        Ok(Forger {
            inner: Arc::new(Inner {
                settings: Settings::from_config(&config),
                history,
                state,
                utx,
                wallet,
                time,
                coordinator,
                channels,
                pos,
                readiness,
                shutdown_token,
                scheduled_attempts,
                micro_chain: Mutex::new(SerialCancelable::default()),
            }),
        })
    }
}

pub struct Forger {
    inner: Arc<Inner>,
}

impl Forger {
    /// Cancels any outstanding block generation attempts and the running
    /// micro block chain, then spawns a generation task for every wallet
    /// account.
    pub fn schedule_mining(&self) {
        let accounts = self.inner.wallet.private_key_accounts();
        self.inner.micro_chain.lock().cancel();

        let token = self.inner.shutdown_token.child_token();
        {
            let mut attempts = self.inner.scheduled_attempts.lock();
            // Prior attempts must be fully cancelled before the new ones
            // become observable.
            attempts.token.cancel();
            attempts.token = token.clone();
        }

        for account in &accounts {
            tokio::spawn(key_block::run_generation_loop(
                self.inner.clone(),
                account.clone(),
                token.clone(),
            ));
        }
        info!(accounts = accounts.len(), "scheduled key block generation");
    }

    /// Stops all forging activity without touching the external shutdown
    /// token.
    pub fn cancel_mining(&self) {
        self.inner.scheduled_attempts.lock().token.cancel();
        self.inner.micro_chain.lock().cancel();
    }
}

/// Settings derived from the service [`Config`], with durations resolved.
pub(crate) struct Settings {
    pub(crate) quorum: usize,
    pub(crate) interval_after_last_block: Duration,
    pub(crate) minimal_block_generation_offset: Duration,
    pub(crate) max_transactions_in_key_block: usize,
    pub(crate) micro_block_interval: Duration,
    pub(crate) enable_microblocks_after_height: u32,
    pub(crate) average_block_delay: Duration,
}

impl Settings {
    fn from_config(config: &Config) -> Self {
        Self {
            quorum: config.quorum as usize,
            interval_after_last_block: Duration::from_millis(
                config.interval_after_last_block_then_generation_is_allowed_ms,
            ),
            minimal_block_generation_offset: Duration::from_millis(
                config.minimal_block_generation_offset_ms,
            ),
            max_transactions_in_key_block: config.max_transactions_in_key_block,
            micro_block_interval: Duration::from_millis(config.micro_block_interval_ms),
            enable_microblocks_after_height: config.enable_microblocks_after_height,
            average_block_delay: Duration::from_millis(config.average_block_delay_ms),
        }
    }
}

pub(crate) struct Inner {
    pub(crate) settings: Settings,
    pub(crate) history: Arc<dyn History>,
    pub(crate) state: Arc<dyn StateReader>,
    pub(crate) utx: Arc<dyn UtxPool>,
    pub(crate) wallet: Arc<dyn Wallet>,
    pub(crate) time: Arc<dyn TimeSource>,
    pub(crate) coordinator: Arc<dyn Coordinator>,
    pub(crate) channels: Arc<dyn PeerChannels>,
    pub(crate) pos: Arc<dyn PosCalculator>,
    pub(crate) readiness: BlockchainReadiness,
    pub(crate) shutdown_token: CancellationToken,
    scheduled_attempts: Mutex<ScheduledAttempts>,
    micro_chain: Mutex<SerialCancelable>,
}

impl Inner {
    /// Replaces the micro block chain with a new one extending
    /// `accumulated`, cancelling the prior chain first.
    pub(crate) fn start_micro_chain(
        self: &Arc<Self>,
        account: Arc<dyn KeyAccount>,
        accumulated: Block,
    ) {
        let token = self.shutdown_token.child_token();
        let mut chain = self.micro_chain.lock();
        chain.cancel();
        tokio::spawn(micro_chain::run_micro_chain(
            self.clone(),
            account,
            accumulated,
            token.clone(),
        ));
        chain.publish(token);
    }

    #[cfg(test)]
    pub(crate) fn micro_chain_is_running(&self) -> bool {
        self.micro_chain.lock().is_active()
    }
}

/// The composite of currently scheduled per-account attempts. Swapped as
/// a whole by `schedule_mining`.
struct ScheduledAttempts {
    token: CancellationToken,
}

/// At most one micro block chain may be active; publishing a new token
/// cancels the previous chain at its next delay boundary.
#[derive(Default)]
struct SerialCancelable {
    current: Option<CancellationToken>,
}

impl SerialCancelable {
    fn cancel(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
    }

    fn publish(&mut self, token: CancellationToken) {
        self.cancel();
        self.current = Some(token);
    }

    #[cfg(test)]
    fn is_active(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}

/// Sleeps for `duration`, returning `true` if the token was cancelled
/// before the time elapsed. The only suspension points of the forging
/// tasks are these delays.
pub(crate) async fn cancellable_delay(token: &CancellationToken, duration: Duration) -> bool {
    select! {
        biased;

        () = token.cancelled() => true,
        () = sleep(duration) => false,
    }
}
