//! The per-account key block generation task.
//!
//! Each cycle re-derives the generation slot from the proof-of-stake
//! rules, sleeps until it opens, and attempts a forge. Failed attempts
//! are retried; the pacing of each retry comes from the recomputed slot,
//! floored at the minimal generation offset.

use std::{
    sync::Arc,
    time::{
        Duration,
        Instant,
    },
};

use swell_core::block::{
    Block,
    BlockVersion,
    ConsensusData,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
    instrument,
};

use super::{
    cancellable_delay,
    Inner,
};
use crate::{
    metrics_init,
    traits::{
        BalanceError,
        CoordinatorError,
        KeyAccount,
        NetworkMessage,
        PosError,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error(
        "chain is stale: the last block is {} old, generation is allowed within {} of it",
        humantime::format_duration(*age),
        humantime::format_duration(*allowed)
    )]
    ChainStale { age: Duration, allowed: Duration },
    #[error("could not compute the next block generation time")]
    PosCalculation { source: PosError },
    #[error("could not read the generating balance")]
    BalanceUnavailable { source: BalanceError },
    #[error("the local chain view is not in sync with the network")]
    ChainNotReady,
    #[error("Quorum not available ({connected}/{required}): not enough connected peers to forge")]
    QuorumUnavailable { connected: usize, required: usize },
    #[error("the generation hit {hit} did not beat the target {target}")]
    HitDidNotQualify { hit: u128, target: u128 },
    #[error("the coordinator rejected the forged block")]
    Rejected { source: CoordinatorError },
}

#[derive(Debug)]
pub(super) enum CycleOutcome {
    Forged,
    Cancelled,
}

#[instrument(skip_all, fields(account = %account.address()))]
pub(super) async fn run_generation_loop(
    inner: Arc<Inner>,
    account: Arc<dyn KeyAccount>,
    token: CancellationToken,
) {
    loop {
        match generation_cycle(&inner, &account, &token).await {
            Ok(CycleOutcome::Forged) => {
                debug!("key block accepted, generation task done");
                break;
            }
            Ok(CycleOutcome::Cancelled) => break,
            Err(error) => {
                debug!(%error, "key block attempt failed, retrying");
                metrics_init::increment_key_block_attempts_failed();
                if cancellable_delay(&token, inner.settings.minimal_block_generation_offset).await
                {
                    break;
                }
            }
        }
    }
}

async fn generation_cycle(
    inner: &Arc<Inner>,
    account: &Arc<dyn KeyAccount>,
    token: &CancellationToken,
) -> Result<CycleOutcome, AttemptError> {
    let settings = &inner.settings;

    let height = inner.history.height();
    let last_block = inner.history.last_block();
    let great_grandparent = inner.history.parent(&last_block, 2);
    let now = inner.time.corrected_time_ms();

    check_age(height, last_block.timestamp_ms, now, settings.interval_after_last_block)?;

    let generation_time = inner
        .pos
        .next_block_generation_time(height, &account.public_key())
        .map_err(|source| AttemptError::PosCalculation {
            source,
        })?;
    let offset = calc_offset(now, generation_time, settings.minimal_block_generation_offset);

    let balance = inner
        .state
        .generating_balance(&account.address(), height)
        .map_err(|source| AttemptError::BalanceUnavailable {
            source,
        })?;

    let version = if height > settings.enable_microblocks_after_height {
        BlockVersion::Ng
    } else {
        BlockVersion::Plain
    };

    debug!(
        delay = %humantime::format_duration(offset),
        "waiting for the generation slot to open",
    );
    if cancellable_delay(token, offset).await {
        return Ok(CycleOutcome::Cancelled);
    }

    // Micro blocks may have arrived during the delay; reread the parent.
    let parent = inner.history.last_block();
    let parent_height = inner.history.height();

    if !inner.readiness.get() {
        return Err(AttemptError::ChainNotReady);
    }

    let connected = inner.channels.size();
    if connected < settings.quorum {
        return Err(AttemptError::QuorumUnavailable {
            connected,
            required: settings.quorum,
        });
    }

    let now = inner.time.corrected_time_ms();
    let hit = inner.pos.calc_hit(&parent.consensus, &account.public_key());
    let target = inner.pos.calc_target(&parent, now, balance);
    if hit >= target {
        return Err(AttemptError::HitDidNotQualify {
            hit,
            target,
        });
    }

    let base_target = inner.pos.calc_base_target(
        settings.average_block_delay,
        parent_height,
        &parent,
        great_grandparent.as_ref(),
        now,
    );
    let generation_signature = inner
        .pos
        .calc_generator_signature(&parent.consensus, &account.public_key());
    let unconfirmed = inner.utx.pack_unconfirmed(settings.max_transactions_in_key_block);

    let started = Instant::now();
    let block = Block::new_signed(
        version,
        now,
        parent.id(),
        ConsensusData {
            base_target,
            generation_signature,
        },
        unconfirmed,
        account.public_key(),
        |payload| account.sign(payload),
    );
    metrics_init::record_forge_block_time(started.elapsed());

    info!(
        block = %block.id(),
        parent = %parent.id(),
        hit = %hit,
        target = %target,
        quorum = %format_args!("{connected}/{}", settings.quorum),
        "forged a key block, submitting to the coordinator",
    );

    // A cancellation observed before this point must prevent the
    // submission; once submitted the block is not recalled.
    if token.is_cancelled() {
        return Ok(CycleOutcome::Cancelled);
    }

    match inner.coordinator.process_key_block(block.clone(), true).await {
        Ok(score) => {
            inner
                .channels
                .broadcast(NetworkMessage::LocalScoreChanged(score));
            inner
                .channels
                .broadcast(NetworkMessage::BlockForged(Box::new(block.clone())));
            if version.supports_micro_blocks() {
                inner.start_micro_chain(account.clone(), block);
            }
            Ok(CycleOutcome::Forged)
        }
        Err(source) => Err(AttemptError::Rejected {
            source,
        }),
    }
}

fn check_age(
    height: u32,
    last_block_timestamp_ms: u64,
    now_ms: u64,
    allowed: Duration,
) -> Result<(), AttemptError> {
    if height == 1 {
        return Ok(());
    }
    let age = Duration::from_millis(now_ms.saturating_sub(last_block_timestamp_ms));
    if age <= allowed {
        Ok(())
    } else {
        Err(AttemptError::ChainStale {
            age,
            allowed,
        })
    }
}

/// The delay until the generation slot opens: the slot timestamp aligned
/// up to a whole second, floored at the minimal generation offset.
fn calc_offset(now_ms: u64, generation_time_ms: u64, minimal: Duration) -> Duration {
    let aligned_ms = generation_time_ms.div_ceil(1_000).saturating_mul(1_000);
    Duration::from_millis(aligned_ms.saturating_sub(now_ms)).max(minimal)
}
