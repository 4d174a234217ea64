//! The micro block chain extending the most recently forged key block.
//!
//! One iteration per interval: pack unconfirmed transactions, rebuild the
//! carrier ("total") block with them appended, derive the micro block
//! linking the previous and the new total signatures, and submit it. A
//! rejected micro block keeps the previous carrier; the chain runs until
//! cancelled at a delay boundary.

use std::{
    sync::Arc,
    time::Instant,
};

use swell_core::block::{
    Block,
    MicroBlock,
    MAX_TRANSACTIONS_PER_MICROBLOCK,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
    instrument,
    warn,
};

use super::{
    cancellable_delay,
    Inner,
};
use crate::{
    metrics_init,
    traits::{
        CoordinatorError,
        KeyAccount,
        NetworkMessage,
    },
};

#[instrument(skip_all, fields(account = %account.address(), carrier = %accumulated.id()))]
pub(super) async fn run_micro_chain(
    inner: Arc<Inner>,
    account: Arc<dyn KeyAccount>,
    mut accumulated: Block,
    token: CancellationToken,
) {
    debug!("micro block chain started");
    loop {
        if cancellable_delay(&token, inner.settings.micro_block_interval).await {
            debug!("micro block chain cancelled");
            break;
        }
        match micro_iteration(&inner, &account, &accumulated).await {
            Ok(Some(total)) => accumulated = total,
            Ok(None) => {}
            Err(error) => {
                warn!(%error, "micro block rejected, keeping the current carrier block");
            }
        }
    }
}

async fn micro_iteration(
    inner: &Arc<Inner>,
    account: &Arc<dyn KeyAccount>,
    accumulated: &Block,
) -> Result<Option<Block>, CoordinatorError> {
    let connected = inner.channels.size();
    if connected < inner.settings.quorum {
        debug!(
            quorum = %format_args!("{connected}/{}", inner.settings.quorum),
            "quorum not available, holding the micro block back",
        );
        return Ok(None);
    }

    let unconfirmed = inner.utx.pack_unconfirmed(MAX_TRANSACTIONS_PER_MICROBLOCK);
    if unconfirmed.is_empty() {
        debug!("no unconfirmed transactions, skipping this interval");
        return Ok(None);
    }

    let started = Instant::now();
    let mut transactions = accumulated.transactions.clone();
    transactions.extend(unconfirmed.iter().cloned());
    let total = Block::new_signed(
        accumulated.version,
        accumulated.timestamp_ms,
        accumulated.reference,
        accumulated.consensus,
        transactions,
        account.public_key(),
        |payload| account.sign(payload),
    );
    let micro = MicroBlock::new_signed(
        account.public_key(),
        unconfirmed,
        accumulated.signature,
        total.signature,
        |payload| account.sign(payload),
    );
    metrics_init::record_forge_microblock_time(started.elapsed());

    inner.coordinator.process_micro_block(micro.clone()).await?;
    inner.channels.broadcast(NetworkMessage::MicroBlockInv {
        total: total.signature,
        prev: accumulated.signature,
    });
    info!(
        transactions = micro.transactions.len(),
        total = %total.signature,
        "micro block accepted and announced",
    );
    Ok(Some(total))
}
