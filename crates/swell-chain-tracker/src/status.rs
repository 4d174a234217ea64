//! The tracker's status and the update type produced by every applied
//! event.

use std::collections::VecDeque;

use swell_core::balance::{
    BlockchainBalance,
    DiffIndex,
};

use crate::fork::{
    BlockRef,
    ChainBlock,
    Fork,
};

/// An event observed from the chain or the balance source of truth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainEvent {
    Appended(ChainBlock),
    RolledBackTo(BlockRef),
    SyncFailed(u32),
    DataReceived(BlockchainBalance),
}

impl std::fmt::Display for ChainEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Appended(block) => write!(f, "appended {}", block.block_ref),
            Self::RolledBackTo(block_ref) => write!(f, "rolled back to {block_ref}"),
            Self::SyncFailed(height) => write!(f, "sync failed at height {height}"),
            Self::DataReceived(balances) => {
                write!(f, "data received for {} addresses", balances.iter().count())
            }
        }
    }
}

/// The tracker's authoritative view of the local chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// The main fork is extending normally.
    Normal {
        main_fork: Fork,
        current_height_hint: u32,
    },
    /// The chain is being rewritten: a new fork is growing while the
    /// balances touched by the abandoned one are remembered for
    /// re-request once the rewrite settles.
    TransientRollback {
        new_fork: Fork,
        new_fork_changes: BlockchainBalance,
        previous_fork_height: u32,
        previous_fork_diff_index: DiffIndex,
    },
    /// The rewrite has settled and authoritative balances were requested;
    /// chain events are stashed until they arrive.
    TransientResolving {
        main_fork: Fork,
        stash: VecDeque<ChainEvent>,
        current_height_hint: u32,
    },
}

impl Status {
    #[must_use]
    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Normal { .. })
    }

    #[must_use]
    pub fn is_resolving(&self) -> bool {
        matches!(self, Self::TransientResolving { .. })
    }

    /// The best known height of the main chain.
    #[must_use]
    pub fn height_hint(&self) -> u32 {
        match self {
            Self::Normal {
                current_height_hint, ..
            }
            | Self::TransientResolving {
                current_height_hint, ..
            } => *current_height_hint,
            Self::TransientRollback {
                previous_fork_height,
                ..
            } => *previous_fork_height,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal {
                main_fork,
                current_height_hint,
            } => write!(f, "normal at height {current_height_hint}, {main_fork}"),
            Self::TransientRollback {
                new_fork,
                previous_fork_height,
                ..
            } => write!(
                f,
                "rolling back from height {previous_fork_height}, {new_fork}"
            ),
            Self::TransientResolving {
                stash,
                current_height_hint,
                ..
            } => write!(
                f,
                "resolving balances at height {current_height_hint}, {} stashed events",
                stash.len()
            ),
        }
    }
}

/// The last-block-height indicator carried by a [`StatusUpdate`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LastBlockHeight {
    #[default]
    NotChanged,
    Updated(u32),
    /// The local view diverged; the supervisor must re-sync the chain
    /// from the carried height.
    RestartRequired(u32),
}

/// The outcome of applying one event to a status.
///
/// Updates form a monoid: [`StatusUpdate::combine`] keeps the newer
/// status, merges balances, unions requested indexes and keeps the newer
/// height indicator unless it reports no change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub new_status: Status,
    pub updated_balances: BlockchainBalance,
    pub request_balances: DiffIndex,
    pub updated_last_block_height: LastBlockHeight,
}

impl StatusUpdate {
    #[must_use]
    pub fn new(new_status: Status) -> Self {
        Self {
            new_status,
            updated_balances: BlockchainBalance::empty(),
            request_balances: DiffIndex::empty(),
            updated_last_block_height: LastBlockHeight::NotChanged,
        }
    }

    #[must_use]
    pub fn combine(self, next: Self) -> Self {
        Self {
            new_status: next.new_status,
            updated_balances: self.updated_balances.merge(next.updated_balances),
            request_balances: self.request_balances.union(next.request_balances),
            updated_last_block_height: match next.updated_last_block_height {
                LastBlockHeight::NotChanged => self.updated_last_block_height,
                changed => changed,
            },
        }
    }
}
