//! The pure transition function driving the tracker's status.
//!
//! `apply` is total: every `(Status, ChainEvent)` pair yields a
//! [`StatusUpdate`]. Unexpected combinations leave the status unchanged
//! and are only logged; divergence from the chain is reported through
//! [`LastBlockHeight::RestartRequired`] rather than an error path.

use std::collections::VecDeque;

use swell_core::balance::{
    BlockchainBalance,
    DiffIndex,
};
use tracing::{
    debug,
    warn,
};

use crate::{
    fork::Fork,
    status::{
        ChainEvent,
        LastBlockHeight,
        Status,
        StatusUpdate,
    },
};

#[must_use]
pub fn apply(status: Status, event: ChainEvent) -> StatusUpdate {
    match status {
        Status::Normal {
            main_fork,
            current_height_hint,
        } => apply_normal(main_fork, current_height_hint, event),
        Status::TransientRollback {
            new_fork,
            new_fork_changes,
            previous_fork_height,
            previous_fork_diff_index,
        } => apply_rollback(
            new_fork,
            new_fork_changes,
            previous_fork_height,
            previous_fork_diff_index,
            event,
        ),
        Status::TransientResolving {
            main_fork,
            stash,
            current_height_hint,
        } => apply_resolving(main_fork, stash, current_height_hint, event),
    }
}

fn apply_normal(main_fork: Fork, current_height_hint: u32, event: ChainEvent) -> StatusUpdate {
    match event {
        ChainEvent::Appended(block) => match main_fork.with_block(block.clone()) {
            Ok(updated_fork) => {
                let updated_last_block_height = if block.is_key_block() {
                    LastBlockHeight::Updated(block.height())
                } else {
                    LastBlockHeight::NotChanged
                };
                StatusUpdate {
                    new_status: Status::Normal {
                        main_fork: updated_fork,
                        current_height_hint: block.height(),
                    },
                    updated_balances: block.changes,
                    request_balances: DiffIndex::empty(),
                    updated_last_block_height,
                }
            }
            Err(error) => {
                warn!(
                    %error,
                    block = %block.block_ref,
                    "appended block does not extend the main fork, forcing a rollback",
                );
                forced_rollback(main_fork, current_height_hint)
            }
        },
        ChainEvent::RolledBackTo(block_ref) => {
            let previous_fork_height = current_height_hint;
            let (new_fork, dropped) = main_fork.drop_after(block_ref);
            StatusUpdate::new(Status::TransientRollback {
                new_fork,
                new_fork_changes: BlockchainBalance::empty(),
                previous_fork_height,
                previous_fork_diff_index: dropped.diff_index(),
            })
        }
        ChainEvent::SyncFailed(height) => {
            let previous_fork_height = current_height_hint;
            let (new_fork, dropped) = main_fork.drop_from(height);
            StatusUpdate::new(Status::TransientRollback {
                new_fork,
                new_fork_changes: BlockchainBalance::empty(),
                previous_fork_height,
                previous_fork_diff_index: dropped.diff_index(),
            })
        }
        event @ ChainEvent::DataReceived(_) => {
            debug!(%event, "unexpected event while the chain is normal, ignoring");
            StatusUpdate::new(Status::Normal {
                main_fork,
                current_height_hint,
            })
        }
    }
}

fn forced_rollback(main_fork: Fork, current_height_hint: u32) -> StatusUpdate {
    let previous_fork_diff_index = main_fork.diff_index();
    let (new_fork, _) = match main_fork.parent_of_tip() {
        Some(parent_ref) => main_fork.drop_after(parent_ref),
        None => main_fork.drop_all(),
    };
    StatusUpdate {
        updated_last_block_height: LastBlockHeight::RestartRequired(
            current_height_hint.saturating_sub(1),
        ),
        ..StatusUpdate::new(Status::TransientRollback {
            new_fork,
            new_fork_changes: BlockchainBalance::empty(),
            previous_fork_height: current_height_hint,
            previous_fork_diff_index,
        })
    }
}

fn apply_rollback(
    new_fork: Fork,
    new_fork_changes: BlockchainBalance,
    previous_fork_height: u32,
    previous_fork_diff_index: DiffIndex,
    event: ChainEvent,
) -> StatusUpdate {
    match event {
        ChainEvent::Appended(block) => match new_fork.with_block(block.clone()) {
            Ok(updated_fork) => {
                let accumulated = new_fork_changes.merge(block.changes.clone());
                if block.is_key_block() {
                    StatusUpdate::new(Status::TransientRollback {
                        new_fork: updated_fork,
                        new_fork_changes: accumulated,
                        previous_fork_height,
                        previous_fork_diff_index,
                    })
                } else {
                    // A micro block means the new fork has caught up to the
                    // tip: request every balance the old fork touched that
                    // the new one has not re-observed.
                    let request_balances =
                        previous_fork_diff_index.difference(&accumulated.diff_index());
                    StatusUpdate {
                        updated_balances: accumulated,
                        request_balances,
                        ..StatusUpdate::new(Status::TransientResolving {
                            main_fork: updated_fork,
                            stash: VecDeque::new(),
                            current_height_hint: block.height(),
                        })
                    }
                }
            }
            Err(error) => {
                warn!(
                    %error,
                    block = %block.block_ref,
                    "appended block does not extend the rollback fork, restarting the rewrite",
                );
                StatusUpdate {
                    updated_last_block_height: LastBlockHeight::RestartRequired(
                        previous_fork_height.saturating_sub(1).max(1),
                    ),
                    ..StatusUpdate::new(Status::TransientRollback {
                        new_fork: Fork::empty(),
                        new_fork_changes: BlockchainBalance::empty(),
                        previous_fork_height,
                        previous_fork_diff_index,
                    })
                }
            }
        },
        ChainEvent::RolledBackTo(block_ref) => {
            let (truncated, dropped) = new_fork.drop_after(block_ref);
            StatusUpdate::new(Status::TransientRollback {
                new_fork: truncated,
                new_fork_changes,
                previous_fork_height,
                previous_fork_diff_index: previous_fork_diff_index.union(dropped.diff_index()),
            })
        }
        ChainEvent::SyncFailed(height) => {
            let (truncated, dropped) = new_fork.drop_from(height);
            StatusUpdate::new(Status::TransientRollback {
                new_fork: truncated,
                new_fork_changes,
                previous_fork_height,
                previous_fork_diff_index: previous_fork_diff_index.union(dropped.diff_index()),
            })
        }
        event @ ChainEvent::DataReceived(_) => {
            debug!(%event, "unexpected event while rolling back, ignoring");
            StatusUpdate::new(Status::TransientRollback {
                new_fork,
                new_fork_changes,
                previous_fork_height,
                previous_fork_diff_index,
            })
        }
    }
}

fn apply_resolving(
    main_fork: Fork,
    mut stash: VecDeque<ChainEvent>,
    current_height_hint: u32,
    event: ChainEvent,
) -> StatusUpdate {
    match event {
        ChainEvent::DataReceived(balances) => {
            let seed = StatusUpdate {
                updated_balances: balances,
                ..StatusUpdate::new(Status::Normal {
                    main_fork,
                    current_height_hint,
                })
            };
            stash.into_iter().fold(seed, |update, stashed| {
                let next = apply(update.new_status.clone(), stashed);
                update.combine(next)
            })
        }
        other => {
            debug!(event = %other, "stashing event until authoritative balances arrive");
            stash.push_back(other);
            StatusUpdate::new(Status::TransientResolving {
                main_fork,
                stash,
                current_height_hint,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use swell_core::{
        balance::DiffIndex,
        primitive::{
            Address,
            Asset,
        },
    };

    use super::*;
    use crate::{
        fork::BlockRef,
        test_utils::{
            block_id,
            key_block,
            key_block_with_txs,
            micro_block,
        },
    };

    fn address(byte: u8) -> Address {
        Address::new([byte; 26])
    }

    fn normal(fork: Fork, hint: u32) -> Status {
        Status::Normal {
            main_fork: fork,
            current_height_hint: hint,
        }
    }

    #[test]
    fn normal_append_extends_the_fork_and_reports_the_height() {
        let genesis = key_block(1, 10, 0, &[]);
        let fork = Fork::empty().with_block(genesis).unwrap();
        let appended = key_block(2, 11, 10, &[(address(1), Asset::Native, 5)]);

        let update = apply(normal(fork, 1), ChainEvent::Appended(appended.clone()));

        match &update.new_status {
            Status::Normal {
                main_fork,
                current_height_hint,
            } => {
                assert_eq!(*current_height_hint, 2);
                assert_eq!(main_fork.last_block(), Some(&appended));
                assert_eq!(main_fork.len(), 2);
            }
            other => panic!("expected normal status, got {other}"),
        }
        assert_eq!(update.updated_balances.get(&address(1), &Asset::Native), 5);
        assert_eq!(
            update.updated_last_block_height,
            LastBlockHeight::Updated(2),
        );
        assert!(update.request_balances.is_empty());
    }

    #[test]
    fn normal_append_of_a_micro_block_does_not_advance_the_height_indicator() {
        let fork = Fork::empty().with_block(key_block(1, 10, 0, &[])).unwrap();
        let micro = micro_block(1, 11, 10, &[(address(1), Asset::Native, 1)]);

        let update = apply(normal(fork, 1), ChainEvent::Appended(micro));

        assert_eq!(
            update.updated_last_block_height,
            LastBlockHeight::NotChanged,
        );
        assert!(update.new_status.is_normal());
    }

    #[test]
    fn normal_append_with_a_bad_parent_forces_a_rollback() {
        let fork = Fork::empty()
            .with_block(key_block(1, 10, 0, &[]))
            .unwrap()
            .with_block(key_block(2, 11, 10, &[(address(1), Asset::Native, 3)]))
            .unwrap();
        let stranger = key_block(3, 12, 99, &[]);

        let update = apply(normal(fork, 2), ChainEvent::Appended(stranger));

        match &update.new_status {
            Status::TransientRollback {
                new_fork,
                new_fork_changes,
                previous_fork_height,
                previous_fork_diff_index,
            } => {
                assert_eq!(new_fork.len(), 1);
                assert_eq!(new_fork.height(), 1);
                assert!(new_fork_changes.is_empty());
                assert_eq!(*previous_fork_height, 2);
                assert!(previous_fork_diff_index.contains(&address(1), &Asset::Native));
            }
            other => panic!("expected rollback status, got {other}"),
        }
        assert_eq!(
            update.updated_last_block_height,
            LastBlockHeight::RestartRequired(1),
        );
    }

    #[test]
    fn normal_append_with_a_bad_parent_on_a_single_block_fork_drops_everything() {
        let fork = Fork::empty().with_block(key_block(1, 10, 0, &[])).unwrap();
        let stranger = key_block(2, 12, 99, &[]);

        let update = apply(normal(fork, 1), ChainEvent::Appended(stranger));

        match &update.new_status {
            Status::TransientRollback {
                new_fork, ..
            } => assert!(new_fork.is_empty()),
            other => panic!("expected rollback status, got {other}"),
        }
        assert_eq!(
            update.updated_last_block_height,
            LastBlockHeight::RestartRequired(0),
        );
    }

    #[test]
    fn normal_rollback_event_remembers_the_dropped_index() {
        let keep = key_block(1, 10, 0, &[]);
        let keep_ref = keep.block_ref;
        let fork = Fork::empty()
            .with_block(keep)
            .unwrap()
            .with_block(key_block(2, 11, 10, &[(address(2), Asset::Native, -4)]))
            .unwrap();

        let update = apply(normal(fork, 2), ChainEvent::RolledBackTo(keep_ref));

        match &update.new_status {
            Status::TransientRollback {
                new_fork,
                previous_fork_height,
                previous_fork_diff_index,
                ..
            } => {
                assert_eq!(new_fork.height(), 1);
                assert_eq!(*previous_fork_height, 2);
                assert!(previous_fork_diff_index.contains(&address(2), &Asset::Native));
            }
            other => panic!("expected rollback status, got {other}"),
        }
        assert!(update.updated_balances.is_empty());
    }

    #[test]
    fn micro_block_during_rollback_promotes_to_resolving() {
        let b0 = key_block(1, 10, 0, &[]);
        let rollback = Status::TransientRollback {
            new_fork: Fork::empty().with_block(b0).unwrap(),
            new_fork_changes: BlockchainBalance::empty(),
            previous_fork_height: 3,
            previous_fork_diff_index: DiffIndex::from(&BlockchainBalance::from_entries([(
                address(1),
                Asset::Native,
                1,
            )])),
        };
        let micro = micro_block(1, 11, 10, &[(address(1), Asset::Native, 2)]);

        let update = apply(rollback, ChainEvent::Appended(micro));

        match &update.new_status {
            Status::TransientResolving {
                main_fork,
                stash,
                current_height_hint,
            } => {
                assert_eq!(main_fork.len(), 2);
                assert!(stash.is_empty());
                assert_eq!(*current_height_hint, 1);
            }
            other => panic!("expected resolving status, got {other}"),
        }
        assert_eq!(update.updated_balances.get(&address(1), &Asset::Native), 2);
        assert!(update.request_balances.is_empty());
    }

    #[test]
    fn key_block_during_rollback_keeps_accumulating_silently() {
        let rollback = Status::TransientRollback {
            new_fork: Fork::empty().with_block(key_block(1, 10, 0, &[])).unwrap(),
            new_fork_changes: BlockchainBalance::from_entries([(address(1), Asset::Native, 1)]),
            previous_fork_height: 5,
            previous_fork_diff_index: DiffIndex::empty(),
        };
        let block = key_block(2, 11, 10, &[(address(1), Asset::Native, 2)]);

        let update = apply(rollback, ChainEvent::Appended(block));

        match &update.new_status {
            Status::TransientRollback {
                new_fork_changes, ..
            } => assert_eq!(new_fork_changes.get(&address(1), &Asset::Native), 3),
            other => panic!("expected rollback status, got {other}"),
        }
        assert!(update.updated_balances.is_empty());
        assert_eq!(
            update.updated_last_block_height,
            LastBlockHeight::NotChanged,
        );
    }

    #[test]
    fn resolving_requests_only_the_balances_the_new_fork_did_not_reobserve() {
        let stale_address = address(9);
        let rollback = Status::TransientRollback {
            new_fork: Fork::empty().with_block(key_block(1, 10, 0, &[])).unwrap(),
            new_fork_changes: BlockchainBalance::empty(),
            previous_fork_height: 3,
            previous_fork_diff_index: DiffIndex::from(&BlockchainBalance::from_entries([
                (address(1), Asset::Native, 1),
                (stale_address, Asset::Native, 1),
            ])),
        };
        let micro = micro_block(1, 11, 10, &[(address(1), Asset::Native, 2)]);

        let update = apply(rollback, ChainEvent::Appended(micro));

        assert_eq!(update.request_balances.len(), 1);
        assert!(update
            .request_balances
            .contains(&stale_address, &Asset::Native));
    }

    #[test]
    fn bad_parent_during_rollback_restarts_the_rewrite() {
        let previous_index = DiffIndex::from(&BlockchainBalance::from_entries([(
            address(1),
            Asset::Native,
            1,
        )]));
        let rollback = Status::TransientRollback {
            new_fork: Fork::empty().with_block(key_block(1, 10, 0, &[])).unwrap(),
            new_fork_changes: BlockchainBalance::from_entries([(address(2), Asset::Native, 7)]),
            previous_fork_height: 5,
            previous_fork_diff_index: previous_index.clone(),
        };
        let stranger = key_block(2, 12, 99, &[]);

        let update = apply(rollback, ChainEvent::Appended(stranger));

        match &update.new_status {
            Status::TransientRollback {
                new_fork,
                new_fork_changes,
                previous_fork_height,
                previous_fork_diff_index,
            } => {
                assert!(new_fork.is_empty());
                assert!(new_fork_changes.is_empty());
                assert_eq!(*previous_fork_height, 5);
                assert_eq!(previous_fork_diff_index, &previous_index);
            }
            other => panic!("expected rollback status, got {other}"),
        }
        assert_eq!(
            update.updated_last_block_height,
            LastBlockHeight::RestartRequired(4),
        );
    }

    #[test]
    fn restart_height_during_rollback_never_drops_below_one() {
        let rollback = Status::TransientRollback {
            new_fork: Fork::empty().with_block(key_block(1, 10, 0, &[])).unwrap(),
            new_fork_changes: BlockchainBalance::empty(),
            previous_fork_height: 1,
            previous_fork_diff_index: DiffIndex::empty(),
        };
        let stranger = key_block(2, 12, 99, &[]);

        let update = apply(rollback, ChainEvent::Appended(stranger));
        assert_eq!(
            update.updated_last_block_height,
            LastBlockHeight::RestartRequired(1),
        );
    }

    #[test]
    fn rollback_event_during_rollback_unions_the_dropped_index() {
        let keep = key_block(1, 10, 0, &[]);
        let keep_ref = keep.block_ref;
        let rollback = Status::TransientRollback {
            new_fork: Fork::empty()
                .with_block(keep)
                .unwrap()
                .with_block(key_block(2, 11, 10, &[(address(3), Asset::Native, 2)]))
                .unwrap(),
            new_fork_changes: BlockchainBalance::empty(),
            previous_fork_height: 4,
            previous_fork_diff_index: DiffIndex::from(&BlockchainBalance::from_entries([(
                address(1),
                Asset::Native,
                1,
            )])),
        };

        let update = apply(rollback, ChainEvent::RolledBackTo(keep_ref));

        match &update.new_status {
            Status::TransientRollback {
                new_fork,
                previous_fork_diff_index,
                ..
            } => {
                assert_eq!(new_fork.len(), 1);
                assert!(previous_fork_diff_index.contains(&address(1), &Asset::Native));
                assert!(previous_fork_diff_index.contains(&address(3), &Asset::Native));
            }
            other => panic!("expected rollback status, got {other}"),
        }
    }

    #[test]
    fn resolving_stashes_events_in_arrival_order() {
        let fork = Fork::empty().with_block(key_block(1, 10, 0, &[])).unwrap();
        let resolving = Status::TransientResolving {
            main_fork: fork,
            stash: VecDeque::new(),
            current_height_hint: 1,
        };

        let first = ChainEvent::Appended(key_block(2, 11, 10, &[]));
        let second = ChainEvent::Appended(key_block(3, 12, 11, &[]));

        let update = apply(resolving, first.clone());
        let update = apply(update.new_status, second.clone());

        match &update.new_status {
            Status::TransientResolving {
                stash, ..
            } => {
                assert_eq!(stash.len(), 2);
                assert_eq!(stash[0], first);
                assert_eq!(stash[1], second);
            }
            other => panic!("expected resolving status, got {other}"),
        }
        assert!(update.updated_balances.is_empty());
    }

    #[test]
    fn data_received_drains_the_stash_in_enqueue_order() {
        // The second stashed block references the first: replaying them out
        // of order could not extend the fork.
        let fork = Fork::empty().with_block(key_block(1, 10, 0, &[])).unwrap();
        let resolving = Status::TransientResolving {
            main_fork: fork,
            stash: VecDeque::from([
                ChainEvent::Appended(key_block(2, 11, 10, &[(address(1), Asset::Native, 2)])),
                ChainEvent::Appended(key_block(3, 12, 11, &[(address(1), Asset::Native, 3)])),
            ]),
            current_height_hint: 1,
        };
        let authoritative = BlockchainBalance::from_entries([(address(1), Asset::Native, 100)]);

        let update = apply(resolving, ChainEvent::DataReceived(authoritative));

        match &update.new_status {
            Status::Normal {
                main_fork,
                current_height_hint,
            } => {
                assert_eq!(main_fork.len(), 3);
                assert_eq!(*current_height_hint, 3);
            }
            other => panic!("expected normal status, got {other}"),
        }
        // 100 seeded + 2 + 3 replayed.
        assert_eq!(
            update.updated_balances.get(&address(1), &Asset::Native),
            105,
        );
        assert_eq!(
            update.updated_last_block_height,
            LastBlockHeight::Updated(3),
        );
    }

    #[test]
    fn data_received_replays_stashed_rollbacks() {
        let b0 = key_block(1, 10, 0, &[]);
        let b0_ref = b0.block_ref;
        let fork = Fork::empty()
            .with_block(b0)
            .unwrap()
            .with_block(key_block(2, 11, 10, &[(address(2), Asset::Native, 6)]))
            .unwrap();
        let resolving = Status::TransientResolving {
            main_fork: fork,
            stash: VecDeque::from([
                ChainEvent::Appended(key_block(3, 12, 11, &[])),
                ChainEvent::RolledBackTo(b0_ref),
            ]),
            current_height_hint: 10,
        };
        let authoritative = BlockchainBalance::from_entries([(address(1), Asset::Native, 50)]);

        let update = apply(resolving, ChainEvent::DataReceived(authoritative));

        // The stashed rollback wins: the final status is a rollback to b0
        // seeded with the authoritative balances.
        match &update.new_status {
            Status::TransientRollback {
                new_fork,
                previous_fork_height,
                ..
            } => {
                assert_eq!(new_fork.len(), 1);
                assert_eq!(*previous_fork_height, 3);
            }
            other => panic!("expected rollback status, got {other}"),
        }
        assert_eq!(update.updated_balances.get(&address(1), &Asset::Native), 50);
    }

    #[test]
    fn apply_is_total_over_all_status_event_shapes() {
        let fork = || Fork::empty().with_block(key_block(1, 10, 0, &[])).unwrap();
        let statuses = [
            normal(fork(), 1),
            Status::TransientRollback {
                new_fork: fork(),
                new_fork_changes: BlockchainBalance::empty(),
                previous_fork_height: 2,
                previous_fork_diff_index: DiffIndex::empty(),
            },
            Status::TransientResolving {
                main_fork: fork(),
                stash: VecDeque::new(),
                current_height_hint: 1,
            },
        ];
        let events = [
            ChainEvent::Appended(key_block_with_txs(2, 11, 10, &[], &[])),
            ChainEvent::Appended(micro_block(1, 13, 10, &[])),
            ChainEvent::Appended(key_block(9, 14, 42, &[])),
            ChainEvent::RolledBackTo(BlockRef {
                height: 1,
                id: block_id(10),
            }),
            ChainEvent::SyncFailed(1),
            ChainEvent::DataReceived(BlockchainBalance::empty()),
        ];

        for status in &statuses {
            for event in &events {
                let update = apply(status.clone(), event.clone());
                // Applying a follow-up event must also be defined.
                let _ = apply(update.new_status, ChainEvent::SyncFailed(1));
            }
        }
    }
}
