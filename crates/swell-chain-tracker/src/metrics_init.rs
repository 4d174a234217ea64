//! Crate-specific metrics functionality.
//!
//! Registers metrics and lists constants used as metric names throughout
//! the crate.

use metrics::{
    counter,
    describe_counter,
    Unit,
};

/// Registers all metrics used by this crate.
pub fn register() {
    describe_counter!(
        CHAIN_EVENTS_PROCESSED,
        Unit::Count,
        "The number of chain events applied by the tracker"
    );
    describe_counter!(
        ROLLBACKS_ENTERED,
        Unit::Count,
        "The number of times the tracker left the normal status for a rollback"
    );
    describe_counter!(
        RESTARTS_REQUESTED,
        Unit::Count,
        "The number of re-sync requests surfaced to the supervisor"
    );
}

pub(crate) fn increment_chain_events_processed() {
    counter!(CHAIN_EVENTS_PROCESSED).increment(1);
}

pub(crate) fn increment_rollbacks_entered() {
    counter!(ROLLBACKS_ENTERED).increment(1);
}

pub(crate) fn increment_restarts_requested() {
    counter!(RESTARTS_REQUESTED).increment(1);
}

pub const CHAIN_EVENTS_PROCESSED: &str =
    concat!(env!("CARGO_CRATE_NAME"), "_chain_events_processed");

pub const ROLLBACKS_ENTERED: &str = concat!(env!("CARGO_CRATE_NAME"), "_rollbacks_entered");

pub const RESTARTS_REQUESTED: &str = concat!(env!("CARGO_CRATE_NAME"), "_restarts_requested");
