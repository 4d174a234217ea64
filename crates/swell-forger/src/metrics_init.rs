//! Crate-specific metrics functionality.
//!
//! Registers metrics and lists constants used as metric names throughout
//! the crate.

use std::time::Duration;

use metrics::{
    counter,
    describe_counter,
    describe_histogram,
    histogram,
    Unit,
};

/// Registers all metrics used by this crate.
pub fn register() {
    describe_histogram!(
        FORGE_BLOCK_TIME,
        Unit::Milliseconds,
        "The time taken to assemble and sign a key block"
    );
    describe_histogram!(
        FORGE_MICROBLOCK_TIME,
        Unit::Milliseconds,
        "The time taken to assemble and sign a micro block and its total block"
    );
    describe_counter!(
        KEY_BLOCK_ATTEMPTS_FAILED,
        Unit::Count,
        "The number of key block generation attempts that failed a precondition or were \
         rejected by the coordinator"
    );
}

pub(crate) fn record_forge_block_time(elapsed: Duration) {
    histogram!(FORGE_BLOCK_TIME).record(elapsed.as_secs_f64() * 1_000.0);
}

pub(crate) fn record_forge_microblock_time(elapsed: Duration) {
    histogram!(FORGE_MICROBLOCK_TIME).record(elapsed.as_secs_f64() * 1_000.0);
}

pub(crate) fn increment_key_block_attempts_failed() {
    counter!(KEY_BLOCK_ATTEMPTS_FAILED).increment(1);
}

pub const FORGE_BLOCK_TIME: &str = concat!(env!("CARGO_CRATE_NAME"), "_forge_block_time");

pub const FORGE_MICROBLOCK_TIME: &str =
    concat!(env!("CARGO_CRATE_NAME"), "_forge_microblock_time");

pub const KEY_BLOCK_ATTEMPTS_FAILED: &str =
    concat!(env!("CARGO_CRATE_NAME"), "_key_block_attempts_failed");
