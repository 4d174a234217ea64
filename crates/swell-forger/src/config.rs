//! The forger configuration.

use figment::{
    providers::Env,
    Figment,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Reads the configuration from `SWELL_FORGER_`-prefixed environment
/// variables.
///
/// # Errors
///
/// Returns an error if a required variable is missing or fails to parse.
pub fn get() -> Result<Config, figment::Error> {
    Config::from_environment("SWELL_FORGER_")
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Minimum number of connected peers required before the node forges.
    pub quorum: u32,

    /// How far behind the last block may be before generation on top of
    /// it is refused.
    pub interval_after_last_block_then_generation_is_allowed_ms: u64,

    /// Floor on the delay before a generation attempt.
    pub minimal_block_generation_offset_ms: u64,

    /// How many unconfirmed transactions a key block may carry.
    pub max_transactions_in_key_block: usize,

    /// Cadence of micro block attempts.
    pub micro_block_interval_ms: u64,

    /// Heights strictly above this threshold forge Ng blocks which may be
    /// extended with micro blocks.
    pub enable_microblocks_after_height: u32,

    /// Consensus parameter for the base target calculation.
    pub average_block_delay_ms: u64,

    /// log directive to use for telemetry.
    pub log: String,
}

impl Config {
    fn from_environment(envar_prefix: &str) -> Result<Config, figment::Error> {
        Figment::new()
            .merge(Env::prefixed("RUST_").split("_").only(&["log"]))
            .merge(Env::prefixed(envar_prefix))
            .extract()
    }
}
