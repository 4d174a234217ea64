//! The chain tracker configuration.

use figment::{
    providers::Env,
    Figment,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Reads the configuration from `SWELL_CHAIN_TRACKER_`-prefixed
/// environment variables.
///
/// # Errors
///
/// Returns an error if a required variable is missing or fails to parse.
pub fn get() -> Result<Config, figment::Error> {
    Config::from_environment("SWELL_CHAIN_TRACKER_")
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// log directive to use for telemetry.
    pub log: String,

    /// How long the tracker waits for authoritative balances while
    /// resolving before it forces a re-sync.
    pub resolve_timeout_ms: u64,

    /// Capacity of the subscriber-facing balance update channel.
    pub event_channel_capacity: usize,
}

impl Config {
    fn from_environment(envar_prefix: &str) -> Result<Config, figment::Error> {
        Figment::new()
            .merge(Env::prefixed("RUST_").split("_").only(&["log"]))
            .merge(Env::prefixed(envar_prefix))
            .extract()
    }
}
