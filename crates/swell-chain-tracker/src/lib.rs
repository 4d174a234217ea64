//! The local view of the chain as consumed by the exchange integration.
//!
//! A pure transition function ([`transitions::apply`]) drives a
//! three-state machine over chain events: the chain extends normally,
//! is being rewritten after a rollback, or waits for authoritative
//! balances after a rewrite settled. [`ChainTracker`] serializes events
//! through that function and maintains the pessimistic portfolio index,
//! the readiness flag and the last-key-block-height watch for downstream
//! consumers.

pub mod config;
pub mod fork;
pub mod metrics_init;
pub mod portfolios;
pub mod status;
#[cfg(test)]
pub(crate) mod test_utils;
pub mod tracker;
pub mod transitions;

pub use config::{
    get as get_config,
    Config,
};
pub use portfolios::PessimisticPortfolios;
pub use status::{
    ChainEvent,
    LastBlockHeight,
    Status,
    StatusUpdate,
};
pub use tracker::{
    BalanceSource,
    Builder,
    ChainTracker,
    RestartOrShutdown,
};
