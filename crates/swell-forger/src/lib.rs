//! The block forger: decides when the node may forge, assembles key
//! blocks from unconfirmed transactions, and keeps extending the most
//! recent one with micro blocks until superseded or cancelled.
//!
//! The forger owns no chain state of its own; everything it needs is
//! behind the collaborator traits in [`traits`]. Scheduling is
//! cooperative: per-account generation tasks and the single micro block
//! chain suspend only at delay boundaries and cancel there.

pub mod config;
pub mod forger;
pub mod metrics_init;
#[cfg(test)]
pub(crate) mod test_utils;
pub mod traits;

pub use config::{
    get as get_config,
    Config,
};
pub use forger::{
    AttemptError,
    Builder,
    Forger,
};
