//! The collaborator contracts the forger consumes.
//!
//! Chain storage, the unconfirmed pool, wallet key material, network
//! channels, the block coordinator and the proof-of-stake math all live
//! elsewhere in the node; the forger only relies on the interfaces below.

use std::{
    sync::Arc,
    time::Duration,
};

use swell_core::{
    block::{
        Block,
        ConsensusData,
        MicroBlock,
        Transaction,
    },
    primitive::{
        Address,
        PublicKey,
        Score,
        Signature,
    },
};

/// Read access to the locally stored chain.
pub trait History: Send + Sync {
    fn height(&self) -> u32;
    fn last_block(&self) -> Block;
    /// The ancestor of `block` at the given depth, if the chain is long
    /// enough.
    fn parent(&self, block: &Block, depth: u32) -> Option<Block>;
    fn last_block_timestamp(&self) -> Option<u64>;
}

pub trait StateReader: Send + Sync {
    /// The balance `account` generates with at `height`, after maturity
    /// and lease adjustments.
    fn generating_balance(&self, account: &Address, height: u32) -> Result<u64, BalanceError>;
}

pub trait UtxPool: Send + Sync {
    /// Packs up to `limit` unconfirmed transactions, most profitable
    /// first.
    fn pack_unconfirmed(&self, limit: usize) -> Vec<Transaction>;
}

/// A wallet account able to sign forged blocks. Key material never
/// leaves the wallet.
pub trait KeyAccount: Send + Sync {
    fn address(&self) -> Address;
    fn public_key(&self) -> PublicKey;
    fn sign(&self, payload: &[u8]) -> Signature;
}

pub trait Wallet: Send + Sync {
    fn private_key_accounts(&self) -> Vec<Arc<dyn KeyAccount>>;
}

pub trait TimeSource: Send + Sync {
    /// Milliseconds since the epoch, corrected against network time.
    fn corrected_time_ms(&self) -> u64;
}

/// The local coordinator which validates forged blocks and appends them
/// to the chain.
#[async_trait::async_trait]
pub trait Coordinator: Send + Sync {
    async fn process_key_block(&self, block: Block, local: bool) -> Result<Score, CoordinatorError>;
    async fn process_micro_block(&self, micro: MicroBlock) -> Result<(), CoordinatorError>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum NetworkMessage {
    LocalScoreChanged(Score),
    BlockForged(Box<Block>),
    MicroBlockInv { total: Signature, prev: Signature },
}

/// The set of currently connected peer channels.
pub trait PeerChannels: Send + Sync {
    fn size(&self) -> usize;
    fn broadcast(&self, message: NetworkMessage);
}

/// The proof-of-stake primitives. Treated as opaque: the forger only
/// relies on `hit < target` gating eligibility and on
/// `next_block_generation_time` pointing at the earliest slot.
pub trait PosCalculator: Send + Sync {
    fn calc_hit(&self, consensus: &ConsensusData, account: &PublicKey) -> u128;
    fn calc_target(&self, parent: &Block, now_ms: u64, generating_balance: u64) -> u128;
    fn calc_base_target(
        &self,
        average_block_delay: Duration,
        parent_height: u32,
        parent: &Block,
        great_grandparent: Option<&Block>,
        now_ms: u64,
    ) -> u64;
    fn calc_generator_signature(&self, consensus: &ConsensusData, account: &PublicKey) -> [u8; 32];
    fn next_block_generation_time(
        &self,
        height: u32,
        account: &PublicKey,
    ) -> Result<u64, PosError>;
}

#[derive(Debug, thiserror::Error)]
#[error("proof of stake calculation failed: {message}")]
pub struct PosError {
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
#[error("generating balance unavailable: {message}")]
pub struct BalanceError {
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
#[error("coordinator rejected the submission: {message}")]
pub struct CoordinatorError {
    pub message: String,
}
