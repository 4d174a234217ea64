//! The key block and micro block model used by the forger.

use bytes::Bytes;

use crate::primitive::{
    BlockId,
    PublicKey,
    Signature,
    TxId,
};

/// Hard cap on the number of transactions carried by a single micro block.
pub const MAX_TRANSACTIONS_PER_MICROBLOCK: usize = 255;

/// A transaction as carried by blocks and the unconfirmed pool. The
/// payload is opaque; validity checking is a coordinator concern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub id: TxId,
    pub bytes: Bytes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockVersion {
    Plain,
    Ng,
}

impl BlockVersion {
    #[must_use]
    pub fn supports_micro_blocks(self) -> bool {
        matches!(self, Self::Ng)
    }
}

/// The consensus header of a key block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsensusData {
    pub base_target: u64,
    pub generation_signature: [u8; 32],
}

/// A key block: a primary chain element with a consensus header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub version: BlockVersion,
    pub timestamp_ms: u64,
    pub reference: BlockId,
    pub consensus: ConsensusData,
    pub transactions: Vec<Transaction>,
    pub generator: PublicKey,
    pub signature: Signature,
}

impl Block {
    /// Assembles a block and signs it with the provided signing closure.
    /// The closure receives the canonical signable encoding of all fields
    /// preceding the signature.
    pub fn new_signed<F>(
        version: BlockVersion,
        timestamp_ms: u64,
        reference: BlockId,
        consensus: ConsensusData,
        transactions: Vec<Transaction>,
        generator: PublicKey,
        sign: F,
    ) -> Self
    where
        F: FnOnce(&[u8]) -> Signature,
    {
        let mut block = Self {
            version,
            timestamp_ms,
            reference,
            consensus,
            transactions,
            generator,
            signature: Signature::new([0; 64]),
        };
        block.signature = sign(&block.bytes_to_sign());
        block
    }

    /// The block ID under which this block enters the chain.
    #[must_use]
    pub fn id(&self) -> BlockId {
        let mut id = [0; 32];
        id.copy_from_slice(&self.signature.as_bytes()[..32]);
        BlockId::new(id)
    }

    #[must_use]
    pub fn bytes_to_sign(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.push(match self.version {
            BlockVersion::Plain => 2,
            BlockVersion::Ng => 3,
        });
        bytes.extend_from_slice(&self.timestamp_ms.to_be_bytes());
        bytes.extend_from_slice(self.reference.as_bytes());
        bytes.extend_from_slice(&self.consensus.base_target.to_be_bytes());
        bytes.extend_from_slice(&self.consensus.generation_signature);
        bytes.extend_from_slice(&(self.transactions.len() as u32).to_be_bytes());
        for transaction in &self.transactions {
            bytes.extend_from_slice(transaction.id.as_bytes());
        }
        bytes.extend_from_slice(self.generator.as_bytes());
        bytes
    }
}

/// An incremental extension of the most recent key block. Carries further
/// transactions but no consensus header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MicroBlock {
    pub generator: PublicKey,
    pub transactions: Vec<Transaction>,
    /// Signature of the total block this micro block extends.
    pub reference: Signature,
    /// Signature of the total block resulting from applying this micro block.
    pub total_signature: Signature,
    pub signature: Signature,
}

impl MicroBlock {
    pub fn new_signed<F>(
        generator: PublicKey,
        transactions: Vec<Transaction>,
        reference: Signature,
        total_signature: Signature,
        sign: F,
    ) -> Self
    where
        F: FnOnce(&[u8]) -> Signature,
    {
        let mut micro = Self {
            generator,
            transactions,
            reference,
            total_signature,
            signature: Signature::new([0; 64]),
        };
        micro.signature = sign(&micro.bytes_to_sign());
        micro
    }

    #[must_use]
    pub fn bytes_to_sign(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(self.generator.as_bytes());
        bytes.extend_from_slice(&(self.transactions.len() as u32).to_be_bytes());
        for transaction in &self.transactions {
            bytes.extend_from_slice(transaction.id.as_bytes());
        }
        bytes.extend_from_slice(self.reference.as_bytes());
        bytes.extend_from_slice(self.total_signature.as_bytes());
        bytes
    }
}
