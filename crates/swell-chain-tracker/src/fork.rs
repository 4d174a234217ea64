//! The local view of a chain fork: an ordered sequence of blocks from
//! some ancestor to a tip, together with the balance changes each block
//! applied.

use swell_core::{
    balance::{
        BlockchainBalance,
        DiffIndex,
    },
    primitive::{
        BlockId,
        TxId,
    },
};

/// A `(height, id)` pair referencing a block. Two refs are equal iff
/// their ids are equal; the height is carried for bookkeeping only.
#[derive(Clone, Copy, Debug, Eq)]
pub struct BlockRef {
    pub height: u32,
    pub id: BlockId,
}

impl PartialEq for BlockRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::hash::Hash for BlockRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at height {}", self.id, self.height)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainBlockType {
    Key,
    Micro,
}

/// A block as observed by the tracker: identity, parent linkage, and the
/// balance changes it applied. Transaction payloads are not retained,
/// only the confirmed ids needed to settle the pessimistic index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainBlock {
    pub block_ref: BlockRef,
    pub reference: BlockId,
    pub timestamp_ms: u64,
    pub tpe: ChainBlockType,
    pub changes: BlockchainBalance,
    pub confirmed_txs: Vec<TxId>,
}

impl ChainBlock {
    #[must_use]
    pub fn height(&self) -> u32 {
        self.block_ref.height
    }

    #[must_use]
    pub fn id(&self) -> BlockId {
        self.block_ref.id
    }

    #[must_use]
    pub fn is_key_block(&self) -> bool {
        matches!(self.tpe, ChainBlockType::Key)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ForkError {
    #[error("block `{block}` references `{reference}`, but the fork tip is `{tip}`")]
    MismatchedReference {
        block: BlockId,
        reference: BlockId,
        tip: BlockId,
    },
    #[error(
        "micro block `{block}` sits at height {height}, but the fork tip is at height \
         {tip_height}"
    )]
    MismatchedMicroHeight {
        block: BlockId,
        height: u32,
        tip_height: u32,
    },
}

/// An ordered list of blocks whose last element is the tip.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fork {
    blocks: Vec<ChainBlock>,
}

impl Fork {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new(blocks: Vec<ChainBlock>) -> Self {
        Self {
            blocks,
        }
    }

    /// Returns the fork extended by `block` if it references the current
    /// tip. Any block may start an empty fork.
    ///
    /// # Errors
    ///
    /// Returns an error if the block does not reference the tip, or if a
    /// micro block does not sit at the tip's height.
    pub fn with_block(&self, block: ChainBlock) -> Result<Self, ForkError> {
        if let Some(tip) = self.blocks.last() {
            if block.reference != tip.id() {
                return Err(ForkError::MismatchedReference {
                    block: block.id(),
                    reference: block.reference,
                    tip: tip.id(),
                });
            }
            if matches!(block.tpe, ChainBlockType::Micro) && block.height() != tip.height() {
                return Err(ForkError::MismatchedMicroHeight {
                    block: block.id(),
                    height: block.height(),
                    tip_height: tip.height(),
                });
            }
        }
        let mut extended = self.clone();
        extended.blocks.push(block);
        Ok(extended)
    }

    /// Truncates the fork to and including `block_ref`, returning the
    /// accumulated balance diff of all dropped blocks. An unknown ref
    /// empties the fork.
    #[must_use]
    pub fn drop_after(mut self, block_ref: BlockRef) -> (Self, BlockchainBalance) {
        let keep = self
            .blocks
            .iter()
            .position(|block| block.block_ref == block_ref)
            .map_or(0, |index| index.saturating_add(1));
        let dropped = accumulate_changes(self.blocks.split_off(keep));
        (self, dropped)
    }

    /// Drops all blocks with height >= `height`.
    #[must_use]
    pub fn drop_from(mut self, height: u32) -> (Self, BlockchainBalance) {
        let keep = self
            .blocks
            .iter()
            .position(|block| block.height() >= height)
            .unwrap_or(self.blocks.len());
        let dropped = accumulate_changes(self.blocks.split_off(keep));
        (self, dropped)
    }

    #[must_use]
    pub fn drop_all(self) -> (Self, BlockchainBalance) {
        let dropped = accumulate_changes(self.blocks);
        (Self::empty(), dropped)
    }

    #[must_use]
    pub fn last_block(&self) -> Option<&ChainBlock> {
        self.blocks.last()
    }

    /// The ref of the block preceding the tip, if any.
    #[must_use]
    pub fn parent_of_tip(&self) -> Option<BlockRef> {
        let parent_index = self.blocks.len().checked_sub(2)?;
        Some(self.blocks[parent_index].block_ref)
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.blocks.last().map_or(0, ChainBlock::height)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The union of `(address, asset)` keys touched by any block in the
    /// fork.
    #[must_use]
    pub fn diff_index(&self) -> DiffIndex {
        self.blocks
            .iter()
            .map(|block| block.changes.diff_index())
            .fold(DiffIndex::empty(), DiffIndex::union)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &ChainBlock> {
        self.blocks.iter()
    }
}

impl std::fmt::Display for Fork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.blocks.last() {
            None => f.write_str("empty fork"),
            Some(tip) => write!(f, "fork of {} blocks, tip {}", self.blocks.len(), tip.block_ref),
        }
    }
}

fn accumulate_changes(blocks: Vec<ChainBlock>) -> BlockchainBalance {
    blocks
        .into_iter()
        .map(|block| block.changes)
        .fold(BlockchainBalance::empty(), BlockchainBalance::merge)
}
