use swell_core::{
    balance::BlockchainBalance,
    primitive::{
        Address,
        Asset,
        BlockId,
        TxId,
    },
};

use crate::fork::{
    BlockRef,
    ChainBlock,
    ChainBlockType,
};

pub(crate) fn block_id(byte: u8) -> BlockId {
    BlockId::new([byte; 32])
}

fn block(
    height: u32,
    id_byte: u8,
    reference_byte: u8,
    tpe: ChainBlockType,
    entries: &[(Address, Asset, i64)],
    confirmed_txs: &[TxId],
) -> ChainBlock {
    ChainBlock {
        block_ref: BlockRef {
            height,
            id: block_id(id_byte),
        },
        reference: block_id(reference_byte),
        timestamp_ms: u64::from(height) * 1_000,
        tpe,
        changes: BlockchainBalance::from_entries(entries.iter().copied()),
        confirmed_txs: confirmed_txs.to_vec(),
    }
}

pub(crate) fn key_block(
    height: u32,
    id_byte: u8,
    reference_byte: u8,
    entries: &[(Address, Asset, i64)],
) -> ChainBlock {
    block(height, id_byte, reference_byte, ChainBlockType::Key, entries, &[])
}

pub(crate) fn key_block_with_txs(
    height: u32,
    id_byte: u8,
    reference_byte: u8,
    entries: &[(Address, Asset, i64)],
    confirmed_txs: &[TxId],
) -> ChainBlock {
    block(
        height,
        id_byte,
        reference_byte,
        ChainBlockType::Key,
        entries,
        confirmed_txs,
    )
}

pub(crate) fn micro_block(
    height: u32,
    id_byte: u8,
    reference_byte: u8,
    entries: &[(Address, Asset, i64)],
) -> ChainBlock {
    block(height, id_byte, reference_byte, ChainBlockType::Micro, entries, &[])
}
