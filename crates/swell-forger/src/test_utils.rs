use std::sync::{
    atomic::{
        AtomicU64,
        AtomicU8,
        AtomicUsize,
        Ordering,
    },
    Arc,
};

use bytes::Bytes;
use parking_lot::Mutex;
use swell_core::{
    block::{
        Block,
        BlockVersion,
        ConsensusData,
        MicroBlock,
        Transaction,
    },
    primitive::{
        Address,
        BlockId,
        PublicKey,
        Score,
        Signature,
        TxId,
    },
    readiness::BlockchainReadiness,
};
use tokio_util::sync::CancellationToken;

use crate::{
    forger::{
        Builder,
        Forger,
    },
    traits::{
        BalanceError,
        Coordinator,
        CoordinatorError,
        History,
        KeyAccount,
        NetworkMessage,
        PeerChannels,
        PosCalculator,
        PosError,
        StateReader,
        TimeSource,
        UtxPool,
        Wallet,
    },
    Config,
};

const NOW_MS: u64 = 1_000_000;

pub(crate) struct TestAccount {
    byte: u8,
    signature_counter: AtomicU8,
}

impl KeyAccount for TestAccount {
    fn address(&self) -> Address {
        Address::new([self.byte; 26])
    }

    fn public_key(&self) -> PublicKey {
        PublicKey::new([self.byte; 32])
    }

    fn sign(&self, _payload: &[u8]) -> Signature {
        // Distinct signatures per call are all the tests need.
        let n = self.signature_counter.fetch_add(1, Ordering::SeqCst);
        Signature::new([n; 64])
    }
}

pub(crate) fn test_account(byte: u8) -> Arc<dyn KeyAccount> {
    Arc::new(TestAccount {
        byte,
        signature_counter: AtomicU8::new(byte),
    })
}

struct MockHistory {
    height: u32,
    last_block: Block,
    great_grandparent: Block,
}

impl History for MockHistory {
    fn height(&self) -> u32 {
        self.height
    }

    fn last_block(&self) -> Block {
        self.last_block.clone()
    }

    fn parent(&self, _block: &Block, depth: u32) -> Option<Block> {
        (depth == 2).then(|| self.great_grandparent.clone())
    }

    fn last_block_timestamp(&self) -> Option<u64> {
        Some(self.last_block.timestamp_ms)
    }
}

struct MockState;

impl StateReader for MockState {
    fn generating_balance(&self, _account: &Address, _height: u32) -> Result<u64, BalanceError> {
        Ok(1_000_000)
    }
}

struct MockUtx {
    transactions: Vec<Transaction>,
}

impl UtxPool for MockUtx {
    fn pack_unconfirmed(&self, limit: usize) -> Vec<Transaction> {
        self.transactions.iter().take(limit).cloned().collect()
    }
}

struct MockWallet {
    accounts: Vec<Arc<dyn KeyAccount>>,
}

impl Wallet for MockWallet {
    fn private_key_accounts(&self) -> Vec<Arc<dyn KeyAccount>> {
        self.accounts.clone()
    }
}

pub(crate) struct MockTime {
    now_ms: AtomicU64,
}

impl TimeSource for MockTime {
    fn corrected_time_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

pub(crate) struct MockCoordinator {
    reject: bool,
    pub(crate) key_blocks: Mutex<Vec<Block>>,
    pub(crate) micro_blocks: Mutex<Vec<MicroBlock>>,
}

#[async_trait::async_trait]
impl Coordinator for MockCoordinator {
    async fn process_key_block(
        &self,
        block: Block,
        _local: bool,
    ) -> Result<Score, CoordinatorError> {
        self.key_blocks.lock().push(block);
        if self.reject {
            return Err(CoordinatorError {
                message: "invalid block".into(),
            });
        }
        Ok(Score(42))
    }

    async fn process_micro_block(&self, micro: MicroBlock) -> Result<(), CoordinatorError> {
        self.micro_blocks.lock().push(micro);
        if self.reject {
            return Err(CoordinatorError {
                message: "invalid micro block".into(),
            });
        }
        Ok(())
    }
}

pub(crate) struct MockChannels {
    pub(crate) peers: AtomicUsize,
    pub(crate) messages: Mutex<Vec<NetworkMessage>>,
}

impl PeerChannels for MockChannels {
    fn size(&self) -> usize {
        self.peers.load(Ordering::SeqCst)
    }

    fn broadcast(&self, message: NetworkMessage) {
        self.messages.lock().push(message);
    }
}

struct MockPos {
    generation_time_ms: u64,
    hit: u128,
    target: u128,
}

impl PosCalculator for MockPos {
    fn calc_hit(&self, _consensus: &ConsensusData, _account: &PublicKey) -> u128 {
        self.hit
    }

    fn calc_target(&self, _parent: &Block, _now_ms: u64, _generating_balance: u64) -> u128 {
        self.target
    }

    fn calc_base_target(
        &self,
        _average_block_delay: std::time::Duration,
        _parent_height: u32,
        _parent: &Block,
        _great_grandparent: Option<&Block>,
        _now_ms: u64,
    ) -> u64 {
        1_000
    }

    fn calc_generator_signature(
        &self,
        _consensus: &ConsensusData,
        _account: &PublicKey,
    ) -> [u8; 32] {
        [4; 32]
    }

    fn next_block_generation_time(
        &self,
        _height: u32,
        _account: &PublicKey,
    ) -> Result<u64, PosError> {
        Ok(self.generation_time_ms)
    }
}

pub(crate) struct TestHarness {
    pub(crate) coordinator: Arc<MockCoordinator>,
    pub(crate) channels: Arc<MockChannels>,
    pub(crate) readiness: BlockchainReadiness,
    pub(crate) parent_block: Block,
    forger: Forger,
}

impl TestHarness {
    pub(crate) fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder {
            generation_in_ms: 100,
            hit: 1,
            target: 100,
            reject: false,
            max_transactions_in_key_block: 100,
            enable_microblocks_after_height: 0,
            empty_utx_pool: false,
        }
    }

    pub(crate) fn forger(&self) -> &Forger {
        &self.forger
    }
}

pub(crate) struct TestHarnessBuilder {
    generation_in_ms: u64,
    hit: u128,
    target: u128,
    reject: bool,
    max_transactions_in_key_block: usize,
    enable_microblocks_after_height: u32,
    empty_utx_pool: bool,
}

impl TestHarnessBuilder {
    pub(crate) fn generation_in_ms(mut self, offset: u64) -> Self {
        self.generation_in_ms = offset;
        self
    }

    pub(crate) fn hit_and_target(mut self, hit: u128, target: u128) -> Self {
        self.hit = hit;
        self.target = target;
        self
    }

    pub(crate) fn rejecting_coordinator(mut self) -> Self {
        self.reject = true;
        self
    }

    pub(crate) fn max_transactions_in_key_block(mut self, limit: usize) -> Self {
        self.max_transactions_in_key_block = limit;
        self
    }

    pub(crate) fn enable_microblocks_after_height(mut self, height: u32) -> Self {
        self.enable_microblocks_after_height = height;
        self
    }

    pub(crate) fn empty_utx_pool(mut self) -> Self {
        self.empty_utx_pool = true;
        self
    }

    pub(crate) fn build(self) -> TestHarness {
        let parent_block = Block {
            version: BlockVersion::Ng,
            timestamp_ms: NOW_MS - 1_000,
            reference: BlockId::new([9; 32]),
            consensus: ConsensusData {
                base_target: 100,
                generation_signature: [8; 32],
            },
            transactions: vec![],
            generator: PublicKey::new([7; 32]),
            signature: Signature::new([255; 64]),
        };
        let great_grandparent = Block {
            timestamp_ms: NOW_MS - 3_000,
            signature: Signature::new([254; 64]),
            ..parent_block.clone()
        };

        let transactions = if self.empty_utx_pool {
            vec![]
        } else {
            vec![
                Transaction {
                    id: TxId::new([11; 32]),
                    bytes: Bytes::from_static(b"first"),
                },
                Transaction {
                    id: TxId::new([22; 32]),
                    bytes: Bytes::from_static(b"second"),
                },
            ]
        };

        let config = Config {
            quorum: 2,
            interval_after_last_block_then_generation_is_allowed_ms: 300_000,
            minimal_block_generation_offset_ms: 200,
            max_transactions_in_key_block: self.max_transactions_in_key_block,
            micro_block_interval_ms: 500,
            enable_microblocks_after_height: self.enable_microblocks_after_height,
            average_block_delay_ms: 60_000,
            log: "info".into(),
        };

        let coordinator = Arc::new(MockCoordinator {
            reject: self.reject,
            key_blocks: Mutex::new(vec![]),
            micro_blocks: Mutex::new(vec![]),
        });
        let channels = Arc::new(MockChannels {
            peers: AtomicUsize::new(3),
            messages: Mutex::new(vec![]),
        });
        let readiness = BlockchainReadiness::new(true);

        let forger = Builder {
            config,
            history: Arc::new(MockHistory {
                height: 3,
                last_block: parent_block.clone(),
                great_grandparent,
            }),
            state: Arc::new(MockState),
            utx: Arc::new(MockUtx {
                transactions,
            }),
            wallet: Arc::new(MockWallet {
                accounts: vec![test_account(1)],
            }),
            time: Arc::new(MockTime {
                now_ms: AtomicU64::new(NOW_MS),
            }),
            coordinator: coordinator.clone(),
            channels: channels.clone(),
            pos: Arc::new(MockPos {
                generation_time_ms: NOW_MS + self.generation_in_ms,
                hit: self.hit,
                target: self.target,
            }),
            readiness: readiness.clone(),
            shutdown_token: CancellationToken::new(),
        }
        .build()
        .expect("the harness configuration is valid");

        TestHarness {
            coordinator,
            channels,
            readiness,
            parent_block,
            forger,
        }
    }
}
