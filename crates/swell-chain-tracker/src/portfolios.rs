//! A thread-safe index of the negative-only balance effects of
//! unconfirmed transactions.
//!
//! Order matching consults this index to know how much of an address's
//! balance may already be committed by in-flight transactions. Only
//! spending effects are tracked; incoming amounts are ignored until the
//! transaction is confirmed.

use std::collections::{
    HashMap,
    HashSet,
    VecDeque,
};

use parking_lot::RwLock;
use swell_core::{
    primitive::{
        Address,
        Asset,
        TxId,
    },
    utx::{
        StateUpdate,
        UtxTransaction,
    },
};
use tracing::trace;

/// Capacity of the forged-transaction cache.
pub const MAX_FORGED_TRANSACTIONS: usize = 10_000;

type Portfolio = HashMap<Asset, i64>;

#[derive(Default)]
struct Inner {
    /// Aggregated pessimistic portfolio per address. Every stored value
    /// is negative; entries that sum to zero are pruned.
    portfolios: HashMap<Address, Portfolio>,
    /// Per-transaction contribution, used to back a transaction's effects
    /// out again once it is forged or dropped.
    txs: HashMap<TxId, HashMap<Address, Portfolio>>,
    forged_txs_cache: ForgedCache,
}

#[derive(Default)]
pub struct PessimisticPortfolios {
    inner: RwLock<Inner>,
}

impl PessimisticPortfolios {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replaces the tracked in-flight set with `txs`.
    ///
    /// Transactions whose id sits in the forged cache are ignored.
    /// Contributions of vanished ids are removed, contributions of new
    /// ids added. Returns the addresses whose aggregate changed.
    pub fn replace_with(&self, txs: &[UtxTransaction]) -> HashSet<Address> {
        let mut inner = self.inner.write();
        let mut affected = HashSet::new();

        let incoming: HashMap<TxId, &UtxTransaction> = txs
            .iter()
            .filter(|tx| !inner.forged_txs_cache.contains(&tx.id))
            .map(|tx| (tx.id, tx))
            .collect();

        let vanished: Vec<TxId> = inner
            .txs
            .keys()
            .filter(|id| !incoming.contains_key(id))
            .copied()
            .collect();
        for id in vanished {
            inner.remove_tx(&id, &mut affected);
        }

        for (id, tx) in incoming {
            if !inner.txs.contains_key(&id) {
                inner.add_tx(tx, &mut affected);
            }
        }

        trace!(affected = affected.len(), "replaced the in-flight set");
        affected
    }

    /// Settles forged transactions: known contributions are removed,
    /// unknown ids are remembered so a late `add_pending` cannot
    /// resurrect them. Returns the union of affected addresses.
    pub fn process_forged(&self, tx_ids: &[TxId]) -> HashSet<Address> {
        let mut inner = self.inner.write();
        let mut affected = HashSet::new();
        for id in tx_ids {
            if inner.txs.contains_key(id) {
                inner.remove_tx(id, &mut affected);
            } else {
                inner.forged_txs_cache.push(*id);
            }
        }
        affected
    }

    /// Adds transactions that are not yet tracked and not already forged.
    /// Exchange transactions contribute nothing pessimistic and are
    /// skipped.
    pub fn add_pending(&self, txs: &[UtxTransaction]) -> HashSet<Address> {
        let mut inner = self.inner.write();
        let mut affected = HashSet::new();
        for tx in txs {
            if tx.is_exchange()
                || inner.txs.contains_key(&tx.id)
                || inner.forged_txs_cache.contains(&tx.id)
            {
                continue;
            }
            inner.add_tx(tx, &mut affected);
        }
        affected
    }

    /// A snapshot of the aggregated portfolio for `address`; empty if the
    /// address has no in-flight spending effects.
    #[must_use]
    pub fn get_aggregated(&self, address: &Address) -> Portfolio {
        self.inner
            .read()
            .portfolios
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn forged_cache_len(&self) -> usize {
        self.inner.read().forged_txs_cache.len()
    }

    #[cfg(test)]
    pub(crate) fn forged_cache_contains(&self, id: &TxId) -> bool {
        self.inner.read().forged_txs_cache.contains(id)
    }
}

impl Inner {
    fn add_tx(&mut self, tx: &UtxTransaction, affected: &mut HashSet<Address>) {
        let contribution = pessimistic_portfolio(tx.diff.as_ref());
        for (address, portfolio) in &contribution {
            for (asset, amount) in portfolio {
                self.apply_to_aggregate(*address, *asset, *amount);
                affected.insert(*address);
            }
        }
        self.txs.insert(tx.id, contribution);
    }

    fn remove_tx(&mut self, id: &TxId, affected: &mut HashSet<Address>) {
        let Some(contribution) = self.txs.remove(id) else {
            return;
        };
        for (address, portfolio) in contribution {
            for (asset, amount) in portfolio {
                self.apply_to_aggregate(address, asset, amount.saturating_neg());
                affected.insert(address);
            }
        }
    }

    fn apply_to_aggregate(&mut self, address: Address, asset: Asset, amount: i64) {
        let portfolio = self.portfolios.entry(address).or_default();
        let updated = portfolio.get(&asset).copied().unwrap_or(0).saturating_add(amount);
        if updated < 0 {
            portfolio.insert(asset, updated);
        } else {
            portfolio.remove(&asset);
        }
        if portfolio.is_empty() {
            self.portfolios.remove(&address);
        }
    }
}

/// The negative-only contribution of a single transaction: spending
/// balance updates plus newly leased-out native amounts.
fn pessimistic_portfolio(diff: Option<&StateUpdate>) -> HashMap<Address, Portfolio> {
    let mut contribution: HashMap<Address, Portfolio> = HashMap::new();
    let Some(diff) = diff else {
        return contribution;
    };

    for update in &diff.balances {
        if update.amount < 0 {
            *contribution
                .entry(update.address)
                .or_default()
                .entry(update.asset)
                .or_insert(0) += update.amount;
        }
    }

    for lease in &diff.leases {
        if lease.out > 0 {
            *contribution
                .entry(lease.address)
                .or_default()
                .entry(Asset::Native)
                .or_insert(0) -= lease.out;
        }
    }

    contribution
}

/// A bounded FIFO of transaction ids with constant-time membership
/// checks. The oldest id is evicted once the capacity is reached.
struct ForgedCache {
    order: VecDeque<TxId>,
    known: HashSet<TxId>,
    capacity: usize,
}

impl Default for ForgedCache {
    fn default() -> Self {
        Self::new(MAX_FORGED_TRANSACTIONS)
    }
}

impl ForgedCache {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            known: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, id: TxId) {
        if !self.known.insert(id) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.known.remove(&evicted);
            }
        }
    }

    fn contains(&self, id: &TxId) -> bool {
        self.known.contains(id)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }
}
