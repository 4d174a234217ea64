//! The balance algebra shared by the chain tracker and its subscribers.
//!
//! [`BlockchainBalance`] is a sparse `address -> asset -> amount` map
//! forming a commutative group under componentwise addition. The group
//! identity is the empty map and every operation prunes zero entries, so
//! two balances describing the same effective change compare equal.

use std::collections::{
    hash_map,
    HashMap,
    HashSet,
};

use crate::primitive::{
    Address,
    Asset,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockchainBalance {
    inner: HashMap<Address, HashMap<Asset, i64>>,
}

impl BlockchainBalance {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a balance by summing all provided entries.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Address, Asset, i64)>,
    {
        let mut balance = Self::empty();
        for (address, asset, amount) in entries {
            balance.add(address, asset, amount);
        }
        balance
    }

    /// Adds `amount` to the entry at `(address, asset)`, pruning the entry
    /// if the sum reaches zero.
    pub fn add(&mut self, address: Address, asset: Asset, amount: i64) {
        if amount == 0 {
            return;
        }
        let assets = self.inner.entry(address).or_default();
        let updated = assets.get(&asset).copied().unwrap_or(0).saturating_add(amount);
        if updated == 0 {
            assets.remove(&asset);
        } else {
            assets.insert(asset, updated);
        }
        if assets.is_empty() {
            self.inner.remove(&address);
        }
    }

    #[must_use]
    pub fn get(&self, address: &Address, asset: &Asset) -> i64 {
        self.inner
            .get(address)
            .and_then(|assets| assets.get(asset))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn address_balances(&self, address: &Address) -> HashMap<Asset, i64> {
        self.inner.get(address).cloned().unwrap_or_default()
    }

    /// Merges `other` into `self` (the group operation).
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        for (address, assets) in other.inner {
            for (asset, amount) in assets {
                self.add(address, asset, amount);
            }
        }
        self
    }

    /// The group inverse: negates every entry.
    #[must_use]
    pub fn negate(self) -> Self {
        let inner = self
            .inner
            .into_iter()
            .map(|(address, assets)| {
                let negated = assets
                    .into_iter()
                    .map(|(asset, amount)| (asset, amount.saturating_neg()))
                    .collect();
                (address, negated)
            })
            .collect();
        Self {
            inner,
        }
    }

    #[must_use]
    pub fn subtract(self, other: Self) -> Self {
        self.merge(other.negate())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[must_use]
    pub fn diff_index(&self) -> DiffIndex {
        let mut index = DiffIndex::empty();
        for (address, assets) in &self.inner {
            for asset in assets.keys() {
                index.insert(*address, *asset);
            }
        }
        index
    }

    pub fn iter(&self) -> hash_map::Iter<'_, Address, HashMap<Asset, i64>> {
        self.inner.iter()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.inner.keys()
    }
}

impl<'a> IntoIterator for &'a BlockchainBalance {
    type IntoIter = hash_map::Iter<'a, Address, HashMap<Asset, i64>>;
    type Item = (&'a Address, &'a HashMap<Asset, i64>);

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

/// The set of `(address, asset)` keys touched by a balance diff.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiffIndex {
    inner: HashMap<Address, HashSet<Asset>>,
}

impl DiffIndex {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: Address, asset: Asset) {
        self.inner.entry(address).or_default().insert(asset);
    }

    #[must_use]
    pub fn contains(&self, address: &Address, asset: &Asset) -> bool {
        self.inner
            .get(address)
            .is_some_and(|assets| assets.contains(asset))
    }

    #[must_use]
    pub fn union(mut self, other: Self) -> Self {
        for (address, assets) in other.inner {
            self.inner.entry(address).or_default().extend(assets);
        }
        self
    }

    /// Returns the keys present in `self` but absent in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let mut result = Self::empty();
        for (address, assets) in &self.inner {
            for asset in assets {
                if !other.contains(address, asset) {
                    result.insert(*address, *asset);
                }
            }
        }
        result
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The number of `(address, asset)` keys in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.values().map(HashSet::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &HashSet<Asset>)> {
        self.inner.iter()
    }
}

impl From<&BlockchainBalance> for DiffIndex {
    fn from(balance: &BlockchainBalance) -> Self {
        balance.diff_index()
    }
}
