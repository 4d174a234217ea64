//! The projection of unconfirmed transactions consumed by the pessimistic
//! portfolio index.

use crate::primitive::{
    Address,
    Asset,
    TxId,
};

/// An unconfirmed transaction as observed from the UTX stream.
///
/// `diff` carries the state changes the transaction would apply if
/// confirmed; it is absent when the source has not evaluated the
/// transaction yet, in which case the transaction contributes nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UtxTransaction {
    pub id: TxId,
    pub diff: Option<StateUpdate>,
    pub kind: Option<TxKind>,
}

impl UtxTransaction {
    #[must_use]
    pub fn is_exchange(&self) -> bool {
        matches!(self.kind, Some(TxKind::Exchange))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxKind {
    Exchange,
    Transfer,
    Lease,
    Other,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub balances: Vec<BalanceUpdate>,
    pub leases: Vec<LeaseUpdate>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub address: Address,
    pub asset: Asset,
    pub amount: i64,
}

/// The change in leased-out volume for an address. A positive `out`
/// reduces the spendable native balance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaseUpdate {
    pub address: Address,
    pub out: i64,
}
