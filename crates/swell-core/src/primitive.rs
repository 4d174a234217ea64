use base58_display::Base58Display;

pub const ADDRESS_LENGTH: usize = 26;

/// An account address.
///
/// Addresses are opaque to the components in this workspace; derivation
/// from public keys is a wallet concern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    inner: [u8; ADDRESS_LENGTH],
}

impl Address {
    #[must_use]
    pub const fn new(inner: [u8; ADDRESS_LENGTH]) -> Self {
        Self {
            inner,
        }
    }

    #[must_use]
    pub const fn get(self) -> [u8; ADDRESS_LENGTH] {
        self.inner
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.inner
    }

    /// Creates an address from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 26 bytes long.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, IncorrectLength> {
        let inner = <[u8; ADDRESS_LENGTH]>::try_from(bytes).map_err(|_| IncorrectLength {
            expected: ADDRESS_LENGTH,
            actual: bytes.len(),
        })?;
        Ok(Self::new(inner))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Base58Display::new(&self.inner).fmt(f)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("expected {expected} bytes, got {actual}")]
pub struct IncorrectLength {
    expected: usize,
    actual: usize,
}

macro_rules! impl_bytes32_id {
    ($(#[$docs:meta])* $name:ident) => {
        $(#[$docs])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            inner: [u8; 32],
        }

        impl $name {
            #[must_use]
            pub const fn new(inner: [u8; 32]) -> Self {
                Self {
                    inner,
                }
            }

            #[must_use]
            pub const fn get(self) -> [u8; 32] {
                self.inner
            }

            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.inner
            }

            /// Creates an ID from a byte slice.
            ///
            /// # Errors
            ///
            /// Returns an error if the slice is not exactly 32 bytes long.
            pub fn try_from_slice(bytes: &[u8]) -> Result<Self, IncorrectLength> {
                let inner = <[u8; 32]>::try_from(bytes).map_err(|_| IncorrectLength {
                    expected: 32,
                    actual: bytes.len(),
                })?;
                Ok(Self::new(inner))
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(inner: [u8; 32]) -> Self {
                Self::new(inner)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                Base58Display::new(&self.inner).fmt(f)
            }
        }
    };
}

impl_bytes32_id!(
    /// Identifier of an issued asset.
    AssetId
);
impl_bytes32_id!(
    /// Identifier of a transaction.
    TxId
);
impl_bytes32_id!(
    /// Identifier of a key block or micro block.
    BlockId
);
impl_bytes32_id!(
    /// An account public key. Key material handling is a wallet concern.
    PublicKey
);

/// An asset as tracked by balances: the chain's native token or an
/// issued one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Asset {
    Native,
    Issued(AssetId),
}

impl Asset {
    #[must_use]
    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => f.write_str("SWELL"),
            Self::Issued(id) => id.fmt(f),
        }
    }
}

/// A 64 byte signature over a block, micro block, or transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    inner: [u8; 64],
}

impl Signature {
    #[must_use]
    pub const fn new(inner: [u8; 64]) -> Self {
        Self {
            inner,
        }
    }

    #[must_use]
    pub const fn get(self) -> [u8; 64] {
        self.inner
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.inner
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Signature")
            .field(&format_args!("{self}"))
            .finish()
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Base58Display::new(&self.inner).fmt(f)
    }
}

/// The cumulative chain score as reported by the local coordinator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Score(pub u128);

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

mod base58_display {
    /// Lazily encodes a byte slice as base58 for display contexts.
    pub(super) struct Base58Display<'a> {
        bytes: &'a [u8],
    }

    impl<'a> Base58Display<'a> {
        pub(super) fn new(bytes: &'a [u8]) -> Self {
            Self {
                bytes,
            }
        }
    }

    impl std::fmt::Display for Base58Display<'_> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&bs58::encode(self.bytes).into_string())
        }
    }
}
