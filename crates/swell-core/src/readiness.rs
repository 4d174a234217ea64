use std::sync::{
    atomic::{
        AtomicBool,
        Ordering,
    },
    Arc,
};

/// A cheap cloneable flag signalling whether the local chain view is in
/// sync. Maintained by the chain tracker, consulted by the forger.
#[derive(Clone, Debug, Default)]
pub struct BlockchainReadiness {
    inner: Arc<AtomicBool>,
}

impl BlockchainReadiness {
    #[must_use]
    pub fn new(ready: bool) -> Self {
        Self {
            inner: Arc::new(AtomicBool::new(ready)),
        }
    }

    pub fn set(&self, ready: bool) {
        self.inner.store(ready, Ordering::Release);
    }

    #[must_use]
    pub fn get(&self) -> bool {
        self.inner.load(Ordering::Acquire)
    }
}
