//! Lock-free metric snapshots for readers on other threads

use std::sync::Arc;

use arc_swap::ArcSwap;

/// Written only by the owner of the simulation tick; every reader sees a
/// complete, immutable value.
pub struct SnapshotCell<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> SnapshotCell<T> {
    pub fn new(initial: T) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(initial)) }
    }

    pub fn publish(&self, value: T) {
        self.inner.store(Arc::new(value));
    }

    pub fn load(&self) -> Arc<T> {
        self.inner.load_full()
    }

    pub fn reader(&self) -> SnapshotReader<T> {
        SnapshotReader { inner: Arc::clone(&self.inner) }
    }
}

/// Read-only handle to a [`SnapshotCell`].
pub struct SnapshotReader<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> Clone for SnapshotReader<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> SnapshotReader<T> {
    pub fn load(&self) -> Arc<T> {
        self.inner.load_full()
    }
}
