use parking_lot::{Condvar, Mutex};

use crate::SymbolCollector;

/// Builds one collector instance per concurrency slot.
pub type CollectorFactory = Box<dyn Fn() -> Box<dyn SymbolCollector> + Send + Sync>;

/// A fixed pool of reusable collector instances, one per scheduler slot.
///
/// [`acquire`](CollectorPool::acquire) blocks until an instance is free and
/// hands out an RAII guard; dropping the guard clears the collector's
/// per-file state and returns it to the pool. Because the pool is sized to
/// the scheduler's concurrency limit and each worker holds exactly one
/// checkout, a worker that owns a slot never actually waits here.
pub struct CollectorPool {
    free: Mutex<Vec<Box<dyn SymbolCollector>>>,
    available: Condvar,
    size: usize,
}

impl CollectorPool {
    /// Creates a pool of `size` collectors built by `factory`.
    pub fn new(size: usize, factory: CollectorFactory) -> Self {
        let size = size.max(1);
        let free = (0..size).map(|_| factory()).collect();
        Self {
            free: Mutex::new(free),
            available: Condvar::new(),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of collectors currently checked in.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    /// Checks out a collector, blocking until one is free.
    pub fn acquire(&self) -> PooledCollector<'_> {
        let mut free = self.free.lock();
        while free.is_empty() {
            self.available.wait(&mut free);
        }
        let collector = free.pop().expect("pool woke with no free collector");
        PooledCollector {
            pool: self,
            collector: Some(collector),
        }
    }
}

/// Exclusive checkout of one collector; returns it to the pool on drop.
pub struct PooledCollector<'a> {
    pool: &'a CollectorPool,
    collector: Option<Box<dyn SymbolCollector>>,
}

impl std::ops::Deref for PooledCollector<'_> {
    type Target = dyn SymbolCollector;

    fn deref(&self) -> &Self::Target {
        self.collector
            .as_deref()
            .expect("collector taken before drop")
    }
}

impl std::ops::DerefMut for PooledCollector<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.collector
            .as_deref_mut()
            .expect("collector taken before drop")
    }
}

impl Drop for PooledCollector<'_> {
    fn drop(&mut self) {
        if let Some(mut collector) = self.collector.take() {
            collector.clear();
            self.pool.free.lock().push(collector);
            self.pool.available.notify_one();
        }
    }
}
