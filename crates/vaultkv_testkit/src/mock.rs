//! Test doubles for backends and randomness.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use vaultkv_core::{CoreError, CoreResult, RandomSource};
use vaultkv_storage::{Context, Entry, PhysicalBackend, StorageError, StorageResult};

/// Wraps a backend and counts every call that reaches it.
pub struct CountingBackend {
    inner: Arc<dyn PhysicalBackend>,
    puts: AtomicUsize,
    gets: AtomicUsize,
    deletes: AtomicUsize,
    lists: AtomicUsize,
}

impl CountingBackend {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn PhysicalBackend>) -> Self {
        Self {
            inner,
            puts: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
        }
    }

    /// Number of `put` calls.
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of `get` calls.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls.
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Number of `list` calls.
    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    /// Total calls of any kind.
    pub fn total(&self) -> usize {
        self.puts() + self.gets() + self.deletes() + self.lists()
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        self.puts.store(0, Ordering::SeqCst);
        self.gets.store(0, Ordering::SeqCst);
        self.deletes.store(0, Ordering::SeqCst);
        self.lists.store(0, Ordering::SeqCst);
    }
}

impl PhysicalBackend for CountingBackend {
    fn put(&self, ctx: &Context, entry: &Entry) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(ctx, entry)
    }

    fn get(&self, ctx: &Context, key: &str) -> StorageResult<Option<Entry>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(ctx, key)
    }

    fn delete(&self, ctx: &Context, key: &str) -> StorageResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(ctx, key)
    }

    fn list(&self, ctx: &Context, prefix: &str) -> StorageResult<Vec<String>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list(ctx, prefix)
    }
}

/// Wraps a backend and fails reads or writes while armed.
pub struct FaultyBackend {
    inner: Arc<dyn PhysicalBackend>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    cancel_after_write: Mutex<Option<Context>>,
}

impl FaultyBackend {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: Arc<dyn PhysicalBackend>) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            cancel_after_write: Mutex::new(None),
        }
    }

    /// Makes `get` and `list` fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes `put` and `delete` fail without reaching the inner backend.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Cancels `ctx` right after the next successful write.
    ///
    /// Simulates a caller giving up while the write was in flight.
    pub fn cancel_after_next_write(&self, ctx: &Context) {
        *self.cancel_after_write.lock() = Some(ctx.clone());
    }

    fn read_fault(&self) -> StorageResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::backend("injected read failure"));
        }
        Ok(())
    }

    fn write_fault(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::backend("injected write failure"));
        }
        Ok(())
    }

    fn after_write(&self) {
        if let Some(ctx) = self.cancel_after_write.lock().take() {
            ctx.cancel();
        }
    }
}

impl PhysicalBackend for FaultyBackend {
    fn put(&self, ctx: &Context, entry: &Entry) -> StorageResult<()> {
        self.write_fault()?;
        self.inner.put(ctx, entry)?;
        self.after_write();
        Ok(())
    }

    fn get(&self, ctx: &Context, key: &str) -> StorageResult<Option<Entry>> {
        self.read_fault()?;
        self.inner.get(ctx, key)
    }

    fn delete(&self, ctx: &Context, key: &str) -> StorageResult<()> {
        self.write_fault()?;
        self.inner.delete(ctx, key)?;
        self.after_write();
        Ok(())
    }

    fn list(&self, ctx: &Context, prefix: &str) -> StorageResult<Vec<String>> {
        self.read_fault()?;
        self.inner.list(ctx, prefix)
    }
}

/// Deterministic random source for reproducible tests.
///
/// Produces a splitmix64 stream from a seed. Never use outside tests.
#[derive(Debug)]
pub struct FixedRandom {
    state: Mutex<u64>,
}

impl FixedRandom {
    /// Creates a source starting at `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(seed),
        }
    }

    fn next_u64(state: &mut u64) -> u64 {
        *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = *state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

impl RandomSource for FixedRandom {
    fn try_fill(&self, dest: &mut [u8]) -> CoreResult<()> {
        let mut state = self.state.lock();
        for chunk in dest.chunks_mut(8) {
            let word = Self::next_u64(&mut state).to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
        Ok(())
    }
}

/// Random source that always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingRandom;

impl RandomSource for FailingRandom {
    fn try_fill(&self, _dest: &mut [u8]) -> CoreResult<()> {
        Err(CoreError::entropy("entropy source unavailable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultkv_storage::InMemoryBackend;

    #[test]
    fn counting_backend_counts() {
        let ctx = Context::background();
        let counting = CountingBackend::new(Arc::new(InMemoryBackend::new()));

        counting.put(&ctx, &Entry::new("a", vec![1])).unwrap();
        counting.get(&ctx, "a").unwrap();
        counting.get(&ctx, "b").unwrap();
        counting.list(&ctx, "").unwrap();
        counting.delete(&ctx, "a").unwrap();

        assert_eq!(counting.puts(), 1);
        assert_eq!(counting.gets(), 2);
        assert_eq!(counting.deletes(), 1);
        assert_eq!(counting.lists(), 1);
        assert_eq!(counting.total(), 5);

        counting.reset();
        assert_eq!(counting.total(), 0);
    }

    #[test]
    fn faulty_backend_injects_failures() {
        let ctx = Context::background();
        let inner = Arc::new(InMemoryBackend::new());
        let faulty = FaultyBackend::new(inner.clone());

        faulty.fail_writes(true);
        assert!(faulty.put(&ctx, &Entry::new("a", vec![1])).is_err());
        assert!(inner.is_empty());

        faulty.fail_writes(false);
        faulty.put(&ctx, &Entry::new("a", vec![1])).unwrap();

        faulty.fail_reads(true);
        assert!(faulty.get(&ctx, "a").is_err());
        assert!(faulty.list(&ctx, "").is_err());
    }

    #[test]
    fn fixed_random_is_reproducible() {
        let mut a = [0u8; 20];
        let mut b = [0u8; 20];
        FixedRandom::new(7).try_fill(&mut a).unwrap();
        FixedRandom::new(7).try_fill(&mut b).unwrap();
        assert_eq!(a, b);

        let source = FixedRandom::new(7);
        let mut first = [0u8; 12];
        let mut second = [0u8; 12];
        source.try_fill(&mut first).unwrap();
        source.try_fill(&mut second).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn failing_random_fails() {
        let mut buf = [0u8; 4];
        assert!(matches!(
            FailingRandom.try_fill(&mut buf),
            Err(CoreError::Entropy { .. })
        ));
    }
}
