//! Concurrent load helpers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use vaultkv_core::{Storage, StorageEntry};
use vaultkv_storage::Context;

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations, including reads that returned the wrong value.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        Self {
            total_ops: successful + failed,
            successful_ops: successful,
            failed_ops: failed,
            duration,
        }
    }

    /// Operations per second.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total_ops as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Size of each value in bytes.
    pub value_size: usize,
    /// Distinct keys per thread.
    pub key_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 500,
            threads: 8,
            value_size: 128,
            key_count: 32,
        }
    }
}

fn value_for(thread: usize, round: usize, size: usize) -> Vec<u8> {
    let mut value = format!("{thread}:{round}:").into_bytes();
    value.resize(size.max(value.len()), 0xAB);
    value
}

/// Runs concurrent put-then-get cycles against `storage`.
///
/// Each thread owns its own key range, so every get must observe the value
/// that thread just wrote; anything else counts as a failure.
pub fn stress_concurrent_put_get(
    storage: Arc<dyn Storage>,
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|thread_id| {
            let storage = Arc::clone(&storage);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let config = config.clone();

            thread::spawn(move || {
                let ctx = Context::background();
                for round in 0..config.operations {
                    let key = format!("stress/{thread_id}/{}", round % config.key_count.max(1));
                    let value = value_for(thread_id, round, config.value_size);

                    let ok = storage
                        .put(&ctx, &StorageEntry::new(key.clone(), value.clone()))
                        .and_then(|()| storage.get(&ctx, &key))
                        .map(|entry| entry.is_some_and(|entry| entry.value == value))
                        .unwrap_or(false);

                    if ok {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Runs concurrent readers and writers on one shared key.
///
/// Readers must only ever observe `None` or one of the written values.
pub fn stress_shared_key(storage: Arc<dyn Storage>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let key = "stress/shared";

    let handles: Vec<_> = (0..config.threads)
        .map(|thread_id| {
            let storage = Arc::clone(&storage);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let config = config.clone();

            thread::spawn(move || {
                let ctx = Context::background();
                for round in 0..config.operations {
                    let ok = if thread_id % 2 == 0 {
                        let value = value_for(thread_id, round, config.value_size);
                        storage.put(&ctx, &StorageEntry::new(key, value)).is_ok()
                    } else {
                        match storage.get(&ctx, key) {
                            Ok(None) => true,
                            Ok(Some(entry)) => {
                                entry.value.len() >= config.value_size
                                    && entry.value.contains(&b':')
                            }
                            Err(_) => false,
                        }
                    };

                    if ok {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
