//! End-to-end barrier behaviour over the full stack.

use std::sync::Arc;
use vaultkv_core::{
    AesGcmBarrier, CoreError, Envelope, OsRandom, SecurityBarrier, Storage, StorageEntry,
    KEYRING_PATH,
};
use vaultkv_storage::{Context, InMemoryBackend, PhysicalBackend};
use vaultkv_testkit::prelude::*;

#[test]
fn put_get_through_full_stack() {
    let stack = TestStack::new();
    stack
        .barrier
        .put(&stack.ctx, &StorageEntry::new("foo", "storage entry"))
        .unwrap();

    let entry = stack.barrier.get(&stack.ctx, "foo").unwrap().unwrap();
    assert_eq!(entry.value, b"storage entry");

    let raw = stack.physical.get(&stack.ctx, "foo").unwrap().unwrap();
    assert!(!raw
        .value
        .windows(b"storage entry".len())
        .any(|w| w == b"storage entry"));
}

#[test]
fn sealed_barrier_performs_no_io() {
    let stack = TestStack::sealed();
    stack.counting.reset();

    let ctx = &stack.ctx;
    assert!(matches!(
        stack.barrier.put(ctx, &StorageEntry::new("k", "v")),
        Err(CoreError::Sealed)
    ));
    assert!(matches!(stack.barrier.get(ctx, "k"), Err(CoreError::Sealed)));
    assert!(matches!(stack.barrier.delete(ctx, "k"), Err(CoreError::Sealed)));
    assert!(matches!(stack.barrier.list(ctx, ""), Err(CoreError::Sealed)));

    assert_eq!(stack.counting.total(), 0);
}

#[test]
fn uninitialized_barrier_is_sealed() {
    let counting = Arc::new(CountingBackend::new(Arc::new(InMemoryBackend::new())));
    let barrier = AesGcmBarrier::new(counting.clone());
    let ctx = Context::background();

    assert!(barrier.sealed());
    assert!(matches!(barrier.get(&ctx, "k"), Err(CoreError::Sealed)));
    assert_eq!(counting.total(), 0);
}

#[test]
fn wrong_key_keeps_barrier_sealed() {
    let stack = TestStack::sealed();
    let wrong = stack.barrier.generate_key(&OsRandom).unwrap();

    assert!(matches!(
        stack.barrier.unseal(&stack.ctx, wrong.as_bytes()),
        Err(CoreError::AuthenticationFailure)
    ));
    assert!(stack.barrier.sealed());

    stack.unseal();
    assert!(!stack.barrier.sealed());
}

#[test]
fn double_initialize_leaves_keyring_untouched() {
    let stack = TestStack::new();
    let before = stack.physical.get(&stack.ctx, KEYRING_PATH).unwrap().unwrap();

    let other = stack.barrier.generate_key(&OsRandom).unwrap();
    assert!(matches!(
        stack
            .barrier
            .initialize(&stack.ctx, other.as_bytes(), None, &OsRandom),
        Err(CoreError::AlreadyInitialized)
    ));

    let after = stack.physical.get(&stack.ctx, KEYRING_PATH).unwrap().unwrap();
    assert_eq!(before.value, after.value);
}

#[test]
fn every_byte_flip_is_an_authentication_failure() {
    let stack = TestStack::with_cache_config(vaultkv_storage::CacheConfig::new().enabled(false));
    stack
        .barrier
        .put(&stack.ctx, &StorageEntry::new("secret", "value"))
        .unwrap();
    let original = stack.physical.get(&stack.ctx, "secret").unwrap().unwrap();

    // Byte 0 is the version; flipping it is an unsupported version
    for index in 1..original.value.len() {
        let mut tampered = original.value.clone();
        tampered[index] ^= 0x80;
        stack
            .physical
            .put(&stack.ctx, &vaultkv_storage::Entry::new("secret", tampered))
            .unwrap();

        let result = stack.barrier.get(&stack.ctx, "secret");
        assert!(
            matches!(result, Err(CoreError::AuthenticationFailure)),
            "flip at byte {index} returned {result:?}"
        );
    }
}

#[test]
fn failed_entropy_fails_the_write() {
    let backend = Arc::new(InMemoryBackend::new());
    let ctx = Context::background();
    let setup = AesGcmBarrier::new(backend.clone());
    let key = setup.generate_key(&OsRandom).unwrap();
    setup.initialize(&ctx, key.as_bytes(), None, &OsRandom).unwrap();

    let barrier = AesGcmBarrier::with_random(backend.clone(), Arc::new(FailingRandom));
    barrier.unseal(&ctx, key.as_bytes()).unwrap();

    let before = backend.len();
    assert!(matches!(
        barrier.put(&ctx, &StorageEntry::new("k", "v")),
        Err(CoreError::Entropy { .. })
    ));
    assert_eq!(backend.len(), before);
}

#[test]
fn deterministic_random_gives_reproducible_envelopes() {
    let ctx = Context::background();
    let make = || {
        let backend = Arc::new(InMemoryBackend::new());
        let random = Arc::new(FixedRandom::new(42));
        let barrier = AesGcmBarrier::with_random(backend.clone(), random.clone());
        let key = barrier.generate_key(random.as_ref()).unwrap();
        barrier
            .initialize(&ctx, key.as_bytes(), None, random.as_ref())
            .unwrap();
        barrier.unseal(&ctx, key.as_bytes()).unwrap();
        barrier.put(&ctx, &StorageEntry::new("k", "v")).unwrap();
        backend.raw("k").unwrap()
    };

    assert_eq!(make(), make());
}

#[test]
fn rotation_survives_restart() {
    let stack = TestStack::new();
    stack
        .barrier
        .put(&stack.ctx, &StorageEntry::new("before", "1"))
        .unwrap();
    assert_eq!(stack.barrier.rotate(&stack.ctx, &OsRandom).unwrap(), 2);
    stack
        .barrier
        .put(&stack.ctx, &StorageEntry::new("after", "2"))
        .unwrap();

    let stack = stack.reopen();
    stack.unseal();

    assert_eq!(stack.barrier.active_key_info().unwrap().term, 2);
    assert_eq!(stack.barrier.get(&stack.ctx, "before").unwrap().unwrap().value, b"1");
    assert_eq!(stack.barrier.get(&stack.ctx, "after").unwrap().unwrap().value, b"2");

    let raw = stack.physical.get(&stack.ctx, "after").unwrap().unwrap();
    assert_eq!(Envelope::parse(&raw.value).unwrap().term(), 2);
}

#[test]
fn unknown_term_is_an_authentication_failure() {
    let stack = TestStack::new();
    stack
        .barrier
        .put(&stack.ctx, &StorageEntry::new("k", "v"))
        .unwrap();

    let mut raw = stack.physical.get(&stack.ctx, "k").unwrap().unwrap().value;
    raw[1..5].copy_from_slice(&99u32.to_be_bytes());
    stack
        .physical
        .put(&stack.ctx, &vaultkv_storage::Entry::new("k", raw))
        .unwrap();
    stack.cache.purge(&stack.ctx).unwrap();

    assert!(matches!(
        stack.barrier.get(&stack.ctx, "k"),
        Err(CoreError::AuthenticationFailure)
    ));
}

#[test]
fn rekey_survives_restart() {
    let stack = TestStack::new();
    stack
        .barrier
        .put(&stack.ctx, &StorageEntry::new("k", "v"))
        .unwrap();

    let new_root = stack.barrier.generate_key(&OsRandom).unwrap();
    stack.barrier.rekey(&stack.ctx, new_root.as_bytes()).unwrap();

    let stack = stack.reopen();
    assert!(!stack
        .barrier
        .verify_root(&stack.ctx, stack.root_key.as_bytes())
        .unwrap());
    stack
        .barrier
        .unseal(&stack.ctx, new_root.as_bytes())
        .unwrap();
    assert_eq!(stack.barrier.get(&stack.ctx, "k").unwrap().unwrap().value, b"v");
}

#[test]
fn cancelled_context_performs_no_io() {
    let stack = TestStack::new();
    stack.counting.reset();

    let ctx = Context::background();
    ctx.cancel();
    assert!(matches!(
        stack.barrier.put(&ctx, &StorageEntry::new("k", "v")),
        Err(CoreError::Canceled)
    ));
    assert!(matches!(stack.barrier.get(&ctx, "k"), Err(CoreError::Canceled)));
    assert!(matches!(stack.barrier.list(&ctx, ""), Err(CoreError::Canceled)));

    assert_eq!(stack.counting.total(), 0);
}

#[test]
fn expired_deadline_performs_no_io() {
    let stack = TestStack::new();
    stack.counting.reset();

    let ctx = Context::background().with_timeout(std::time::Duration::ZERO);
    assert!(matches!(
        stack.barrier.delete(&ctx, "k"),
        Err(CoreError::DeadlineExceeded)
    ));
    assert_eq!(stack.counting.total(), 0);
}

#[test]
fn write_cancelled_in_flight_is_reported() {
    let physical = Arc::new(InMemoryBackend::new());
    let faulty = Arc::new(FaultyBackend::new(physical.clone()));
    let barrier = AesGcmBarrier::new(faulty.clone());
    let ctx = Context::background();
    let key = barrier.generate_key(&OsRandom).unwrap();
    barrier.initialize(&ctx, key.as_bytes(), None, &OsRandom).unwrap();
    barrier.unseal(&ctx, key.as_bytes()).unwrap();

    let doomed = Context::background();
    faulty.cancel_after_next_write(&doomed);
    assert!(matches!(
        barrier.put(&doomed, &StorageEntry::new("k", "v")),
        Err(CoreError::Canceled)
    ));
}
