//! Integration tests for pool and buffer operations.
//!
//! These tests drive the public runtime surface the way a data-plane
//! application would: create pools, drain them, return buffers singly and in
//! batches, and tear the pools down again.

use blockpool::pool::{MAX_ALIGNMENT, POOL_NAME_LEN};
use blockpool::prelude::*;
use std::collections::HashSet;

const BUF_SIZE: usize = 1500;
const BUF_ALIGN: usize = 64;
const BUF_NUM: usize = 3;

fn runtime() -> Runtime {
    Runtime::init(RuntimeConfig::default()).unwrap()
}

fn default_param() -> PoolParam {
    PoolParam::new(BUF_SIZE, BUF_ALIGN, BUF_NUM)
}

/// Allocate `out.len()` buffers, retrying until the pool stops yielding.
///
/// A batch call may legitimately return fewer than requested; keep asking
/// until a call comes back empty.
fn alloc_multi_all(rt: &Runtime, pool: Pool, out: &mut [Buffer]) -> usize {
    let mut total = 0;
    while total < out.len() {
        let got = rt.buffer_alloc_multi(pool, &mut out[total..]);
        if got == 0 {
            break;
        }
        total += got;
    }
    total
}

fn check_buffer(rt: &Runtime, pool: Pool, buffer: Buffer) {
    assert!(!buffer.is_invalid());
    assert!(rt.buffer_is_valid(buffer));
    assert_eq!(rt.buffer_pool(buffer), pool);
    assert!(rt.buffer_size(buffer).unwrap() >= BUF_SIZE);

    let addr = rt.buffer_addr(buffer).unwrap().as_ptr() as usize;
    assert_eq!(addr % BUF_ALIGN, 0);

    let event = buffer.to_event();
    assert_eq!(event.event_type(), EventType::Buffer);
    assert_eq!(event.subtype(), EventSubtype::None);
    assert_eq!(event.types(), (EventType::Buffer, EventSubtype::None));
    assert_eq!(Buffer::from_event(event), buffer);
}

// ============================================================================
// Allocation Tests
// ============================================================================

/// Drain a pool one buffer at a time.
#[test]
fn test_pool_alloc() {
    let rt = runtime();
    let pool = rt.pool_create("default pool", &default_param()).unwrap();
    assert!(!pool.is_invalid());

    let mut buffers = Vec::new();
    for _ in 0..BUF_NUM {
        let buffer = rt.buffer_alloc(pool).unwrap();
        check_buffer(&rt, pool, buffer);
        buffers.push(buffer);
    }

    // Exhausted: failure is a normal outcome
    assert!(rt.buffer_alloc(pool).is_none());

    let unique: HashSet<_> = buffers.iter().map(|b| b.to_u64()).collect();
    assert_eq!(unique.len(), BUF_NUM);

    for buffer in buffers {
        rt.buffer_free(buffer);
    }
    rt.pool_destroy(pool).unwrap();
}

/// A single block can be taken and returned repeatedly.
#[test]
fn test_pool_free() {
    let rt = runtime();
    let pool = rt
        .pool_create("buffer_pool_free", &default_param().capacity(1))
        .unwrap();

    for _ in 0..5 {
        let buffer = rt.buffer_alloc(pool).unwrap();
        check_buffer(&rt, pool, buffer);
        assert!(rt.buffer_alloc(pool).is_none());
        rt.buffer_free(buffer);
    }

    rt.pool_destroy(pool).unwrap();
}

/// Batch allocation returns at most the pool capacity.
#[test]
fn test_pool_alloc_multi() {
    let rt = runtime();
    let pool = rt.pool_create("buffer_pool_alloc_multi", &default_param()).unwrap();
    let mut buffers = [Buffer::INVALID; BUF_NUM + 1];

    let count = alloc_multi_all(&rt, pool, &mut buffers);
    assert_eq!(count, BUF_NUM);
    for &buffer in &buffers[..count] {
        check_buffer(&rt, pool, buffer);
    }
    assert!(buffers[count].is_invalid());

    rt.buffer_free_multi(&buffers[..count]);
    rt.pool_destroy(pool).unwrap();
}

/// After returning one buffer a large request yields exactly one.
#[test]
fn test_alloc_multi_after_single_free() {
    let rt = runtime();
    let pool = rt.pool_create("refill", &default_param()).unwrap();

    let mut all = [Buffer::INVALID; BUF_NUM];
    assert_eq!(rt.buffer_alloc_multi(pool, &mut all), BUF_NUM);

    rt.buffer_free(all[1]);

    let mut more = [Buffer::INVALID; 10];
    assert_eq!(rt.buffer_alloc_multi(pool, &mut more), 1);
    assert_eq!(more[0].index(), all[1].index());
    assert_ne!(more[0], all[1]);
    assert!(more[1..].iter().all(|b| b.is_invalid()));

    rt.buffer_free_multi(&[all[0], all[2], more[0]]);
    rt.pool_destroy(pool).unwrap();
}

/// An empty batch is a no-op.
#[test]
fn test_alloc_multi_empty_request() {
    let rt = runtime();
    let pool = rt.pool_create("empty", &default_param()).unwrap();

    assert_eq!(rt.buffer_alloc_multi(pool, &mut []), 0);
    rt.buffer_free_multi(&[]);
    assert_eq!(rt.pool_info(pool).unwrap().free, BUF_NUM);

    rt.pool_destroy(pool).unwrap();
}

// ============================================================================
// Free Tests
// ============================================================================

/// One batch free can span handles from several pools.
#[test]
fn test_free_multi_across_pools() {
    let rt = runtime();
    let param = default_param().capacity(2);
    let pool_a = rt.pool_create("buffer_pool_free_multi_0", &param).unwrap();
    let pool_b = rt.pool_create("buffer_pool_free_multi_1", &param).unwrap();

    let mut buffers = [Buffer::INVALID; 4];
    assert_eq!(alloc_multi_all(&rt, pool_a, &mut buffers[..2]), 2);
    assert_eq!(alloc_multi_all(&rt, pool_b, &mut buffers[2..]), 2);
    assert!(rt.buffer_alloc(pool_a).is_none());
    assert!(rt.buffer_alloc(pool_b).is_none());

    for &buffer in &buffers[..2] {
        assert_eq!(rt.buffer_pool(buffer), pool_a);
    }
    for &buffer in &buffers[2..] {
        assert_eq!(rt.buffer_pool(buffer), pool_b);
    }

    // Interleave pools so runs are short
    rt.buffer_free_multi(&[buffers[0], buffers[2], buffers[1], buffers[3]]);
    assert!(buffers.iter().all(|&b| !rt.buffer_is_valid(b)));

    // Both pools are full again
    let mut again = [Buffer::INVALID; 4];
    assert_eq!(alloc_multi_all(&rt, pool_a, &mut again[..2]), 2);
    assert_eq!(alloc_multi_all(&rt, pool_b, &mut again[2..]), 2);
    rt.buffer_free_multi(&again);

    rt.pool_destroy(pool_a).unwrap();
    rt.pool_destroy(pool_b).unwrap();
}

/// Buffers freed in any order can all be allocated again.
#[test]
fn test_reclaim_round_trip() {
    let rt = runtime();
    let pool = rt
        .pool_create("round_trip", &PoolParam::new(256, 128, 200))
        .unwrap();

    for _ in 0..3 {
        let mut buffers = vec![Buffer::INVALID; 200];
        assert_eq!(alloc_multi_all(&rt, pool, &mut buffers), 200);
        assert!(rt.buffer_alloc(pool).is_none());

        buffers.reverse();
        for buffer in &buffers[..100] {
            rt.buffer_free(*buffer);
        }
        rt.buffer_free_multi(&buffers[100..]);

        let info = rt.pool_info(pool).unwrap();
        assert_eq!(info.free, 200);
        assert_eq!(info.outstanding, 0);
    }

    rt.pool_destroy(pool).unwrap();
}

/// Stale and repeated frees are ignored in lenient mode.
#[test]
fn test_stale_handle_is_rejected() {
    let rt = Runtime::init(RuntimeConfig::lenient()).unwrap();
    let pool = rt.pool_create("stale", &default_param().capacity(1)).unwrap();

    let old = rt.buffer_alloc(pool).unwrap();
    rt.buffer_free(old);
    let new = rt.buffer_alloc(pool).unwrap();

    assert_eq!(old.index(), new.index());
    assert!(!rt.buffer_is_valid(old));
    assert_eq!(rt.buffer_pool(old), Pool::INVALID);
    assert!(rt.buffer_addr(old).is_none());

    // Must not release the current owner's block
    rt.buffer_free(old);
    rt.buffer_free_multi(&[old, old]);
    assert!(rt.buffer_is_valid(new));
    assert!(rt.buffer_alloc(pool).is_none());

    rt.buffer_free(new);
    rt.pool_destroy(pool).unwrap();
}

// ============================================================================
// Pool Management Tests
// ============================================================================

/// Create, look up, inspect and destroy.
#[test]
fn test_pool_management_basic() {
    let rt = runtime();
    let pool = rt.pool_create("pool_management", &default_param()).unwrap();

    assert_eq!(rt.pool_lookup("pool_management"), Some(pool));
    assert_eq!(rt.pool_lookup("missing"), None);
    assert_eq!(rt.pool_count(), 1);

    let info = rt.pool_info(pool).unwrap();
    assert_eq!(info.pool, pool);
    assert_eq!(info.name, "pool_management");
    assert_eq!(info.param, default_param());
    assert_eq!(info.stride, 1536);
    assert_eq!(info.free, BUF_NUM);
    assert_eq!(info.base_addr % BUF_ALIGN, 0);
    rt.pool_print(pool);

    rt.pool_destroy(pool).unwrap();
    assert_eq!(rt.pool_count(), 0);
    assert!(rt.pool_info(pool).is_none());
    assert!(rt.buffer_alloc(pool).is_none());
    assert!(matches!(rt.pool_destroy(pool), Err(Error::PoolNotFound(_))));
}

/// Destroying a pool with outstanding buffers is refused.
#[test]
fn test_destroy_in_use() {
    let rt = runtime();
    let pool = rt.pool_create("in_use", &default_param()).unwrap();
    let buffer = rt.buffer_alloc(pool).unwrap();

    match rt.pool_destroy(pool) {
        Err(Error::PoolInUse { name, outstanding }) => {
            assert_eq!(name, "in_use");
            assert_eq!(outstanding, 1);
        }
        other => panic!("expected PoolInUse, got {other:?}"),
    }

    // Pool is untouched
    assert!(rt.buffer_is_valid(buffer));
    assert_eq!(rt.pool_lookup("in_use"), Some(pool));

    rt.buffer_free(buffer);
    rt.pool_destroy(pool).unwrap();
}

/// Invalid parameter sets never create a pool.
#[test]
fn test_pool_create_rejects_invalid_params() {
    let rt = runtime();
    let bad = [
        default_param().block_size(0),
        default_param().capacity(0),
        default_param().alignment(0),
        default_param().alignment(48),
        default_param().alignment(MAX_ALIGNMENT * 2),
    ];

    for param in &bad {
        assert!(
            matches!(rt.pool_create("bad", param), Err(Error::InvalidParam(_))),
            "accepted {param:?}"
        );
    }
    assert!(matches!(
        rt.pool_create(&"x".repeat(POOL_NAME_LEN), &default_param()),
        Err(Error::NameTooLong { .. })
    ));
    assert_eq!(rt.pool_count(), 0);
}

/// Pools with the same name are distinct; lookup finds the first.
#[test]
fn test_duplicate_names() {
    let rt = runtime();
    let first = rt.pool_create("dup", &default_param()).unwrap();
    let second = rt.pool_create("dup", &default_param()).unwrap();

    assert_ne!(first, second);
    assert_ne!(first.to_u64(), second.to_u64());
    assert_eq!(rt.pool_lookup("dup"), Some(first));

    rt.pool_destroy(first).unwrap();
    assert_eq!(rt.pool_lookup("dup"), Some(second));
    rt.pool_destroy(second).unwrap();
}

/// A recreated pool does not accept handles from its predecessor.
#[test]
fn test_recreated_pool_rejects_old_handles() {
    let rt = Runtime::init(RuntimeConfig::lenient().with_max_pools(1)).unwrap();

    let old_pool = rt.pool_create("slot", &default_param()).unwrap();
    let old_buffer = rt.buffer_alloc(old_pool).unwrap();
    rt.buffer_free(old_buffer);
    rt.pool_destroy(old_pool).unwrap();

    let new_pool = rt.pool_create("slot", &default_param()).unwrap();
    assert_ne!(old_pool, new_pool);
    let new_buffer = rt.buffer_alloc(new_pool).unwrap();

    assert!(!rt.buffer_is_valid(old_buffer));
    assert!(rt.buffer_alloc(old_pool).is_none());
    rt.buffer_free(old_buffer);
    assert!(rt.buffer_is_valid(new_buffer));

    rt.buffer_free(new_buffer);
    rt.pool_destroy(new_pool).unwrap();
}

// ============================================================================
// Identity Tests
// ============================================================================

/// Numeric identities and diagnostics of handles.
#[test]
fn test_handle_identity() {
    let rt = runtime();
    let pool = rt.pool_create("identity", &default_param()).unwrap();

    assert_eq!(Pool::INVALID.to_u64(), 0);
    assert_eq!(Buffer::INVALID.to_u64(), 0);
    assert_eq!(Event::INVALID.to_u64(), 0);
    assert!(Event::INVALID.is_invalid());
    assert_ne!(pool.to_u64(), 0);

    let buffer = rt.buffer_alloc(pool).unwrap();
    let event: Event = buffer.into();
    assert_ne!(buffer.to_u64(), 0);
    assert_eq!(event.to_u64(), buffer.to_u64());
    assert_eq!(event.to_buffer(), buffer);

    let info = rt.buffer_info(buffer).unwrap();
    assert_eq!(info.buffer, buffer);
    assert_eq!(info.pool_name, "identity");
    assert_eq!(info.size, BUF_SIZE);
    assert_eq!(info.addr, rt.buffer_addr(buffer).unwrap().as_ptr() as usize);
    assert!(info.to_string().starts_with("Buffer info"));
    rt.buffer_print(buffer);

    rt.buffer_free(buffer);
    rt.pool_destroy(pool).unwrap();
}

/// Block contents are private to the holder and persist across handles.
#[test]
fn test_block_memory_is_usable() {
    let rt = runtime();
    let pool = rt.pool_create("memory", &default_param()).unwrap();

    let mut buffers = [Buffer::INVALID; BUF_NUM];
    assert_eq!(rt.buffer_alloc_multi(pool, &mut buffers), BUF_NUM);

    for (i, &buffer) in buffers.iter().enumerate() {
        let ptr = rt.buffer_addr(buffer).unwrap().as_ptr();
        let size = rt.buffer_size(buffer).unwrap();
        // SAFETY: the block is allocated to us and at least `size` bytes.
        unsafe { std::ptr::write_bytes(ptr, i as u8 + 1, size) };
    }
    for (i, &buffer) in buffers.iter().enumerate() {
        let ptr = rt.buffer_addr(buffer).unwrap().as_ptr();
        let size = rt.buffer_size(buffer).unwrap();
        // SAFETY: as above; blocks do not overlap.
        let bytes = unsafe { std::slice::from_raw_parts(ptr, size) };
        assert!(bytes.iter().all(|&b| b == i as u8 + 1));
    }

    rt.buffer_free_multi(&buffers);
    rt.pool_destroy(pool).unwrap();
}

/// A batch free over many interleaved handles crosses bitmap words in both pools.
#[test]
fn test_free_multi_interleaved_across_words() {
    let rt = runtime();
    let pool_a = rt.pool_create("wide_a", &PoolParam::new(64, 64, 100)).unwrap();
    let pool_b = rt.pool_create("wide_b", &PoolParam::new(128, 64, 70)).unwrap();

    let mut a = vec![Buffer::INVALID; 100];
    let mut b = vec![Buffer::INVALID; 70];
    assert_eq!(alloc_multi_all(&rt, pool_a, &mut a), 100);
    assert_eq!(alloc_multi_all(&rt, pool_b, &mut b), 70);

    // Alternate pools, walking b backwards so runs are never contiguous
    let mut mixed = Vec::with_capacity(170);
    for i in 0..100 {
        mixed.push(a[i]);
        if i < 70 {
            mixed.push(b[69 - i]);
        }
    }
    rt.buffer_free_multi(&mixed);

    for pool in [pool_a, pool_b] {
        let info = rt.pool_info(pool).unwrap();
        assert_eq!(info.outstanding, 0);
        assert_eq!(info.free, info.param.capacity);
    }
    assert!(mixed.iter().all(|&buffer| !rt.buffer_is_valid(buffer)));

    // Every block, including those past the last full word, comes back
    let mut again = vec![Buffer::INVALID; 101];
    assert_eq!(alloc_multi_all(&rt, pool_a, &mut again), 100);
    let indices: HashSet<_> = again[..100].iter().map(|b| b.index()).collect();
    assert_eq!(indices, (0..100).collect::<HashSet<u32>>());

    rt.buffer_free_multi(&again[..100]);
    rt.pool_destroy(pool_a).unwrap();
    rt.pool_destroy(pool_b).unwrap();
}

// ============================================================================
// Runtime Isolation Tests
// ============================================================================

/// Handles from one runtime are foreign to every other runtime.
#[test]
fn test_foreign_runtime_handles_are_not_live() {
    let rt_a = Runtime::init(RuntimeConfig::lenient()).unwrap();
    let rt_b = Runtime::init(RuntimeConfig::lenient()).unwrap();
    let param = default_param().capacity(1);

    let pool_a = rt_a.pool_create("isolated", &param).unwrap();
    let pool_b = rt_b.pool_create("isolated", &param).unwrap();
    let buffer_a = rt_a.buffer_alloc(pool_a).unwrap();
    let buffer_b = rt_b.buffer_alloc(pool_b).unwrap();

    // Same table slot and block, different runtimes
    assert_eq!(buffer_a.index(), buffer_b.index());
    assert_ne!(pool_a, pool_b);
    assert_ne!(pool_a.to_u64(), pool_b.to_u64());
    assert_ne!(buffer_a, buffer_b);

    assert!(!rt_b.buffer_is_valid(buffer_a));
    assert_eq!(rt_b.buffer_pool(buffer_a), Pool::INVALID);
    assert!(rt_b.pool_info(pool_a).is_none());
    assert!(rt_b.buffer_alloc(pool_a).is_none());

    // Freeing or destroying through the wrong runtime changes nothing
    rt_b.buffer_free(buffer_a);
    rt_b.buffer_free_multi(&[buffer_a]);
    assert!(matches!(rt_b.pool_destroy(pool_a), Err(Error::PoolNotFound(_))));
    assert!(rt_b.buffer_is_valid(buffer_b));
    assert_eq!(rt_b.pool_info(pool_b).unwrap().outstanding, 1);
    assert!(rt_a.buffer_is_valid(buffer_a));

    rt_a.buffer_free(buffer_a);
    rt_b.buffer_free(buffer_b);
    rt_a.pool_destroy(pool_a).unwrap();
    rt_b.pool_destroy(pool_b).unwrap();
}

/// Freeing another runtime's buffer traps in strict mode.
#[test]
#[should_panic(expected = "invalid buffer free")]
fn test_foreign_runtime_free_traps() {
    let rt_a = Runtime::init(RuntimeConfig::strict()).unwrap();
    let rt_b = Runtime::init(RuntimeConfig::strict()).unwrap();
    let param = default_param().capacity(1);

    let pool_a = rt_a.pool_create("strict_a", &param).unwrap();
    let pool_b = rt_b.pool_create("strict_b", &param).unwrap();
    let buffer_a = rt_a.buffer_alloc(pool_a).unwrap();
    let _buffer_b = rt_b.buffer_alloc(pool_b).unwrap();

    rt_b.buffer_free(buffer_a);
}
