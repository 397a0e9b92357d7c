//! Stress tests for the objkit runtime.
//!
//! These tests validate runtime behavior under concurrent load:
//! - Racing first use of a class accessor
//! - Concurrent retain/release on shared instances
//! - Arrays shared across threads
//! - Lock contention
//!
//! Run with: `cargo test --test stress_test -- --nocapture`

mod common;

use common::{Number, Tracked, take_deallocs};
use objkit::runtime::{
    Class, ClassCell, ClassDef, Id, Lock, MutableArray, Object, ObjectInterface, ObjectType, Once,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const THREADS: usize = 8;

// ============================================================================
// Class initialization
// ============================================================================

#[test]
fn test_concurrent_first_use_initializes_once() {
    static CLASS: ClassCell = ClassCell::new();
    static INITIALIZED: AtomicUsize = AtomicUsize::new(0);

    fn initialize(interface: &mut ObjectInterface) {
        INITIALIZED.fetch_add(1, Ordering::SeqCst);
        // Widen the race window.
        thread::sleep(Duration::from_millis(25));
        interface.description = |_| "stress".to_string();
    }

    fn class() -> &'static Class {
        // SAFETY: the override only reads through `&Object`.
        CLASS.get_or_init(|| unsafe {
            ClassDef::new::<Object>("StressLazyClass", Object::class(), initialize)
        })
    }

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let class = class();
                // Every caller sees the finished dispatch table.
                (class.interface().description)(&Object::new())
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), "stress");
    }
    assert_eq!(INITIALIZED.load(Ordering::SeqCst), 1);
}

#[test]
fn test_builtin_accessors_race() {
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                [
                    std::ptr::from_ref(MutableArray::class()) as usize,
                    std::ptr::from_ref(Lock::class()) as usize,
                    std::ptr::from_ref(Number::class()) as usize,
                ]
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_once_gate_under_contention() {
    let gate = Arc::new(Once::new());
    let runs = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let gate = Arc::clone(&gate);
            let runs = Arc::clone(&runs);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..100 {
                    gate.call_once(|| {
                        runs.fetch_add(1, Ordering::SeqCst);
                    });
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Reference counting
// ============================================================================

#[test]
fn test_concurrent_retain_release() {
    const ITERATIONS: usize = 10_000;

    let number = Number::new(11);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let number = number.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..ITERATIONS {
                    let extra = number.clone();
                    assert_eq!(extra.value(), 11);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(number.retain_count(), 1);
}

#[test]
fn test_last_release_on_another_thread_deallocates_once() {
    take_deallocs();

    let tracked = Tracked::new("handoff");
    let object = Id::into_object(tracked);

    let deallocs = thread::spawn(move || {
        drop(object);
        take_deallocs()
    })
    .join()
    .unwrap();

    assert_eq!(deallocs, ["Tracked(handoff)"]);
    assert!(take_deallocs().is_empty());
}

// ============================================================================
// Shared arrays and locks
// ============================================================================

#[test]
fn test_shared_array_appends() {
    const PER_THREAD: usize = 500;

    let array = MutableArray::new();
    let shared = Number::new(1);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let array = array.clone();
            let shared = shared.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..PER_THREAD {
                    array.add_object(&shared);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(array.count(), THREADS * PER_THREAD);
    assert_eq!(shared.retain_count(), THREADS * PER_THREAD + 1);

    array.remove_all_objects();
    assert_eq!(shared.retain_count(), 1);
}

#[test]
fn test_lock_guards_array_read_modify_write() {
    const ITERATIONS: usize = 200;

    let lock = Lock::new();
    let array = MutableArray::new();
    array.add_object(&Number::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let lock = lock.clone();
            let array = array.clone();
            thread::spawn(move || {
                for _ in 0..ITERATIONS {
                    lock.synchronized(|| {
                        let current = Number::of(&array.object_at_index(0));
                        array.set_object_at_index(&Number::new(current + 1), 0);
                    });
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        Number::of(&array.object_at_index(0)),
        (THREADS * ITERATIONS) as i64
    );
}
