//! Mutual-exclusion lock object.
//!
//! [`Lock`] is a runtime class wrapping a non-recursive mutex. Unlike a
//! guard-based mutex it exposes explicit `lock`/`unlock` calls, so a critical
//! section may span code that does not share a scope. The holding thread is
//! recorded; unlocking a lock the calling thread does not hold is a defect
//! and aborts.

use crate::runtime::class::{Class, ClassCell, ClassDef};
use crate::runtime::object::{Alloc, Id, Object, ObjectInterface, ObjectType};
use objkit_log::error;
use parking_lot::RawMutex;
use parking_lot::lock_api::RawMutex as _;
use std::fmt;
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-thread identity used to record the lock holder. Never zero.
fn current_thread_token() -> usize {
    thread_local! {
        static TOKEN: u8 = const { 0 };
    }
    TOKEN.with(|token| ptr::from_ref(token) as usize)
}

/// A lockable runtime object.
///
/// # Example
///
/// ```rust
/// use objkit::runtime::Lock;
///
/// let lock = Lock::new();
/// lock.lock();
/// assert!(!lock.try_lock());
/// lock.unlock();
///
/// assert!(lock.try_lock());
/// lock.unlock();
/// ```
#[repr(C)]
pub struct Lock {
    object: Object,
    raw: RawMutex,
    owner: AtomicUsize,
}

// SAFETY: repr(C) with the root record first; declared with ClassDef::new::<Lock>.
unsafe impl ObjectType for Lock {
    fn class() -> &'static Class {
        static CLASS: ClassCell = ClassCell::new();
        // SAFETY: the installed entries expect Lock instances.
        CLASS.get_or_init(|| unsafe { ClassDef::new::<Lock>("Lock", Object::class(), initialize) })
    }
}

fn initialize(interface: &mut ObjectInterface) {
    interface.copy = lock_copy;
    interface.dealloc = lock_dealloc;
}

/// A held mutex cannot be duplicated.
fn lock_copy(_object: &Object) -> Option<Id<Object>> {
    None
}

unsafe fn lock_dealloc(object: NonNull<Object>) {
    // SAFETY: dispatch only reaches this entry for Lock instances.
    let lock = unsafe { object.cast::<Lock>().as_ref() };
    if lock.is_locked() {
        error!("lock destroyed while held");
        panic!("Lock deallocated while locked");
    }

    // RawMutex owns no resources; chain up.
    // SAFETY: forwarded from the caller.
    unsafe { (Lock::class().superclass_interface().dealloc)(object) }
}

impl Lock {
    /// Creates an unlocked lock.
    #[must_use]
    pub fn new() -> Id<Lock> {
        Self::init(Alloc::new())
    }

    /// Completes construction of an unlocked lock in `alloc`.
    ///
    /// Subclasses sharing `Lock`'s layout allocate with their own class and
    /// pass the reservation here.
    pub fn init(alloc: Alloc<Lock>) -> Id<Lock> {
        alloc.init(|object| Lock {
            object,
            raw: RawMutex::INIT,
            owner: AtomicUsize::new(0),
        })
    }

    /// Blocks until the lock is acquired.
    ///
    /// The lock is not recursive: locking it again from the holding thread
    /// deadlocks.
    pub fn lock(&self) {
        self.raw.lock();
        self.owner.store(current_thread_token(), Ordering::Relaxed);
    }

    /// Acquires the lock if it is free, without blocking.
    #[must_use]
    pub fn try_lock(&self) -> bool {
        let acquired = self.raw.try_lock();
        if acquired {
            self.owner.store(current_thread_token(), Ordering::Relaxed);
        }
        acquired
    }

    /// Releases the lock.
    ///
    /// # Panics
    ///
    /// Panics if the lock is not held, or if it is held by another thread.
    pub fn unlock(&self) {
        if !self.raw.is_locked() {
            error!("unlock called on an unlocked lock");
            panic!("Lock::unlock called while not locked");
        }
        if self.owner.load(Ordering::Relaxed) != current_thread_token() {
            error!("unlock called from a thread that does not hold the lock");
            panic!("Lock::unlock called from a thread that does not hold it");
        }

        self.owner.store(0, Ordering::Relaxed);
        // SAFETY: the lock is held by the calling thread.
        unsafe { self.raw.unlock() }
    }

    /// Returns `true` if some caller holds the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Runs `f` with the lock held, releasing it afterwards even if `f`
    /// unwinds.
    pub fn synchronized<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Unlock<'a>(&'a Lock);

        impl Drop for Unlock<'_> {
            fn drop(&mut self) {
                self.0.unlock();
            }
        }

        self.lock();
        let _unlock = Unlock(self);
        f()
    }
}

impl Deref for Lock {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.object
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("locked", &self.is_locked())
            .field("retain_count", &self.retain_count())
            .finish()
    }
}
