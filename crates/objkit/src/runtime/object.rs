//! Object allocation, dispatch, and reference counting for the `objkit`
//! runtime.
//!
//! This module implements the object system with:
//! - The root record every instance embeds as its first field
//! - The per-class dispatch table ([`ObjectInterface`])
//! - Two-phase construction: [`Alloc`] reserves, `init` completes
//! - Reference counting with atomic operations ([`Id`], [`retain`], [`release`])
//!
//! # Architecture
//!
//! Instances are heap-allocated with manual memory management:
//! - Each instance starts with an [`Object`] record holding its class, its
//!   dispatch table, and an atomic retain count
//! - Instance structs are `#[repr(C)]` and embed their superclass instance as
//!   the first field, so upcasting is a field access (`Deref`) and downcasting
//!   is a checked walk of the class chain
//! - When the count reaches zero the most-derived `dealloc` entry runs, chains
//!   explicitly up to the root, and the memory is freed
//!
//! # Thread Safety
//!
//! Retain and release are atomic, so handles may be shared across threads.
//! Mutable instance state needs its own synchronization (arrays use a lock,
//! collaborators use [`Lock`](crate::runtime::Lock)).

use crate::runtime::class::{Class, ClassCell, ClassDef};
use objkit_log::{debug, trace};
use std::alloc::{self, Layout};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering, fence};

/// Counts above this abort, like `Arc`.
const MAX_RETAIN_COUNT: usize = isize::MAX as usize;

/// Dispatch entry producing an independent copy, or `None` if the class
/// cannot be duplicated.
pub type CopyFn = fn(&Object) -> Option<Id<Object>>;

/// Dispatch entry releasing an instance's own fields, then chaining to the
/// superclass entry.
///
/// # Safety
///
/// Called exactly once, with the instance's retain count at zero. The
/// instance must not be touched afterwards except to free its memory.
pub type DeallocFn = unsafe fn(NonNull<Object>);

/// Dispatch entry rendering a human-readable description.
pub type DescriptionFn = fn(&Object) -> String;

/// Dispatch entry hashing an instance consistently with `is_equal`.
pub type HashFn = fn(&Object) -> u64;

/// Dispatch entry comparing two instances for equality.
pub type IsEqualFn = fn(&Object, &Object) -> bool;

/// Per-class dispatch table.
///
/// Every class owns one. Registration copies the superclass's table and lets
/// the class's initializer overwrite the entries it overrides. Calls made
/// through an instance always resolve against the instance's own class table,
/// whatever static type the caller holds.
#[derive(Clone, Copy)]
pub struct ObjectInterface {
    /// Produces an independent instance with equivalent state.
    pub copy: CopyFn,
    /// Releases owned fields, then chains to the superclass.
    pub dealloc: DeallocFn,
    /// Describes the instance.
    pub description: DescriptionFn,
    /// Hashes the instance.
    pub hash: HashFn,
    /// Tests equality with another instance.
    pub is_equal: IsEqualFn,
}

impl ObjectInterface {
    /// The root class's entries.
    pub const ROOT: ObjectInterface = ObjectInterface {
        copy: root_copy,
        dealloc: root_dealloc,
        description: root_description,
        hash: root_hash,
        is_equal: root_is_equal,
    };
}

impl fmt::Debug for ObjectInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectInterface")
            .field("copy", &(self.copy as *const ()))
            .field("dealloc", &(self.dealloc as *const ()))
            .field("description", &(self.description as *const ()))
            .field("hash", &(self.hash as *const ()))
            .field("is_equal", &(self.is_equal as *const ()))
            .finish()
    }
}

/// Instance types the runtime can allocate and dispatch on.
///
/// # Safety
///
/// Implementors must:
/// - be `#[repr(C)]` with [`Object`], or another `ObjectType` whose class is
///   this type's superclass, as the first field
/// - return from [`class`](ObjectType::class) a descriptor declared with
///   `ClassDef::new::<Self>` (so its layout is `Layout::new::<Self>()`)
/// - not implement `Drop`; owned fields are released by the class's `dealloc`
///   entry, which must then chain to its superclass's entry
pub unsafe trait ObjectType: Sized + Send + Sync + 'static {
    /// Returns the class descriptor instances of this type are created from.
    fn class() -> &'static Class;

    /// Returns the embedded root record.
    fn as_object(&self) -> &Object {
        // SAFETY: implementors place the root record at offset zero.
        unsafe { &*ptr::from_ref(self).cast::<Object>() }
    }
}

/// The root record embedded first in every instance, and the root class.
///
/// Holds the instance's class, its dispatch table, and its retain count. A
/// bare `Object` is also a valid instance: it is what the root class allocates.
///
/// # Example
///
/// ```rust
/// use objkit::runtime::{Object, ObjectType};
///
/// let object = Object::new();
/// assert_eq!(object.get_class().name(), "Object");
/// assert_eq!(object.retain_count(), 1);
///
/// let other = object.clone();
/// assert_eq!(object.retain_count(), 2);
/// assert!(object.is_equal(&other));
/// ```
#[repr(C)]
pub struct Object {
    class: &'static Class,
    interface: &'static ObjectInterface,
    retain_count: AtomicUsize,
}

// SAFETY: Object is repr(C) and is its own root record.
unsafe impl ObjectType for Object {
    fn class() -> &'static Class {
        static CLASS: ClassCell = ClassCell::new();
        // SAFETY: the root table holds only the root defaults.
        CLASS.get_or_init(|| unsafe { ClassDef::root::<Object>("Object", |_| {}) })
    }

    fn as_object(&self) -> &Object {
        self
    }
}

impl Object {
    /// Builds the root record for a fresh allocation of `class`.
    fn header(class: &'static Class) -> Object {
        Object {
            class,
            interface: class.interface(),
            retain_count: AtomicUsize::new(1),
        }
    }

    /// Creates a bare instance of the root class.
    #[must_use]
    pub fn new() -> Id<Object> {
        Alloc::<Object>::new().init(|object| object)
    }

    /// Returns the instance's class.
    ///
    /// Named apart from [`ObjectType::class`], which answers for a type
    /// rather than an instance.
    #[must_use]
    pub fn get_class(&self) -> &'static Class {
        self.class
    }

    /// Returns the dispatch table calls on this instance resolve against.
    #[must_use]
    pub fn interface(&self) -> &'static ObjectInterface {
        self.interface
    }

    /// Returns the current retain count.
    ///
    /// Other threads may change it concurrently; useful for tests and
    /// diagnostics only.
    #[must_use]
    pub fn retain_count(&self) -> usize {
        self.retain_count.load(Ordering::Acquire)
    }

    /// Retains the instance, returning a new owning handle to it.
    #[must_use]
    pub fn retain(&self) -> Id<Object> {
        Id::retain(self)
    }

    /// Produces an independent copy through the `copy` entry.
    ///
    /// Returns `None` for classes that model non-duplicable resources.
    #[must_use]
    pub fn copy(&self) -> Option<Id<Object>> {
        (self.interface.copy)(self)
    }

    /// Describes the instance through the `description` entry.
    #[must_use]
    pub fn description(&self) -> String {
        (self.interface.description)(self)
    }

    /// Hashes the instance through the `hash` entry.
    #[must_use]
    pub fn hash_code(&self) -> u64 {
        (self.interface.hash)(self)
    }

    /// Compares through the `is_equal` entry of this instance's class.
    #[must_use]
    pub fn is_equal(&self, other: &Object) -> bool {
        (self.interface.is_equal)(self, other)
    }

    /// Returns `true` if the instance's class is `class` or a subclass of it.
    #[must_use]
    pub fn is_kind_of_class(&self, class: &Class) -> bool {
        self.class.is_subclass_of(class)
    }

    /// Views the instance as `T` if its class is `T`'s class or a subclass.
    #[must_use]
    pub fn downcast_ref<T: ObjectType>(&self) -> Option<&T> {
        if self.is_kind_of_class(T::class()) {
            // SAFETY: the class check guarantees the instance begins with `T`.
            Some(unsafe { self.downcast_unchecked() })
        } else {
            None
        }
    }

    /// Views the instance as `T` without checking its class.
    ///
    /// # Safety
    ///
    /// The instance's class must be `T::class()` or one of its subclasses.
    /// Dispatch entries installed by `T`'s class satisfy this by construction.
    /// Debug builds check the class and panic on a mismatch.
    #[must_use]
    pub unsafe fn downcast_unchecked<T: ObjectType>(&self) -> &T {
        debug_assert!(
            self.is_kind_of_class(T::class()),
            "{} is not a kind of {}",
            self.class.name(),
            T::class().name()
        );
        // SAFETY: guaranteed by the caller.
        unsafe { &*ptr::from_ref(self).cast::<T>() }
    }

    fn increment(&self) {
        let old = self.retain_count.fetch_add(1, Ordering::Relaxed);

        if old > MAX_RETAIN_COUNT {
            panic!("Reference count overflow in retain");
        }
    }

    /// Drops one reference; destroys the instance when it was the last.
    ///
    /// # Safety
    ///
    /// `object` must point to a live instance whose count includes the
    /// reference being dropped.
    unsafe fn decrement(object: NonNull<Object>) {
        // SAFETY: live per the caller's contract.
        let record = unsafe { object.as_ref() };

        if record.retain_count.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }

        // Synchronize with every earlier release before tearing down.
        fence(Ordering::Acquire);

        let class = record.class;
        let dealloc = record.interface.dealloc;
        trace!("dealloc <{}@{:p}>", class.name(), object);

        // SAFETY: the count reached zero exactly once; no other reference
        // remains. The memory was allocated with this class's layout.
        unsafe {
            dealloc(object);
            alloc::dealloc(object.as_ptr().cast::<u8>(), class.layout());
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class.name())
            .field("retain_count", &self.retain_count())
            .finish()
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

fn root_copy(object: &Object) -> Option<Id<Object>> {
    let class = object.get_class();

    // Only payload-free instances can be duplicated generically.
    if class.layout() == Layout::new::<Object>() {
        Some(Alloc::<Object>::with_class(class).init(|header| header))
    } else {
        None
    }
}

unsafe fn root_dealloc(_object: NonNull<Object>) {}

fn root_description(object: &Object) -> String {
    format!("<{}@{:p}>", object.get_class().name(), ptr::from_ref(object))
}

fn root_hash(object: &Object) -> u64 {
    ptr::from_ref(object).addr() as u64
}

fn root_is_equal(object: &Object, other: &Object) -> bool {
    ptr::eq(object, other)
}

/// Increments `object`'s retain count and returns it.
///
/// A null pointer is ignored and returned unchanged.
///
/// # Safety
///
/// `object` must be null or point to a live instance.
pub unsafe fn retain(object: *const Object) -> *const Object {
    // SAFETY: null or live per the caller's contract.
    if let Some(record) = unsafe { object.as_ref() } {
        record.increment();
    }
    object
}

/// Decrements `object`'s retain count, destroying it when it reaches zero.
///
/// A null pointer is ignored. Releasing an instance whose count already
/// reached zero is undefined behavior.
///
/// # Safety
///
/// `object` must be null or point to a live instance, and the caller must own
/// one of its references, obtained from [`retain`], [`Id::into_raw`], or a
/// fresh allocation.
pub unsafe fn release(object: *const Object) {
    if let Some(object) = NonNull::new(object.cast_mut()) {
        // SAFETY: forwarded from the caller.
        unsafe { Object::decrement(object) }
    }
}

/// Reserved, not yet constructed memory for one instance.
///
/// Created by [`Alloc::new`] or [`Alloc::with_class`], consumed by
/// [`init`](Alloc::init) or [`try_init`](Alloc::try_init). The builder closure
/// receives the prepared root record (class, dispatch table, count of one) and
/// returns the complete instance; superclass construction composes by calling
/// the superclass's field builder with that record.
///
/// Dropping an `Alloc`, or failing `try_init`, frees the memory without
/// running any `dealloc` entry: the instance never existed.
///
/// # Example
///
/// ```rust
/// use objkit::runtime::{Alloc, Object, ObjectType};
///
/// let object = Alloc::<Object>::new().init(|header| header);
/// assert_eq!(object.retain_count(), 1);
///
/// let failed = Alloc::<Object>::new().try_init(|_| None);
/// assert!(failed.is_none());
/// ```
pub struct Alloc<T: ObjectType> {
    ptr: NonNull<T>,
    class: &'static Class,
}

impl<T: ObjectType> Alloc<T> {
    /// Reserves zeroed memory for an instance of `T::class()`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_class(T::class())
    }

    /// Reserves zeroed memory for an instance of `class`, laid out as `T`.
    ///
    /// # Panics
    ///
    /// Panics if `class` is not `T::class()` or a subclass of it, or if its
    /// instance layout is not `T`'s.
    #[must_use]
    pub fn with_class(class: &'static Class) -> Self {
        assert!(
            class.is_subclass_of(T::class()),
            "Alloc::with_class: {} is not a kind of {}",
            class.name(),
            T::class().name()
        );

        let layout = Layout::new::<T>();
        assert_eq!(
            class.layout(),
            layout,
            "Alloc::with_class: instance layout of {} does not match its Rust type",
            class.name()
        );

        // SAFETY: the layout embeds the root record, so it is not zero-sized.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw.cast::<T>()) else {
            alloc::handle_alloc_error(layout)
        };

        Alloc { ptr, class }
    }

    /// Returns the class the memory was reserved for.
    #[must_use]
    pub fn class(&self) -> &'static Class {
        self.class
    }

    /// Completes construction.
    pub fn init<F>(self, build: F) -> Id<T>
    where
        F: FnOnce(Object) -> T,
    {
        let value = build(Object::header(self.class));
        self.finish(value)
    }

    /// Completes construction, or frees the memory if `build` fails.
    ///
    /// A `None` result means the instance was never constructed; there is
    /// nothing to release.
    pub fn try_init<F>(self, build: F) -> Option<Id<T>>
    where
        F: FnOnce(Object) -> Option<T>,
    {
        match build(Object::header(self.class)) {
            Some(value) => Some(self.finish(value)),
            None => {
                debug!("construction of {} instance failed", self.class.name());
                None
            }
        }
    }

    fn finish(self, value: T) -> Id<T> {
        assert!(
            ptr::eq(value.as_object().class, self.class),
            "Alloc::init: instance built from another allocation's root record"
        );

        let ptr = self.ptr;
        mem::forget(self);

        // SAFETY: ptr is a fresh allocation with T's layout, now initialized
        // and owned by the returned handle.
        unsafe {
            ptr.as_ptr().write(value);
            Id::from_raw(ptr)
        }
    }
}

impl<T: ObjectType> Drop for Alloc<T> {
    fn drop(&mut self) {
        // SAFETY: never initialized; allocated with T's layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr().cast::<u8>(), Layout::new::<T>()) }
    }
}

/// Owning, reference-counted handle to an instance.
///
/// `Clone` retains and `Drop` releases, so the instance lives as long as any
/// handle does. Handles compare and hash through the instance's `is_equal`
/// and `hash` entries.
///
/// # Example
///
/// ```rust
/// use objkit::runtime::{Id, Lock, Object, ObjectType};
///
/// let lock = Lock::new();
/// let object: Id<Object> = Id::into_object(lock.clone());
/// assert_eq!(object.retain_count(), 2);
///
/// let lock_again = Id::downcast::<Lock>(object).unwrap();
/// assert!(Id::ptr_eq(&lock, &lock_again));
/// ```
pub struct Id<T: ObjectType> {
    ptr: NonNull<T>,
    marker: PhantomData<T>,
}

// SAFETY: the count is atomic and T: Send + Sync.
unsafe impl<T: ObjectType> Send for Id<T> {}
// SAFETY: shared access only hands out &T, and T: Sync.
unsafe impl<T: ObjectType> Sync for Id<T> {}

impl<T: ObjectType> Id<T> {
    /// Retains `object` and returns a handle owning the new reference.
    #[must_use]
    pub fn retain(object: &T) -> Self {
        object.as_object().increment();
        Id {
            ptr: NonNull::from(object),
            marker: PhantomData,
        }
    }

    /// Takes ownership of one reference held through a raw pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live instance of `T` (or a subclass) and the
    /// caller must own one reference, which moves into the handle.
    #[must_use]
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        Id {
            ptr,
            marker: PhantomData,
        }
    }

    /// Gives up the handle without releasing; the caller owns the reference.
    #[must_use]
    pub fn into_raw(this: Self) -> NonNull<T> {
        let ptr = this.ptr;
        mem::forget(this);
        ptr
    }

    /// Returns the instance pointer without affecting the count.
    #[must_use]
    pub fn as_ptr(this: &Self) -> NonNull<T> {
        this.ptr
    }

    /// Returns `true` if both handles refer to the same instance.
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.ptr == other.ptr
    }

    /// Converts to a handle typed as the root class.
    #[must_use]
    pub fn into_object(this: Self) -> Id<Object> {
        // SAFETY: every instance begins with its root record; the reference
        // moves unchanged.
        unsafe { Id::from_raw(Self::into_raw(this).cast::<Object>()) }
    }

    /// Converts to a handle typed as `U` if the instance is a kind of `U`.
    ///
    /// # Errors
    ///
    /// Returns the original handle if the instance's class does not descend
    /// from `U::class()`.
    pub fn downcast<U: ObjectType>(this: Self) -> Result<Id<U>, Self> {
        if this.as_object().is_kind_of_class(U::class()) {
            // SAFETY: the class check guarantees the instance begins with U.
            Ok(unsafe { Id::from_raw(Self::into_raw(this).cast::<U>()) })
        } else {
            Err(this)
        }
    }
}

impl<T: ObjectType> Deref for Id<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the handle owns a reference, so the instance is live.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ObjectType> Clone for Id<T> {
    fn clone(&self) -> Self {
        Id::retain(&**self)
    }
}

impl<T: ObjectType> Drop for Id<T> {
    fn drop(&mut self) {
        // SAFETY: the handle owns exactly one reference.
        unsafe { Object::decrement(self.ptr.cast::<Object>()) }
    }
}

impl<T: ObjectType> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_object().is_equal(other.as_object())
    }
}

impl<T: ObjectType> Eq for Id<T> {}

impl<T: ObjectType> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.as_object().hash_code());
    }
}

impl<T: ObjectType> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_object(), f)
    }
}

impl<T: ObjectType> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_object().description())
    }
}

impl<T: ObjectType> AsRef<Object> for Id<T> {
    fn as_ref(&self) -> &Object {
        self.as_object()
    }
}
