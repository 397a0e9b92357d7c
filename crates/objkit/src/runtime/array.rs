//! Reference-counted ordered array of objects.
//!
//! [`Array`] owns one retained reference per slot and releases every slot
//! when it is deallocated. Its contents are fixed after construction; the
//! [`MutableArray`] subclass adds in-place mutation and shares this instance
//! layout.
//!
//! # Locking
//!
//! Slots live behind a `parking_lot::RwLock` so mutation through shared
//! handles stays memory-safe. Element callbacks (`is_equal`, `description`,
//! predicates, comparators, enumerators) always run on a snapshot with the
//! lock released, so they may freely call back into the same array. Callers
//! that mutate one array from several threads must still serialize those
//! mutations themselves if they need a consistent order.

use crate::runtime::class::{Class, ClassCell, ClassDef};
use crate::runtime::mutable_array::MutableArray;
use crate::runtime::object::{Alloc, Id, Object, ObjectInterface, ObjectType};
use fxhash::FxHasher;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::fmt;
use std::hash::Hasher;
use std::ops::Deref;
use std::ptr::{self, NonNull};

/// Slot storage shared by `Array` and `MutableArray`.
pub(super) struct Store {
    pub(super) elements: Vec<Id<Object>>,
    /// Logical capacity; only ever grows.
    pub(super) capacity: usize,
}

impl Store {
    pub(super) fn with_elements(elements: Vec<Id<Object>>, capacity: usize) -> Self {
        debug_assert!(capacity >= elements.len());
        Store { elements, capacity }
    }
}

/// An ordered collection of retained objects.
///
/// # Example
///
/// ```rust
/// use objkit::runtime::{Array, Object};
///
/// let a = Object::new();
/// let b = Object::new();
/// let array = Array::with_objects(&[&*a, &*b]);
///
/// assert_eq!(array.count(), 2);
/// assert_eq!(a.retain_count(), 2);
/// assert_eq!(array.index_of_object(&b), Some(1));
///
/// drop(array);
/// assert_eq!(a.retain_count(), 1);
/// ```
#[repr(C)]
pub struct Array {
    object: Object,
    pub(super) store: RwLock<Store>,
}

// SAFETY: repr(C) with the root record first; declared with ClassDef::new::<Array>.
unsafe impl ObjectType for Array {
    fn class() -> &'static Class {
        static CLASS: ClassCell = ClassCell::new();
        // SAFETY: the installed entries expect Array instances.
        CLASS.get_or_init(|| unsafe {
            ClassDef::new::<Array>("Array", Object::class(), initialize)
        })
    }
}

fn initialize(interface: &mut ObjectInterface) {
    interface.copy = array_copy;
    interface.dealloc = array_dealloc;
    interface.description = array_description;
    interface.hash = array_hash;
    interface.is_equal = array_is_equal;
}

fn as_array(object: &Object) -> &Array {
    // SAFETY: these entries are only installed on Array and its subclasses.
    unsafe { object.downcast_unchecked::<Array>() }
}

fn array_copy(object: &Object) -> Option<Id<Object>> {
    let array = as_array(object);
    Some(Id::into_object(Array::with_array(array)))
}

unsafe fn array_dealloc(object: NonNull<Object>) {
    let array = object.cast::<Array>().as_ptr();

    // SAFETY: called once at a zero count; the store is initialized and is
    // not touched again. Dropping it releases every slot.
    unsafe {
        ptr::drop_in_place(ptr::addr_of_mut!((*array).store));
        (Array::class().superclass_interface().dealloc)(object);
    }
}

fn array_description(object: &Object) -> String {
    let elements = as_array(object).objects();
    let parts: Vec<String> = elements.iter().map(|element| element.description()).collect();
    format!("[{}]", parts.join(", "))
}

fn array_hash(object: &Object) -> u64 {
    let elements = as_array(object).objects();
    let mut hasher = FxHasher::default();
    hasher.write_usize(elements.len());
    for element in &elements {
        hasher.write_u64(element.hash_code());
    }
    hasher.finish()
}

fn array_is_equal(object: &Object, other: &Object) -> bool {
    if ptr::eq(object, other) {
        return true;
    }

    let Some(other) = other.downcast_ref::<Array>() else {
        return false;
    };

    let lhs = as_array(object).objects();
    let rhs = other.objects();
    lhs.len() == rhs.len() && lhs.iter().zip(&rhs).all(|(a, b)| a.is_equal(b))
}

impl Array {
    pub(super) fn with_store(object: Object, store: Store) -> Array {
        Array {
            object,
            store: RwLock::new(store),
        }
    }

    /// Creates an empty array.
    #[must_use]
    pub fn new() -> Id<Array> {
        Self::init_with_objects(Alloc::new(), &[])
    }

    /// Creates an array retaining each of `objects`, in order.
    #[must_use]
    pub fn with_objects(objects: &[&Object]) -> Id<Array> {
        Self::init_with_objects(Alloc::new(), objects)
    }

    /// Creates an array retaining every element of `array`, in order.
    #[must_use]
    pub fn with_array(array: &Array) -> Id<Array> {
        let elements = array.objects();
        let capacity = elements.len();
        Alloc::<Array>::new().init(|object| {
            Array::with_store(object, Store::with_elements(elements, capacity))
        })
    }

    /// Completes construction of an array in `alloc` holding `objects`.
    pub fn init_with_objects(alloc: Alloc<Array>, objects: &[&Object]) -> Id<Array> {
        let elements: Vec<Id<Object>> = objects.iter().map(|object| object.retain()).collect();
        let capacity = elements.len();
        alloc.init(|object| Array::with_store(object, Store::with_elements(elements, capacity)))
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn count(&self) -> usize {
        self.store.read().elements.len()
    }

    /// Returns `true` if the array has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.read().elements.is_empty()
    }

    /// Returns the element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn object_at_index(&self, index: usize) -> Id<Object> {
        let store = self.store.read();
        match store.elements.get(index) {
            Some(element) => element.clone(),
            None => out_of_bounds("object_at_index", index, store.elements.len()),
        }
    }

    /// Returns the first element, or `None` if the array is empty.
    #[must_use]
    pub fn first_object(&self) -> Option<Id<Object>> {
        self.store.read().elements.first().cloned()
    }

    /// Returns the last element, or `None` if the array is empty.
    #[must_use]
    pub fn last_object(&self) -> Option<Id<Object>> {
        self.store.read().elements.last().cloned()
    }

    /// Returns the index of the first element equal to `object`.
    #[must_use]
    pub fn index_of_object(&self, object: &Object) -> Option<usize> {
        self.objects()
            .iter()
            .position(|element| element.is_equal(object))
    }

    /// Returns `true` if some element is equal to `object`.
    #[must_use]
    pub fn contains_object(&self, object: &Object) -> bool {
        self.index_of_object(object).is_some()
    }

    /// Returns a retained snapshot of the elements.
    #[must_use]
    pub fn objects(&self) -> Vec<Id<Object>> {
        self.store.read().elements.clone()
    }

    /// Calls `f` with each element, first to last.
    ///
    /// Iterates over a snapshot taken on entry.
    pub fn enumerate_objects<F>(&self, mut f: F)
    where
        F: FnMut(&Array, &Object),
    {
        for element in self.objects() {
            f(self, &element);
        }
    }

    /// Returns a new mutable array holding the elements for which
    /// `predicate` returns `true`.
    #[must_use]
    pub fn filtered_array<F>(&self, predicate: F) -> Id<MutableArray>
    where
        F: FnMut(&Object) -> bool,
    {
        let result = self.mutable_copy();
        result.filter(predicate);
        result
    }

    /// Returns a new mutable array holding the elements ordered by
    /// `comparator`.
    #[must_use]
    pub fn sorted_array<F>(&self, comparator: F) -> Id<MutableArray>
    where
        F: FnMut(&Object, &Object) -> Ordering,
    {
        let result = self.mutable_copy();
        result.sort(comparator);
        result
    }

    /// Returns a new mutable array sized to and holding this array's
    /// elements.
    #[must_use]
    pub fn mutable_copy(&self) -> Id<MutableArray> {
        let elements = self.objects();
        let result = MutableArray::with_capacity(elements.len());
        result.add_objects(elements.iter().map(|element| &**element));
        result
    }
}

impl Deref for Array {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.object
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.objects().iter()).finish()
    }
}

#[cold]
#[track_caller]
pub(super) fn out_of_bounds(operation: &str, index: usize, count: usize) -> ! {
    panic!("{operation}: index {index} out of bounds for array of count {count}")
}
