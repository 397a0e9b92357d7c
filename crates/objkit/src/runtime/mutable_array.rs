//! Growable, sortable array.
//!
//! [`MutableArray`] is the `Array` subclass that supports in-place mutation.
//! Capacity grows in fixed chunks of [`ARRAY_CHUNK_SIZE`] slots and never
//! shrinks. Every slot holds exactly one retained reference: storing retains,
//! removing or overwriting releases the previous occupant once. Releases
//! happen after the storage lock is dropped, so a deallocation that reaches
//! back into the array cannot deadlock.

use crate::runtime::array::{Array, Store, out_of_bounds};
use crate::runtime::class::{Class, ClassCell, ClassDef};
use crate::runtime::object::{Alloc, Id, Object, ObjectInterface, ObjectType};
use objkit_log::trace;
use std::cmp::Ordering;
use std::fmt;
use std::mem;
use std::ops::Deref;

/// Number of slots added each time a full array grows.
pub const ARRAY_CHUNK_SIZE: usize = 64;

/// An ordered collection of retained objects supporting mutation.
///
/// # Example
///
/// ```rust
/// use objkit::runtime::{MutableArray, Object};
///
/// let array = MutableArray::new();
/// let a = Object::new();
/// let b = Object::new();
///
/// array.add_object(&a);
/// array.insert_object_at_index(&b, 0);
/// assert_eq!(array.index_of_object(&a), Some(1));
///
/// array.remove_all_objects();
/// assert!(array.is_empty());
/// assert_eq!(a.retain_count(), 1);
/// ```
#[repr(C)]
pub struct MutableArray {
    array: Array,
}

// SAFETY: repr(C) with the Array instance first; declared with
// ClassDef::new::<MutableArray>.
unsafe impl ObjectType for MutableArray {
    fn class() -> &'static Class {
        static CLASS: ClassCell = ClassCell::new();
        // SAFETY: MutableArray embeds Array first; `copy` reads it as Array.
        CLASS.get_or_init(|| unsafe {
            ClassDef::new::<MutableArray>("MutableArray", Array::class(), initialize)
        })
    }
}

fn initialize(interface: &mut ObjectInterface) {
    // Storage teardown, description, hash, and equality are inherited.
    interface.copy = mutable_array_copy;
}

fn mutable_array_copy(object: &Object) -> Option<Id<Object>> {
    // SAFETY: only installed on MutableArray and its subclasses.
    let array = unsafe { object.downcast_unchecked::<Array>() };
    Some(Id::into_object(array.mutable_copy()))
}

impl Store {
    /// Makes room for one more slot, growing by a whole chunk when full.
    fn reserve_slot(&mut self) {
        if self.elements.len() < self.capacity {
            return;
        }

        self.capacity += ARRAY_CHUNK_SIZE;
        self.elements
            .reserve_exact(self.capacity - self.elements.len());
        trace!("array grew to capacity {}", self.capacity);
    }
}

impl MutableArray {
    /// Creates an empty array with no reserved slots.
    #[must_use]
    pub fn new() -> Id<MutableArray> {
        Self::init(Alloc::new())
    }

    /// Creates an empty array with room for `capacity` elements.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Id<MutableArray> {
        Self::init_with_capacity(Alloc::new(), capacity)
    }

    /// Completes construction of an empty array in `alloc`.
    pub fn init(alloc: Alloc<MutableArray>) -> Id<MutableArray> {
        Self::init_with_capacity(alloc, 0)
    }

    /// Completes construction of an empty array in `alloc` with room for
    /// `capacity` elements.
    pub fn init_with_capacity(alloc: Alloc<MutableArray>, capacity: usize) -> Id<MutableArray> {
        alloc.init(|object| MutableArray {
            array: Array::with_store(
                object,
                Store::with_elements(Vec::with_capacity(capacity), capacity),
            ),
        })
    }

    /// Returns the number of slots available before the next growth.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.store.read().capacity
    }

    /// Appends `object`, retaining it.
    pub fn add_object(&self, object: &Object) {
        let element = object.retain();
        let mut store = self.store.write();
        store.reserve_slot();
        store.elements.push(element);
    }

    /// Appends each of `objects` in order.
    pub fn add_objects<'a, I>(&self, objects: I)
    where
        I: IntoIterator<Item = &'a Object>,
    {
        for object in objects {
            self.add_object(object);
        }
    }

    /// Appends every element of `array` in order.
    ///
    /// `array` may be this array; its elements as of the call are appended
    /// once.
    pub fn add_objects_from_array(&self, array: &Array) {
        let elements = array.objects();
        self.add_objects(elements.iter().map(|element| &**element));
    }

    /// Inserts `object` at `index`, shifting later elements up by one.
    ///
    /// `index == count` appends.
    ///
    /// # Panics
    ///
    /// Panics if `index > count`.
    pub fn insert_object_at_index(&self, object: &Object, index: usize) {
        let element = object.retain();
        let mut store = self.store.write();

        let count = store.elements.len();
        if index > count {
            drop(store);
            out_of_bounds("insert_object_at_index", index, count);
        }

        // Append, then rotate into place: the only retain is `element`.
        store.reserve_slot();
        store.elements.push(element);
        store.elements[index..].rotate_right(1);
    }

    /// Removes and releases the element at `index`, shifting later elements
    /// down by one.
    ///
    /// # Panics
    ///
    /// Panics if `index >= count`.
    pub fn remove_object_at_index(&self, index: usize) {
        let removed = {
            let mut store = self.store.write();
            let count = store.elements.len();
            if index >= count {
                drop(store);
                out_of_bounds("remove_object_at_index", index, count);
            }
            store.elements.remove(index)
        };
        drop(removed);
    }

    /// Removes the first element equal to `object`, if any.
    pub fn remove_object(&self, object: &Object) {
        if let Some(index) = self.index_of_object(object) {
            self.remove_object_at_index(index);
        }
    }

    /// Removes the last element; does nothing if the array is empty.
    pub fn remove_last_object(&self) {
        let removed = self.store.write().elements.pop();
        drop(removed);
    }

    /// Removes every element, releasing each once. Capacity is kept.
    pub fn remove_all_objects(&self) {
        let mut removed = {
            let mut store = self.store.write();
            let capacity = store.capacity;
            mem::replace(&mut store.elements, Vec::with_capacity(capacity))
        };

        // Last to first.
        while let Some(element) = removed.pop() {
            drop(element);
        }
    }

    /// Removes every element from last to first, calling `f` with each one
    /// just before it is removed.
    pub fn remove_all_objects_with_enumerator<F>(&self, mut f: F)
    where
        F: FnMut(&Array, &Object),
    {
        while let Some(last) = self.last_object() {
            f(self, &last);
            self.remove_last_object();
        }
    }

    /// Replaces the element at `index` with `object`.
    ///
    /// `object` is retained before the previous occupant is released, so
    /// storing an element into its own slot is safe.
    ///
    /// # Panics
    ///
    /// Panics if `index >= count`.
    pub fn set_object_at_index(&self, object: &Object, index: usize) {
        let element = object.retain();
        let previous = {
            let mut store = self.store.write();
            let count = store.elements.len();
            if index >= count {
                drop(store);
                out_of_bounds("set_object_at_index", index, count);
            }
            mem::replace(&mut store.elements[index], element)
        };
        drop(previous);
    }

    /// Keeps only the elements for which `predicate` returns `true`.
    ///
    /// `predicate` is called exactly once per element, first to last.
    pub fn filter<F>(&self, mut predicate: F)
    where
        F: FnMut(&Object) -> bool,
    {
        let mut index = 0;
        loop {
            let Some(element) = self.store.read().elements.get(index).cloned() else {
                break;
            };

            if predicate(&element) {
                index += 1;
            } else {
                // The next element shifts into `index`; retry it.
                self.remove_object_at_index(index);
            }
        }
    }

    /// Sorts the elements in place with `comparator`.
    ///
    /// The sort is not stable. `comparator` must be a consistent total
    /// order for the duration of the call. It runs on a retained snapshot, so
    /// the array keeps its contents while sorting and is left unchanged if
    /// `comparator` panics. Elements appended meanwhile stay after the sorted
    /// ones.
    pub fn sort<F>(&self, mut comparator: F)
    where
        F: FnMut(&Object, &Object) -> Ordering,
    {
        let mut sorted = self.objects();
        let sorted_len = sorted.len();
        sorted.sort_unstable_by(|a, b| comparator(a, b));

        let previous = {
            let mut store = self.store.write();
            if store.elements.len() > sorted_len {
                sorted.extend(store.elements.drain(sorted_len..));
            }
            mem::replace(&mut store.elements, sorted)
        };
        drop(previous);
    }
}

impl Deref for MutableArray {
    type Target = Array;

    fn deref(&self) -> &Array {
        &self.array
    }
}

impl fmt::Debug for MutableArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.array, f)
    }
}
