// Common test utilities for integration tests
//
// This module provides shared test classes for use across all integration
// tests: a numeric value class and a two-level hierarchy that records its
// deallocation chain.

#![allow(dead_code)]

use objkit::runtime::{
    Alloc, Class, ClassCell, ClassDef, Id, Object, ObjectInterface, ObjectType,
};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::ops::Deref;
use std::ptr::{self, NonNull};

// ============================================================================
// Number
// ============================================================================

/// Integer value class with value equality.
#[repr(C)]
pub struct Number {
    object: Object,
    value: i64,
}

unsafe impl ObjectType for Number {
    fn class() -> &'static Class {
        static CLASS: ClassCell = ClassCell::new();
        CLASS.get_or_init(|| unsafe {
            ClassDef::new::<Number>("TestNumber", Object::class(), |interface| {
                interface.copy = number_copy;
                interface.description = number_description;
                interface.hash = number_hash;
                interface.is_equal = number_is_equal;
            })
        })
    }
}

fn number_copy(object: &Object) -> Option<Id<Object>> {
    Some(Id::into_object(Number::new(Number::of(object))))
}

fn number_description(object: &Object) -> String {
    Number::of(object).to_string()
}

fn number_hash(object: &Object) -> u64 {
    Number::of(object) as u64
}

fn number_is_equal(object: &Object, other: &Object) -> bool {
    other
        .downcast_ref::<Number>()
        .is_some_and(|other| other.value == Number::of(object))
}

impl Number {
    pub fn new(value: i64) -> Id<Number> {
        Alloc::<Number>::new().init(|object| Number { object, value })
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    /// Value of an object known to be a `Number`.
    pub fn of(object: &Object) -> i64 {
        object
            .downcast_ref::<Number>()
            .expect("expected a Number")
            .value
    }
}

impl Deref for Number {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.object
    }
}

/// Ascending numeric comparator.
pub fn ascending(a: &Object, b: &Object) -> Ordering {
    Number::of(a).cmp(&Number::of(b))
}

/// Creates one `Number` per value.
pub fn numbers(values: &[i64]) -> Vec<Id<Number>> {
    values.iter().map(|&value| Number::new(value)).collect()
}

/// Reads an array's elements back as integers.
pub fn values(array: &objkit::runtime::Array) -> Vec<i64> {
    array
        .objects()
        .iter()
        .map(|element| Number::of(element))
        .collect()
}

// ============================================================================
// Tracked hierarchy
// ============================================================================

thread_local! {
    static DEALLOCS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Returns and clears the deallocations recorded on this thread.
pub fn take_deallocs() -> Vec<String> {
    DEALLOCS.with(|log| std::mem::take(&mut *log.borrow_mut()))
}

fn record(entry: String) {
    DEALLOCS.with(|log| log.borrow_mut().push(entry));
}

/// Base class that records its deallocation.
#[repr(C)]
pub struct Tracked {
    object: Object,
    pub label: String,
}

/// Subclass that records its own deallocation, then chains to `Tracked`.
#[repr(C)]
pub struct TrackedChild {
    tracked: Tracked,
    pub tag: u32,
}

unsafe impl ObjectType for Tracked {
    fn class() -> &'static Class {
        static CLASS: ClassCell = ClassCell::new();
        CLASS.get_or_init(|| unsafe {
            ClassDef::new::<Tracked>("TestTracked", Object::class(), |interface| {
                interface.dealloc = tracked_dealloc;
                interface.description = tracked_description;
            })
        })
    }
}

unsafe impl ObjectType for TrackedChild {
    fn class() -> &'static Class {
        static CLASS: ClassCell = ClassCell::new();
        CLASS.get_or_init(|| unsafe {
            ClassDef::new::<TrackedChild>("TestTrackedChild", Tracked::class(), |interface| {
                interface.dealloc = tracked_child_dealloc;
                interface.description = tracked_child_description;
            })
        })
    }
}

unsafe fn tracked_dealloc(object: NonNull<Object>) {
    let this = object.cast::<Tracked>().as_ptr();
    unsafe {
        record(format!("Tracked({})", (*this).label));
        ptr::drop_in_place(ptr::addr_of_mut!((*this).label));
        (Tracked::class().superclass_interface().dealloc)(object);
    }
}

unsafe fn tracked_child_dealloc(object: NonNull<Object>) {
    let this = object.cast::<TrackedChild>().as_ptr();
    unsafe {
        record(format!("TrackedChild({})", (*this).tag));
        (TrackedChild::class().superclass_interface().dealloc)(object);
    }
}

fn tracked_description(object: &Object) -> String {
    format!("tracked {}", object.downcast_ref::<Tracked>().unwrap().label)
}

fn tracked_child_description(object: &Object) -> String {
    let child = object.downcast_ref::<TrackedChild>().unwrap();
    // Explicit super call.
    let inherited = (TrackedChild::class().superclass_interface().description)(object);
    format!("{inherited} #{}", child.tag)
}

impl Tracked {
    pub fn new(label: &str) -> Id<Tracked> {
        Alloc::<Tracked>::new().init(|object| Tracked {
            object,
            label: label.to_string(),
        })
    }
}

impl TrackedChild {
    pub fn new(label: &str, tag: u32) -> Id<TrackedChild> {
        Alloc::<TrackedChild>::new().init(|object| TrackedChild {
            tracked: Tracked {
                object,
                label: label.to_string(),
            },
            tag,
        })
    }
}

impl Deref for Tracked {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.object
    }
}

impl Deref for TrackedChild {
    type Target = Tracked;

    fn deref(&self) -> &Tracked {
        &self.tracked
    }
}
