//! Boolean wrapper objects.
//!
//! There are exactly two `Boole` instances, `true` and `false`, created on
//! first use and never deallocated.

use crate::runtime::{Alloc, Class, ClassCell, ClassDef, Id, Object, ObjectInterface, ObjectType};
use std::fmt;
use std::ops::Deref;
use std::sync::OnceLock;

/// A boolean value usable wherever an object is expected.
///
/// # Example
///
/// ```rust
/// use objkit::runtime::{Id, MutableArray};
/// use objkit::types::Boole;
///
/// let flags = MutableArray::new();
/// flags.add_object(&Boole::true_value());
/// flags.add_object(&Boole::value_of(false));
///
/// assert!(flags.contains_object(&Boole::false_value()));
/// assert_eq!(flags.description(), "[true, false]");
/// assert!(Id::ptr_eq(&Boole::value_of(true), &Boole::true_value()));
/// ```
#[repr(C)]
pub struct Boole {
    object: Object,
    value: bool,
}

// SAFETY: repr(C) with the root record first; declared with ClassDef::new::<Boole>.
unsafe impl ObjectType for Boole {
    fn class() -> &'static Class {
        static CLASS: ClassCell = ClassCell::new();
        // SAFETY: the installed entries expect Boole instances.
        CLASS.get_or_init(|| unsafe {
            ClassDef::new::<Boole>("Boole", Object::class(), initialize)
        })
    }
}

fn initialize(interface: &mut ObjectInterface) {
    interface.copy = boole_copy;
    interface.description = boole_description;
    interface.hash = boole_hash;
    interface.is_equal = boole_is_equal;
}

fn as_boole(object: &Object) -> &Boole {
    // SAFETY: these entries are only installed on Boole.
    unsafe { object.downcast_unchecked::<Boole>() }
}

/// Singletons copy to themselves.
fn boole_copy(object: &Object) -> Option<Id<Object>> {
    Some(object.retain())
}

fn boole_description(object: &Object) -> String {
    as_boole(object).value.to_string()
}

fn boole_hash(object: &Object) -> u64 {
    u64::from(as_boole(object).value)
}

fn boole_is_equal(object: &Object, other: &Object) -> bool {
    other
        .downcast_ref::<Boole>()
        .is_some_and(|other| other.value == as_boole(object).value)
}

static TRUE: OnceLock<Id<Boole>> = OnceLock::new();
static FALSE: OnceLock<Id<Boole>> = OnceLock::new();

impl Boole {
    fn singleton(cell: &'static OnceLock<Id<Boole>>, value: bool) -> Id<Boole> {
        cell.get_or_init(|| Alloc::<Boole>::new().init(|object| Boole { object, value }))
            .clone()
    }

    /// Returns the `true` instance.
    #[must_use]
    pub fn true_value() -> Id<Boole> {
        Self::singleton(&TRUE, true)
    }

    /// Returns the `false` instance.
    #[must_use]
    pub fn false_value() -> Id<Boole> {
        Self::singleton(&FALSE, false)
    }

    /// Returns the instance representing `value`.
    #[must_use]
    pub fn value_of(value: bool) -> Id<Boole> {
        if value {
            Self::true_value()
        } else {
            Self::false_value()
        }
    }

    /// Returns the wrapped value.
    #[must_use]
    pub fn value(&self) -> bool {
        self.value
    }
}

impl Deref for Boole {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.object
    }
}

impl fmt::Debug for Boole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Boole").field(&self.value).finish()
    }
}
