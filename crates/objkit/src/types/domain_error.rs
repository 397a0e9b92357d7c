//! Error value objects.
//!
//! A [`DomainError`] carries a domain naming the subsystem that failed, a
//! numeric code within that domain, and an optional human-readable message.
//! It is the object-level counterpart of [`crate::error::Error`], meant for
//! code that stores failures in arrays or passes them through dispatch.

use crate::runtime::{Alloc, Class, ClassCell, ClassDef, Id, Object, ObjectInterface, ObjectType};
use fxhash::FxHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::ptr::{self, NonNull};

/// An error described by domain, code, and optional message.
///
/// # Example
///
/// ```rust
/// use objkit::types::DomainError;
///
/// let error = DomainError::new("io", 2, Some("not found")).unwrap();
/// assert_eq!(error.description(), "io: 2: not found");
///
/// assert!(DomainError::new("", 1, None).is_none());
/// ```
#[repr(C)]
pub struct DomainError {
    object: Object,
    domain: String,
    code: i32,
    message: Option<String>,
}

// SAFETY: repr(C) with the root record first; declared with
// ClassDef::new::<DomainError>.
unsafe impl ObjectType for DomainError {
    fn class() -> &'static Class {
        static CLASS: ClassCell = ClassCell::new();
        // SAFETY: the installed entries expect DomainError instances.
        CLASS.get_or_init(|| unsafe {
            ClassDef::new::<DomainError>("DomainError", Object::class(), initialize)
        })
    }
}

fn initialize(interface: &mut ObjectInterface) {
    interface.copy = domain_error_copy;
    interface.dealloc = domain_error_dealloc;
    interface.description = domain_error_description;
    interface.hash = domain_error_hash;
    interface.is_equal = domain_error_is_equal;
}

fn as_domain_error(object: &Object) -> &DomainError {
    // SAFETY: these entries are only installed on DomainError.
    unsafe { object.downcast_unchecked::<DomainError>() }
}

fn domain_error_copy(object: &Object) -> Option<Id<Object>> {
    let error = as_domain_error(object);
    DomainError::new(&error.domain, error.code, error.message.as_deref()).map(Id::into_object)
}

unsafe fn domain_error_dealloc(object: NonNull<Object>) {
    let error = object.cast::<DomainError>().as_ptr();

    // SAFETY: called once at a zero count; the strings are initialized and
    // not touched again.
    unsafe {
        ptr::drop_in_place(ptr::addr_of_mut!((*error).domain));
        ptr::drop_in_place(ptr::addr_of_mut!((*error).message));
        (DomainError::class().superclass_interface().dealloc)(object);
    }
}

fn domain_error_description(object: &Object) -> String {
    let error = as_domain_error(object);
    match &error.message {
        Some(message) => format!("{}: {}: {}", error.domain, error.code, message),
        None => format!("{}: {}", error.domain, error.code),
    }
}

fn domain_error_hash(object: &Object) -> u64 {
    let error = as_domain_error(object);
    let mut hasher = FxHasher::default();
    error.code.hash(&mut hasher);
    error.domain.hash(&mut hasher);
    error.message.hash(&mut hasher);
    hasher.finish()
}

fn domain_error_is_equal(object: &Object, other: &Object) -> bool {
    if ptr::eq(object, other) {
        return true;
    }

    if !ptr::eq(object.get_class(), other.get_class()) {
        return false;
    }

    let this = as_domain_error(object);
    let that = as_domain_error(other);
    this.code == that.code && this.domain == that.domain && this.message == that.message
}

impl DomainError {
    /// Creates an error, or `None` if `domain` is empty.
    #[must_use]
    pub fn new(domain: &str, code: i32, message: Option<&str>) -> Option<Id<DomainError>> {
        Self::init_with_domain(Alloc::new(), domain, code, message)
    }

    /// Completes construction of an error in `alloc`.
    ///
    /// Fails, freeing `alloc`, if `domain` is empty.
    pub fn init_with_domain(
        alloc: Alloc<DomainError>,
        domain: &str,
        code: i32,
        message: Option<&str>,
    ) -> Option<Id<DomainError>> {
        alloc.try_init(|object| {
            if domain.is_empty() {
                return None;
            }

            Some(DomainError {
                object,
                domain: domain.to_string(),
                code,
                message: message.map(str::to_string),
            })
        })
    }

    /// Returns the domain.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns the code within the domain.
    #[must_use]
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Returns the message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl Deref for DomainError {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.object
    }
}

impl fmt::Debug for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainError")
            .field("domain", &self.domain)
            .field("code", &self.code)
            .field("message", &self.message)
            .finish()
    }
}
