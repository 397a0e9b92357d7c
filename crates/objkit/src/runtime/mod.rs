//! Core runtime: classes, objects, dispatch, and reference counting.
//!
//! Layered leaves first:
//! - [`once`]: run-exactly-once gate
//! - [`class`]: class descriptors and the global registry
//! - [`object`]: root record, dispatch table, allocation, retain/release
//! - [`lock`]: mutual-exclusion lock object
//! - [`array`] / [`mutable_array`]: reference-counted containers

pub mod array;
pub mod class;
pub mod lock;
pub mod mutable_array;
pub mod object;
pub mod once;

pub use array::Array;
pub use class::{Ancestors, Class, ClassCell, ClassDef, Initializer};
pub use lock::Lock;
pub use mutable_array::{ARRAY_CHUNK_SIZE, MutableArray};
pub use object::{
    Alloc, CopyFn, DeallocFn, DescriptionFn, HashFn, Id, IsEqualFn, Object, ObjectInterface,
    ObjectType, release, retain,
};
pub use once::Once;

use crate::types::{Boole, DomainError};
use objkit_log::info;

static STARTUP: Once = Once::new();

/// Performs process-wide startup once.
///
/// Applies the log level from the `OBJKIT_LOG` environment variable and
/// registers every built-in class. Calling it is optional: class accessors
/// register lazily on first use either way. Later calls return immediately.
pub fn init() {
    STARTUP.call_once(|| {
        let level = objkit_log::init_from_env();

        let classes = [
            Object::class(),
            Lock::class(),
            Array::class(),
            MutableArray::class(),
            Boole::class(),
            DomainError::class(),
        ];

        info!(
            "runtime ready: {} built-in classes, log level {}",
            classes.len(),
            level
        );
    });
}
