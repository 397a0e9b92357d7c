//! Error types for the `objkit` runtime.
//!
//! Only recoverable conditions live here. Programmer defects (out-of-range
//! indices, lock misuse, reference count overflow) and resource exhaustion
//! abort with a panic instead, because the runtime cannot continue on a
//! corrupted invariant. Failed two-phase construction is reported as an absent
//! value from [`Alloc::try_init`](crate::runtime::Alloc::try_init), not as an
//! error.

use std::fmt;

/// Errors that can occur while declaring classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A class with the same name is already registered.
    ClassAlreadyExists,

    /// Class names must contain at least one character.
    EmptyClassName,

    /// A subclass instance is smaller than its superclass instance, so it
    /// cannot embed the superclass record.
    InstanceTooSmall {
        /// Instance size of the class being declared.
        size: usize,
        /// Instance size of its superclass.
        superclass_size: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ClassAlreadyExists => {
                write!(f, "Class name already exists in registry")
            }
            Error::EmptyClassName => write!(f, "Class name must not be empty"),
            Error::InstanceTooSmall {
                size,
                superclass_size,
            } => write!(
                f,
                "Instance size {size} bytes is smaller than superclass instance size {superclass_size} bytes"
            ),
        }
    }
}

impl std::error::Error for Error {}

/// Result type for `objkit` runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
