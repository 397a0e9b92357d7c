//! `objkit`: a minimal reference-counted object runtime.
//!
//! `objkit` provides the plumbing for class-based objects in Rust:
//!
//! - **Classes** registered once, lazily and thread-safely, with single
//!   inheritance
//! - **Dispatch tables** inherited by copy and edited per class, resolved
//!   through the instance at call time
//! - **Reference counting** with atomic retain/release and a deallocation
//!   chain that walks from the most-derived class to the root
//! - **Concurrency primitives**: a run-exactly-once gate and a lock object
//! - **Collections**: reference-counted `Array` and `MutableArray`
//!
//! # Architecture
//!
//! - [`runtime`]: the core (gate, classes, objects, lock, arrays)
//! - [`types`]: value classes built on the core (`Boole`, `DomainError`)
//! - [`error`]: recoverable errors from class declaration
//!
//! # Example
//!
//! ```rust
//! use objkit::runtime::{self, MutableArray, Object};
//! use objkit::types::Boole;
//!
//! runtime::init();
//!
//! let array = MutableArray::new();
//! array.add_object(&Boole::true_value());
//! array.add_object(&Object::new());
//! assert_eq!(array.count(), 2);
//!
//! array.filter(|element| element.downcast_ref::<Boole>().is_some());
//! assert_eq!(array.description(), "[true]");
//! ```

pub mod error;
pub mod runtime;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use runtime::{Array, Class, ClassDef, Id, Lock, MutableArray, Object, ObjectType, Once};
pub use types::{Boole, DomainError};
