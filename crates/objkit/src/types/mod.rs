//! Value classes built on the runtime.
//!
//! These are ordinary consumers of [`crate::runtime`]: each declares a class,
//! overrides a few dispatch entries, and relies on the runtime for
//! allocation, reference counting, and collection storage.

pub mod boole;
pub mod domain_error;

pub use boole::Boole;
pub use domain_error::DomainError;
