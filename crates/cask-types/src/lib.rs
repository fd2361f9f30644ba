//! Foundation types for the cask content-addressed blob store.
//!
//! Every blob in a cask store is identified by a [`Key`]: the digest of its
//! bytes under the store's configured hash algorithm. Keys carry no length
//! of their own; whether a key is the right size for a given algorithm is
//! checked by the store that consumes it.

pub mod error;
pub mod key;

pub use error::TypeError;
pub use key::Key;
