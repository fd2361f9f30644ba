//! Hashing primitives for the cask blob store.
//!
//! A store is parameterised by a [`HashAlgorithm`], which fixes the digest
//! size of every key it produces and hands out fresh [`ContentHasher`]
//! accumulators for streaming writes and verified reads.
//!
//! All digests wrap established libraries — no custom cryptography.

pub mod hasher;

pub use hasher::{ContentHasher, HashAlgorithm, HasherError};
