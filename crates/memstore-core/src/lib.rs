//! Port traits for memstore.
//!
//! This crate defines the `MemoryDb` trait that storage backends implement,
//! plus backend-independent rules such as index-name normalization. It
//! depends only on `memstore-types` -- never on `memstore-infra` or any
//! database crate.

pub mod index;
