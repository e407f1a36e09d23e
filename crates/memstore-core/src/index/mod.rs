//! Memory index port.
//!
//! `db` holds the `MemoryDb` trait; `name` holds the logical index-name rule
//! shared by every backend.

pub mod db;
pub mod name;
