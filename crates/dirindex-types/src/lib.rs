//! Types shared by the dirindex crates.
//!
//! This crate has no knowledge of the index engine itself: it only defines
//! the ordering abstraction every index is built from ([`Comparator`]) and the
//! serde-backed configuration structures used to create tables.

pub mod comparator;
pub mod config;

pub use comparator::Comparator;
