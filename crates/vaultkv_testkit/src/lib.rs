//! # vaultkv Testkit
//!
//! Test utilities for vaultkv.
//!
//! This crate provides:
//! - Backend and randomness doubles that count, fail or repeat on demand
//! - A ready-to-use storage stack fixture
//! - Property-based test generators using proptest
//! - Concurrent stress helpers
//!
//! ## Usage
//!
//! ```rust
//! use vaultkv_testkit::prelude::*;
//! use vaultkv_core::{Storage, StorageEntry};
//!
//! let stack = TestStack::new();
//! stack.barrier.put(&stack.ctx, &StorageEntry::new("foo", "bar")).unwrap();
//! assert_eq!(stack.counting.puts(), 2); // keyring + entry
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mock;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::mock::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use mock::*;
pub use stress::*;
