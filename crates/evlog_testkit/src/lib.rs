//! # evlog testkit
//!
//! Test utilities for the evlog crates:
//!
//! - tempdir-backed journal and storage fixtures
//! - deterministic entry builders and proptest generators
//! - the cross-crate replication test suite (under `tests/`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use evlog_testkit::prelude::*;
//!
//! #[test]
//! fn my_test() {
//!     with_temp_journal(|journal| {
//!         // ... journal operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
