//! Shared utilities.
//!
//! Digest helpers, cooperative cancellation and test fixtures.

pub mod cancel;
pub mod hash;

#[cfg(test)]
pub mod testutil;
