//! End-to-end tests for stowage-lib against a mock cache service.

mod common;
mod remote_cache_tests;
