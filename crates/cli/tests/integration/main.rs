//! CLI integration tests: full workflows through the stowage binary.

mod common;
mod gc_tests;
mod resolve_tests;
mod store_tests;
