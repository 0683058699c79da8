//! stowage-lib: content-addressed build artifact caching
//!
//! This crate provides the pieces of a cache run:
//! - `graph`: the project/target dependency graph and its JSON interchange form
//! - `hash`: deterministic Merkle hashing of every target in the graph
//! - `store`: the local, on-disk artifact store and its eviction pass
//! - `remote`: the HTTP client for the remote cache service
//! - `cache`: the coordinator that resolves targets against both tiers

pub mod cache;
pub mod config;
pub mod consts;
pub mod graph;
pub mod hash;
pub mod platform;
pub mod remote;
pub mod store;
pub mod util;
