// src/core/mod.rs

/// Request, record, asset and snapshot types shared by every stage.
pub mod models;

/// Error taxonomy for scans and the result cache.
pub mod error;

/// Spawns external tools with a timeout and classifies how they ended.
pub mod runner;

/// Pure parsers turning tool output into records.
pub mod parsers;

/// Picks the tools for the host OS.
pub mod platform;

/// Runs the sub-scans concurrently and applies cache fallback.
pub mod scanner;

/// Merges parsed records into one `Asset`.
pub mod reconciler;

/// Last-known-good snapshots, one per target.
pub mod cache;
