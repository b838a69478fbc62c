// src/lib.rs

//! Host inventory and security snapshots built from external diagnostic tools.
//!
//! A [`Scanner`] runs the base inventory, port and socket scans concurrently,
//! follows up with the OS-specific detailed scan, and reconciles everything into
//! one [`Asset`]. Failed sub-scans fall back to the last snapshot kept in the
//! [`ResultCache`].

pub mod config;
pub mod core;
pub mod logging;

pub use crate::config::ScanConfig;
pub use crate::core::cache::ResultCache;
pub use crate::core::error::{CacheError, ScanError};
pub use crate::core::models::{Asset, ScanRequest, ScanSnapshot, SubScan};
pub use crate::core::platform::OsKind;
pub use crate::core::runner::{ProcessRunner, ToolInvocation, ToolOutcome, ToolRunner};
pub use crate::core::scanner::Scanner;
