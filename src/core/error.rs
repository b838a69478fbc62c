// src/core/error.rs

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::models::SubScan;

/// Failures a scan request can run into.
///
/// `InvalidTarget` is raised when a request is built. Of the rest, only
/// `NoCacheAvailable` for the base inventory and `Cancelled` ever reach the caller
/// of a unified scan; everything else is recovered inside the orchestrator.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{tool} is not installed")]
    ToolUnavailable { tool: String },

    #[error("{tool} failed: {reason}")]
    ToolExecutionFailed { tool: String, reason: String },

    #[error("{tool} timed out after {timeout:?}")]
    ToolTimedOut { tool: String, timeout: Duration },

    #[error("invalid scan target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: &'static str },

    #[error("no cached {sub_scan} result for {target}")]
    NoCacheAvailable { target: String, sub_scan: SubScan },

    #[error("scan of {target} was cancelled")]
    Cancelled { target: String },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ScanError {
    pub fn execution_failed(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ToolExecutionFailed {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Name of the tool the error is about, if any.
    pub fn tool(&self) -> Option<&str> {
        match self {
            Self::ToolUnavailable { tool }
            | Self::ToolExecutionFailed { tool, .. }
            | Self::ToolTimedOut { tool, .. } => Some(tool),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache entry {} is not a valid snapshot: {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
