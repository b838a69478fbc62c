// src/core/scanner/socket_scanner.rs

use std::time::Duration;

use tracing::info;

use crate::core::error::ScanError;
use crate::core::models::SocketRecord;
use crate::core::parsers::sockets;
use crate::core::platform::{self, OsKind};
use crate::core::runner::ToolRunner;

/// Lists the host's sockets with the platform's socket tool.
pub async fn run_socket_scan(
    runner: &dyn ToolRunner,
    os: OsKind,
    timeout: Duration,
) -> Result<Vec<SocketRecord>, ScanError> {
    info!(%os, "Starting socket scan.");

    let (cmd, format) = platform::socket_invocation(os);
    let cmd = cmd.with_timeout(timeout);
    let table = runner.run(&cmd).await.into_output(&cmd)?;
    let records = sockets::parse_socket_table(&table, format);

    info!(sockets = records.len(), "Socket scan finished.");
    Ok(records)
}
