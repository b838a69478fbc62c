// src/core/scanner/port_scanner.rs

use std::time::Duration;

use tracing::info;

use crate::core::error::ScanError;
use crate::core::models::PortScan;
use crate::core::parsers::ports;
use crate::core::platform;
use crate::core::runner::ToolRunner;

/// Runs the port scanner against `target` and derives the web target list.
///
/// A report that is not valid XML counts as an execution failure of the tool.
pub async fn run_port_scan(
    runner: &dyn ToolRunner,
    target: &str,
    timeout: Duration,
) -> Result<PortScan, ScanError> {
    info!(target, "Starting port scan.");

    let cmd = platform::port_scan_invocation(target).with_timeout(timeout);
    let xml = runner.run(&cmd).await.into_output(&cmd)?;
    let report = ports::parse_nmap_xml(&xml).map_err(|e| {
        ScanError::execution_failed(cmd.command_line(), format!("unparsable report: {e}"))
    })?;

    let web_targets = ports::web_targets(&report.ports, target);
    let scan = PortScan {
        target: target.to_string(),
        address: report.address,
        ports: report.ports,
        web_targets,
    };
    info!(
        target,
        address = ?scan.address,
        ports = scan.ports.len(),
        open = scan.open_ports().count(),
        "Port scan finished."
    );
    Ok(scan)
}
