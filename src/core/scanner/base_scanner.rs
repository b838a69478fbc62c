// src/core/scanner/base_scanner.rs

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::error::ScanError;
use crate::core::models::BaseInventory;
use crate::core::parsers::interfaces;
use crate::core::platform::{self, InterfaceSource, OsKind};
use crate::core::runner::{ToolOutcome, ToolRunner};

/// Collects the base inventory: hostname, short IP list and interfaces.
///
/// The three tools run concurrently. A missing short IP list is derived from the
/// interfaces; the sub-scan only fails when neither the hostname nor the interface
/// table could be read.
///
/// # Arguments
///
/// * `runner` - Executes the tool invocations.
/// * `os` - Selects the interface tool and whether `hostname -I` exists.
/// * `timeout` - Applied to each invocation.
pub async fn run_base_scan(
    runner: &dyn ToolRunner,
    os: OsKind,
    timeout: Duration,
) -> Result<BaseInventory, ScanError> {
    info!(%os, "Starting base inventory scan.");

    let hostname_cmd = platform::hostname_invocation().with_timeout(timeout);
    let short_ip_cmd = platform::short_ip_invocation(os).map(|cmd| cmd.with_timeout(timeout));
    let (interface_cmd, source) = platform::interface_invocation(os);
    let interface_cmd = interface_cmd.with_timeout(timeout);

    let (hostname_out, short_ip_out, interface_out) = tokio::join!(
        runner.run(&hostname_cmd),
        async {
            match &short_ip_cmd {
                Some(cmd) => Some(runner.run(cmd).await),
                None => None,
            }
        },
        runner.run(&interface_cmd),
    );

    let hostname = hostname_out
        .into_output(&hostname_cmd)
        .map(|out| out.trim().to_string())
        .map(|name| (!name.is_empty()).then_some(name));
    let network_interfaces = interface_out.into_output(&interface_cmd).map(|out| match source {
        InterfaceSource::IpAddr => interfaces::parse_ip_addr(&out),
        InterfaceSource::NetIpAddressJson => interfaces::parse_net_ip_address_json(&out),
    });

    let (hostname, network_interfaces) = match (hostname, network_interfaces) {
        (Err(hostname_err), Err(interface_err)) => {
            warn!(error = %interface_err, "Interface inventory failed as well.");
            return Err(hostname_err);
        }
        (hostname, interfaces) => (
            hostname.unwrap_or_else(|e| {
                warn!(tool = ?e.tool(), reason = %e, "Hostname unavailable, continuing.");
                None
            }),
            interfaces.unwrap_or_else(|e| {
                warn!(tool = ?e.tool(), reason = %e, "Interface table unavailable, continuing.");
                Vec::new()
            }),
        ),
    };

    let mut ip_addresses_short = match short_ip_out {
        Some(ToolOutcome::Success(out)) => interfaces::parse_short_ip_list(&out),
        Some(other) => {
            debug!(outcome = ?other, "Short IP list unavailable.");
            Vec::new()
        }
        None => Vec::new(),
    };
    if ip_addresses_short.is_empty() {
        ip_addresses_short = interfaces::primary_ipv4_addresses(&network_interfaces);
    }

    info!(
        hostname = ?hostname,
        interfaces = network_interfaces.len(),
        addresses = ip_addresses_short.len(),
        "Base inventory scan finished."
    );
    Ok(BaseInventory {
        hostname,
        ip_addresses_short,
        network_interfaces,
    })
}
