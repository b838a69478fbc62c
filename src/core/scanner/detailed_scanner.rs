// src/core/scanner/detailed_scanner.rs

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::error::ScanError;
use crate::core::models::{DetailedScan, HardeningReport, ManagementReport, SystemInfo};
use crate::core::parsers::{hardening, inventory};
use crate::core::platform::{self, Bridge, DetailedScanPlan, Lister};
use crate::core::runner::{ToolInvocation, ToolOutcome, ToolRunner};

/// How the detailed sub-scan ended.
#[derive(Debug)]
pub enum DetailedOutcome {
    /// Nothing to run on this host: unknown OS, or the tool isn't installed.
    NotApplicable,
    Completed(DetailedScan),
    /// The tool exists but the scan did not produce a result.
    Failed(ScanError),
}

/// Timeouts for the detailed sub-scan. The audit itself gets the long one.
#[derive(Debug, Clone, Copy)]
pub struct DetailedTimeouts {
    pub tool: Duration,
    pub audit: Duration,
}

/// Runs whatever detailed scan `plan` selects.
///
/// # Arguments
///
/// * `runner` - Executes the tool invocations.
/// * `plan` - Chosen by the platform dispatcher for the host OS.
/// * `timeouts` - Per-invocation limits.
///
/// # Returns
///
/// A `DetailedOutcome`. Callers fall back to the cache only on `Failed`.
pub async fn run_detailed_scan(
    runner: &dyn ToolRunner,
    plan: DetailedScanPlan,
    timeouts: DetailedTimeouts,
) -> DetailedOutcome {
    info!(?plan, "Starting detailed scan.");
    let outcome = match plan {
        DetailedScanPlan::BaseOnly => DetailedOutcome::NotApplicable,
        DetailedScanPlan::HardeningAudit { bridge, use_sudo } => {
            match run_hardening_audit(runner, bridge, use_sudo, timeouts).await {
                Ok(Some(report)) => DetailedOutcome::Completed(DetailedScan::Hardening(report)),
                Ok(None) => DetailedOutcome::NotApplicable,
                Err(e) => DetailedOutcome::Failed(e),
            }
        }
        DetailedScanPlan::ManagementShell {
            wsl_bridge,
            use_sudo,
        } => run_management_scan(runner, wsl_bridge, use_sudo, timeouts).await,
    };
    match &outcome {
        DetailedOutcome::NotApplicable => info!("No detailed scan applies to this host."),
        DetailedOutcome::Completed(_) => info!("Detailed scan finished."),
        DetailedOutcome::Failed(e) => debug!(error = %e, "Detailed scan failed."),
    }
    outcome
}

// --- Hardening audit ---

/// Installed-check, then the audit, then the package and service listers.
/// `Ok(None)` means the auditor isn't there, which is not a failure.
async fn run_hardening_audit(
    runner: &dyn ToolRunner,
    bridge: Bridge,
    use_sudo: bool,
    timeouts: DetailedTimeouts,
) -> Result<Option<HardeningReport>, ScanError> {
    let check = platform::lynis_installed_check(bridge).with_timeout(timeouts.tool);
    match runner.run(&check).await {
        ToolOutcome::Success(version) => {
            debug!(tool = %check, version = version.trim(), "Hardening auditor found.");
        }
        other => {
            info!(tool = %check, outcome = ?other, "Hardening auditor not available, skipping audit.");
            return Ok(None);
        }
    }

    let audit = platform::lynis_audit(bridge, use_sudo).with_timeout(timeouts.audit);
    let output = runner.run(&audit).await.into_output(&audit)?;
    let mut report = hardening::parse_lynis_output(&output);

    let (packages, services) = tokio::join!(
        first_matching_lister(runner, platform::package_listers(bridge), timeouts.tool),
        first_matching_lister(runner, platform::service_listers(bridge), timeouts.tool),
    );
    report.packages = packages;
    report.services = services;

    info!(
        hardening_index = ?report.hardening_index,
        warnings = report.warnings.len(),
        packages = report.packages.len(),
        services = report.services.len(),
        "Hardening audit finished."
    );
    Ok(Some(report))
}

/// Tries each lister in order and keeps the first one whose parser accepts the output.
/// An empty list when none does.
async fn first_matching_lister<T>(
    runner: &dyn ToolRunner,
    listers: Vec<Lister<T>>,
    timeout: Duration,
) -> Vec<T> {
    for lister in listers {
        let cmd = lister.invocation.with_timeout(timeout);
        match runner.run(&cmd).await {
            ToolOutcome::Success(out) => match (lister.parse)(&out) {
                Some(items) => {
                    debug!(tool = %cmd, items = items.len(), "Lister matched.");
                    return items;
                }
                None => debug!(tool = %cmd, "Lister output empty, trying next."),
            },
            other => debug!(tool = %cmd, outcome = ?other, "Lister failed, trying next."),
        }
    }
    Vec::new()
}

// --- Management shell ---

async fn run_management_scan(
    runner: &dyn ToolRunner,
    wsl_bridge: bool,
    use_sudo: bool,
    timeouts: DetailedTimeouts,
) -> DetailedOutcome {
    let precheck = platform::shell_precheck().with_timeout(timeouts.tool);
    let elevated = match runner.run(&precheck).await.into_output(&precheck) {
        Ok(out) => out.trim().eq_ignore_ascii_case("true"),
        Err(ScanError::ToolUnavailable { .. }) => {
            info!("Management shell unavailable.");
            if !wsl_bridge {
                return DetailedOutcome::NotApplicable;
            }
            return match run_hardening_audit(runner, Bridge::Wsl, use_sudo, timeouts).await {
                Ok(Some(report)) => DetailedOutcome::Completed(DetailedScan::Hardening(report)),
                Ok(None) => DetailedOutcome::NotApplicable,
                Err(e) => DetailedOutcome::Failed(e),
            };
        }
        Err(e) => return DetailedOutcome::Failed(e),
    };
    if !elevated {
        warn!("Management shell is not elevated; service and software lists may be partial.");
    }

    let system_cmd = platform::windows_system_info().with_timeout(timeouts.tool);
    let services_cmd = platform::windows_services().with_timeout(timeouts.tool);
    let [native_hive, wow64_hive] =
        platform::windows_software().map(|cmd| cmd.with_timeout(timeouts.tool));

    let (system_out, services_out, native_out, wow64_out, bridged) = tokio::join!(
        runner.run(&system_cmd),
        runner.run(&services_cmd),
        runner.run(&native_hive),
        runner.run(&wow64_hive),
        async {
            if !wsl_bridge {
                return None;
            }
            match run_hardening_audit(runner, Bridge::Wsl, use_sudo, timeouts).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(tool = ?e.tool(), reason = %e, "Bridged hardening audit failed.");
                    None
                }
            }
        },
    );

    let system = match system_out
        .into_output(&system_cmd)
        .and_then(|out| parse_or_fail(&system_cmd, &out, inventory::parse_windows_system_info))
    {
        Ok(system) => system,
        Err(e) => return DetailedOutcome::Failed(e),
    };

    let services = optional_list(&services_cmd, services_out, inventory::parse_get_service_json);
    let mut software = optional_list(&native_hive, native_out, inventory::parse_uninstall_json);
    software.extend(optional_list(&wow64_hive, wow64_out, inventory::parse_uninstall_json));

    info!(
        elevated,
        services = services.len(),
        software = software.len(),
        bridged_audit = bridged.is_some(),
        "Management shell report finished."
    );
    DetailedOutcome::Completed(DetailedScan::Management(ManagementReport {
        elevated,
        system,
        services,
        software,
        hardening: bridged,
    }))
}

fn parse_or_fail(
    cmd: &ToolInvocation,
    output: &str,
    parse: fn(&str) -> Option<SystemInfo>,
) -> Result<SystemInfo, ScanError> {
    parse(output)
        .ok_or_else(|| ScanError::execution_failed(cmd.command_line(), "unparsable output"))
}

/// Lists other than the system summary degrade to empty instead of failing the report.
fn optional_list<T>(
    cmd: &ToolInvocation,
    outcome: ToolOutcome,
    parse: fn(&str) -> Option<Vec<T>>,
) -> Vec<T> {
    let parsed = outcome.into_output(cmd).and_then(|out| {
        parse(&out).ok_or_else(|| ScanError::execution_failed(cmd.command_line(), "unparsable output"))
    });
    parsed.unwrap_or_else(|e| {
        warn!(tool = %cmd, reason = %e, "Management query failed, using an empty list.");
        Vec::new()
    })
}
