// src/core/reconciler.rs

//! Folds the parsed records of one request into a canonical `Asset`.
//!
//! The merge is a pure function of its inputs apart from the asset id and the
//! scan timestamp, which `reconcile` stamps on at the end.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::core::models::{
    ApplicationRecord, Asset, AssetStatus, BaseInventory, DetailedScan, LinkState, OsDescriptor,
    PortScan, ServiceRecord, ServiceStatus, FALLBACK_IP, UNKNOWN_HOST,
};
use crate::core::parsers::ports::NOT_AVAILABLE;

const START_TYPE_AUTOMATIC: &str = "automatic";
const START_TYPE_UNKNOWN: &str = "unknown";
const WARNING_PENALTY: u32 = 5;
const MAX_WARNING_PENALTY: u32 = 50;

/// Builds the asset for one scan request.
///
/// # Arguments
///
/// * `base` - Hostname, IP list and interfaces.
/// * `ports` - The port scan, if it produced (or recovered) a result.
/// * `detailed` - The OS-specific detailed scan, if one applied.
///
/// # Returns
///
/// A new `Asset` with a fresh id, stamped with the current time.
pub fn reconcile(
    base: Option<&BaseInventory>,
    ports: Option<&PortScan>,
    detailed: Option<&DetailedScan>,
) -> Asset {
    build_asset(
        base,
        ports,
        detailed,
        Uuid::new_v4().to_string(),
        Utc::now(),
    )
}

/// Deterministic part of `reconcile`.
pub fn build_asset(
    base: Option<&BaseInventory>,
    ports: Option<&PortScan>,
    detailed: Option<&DetailedScan>,
    id: String,
    scanned_at: DateTime<Utc>,
) -> Asset {
    let hostname = base
        .and_then(|b| b.hostname.as_deref())
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or(UNKNOWN_HOST)
        .to_string();

    let ip_addresses = base
        .map(|b| b.ip_addresses_short.clone())
        .unwrap_or_default();
    let ip_address = ip_addresses
        .first()
        .cloned()
        .unwrap_or_else(|| FALLBACK_IP.to_string());

    let services = merge_services(base, ports, detailed);
    let applications = applications(detailed);
    let (health_score, issues_count) = health(detailed);

    debug!(
        hostname = %hostname,
        services = services.len(),
        applications = applications.len(),
        health_score,
        "Reconciled asset."
    );

    Asset {
        id,
        hostname,
        ip_address,
        ip_addresses,
        status: AssetStatus::Active,
        os: os_descriptor(base, detailed),
        services,
        applications,
        health_score,
        issues_count,
        last_scan: scanned_at,
    }
}

// --- OS descriptor ---

/// Detailed-scan facts first, then "it has interfaces, so Linux", then all unknown.
fn os_descriptor(base: Option<&BaseInventory>, detailed: Option<&DetailedScan>) -> OsDescriptor {
    let known = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let or_unknown = |value: Option<String>| value.unwrap_or_else(|| OsDescriptor::UNKNOWN.to_string());

    if let Some(system) = detailed.map(DetailedScan::system) {
        if let Some(name) = known(&system.os_name) {
            let name = name
                .strip_prefix("Microsoft ")
                .map(str::to_string)
                .unwrap_or(name);
            return OsDescriptor {
                name,
                version: or_unknown(known(&system.os_version)),
                architecture: or_unknown(known(&system.architecture)),
                build_number: or_unknown(known(&system.build).or_else(|| known(&system.kernel_version))),
                last_boot_time: or_unknown(known(&system.last_boot)),
            };
        }
    }

    let mut os = OsDescriptor::unknown();
    if base.is_some_and(|b| !b.network_interfaces.is_empty()) {
        os.name = "Linux".to_string();
    }
    os
}

// --- Services ---

/// Port-derived, then interface-derived, then detailed-scan services. The first
/// entry seen for a name wins.
fn merge_services(
    base: Option<&BaseInventory>,
    ports: Option<&PortScan>,
    detailed: Option<&DetailedScan>,
) -> Vec<ServiceRecord> {
    let from_ports = ports.into_iter().flat_map(|scan| {
        scan.open_ports().map(|port| {
            let name = if port.service == NOT_AVAILABLE {
                format!("port-{}", port.port)
            } else {
                port.service.clone()
            };
            let display_name = if port.product == NOT_AVAILABLE {
                name.clone()
            } else {
                format!("{name} ({})", port.product)
            };
            ServiceRecord {
                name,
                display_name,
                status: ServiceStatus::Running,
                start_type: START_TYPE_AUTOMATIC.to_string(),
                pid: None,
                port: Some(port.port),
            }
        })
    });

    let from_interfaces = base.into_iter().flat_map(|b| {
        b.network_interfaces
            .iter()
            .filter(|iface| iface.state == LinkState::Up)
            .map(|iface| ServiceRecord {
                name: iface.name.clone(),
                display_name: format!("Network Interface {}", iface.name),
                status: ServiceStatus::Running,
                start_type: START_TYPE_AUTOMATIC.to_string(),
                pid: None,
                port: None,
            })
    });

    let from_detailed = detailed.into_iter().flat_map(|scan| {
        scan.services().iter().map(|service| ServiceRecord {
            name: service.name.clone(),
            display_name: service
                .display_name
                .clone()
                .unwrap_or_else(|| service.name.clone()),
            status: service.status,
            start_type: service
                .start_type
                .as_deref()
                .map(str::to_ascii_lowercase)
                .unwrap_or_else(|| START_TYPE_UNKNOWN.to_string()),
            pid: None,
            port: None,
        })
    });

    let mut seen = HashSet::new();
    from_ports
        .chain(from_interfaces)
        .chain(from_detailed)
        .filter(|service| seen.insert(service.name.clone()))
        .collect()
}

// --- Applications ---

fn applications(detailed: Option<&DetailedScan>) -> Vec<ApplicationRecord> {
    let Some(scan) = detailed else {
        return Vec::new();
    };
    let unknown = || OsDescriptor::UNKNOWN.to_string();
    let mut seen = HashSet::new();
    scan.packages()
        .iter()
        .filter(|pkg| seen.insert(pkg.name.as_str()))
        .map(|pkg| ApplicationRecord {
            name: pkg.name.clone(),
            version: Some(pkg.version.clone())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(unknown),
            publisher: pkg.publisher.clone().unwrap_or_else(unknown),
            install_date: pkg.install_date.clone().unwrap_or_else(unknown),
            size: pkg.size.clone(),
        })
        .collect()
}

// --- Health ---

/// Returns `(health_score, issues_count)`.
fn health(detailed: Option<&DetailedScan>) -> (u8, usize) {
    let Some(report) = detailed.and_then(DetailedScan::hardening) else {
        return (100, 0);
    };
    let warnings = report.warnings.len();
    let penalty = (warnings as u32)
        .saturating_mul(WARNING_PENALTY)
        .min(MAX_WARNING_PENALTY);
    let mut score = 100 - penalty;
    if let Some(index) = report.hardening_index {
        score = (f64::from(score + u32::from(index)) / 2.0).round() as u32;
    }
    (score.min(100) as u8, warnings)
}
