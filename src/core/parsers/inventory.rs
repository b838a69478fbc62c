// src/core/parsers/inventory.rs

//! Parsers for OS inventory tools: package managers, service managers and the
//! Windows management shell's `ConvertTo-Json` output.

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::core::models::{DetectedService, InstalledPackage, ServiceStatus, SystemInfo};

static RE_SYSV_RUNNING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\s\+\s\]\s+(\S+)").unwrap());
static RE_DOTNET_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/Date\((-?\d+)\)/$").unwrap());

// --- Package managers ---

/// Parses `name version` lines (`dpkg-query -W`, `rpm -qa --qf`, `brew list --versions`).
/// Returns `None` when nothing usable was printed so the next lister gets a turn.
pub fn parse_name_version_lines(output: &str) -> Option<Vec<InstalledPackage>> {
    let packages: Vec<InstalledPackage> = output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let version = parts.next().unwrap_or_default();
            Some(InstalledPackage::new(name, version))
        })
        .collect();
    (!packages.is_empty()).then_some(packages)
}

// --- Service managers ---

/// Parses `systemctl list-units --type=service --state=running --plain --no-legend`.
pub fn parse_systemctl_running(output: &str) -> Option<Vec<DetectedService>> {
    let services: Vec<DetectedService> = output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line
                .split_whitespace()
                .skip_while(|p| *p == "●")
                .collect();
            let unit = *parts.first()?;
            let name = unit.strip_suffix(".service").unwrap_or(unit);
            let description = parts.get(4..).map(|d| d.join(" ")).unwrap_or_default();
            Some(DetectedService {
                name: name.to_string(),
                status: ServiceStatus::Running,
                description: (!description.is_empty()).then_some(description),
                ..Default::default()
            })
        })
        .collect();
    (!services.is_empty()).then_some(services)
}

/// Parses `service --status-all`, keeping the services marked `[ + ]`.
pub fn parse_service_status_all(output: &str) -> Option<Vec<DetectedService>> {
    let services: Vec<DetectedService> = output
        .lines()
        .filter_map(|line| RE_SYSV_RUNNING.captures(line))
        .map(|caps| DetectedService {
            name: caps[1].to_string(),
            status: ServiceStatus::Running,
            ..Default::default()
        })
        .collect();
    (!services.is_empty()).then_some(services)
}

// --- Windows management shell ---

/// Reads `ConvertTo-Json` output, which is a bare object for one item and an array
/// otherwise. Items that don't fit `T` are skipped. `None` only for invalid JSON.
pub fn json_list<T: serde::de::DeserializeOwned>(output: &str) -> Option<Vec<T>> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Some(Vec::new());
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    let items = match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };
    Some(
        items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OsSummary {
    hostname: Option<String>,
    caption: Option<String>,
    version: Option<String>,
    build_number: Option<String>,
    #[serde(rename = "OSArchitecture")]
    os_architecture: Option<String>,
    last_boot_up_time: Option<Value>,
}

/// Parses the combined `Win32_OperatingSystem`/`Win32_ComputerSystem` summary object.
pub fn parse_windows_system_info(output: &str) -> Option<SystemInfo> {
    let summary: OsSummary = json_list(output)?.into_iter().next()?;
    Some(SystemInfo {
        hostname: summary.hostname,
        os_name: summary.caption.map(|c| c.trim().to_string()),
        os_version: summary.version,
        kernel_version: None,
        architecture: summary.os_architecture,
        build: summary.build_number,
        last_boot: summary.last_boot_up_time.as_ref().and_then(boot_time),
    })
}

/// CIM datetimes arrive either as ISO strings or as `/Date(<millis>)/`.
fn boot_time(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("DateTime").and_then(Value::as_str)?,
        _ => return None,
    };
    match RE_DOTNET_DATE.captures(raw) {
        Some(caps) => {
            let millis: i64 = caps[1].parse().ok()?;
            DateTime::from_timestamp_millis(millis).map(|dt| dt.to_rfc3339())
        }
        None => Some(raw.to_string()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceEntry {
    name: String,
    display_name: Option<String>,
    status: Option<Value>,
    start_type: Option<Value>,
}

/// Parses `Get-Service | Select-Object Name, DisplayName, Status, StartType | ConvertTo-Json`.
/// Windows PowerShell serialises the enums as numbers, PowerShell 7 as strings.
pub fn parse_get_service_json(output: &str) -> Option<Vec<DetectedService>> {
    let entries: Vec<ServiceEntry> = json_list(output)?;
    Some(
        entries
            .into_iter()
            .map(|entry| DetectedService {
                name: entry.name,
                display_name: entry.display_name,
                status: entry.status.as_ref().map(service_status).unwrap_or_default(),
                start_type: entry.start_type.as_ref().and_then(start_type),
                description: None,
            })
            .collect(),
    )
}

fn service_status(value: &Value) -> ServiceStatus {
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(4) => ServiceStatus::Running,
            Some(1) => ServiceStatus::Stopped,
            _ => ServiceStatus::Unknown,
        },
        Value::String(s) => ServiceStatus::from_label(s),
        _ => ServiceStatus::Unknown,
    }
}

fn start_type(value: &Value) -> Option<String> {
    let label = match value {
        Value::Number(n) => match n.as_u64()? {
            0 => "Boot",
            1 => "System",
            2 => "Automatic",
            3 => "Manual",
            4 => "Disabled",
            _ => return None,
        },
        Value::String(s) => s.as_str(),
        _ => return None,
    };
    Some(label.to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UninstallEntry {
    display_name: Option<String>,
    display_version: Option<String>,
    publisher: Option<String>,
    install_date: Option<String>,
    estimated_size: Option<Value>,
}

/// Parses the uninstall registry hive listing into installed software.
pub fn parse_uninstall_json(output: &str) -> Option<Vec<InstalledPackage>> {
    let entries: Vec<UninstallEntry> = json_list(output)?;
    Some(
        entries
            .into_iter()
            .filter_map(|entry| {
                let name = entry.display_name.filter(|n| !n.trim().is_empty())?;
                Some(InstalledPackage {
                    name,
                    version: entry.display_version.unwrap_or_default(),
                    publisher: entry.publisher,
                    install_date: entry.install_date,
                    size: entry.estimated_size.as_ref().and_then(estimated_size),
                })
            })
            .collect(),
    )
}

/// `EstimatedSize` is a KiB count, but hand-written installers store it as a string
/// or leave garbage in it. Anything that isn't a non-negative number is dropped.
fn estimated_size(value: &Value) -> Option<String> {
    let kib = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (kib.is_finite() && kib >= 0.0).then(|| format!("{:.1} MB", kib / 1024.0))
}
