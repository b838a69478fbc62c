// src/core/models.rs

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::core::error::ScanError;
use crate::core::platform::OsKind;

/// Target scanned when the caller does not name one.
pub const DEFAULT_TARGET: &str = "localhost";

/// Hostname used when the base inventory could not resolve one.
pub const UNKNOWN_HOST: &str = "unknown-host";

/// Address used when no IP could be discovered for the host.
pub const FALLBACK_IP: &str = "127.0.0.1";

/// Per-invocation timeout applied to the quick tools (hostname, ip, ss, nmap).
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for the OS hardening audit, which routinely takes minutes.
pub const DEFAULT_AUDIT_TIMEOUT: Duration = Duration::from_secs(900);

// --- Scan Request ---

/// One independent sub-scan that a request can ask for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubScan {
    /// Hostname, IP list and interfaces. Always performed.
    SystemInfo,
    Ports,
    Sockets,
    /// OS-specific detailed scan (hardening audit or management-shell report).
    HardeningAudit,
}

/// An immutable description of what to scan and how long each tool may run.
///
/// `SubScan::SystemInfo` is part of every request: the base inventory is the one
/// input an `Asset` cannot be built without.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    target: String,
    sub_scans: BTreeSet<SubScan>,
    tool_timeout: Duration,
    audit_timeout: Duration,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self::for_target(DEFAULT_TARGET.to_string())
    }
}

impl ScanRequest {
    /// Creates a request for `target` with every sub-scan enabled.
    /// A blank target falls back to `localhost`.
    ///
    /// The target ends up on tool command lines, so anything a tool could read as
    /// an option (a leading `-`) or as several arguments is rejected.
    pub fn new(target: impl Into<String>) -> Result<Self, ScanError> {
        let target = target.into();
        let trimmed = target.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let reason = if trimmed.starts_with('-') {
            Some("must not start with '-'")
        } else if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            Some("must not contain whitespace or control characters")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(ScanError::InvalidTarget { target, reason }),
            None => Ok(Self::for_target(trimmed.to_string())),
        }
    }

    fn for_target(target: String) -> Self {
        Self {
            target,
            sub_scans: [
                SubScan::SystemInfo,
                SubScan::Ports,
                SubScan::Sockets,
                SubScan::HardeningAudit,
            ]
            .into_iter()
            .collect(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            audit_timeout: DEFAULT_AUDIT_TIMEOUT,
        }
    }

    /// Drops a sub-scan from the request. The base inventory cannot be dropped.
    pub fn without(mut self, sub_scan: SubScan) -> Self {
        if sub_scan != SubScan::SystemInfo {
            self.sub_scans.remove(&sub_scan);
        }
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_audit_timeout(mut self, timeout: Duration) -> Self {
        self.audit_timeout = timeout;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn wants(&self, sub_scan: SubScan) -> bool {
        self.sub_scans.contains(&sub_scan)
    }

    pub fn tool_timeout(&self) -> Duration {
        self.tool_timeout
    }

    pub fn audit_timeout(&self) -> Duration {
        self.audit_timeout
    }
}

// --- Network Interface Records ---

/// Administrative state of an interface as reported by `ip a`.
/// Anything other than `UP` or `DOWN` (e.g. `UNKNOWN` on loopback) is kept as empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkState {
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "DOWN")]
    Down,
    #[default]
    #[serde(rename = "")]
    Unknown,
}

impl LinkState {
    pub fn from_token(token: &str) -> Self {
        match token {
            "UP" => Self::Up,
            "DOWN" => Self::Down,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Unknown => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv4Entry {
    pub address: String,
    pub cidr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv6Entry {
    pub address: String,
    pub cidr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkInterfaceRecord {
    pub name: String,
    pub state: LinkState,
    pub mac_address: String,
    pub ipv4_addresses: Vec<Ipv4Entry>,
    pub ipv6_addresses: Vec<Ipv6Entry>,
}

/// Output of the base inventory sub-scan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BaseInventory {
    pub hostname: Option<String>,
    pub ip_addresses_short: Vec<String>,
    pub network_interfaces: Vec<NetworkInterfaceRecord>,
}

// --- Port Scan Records ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
    Unknown,
}

impl PortState {
    pub fn from_nmap(state: &str) -> Self {
        match state {
            "open" => Self::Open,
            "closed" => Self::Closed,
            s if s.contains("filtered") => Self::Filtered,
            _ => Self::Unknown,
        }
    }
}

/// One `<port>` element of a port-scan document. Missing service details are "N/A".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRecord {
    pub port: u16,
    pub protocol: String,
    pub state: PortState,
    pub service: String,
    pub product: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortScan {
    pub target: String,
    /// Address the scanner resolved the target to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub ports: Vec<PortRecord>,
    /// Web-like endpoints for downstream scanners, the bare target always last.
    pub web_targets: Vec<String>,
}

impl PortScan {
    pub fn open_ports(&self) -> impl Iterator<Item = &PortRecord> {
        self.ports.iter().filter(|p| p.state == PortState::Open)
    }
}

// --- Socket Records ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketEndpoint {
    pub address: String,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketRecord {
    pub protocol: String,
    pub state: String,
    pub local: SocketEndpoint,
    pub peer: SocketEndpoint,
    pub pid: Option<u32>,
}

// --- Detailed Scan Records ---

/// OS facts reported by a detailed scan. Every field is optional because each tool
/// reports a different subset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub architecture: Option<String>,
    pub build: Option<String>,
    pub last_boot: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    pub publisher: Option<String>,
    pub install_date: Option<String>,
    pub size: Option<String>,
}

impl InstalledPackage {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ServiceStatus {
    Running,
    Stopped,
    #[default]
    Unknown,
}

impl ServiceStatus {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "running" | "active" => Self::Running,
            "stopped" | "inactive" | "exited" | "dead" => Self::Stopped,
            _ => Self::Unknown,
        }
    }
}

/// A service as enumerated by a service manager (systemd, SysV, Get-Service).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DetectedService {
    pub name: String,
    pub display_name: Option<String>,
    pub status: ServiceStatus,
    pub start_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HardeningReport {
    pub hardening_index: Option<u8>,
    pub tests_performed: u32,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    pub system: SystemInfo,
    pub packages: Vec<InstalledPackage>,
    pub services: Vec<DetectedService>,
}

/// System report gathered through the Windows management shell.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ManagementReport {
    pub elevated: bool,
    pub system: SystemInfo,
    pub services: Vec<DetectedService>,
    pub software: Vec<InstalledPackage>,
    /// Hardening audit run through the Linux-subsystem bridge, when present.
    pub hardening: Option<HardeningReport>,
}

/// The OS-specific deep scan, normalised to one shape per source tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetailedScan {
    Hardening(HardeningReport),
    Management(ManagementReport),
}

impl DetailedScan {
    pub fn system(&self) -> &SystemInfo {
        match self {
            Self::Hardening(report) => &report.system,
            Self::Management(report) => &report.system,
        }
    }

    pub fn services(&self) -> &[DetectedService] {
        match self {
            Self::Hardening(report) => &report.services,
            Self::Management(report) => &report.services,
        }
    }

    pub fn packages(&self) -> &[InstalledPackage] {
        match self {
            Self::Hardening(report) => &report.packages,
            Self::Management(report) => &report.software,
        }
    }

    pub fn hardening(&self) -> Option<&HardeningReport> {
        match self {
            Self::Hardening(report) => Some(report),
            Self::Management(report) => report.hardening.as_ref(),
        }
    }
}

// --- Canonical Asset ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AssetStatus {
    #[default]
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub name: String,
    pub display_name: String,
    pub status: ServiceStatus,
    pub start_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
    pub name: String,
    pub version: String,
    pub publisher: String,
    pub install_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDescriptor {
    pub name: String,
    pub version: String,
    pub architecture: String,
    pub build_number: String,
    pub last_boot_time: String,
}

impl OsDescriptor {
    pub const UNKNOWN: &'static str = "Unknown";

    pub fn unknown() -> Self {
        Self {
            name: Self::UNKNOWN.to_string(),
            version: Self::UNKNOWN.to_string(),
            architecture: Self::UNKNOWN.to_string(),
            build_number: Self::UNKNOWN.to_string(),
            last_boot_time: Self::UNKNOWN.to_string(),
        }
    }
}

/// The canonical record derived from one scan request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub hostname: String,
    pub ip_address: String,
    pub ip_addresses: Vec<String>,
    pub status: AssetStatus,
    pub os: OsDescriptor,
    pub services: Vec<ServiceRecord>,
    pub applications: Vec<ApplicationRecord>,
    pub health_score: u8,
    pub issues_count: usize,
    pub last_scan: DateTime<Utc>,
}

// --- Raw Bundle & Snapshot ---

/// A sub-scan that did not produce live data, and what was done about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubScanFailure {
    pub sub_scan: SubScan,
    pub tool: String,
    pub reason: String,
    pub recovered_from_cache: bool,
}

/// Parsed per-tool records of one request, before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBundle {
    pub target: String,
    pub os: OsKind,
    pub base: Option<BaseInventory>,
    pub ports: Option<PortScan>,
    pub sockets: Option<Vec<SocketRecord>>,
    pub detailed: Option<DetailedScan>,
    #[serde(default)]
    pub failures: Vec<SubScanFailure>,
}

/// What the result cache persists per target: the latest asset and its raw bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub timestamp: DateTime<Utc>,
    pub target: String,
    pub asset: Asset,
    pub raw: RawBundle,
}
