// src/core/platform.rs

//! Platform dispatcher: decides, once per request, which tools apply to the host OS.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::core::models::{DetectedService, InstalledPackage};
use crate::core::parsers::inventory;
use crate::core::parsers::sockets::SocketTableFormat;
use crate::core::runner::ToolInvocation;

/// Host operating system family, resolved once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OsKind {
    Linux,
    #[serde(rename = "macos")]
    #[strum(serialize = "macos")]
    MacOs,
    Windows,
    Unknown,
}

impl OsKind {
    /// The OS this binary was built for.
    pub fn detect() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    pub fn from_os_name(name: &str) -> Self {
        match name {
            "linux" => Self::Linux,
            "macos" => Self::MacOs,
            "windows" => Self::Windows,
            _ => Self::Unknown,
        }
    }
}

/// Knobs that change how tools are launched, taken from the scan configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformOptions {
    /// Runs the audit through `sudo -n`. The audit then runs as root and can only be
    /// stopped through sudo relaying SIGTERM, which a timeout allows for but a
    /// cancellation does not wait for.
    pub use_sudo_for_audit: bool,
    /// Runs the Linux audit through `wsl -e` on Windows. Stopping it stops `wsl.exe`;
    /// the Linux side is torn down by WSL, not by this process.
    pub enable_wsl_bridge: bool,
}

impl Default for PlatformOptions {
    fn default() -> Self {
        Self {
            use_sudo_for_audit: false,
            enable_wsl_bridge: true,
        }
    }
}

/// How Linux tools reach the system they inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bridge {
    Native,
    /// Through the Windows Subsystem for Linux (`wsl -e`).
    Wsl,
}

impl Bridge {
    pub fn apply(self, invocation: ToolInvocation) -> ToolInvocation {
        match self {
            Self::Native => invocation,
            Self::Wsl => invocation.wrapped_in("wsl", &["-e"]),
        }
    }
}

/// The detailed sub-scan a host gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailedScanPlan {
    /// Hardening audit, gated on an installed check. Skipped, not failed, when absent.
    HardeningAudit { bridge: Bridge, use_sudo: bool },
    /// Management-shell report behind an availability/elevation precheck, plus the
    /// hardening audit through the WSL bridge when allowed.
    ManagementShell { wsl_bridge: bool, use_sudo: bool },
    /// No detailed scan: base inventory only.
    BaseOnly,
}

pub fn detailed_plan(os: OsKind, options: PlatformOptions) -> DetailedScanPlan {
    match os {
        OsKind::Linux | OsKind::MacOs => DetailedScanPlan::HardeningAudit {
            bridge: Bridge::Native,
            use_sudo: options.use_sudo_for_audit,
        },
        OsKind::Windows => DetailedScanPlan::ManagementShell {
            wsl_bridge: options.enable_wsl_bridge,
            use_sudo: options.use_sudo_for_audit,
        },
        OsKind::Unknown => DetailedScanPlan::BaseOnly,
    }
}

// --- Base inventory tools ---

/// Where interface details come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceSource {
    IpAddr,
    NetIpAddressJson,
}

pub fn hostname_invocation() -> ToolInvocation {
    ToolInvocation::new("hostname", Vec::<String>::new())
}

/// `hostname -I` only exists in the GNU/Linux `hostname`.
pub fn short_ip_invocation(os: OsKind) -> Option<ToolInvocation> {
    match os {
        OsKind::Linux => Some(ToolInvocation::new("hostname", ["-I"])),
        OsKind::MacOs | OsKind::Windows | OsKind::Unknown => None,
    }
}

pub fn interface_invocation(os: OsKind) -> (ToolInvocation, InterfaceSource) {
    match os {
        OsKind::Windows => (
            powershell(
                "Get-NetIPAddress | Select-Object InterfaceAlias, IPAddress, PrefixLength, AddressFamily | ConvertTo-Json",
            ),
            InterfaceSource::NetIpAddressJson,
        ),
        OsKind::Linux | OsKind::MacOs | OsKind::Unknown => {
            (ToolInvocation::new("ip", ["a"]), InterfaceSource::IpAddr)
        }
    }
}

// --- Ports & sockets ---

/// The target goes after `--`, so nmap never reads it as an option.
pub fn port_scan_invocation(target: &str) -> ToolInvocation {
    ToolInvocation::new("nmap", ["-oX", "-", "--", target])
}

pub fn socket_invocation(os: OsKind) -> (ToolInvocation, SocketTableFormat) {
    match os {
        OsKind::Windows => (
            ToolInvocation::new("netstat", ["-ano"]),
            SocketTableFormat::Windows,
        ),
        OsKind::Linux | OsKind::MacOs | OsKind::Unknown => (
            ToolInvocation::new("ss", ["-tanp"]),
            SocketTableFormat::Linux,
        ),
    }
}

// --- Hardening audit ---

pub fn lynis_installed_check(bridge: Bridge) -> ToolInvocation {
    bridge.apply(ToolInvocation::new("lynis", ["show", "version"]))
}

pub fn lynis_audit(bridge: Bridge, use_sudo: bool) -> ToolInvocation {
    let audit = ToolInvocation::new("lynis", ["audit", "system", "--quick", "--no-colors"]);
    let audit = if use_sudo {
        audit.wrapped_in("sudo", &["-n"])
    } else {
        audit
    };
    bridge.apply(audit)
}

/// One way of enumerating something. The parser returns `None` when the lister
/// produced nothing usable, handing over to the next one.
#[derive(Debug, Clone)]
pub struct Lister<T> {
    pub invocation: ToolInvocation,
    pub parse: fn(&str) -> Option<Vec<T>>,
}

/// Package-manager listers, tried in order.
pub fn package_listers(bridge: Bridge) -> Vec<Lister<InstalledPackage>> {
    [
        ToolInvocation::new("dpkg-query", ["-W", "-f=${Package} ${Version}\\n"]),
        ToolInvocation::new("rpm", ["-qa", "--qf", "%{NAME} %{VERSION}\\n"]),
        ToolInvocation::new("brew", ["list", "--versions"]),
    ]
    .into_iter()
    .map(|invocation| Lister {
        invocation: bridge.apply(invocation),
        parse: inventory::parse_name_version_lines,
    })
    .collect()
}

/// Service-manager listers, tried in order.
pub fn service_listers(bridge: Bridge) -> Vec<Lister<DetectedService>> {
    vec![
        Lister {
            invocation: bridge.apply(ToolInvocation::new(
                "systemctl",
                [
                    "list-units",
                    "--type=service",
                    "--state=running",
                    "--no-pager",
                    "--plain",
                    "--no-legend",
                ],
            )),
            parse: inventory::parse_systemctl_running,
        },
        Lister {
            invocation: bridge.apply(ToolInvocation::new("service", ["--status-all"])),
            parse: inventory::parse_service_status_all,
        },
    ]
}

// --- Windows management shell ---

pub fn powershell(command: &str) -> ToolInvocation {
    ToolInvocation::new(
        "powershell",
        ["-NoProfile", "-NonInteractive", "-Command", command],
    )
}

/// Prints `True` when the current session is elevated.
pub fn shell_precheck() -> ToolInvocation {
    powershell(
        "([Security.Principal.WindowsPrincipal][Security.Principal.WindowsIdentity]::GetCurrent()).IsInRole([Security.Principal.WindowsBuiltInRole]::Administrator)",
    )
}

pub fn windows_system_info() -> ToolInvocation {
    powershell(
        "$os = Get-CimInstance -ClassName Win32_OperatingSystem; \
         $cs = Get-CimInstance -ClassName Win32_ComputerSystem; \
         [pscustomobject]@{ Hostname = $cs.Name; Caption = $os.Caption; Version = $os.Version; \
         BuildNumber = $os.BuildNumber; OSArchitecture = $os.OSArchitecture; \
         LastBootUpTime = $os.LastBootUpTime.ToString('o') } | ConvertTo-Json",
    )
}

pub fn windows_services() -> ToolInvocation {
    powershell("Get-Service | Select-Object Name, DisplayName, Status, StartType | ConvertTo-Json")
}

/// 64-bit and 32-bit uninstall hives.
pub fn windows_software() -> [ToolInvocation; 2] {
    const SELECT: &str = "Where-Object { $_.DisplayName -ne $null } | \
        Select-Object DisplayName, DisplayVersion, Publisher, InstallDate, EstimatedSize | ConvertTo-Json";
    [
        powershell(&format!(
            "Get-ItemProperty HKLM:\\Software\\Microsoft\\Windows\\CurrentVersion\\Uninstall\\* | {SELECT}"
        )),
        powershell(&format!(
            "Get-ItemProperty HKLM:\\Software\\Wow6432Node\\Microsoft\\Windows\\CurrentVersion\\Uninstall\\* | {SELECT}"
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_names_map_to_kinds() {
        assert_eq!(OsKind::from_os_name("linux"), OsKind::Linux);
        assert_eq!(OsKind::from_os_name("macos"), OsKind::MacOs);
        assert_eq!(OsKind::from_os_name("windows"), OsKind::Windows);
        assert_eq!(OsKind::from_os_name("freebsd"), OsKind::Unknown);
        assert_eq!(OsKind::MacOs.to_string(), "macos");
    }

    #[test]
    fn every_os_gets_a_plan() {
        let options = PlatformOptions::default();
        assert_eq!(
            detailed_plan(OsKind::Linux, options),
            DetailedScanPlan::HardeningAudit {
                bridge: Bridge::Native,
                use_sudo: false
            }
        );
        assert!(matches!(
            detailed_plan(OsKind::MacOs, options),
            DetailedScanPlan::HardeningAudit { .. }
        ));
        assert_eq!(
            detailed_plan(OsKind::Windows, options),
            DetailedScanPlan::ManagementShell {
                wsl_bridge: true,
                use_sudo: false
            }
        );
        assert_eq!(
            detailed_plan(OsKind::Unknown, options),
            DetailedScanPlan::BaseOnly
        );
    }

    #[test]
    fn audit_composes_sudo_and_bridge() {
        let audit = lynis_audit(Bridge::Wsl, true);
        assert_eq!(
            audit.command_line(),
            "wsl -e sudo -n lynis audit system --quick --no-colors"
        );
        assert_eq!(
            lynis_installed_check(Bridge::Native).command_line(),
            "lynis show version"
        );
    }

    #[test]
    fn listers_are_ordered() {
        let programs: Vec<_> = package_listers(Bridge::Native)
            .into_iter()
            .map(|p| p.invocation.program().to_string())
            .collect();
        assert_eq!(programs, ["dpkg-query", "rpm", "brew"]);
        assert_eq!(service_listers(Bridge::Native)[0].invocation.program(), "systemctl");
    }

    #[test]
    fn tool_selection_follows_os() {
        assert_eq!(socket_invocation(OsKind::Windows).1, SocketTableFormat::Windows);
        assert_eq!(socket_invocation(OsKind::Linux).0.command_line(), "ss -tanp");
        assert!(short_ip_invocation(OsKind::MacOs).is_none());
        assert_eq!(interface_invocation(OsKind::Windows).1, InterfaceSource::NetIpAddressJson);
        assert_eq!(port_scan_invocation("10.0.0.1").args(), ["-oX", "-", "--", "10.0.0.1"]);
    }

    #[test]
    fn port_scan_target_follows_end_of_options() {
        let target = "--script=/tmp/evil.nse";
        let nmap = port_scan_invocation(target);
        let args = nmap.args();
        let separator = args.iter().position(|a| a == "--").unwrap();
        let position = args.iter().position(|a| a == target).unwrap();
        assert_eq!(position, separator + 1);
        assert_eq!(position, args.len() - 1);
    }
}
