// src/core/parsers/hardening.rs

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::core::models::{HardeningReport, SystemInfo};

static RE_HARDENING_INDEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Hardening index\s*:\s*(\d+)").unwrap());
static RE_TESTS_PERFORMED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Tests performed\s*:\s*(\d+)").unwrap());
static RE_WARNING_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Warning:\s*(.+)$").unwrap());
static RE_SUGGESTION_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Suggestion:\s*(.+)$").unwrap());
static RE_DASH_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\s*-\s*\]\s*(.+)").unwrap());
static RE_BANG_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\s*!\s*\]\s*(.+)").unwrap());
static RE_KEY_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z ]*?)\s*:\s*(.+)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Warnings,
    Suggestions,
}

/// Parses the console output of `lynis audit system`.
///
/// Package and service lists are left empty: they come from separate listers.
pub fn parse_lynis_output(output: &str) -> HardeningReport {
    let mut report = HardeningReport::default();
    let mut os_family: Option<String> = None;
    let mut section = Section::None;

    for raw_line in output.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = RE_HARDENING_INDEX.captures(line) {
            report.hardening_index = caps[1].parse::<u32>().ok().map(|v| v.min(100) as u8);
            continue;
        }
        if let Some(caps) = RE_TESTS_PERFORMED.captures(line) {
            report.tests_performed = caps[1].parse().unwrap_or(0);
            continue;
        }

        if line.starts_with("Warnings (") {
            section = Section::Warnings;
            continue;
        }
        if line.starts_with("Suggestions (") {
            section = Section::Suggestions;
            continue;
        }
        if line.starts_with("====") || line.starts_with("Follow-up") {
            section = Section::None;
            continue;
        }

        if let Some(caps) = RE_WARNING_PREFIX.captures(line) {
            report.warnings.push(caps[1].trim().to_string());
            continue;
        }
        if let Some(caps) = RE_SUGGESTION_PREFIX.captures(line) {
            report.suggestions.push(caps[1].trim().to_string());
            continue;
        }

        match section {
            Section::Warnings => {
                if let Some(text) = line.strip_prefix("! ") {
                    report.warnings.push(text.trim().to_string());
                    continue;
                }
            }
            Section::Suggestions => {
                if let Some(text) = line.strip_prefix("* ") {
                    report.suggestions.push(text.trim().to_string());
                    continue;
                }
            }
            Section::None => {}
        }

        if line.contains("Warning") {
            if let Some(caps) = RE_DASH_MARKER.captures(line) {
                report.warnings.push(caps[1].trim().to_string());
                continue;
            }
        }
        if line.contains("Suggestion") {
            if let Some(caps) = RE_BANG_MARKER.captures(line) {
                report.suggestions.push(caps[1].trim().to_string());
                continue;
            }
        }

        if let Some(caps) = RE_KEY_VALUE.captures(line) {
            record_system_field(&mut report.system, &mut os_family, &caps[1], caps[2].trim());
        }
    }

    if report.system.os_name.is_none() {
        report.system.os_name = os_family;
    }

    debug!(
        hardening_index = ?report.hardening_index,
        warnings = report.warnings.len(),
        suggestions = report.suggestions.len(),
        "Parsed hardening audit."
    );
    report
}

/// First occurrence wins for every field.
fn record_system_field(
    system: &mut SystemInfo,
    os_family: &mut Option<String>,
    key: &str,
    value: &str,
) {
    let slot = match key.to_ascii_lowercase().as_str() {
        "operating system name" | "os name" => &mut system.os_name,
        "operating system" | "os" => os_family,
        "operating system version" | "os version" => &mut system.os_version,
        "kernel version" | "kernel" => &mut system.kernel_version,
        "hardware platform" => &mut system.architecture,
        "hostname" => &mut system.hostname,
        _ => return,
    };
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LYNIS: &str = "
[ Lynis 3.0.9 ]

  ---------------------------------------------------
  Program version:           3.0.9
  Operating system:          Linux
  Operating system name:     Ubuntu
  Operating system version:  24.04
  Kernel version:            6.8.0
  Hardware platform:         x86_64
  Hostname:                  web-01
  ---------------------------------------------------

  -[ Lynis 3.0.9 Results ]-

  Warnings (2):
  ----------------------------
  ! Reboot of system is most likely needed [KRNL-5830]
      - Solution : reboot
      https://cisofy.com/lynis/controls/KRNL-5830/

  ! Found one or more vulnerable packages. [PKGS-7392]
      https://cisofy.com/lynis/controls/PKGS-7392/

  Suggestions (3):
  ----------------------------
  * Set a password on GRUB boot loader to prevent altering boot configuration [BOOT-5122]
      https://cisofy.com/lynis/controls/BOOT-5122/

  * Install a PAM module for password strength testing [AUTH-9262]

  * Consider hardening SSH configuration [SSH-7408]
    - Details  : AllowTcpForwarding (set YES to NO)

  Follow-up:
  ----------------------------
  - Show details of a test (lynis show details TEST-ID)

================================================================================

  Lynis security scan details:

  Hardening index : 65 [#############       ]
  Tests performed : 262
  Plugins enabled : 1
";

    #[test]
    fn parses_lynis_report_sections() {
        let report = parse_lynis_output(LYNIS);
        assert_eq!(report.hardening_index, Some(65));
        assert_eq!(report.tests_performed, 262);
        assert_eq!(
            report.warnings,
            vec![
                "Reboot of system is most likely needed [KRNL-5830]",
                "Found one or more vulnerable packages. [PKGS-7392]",
            ]
        );
        assert_eq!(report.suggestions.len(), 3);
        assert!(report.suggestions[2].starts_with("Consider hardening SSH"));
        assert!(report.packages.is_empty());
        assert!(report.services.is_empty());
    }

    #[test]
    fn extracts_system_facts() {
        let system = parse_lynis_output(LYNIS).system;
        assert_eq!(system.os_name.as_deref(), Some("Ubuntu"));
        assert_eq!(system.os_version.as_deref(), Some("24.04"));
        assert_eq!(system.kernel_version.as_deref(), Some("6.8.0"));
        assert_eq!(system.architecture.as_deref(), Some("x86_64"));
        assert_eq!(system.hostname.as_deref(), Some("web-01"));
    }

    #[test]
    fn prefixed_warning_lines_are_counted() {
        let text = "\
Hardening index : 72
Tests performed : 100
Warning: SSH root login permitted
Warning: No firewall active
Warning: Outdated kernel
Suggestion: Enable auditd
";
        let report = parse_lynis_output(text);
        assert_eq!(report.hardening_index, Some(72));
        assert_eq!(report.warnings.len(), 3);
        assert_eq!(report.warnings[1], "No firewall active");
        assert_eq!(report.suggestions, vec!["Enable auditd"]);
    }

    #[test]
    fn bracket_markers_are_understood() {
        let text = "[ - ] Warning: weak umask\n[ ! ] Suggestion: harden compilers\n";
        let report = parse_lynis_output(text);
        assert_eq!(report.warnings, vec!["Warning: weak umask"]);
        assert_eq!(report.suggestions, vec!["Suggestion: harden compilers"]);
    }

    #[test]
    fn missing_metrics_stay_absent() {
        let report = parse_lynis_output("nothing useful here\nOS : Linux\n");
        assert_eq!(report.hardening_index, None);
        assert_eq!(report.tests_performed, 0);
        assert_eq!(report.system.os_name.as_deref(), Some("Linux"));
    }

    #[test]
    fn hardening_index_is_capped() {
        assert_eq!(parse_lynis_output("Hardening index : 140").hardening_index, Some(100));
    }
}
