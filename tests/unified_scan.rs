//! End-to-end tests of the unified scan against a scripted tool runner.
//!
//! No external tools are spawned: every invocation is answered from a table keyed
//! by its command line, and anything not in the table is reported as not installed.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use assetscan::core::models::{DetailedScan, ServiceStatus};
use assetscan::core::platform::{self, Bridge};
use assetscan::{
    OsKind, ResultCache, ScanError, ScanRequest, Scanner, SubScan, ToolInvocation, ToolOutcome,
    ToolRunner,
};

// ============================================================================
// Scripted runner
// ============================================================================

#[derive(Clone)]
enum Reply {
    Outcome(ToolOutcome),
    Hang,
}

#[derive(Default)]
struct ScriptedRunner {
    replies: HashMap<String, Reply>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    fn reply(mut self, invocation: &ToolInvocation, stdout: &str) -> Self {
        self.replies.insert(
            invocation.command_line(),
            Reply::Outcome(ToolOutcome::Success(stdout.to_string())),
        );
        self
    }

    fn fail(mut self, invocation: &ToolInvocation) -> Self {
        self.replies.insert(
            invocation.command_line(),
            Reply::Outcome(ToolOutcome::Failed {
                exit_code: Some(1),
                stderr: "scripted failure".to_string(),
            }),
        );
        self
    }

    fn time_out(mut self, invocation: &ToolInvocation) -> Self {
        self.replies.insert(
            invocation.command_line(),
            Reply::Outcome(ToolOutcome::TimedOut),
        );
        self
    }

    fn hang(mut self, invocation: &ToolInvocation) -> Self {
        self.replies.insert(invocation.command_line(), Reply::Hang);
        self
    }

    fn called(&self, program: &str) -> bool {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .any(|line| line.split_whitespace().next() == Some(program))
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &ToolInvocation) -> ToolOutcome {
        let line = invocation.command_line();
        self.calls.lock().unwrap().push(line.clone());
        match self.replies.get(&line).cloned() {
            Some(Reply::Outcome(outcome)) => outcome,
            Some(Reply::Hang) => std::future::pending().await,
            None => ToolOutcome::ToolMissing,
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

const IP_A: &str = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN group default qlen 1000
    link/loopback 00:00:00:00:00:00 brd 00:00:00:00:00:00
    inet 127.0.0.1/8 scope host lo
2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP group default qlen 1000
    link/ether aa:bb:cc:dd:ee:ff brd ff:ff:ff:ff:ff:ff
    inet 10.0.0.5/24 scope global eth0
";

const NMAP_XML: &str = r#"<?xml version="1.0"?>
<nmaprun scanner="nmap">
<host><address addr="127.0.0.1" addrtype="ipv4"/>
<ports>
<port protocol="tcp" portid="22"><state state="open"/><service name="ssh" product="OpenSSH"/></port>
<port protocol="tcp" portid="80"><state state="open"/><service name="http"/></port>
<port protocol="tcp" portid="443"><state state="closed"/><service name="https"/></port>
</ports></host></nmaprun>"#;

const SS_TABLE: &str = "\
State  Recv-Q Send-Q Local Address:Port Peer Address:Port Process
LISTEN 0      128    0.0.0.0:22         0.0.0.0:*         users:((\"sshd\",pid=812,fd=3))
";

const LYNIS: &str = "\
Operating system name: Ubuntu
Operating system version: 24.04
Kernel version: 6.8.0
Hardening index : 72
Tests performed : 250
Warning: SSH root login permitted
Warning: No firewall active
Warning: Outdated kernel
";

fn nmap() -> ToolInvocation {
    platform::port_scan_invocation("localhost")
}

fn lynis_check() -> ToolInvocation {
    platform::lynis_installed_check(Bridge::Native)
}

fn lynis_audit() -> ToolInvocation {
    platform::lynis_audit(Bridge::Native, false)
}

fn base_only_linux() -> ScriptedRunner {
    ScriptedRunner::default()
        .reply(&platform::hostname_invocation(), "web-01\n")
        .reply(&ToolInvocation::new("hostname", ["-I"]), "10.0.0.5 \n")
        .reply(&ToolInvocation::new("ip", ["a"]), IP_A)
}

fn healthy_linux() -> ScriptedRunner {
    base_only_linux()
        .reply(&nmap(), NMAP_XML)
        .reply(&ToolInvocation::new("ss", ["-tanp"]), SS_TABLE)
        .reply(&lynis_check(), "3.0.9\n")
        .reply(&lynis_audit(), LYNIS)
        .reply(
            &platform::package_listers(Bridge::Native)[0].invocation,
            "bash 5.2.21\nopenssh-server 9.6p1\n",
        )
        .reply(
            &platform::service_listers(Bridge::Native)[0].invocation,
            "cron.service loaded active running Regular background program processing daemon\n\
             ssh.service  loaded active running OpenBSD Secure Shell server\n",
        )
}

fn scanner(runner: ScriptedRunner, cache_dir: &TempDir) -> Scanner<ScriptedRunner> {
    Scanner::new(runner, ResultCache::new(cache_dir.path())).with_os(OsKind::Linux)
}

fn request() -> ScanRequest {
    ScanRequest::new("localhost")
        .unwrap()
        .with_tool_timeout(Duration::from_secs(5))
}

// ============================================================================
// Linux
// ============================================================================

#[tokio::test]
async fn healthy_host_produces_full_asset() {
    let cache_dir = tempfile::tempdir().unwrap();
    let scanner = scanner(healthy_linux(), &cache_dir);

    let snapshot = scanner.scan(&request()).await.unwrap();
    let asset = &snapshot.asset;

    assert_eq!(asset.hostname, "web-01");
    assert_eq!(asset.ip_address, "10.0.0.5");
    assert_eq!(asset.os.name, "Ubuntu");
    assert_eq!(asset.os.build_number, "6.8.0");
    assert_eq!(asset.health_score, 79);
    assert_eq!(asset.issues_count, 3);

    let names: Vec<_> = asset.services.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["ssh", "http", "eth0", "cron"]);
    assert_eq!(asset.services[0].display_name, "ssh (OpenSSH)");
    assert!(asset.services.iter().all(|s| s.status == ServiceStatus::Running));

    let apps: Vec<_> = asset.applications.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(apps, ["bash", "openssh-server"]);

    let raw = &snapshot.raw;
    assert!(raw.failures.is_empty());
    assert_eq!(raw.sockets.as_ref().unwrap()[0].pid, Some(812));
    assert_eq!(
        raw.ports.as_ref().unwrap().web_targets,
        vec!["http://localhost:80", "localhost"]
    );
    assert_eq!(raw.ports.as_ref().unwrap().address.as_deref(), Some("127.0.0.1"));

    let cached = scanner.cache().load("localhost").await.unwrap().unwrap();
    assert_eq!(cached, snapshot);
}

#[tokio::test]
async fn failed_sub_scan_falls_back_to_cached_result() {
    let cache_dir = tempfile::tempdir().unwrap();
    let first = scanner(healthy_linux(), &cache_dir)
        .run_unified_scan(&request())
        .await
        .unwrap();

    let degraded = healthy_linux().fail(&nmap()).fail(&lynis_audit());
    let snapshot = scanner(degraded, &cache_dir).scan(&request()).await.unwrap();

    assert_eq!(snapshot.asset.id, first.id);
    assert!(snapshot.asset.services.iter().any(|s| s.name == "ssh" && s.port == Some(22)));
    assert_eq!(snapshot.asset.health_score, 79);

    let failed: Vec<_> = snapshot.raw.failures.iter().map(|f| f.sub_scan).collect();
    assert_eq!(failed, [SubScan::Ports, SubScan::HardeningAudit]);
    assert!(snapshot.raw.failures.iter().all(|f| f.recovered_from_cache));
    assert_eq!(snapshot.raw.failures[0].tool, nmap().command_line());
}

#[tokio::test]
async fn timed_out_port_scan_falls_back_to_cached_result() {
    let cache_dir = tempfile::tempdir().unwrap();
    scanner(healthy_linux(), &cache_dir).scan(&request()).await.unwrap();

    let runner = healthy_linux().time_out(&nmap());
    let snapshot = scanner(runner, &cache_dir).scan(&request()).await.unwrap();

    let [failure] = snapshot.raw.failures.as_slice() else {
        panic!("expected one failure, got {:?}", snapshot.raw.failures);
    };
    assert_eq!(failure.sub_scan, SubScan::Ports);
    assert_eq!(failure.tool, nmap().command_line());
    assert!(failure.reason.contains("timed out"), "{}", failure.reason);
    assert!(failure.recovered_from_cache);

    let ports = snapshot.raw.ports.as_ref().unwrap();
    assert!(ports.open_ports().any(|p| p.port == 22));
    assert!(snapshot.asset.services.iter().any(|s| s.name == "ssh" && s.port == Some(22)));
}

#[test]
fn option_like_target_is_refused() {
    let err = ScanRequest::new("--script=/tmp/evil.nse").unwrap_err();
    assert!(matches!(err, ScanError::InvalidTarget { .. }));
}

#[tokio::test]
async fn failed_sub_scan_without_cache_degrades_quietly() {
    let cache_dir = tempfile::tempdir().unwrap();
    let runner = healthy_linux().fail(&nmap()).fail(&lynis_audit());

    let snapshot = scanner(runner, &cache_dir).scan(&request()).await.unwrap();

    assert!(snapshot.raw.ports.is_none());
    assert!(snapshot.raw.detailed.is_none());
    assert!(snapshot.asset.applications.is_empty());
    assert_eq!(snapshot.asset.health_score, 100);
    assert_eq!(snapshot.raw.failures.len(), 2);
    assert!(snapshot.raw.failures.iter().all(|f| !f.recovered_from_cache));
}

#[tokio::test]
async fn base_inventory_failure_without_cache_is_fatal() {
    let cache_dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::default().reply(&nmap(), NMAP_XML);

    let err = scanner(runner, &cache_dir).scan(&request()).await.unwrap_err();

    assert!(matches!(
        err,
        ScanError::NoCacheAvailable {
            sub_scan: SubScan::SystemInfo,
            ..
        }
    ));
    assert!(ResultCache::new(cache_dir.path())
        .load("localhost")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn base_inventory_failure_recovers_from_cache() {
    let cache_dir = tempfile::tempdir().unwrap();
    scanner(healthy_linux(), &cache_dir).scan(&request()).await.unwrap();

    let runner = ScriptedRunner::default().reply(&nmap(), NMAP_XML);
    let snapshot = scanner(runner, &cache_dir).scan(&request()).await.unwrap();

    assert_eq!(snapshot.asset.hostname, "web-01");
    assert_eq!(snapshot.raw.failures[0].sub_scan, SubScan::SystemInfo);
    assert!(snapshot.raw.failures[0].recovered_from_cache);
}

#[tokio::test]
async fn missing_auditor_is_skipped_not_failed() {
    let cache_dir = tempfile::tempdir().unwrap();
    let runner = base_only_linux().reply(&nmap(), NMAP_XML);

    let scanner = scanner(runner, &cache_dir);
    let snapshot = scanner.scan(&request().without(SubScan::Sockets)).await.unwrap();

    assert!(snapshot.raw.detailed.is_none());
    assert!(snapshot.raw.sockets.is_none());
    assert!(snapshot.raw.failures.is_empty());
    assert!(snapshot.asset.applications.is_empty());
    assert_eq!(snapshot.asset.os.name, "Linux");
    assert!(!scanner.runner().called("ss"));
    assert!(!scanner.runner().called("dpkg-query"));
}

#[tokio::test]
async fn unrequested_sub_scans_are_not_run() {
    let cache_dir = tempfile::tempdir().unwrap();
    let scanner = scanner(healthy_linux(), &cache_dir);
    let request = request()
        .without(SubScan::Ports)
        .without(SubScan::HardeningAudit);

    let snapshot = scanner.scan(&request).await.unwrap();

    assert!(snapshot.raw.ports.is_none());
    assert!(snapshot.raw.sockets.is_some());
    assert!(!scanner.runner().called("nmap"));
    assert!(!scanner.runner().called("lynis"));
}

#[tokio::test]
async fn short_ip_list_is_derived_from_interfaces_when_missing() {
    let cache_dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::default()
        .reply(&platform::hostname_invocation(), "web-01\n")
        .reply(&ToolInvocation::new("ip", ["a"]), IP_A);

    let request = request()
        .without(SubScan::Ports)
        .without(SubScan::Sockets);
    let snapshot = scanner(runner, &cache_dir).scan(&request).await.unwrap();

    assert_eq!(snapshot.asset.ip_addresses, ["10.0.0.5"]);
    assert!(snapshot.raw.failures.is_empty());
}

#[tokio::test]
async fn cancellation_aborts_in_flight_tools() {
    let cache_dir = tempfile::tempdir().unwrap();
    let runner = healthy_linux().hang(&nmap());
    let scanner = scanner(runner, &cache_dir);

    let result = scanner
        .run_until_cancelled(&request(), tokio::time::sleep(Duration::from_millis(50)))
        .await;

    assert!(matches!(result, Err(ScanError::Cancelled { .. })));
    assert!(scanner.cache().load("localhost").await.unwrap().is_none());
}

// ============================================================================
// Other platforms
// ============================================================================

#[tokio::test]
async fn unknown_os_gets_base_inventory_only() {
    let cache_dir = tempfile::tempdir().unwrap();
    let scanner = scanner(healthy_linux(), &cache_dir).with_os(OsKind::Unknown);

    let snapshot = scanner.scan(&request()).await.unwrap();

    assert!(snapshot.raw.detailed.is_none());
    assert_eq!(snapshot.raw.os, OsKind::Unknown);
    assert!(!scanner.runner().called("lynis"));
}

#[tokio::test]
async fn windows_management_report() {
    let cache_dir = tempfile::tempdir().unwrap();
    let (interfaces, _) = platform::interface_invocation(OsKind::Windows);
    let [native_hive, wow64_hive] = platform::windows_software();
    let runner = ScriptedRunner::default()
        .reply(&platform::hostname_invocation(), "DESKTOP-42\r\n")
        .reply(
            &interfaces,
            r#"[{"InterfaceAlias":"Ethernet","IPAddress":"192.168.1.30","PrefixLength":24,"AddressFamily":2},
                {"InterfaceAlias":"Loopback Pseudo-Interface 1","IPAddress":"127.0.0.1","PrefixLength":8,"AddressFamily":2}]"#,
        )
        .reply(&platform::shell_precheck(), "True\r\n")
        .reply(
            &platform::windows_system_info(),
            r#"{"Hostname":"DESKTOP-42","Caption":"Microsoft Windows 11 Pro","Version":"10.0.22631",
                "BuildNumber":"22631","OSArchitecture":"64-bit","LastBootUpTime":"2024-05-01T08:00:00+00:00"}"#,
        )
        .reply(
            &platform::windows_services(),
            r#"[{"Name":"Spooler","DisplayName":"Print Spooler","Status":4,"StartType":2}]"#,
        )
        .reply(
            &native_hive,
            r#"{"DisplayName":"Git","DisplayVersion":"2.45.0","Publisher":"The Git Development Community"}"#,
        )
        .fail(&wow64_hive);
    let scanner = Scanner::new(runner, ResultCache::new(cache_dir.path()))
        .with_os(OsKind::Windows);

    let snapshot = scanner
        .scan(&request().without(SubScan::Ports).without(SubScan::Sockets))
        .await
        .unwrap();
    let asset = &snapshot.asset;

    assert_eq!(asset.hostname, "DESKTOP-42");
    assert_eq!(asset.ip_addresses, ["192.168.1.30"]);
    assert_eq!(asset.os.name, "Windows 11 Pro");
    assert_eq!(asset.os.build_number, "22631");
    assert_eq!(asset.os.architecture, "64-bit");
    assert_eq!(asset.services[0].name, "Spooler");
    assert_eq!(asset.services[0].start_type, "automatic");
    assert_eq!(asset.applications[0].publisher, "The Git Development Community");
    assert_eq!(asset.health_score, 100);

    let Some(DetailedScan::Management(report)) = &snapshot.raw.detailed else {
        panic!("expected a management report, got {:?}", snapshot.raw.detailed);
    };
    assert!(report.elevated);
    // The WSL bridge is enabled by default but `wsl` is not installed here.
    assert!(report.hardening.is_none());
}

#[tokio::test]
async fn windows_without_shell_uses_wsl_bridge() {
    let cache_dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::default()
        .reply(&platform::hostname_invocation(), "DESKTOP-42\n")
        .reply(&platform::lynis_installed_check(Bridge::Wsl), "3.0.9\n")
        .reply(&platform::lynis_audit(Bridge::Wsl, false), LYNIS);
    let scanner = Scanner::new(runner, ResultCache::new(cache_dir.path()))
        .with_os(OsKind::Windows);

    let snapshot = scanner
        .scan(&request().without(SubScan::Ports).without(SubScan::Sockets))
        .await
        .unwrap();

    assert!(matches!(snapshot.raw.detailed, Some(DetailedScan::Hardening(_))));
    assert_eq!(snapshot.asset.health_score, 79);
    assert_eq!(snapshot.asset.ip_address, "127.0.0.1");
}
