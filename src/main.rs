// src/main.rs

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{eyre, Result, WrapErr};
use tracing::info;

use assetscan::core::models::{ScanRequest, SubScan, DEFAULT_TARGET};
use assetscan::{logging, ResultCache, ScanConfig, ScanSnapshot, Scanner};

#[derive(Parser)]
#[command(name = "assetscan")]
#[command(about = "Point-in-time inventory and security snapshot of a host.")]
struct CommandLine {
    /// Host name or IP address to scan
    #[arg(default_value = DEFAULT_TARGET)]
    target: String,
    /// Skip the port scan
    #[arg(long)]
    no_ports: bool,
    /// Skip the socket listing
    #[arg(long)]
    no_sockets: bool,
    /// Skip the hardening audit / management-shell report
    #[arg(long)]
    no_audit: bool,
    /// Per-tool timeout in seconds (the audit keeps its own, longer limit)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Where snapshots are cached
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
    /// Print the whole snapshot (raw bundle included) instead of the asset
    #[arg(long)]
    raw: bool,
    /// Print the last cached snapshot without scanning
    #[arg(long)]
    show_cached: bool,
    /// Mirror the log to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = CommandLine::parse();
    logging::initialize_logging(cli.verbose)?;

    let mut config = ScanConfig::load().wrap_err("failed to load configuration")?;
    if let Some(dir) = cli.cache_dir.clone() {
        config.cache_dir = dir;
    }
    if let Some(secs) = cli.timeout {
        config.tool_timeout_secs = secs.max(1);
    }

    let mut request = ScanRequest::new(cli.target.as_str())?;

    if cli.show_cached {
        let cache = ResultCache::new(&config.cache_dir);
        let snapshot = cache
            .load(request.target())
            .await?
            .ok_or_else(|| eyre!("no cached snapshot for {}", request.target()))?;
        return print_json(&snapshot, cli.raw);
    }

    request = request
        .with_tool_timeout(config.tool_timeout())
        .with_audit_timeout(config.audit_timeout().max(Duration::from_secs(1)));
    for (skip, sub_scan) in [
        (cli.no_ports, SubScan::Ports),
        (cli.no_sockets, SubScan::Sockets),
        (cli.no_audit, SubScan::HardeningAudit),
    ] {
        if skip {
            request = request.without(sub_scan);
        }
    }

    let scanner = Scanner::from_config(&config);
    info!(target = request.target(), os = %scanner.os(), "assetscan starting.");
    let ctrl_c = async {
        // If the handler can't be installed the scan simply runs to completion.
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let snapshot = scanner.run_until_cancelled(&request, ctrl_c).await?;
    print_json(&snapshot, cli.raw)
}

fn print_json(snapshot: &ScanSnapshot, raw: bool) -> Result<()> {
    let json = if raw {
        serde_json::to_string_pretty(snapshot)?
    } else {
        serde_json::to_string_pretty(&snapshot.asset)?
    };
    println!("{json}");
    Ok(())
}
