// src/core/scanner/mod.rs

// The orchestrator, plus one module per sub-scan.
pub mod base_scanner;
pub mod detailed_scanner;
pub mod port_scanner;
pub mod socket_scanner;

use std::future::Future;

use tracing::{error, info, warn};

use crate::config::ScanConfig;
use crate::core::cache::ResultCache;
use crate::core::error::ScanError;
use crate::core::models::{
    Asset, RawBundle, ScanRequest, ScanSnapshot, SubScan, SubScanFailure,
};
use crate::core::platform::{self, OsKind, PlatformOptions};
use crate::core::reconciler;
use crate::core::runner::{ProcessRunner, ToolRunner};
use self::base_scanner::run_base_scan;
use self::detailed_scanner::{run_detailed_scan, DetailedOutcome, DetailedTimeouts};
use self::port_scanner::run_port_scan;
use self::socket_scanner::run_socket_scan;

/// Request-scoped record of what had to be recovered, and from which snapshot.
struct ScanContext<'a> {
    target: &'a str,
    previous: Option<&'a ScanSnapshot>,
    failures: Vec<SubScanFailure>,
}

impl<'a> ScanContext<'a> {
    fn new(target: &'a str, previous: Option<&'a ScanSnapshot>) -> Self {
        Self {
            target,
            previous,
            failures: Vec::new(),
        }
    }

    /// Passes a live result through, or substitutes the cached one for `sub_scan`.
    /// Each failure is recorded and logged once, whether or not the cache had data.
    fn recover<T>(
        &mut self,
        sub_scan: SubScan,
        result: Result<T, ScanError>,
        from_cache: impl FnOnce(&RawBundle) -> Option<T>,
    ) -> Option<T> {
        let error = match result {
            Ok(value) => return Some(value),
            Err(error) => error,
        };
        let cached = self.previous.and_then(|snapshot| from_cache(&snapshot.raw));
        let tool = error.tool().unwrap_or("-").to_string();

        warn!(
            target = self.target,
            %sub_scan,
            tool = %tool,
            reason = %error,
            recovered_from_cache = cached.is_some(),
            "Sub-scan failed."
        );
        self.failures.push(SubScanFailure {
            sub_scan,
            tool,
            reason: error.to_string(),
            recovered_from_cache: cached.is_some(),
        });
        cached
    }
}

/// Runs unified scans of one host with an injectable tool runner.
pub struct Scanner<R: ToolRunner = ProcessRunner> {
    runner: R,
    cache: ResultCache,
    os: OsKind,
    options: PlatformOptions,
}

impl Scanner<ProcessRunner> {
    /// A scanner that spawns real processes, configured from `config`.
    pub fn from_config(config: &ScanConfig) -> Self {
        Scanner::new(ProcessRunner, ResultCache::new(&config.cache_dir))
            .with_options(config.platform_options())
    }
}

impl<R: ToolRunner> Scanner<R> {
    /// Creates a scanner for the OS this binary runs on.
    pub fn new(runner: R, cache: ResultCache) -> Self {
        Self {
            runner,
            cache,
            os: OsKind::detect(),
            options: PlatformOptions::default(),
        }
    }

    /// Overrides the detected OS.
    pub fn with_os(mut self, os: OsKind) -> Self {
        self.os = os;
        self
    }

    pub fn with_options(mut self, options: PlatformOptions) -> Self {
        self.options = options;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn os(&self) -> OsKind {
        self.os
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Scans the requested host and returns only the reconciled asset.
    pub async fn run_unified_scan(&self, request: &ScanRequest) -> Result<Asset, ScanError> {
        self.scan(request).await.map(|snapshot| snapshot.asset)
    }

    /// Like `scan`, but abandons the request as soon as `signal` resolves.
    ///
    /// Dropping the scan future drops every in-flight child process, and the runner
    /// spawns them with `kill_on_drop`, so nothing outlives the cancellation.
    pub async fn run_until_cancelled<F>(
        &self,
        request: &ScanRequest,
        signal: F,
    ) -> Result<ScanSnapshot, ScanError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.scan(request) => result,
            () = signal => {
                warn!(target = request.target(), "Scan cancelled.");
                Err(ScanError::Cancelled { target: request.target().to_string() })
            }
        }
    }

    /// Executes one unified scan.
    ///
    /// The base inventory, port and socket scans run concurrently; the detailed scan
    /// follows once they have settled. A failed sub-scan is replaced by its value from
    /// the previous snapshot for the target. The request only fails when the base
    /// inventory has neither a live nor a cached result.
    ///
    /// # Arguments
    ///
    /// * `request` - The target and the sub-scans to run.
    ///
    /// # Returns
    ///
    /// The snapshot that was persisted: reconciled asset plus raw bundle.
    pub async fn scan(&self, request: &ScanRequest) -> Result<ScanSnapshot, ScanError> {
        let target = request.target();
        info!(target, os = %self.os, "Starting unified scan.");

        let previous = match self.cache.load(target).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(target, error = %e, "Ignoring unreadable cached snapshot.");
                None
            }
        };
        let mut ctx = ScanContext::new(target, previous.as_ref());

        let runner: &dyn ToolRunner = &self.runner;
        let timeout = request.tool_timeout();
        let (base, ports, sockets) = tokio::join!(
            run_base_scan(runner, self.os, timeout),
            async {
                if request.wants(SubScan::Ports) {
                    Some(run_port_scan(runner, target, timeout).await)
                } else {
                    None
                }
            },
            async {
                if request.wants(SubScan::Sockets) {
                    Some(run_socket_scan(runner, self.os, timeout).await)
                } else {
                    None
                }
            },
        );

        let Some(base) = ctx.recover(SubScan::SystemInfo, base, |raw| raw.base.clone()) else {
            error!(target, "Base inventory failed and no cached copy exists.");
            return Err(ScanError::NoCacheAvailable {
                target: target.to_string(),
                sub_scan: SubScan::SystemInfo,
            });
        };
        let ports = ports.and_then(|r| ctx.recover(SubScan::Ports, r, |raw| raw.ports.clone()));
        let sockets =
            sockets.and_then(|r| ctx.recover(SubScan::Sockets, r, |raw| raw.sockets.clone()));

        let detailed = if request.wants(SubScan::HardeningAudit) {
            let plan = platform::detailed_plan(self.os, self.options);
            let timeouts = DetailedTimeouts {
                tool: timeout,
                audit: request.audit_timeout(),
            };
            match run_detailed_scan(runner, plan, timeouts).await {
                DetailedOutcome::NotApplicable => None,
                DetailedOutcome::Completed(scan) => Some(scan),
                DetailedOutcome::Failed(e) => {
                    ctx.recover(SubScan::HardeningAudit, Err(e), |raw| raw.detailed.clone())
                }
            }
        } else {
            None
        };

        let mut asset = reconciler::reconcile(Some(&base), ports.as_ref(), detailed.as_ref());
        if let Some(previous) = &previous {
            asset.id = previous.asset.id.clone();
        }

        let snapshot = ScanSnapshot {
            timestamp: asset.last_scan,
            target: target.to_string(),
            raw: RawBundle {
                target: target.to_string(),
                os: self.os,
                base: Some(base),
                ports,
                sockets,
                detailed,
                failures: ctx.failures,
            },
            asset,
        };

        if let Err(e) = self.cache.store(&snapshot).await {
            warn!(target, error = %e, "Could not persist snapshot; returning it anyway.");
        }

        info!(
            target,
            health_score = snapshot.asset.health_score,
            services = snapshot.asset.services.len(),
            applications = snapshot.asset.applications.len(),
            degraded = snapshot.raw.failures.len(),
            "Unified scan finished."
        );
        Ok(snapshot)
    }
}
