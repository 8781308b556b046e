//! Batch orchestration.
//!
//! Drives every target through resolve -> geolocate -> (diagnose) and
//! assembles the ordered [`ResultSet`] handed to the map renderer. A failing
//! target only ends its own pipeline; the rest of the batch carries on.

use crate::auth::ApiToken;
use crate::diagnostics::{
    select_hop_endpoint, DiagnosticResult, DiagnosticsRunner, PingOutcome, TraceOutcome,
};
use crate::geo::{GeoLocator, GeoRecord, LookupError, LookupErrorKind, PublicIpSource};
use crate::map::{MapRenderer, PointRole, RenderError, ResultSet, TaggedPoint};
use crate::resolver::NameResolver;
use crate::target::{Target, TargetKind};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Instant;

/// Errors that stop a batch before any target is processed.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("no API token available; set IPINFO_TOKEN or run `yougotmapped token set`")]
    MissingToken,
    #[error("could not determine your public IP: {0}")]
    PublicIpUnavailable(#[source] LookupError),
}

/// What to do for each target beyond the geolocation lookup.
#[derive(Debug, Clone)]
pub struct LocateOptions {
    pub ping: bool,
    pub traceroute: bool,
    /// Targets processed at once; results keep input order regardless
    pub concurrency: usize,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            ping: false,
            traceroute: false,
            concurrency: 1,
        }
    }
}

impl LocateOptions {
    fn diagnostics_requested(&self) -> bool {
        self.ping || self.traceroute
    }
}

/// Stages of a single target's pipeline
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocateStage {
    Resolving,
    Locating,
    Pinging,
    Tracing,
    LocatingHop,
    Done,
    Failed,
}

/// Progress update for one target
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocateProgress {
    /// Zero-based position of the target in the batch
    pub index: usize,
    pub total: usize,
    pub target: String,
    pub stage: LocateStage,
    pub message: String,
}

/// Callback type for progress updates
pub type ProgressCallback = Box<dyn Fn(LocateProgress) + Send + Sync>;

/// Terminal state of one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetOutcome {
    Located {
        record: GeoRecord,
        #[serde(skip_serializing_if = "Option::is_none")]
        diagnostics: Option<DiagnosticResult>,
        /// Location of the last addressed traceroute hop, when found
        #[serde(skip_serializing_if = "Option::is_none")]
        hop_endpoint: Option<GeoRecord>,
    },
    ResolveFailed {
        reason: String,
    },
    LookupFailed {
        /// Distinguishes authentication problems from missing data
        kind: LookupErrorKind,
        reason: String,
    },
}

/// Per-target entry of the textual report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetReport {
    pub target: String,
    pub kind: &'static str,
    /// Address that was geolocated, if resolution got that far
    pub address: Option<IpAddr>,
    #[serde(flatten)]
    pub outcome: TargetOutcome,
}

impl TargetReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TargetOutcome::Located { .. })
    }
}

/// Everything a batch produced.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// One entry per target, in input order
    pub targets: Vec<TargetReport>,
    /// Renderer input, in the same order
    pub points: ResultSet,
    /// True when the input was empty and the caller's public IP was used
    pub used_public_ip: bool,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.targets.iter().filter(|t| t.is_success()).count()
    }

    /// Hand the mappable points to `renderer`, once. Returns `None` without
    /// invoking the renderer when no target produced coordinates.
    pub fn render(&self, renderer: &dyn MapRenderer) -> Result<Option<PathBuf>, RenderError> {
        if self.points.is_empty() {
            tracing::info!("No mappable points, skipping map");
            return Ok(None);
        }
        let path = renderer.render(&self.points)?;
        tracing::info!("Map with {} points written to {:?}", self.points.len(), path);
        Ok(Some(path))
    }
}

/// Coordinates the collaborators for a batch of targets.
pub struct Orchestrator {
    resolver: Box<dyn NameResolver>,
    locator: Box<dyn GeoLocator>,
    diagnostics: Box<dyn DiagnosticsRunner>,
    public_ip: Box<dyn PublicIpSource>,
    on_progress: Option<ProgressCallback>,
}

impl Orchestrator {
    pub fn new(
        resolver: Box<dyn NameResolver>,
        locator: Box<dyn GeoLocator>,
        diagnostics: Box<dyn DiagnosticsRunner>,
        public_ip: Box<dyn PublicIpSource>,
    ) -> Self {
        Self {
            resolver,
            locator,
            diagnostics,
            public_ip,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Process a batch.
    ///
    /// Fails only for batch-level problems (no token, no public IP for an
    /// empty input). Per-target failures are recorded in the report.
    pub async fn run(
        &self,
        targets: Vec<Target>,
        token: Option<&ApiToken>,
        options: &LocateOptions,
    ) -> Result<BatchReport, BatchError> {
        let token = token.ok_or(BatchError::MissingToken)?;
        let batch_start = Instant::now();

        let (targets, used_public_ip) = if targets.is_empty() {
            let ip = self
                .public_ip
                .public_ip()
                .await
                .map_err(BatchError::PublicIpUnavailable)?;
            tracing::info!("No targets given, using public IP {}", ip);
            (vec![Target::from_address(ip)], true)
        } else {
            (targets, false)
        };

        let total = targets.len();
        let concurrency = options.concurrency.max(1);
        tracing::info!("Locating {} targets (concurrency {})", total, concurrency);

        // `buffered` yields in input order whatever order the futures finish in
        let reports: Vec<TargetReport> = stream::iter(targets.iter().enumerate())
            .map(|(index, target)| self.process_target(index, total, target, token, options))
            .buffered(concurrency)
            .collect()
            .await;

        let points = assemble_points(&reports);
        tracing::info!(
            "Batch complete: {}/{} targets located, {} mappable points in {:.1}s",
            reports.iter().filter(|r| r.is_success()).count(),
            total,
            points.len(),
            batch_start.elapsed().as_secs_f64()
        );

        Ok(BatchReport {
            targets: reports,
            points,
            used_public_ip,
            generated_at: chrono::Utc::now(),
        })
    }

    fn emit(
        &self,
        index: usize,
        total: usize,
        target: &Target,
        stage: LocateStage,
        message: String,
    ) {
        tracing::debug!("[{}/{}] {}: {}", index + 1, total, target, message);
        if let Some(ref callback) = self.on_progress {
            callback(LocateProgress {
                index,
                total,
                target: target.to_string(),
                stage,
                message,
            });
        }
    }

    async fn process_target(
        &self,
        index: usize,
        total: usize,
        target: &Target,
        token: &ApiToken,
        options: &LocateOptions,
    ) -> TargetReport {
        let kind = target.kind();
        let progress = |stage, message| self.emit(index, total, target, stage, message);
        let report = |address: Option<IpAddr>, outcome: TargetOutcome| TargetReport {
            target: target.to_string(),
            kind: kind.label(),
            address,
            outcome,
        };

        // Resolve
        let address = match &kind {
            TargetKind::Address(addr) => *addr,
            TargetKind::Name(name) => {
                progress(LocateStage::Resolving, format!("Resolving {}", name));
                match self.resolver.resolve(name).await {
                    Ok(addr) => addr,
                    Err(e) => {
                        tracing::warn!("Skipping {}: {}", target, e);
                        progress(LocateStage::Failed, e.to_string());
                        let reason = e.to_string();
                        return report(None, TargetOutcome::ResolveFailed { reason });
                    }
                }
            }
        };

        // Geolocate
        progress(
            LocateStage::Locating,
            format!("Looking up location for {}", address),
        );
        let record = match self.locator.lookup(address, token).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Lookup failed for {} ({}): {}", target, address, e);
                progress(LocateStage::Failed, e.to_string());
                let outcome = TargetOutcome::LookupFailed {
                    kind: e.kind(),
                    reason: e.to_string(),
                };
                return report(Some(address), outcome);
            }
        };
        if !record.is_mappable() {
            tracing::info!("{} has no coordinates and will not be mapped", address);
        }

        // Diagnose
        let (diagnostics, hop_endpoint) = if options.diagnostics_requested() {
            let (result, hop) = self
                .diagnose(index, total, target, address, token, options)
                .await;
            (Some(result), hop)
        } else {
            (None, None)
        };

        progress(LocateStage::Done, "Located".to_string());
        report(
            Some(address),
            TargetOutcome::Located {
                record,
                diagnostics,
                hop_endpoint,
            },
        )
    }

    /// Run the requested diagnostics. Failures are recorded, never raised.
    async fn diagnose(
        &self,
        index: usize,
        total: usize,
        target: &Target,
        address: IpAddr,
        token: &ApiToken,
        options: &LocateOptions,
    ) -> (DiagnosticResult, Option<GeoRecord>) {
        let probe = address.to_string();
        let progress = |stage, message| self.emit(index, total, target, stage, message);
        let mut result = DiagnosticResult::default();
        let mut hop_endpoint = None;

        if options.ping {
            progress(LocateStage::Pinging, format!("Pinging {}", probe));
            result.ping = Some(match self.diagnostics.ping(&probe).await {
                Ok(latency_ms) => PingOutcome::Reply { latency_ms },
                Err(e) => {
                    tracing::warn!("Ping to {} failed: {}", probe, e);
                    PingOutcome::Failed { reason: e.to_string() }
                }
            });
        }

        if options.traceroute {
            progress(LocateStage::Tracing, format!("Tracing route to {}", probe));
            match self.diagnostics.traceroute(&probe).await {
                Ok(hops) => {
                    if let Some(hop_addr) = select_hop_endpoint(&hops).and_then(|h| h.address) {
                        progress(
                            LocateStage::LocatingHop,
                            format!("Looking up last hop {}", hop_addr),
                        );
                        hop_endpoint = match self.locator.lookup(hop_addr, token).await {
                            Ok(record) => Some(record),
                            Err(e) => {
                                tracing::debug!(
                                    "Hop endpoint lookup for {} failed: {}",
                                    hop_addr,
                                    e
                                );
                                None
                            }
                        };
                    } else {
                        tracing::debug!("No addressed hop in route to {}", probe);
                    }
                    result.traceroute = Some(TraceOutcome::Completed { hops });
                }
                Err(e) => {
                    tracing::warn!("Traceroute to {} failed: {}", probe, e);
                    result.traceroute = Some(TraceOutcome::Failed { reason: e.to_string() });
                }
            }
        }

        (result, hop_endpoint)
    }
}

/// Build the renderer input from reports in input order. A hop endpoint is
/// placed directly after its target's primary point, and only when that
/// primary point itself is mappable.
fn assemble_points(reports: &[TargetReport]) -> ResultSet {
    let mut points = ResultSet::new();
    for report in reports {
        if let TargetOutcome::Located {
            record,
            hop_endpoint,
            ..
        } = &report.outcome
        {
            let Some(primary) = TaggedPoint::new(&report.target, record.clone(), PointRole::Primary)
            else {
                continue;
            };
            points.push(primary);

            if let Some(hop) = hop_endpoint
                .clone()
                .and_then(|r| TaggedPoint::new(&report.target, r, PointRole::HopEndpoint))
            {
                points.push(hop);
            }
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{parse_traceroute, DiagnosticError, Hop};
    use crate::geo::Coordinates;
    use crate::resolver::ResolveError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct Calls {
        resolve: AtomicUsize,
        lookup: AtomicUsize,
        ping: AtomicUsize,
        trace: AtomicUsize,
        public_ip: AtomicUsize,
        looked_up: Mutex<Vec<IpAddr>>,
    }

    impl Calls {
        fn total(&self) -> usize {
            self.resolve.load(Ordering::SeqCst)
                + self.lookup.load(Ordering::SeqCst)
                + self.ping.load(Ordering::SeqCst)
                + self.trace.load(Ordering::SeqCst)
                + self.public_ip.load(Ordering::SeqCst)
        }
    }

    struct MockResolver {
        calls: Arc<Calls>,
        names: HashMap<&'static str, &'static str>,
    }

    #[async_trait]
    impl NameResolver for MockResolver {
        async fn resolve(&self, name: &str) -> Result<IpAddr, ResolveError> {
            self.calls.resolve.fetch_add(1, Ordering::SeqCst);
            self.names
                .get(name)
                .map(|a| a.parse().unwrap())
                .ok_or_else(|| ResolveError::NoAddress(name.to_string()))
        }
    }

    struct MockLocator {
        calls: Arc<Calls>,
        records: HashMap<&'static str, Option<(f64, f64)>>,
        /// Per-address artificial latency, to shuffle completion order
        delays: HashMap<&'static str, u64>,
    }

    #[async_trait]
    impl GeoLocator for MockLocator {
        async fn lookup(
            &self,
            address: IpAddr,
            _token: &ApiToken,
        ) -> Result<GeoRecord, LookupError> {
            self.calls.lookup.fetch_add(1, Ordering::SeqCst);
            self.calls.looked_up.lock().unwrap().push(address);
            let key = address.to_string();
            if let Some(ms) = self.delays.get(key.as_str()) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            match self.records.get(key.as_str()) {
                Some(loc) => Ok(GeoRecord {
                    ip: key.clone(),
                    hostname: None,
                    city: Some(format!("City of {}", key)),
                    region: None,
                    country: Some("US".to_string()),
                    coordinates: loc.map(|(latitude, longitude)| Coordinates {
                        latitude,
                        longitude,
                    }),
                    org: None,
                    postal: None,
                    timezone: None,
                    bogon: false,
                }),
                None => Err(LookupError::NotFound(key)),
            }
        }
    }

    struct MockDiagnostics {
        calls: Arc<Calls>,
        trace_output: HashMap<&'static str, &'static str>,
    }

    #[async_trait]
    impl DiagnosticsRunner for MockDiagnostics {
        async fn ping(&self, target: &str) -> Result<f64, DiagnosticError> {
            self.calls.ping.fetch_add(1, Ordering::SeqCst);
            if target == "9.9.9.9" {
                Err(DiagnosticError::Unreachable)
            } else {
                Ok(12.5)
            }
        }

        async fn traceroute(&self, target: &str) -> Result<Vec<Hop>, DiagnosticError> {
            self.calls.trace.fetch_add(1, Ordering::SeqCst);
            self.trace_output
                .get(target)
                .map(|out| parse_traceroute(out))
                .ok_or_else(|| DiagnosticError::Unavailable("traceroute"))
        }
    }

    struct MockPublicIp {
        calls: Arc<Calls>,
        ip: Option<&'static str>,
    }

    #[async_trait]
    impl PublicIpSource for MockPublicIp {
        async fn public_ip(&self) -> Result<IpAddr, LookupError> {
            self.calls.public_ip.fetch_add(1, Ordering::SeqCst);
            self.ip
                .map(|ip| ip.parse().unwrap())
                .ok_or_else(|| LookupError::Network("offline".to_string()))
        }
    }

    const TRACE_TO_EXAMPLE: &str = "\
traceroute to 93.184.216.34 (93.184.216.34), 30 hops max
 1  _gateway (192.168.1.1)  0.4 ms
 2  edge.isp.example (203.0.113.9)  8.0 ms
 3  *
";

    const TRACE_TO_QUAD9: &str = "\
 1  _gateway (192.168.1.1)  0.4 ms
 2  unmapped.example (198.51.100.77)  9.1 ms
";

    // 192.0.2.99 is unknown to the mock locator
    const TRACE_TO_CLOUDFLARE: &str = "\
 1  _gateway (192.168.1.1)  0.4 ms
 2  unknown.example (192.0.2.99)  7.2 ms
 3  *
";

    /// Renderer that records what it was handed
    #[derive(Default)]
    struct MockRenderer {
        calls: AtomicUsize,
        rendered: Mutex<Vec<(String, PointRole)>>,
    }

    impl MapRenderer for MockRenderer {
        fn render(&self, points: &ResultSet) -> Result<PathBuf, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut rendered = self.rendered.lock().unwrap();
            for p in points.points() {
                rendered.push((p.record().ip.clone(), p.role()));
            }
            Ok(PathBuf::from("map.html"))
        }
    }

    struct Harness {
        calls: Arc<Calls>,
        orchestrator: Orchestrator,
    }

    fn harness_with(
        delays: HashMap<&'static str, u64>,
        public_ip: Option<&'static str>,
    ) -> Harness {
        let calls = Arc::new(Calls::default());
        let orchestrator = Orchestrator::new(
            Box::new(MockResolver {
                calls: calls.clone(),
                names: HashMap::from([
                    ("example.com", "93.184.216.34"),
                    ("dns.quad9.net", "9.9.9.9"),
                ]),
            }),
            Box::new(MockLocator {
                calls: calls.clone(),
                records: HashMap::from([
                    ("8.8.8.8", Some((37.4, -122.1))),
                    ("1.1.1.1", Some((-33.9, 151.2))),
                    ("93.184.216.34", Some((42.2, -70.8))),
                    ("9.9.9.9", Some((47.6, 8.5))),
                    ("10.0.0.1", None),
                    ("203.0.113.9", Some((40.7, -74.0))),
                    ("198.51.100.77", None),
                    ("192.0.2.50", Some((1.0, 1.0))),
                ]),
                delays,
            }),
            Box::new(MockDiagnostics {
                calls: calls.clone(),
                trace_output: HashMap::from([
                    ("93.184.216.34", TRACE_TO_EXAMPLE),
                    ("9.9.9.9", TRACE_TO_QUAD9),
                    ("1.1.1.1", TRACE_TO_CLOUDFLARE),
                ]),
            }),
            Box::new(MockPublicIp {
                calls: calls.clone(),
                ip: public_ip,
            }),
        );
        Harness { calls, orchestrator }
    }

    fn harness() -> Harness {
        harness_with(HashMap::new(), Some("192.0.2.50"))
    }

    fn targets(raw: &[&str]) -> Vec<Target> {
        raw.iter().map(|t| Target::new(*t).unwrap()).collect()
    }

    fn token() -> ApiToken {
        ApiToken::new("test-token").unwrap()
    }

    fn point_summary(report: &BatchReport) -> Vec<(String, String, PointRole)> {
        report
            .points
            .points()
            .iter()
            .map(|p| (p.target().to_string(), p.record().ip.clone(), p.role()))
            .collect()
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_any_call() {
        let h = harness();
        let err = h
            .orchestrator
            .run(targets(&["8.8.8.8", "example.com"]), None, &LocateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::MissingToken));
        assert_eq!(h.calls.total(), 0);
    }

    #[tokio::test]
    async fn test_unresolvable_domain_does_not_stop_batch() {
        let h = harness();
        let report = h
            .orchestrator
            .run(
                targets(&["8.8.8.8", "not-a-real-domain.invalid"]),
                Some(&token()),
                &LocateOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(report.targets.len(), 2);
        assert!(report.targets[0].is_success());
        assert_eq!(report.targets[1].target, "not-a-real-domain.invalid");
        assert!(matches!(report.targets[1].outcome, TargetOutcome::ResolveFailed { .. }));
        assert_eq!(report.targets[1].address, None);
        assert_eq!(report.points.len(), 1);
        assert_eq!(report.points.points()[0].record().ip, "8.8.8.8");
        assert_eq!(report.succeeded(), 1);
    }

    #[tokio::test]
    async fn test_report_has_one_entry_per_target_in_order() {
        let h = harness();
        let input = ["1.1.1.1", "example.com", "bogus.invalid", "203.0.113.250", "8.8.8.8"];
        let report = h
            .orchestrator
            .run(targets(&input), Some(&token()), &LocateOptions::default())
            .await
            .unwrap();

        let names: Vec<&str> = report.targets.iter().map(|t| t.target.as_str()).collect();
        assert_eq!(names, input);
        assert!(matches!(
            report.targets[3].outcome,
            TargetOutcome::LookupFailed {
                kind: LookupErrorKind::NotFound,
                ..
            }
        ));
        let json = serde_json::to_value(&report.targets[3]).unwrap();
        assert_eq!(json["status"], "lookup_failed");
        assert_eq!(json["kind"], "not_found");
        assert_eq!(report.targets[3].address, Some("203.0.113.250".parse().unwrap()));
        assert_eq!(report.targets[1].kind, "name");
        assert_eq!(report.targets[0].kind, "address");
        assert!(!report.used_public_ip);
    }

    #[tokio::test]
    async fn test_record_without_coordinates_is_reported_not_mapped() {
        let h = harness();
        let report = h
            .orchestrator
            .run(targets(&["10.0.0.1"]), Some(&token()), &LocateOptions::default())
            .await
            .unwrap();

        assert!(report.targets[0].is_success());
        assert!(report.points.is_empty());
    }

    #[tokio::test]
    async fn test_empty_input_uses_public_ip() {
        let h = harness();
        let report = h
            .orchestrator
            .run(Vec::new(), Some(&token()), &LocateOptions::default())
            .await
            .unwrap();

        assert!(report.used_public_ip);
        assert_eq!(report.targets.len(), 1);
        assert_eq!(report.targets[0].target, "192.0.2.50");
        assert_eq!(h.calls.public_ip.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_public_ip_failure_is_fatal() {
        let h = harness_with(HashMap::new(), None);
        let err = h
            .orchestrator
            .run(Vec::new(), Some(&token()), &LocateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::PublicIpUnavailable(_)));
        assert_eq!(h.calls.lookup.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_diagnostics_unless_requested() {
        let h = harness();
        let report = h
            .orchestrator
            .run(targets(&["example.com"]), Some(&token()), &LocateOptions::default())
            .await
            .unwrap();

        assert_eq!(h.calls.ping.load(Ordering::SeqCst), 0);
        assert_eq!(h.calls.trace.load(Ordering::SeqCst), 0);
        match &report.targets[0].outcome {
            TargetOutcome::Located { diagnostics, hop_endpoint, .. } => {
                assert!(diagnostics.is_none());
                assert!(hop_endpoint.is_none());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hop_endpoint_follows_its_primary() {
        let h = harness();
        let options = LocateOptions {
            ping: true,
            traceroute: true,
            concurrency: 1,
        };
        let report = h
            .orchestrator
            .run(targets(&["example.com", "8.8.8.8"]), Some(&token()), &options)
            .await
            .unwrap();

        assert_eq!(
            point_summary(&report),
            vec![
                ("example.com".to_string(), "93.184.216.34".to_string(), PointRole::Primary),
                ("example.com".to_string(), "203.0.113.9".to_string(), PointRole::HopEndpoint),
                ("8.8.8.8".to_string(), "8.8.8.8".to_string(), PointRole::Primary),
            ]
        );
        assert_ne!(report.points.points()[0].color(), report.points.points()[1].color());

        // Last hop with an address is hop 2; hop 3 is anonymous
        assert!(h
            .calls
            .looked_up
            .lock()
            .unwrap()
            .contains(&"203.0.113.9".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_diagnostic_failures_keep_primary_point() {
        let h = harness();
        let options = LocateOptions {
            ping: true,
            traceroute: true,
            concurrency: 1,
        };
        // 8.8.8.8 has no scripted traceroute; 9.9.9.9 fails ping and its
        // last hop has no coordinates
        let report = h
            .orchestrator
            .run(targets(&["8.8.8.8", "dns.quad9.net"]), Some(&token()), &options)
            .await
            .unwrap();

        assert_eq!(report.points.len(), 2);
        assert!(report.points.points().iter().all(|p| p.role() == PointRole::Primary));

        match &report.targets[0].outcome {
            TargetOutcome::Located { diagnostics: Some(diag), hop_endpoint, .. } => {
                assert_eq!(diag.ping, Some(PingOutcome::Reply { latency_ms: 12.5 }));
                assert!(matches!(diag.traceroute, Some(TraceOutcome::Failed { .. })));
                assert!(hop_endpoint.is_none());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        match &report.targets[1].outcome {
            TargetOutcome::Located { diagnostics: Some(diag), hop_endpoint, .. } => {
                assert!(matches!(diag.ping, Some(PingOutcome::Failed { .. })));
                assert!(matches!(
                    diag.traceroute,
                    Some(TraceOutcome::Completed { ref hops }) if hops.len() == 2
                ));
                // Lookup succeeded but without coordinates: reported, not mapped
                assert_eq!(hop_endpoint.as_ref().map(|r| r.ip.as_str()), Some("198.51.100.77"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ping_only_skips_traceroute() {
        let h = harness();
        let options = LocateOptions {
            ping: true,
            traceroute: false,
            concurrency: 1,
        };
        h.orchestrator
            .run(targets(&["example.com"]), Some(&token()), &options)
            .await
            .unwrap();
        assert_eq!(h.calls.ping.load(Ordering::SeqCst), 1);
        assert_eq!(h.calls.trace.load(Ordering::SeqCst), 0);
        assert_eq!(h.calls.lookup.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_run_keeps_input_order() {
        // First target finishes last
        let delays = HashMap::from([("8.8.8.8", 60), ("1.1.1.1", 20), ("93.184.216.34", 0)]);
        let input = ["8.8.8.8", "1.1.1.1", "example.com"];
        let options = LocateOptions {
            ping: false,
            traceroute: true,
            concurrency: 3,
        };

        let sequential = harness_with(delays.clone(), None)
            .orchestrator
            .run(
                targets(&input),
                Some(&token()),
                &LocateOptions {
                    concurrency: 1,
                    ..options.clone()
                },
            )
            .await
            .unwrap();
        let concurrent = harness_with(delays, None)
            .orchestrator
            .run(targets(&input), Some(&token()), &options)
            .await
            .unwrap();

        assert_eq!(point_summary(&sequential), point_summary(&concurrent));
        assert_eq!(
            concurrent.targets.iter().map(|t| t.target.as_str()).collect::<Vec<_>>(),
            input
        );
    }

    #[tokio::test]
    async fn test_repeated_runs_are_identical() {
        let h = harness();
        let options = LocateOptions {
            ping: true,
            traceroute: true,
            concurrency: 2,
        };
        let input = targets(&["example.com", "1.1.1.1", "dns.quad9.net"]);
        let first = h.orchestrator.run(input.clone(), Some(&token()), &options).await.unwrap();
        let second = h.orchestrator.run(input, Some(&token()), &options).await.unwrap();
        assert_eq!(first.points, second.points);
        assert_eq!(first.targets, second.targets);
    }

    #[tokio::test]
    async fn test_progress_events_emitted() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let h = harness();
        let orchestrator = h.orchestrator.with_progress(Box::new(move |p: LocateProgress| {
            sink.lock().unwrap().push((p.index, p.stage));
        }));

        orchestrator
            .run(
                targets(&["example.com", "nope.invalid"]),
                Some(&token()),
                &LocateOptions::default(),
            )
            .await
            .unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                (0, LocateStage::Resolving),
                (0, LocateStage::Locating),
                (0, LocateStage::Done),
                (1, LocateStage::Resolving),
                (1, LocateStage::Failed),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_hop_lookup_keeps_primary_only() {
        let h = harness();
        let options = LocateOptions {
            ping: false,
            traceroute: true,
            concurrency: 1,
        };
        let report = h
            .orchestrator
            .run(targets(&["1.1.1.1"]), Some(&token()), &options)
            .await
            .unwrap();

        assert!(h
            .calls
            .looked_up
            .lock()
            .unwrap()
            .contains(&"192.0.2.99".parse().unwrap()));
        assert_eq!(
            point_summary(&report),
            vec![("1.1.1.1".to_string(), "1.1.1.1".to_string(), PointRole::Primary)]
        );
        match &report.targets[0].outcome {
            TargetOutcome::Located {
                diagnostics: Some(diag),
                hop_endpoint,
                ..
            } => {
                assert!(matches!(diag.traceroute, Some(TraceOutcome::Completed { .. })));
                assert!(hop_endpoint.is_none());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_renderer_not_invoked_without_coordinates() {
        let h = harness();
        let renderer = MockRenderer::default();

        let report = h
            .orchestrator
            .run(
                targets(&["10.0.0.1", "bogus.invalid", "203.0.113.250"]),
                Some(&token()),
                &LocateOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(report.render(&renderer).unwrap(), None);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_renderer_invoked_once_with_ordered_points() {
        let h = harness();
        let renderer = MockRenderer::default();
        let options = LocateOptions {
            ping: false,
            traceroute: true,
            concurrency: 2,
        };

        let report = h
            .orchestrator
            .run(targets(&["example.com", "bogus.invalid", "8.8.8.8"]), Some(&token()), &options)
            .await
            .unwrap();

        assert_eq!(
            report.render(&renderer).unwrap(),
            Some(PathBuf::from("map.html"))
        );
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *renderer.rendered.lock().unwrap(),
            vec![
                ("93.184.216.34".to_string(), PointRole::Primary),
                ("203.0.113.9".to_string(), PointRole::HopEndpoint),
                ("8.8.8.8".to_string(), PointRole::Primary),
            ]
        );
    }

    #[test]
    fn test_hop_without_mappable_primary_is_dropped() {
        let unmapped = GeoRecord {
            ip: "10.0.0.1".to_string(),
            hostname: None,
            city: None,
            region: None,
            country: None,
            coordinates: None,
            org: None,
            postal: None,
            timezone: None,
            bogon: true,
        };
        let hop = GeoRecord {
            ip: "203.0.113.9".to_string(),
            coordinates: Some(Coordinates {
                latitude: 1.0,
                longitude: 2.0,
            }),
            ..unmapped.clone()
        };
        let reports = vec![TargetReport {
            target: "10.0.0.1".to_string(),
            kind: "address",
            address: Some("10.0.0.1".parse().unwrap()),
            outcome: TargetOutcome::Located {
                record: unmapped,
                diagnostics: None,
                hop_endpoint: Some(hop),
            },
        }];
        assert!(assemble_points(&reports).is_empty());
    }
}
