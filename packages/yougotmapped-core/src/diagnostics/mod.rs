//! Network diagnostics using the system `ping` and `traceroute` tools.
//!
//! Both tools are run as child processes under a hard timeout; a child that
//! outlives its timeout is killed so one unreachable target cannot stall a batch.

pub mod capabilities;
mod ping;
mod traceroute;

pub use capabilities::{detect_capabilities, DiagnosticCapabilities, ToolStatus};
pub use traceroute::{parse_traceroute, select_hop_endpoint};

use crate::config::AppConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum DiagnosticError {
    #[error("{0} is not installed or not on PATH")]
    Unavailable(&'static str),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    TimedOut {
        program: &'static str,
        timeout: Duration,
    },
    #[error("host unreachable")]
    Unreachable,
    #[error("{0}")]
    Failed(String),
}

/// One line of a traceroute path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub index: u32,
    /// Address printed on the hop line, absent for `* * *` hops
    pub address: Option<IpAddr>,
    pub hostname: Option<String>,
    pub rtt_ms: Option<f64>,
    /// Line as printed by the tool
    pub raw: String,
}

/// Result of a ping, attached to the target's report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PingOutcome {
    Reply { latency_ms: f64 },
    Failed { reason: String },
}

/// Result of a traceroute, attached to the target's report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TraceOutcome {
    Completed { hops: Vec<Hop> },
    Failed { reason: String },
}

/// Diagnostics gathered for one target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub ping: Option<PingOutcome>,
    pub traceroute: Option<TraceOutcome>,
}

/// Latency and path probes against a single target.
#[async_trait]
pub trait DiagnosticsRunner: Send + Sync {
    /// Round-trip time in milliseconds.
    async fn ping(&self, target: &str) -> Result<f64, DiagnosticError>;
    /// Hops in the order the tool printed them.
    async fn traceroute(&self, target: &str) -> Result<Vec<Hop>, DiagnosticError>;
}

/// Runner that shells out to the platform tools.
///
/// Tools are spawned from the paths [`detect_capabilities`] reports, so a
/// tool found in an sbin directory missing from `PATH` still runs.
#[derive(Debug, Clone)]
pub struct SystemDiagnostics {
    ping_program: PathBuf,
    traceroute_program: PathBuf,
    ping_timeout: Duration,
    traceroute_timeout: Duration,
    max_hops: u8,
}

impl SystemDiagnostics {
    pub fn new(ping_timeout: Duration, traceroute_timeout: Duration, max_hops: u8) -> Self {
        Self::with_capabilities(
            &detect_capabilities(),
            ping_timeout,
            traceroute_timeout,
            max_hops,
        )
    }

    pub fn with_capabilities(
        capabilities: &DiagnosticCapabilities,
        ping_timeout: Duration,
        traceroute_timeout: Duration,
        max_hops: u8,
    ) -> Self {
        let ping_program = capabilities.ping.command_path();
        let traceroute_program = capabilities.traceroute.command_path();
        tracing::debug!(
            "Diagnostics using {} and {}",
            ping_program.display(),
            traceroute_program.display()
        );
        Self {
            ping_program,
            traceroute_program,
            ping_timeout,
            traceroute_timeout,
            max_hops,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.ping_timeout,
            config.traceroute_timeout,
            config.max_hops,
        )
    }
}

#[async_trait]
impl DiagnosticsRunner for SystemDiagnostics {
    async fn ping(&self, target: &str) -> Result<f64, DiagnosticError> {
        ping::ping_host(&self.ping_program, target, self.ping_timeout).await
    }

    async fn traceroute(&self, target: &str) -> Result<Vec<Hop>, DiagnosticError> {
        traceroute::trace_host(
            &self.traceroute_program,
            target,
            self.max_hops,
            self.traceroute_timeout,
        )
        .await
    }
}

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Create a Command that hides the console window on Windows and is killed
/// when dropped.
pub(crate) fn hidden_command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    cmd.kill_on_drop(true);
    #[cfg(target_os = "windows")]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Run a prepared command, bounded by `limit`.
pub(crate) async fn run_bounded(
    program: &'static str,
    mut cmd: Command,
    limit: Duration,
) -> Result<std::process::Output, DiagnosticError> {
    match tokio::time::timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(DiagnosticError::Unavailable(program))
        }
        Ok(Err(e)) => Err(DiagnosticError::Spawn { program, source: e }),
        Err(_) => Err(DiagnosticError::TimedOut {
            program,
            timeout: limit,
        }),
    }
}
