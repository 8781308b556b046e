//! Path discovery using the system traceroute command

use super::{hidden_command, run_bounded, DiagnosticError, Hop};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

#[cfg(target_os = "windows")]
pub(crate) const TRACEROUTE_PROGRAM: &str = "tracert";
#[cfg(not(target_os = "windows"))]
pub(crate) const TRACEROUTE_PROGRAM: &str = "traceroute";

/// Per-probe wait, in seconds
const PROBE_WAIT_SECS: u64 = 2;

/// Trace the path to a host.
pub(crate) async fn trace_host(
    program: &Path,
    target: &str,
    max_hops: u8,
    timeout: Duration,
) -> Result<Vec<Hop>, DiagnosticError> {
    let mut cmd = hidden_command(program);
    let max_hops = max_hops.to_string();

    #[cfg(target_os = "windows")]
    cmd.args([
        "-h",
        &max_hops,
        "-w",
        &(PROBE_WAIT_SECS * 1000).to_string(),
        target,
    ]);

    #[cfg(not(target_os = "windows"))]
    cmd.args([
        "-m",
        &max_hops,
        "-q",
        "1",
        "-w",
        &PROBE_WAIT_SECS.to_string(),
        target,
    ]);

    tracing::debug!("Tracing route to {} (max {} hops)", target, max_hops);
    let output = run_bounded(TRACEROUTE_PROGRAM, cmd, timeout).await?;
    let hops = parse_traceroute(&String::from_utf8_lossy(&output.stdout));

    if hops.is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        return Err(DiagnosticError::Failed(if stderr.is_empty() {
            format!("{} printed no hops", TRACEROUTE_PROGRAM)
        } else {
            stderr.to_string()
        }));
    }

    Ok(hops)
}

/// Parse traceroute/tracert output into hops.
///
/// Lines that do not start with a hop number (headers, trailers) are skipped.
pub fn parse_traceroute(output: &str) -> Vec<Hop> {
    output.lines().filter_map(parse_hop_line).collect()
}

fn parse_hop_line(line: &str) -> Option<Hop> {
    let mut tokens = line.split_whitespace();
    let index: u32 = tokens.next()?.parse().ok()?;
    let rest: Vec<&str> = tokens.collect();

    let mut address = None;
    let mut hostname = None;

    // `name (addr)` on unix, `name [addr]` on windows
    for (i, token) in rest.iter().enumerate() {
        let inner = token
            .strip_prefix('(')
            .and_then(|t| t.strip_suffix(')'))
            .or_else(|| token.strip_prefix('[').and_then(|t| t.strip_suffix(']')));
        if let Some(addr) = inner.and_then(|t| t.parse::<IpAddr>().ok()) {
            address = Some(addr);
            hostname = i
                .checked_sub(1)
                .map(|prev| rest[prev])
                .filter(|name| name.parse::<IpAddr>().is_err() && !is_timing_token(name))
                .map(str::to_string);
            break;
        }
    }

    // Numeric output prints the bare address
    if address.is_none() {
        address = rest.iter().find_map(|t| t.parse::<IpAddr>().ok());
    }

    Some(Hop {
        index,
        address,
        hostname,
        rtt_ms: parse_first_rtt(&rest),
        raw: line.trim().to_string(),
    })
}

fn is_timing_token(token: &str) -> bool {
    token == "*"
        || token == "ms"
        || token
            .strip_suffix("ms")
            .is_some_and(|v| v.trim_start_matches('<').parse::<f64>().is_ok())
}

fn parse_first_rtt(tokens: &[&str]) -> Option<f64> {
    for (i, token) in tokens.iter().enumerate() {
        let number = if let Some(value) = token.strip_suffix("ms").filter(|v| !v.is_empty()) {
            value
        } else if tokens.get(i + 1) == Some(&"ms") {
            token
        } else {
            continue;
        };
        if let Ok(rtt) = number.trim_start_matches('<').parse::<f64>() {
            return Some(rtt);
        }
    }
    None
}

/// Pick the hop whose location stands in for the end of the path: scanning
/// from the last hop backward, the first one that printed an address.
/// Trailing anonymous hops (`* * *`) are passed over.
pub fn select_hop_endpoint(hops: &[Hop]) -> Option<&Hop> {
    hops.iter().rev().find(|hop| hop.address.is_some())
}
