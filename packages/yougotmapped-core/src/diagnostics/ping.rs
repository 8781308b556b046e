//! Single-host latency probe using the system ping command

use super::{hidden_command, run_bounded, DiagnosticError};
use std::path::Path;
use std::time::{Duration, Instant};

pub(crate) const PING_PROGRAM: &str = "ping";

/// Extra time granted to the child on top of its own reply timeout
const PROCESS_GRACE: Duration = Duration::from_secs(2);

/// Ping a host once and return the round-trip time in milliseconds.
pub(crate) async fn ping_host(
    program: &Path,
    target: &str,
    timeout: Duration,
) -> Result<f64, DiagnosticError> {
    let mut cmd = hidden_command(program);

    #[cfg(target_os = "windows")]
    cmd.args(["-n", "1", "-w", &timeout.as_millis().to_string(), target]);

    #[cfg(target_os = "macos")]
    cmd.args(["-c", "1", "-t", &timeout.as_secs().max(1).to_string(), target]);

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    cmd.args(["-c", "1", "-W", &timeout.as_secs().max(1).to_string(), target]);

    let start = Instant::now();
    let output = run_bounded(PING_PROGRAM, cmd, timeout + PROCESS_GRACE).await?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let output_str = String::from_utf8_lossy(&output.stdout);

    #[cfg(target_os = "windows")]
    {
        let output_lower = output_str.to_lowercase();
        if output_lower.contains("request timed out")
            || output_lower.contains("destination host unreachable")
            || output_lower.contains("transmit failed")
            || output_lower.contains("general failure")
            || !output_lower.contains("reply from")
        {
            return Err(DiagnosticError::Unreachable);
        }
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if stderr.is_empty() {
            return Err(DiagnosticError::Unreachable);
        }
        return Err(DiagnosticError::Failed(stderr.to_string()));
    }

    let latency = parse_ping_time(&output_str).unwrap_or(elapsed_ms);
    tracing::debug!("Ping {} -> {:.1}ms", target, latency);
    Ok(latency)
}

/// Parse ping response time from command output
pub(crate) fn parse_ping_time(output: &str) -> Option<f64> {
    for word in output.split_whitespace() {
        if word.starts_with("time=") || word.starts_with("time<") {
            let time_str = word
                .trim_start_matches("time=")
                .trim_start_matches("time<")
                .trim_end_matches("ms");

            if let Ok(time) = time_str.parse::<f64>() {
                return Some(time);
            }
        }
    }
    None
}
