//! Human-readable batch report

use yougotmapped_core::diagnostics::select_hop_endpoint;
use yougotmapped_core::{
    BatchReport, DiagnosticResult, GeoRecord, PingOutcome, TargetOutcome, TargetReport,
    TraceOutcome,
};

/// Print one block per target, in input order.
pub fn print_text(batch: &BatchReport) {
    for (i, target) in batch.targets.iter().enumerate() {
        println!();
        for line in target_lines(i, batch.targets.len(), target) {
            println!("{}", line);
        }
    }
    println!();
    println!(
        "{} of {} targets located, {} map points",
        batch.succeeded(),
        batch.targets.len(),
        batch.points.len()
    );
}

fn target_lines(index: usize, total: usize, report: &TargetReport) -> Vec<String> {
    let mut lines = vec![format!("[{}/{}] {}", index + 1, total, report.target)];

    match &report.outcome {
        TargetOutcome::Located {
            record,
            diagnostics,
            hop_endpoint,
        } => {
            lines.push("Geolocation Info:".to_string());
            lines.extend(record_lines(record));
            if !record.is_mappable() {
                lines.push("  (no coordinates, not shown on the map)".to_string());
            }
            if let Some(diag) = diagnostics {
                lines.extend(diagnostic_lines(diag, hop_endpoint.as_ref()));
            }
        }
        TargetOutcome::ResolveFailed { reason } => {
            lines.push(format!("  Failed to resolve: {}", reason));
        }
        TargetOutcome::LookupFailed { reason, .. } => {
            let address = report
                .address
                .map(|a| a.to_string())
                .unwrap_or_else(|| report.target.clone());
            lines.push(format!(
                "  Failed to get location data for {}: {}",
                address, reason
            ));
        }
    }

    lines
}

fn record_lines(record: &GeoRecord) -> Vec<String> {
    record
        .fields()
        .into_iter()
        .map(|(name, value)| format!("  {}: {}", name, value.as_deref().unwrap_or("N/A")))
        .collect()
}

fn place(record: &GeoRecord) -> String {
    let parts: Vec<&str> = [&record.city, &record.region, &record.country]
        .into_iter()
        .filter_map(|v| v.as_deref())
        .collect();
    if parts.is_empty() {
        "unknown location".to_string()
    } else {
        parts.join(", ")
    }
}

fn diagnostic_lines(diag: &DiagnosticResult, hop_endpoint: Option<&GeoRecord>) -> Vec<String> {
    let mut lines = Vec::new();

    match &diag.ping {
        Some(PingOutcome::Reply { latency_ms }) => {
            lines.push(format!("  Ping: {:.1} ms", latency_ms));
        }
        Some(PingOutcome::Failed { reason }) => {
            lines.push(format!("  Ping: failed ({})", reason));
        }
        None => {}
    }

    match &diag.traceroute {
        Some(TraceOutcome::Completed { hops }) => {
            lines.push(format!("  Traceroute: {} hops", hops.len()));
            for hop in hops {
                let rtt = hop
                    .rtt_ms
                    .map(|t| format!("{:.1}ms", t))
                    .unwrap_or_else(|| "-".to_string());
                let addr = hop
                    .address
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "*".to_string());
                let line = format!("    {:>2}  {:39} {:>9}", hop.index, addr, rtt);
                match &hop.hostname {
                    Some(name) => lines.push(format!("{}  {}", line, name)),
                    None => lines.push(line),
                }
            }
            if let Some(last) = select_hop_endpoint(hops).and_then(|h| h.address) {
                match hop_endpoint {
                    Some(record) => lines.push(format!("  Last hop {}: {}", last, place(record))),
                    None => lines.push(format!("  Last hop {}: location unavailable", last)),
                }
            }
        }
        Some(TraceOutcome::Failed { reason }) => {
            lines.push(format!("  Traceroute: failed ({})", reason));
        }
        None => {}
    }

    lines
}
