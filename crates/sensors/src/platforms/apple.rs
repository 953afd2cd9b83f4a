//! Apple-silicon sensors: GPU load, power and temperature via
//! `powermetrics`. Requires elevated privileges; any failure yields an
//! empty map.

use std::collections::BTreeMap;
use std::process::Command;

/// Poll the Apple GPU subset. Best-effort: returns an empty map when
/// `powermetrics` is unavailable or unreadable.
pub fn poll_apple_metrics() -> BTreeMap<String, f64> {
    let output = Command::new("powermetrics")
        .args(["--samplers", "gpu_power", "-i", "200", "-n", "1"])
        .output();

    match output {
        Ok(out) if out.status.success() => {
            parse_powermetrics(&String::from_utf8_lossy(&out.stdout))
        }
        Ok(out) => {
            tracing::debug!(code = ?out.status.code(), "powermetrics exited nonzero");
            BTreeMap::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "powermetrics unavailable");
            BTreeMap::new()
        }
    }
}

/// Parse the plain-text powermetrics GPU sampler output.
fn parse_powermetrics(text: &str) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();

    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("GPU HW active residency:") {
            if let Some(pct) = leading_number(rest) {
                metrics.insert("perf_system_gpu_load".to_string(), pct);
            }
        } else if let Some(rest) = line.strip_prefix("GPU Power:") {
            if let Some(mw) = leading_number(rest) {
                metrics.insert("perf_system_gpu_power_mw".to_string(), mw);
            }
        } else if let Some(rest) = line.strip_prefix("GPU die temperature:") {
            if let Some(celsius) = leading_number(rest) {
                metrics.insert("perf_system_gpu_temp_c".to_string(), celsius);
            }
        }
    }
    metrics
}

fn leading_number(s: &str) -> Option<f64> {
    let trimmed = s.trim_start();
    let end = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sampler_output() {
        let sample = "\
*** GPU usage ***\n\
GPU HW active residency:  12.34 %\n\
GPU Power: 156 mW\n\
GPU die temperature: 48.2 C\n";
        let metrics = parse_powermetrics(sample);
        assert_eq!(metrics["perf_system_gpu_load"], 12.34);
        assert_eq!(metrics["perf_system_gpu_power_mw"], 156.0);
        assert_eq!(metrics["perf_system_gpu_temp_c"], 48.2);
    }

    #[test]
    fn garbage_yields_empty_map() {
        assert!(parse_powermetrics("no gpu lines here").is_empty());
    }
}
