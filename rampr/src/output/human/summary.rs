use std::fmt::Write as _;

use rampr_core::{HistogramSummary, RunReport};

use super::format::*;

pub(crate) fn render(report: &RunReport) -> String {
    let m = &report.metrics;
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(
        out,
        "  elapsed: {}{}",
        format_elapsed(report.elapsed),
        if report.cancelled { " (cancelled)" } else { "" }
    )
    .ok();
    writeln!(
        out,
        "  vus: peak {} started {}",
        report.peak_running_vus, m.vus_started_total
    )
    .ok();
    writeln!(
        out,
        "  iterations: {} (completed {} failed {} panicked {} timed_out {})",
        m.iterations.total(),
        m.iterations.completed,
        m.iterations.failed,
        m.iterations.panicked,
        m.iterations.timed_out
    )
    .ok();
    write_latency(&mut out, "  iteration_duration", &m.iteration_duration);

    if !m.requests.is_empty() {
        out.push_str("\nrequests\n");
    }
    for (label, r) in &m.requests {
        writeln!(
            out,
            "  {label}: {} (failed {} timeouts {}) recv {}",
            r.total,
            r.failed,
            r.timeouts,
            format_bytes(r.bytes_received)
        )
        .ok();
        if !r.statuses.is_empty() {
            let statuses = r
                .statuses
                .iter()
                .map(|(status, n)| format!("{status}={n}"))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(out, "    status: {statuses}").ok();
        }
        if !r.errors.is_empty() {
            let errors = r
                .errors
                .iter()
                .map(|(kind, n)| format!("{kind}={n}"))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(out, "    errors: {errors}").ok();
        }
        write_latency(&mut out, "    latency", &r.latency);
    }

    if !m.checks.is_empty() {
        out.push_str("\nchecks\n");
    }
    for (name, c) in &m.checks {
        let status = if c.failed > 0 { "FAIL" } else { "OK" };
        writeln!(out, "  {name}: pass={} fail={} [{status}]", c.passed, c.failed).ok();
    }

    out.push_str("\ntotals\n");
    let requests_total = m.requests_total();
    let failed_total = m.requests_failed_total();
    writeln!(
        out,
        "  requests: {requests_total} (failed {failed_total}, {})",
        format_percent(failed_total, requests_total)
    )
    .ok();
    writeln!(out, "  bytes: recv {}", format_bytes(m.bytes_received_total())).ok();

    let secs = report.elapsed.as_secs_f64().max(1e-9);
    writeln!(
        out,
        "  rates: rps={} (tick mean {} max {}) iters/s={}",
        format_rate((requests_total as f64) / secs),
        format_rate(report.rps_mean),
        format_rate(report.rps_max),
        format_rate((m.iterations.total() as f64) / secs)
    )
    .ok();
    writeln!(
        out,
        "  checks: passed {} failed {}",
        m.checks_passed_total(),
        m.checks_failed_total()
    )
    .ok();
    write_latency(&mut out, "  latency", &m.latency);

    out
}

fn write_latency(out: &mut String, prefix: &str, h: &HistogramSummary) {
    if h.count == 0 {
        writeln!(out, "{prefix}: n/a").ok();
        return;
    }
    writeln!(
        out,
        "{prefix} = p50={} p90={} p95={} p99={} mean={} max={} (n={})",
        format_micros_opt(h.p50),
        format_micros_opt(h.p90),
        format_micros_opt(h.p95),
        format_micros_opt(h.p99),
        format_micros_opt(h.mean),
        format_micros_opt(h.max),
        h.count
    )
    .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::test_support::sample_report;

    #[test]
    fn render_includes_requests_checks_and_totals() {
        let text = render(&sample_report(false));

        assert!(text.contains("elapsed: 10s\n"), "{text}");
        assert!(text.contains("vus: peak 2 started 2"));
        assert!(text.contains("iterations: 2 (completed 1 failed 0 panicked 0 timed_out 1)"));
        assert!(text.contains("  stringinate: 2 (failed 1 timeouts 1) recv 2.00KiB"));
        assert!(text.contains("    status: 200=1"));
        assert!(text.contains("    errors: timeout=1"));
        assert!(text.contains("stringinate status is 200: pass=1 fail=1 [FAIL]"));
        assert!(text.contains("stats status is 200: pass=1 fail=0 [OK]"));
        assert!(text.contains("requests: 3 (failed 1, 33.33%)"));
        assert!(text.contains("checks: passed 2 failed 1"));
        assert!(text.contains("rates: rps="));
    }

    #[test]
    fn render_marks_cancelled_runs() {
        let text = render(&sample_report(true));
        assert!(text.contains("elapsed: 10s (cancelled)"));
    }
}
