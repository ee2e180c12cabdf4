use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::Arc;

use rampr_core::{EventFn, HistogramSummary, ProgressUpdate, RunEvent, RunReport};

use super::{OutputFormatter, RunHeader};

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _header: &RunHeader<'_>) {}

    fn on_event(&self) -> Option<EventFn> {
        Some(Arc::new(|event: &RunEvent| match event {
            RunEvent::Progress(u) => emit_json_line(&build_progress_line(u)),
            RunEvent::Cancelled { elapsed } => emit_json_line(&JsonCancelledLine {
                kind: "cancelled",
                elapsed_secs: elapsed.as_secs_f64(),
            }),
            RunEvent::Started { .. } | RunEvent::RunComplete(_) => {}
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        emit_json_line(&build_summary_line(report));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub total_secs: f64,
    pub stage: usize,
    pub stages: usize,
    pub target: u64,
    pub running_vus: u64,
    pub retiring_vus: u64,
    pub max_vus: u64,
    pub draining: bool,

    pub requests_per_sec: f64,
    pub iterations_per_sec: f64,

    pub total_requests: u64,
    pub failed_requests_total: u64,
    pub total_iterations: u64,
    pub checks_failed_total: u64,

    pub latency_p50: Option<f64>,
    pub latency_p90: Option<f64>,
    pub latency_p99: Option<f64>,
    pub latency_max: Option<f64>,
}

#[derive(Debug, Serialize)]
struct JsonCancelledLine {
    kind: &'static str,
    elapsed_secs: f64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    let m = &u.metrics;
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        total_secs: u.total_duration.as_secs_f64(),
        stage: u.stage.index + 1,
        stages: u.stage.count,
        target: u.target,
        running_vus: u.running_vus,
        retiring_vus: u.retiring_vus,
        max_vus: u.max_vus,
        draining: u.draining,

        requests_per_sec: u.rps_now,
        iterations_per_sec: u.iterations_per_sec_now,

        total_requests: m.requests_total(),
        failed_requests_total: m.requests_failed_total(),
        total_iterations: m.iterations.total(),
        checks_failed_total: m.checks_failed_total(),

        latency_p50: m.latency.p50,
        latency_p90: m.latency.p90,
        latency_p99: m.latency.p99,
        latency_max: m.latency.max,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub elapsed_secs: f64,
    pub cancelled: bool,
    pub peak_running_vus: u64,
    pub vus_started_total: u64,
    pub rps_mean: f64,
    pub rps_max: f64,
    pub iterations: JsonIterations,
    pub requests: BTreeMap<String, JsonRequestSummary>,
    pub checks: BTreeMap<String, JsonCheckCounts>,
    pub totals: JsonTotals,
    pub iteration_duration: Option<JsonLatencySummary>,
    pub latency: Option<JsonLatencySummary>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonIterations {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub panicked: u64,
    pub timed_out: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonRequestSummary {
    pub total: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub bytes_received: u64,
    pub statuses: BTreeMap<String, u64>,
    pub errors: BTreeMap<String, u64>,
    pub latency: Option<JsonLatencySummary>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCheckCounts {
    pub passed: u64,
    pub failed: u64,
}

/// Microseconds.
#[derive(Debug, Serialize)]
pub(crate) struct JsonLatencySummary {
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonTotals {
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub bytes_received_total: u64,
    pub iterations_total: u64,
    pub checks_passed_total: u64,
    pub checks_failed_total: u64,
}

fn latency(h: &HistogramSummary) -> Option<JsonLatencySummary> {
    (h.count > 0).then(|| JsonLatencySummary {
        p50: h.p50,
        p75: h.p75,
        p90: h.p90,
        p95: h.p95,
        p99: h.p99,
        min: h.min,
        max: h.max,
        mean: h.mean,
        stdev: h.stdev,
        count: h.count,
    })
}

fn build_summary_line(report: &RunReport) -> JsonSummaryLine {
    let m = &report.metrics;

    let requests = m
        .requests
        .iter()
        .map(|(label, r)| {
            let summary = JsonRequestSummary {
                total: r.total,
                failed: r.failed,
                timeouts: r.timeouts,
                bytes_received: r.bytes_received,
                statuses: r
                    .statuses
                    .iter()
                    .map(|(status, n)| (status.to_string(), *n))
                    .collect(),
                errors: r
                    .errors
                    .iter()
                    .map(|(kind, n)| (kind.to_string(), *n))
                    .collect(),
                latency: latency(&r.latency),
            };
            (label.clone(), summary)
        })
        .collect();

    let checks = m
        .checks
        .iter()
        .map(|(name, c)| {
            (
                name.clone(),
                JsonCheckCounts {
                    passed: c.passed,
                    failed: c.failed,
                },
            )
        })
        .collect();

    JsonSummaryLine {
        kind: "summary",
        elapsed_secs: report.elapsed.as_secs_f64(),
        cancelled: report.cancelled,
        peak_running_vus: report.peak_running_vus,
        vus_started_total: m.vus_started_total,
        rps_mean: report.rps_mean,
        rps_max: report.rps_max,
        iterations: JsonIterations {
            total: m.iterations.total(),
            completed: m.iterations.completed,
            failed: m.iterations.failed,
            panicked: m.iterations.panicked,
            timed_out: m.iterations.timed_out,
        },
        requests,
        checks,
        totals: JsonTotals {
            requests_total: m.requests_total(),
            failed_requests_total: m.requests_failed_total(),
            bytes_received_total: m.bytes_received_total(),
            iterations_total: m.iterations.total(),
            checks_passed_total: m.checks_passed_total(),
            checks_failed_total: m.checks_failed_total(),
        },
        iteration_duration: latency(&m.iteration_duration),
        latency: latency(&m.latency),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::test_support::sample_report;
    use serde_json::Value;

    fn to_value<T: Serialize>(line: &T) -> Value {
        match serde_json::to_value(line) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        }
    }

    #[test]
    fn summary_line_has_totals_and_per_label_breakdown() {
        let v = to_value(&build_summary_line(&sample_report(false)));

        assert_eq!(v.get("kind").and_then(Value::as_str), Some("summary"));
        assert_eq!(v.get("cancelled").and_then(Value::as_bool), Some(false));
        assert_eq!(
            v.pointer("/totals/requests_total").and_then(Value::as_u64),
            Some(3)
        );
        assert_eq!(
            v.pointer("/totals/checks_failed_total").and_then(Value::as_u64),
            Some(1)
        );
        assert_eq!(
            v.pointer("/requests/stringinate/timeouts").and_then(Value::as_u64),
            Some(1)
        );
        assert_eq!(
            v.pointer("/requests/stringinate/statuses/200").and_then(Value::as_u64),
            Some(1)
        );
        assert_eq!(
            v.pointer("/requests/stringinate/errors/timeout").and_then(Value::as_u64),
            Some(1)
        );
        assert_eq!(
            v.pointer("/checks/stats status is 200/passed").and_then(Value::as_u64),
            Some(1)
        );
        assert_eq!(
            v.pointer("/iterations/timed_out").and_then(Value::as_u64),
            Some(1)
        );
        assert_eq!(v.pointer("/latency/count").and_then(Value::as_u64), Some(3));
    }

    #[test]
    fn summary_line_flags_cancellation() {
        let v = to_value(&build_summary_line(&sample_report(true)));
        assert_eq!(v.get("cancelled").and_then(Value::as_bool), Some(true));
    }
}
