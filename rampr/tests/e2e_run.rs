mod common;

use std::collections::BTreeMap;

use anyhow::Context as _;
use rampr_testserver::TestServer;
use serde::Deserialize;

use common::{args, describe, run_rampr, status_code, write_scenario};

#[derive(Debug, Deserialize)]
struct ProgressLine {
    tick: u64,
    target: u64,
    running_vus: u64,
    max_vus: u64,
    draining: bool,
}

#[derive(Debug, Deserialize)]
struct RequestSummary {
    total: u64,
    failed: u64,
    statuses: BTreeMap<String, u64>,
    errors: BTreeMap<String, u64>,
}

#[derive(Debug, Deserialize)]
struct CheckCounts {
    passed: u64,
    failed: u64,
}

#[derive(Debug, Deserialize)]
struct Totals {
    requests_total: u64,
    failed_requests_total: u64,
    checks_failed_total: u64,
}

#[derive(Debug, Deserialize)]
struct Iterations {
    completed: u64,
}

#[derive(Debug, Deserialize)]
struct SummaryLine {
    cancelled: bool,
    peak_running_vus: u64,
    iterations: Iterations,
    requests: BTreeMap<String, RequestSummary>,
    checks: BTreeMap<String, CheckCounts>,
    totals: Totals,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind")]
enum JsonLine {
    #[serde(rename = "progress")]
    Progress(ProgressLine),

    #[serde(rename = "cancelled")]
    Cancelled {},

    #[serde(rename = "summary")]
    Summary(SummaryLine),
}

fn parse_lines(stdout: &[u8]) -> anyhow::Result<(Vec<ProgressLine>, SummaryLine)> {
    let text = String::from_utf8_lossy(stdout);
    let mut progress = Vec::new();
    let mut summary = None;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<JsonLine>(line).with_context(|| format!("line: {line}"))? {
            JsonLine::Progress(p) => progress.push(p),
            JsonLine::Cancelled {} => {}
            JsonLine::Summary(s) => summary = Some(s),
        }
    }
    let summary = summary.context("no summary line")?;
    Ok((progress, summary))
}

const STRINGINATOR: &str = r#"
name: stringinator
stages:
  - {duration: 0s, target: 3}
  - {duration: 2s, target: 3}
thinkTime: 50ms
requestTimeout: 5s
requests:
  - name: stringinate
    method: POST
    url: ${BASE_URL}/stringinate
    json:
      input: your-string-goes-here
    checks:
      - status: 200
      - name: stringinate echoes input
        bodyContains: your-string-goes-here
  - name: transform
    method: POST
    url: ${BASE_URL}/transform
    json:
      text: your string goes here
      transformation: uppercase
    checks:
      - status: 200
      - bodyContains: YOUR STRING GOES HERE
  - name: stats
    url: ${BASE_URL}/stats
    checks:
      - status: 200
"#;

#[tokio::test]
async fn e2e_json_run_reports_every_request_label() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = write_scenario(dir.path(), STRINGINATOR)?;

    let out = run_rampr(
        vec![
            "run".to_string(),
            path.display().to_string(),
            "--output".to_string(),
            "json".to_string(),
        ],
        vec![("BASE_URL".to_string(), server.base_url().to_string())],
    )
    .await?;
    let server_stringinate = server.stats().stringinate_total();
    let server_transform = server.stats().transform_total();
    server.shutdown().await;

    anyhow::ensure!(status_code(out.status) == 0, "{}", describe(&out));
    let (progress, summary) = parse_lines(&out.stdout)?;

    anyhow::ensure!(!progress.is_empty(), "no progress lines\n{}", describe(&out));
    anyhow::ensure!(progress.windows(2).all(|w| w[1].tick > w[0].tick));
    anyhow::ensure!(progress.iter().all(|p| p.running_vus <= p.max_vus));
    anyhow::ensure!(progress.first().is_some_and(|p| p.target == 3 && !p.draining));
    anyhow::ensure!(progress.last().is_some_and(|p| p.draining));

    anyhow::ensure!(!summary.cancelled);
    anyhow::ensure!(summary.peak_running_vus == 3);
    anyhow::ensure!(summary.iterations.completed > 0);
    anyhow::ensure!(summary.totals.failed_requests_total == 0, "{}", describe(&out));
    anyhow::ensure!(summary.totals.checks_failed_total == 0, "{}", describe(&out));

    for label in ["stringinate", "transform", "stats"] {
        let r = summary
            .requests
            .get(label)
            .with_context(|| format!("missing label {label}"))?;
        anyhow::ensure!(r.total > 0 && r.failed == 0, "{label}: {r:?}");
        anyhow::ensure!(r.statuses.get("200") == Some(&r.total), "{label}: {r:?}");
    }

    // The server saw exactly what was recorded.
    let stringinate = summary.requests.get("stringinate").map_or(0, |r| r.total);
    let transform = summary.requests.get("transform").map_or(0, |r| r.total);
    anyhow::ensure!(stringinate == server_stringinate, "{stringinate} != {server_stringinate}");
    anyhow::ensure!(transform == server_transform, "{transform} != {server_transform}");
    anyhow::ensure!(summary.totals.requests_total == stringinate * 3);

    let echo = summary
        .checks
        .get("stringinate echoes input")
        .context("missing named check")?;
    anyhow::ensure!(echo.passed == stringinate && echo.failed == 0);
    anyhow::ensure!(summary.checks.contains_key("transform body contains YOUR STRING GOES HERE"));

    Ok(())
}

#[tokio::test]
async fn e2e_transport_errors_are_recorded_not_fatal() -> anyhow::Result<()> {
    // Bind then drop a listener to get a port with nothing behind it.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .context("reserve port")?;

    let dir = tempfile::tempdir().context("tempdir")?;
    let path = write_scenario(
        dir.path(),
        r#"
stages:
  - {duration: 0s, target: 2}
  - {duration: 1s, target: 2}
thinkTime: 100ms
requests:
  - name: hello
    url: http://127.0.0.1:${PORT}/hello
    checks:
      - status: 200
"#,
    )?;

    let out = run_rampr(
        vec![
            "run".to_string(),
            path.display().to_string(),
            "--output".to_string(),
            "json".to_string(),
            "--env".to_string(),
            format!("PORT={port}"),
        ],
        Vec::new(),
    )
    .await?;

    anyhow::ensure!(status_code(out.status) == 10, "{}", describe(&out));
    let (_, summary) = parse_lines(&out.stdout)?;
    let hello = summary.requests.get("hello").context("missing label")?;
    anyhow::ensure!(hello.total > 0 && hello.failed == hello.total, "{hello:?}");
    anyhow::ensure!(hello.statuses.is_empty());
    anyhow::ensure!(hello.errors.values().sum::<u64>() == hello.total);
    // Each VU keeps iterating; errors never retire it.
    anyhow::ensure!(summary.iterations.completed == hello.total);
    Ok(())
}

#[tokio::test]
async fn e2e_human_output_prints_summary() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = write_scenario(dir.path(), STRINGINATOR)?;

    let mut argv = args(&["run"]);
    argv.push(path.display().to_string());
    argv.extend(args(&["--stage", "0s:1", "--stage", "1s:1"]));

    let out = run_rampr(
        argv,
        vec![("BASE_URL".to_string(), server.base_url().to_string())],
    )
    .await?;
    server.shutdown().await;

    anyhow::ensure!(status_code(out.status) == 0, "{}", describe(&out));
    let stdout = String::from_utf8_lossy(&out.stdout);
    for needle in [
        "scenario: stringinator",
        "stages: 0s:1 -> 1s:1",
        "summary",
        "requests",
        "stringinate status is 200: pass=",
        "totals",
    ] {
        anyhow::ensure!(stdout.contains(needle), "missing {needle:?}\n{}", describe(&out));
    }
    Ok(())
}
