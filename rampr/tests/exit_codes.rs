mod common;

use anyhow::Context as _;
use rampr_testserver::TestServer;

use common::{args, describe, run_rampr, status_code, write_scenario};

#[tokio::test]
async fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let out = run_rampr(
        args(&["run", "./does-not-matter.yaml", "--think-time", "10x"]),
        Vec::new(),
    )
    .await?;

    anyhow::ensure!(status_code(out.status) == 30, "{}", describe(&out));
    Ok(())
}

#[tokio::test]
async fn missing_scenario_file_exit_30() -> anyhow::Result<()> {
    let out = run_rampr(args(&["run", "./no-such-scenario.yaml"]), Vec::new()).await?;

    anyhow::ensure!(status_code(out.status) == 30, "{}", describe(&out));
    let stderr = String::from_utf8_lossy(&out.stderr);
    anyhow::ensure!(
        stderr.contains("failed to read scenario file"),
        "{}",
        describe(&out)
    );
    Ok(())
}

#[tokio::test]
async fn empty_schedule_exit_30() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = write_scenario(
        dir.path(),
        "stages: []\nrequests:\n  - name: hello\n    url: http://127.0.0.1:1/hello\n",
    )?;

    let out = run_rampr(
        vec!["run".to_string(), path.display().to_string()],
        Vec::new(),
    )
    .await?;

    anyhow::ensure!(status_code(out.status) == 30, "{}", describe(&out));
    let stderr = String::from_utf8_lossy(&out.stderr);
    anyhow::ensure!(stderr.contains("at least one stage"), "{}", describe(&out));
    Ok(())
}

#[tokio::test]
async fn negative_stage_duration_exit_30() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = write_scenario(
        dir.path(),
        "stages: [{duration: -5, target: 1}]\nrequests:\n  - name: hello\n    url: http://127.0.0.1:1/hello\n",
    )?;

    let out = run_rampr(
        vec!["run".to_string(), path.display().to_string()],
        Vec::new(),
    )
    .await?;

    anyhow::ensure!(status_code(out.status) == 30, "{}", describe(&out));
    let stderr = String::from_utf8_lossy(&out.stderr);
    anyhow::ensure!(
        stderr.contains("stage 1: duration must not be negative"),
        "{}",
        describe(&out)
    );
    Ok(())
}

#[tokio::test]
async fn unset_placeholder_exit_30() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = write_scenario(
        dir.path(),
        "stages: [{duration: 1s, target: 1}]\nrequests:\n  - name: hello\n    url: ${RAMPR_SURELY_UNSET_VAR}/hello\n",
    )?;

    let out = run_rampr(
        vec!["run".to_string(), path.display().to_string()],
        Vec::new(),
    )
    .await?;

    anyhow::ensure!(status_code(out.status) == 30, "{}", describe(&out));
    Ok(())
}

#[tokio::test]
async fn checks_failed_exit_10() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = write_scenario(
        dir.path(),
        r#"
stages:
  - {duration: 0s, target: 1}
  - {duration: 1s, target: 1}
thinkTime: 100ms
requests:
  - name: hello
    url: ${BASE_URL}/hello
    checks:
      - name: hello is created
        status: 201
"#,
    )?;

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
    server.shutdown().await;

    anyhow::ensure!(status_code(out.status) == 10, "{}", describe(&out));
    Ok(())
}
