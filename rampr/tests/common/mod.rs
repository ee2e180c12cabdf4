#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::Context as _;

pub fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Writes `yaml` into `dir` and returns its path.
pub fn write_scenario(dir: &Path, yaml: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join("scenario.yaml");
    std::fs::write(&path, yaml).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// Runs the binary off the async runtime so the in-process test server keeps serving.
pub async fn run_rampr(args: Vec<String>, env: Vec<(String, String)>) -> anyhow::Result<Output> {
    let exe = env!("CARGO_BIN_EXE_rampr");
    tokio::task::spawn_blocking(move || {
        Command::new(exe)
            .args(&args)
            .envs(env)
            .env_remove("RUST_LOG")
            .output()
    })
    .await
    .context("spawn_blocking join")?
    .context("run rampr binary")
}

pub fn describe(out: &Output) -> String {
    format!(
        "exit code {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out.status),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    )
}

pub fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
