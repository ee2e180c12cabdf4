use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context as _;
use rampr_core::RunController;
use rampr_http::HttpClient;

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output::{self, RunHeader};
use crate::run_error::RunError;
use crate::scenario_file::{self, EnvVars, Overrides};
use crate::script::DeclarativeScript;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let env = merged_env(&args.env).map_err(RunError::InvalidInput)?;
    let scenario = scenario_file::load(&args.scenario)
        .await
        .map_err(RunError::InvalidInput)?;
    let config = scenario
        .run_config(&overrides(&args))
        .map_err(RunError::InvalidInput)?;
    let steps = scenario.steps(&env).map_err(RunError::InvalidInput)?;
    let requests = steps.len();

    let controller = RunController::new(config)
        .context("invalid run configuration")
        .map_err(RunError::InvalidInput)?;

    out.print_header(&RunHeader {
        scenario_path: &args.scenario,
        name: scenario.display_name(),
        schedule: controller.schedule(),
        max_vus: controller.max_vus(),
        requests,
    });

    let controller = match out.on_event() {
        Some(f) => controller.on_event(f),
        None => controller,
    };

    let handle = controller.spawn(
        Arc::new(DeclarativeScript::new(steps)),
        Arc::new(HttpClient::default()),
    );

    let cancel = handle.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("stopping: finishing in-flight iterations (press Ctrl-C again to abort)");
            cancel.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(ExitCode::Cancelled.as_i32());
            }
        }
    });

    let report = handle.join().await;
    ctrl_c.abort();
    let report = report
        .context("load run failed")
        .map_err(RunError::RuntimeError)?;

    out.print_summary(&report)
        .context("failed to print summary")
        .map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_report(&report))
}

fn overrides(args: &RunArgs) -> Overrides {
    Overrides {
        stages: args.stages.clone(),
        start_vus: args.start_vus,
        max_vus: args.max_vus,
        think_time: args.think_time,
        iteration_timeout: args.iteration_timeout,
        request_timeout: args.request_timeout,
        end_behavior: args.end_behavior,
    }
}

/// Process env with `--env KEY=VALUE` overrides applied on top.
fn merged_env(overrides: &[String]) -> anyhow::Result<EnvVars> {
    let mut map: BTreeMap<String, String> = std::env::vars().collect();

    for raw in overrides {
        let (k, v) = parse_env_override(raw)?;
        map.insert(k, v);
    }

    Ok(map)
}

fn parse_env_override(s: &str) -> anyhow::Result<(String, String)> {
    let (k, v) = s
        .split_once('=')
        .with_context(|| format!("invalid --env (expected KEY=VALUE): {s}"))?;
    if k.is_empty() {
        anyhow::bail!("invalid --env (empty KEY): {s}");
    }
    Ok((k.to_string(), v.to_string()))
}
