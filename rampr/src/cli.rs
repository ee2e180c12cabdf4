use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr as _;
use std::time::Duration;

use rampr_core::{EndBehavior, Stage};

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}': {err} (expected e.g. 10s, 250ms, 1m)"))
}

/// `DURATION:TARGET`, e.g. `30s:10`.
fn parse_stage(input: &str) -> Result<Stage, String> {
    let (duration, target) = input
        .trim()
        .rsplit_once(':')
        .ok_or_else(|| format!("invalid stage '{input}' (expected DURATION:TARGET, e.g. 30s:10)"))?;
    let duration = parse_duration(duration)?;
    let target: u64 = target
        .trim()
        .parse()
        .map_err(|_| format!("invalid stage target '{target}' (expected a whole number)"))?;
    Ok(Stage::new(duration, target))
}

fn parse_end_behavior(input: &str) -> Result<EndBehavior, String> {
    EndBehavior::from_str(input.trim())
        .map_err(|_| format!("invalid end behavior '{input}' (expected stop or hold)"))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Live progress bar and a human-readable summary.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) and a final summary line to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "rampr",
    author,
    version,
    about = "Staged virtual-user HTTP load generator",
    long_about = "rampr drives an HTTP service with a time-varying number of virtual users.\n\nA YAML scenario file describes the ramp stages and the requests each virtual user sends per iteration, with optional status/body checks.\n\n`${VAR}` placeholders in the scenario are expanded from the current process environment; use `--env KEY=VALUE` to add/override values.",
    after_help = "Examples:\n  rampr run demos/stringinator.yaml\n  rampr run demos/stringinator.yaml --stage 10s:20 --stage 30s:20 --stage 10s:0\n  rampr run demos/stringinator.yaml --env BASE_URL=http://127.0.0.1:1323 --output json"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test scenario
    #[command(
        long_about = "Run a scenario file: ramp virtual users through the configured stages and execute the request list once per iteration.\n\nCLI flags override values from the scenario file."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the scenario file (.yaml/.yml)
    pub scenario: PathBuf,

    /// Replace the scenario's stages (repeatable, DURATION:TARGET, e.g. 30s:10)
    #[arg(long = "stage", value_name = "DURATION:TARGET", value_parser = parse_stage)]
    pub stages: Vec<Stage>,

    /// Virtual users at elapsed zero
    #[arg(long)]
    pub start_vus: Option<u64>,

    /// Hard cap on concurrently live virtual users
    #[arg(long)]
    pub max_vus: Option<u64>,

    /// Pause between iterations of a virtual user (e.g. 100ms)
    #[arg(long, value_parser = parse_duration)]
    pub think_time: Option<Duration>,

    /// Upper bound on a single iteration (e.g. 30s)
    #[arg(long, value_parser = parse_duration)]
    pub iteration_timeout: Option<Duration>,

    /// Default per-request timeout (e.g. 5s)
    #[arg(long, value_parser = parse_duration)]
    pub request_timeout: Option<Duration>,

    /// What happens once the last stage ends: stop or hold
    #[arg(long, value_name = "BEHAVIOR", value_parser = parse_end_behavior)]
    pub end_behavior: Option<EndBehavior>,

    /// Add/override env vars used for `${VAR}` expansion (repeatable, KEY=VALUE).
    /// CLI-provided vars override the current process env.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Log filter for stderr diagnostics (e.g. info, rampr_core=debug). Overrides RUST_LOG.
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("1m 30s"), Ok(Duration::from_secs(90)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn parse_stage_splits_duration_and_target() {
        assert_eq!(parse_stage("30s:10"), Ok(Stage::new(Duration::from_secs(30), 10)));
        assert_eq!(parse_stage("0s:5"), Ok(Stage::new(Duration::ZERO, 5)));
        assert!(parse_stage("30s").is_err());
        assert!(parse_stage("30s:-1").is_err());
        assert!(parse_stage("nope:1").is_err());
    }

    #[test]
    fn cli_parses_run_with_overrides() {
        let parsed = Cli::try_parse_from([
            "rampr",
            "run",
            "scenario.yaml",
            "--stage",
            "10s:5",
            "--stage",
            "20s:0",
            "--max-vus",
            "8",
            "--think-time",
            "100ms",
            "--end-behavior",
            "hold",
            "--env",
            "FOO=bar",
            "--env",
            "EMPTY=",
            "--output",
            "json",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        let Command::Run(args) = cli.command;
        assert_eq!(args.scenario, PathBuf::from("scenario.yaml"));
        assert_eq!(
            args.stages,
            vec![
                Stage::new(Duration::from_secs(10), 5),
                Stage::new(Duration::from_secs(20), 0)
            ]
        );
        assert_eq!(args.max_vus, Some(8));
        assert_eq!(args.think_time, Some(Duration::from_millis(100)));
        assert_eq!(args.end_behavior, Some(EndBehavior::Hold));
        assert_eq!(args.env, vec!["FOO=bar".to_string(), "EMPTY=".to_string()]);
        assert!(matches!(args.output, OutputFormat::Json));
        assert_eq!(args.iteration_timeout, None);
    }

    #[test]
    fn cli_rejects_bad_end_behavior() {
        let parsed =
            Cli::try_parse_from(["rampr", "run", "s.yaml", "--end-behavior", "forever"]);
        assert!(parsed.is_err());
    }
}
