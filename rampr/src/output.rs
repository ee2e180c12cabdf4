use crate::cli::OutputFormat;
use std::path::Path;

use rampr_core::{EventFn, RunReport, StageSchedule};

mod human;
mod json;

/// What is about to run, for the header line(s).
pub(crate) struct RunHeader<'a> {
    pub scenario_path: &'a Path,
    pub name: &'a str,
    pub schedule: &'a StageSchedule,
    pub max_vus: u64,
    pub requests: usize,
}

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, header: &RunHeader<'_>);
    fn on_event(&self) -> Option<EventFn>;
    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
