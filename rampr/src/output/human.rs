use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_elapsed, format_rate};
use progress::HumanProgress;
use rampr_core::{EventFn, ProgressUpdate, RunEvent, RunReport};
use summary::render;

use super::{OutputFormatter, RunHeader};

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, header: &RunHeader<'_>) {
        println!("scenario: {} ({})", header.name, header.scenario_path.display());
        let stages = header
            .schedule
            .stages()
            .iter()
            .map(|s| format!("{}:{}", format_elapsed(s.duration), s.target))
            .collect::<Vec<_>>()
            .join(" -> ");
        println!(
            "stages: {stages} total={} end={} max_vus={} requests/iteration={}",
            format_elapsed(header.schedule.total_duration()),
            header.schedule.end_behavior(),
            header.max_vus,
            header.requests
        );
        println!();
    }

    fn on_event(&self) -> Option<EventFn> {
        let progress = self.progress.clone();
        Some(Arc::new(move |event: &RunEvent| match event {
            RunEvent::Started { .. } => {}
            RunEvent::Progress(u) => {
                progress.update(u.total_duration, u.elapsed, progress_message(u));
            }
            RunEvent::Cancelled { elapsed } => progress.println(&format!(
                "cancelled at {}, waiting for in-flight iterations",
                format_elapsed(*elapsed)
            )),
            RunEvent::RunComplete(_) => progress.finish(),
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(report));
        Ok(())
    }
}

fn progress_message(u: &ProgressUpdate) -> String {
    let m = &u.metrics;
    let errors = m
        .requests_failed_total()
        .saturating_add(m.checks_failed_total());
    let phase = if u.draining {
        format!("draining vus={} retiring={}", u.running_vus, u.retiring_vus)
    } else {
        format!(
            "stage={}/{} target={} vus={}/{} stage_remaining={}",
            u.stage.index + 1,
            u.stage.count,
            u.target,
            u.running_vus,
            u.max_vus,
            format_elapsed(u.stage.stage_remaining)
        )
    };
    format!(
        "{phase} elapsed={} iters/s={} rps={} errors={errors}",
        format_elapsed(u.elapsed),
        format_rate(u.iterations_per_sec_now),
        format_rate(u.rps_now)
    )
}
