#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// The run completed but one or more checks failed.
    ChecksFailed = 10,

    /// Invalid CLI flags, scenario file or run configuration.
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, control task failure).
    RuntimeError = 40,

    /// The run was stopped early by Ctrl-C.
    Cancelled = 130,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Maps a finished run onto its exit code. Cancellation wins over check failures.
    #[must_use]
    pub fn from_report(report: &rampr_core::RunReport) -> Self {
        if report.cancelled {
            Self::Cancelled
        } else if report.metrics.checks_failed_total() > 0 {
            Self::ChecksFailed
        } else {
            Self::Success
        }
    }
}
