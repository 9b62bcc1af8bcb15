pub(crate) mod job;
pub(crate) mod registry;
pub(crate) mod report;
pub(crate) mod stages;
pub(crate) mod topic;
pub(crate) mod trigger;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use serde::Serialize;

use pipeline_core::{
    JobRegistry, PipelineStorage, ReportRegistry, ResourceRegistry, StatusOutcome,
};
use pipeline_storage::FileStorage;

use crate::config::PipelineConfig;
use crate::{report_error, OutputFormat};

/// Everything a subcommand needs: the store, the configuration, and how to
/// talk back to the user.
pub(crate) struct Context {
    pub(crate) state_dir: PathBuf,
    pub(crate) config: PipelineConfig,
    pub(crate) storage: Arc<dyn PipelineStorage>,
    pub(crate) output: OutputFormat,
    pub(crate) quiet: bool,
}

impl Context {
    pub(crate) fn new(
        state_dir: PathBuf,
        config: PipelineConfig,
        output: OutputFormat,
        quiet: bool,
    ) -> Self {
        let storage: Arc<dyn PipelineStorage> = Arc::new(FileStorage::open(&state_dir));
        tracing::debug!(
            state_dir = %state_dir.display(),
            scope = %config.deployment.scope,
            "state store opened"
        );
        Context {
            state_dir,
            config,
            storage,
            output,
            quiet,
        }
    }

    pub(crate) fn registry(&self) -> ResourceRegistry {
        ResourceRegistry::new(self.storage.clone(), self.config.deployment.scope.as_str())
    }

    pub(crate) fn jobs(&self) -> JobRegistry {
        JobRegistry::new(self.storage.clone())
            .with_policy(self.config.deployment.transition_policy)
    }

    pub(crate) fn reports(&self) -> ReportRegistry {
        ReportRegistry::new(self.storage.clone())
    }

    /// Report `msg` and exit with status 1.
    pub(crate) fn fail(&self, msg: &str) -> ! {
        report_error(msg, self.output, self.quiet);
        process::exit(1);
    }

    pub(crate) fn print_json<T: Serialize>(&self, value: &T) {
        let json = serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
        println!("{}", json);
    }

    /// Print the result of a best-effort write. A write that did not land is
    /// a warning, not a failure: the command still exits 0.
    pub(crate) fn print_outcome<T: Serialize>(&self, outcome: &StatusOutcome<T>, summary: &str) {
        match self.output {
            OutputFormat::Json => {
                let value = match outcome {
                    StatusOutcome::Recorded(record) => serde_json::json!({
                        "outcome": "recorded",
                        "record": record,
                    }),
                    StatusOutcome::RecordingFailed { reason } => serde_json::json!({
                        "outcome": "recording_failed",
                        "reason": reason,
                    }),
                    StatusOutcome::Rejected { current, requested } => serde_json::json!({
                        "outcome": "rejected",
                        "current": current,
                        "requested": requested,
                    }),
                };
                self.print_json(&value);
            }
            OutputFormat::Text => match outcome {
                StatusOutcome::Recorded(_) => {
                    if !self.quiet {
                        println!("recorded {}", summary);
                    }
                }
                other => {
                    if !self.quiet {
                        eprintln!("warning: {} not recorded ({})", summary, other);
                    }
                }
            },
        }
    }
}

/// Parse a JSON command-line argument.
pub(crate) fn parse_json_arg(ctx: &Context, flag: &str, raw: &str) -> serde_json::Value {
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => ctx.fail(&format!("invalid JSON for --{}: {}", flag, e)),
    }
}
