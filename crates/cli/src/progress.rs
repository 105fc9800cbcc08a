//! Spinner reporting resolution and execution progress on stderr.

use indicatif::{ProgressBar, ProgressStyle};
use pipewright_core::{Error, ExecutionObserver, ResolvedTool, Sequence};
use std::time::Duration;

/// [`ExecutionObserver`] driving an `indicatif` spinner.
pub struct SpinnerObserver {
    bar: ProgressBar,
}

impl SpinnerObserver {
    /// A visible spinner when `enabled`, otherwise a hidden one.
    pub fn new(enabled: bool) -> Self {
        let bar = if enabled {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg} [{elapsed}]")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    /// Remove the spinner from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ExecutionObserver for SpinnerObserver {
    fn on_build_start(&self) {
        self.bar.set_message("Resolving toolchain");
        self.bar.enable_steady_tick(Duration::from_millis(100));
    }

    fn on_build_finish(&self, sequence: &Sequence) {
        self.bar.set_message(format!("Resolved {sequence}"));
    }

    fn on_tool_start(&self, tool: &ResolvedTool) {
        self.bar.set_message(format!("Running {}", tool.display_name()));
    }

    fn on_tool_finish(&self, error: Option<&Error>, tool: &ResolvedTool) {
        match error {
            Some(_) => self
                .bar
                .abandon_with_message(format!("{} failed", tool.display_name())),
            None => self.bar.println(format!("✓ {}", tool.display_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::{PlannedStep, Tool};
    use std::sync::Arc;

    #[test]
    fn test_hidden_spinner_accepts_events() {
        let observer = SpinnerObserver::new(false);
        let tool = ResolvedTool::unpinned(PlannedStep::new(Arc::new(Tool::new("lisgy"))));
        let sequence = Sequence::new(vec![tool.clone()], None);

        observer.on_build_start();
        observer.on_build_finish(&sequence);
        observer.on_tool_start(&tool);
        observer.on_tool_finish(None, &tool);
        observer.finish();
        assert!(observer.bar.is_finished());
    }
}
