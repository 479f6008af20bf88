//! Terminal progress for running scans

use elmdiag_core::{EcuModule, ParsedDtc, ScanObserver, ScanStep, StepStatus};
use indicatif::{ProgressBar, ProgressStyle};

/// Renders phase and module progress on a spinner
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ScanObserver for ProgressObserver {
    fn on_step(&self, step: &ScanStep) {
        if step.status == StepStatus::Running {
            self.bar.set_message(step.label.clone());
        }
    }

    fn on_module(&self, module: &EcuModule, index: usize, total: usize) {
        self.bar.set_message(format!(
            "{} ({}/{})",
            module.name,
            index + 1,
            total
        ));
    }

    fn on_finding(&self, dtc: &ParsedDtc) {
        self.bar.println(format!("  found {}", dtc));
    }
}
