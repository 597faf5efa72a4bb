use std::sync::Mutex;

use mosaic_core::{JobViewModel, MetricsReport, Stage};
use mosaic_engine::{ClientSettings, ViewSink};
use serde_json::Value;

/// Prints one progress line whenever the rendered line changes.
pub(crate) struct TerminalSink {
    last_line: Mutex<Option<String>>,
}

impl TerminalSink {
    pub(crate) fn new() -> Self {
        Self {
            last_line: Mutex::new(None),
        }
    }
}

impl ViewSink for TerminalSink {
    fn publish(&self, view: &JobViewModel) {
        let line = progress_line(view);
        let mut last = match self.last_line.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.as_deref() != Some(line.as_str()) {
            println!("{line}");
            *last = Some(line);
        }
    }
}

pub(crate) fn progress_line(view: &JobViewModel) -> String {
    let last_step = Stage::Complete.index();
    let mut line = format!(
        "[{}/{}] {:<16} {:<13} {:>3}%",
        view.stage.index(),
        last_step,
        view.stage.label(),
        view.status.as_str(),
        view.progress
    );
    if view.is_polling {
        line.push_str("  polling");
    }
    if view.is_applying_changes {
        line.push_str("  applying changes");
    }
    if let Some(error) = &view.error {
        line.push_str("  error: ");
        line.push_str(error);
    }
    line
}

/// Artifact URLs resolved against the service, then numeric entries as is.
pub(crate) fn summary_lines(view: &JobViewModel, settings: &ClientSettings) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(job_id) = &view.job_id {
        lines.push(format!("job {job_id}: {}", view.status));
    }
    if let Some(mosaic) = view.displayed_mosaic() {
        lines.push(format!("displayed: {}", resolved(settings, mosaic)));
    }
    for (key, value) in &view.outputs {
        match value {
            Value::String(locator) => {
                lines.push(format!("  {key}: {}", resolved(settings, locator)));
            }
            Value::Number(number) => lines.push(format!("  {key}: {number}")),
            _ => {}
        }
    }
    if let Some(metrics) = &view.metrics {
        lines.push(metrics_line(metrics));
    }
    lines
}

pub(crate) fn metrics_line(metrics: &MetricsReport) -> String {
    if !metrics.is_available() {
        return "metrics: unavailable".to_string();
    }
    let field =
        |value: Option<f64>| value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"));
    format!(
        "metrics: ssim {} mse {} psnr {}",
        field(metrics.ssim),
        field(metrics.mse),
        field(metrics.psnr)
    )
}

pub(crate) fn resolved(settings: &ClientSettings, locator: &str) -> String {
    settings
        .resolve(locator)
        .map_or_else(|| locator.to_string(), |url| url.to_string())
}
