use std::sync::OnceLock;
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

/// Outcome labels: `graded`, `generation_failed`, `superseded`, `store_failed`.
pub(crate) fn record_grading_run(outcome: &'static str, elapsed: Duration) {
    metrics::counter!("grading_runs_total", "outcome" => outcome).increment(1);
    metrics::histogram!("grading_duration_seconds", "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}

pub(crate) fn record_submission(kind: &'static str) {
    metrics::counter!("submissions_total", "kind" => kind).increment(1);
}
