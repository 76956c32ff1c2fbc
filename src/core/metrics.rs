use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!("attempts_started_total", "Attempts created with a fresh snapshot");
    metrics::describe_counter!("answers_autosaved_total", "Autosaved answers over live channels");
    metrics::describe_counter!("attempts_finalized_total", "Attempts graded, labelled by mode");
    metrics::describe_counter!("integrity_violations_total", "Recorded integrity violations");
    metrics::describe_counter!("selection_shortfalls_total", "Under-filled blueprint buckets");
    metrics::describe_counter!("expired_attempts_closed_total", "Attempts closed by the sweep");
    metrics::describe_gauge!("live_connections", "Open live sync channels");
}
