//! Network latency sampling commands and single pings.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::config;
use crate::core::Sample;
use crate::error::AppError;

use super::logic::{summarize_samples, SampleStats};
use super::state::AppState;

/// One poll of the net-load job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetloadReport {
    /// `false` when no job is installed or the job's stream just ended.
    pub active: bool,
    pub target: Option<String>,
    /// Samples drained by this poll, in tick order. The end-of-stream marker
    /// is not included; it is reported through `active`.
    pub samples: Vec<Sample>,
    pub stats: Option<SampleStats>,
    /// Unix time of the poll, in seconds.
    pub ts: f64,
}

/// Start (or restart) sampling `host` every `interval_secs`.
pub fn start_netload(state: &AppState, host: &str, interval_secs: f64) -> Result<(), AppError> {
    let interval = config::interval_from_secs(interval_secs)?;
    tracing::info!("net-load start requested -> {host} every {interval_secs}s");
    state.registry.install_sampling(host, interval)?;
    Ok(())
}

/// Stop sampling. Returns whether a job was running.
pub fn stop_netload(state: &AppState) -> bool {
    tracing::info!("net-load stop requested");
    state.registry.remove_sampling()
}

/// Drain whatever the current sampler has produced since the last poll.
///
/// Once the end-of-stream marker shows up the registry forgets that job.
pub fn netload_data(state: &AppState) -> NetloadReport {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();

    let Some(job) = state.registry.current_sampling() else {
        return NetloadReport {
            active: false,
            target: None,
            samples: Vec::new(),
            stats: None,
            ts,
        };
    };

    let mut samples = job.drain_available();
    let ended = match samples.iter().position(Sample::is_end) {
        Some(end) => {
            samples.truncate(end);
            true
        }
        None => false,
    };
    if ended && state.registry.forget_sampling_if(&job) {
        tracing::info!("net-load stream for {} ended", job.target());
    }

    NetloadReport {
        active: !ended,
        target: Some(job.target().to_string()),
        stats: summarize_samples(&samples),
        samples,
        ts,
    }
}

/// Probe `host` once, synchronously.
pub fn ping_once(state: &AppState, host: &str) -> Result<f64, AppError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(AppError::InvalidInput("host must not be empty".into()));
    }
    tracing::info!("single ping -> {host}");
    state
        .probe
        .probe(host)
        .map_err(|e| AppError::Probe(format!("{e:#}")))
}
