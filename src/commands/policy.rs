//! Process access-control watchdog commands.

use serde::Serialize;

use crate::config;
use crate::core::{AccessRule, JobState, RuleMode};
use crate::error::AppError;

use super::logic::parse_name_list;
use super::state::AppState;

/// What the policy page shows about the current watchdog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyStatus {
    pub active: bool,
    pub state: Option<JobState>,
    pub mode: RuleMode,
    /// Sorted, lowercased allow list.
    pub allow: Vec<String>,
    /// Sorted, lowercased block list.
    pub block: Vec<String>,
    pub interval_secs: f64,
    pub ticks: u64,
    pub terminated: u64,
    pub failed: u64,
    pub top_terminated: Vec<(String, u64)>,
}

impl PolicyStatus {
    fn inactive() -> Self {
        Self {
            active: false,
            state: None,
            mode: RuleMode::Inactive,
            allow: Vec::new(),
            block: Vec::new(),
            interval_secs: 0.0,
            ticks: 0,
            terminated: 0,
            failed: 0,
            top_terminated: Vec::new(),
        }
    }
}

/// Start (or restart) the watchdog. List inputs are newline-separated names.
pub fn start_policy(
    state: &AppState,
    allowed: &str,
    blocked: &str,
    interval_secs: f64,
) -> Result<PolicyStatus, AppError> {
    let interval = config::interval_from_secs(interval_secs)?;
    let rule = AccessRule::new(parse_name_list(allowed), parse_name_list(blocked));
    tracing::info!("policy start requested (mode {:?}, every {interval_secs}s)", rule.mode());
    state.registry.install_enforcement(rule, interval)?;
    Ok(policy_status(state))
}

/// Stop the watchdog. Returns whether one was running.
pub fn stop_policy(state: &AppState) -> bool {
    tracing::info!("policy stop requested");
    state.registry.remove_enforcement()
}

pub fn policy_status(state: &AppState) -> PolicyStatus {
    let Some(job) = state.registry.current_enforcement() else {
        return PolicyStatus::inactive();
    };
    let rule = job.rule();
    let stats = job.stats();
    PolicyStatus {
        active: true,
        state: Some(job.state()),
        mode: rule.mode(),
        allow: rule.allow().map(str::to_string).collect(),
        block: rule.block().map(str::to_string).collect(),
        interval_secs: job.interval().as_secs_f64(),
        ticks: stats.ticks(),
        terminated: stats.terminated(),
        failed: stats.failed(),
        top_terminated: stats.top_terminated(config::POLICY_TOP_TERMINATED_COUNT),
    }
}
