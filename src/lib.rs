mod commands;
mod config;
mod console;
mod core;
mod error;
mod services;

pub use commands::{
    netload::{netload_data, ping_once, start_netload, stop_netload},
    policy::{policy_status, start_policy, stop_policy},
    processes::{kill_process, list_processes},
    AppState, NetloadReport, PolicyStatus, SampleStats,
};
pub use console::{execute, parse_command, run_console, ConsoleCommand};
pub use crate::core::{
    AccessRule, BackgroundJob, EnforcementJob, EnforcementStats, Fatal, JobState, PingProbe,
    Probe, ProcessEntry, ProcessProvider, RuleMode, Sample, SampleBuffer, SamplingJob, StopSignal,
    SysinfoProvider, Tick,
};
pub use error::AppError;
pub use services::JobRegistry;

/// Install logging, then serve the operator console on stdin/stdout until
/// EOF or `quit`. All jobs are signalled to stop on the way out.
pub fn run() -> Result<(), AppError> {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC in sysmgmt: {info}");
        default_hook(info);
    }));

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config::DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let state = AppState::system();
    tracing::info!("sysmgmt console ready (type 'help')");

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let result = console::run_console(&state, stdin.lock(), stdout.lock());

    state.registry.shutdown();
    result
}
