//! Process listing, launch and manual termination commands.

use crate::core::ProcessEntry;
use crate::error::AppError;

use super::logic::{parse_order, query_processes, SortKey};
use super::state::AppState;

/// List running processes, filtered by `query` and sorted by `sort`
/// (`pid` | `name` | `cmd`) in `order` (`asc` | `desc`).
pub fn list_processes(
    state: &AppState,
    query: &str,
    sort: &str,
    order: &str,
) -> Result<Vec<ProcessEntry>, AppError> {
    let descending = parse_order(order)?;
    let entries = state
        .provider
        .list_processes()
        .map_err(|e| AppError::Process(format!("{e:#}")))?;
    let listed = query_processes(entries, query, SortKey::parse(sort), descending);
    tracing::info!("process listing: {} entries (query '{query}')", listed.len());
    Ok(listed)
}

/// Terminate `pid` on the operator's request.
pub fn kill_process(state: &AppState, pid: u32) -> Result<(), AppError> {
    state
        .provider
        .terminate(pid, None)
        .map_err(|e| AppError::Process(format!("{e:#}")))?;
    tracing::warn!("Manual kill PID {pid}");
    Ok(())
}

/// Launch `exe` with `args` and return the new process id.
pub fn start_process(state: &AppState, exe: &str, args: &[String]) -> Result<u32, AppError> {
    let exe = exe.trim();
    if exe.is_empty() {
        return Err(AppError::InvalidInput("executable must not be empty".into()));
    }
    let pid = state
        .provider
        .launch(exe, args)
        .map_err(|e| AppError::Process(format!("{e:#}")))?;
    tracing::info!("Started {exe} (PID {pid})");
    Ok(pid)
}
