//! Process access-control watchdog.
//!
//! Every tick takes one process snapshot, decides kill-or-keep for every entry
//! against that same snapshot, then requests termination of the violators.
//! A failed snapshot counts as an empty one and a failed termination is logged
//! per process; neither aborts the tick nor the job.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use super::job::{BackgroundJob, JobState, Tick};
use super::processes::{ProcessEntry, ProcessProvider};
use super::rule::AccessRule;
use crate::error::AppError;

/// Counters published by a running watchdog, readable from any thread.
#[derive(Debug, Default)]
pub struct EnforcementStats {
    ticks: AtomicU64,
    terminated: AtomicU64,
    failed: AtomicU64,
    by_name: DashMap<String, u64>,
}

impl EnforcementStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Successful termination requests across all ticks.
    pub fn terminated(&self) -> u64 {
        self.terminated.load(Ordering::Relaxed)
    }

    /// Termination requests the provider refused.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// The `n` most terminated names, most frequent first.
    pub fn top_terminated(&self, n: usize) -> Vec<(String, u64)> {
        let mut counts: Vec<(String, u64)> = self
            .by_name
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(n);
        counts
    }

    fn record_termination(&self, name: &str) {
        self.terminated.fetch_add(1, Ordering::Relaxed);
        *self.by_name.entry(name.to_lowercase()).or_insert(0) += 1;
    }
}

/// Select the snapshot entries `rule` condemns. `exempt_pid` is never selected.
pub fn select_targets<'a>(
    rule: &AccessRule,
    snapshot: &'a [ProcessEntry],
    exempt_pid: u32,
) -> Vec<&'a ProcessEntry> {
    snapshot
        .iter()
        .filter(|entry| entry.pid != exempt_pid && rule.should_terminate(&entry.name))
        .collect()
}

struct Enforcer {
    rule: Arc<AccessRule>,
    provider: Arc<dyn ProcessProvider>,
    stats: Arc<EnforcementStats>,
    own_pid: u32,
}

impl Tick for Enforcer {
    fn tick(&mut self) -> anyhow::Result<()> {
        let snapshot = match self.provider.list_processes() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Process snapshot failed, treating as empty: {e:#}");
                Vec::new()
            }
        };

        let targets = select_targets(&self.rule, &snapshot, self.own_pid);
        tracing::debug!(
            "Policy sweep: {} processes, {} violators",
            snapshot.len(),
            targets.len()
        );

        for entry in targets {
            match self.provider.terminate(entry.pid, Some(&entry.name)) {
                Ok(()) => {
                    self.stats.record_termination(&entry.name);
                    tracing::error!("Policy kill {} PID {}", entry.name, entry.pid);
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "Policy could not terminate {} PID {}: {e:#}",
                        entry.name,
                        entry.pid
                    );
                }
            }
        }

        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn finish(&mut self) {
        tracing::info!(
            "Policy stopped ({} terminations over {} sweeps)",
            self.stats.terminated(),
            self.stats.ticks()
        );
    }
}

/// A watchdog instance: one rule, one interval, one loop thread.
pub struct EnforcementJob {
    rule: Arc<AccessRule>,
    provider: Arc<dyn ProcessProvider>,
    stats: Arc<EnforcementStats>,
    job: BackgroundJob,
}

impl EnforcementJob {
    pub fn new(
        rule: AccessRule,
        interval: Duration,
        provider: Arc<dyn ProcessProvider>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            rule: Arc::new(rule),
            provider,
            stats: Arc::new(EnforcementStats::default()),
            job: BackgroundJob::new("policy-watchdog", interval)?,
        })
    }

    pub fn start(&self) -> Result<(), AppError> {
        let allow: Vec<&str> = self.rule.allow().collect();
        let block: Vec<&str> = self.rule.block().collect();
        tracing::warn!(
            "Policy active - allow={} | block={}",
            if allow.is_empty() { "*".to_string() } else { allow.join(",") },
            if block.is_empty() { "<empty>".to_string() } else { block.join(",") },
        );
        self.job.start(Enforcer {
            rule: Arc::clone(&self.rule),
            provider: Arc::clone(&self.provider),
            stats: Arc::clone(&self.stats),
            own_pid: std::process::id(),
        })
    }

    pub fn stop(&self) {
        self.job.stop();
    }

    pub fn join(&self) -> bool {
        self.job.join()
    }

    pub fn state(&self) -> JobState {
        self.job.state()
    }

    pub fn is_stop_requested(&self) -> bool {
        self.job.is_stop_requested()
    }

    pub fn rule(&self) -> &AccessRule {
        &self.rule
    }

    pub fn interval(&self) -> Duration {
        self.job.interval()
    }

    pub fn stats(&self) -> &EnforcementStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{wait_until, FakeProvider};

    const NONE: [&str; 0] = [];

    fn enforcer(rule: AccessRule, provider: &Arc<FakeProvider>) -> Enforcer {
        Enforcer {
            rule: Arc::new(rule),
            provider: Arc::clone(provider) as Arc<dyn ProcessProvider>,
            stats: Arc::new(EnforcementStats::default()),
            own_pid: 0,
        }
    }

    #[test]
    fn test_block_list_kills_only_blocked() {
        let provider = Arc::new(FakeProvider::with(&[(1, "malware.exe"), (2, "notepad.exe")]));
        let mut worker = enforcer(AccessRule::new(NONE, ["malware.exe"]), &provider);
        worker.tick().unwrap();
        assert_eq!(provider.terminated(), vec![1]);
    }

    #[test]
    fn test_allow_list_kills_everything_else() {
        let provider = Arc::new(FakeProvider::with(&[(1, "explorer.exe"), (2, "cmd.exe")]));
        let mut worker = enforcer(AccessRule::new(["explorer.exe"], NONE), &provider);
        worker.tick().unwrap();
        assert_eq!(provider.terminated(), vec![2]);
    }

    #[test]
    fn test_empty_rule_kills_nothing() {
        let provider = Arc::new(FakeProvider::with(&[(1, "a.exe"), (2, "b.exe")]));
        let mut worker = enforcer(AccessRule::default(), &provider);
        worker.tick().unwrap();
        assert!(provider.terminated().is_empty());
        assert_eq!(worker.stats.ticks(), 1);
    }

    #[test]
    fn test_termination_failure_does_not_stop_the_scan() {
        let provider = Arc::new(FakeProvider::with(&[(1, "bad.exe"), (2, "bad.exe"), (3, "bad.exe")]));
        provider.refuse(2);
        let mut worker = enforcer(AccessRule::new(NONE, ["BAD.EXE"]), &provider);

        worker.tick().unwrap();

        assert_eq!(provider.terminated(), vec![1, 3]);
        assert_eq!(worker.stats.terminated(), 2);
        assert_eq!(worker.stats.failed(), 1);
        assert_eq!(worker.stats.top_terminated(5), vec![("bad.exe".to_string(), 2)]);
    }

    #[test]
    fn test_recycled_pid_is_not_killed() {
        let provider = Arc::new(FakeProvider::with(&[(1, "malware.exe"), (2, "malware.exe")]));
        provider.recycle_after_listing(2, "explorer.exe");
        let mut worker = enforcer(AccessRule::new(NONE, ["malware.exe"]), &provider);

        worker.tick().unwrap();

        assert_eq!(provider.terminated(), vec![1]);
        assert_eq!(worker.stats.failed(), 1);
    }

    #[test]
    fn test_snapshot_failure_is_an_empty_sweep() {
        let provider = Arc::new(FakeProvider::with(&[(1, "bad.exe")]));
        provider.fail_listing(true);
        let mut worker = enforcer(AccessRule::new(NONE, ["bad.exe"]), &provider);

        assert!(worker.tick().is_ok());
        assert!(provider.terminated().is_empty());
        assert_eq!(worker.stats.ticks(), 1);
    }

    #[test]
    fn test_one_snapshot_per_tick() {
        let provider = Arc::new(FakeProvider::with(&[(1, "x"), (2, "y"), (3, "z")]));
        let mut worker = enforcer(AccessRule::new(["x"], NONE), &provider);
        worker.tick().unwrap();
        assert_eq!(provider.listings(), 1);
        assert_eq!(provider.terminated(), vec![2, 3]);
    }

    #[test]
    fn test_select_targets_skips_exempt_pid() {
        let snapshot = vec![ProcessEntry::new(10, "console"), ProcessEntry::new(11, "other")];
        let rule = AccessRule::new(["explorer.exe"], NONE);
        let pids: Vec<u32> = select_targets(&rule, &snapshot, 10).iter().map(|e| e.pid).collect();
        assert_eq!(pids, vec![11]);
    }

    #[test]
    fn test_select_targets_uses_short_name_not_command_line() {
        let mut entry = ProcessEntry::new(5, "python.exe");
        entry.cmd = "python.exe malware.exe --run".into();
        let rule = AccessRule::new(NONE, ["malware.exe"]);
        assert!(select_targets(&rule, &[entry], 0).is_empty());
    }

    #[test]
    fn test_top_terminated_orders_by_count_then_name() {
        let stats = EnforcementStats::default();
        for name in ["b", "a", "b", "c", "a", "b"] {
            stats.record_termination(name);
        }
        assert_eq!(
            stats.top_terminated(2),
            vec![("b".to_string(), 3), ("a".to_string(), 2)]
        );
    }

    #[test]
    fn test_job_runs_sweeps_until_stopped() {
        let provider = Arc::new(FakeProvider::with(&[(1, "malware.exe"), (2, "notepad.exe")]));
        let job = EnforcementJob::new(
            AccessRule::new(NONE, ["malware.exe"]),
            Duration::from_millis(5),
            Arc::clone(&provider) as Arc<dyn ProcessProvider>,
        )
        .unwrap();
        job.start().unwrap();

        assert!(wait_until(Duration::from_secs(5), || job.stats().ticks() >= 3));
        job.stop();
        assert!(job.join());

        assert_eq!(job.state(), JobState::Stopped);
        assert_eq!(provider.terminated(), vec![1]);
        assert_eq!(job.stats().terminated(), 1);
    }

    #[test]
    fn test_zero_interval_creates_no_job() {
        let provider: Arc<dyn ProcessProvider> = Arc::new(FakeProvider::default());
        let result = EnforcementJob::new(AccessRule::default(), Duration::ZERO, provider);
        assert_eq!(result.err().unwrap().kind(), "InvalidInput");
    }
}
