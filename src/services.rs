//! Background job lifecycle management.
//!
//! `JobRegistry` owns the single current process watchdog and the single
//! current latency sampler. Installing a job of a kind stops the previous one
//! first and swaps the whole handle under a lock, so readers always see either
//! the old or the new job and two instances of a kind never both keep running.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::core::{AccessRule, EnforcementJob, Probe, ProcessProvider, SamplingJob};
use crate::error::AppError;

/// Start/stop surface shared by both job kinds, used by the swap logic.
trait Managed {
    fn start(&self) -> Result<(), AppError>;
    fn stop(&self);
}

impl Managed for EnforcementJob {
    fn start(&self) -> Result<(), AppError> {
        EnforcementJob::start(self)
    }

    fn stop(&self) {
        EnforcementJob::stop(self)
    }
}

impl Managed for SamplingJob {
    fn start(&self) -> Result<(), AppError> {
        SamplingJob::start(self)
    }

    fn stop(&self) {
        SamplingJob::stop(self)
    }
}

type Slot<J> = Mutex<Option<Arc<J>>>;

fn lock<J>(slot: &Slot<J>) -> MutexGuard<'_, Option<Arc<J>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stop whatever occupies `slot`, then start `job` and install it.
fn install<J: Managed>(slot: &Slot<J>, job: J) -> Result<Arc<J>, AppError> {
    let job = Arc::new(job);
    let mut current = lock(slot);
    if let Some(previous) = current.take() {
        previous.stop();
    }
    job.start()?;
    *current = Some(Arc::clone(&job));
    Ok(job)
}

fn remove<J: Managed>(slot: &Slot<J>) -> bool {
    match lock(slot).take() {
        Some(previous) => {
            previous.stop();
            true
        }
        None => false,
    }
}

/// Process-wide owner of the current job of each kind.
pub struct JobRegistry {
    provider: Arc<dyn ProcessProvider>,
    probe: Arc<dyn Probe>,
    enforcement: Slot<EnforcementJob>,
    sampling: Slot<SamplingJob>,
}

impl JobRegistry {
    pub fn new(provider: Arc<dyn ProcessProvider>, probe: Arc<dyn Probe>) -> Self {
        Self {
            provider,
            probe,
            enforcement: Mutex::new(None),
            sampling: Mutex::new(None),
        }
    }

    /// Replace the current watchdog with a new one running `rule`.
    ///
    /// The new job is validated before anything is touched: a rejected
    /// request leaves the previous watchdog running.
    pub fn install_enforcement(
        &self,
        rule: AccessRule,
        interval: Duration,
    ) -> Result<Arc<EnforcementJob>, AppError> {
        let job = EnforcementJob::new(rule, interval, Arc::clone(&self.provider))?;
        install(&self.enforcement, job)
    }

    /// Stop and forget the current watchdog. Returns whether one existed.
    pub fn remove_enforcement(&self) -> bool {
        remove(&self.enforcement)
    }

    pub fn current_enforcement(&self) -> Option<Arc<EnforcementJob>> {
        lock(&self.enforcement).clone()
    }

    /// Replace the current sampler with a new one probing `target`.
    pub fn install_sampling(
        &self,
        target: &str,
        interval: Duration,
    ) -> Result<Arc<SamplingJob>, AppError> {
        let job = SamplingJob::new(target, interval, Arc::clone(&self.probe))?;
        install(&self.sampling, job)
    }

    /// Stop and forget the current sampler. Returns whether one existed.
    pub fn remove_sampling(&self) -> bool {
        remove(&self.sampling)
    }

    pub fn current_sampling(&self) -> Option<Arc<SamplingJob>> {
        lock(&self.sampling).clone()
    }

    /// Forget `job` if it is still the current sampler (used once a consumer
    /// has seen its end-of-stream marker). A newer sampler is left alone.
    pub fn forget_sampling_if(&self, job: &Arc<SamplingJob>) -> bool {
        let mut current = lock(&self.sampling);
        match current.as_ref() {
            Some(installed) if Arc::ptr_eq(installed, job) => {
                *current = None;
                true
            }
            _ => false,
        }
    }

    /// Signal every job to stop. Does not wait for the loop threads.
    pub fn shutdown(&self) {
        let had_policy = self.remove_enforcement();
        let had_netload = self.remove_sampling();
        tracing::info!("Job registry shut down (policy: {had_policy}, net-load: {had_netload})");
    }
}

impl Drop for JobRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
