//! Generic cancellable interval loop shared by every background job.
//!
//! A [`BackgroundJob`] owns its stop signal and its lifecycle state and runs a
//! [`Tick`] implementation on a dedicated named thread. Job kinds do not
//! subclass anything: the enforcement and sampling jobs each hand a worker to
//! the same runner.
//!
//! Lifecycle: `Created -> Running -> Stopping -> Stopped`. A job that is
//! stopped before it ever started goes straight to `Stopped`. Instances are
//! single-use.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;

use crate::error::AppError;

/// Observable lifecycle state of a job instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Created,
    Running,
    /// Stop was requested; the loop thread may still be finishing a tick.
    Stopping,
    Stopped,
}

impl JobState {
    const fn as_u8(self) -> u8 {
        match self {
            JobState::Created => 0,
            JobState::Running => 1,
            JobState::Stopping => 2,
            JobState::Stopped => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => JobState::Created,
            1 => JobState::Running,
            2 => JobState::Stopping,
            _ => JobState::Stopped,
        }
    }
}

/// One unit of periodic work plus its end-of-job finalization.
pub trait Tick: Send + 'static {
    /// Perform one tick. An `Err` is logged and the loop carries on, unless
    /// it wraps [`Fatal`].
    fn tick(&mut self) -> anyhow::Result<()>;

    /// Runs exactly once on the loop thread after the last tick.
    fn finish(&mut self) {}
}

/// Tick error that ends the job instead of being retried on the next tick.
///
/// Returned (through `anyhow`) when a worker detects a broken invariant.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Fatal(pub String);

/// One-way stop flag with an interruptible timed wait.
#[derive(Debug, Default)]
pub struct StopSignal {
    requested: Mutex<bool>,
    cvar: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake any waiter. Returns `true` only for the call
    /// that actually flipped it.
    pub fn request(&self) -> bool {
        let mut requested = self.requested.lock().unwrap_or_else(PoisonError::into_inner);
        let first = !*requested;
        *requested = true;
        self.cvar.notify_all();
        first
    }

    pub fn is_requested(&self) -> bool {
        *self.requested.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block for at most `timeout`, returning early as soon as a stop is
    /// requested. Returns whether a stop has been requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let requested = self.requested.lock().unwrap_or_else(PoisonError::into_inner);
        let (requested, _) = self
            .cvar
            .wait_timeout_while(requested, timeout, |requested| !*requested)
            .unwrap_or_else(PoisonError::into_inner);
        *requested
    }
}

struct Shared {
    state: AtomicU8,
    signal: StopSignal,
}

/// A single-use interval loop running on its own thread.
pub struct BackgroundJob {
    label: String,
    interval: Duration,
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundJob {
    /// Create a job in the `Created` state. A zero interval is rejected.
    pub fn new(label: impl Into<String>, interval: Duration) -> Result<Self, AppError> {
        let label = label.into();
        if label.contains('\0') {
            return Err(AppError::InvalidInput(format!(
                "job label {label:?} may not contain NUL bytes"
            )));
        }
        if interval.is_zero() {
            return Err(AppError::InvalidInput(format!(
                "{label}: interval must be greater than zero"
            )));
        }
        Ok(Self {
            label,
            interval,
            shared: Arc::new(Shared {
                state: AtomicU8::new(JobState::Created.as_u8()),
                signal: StopSignal::new(),
            }),
            thread: Mutex::new(None),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_stop_requested(&self) -> bool {
        self.shared.signal.is_requested()
    }

    /// Spawn the loop thread and return immediately.
    ///
    /// Only a `Created` job can be started; anything else is `AppError::Job`.
    pub fn start<T: Tick>(&self, worker: T) -> Result<(), AppError> {
        self.shared
            .state
            .compare_exchange(
                JobState::Created.as_u8(),
                JobState::Running.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|current| {
                AppError::Job(format!(
                    "{} cannot be started from state {:?}",
                    self.label,
                    JobState::from_u8(current)
                ))
            })?;

        let shared = Arc::clone(&self.shared);
        let label = self.label.clone();
        let interval = self.interval;
        let spawned = std::thread::Builder::new()
            .name(self.label.clone())
            .spawn(move || {
                run_loop(&label, worker, interval, &shared.signal);
                shared.state.store(JobState::Stopped.as_u8(), Ordering::Release);
            });

        match spawned {
            Ok(handle) => {
                *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                tracing::info!("{} started (interval {:?})", self.label, self.interval);
                Ok(())
            }
            Err(e) => {
                self.shared
                    .state
                    .store(JobState::Stopped.as_u8(), Ordering::Release);
                Err(AppError::Job(format!(
                    "failed to spawn {} thread: {e}",
                    self.label
                )))
            }
        }
    }

    /// Signal the loop to exit. Idempotent, never blocks on the loop thread.
    pub fn stop(&self) {
        if !self.shared.signal.request() {
            return;
        }
        let moved = self.shared.state.compare_exchange(
            JobState::Running.as_u8(),
            JobState::Stopping.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if moved.is_err() {
            // Never started: it can no longer be started either.
            let _ = self.shared.state.compare_exchange(
                JobState::Created.as_u8(),
                JobState::Stopped.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
        tracing::info!("{} stop requested", self.label);
    }

    /// Wait for the loop thread to exit. Returns `false` if there was no
    /// thread to join or it ended by panicking.
    ///
    /// Control commands never call this; it exists for orderly shutdown and tests.
    pub fn join(&self) -> bool {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => handle.join().is_ok(),
            None => false,
        }
    }
}

impl Drop for BackgroundJob {
    fn drop(&mut self) {
        if self.shared.signal.request() {
            tracing::debug!("{} dropped while active, stop signalled", self.label);
        }
    }
}

/// Drive `worker` until `signal` is raised, then finalize it once.
///
/// The stop flag is checked before every tick and the inter-tick wait is
/// interruptible, so a stop takes effect within the current wait. A panic in a
/// tick ends the loop (finalization still runs); an `Err` does not.
pub(crate) fn run_loop<T: Tick>(label: &str, mut worker: T, interval: Duration, signal: &StopSignal) {
    let mut ticks: u64 = 0;
    while !signal.is_requested() {
        match panic::catch_unwind(AssertUnwindSafe(|| worker.tick())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is::<Fatal>() => {
                tracing::error!("{label} tick {ticks} hit a fatal error, ending job: {e:#}");
                ticks += 1;
                break;
            }
            Ok(Err(e)) => tracing::warn!("{label} tick {ticks} failed: {e:#}"),
            Err(payload) => {
                tracing::error!(
                    "{label} tick {ticks} panicked, ending job: {}",
                    panic_message(payload.as_ref())
                );
                break;
            }
        }
        ticks += 1;
        if signal.wait_timeout(interval) {
            break;
        }
    }

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| worker.finish())) {
        tracing::error!(
            "{label} finalization panicked: {}",
            panic_message(payload.as_ref())
        );
    }
    tracing::info!("{label} stopped after {ticks} ticks");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
