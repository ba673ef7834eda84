//! Latency sampling job and its sample stream.
//!
//! The job probes its target once per tick and appends the outcome to an
//! unbounded FIFO. A failed or panicking probe becomes [`Sample::Missing`];
//! it never ends the job. When the loop exits, exactly one [`Sample::End`] is appended and
//! the stream refuses anything after it.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

use super::job::{BackgroundJob, Fatal, JobState, Tick};
use super::probe::Probe;
use crate::error::AppError;

/// One entry of a sample stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Sample {
    /// A finite measurement in milliseconds.
    Value(f64),
    /// The probe failed on this tick.
    Missing,
    /// The producer has stopped; nothing follows.
    End,
}

impl Sample {
    /// Wrap a measurement, mapping non-finite values to `Missing`.
    pub fn measured(ms: f64) -> Self {
        if ms.is_finite() {
            Sample::Value(ms)
        } else {
            Sample::Missing
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Sample::Value(ms) => Some(*ms),
            _ => None,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Sample::End)
    }
}

#[derive(Debug, Default)]
struct StreamState {
    queue: VecDeque<Sample>,
    ended: bool,
}

/// Single-producer FIFO of samples, drained without blocking by any number
/// of consumers.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    state: Mutex<StreamState>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a data sample. Returns `false` (and drops it) once the stream
    /// has ended. `End` is rejected here; use [`SampleBuffer::close`].
    pub fn push(&self, sample: Sample) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.ended || sample.is_end() {
            return false;
        }
        state.queue.push_back(sample);
        true
    }

    /// Append the terminal sentinel. Returns `false` if it was already there.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.ended {
            return false;
        }
        state.ended = true;
        state.queue.push_back(Sample::End);
        true
    }

    /// Remove and return everything currently queued, oldest first.
    pub fn drain_available(&self) -> Vec<Sample> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.queue.drain(..).collect()
    }

    /// Whether the sentinel has been appended (it may not be drained yet).
    pub fn is_ended(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ended
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Sampler {
    target: String,
    probe: Arc<dyn Probe>,
    buffer: Arc<SampleBuffer>,
}

impl Tick for Sampler {
    fn tick(&mut self) -> anyhow::Result<()> {
        let probed = panic::catch_unwind(AssertUnwindSafe(|| self.probe.probe(&self.target)));
        let sample = match probed {
            Ok(Ok(ms)) => Sample::measured(ms),
            Ok(Err(e)) => {
                tracing::warn!("Probe to {} failed: {e:#}", self.target);
                Sample::Missing
            }
            Err(_) => {
                tracing::warn!("Probe to {} panicked, recording a missing sample", self.target);
                Sample::Missing
            }
        };
        tracing::debug!("Net-Load {} -> {sample:?}", self.target);
        if !self.buffer.push(sample) {
            return Err(Fatal(format!("sample stream for {} already ended", self.target)).into());
        }
        Ok(())
    }

    fn finish(&mut self) {
        if !self.buffer.close() {
            tracing::error!("sample stream for {} was already closed", self.target);
        }
        tracing::info!("Net-Load STOP -> {}", self.target);
    }
}

/// A latency sampling instance bound to one target.
pub struct SamplingJob {
    target: String,
    probe: Arc<dyn Probe>,
    buffer: Arc<SampleBuffer>,
    job: BackgroundJob,
}

impl SamplingJob {
    /// Build a job for `target`. A blank target, a target containing control
    /// characters, or a zero interval is rejected.
    pub fn new(
        target: impl Into<String>,
        interval: Duration,
        probe: Arc<dyn Probe>,
    ) -> Result<Self, AppError> {
        let target = target.into().trim().to_string();
        if target.is_empty() {
            return Err(AppError::InvalidInput("sampling target must not be empty".into()));
        }
        if target.chars().any(char::is_control) {
            return Err(AppError::InvalidInput(format!(
                "sampling target {target:?} contains control characters"
            )));
        }
        Ok(Self {
            job: BackgroundJob::new(format!("netload-{target}"), interval)?,
            target,
            probe,
            buffer: Arc::new(SampleBuffer::new()),
        })
    }

    pub fn start(&self) -> Result<(), AppError> {
        tracing::info!("Net-Load START -> {}", self.target);
        self.job.start(Sampler {
            target: self.target.clone(),
            probe: Arc::clone(&self.probe),
            buffer: Arc::clone(&self.buffer),
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

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn interval(&self) -> Duration {
        self.job.interval()
    }

    /// Non-blocking drain of everything produced so far. Seeing
    /// [`Sample::End`] means the job has fully stopped.
    pub fn drain_available(&self) -> Vec<Sample> {
        self.buffer.drain_available()
    }
}
