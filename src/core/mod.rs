//! Core logic: the background job subsystem and its collaborators.
//!
//! - [`job`] — generic cancellable interval loop ([`BackgroundJob`], [`Tick`])
//! - [`rule`] — allow/block precedence ([`AccessRule`])
//! - [`enforcement`] — process access-control watchdog ([`EnforcementJob`])
//! - [`sampling`] — latency sampling with a terminated stream ([`SamplingJob`])
//! - [`processes`] — process snapshot/termination provider (`sysinfo`)
//! - [`probe`] — latency probe (system `ping`)

pub mod enforcement;
pub mod job;
pub mod probe;
pub mod processes;
pub mod rule;
pub mod sampling;

#[cfg(test)]
pub(crate) mod testing;

pub use enforcement::{EnforcementJob, EnforcementStats};
pub use job::{BackgroundJob, Fatal, JobState, StopSignal, Tick};
pub use probe::{PingProbe, Probe};
pub use processes::{ProcessEntry, ProcessProvider, SysinfoProvider};
pub use rule::{AccessRule, RuleMode};
pub use sampling::{Sample, SampleBuffer, SamplingJob};
