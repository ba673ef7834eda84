//! Network latency probe collaborator.
//!
//! A [`Probe`] performs one measurement against an opaque target and returns
//! the round-trip time in milliseconds. [`PingProbe`] shells out to the system
//! `ping`; any `Fn(&str) -> anyhow::Result<f64>` closure is a probe as well.

use std::process::Command;

use anyhow::{bail, Context, Result};

use crate::config;

/// Performs a single measurement against `target`.
pub trait Probe: Send + Sync {
    fn probe(&self, target: &str) -> Result<f64>;
}

impl<F> Probe for F
where
    F: Fn(&str) -> Result<f64> + Send + Sync,
{
    fn probe(&self, target: &str) -> Result<f64> {
        self(target)
    }
}

/// ICMP round-trip probe using the platform `ping` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingProbe;

impl PingProbe {
    fn command(target: &str) -> Command {
        let count = config::PING_COUNT.to_string();
        let (count_flag, timeout_flag, timeout) = if cfg!(target_os = "windows") {
            ("-n", "-w", (config::PING_TIMEOUT_SECS * 1000).to_string())
        } else if cfg!(target_os = "macos") {
            ("-c", "-t", config::PING_TIMEOUT_SECS.to_string())
        } else {
            ("-c", "-W", config::PING_TIMEOUT_SECS.to_string())
        };

        let mut cmd = Command::new("ping");
        cmd.arg(count_flag)
            .arg(count)
            .arg(timeout_flag)
            .arg(timeout)
            .arg(target);
        cmd
    }
}

impl Probe for PingProbe {
    fn probe(&self, target: &str) -> Result<f64> {
        if target.starts_with('-') {
            bail!("refusing to ping option-like target {target:?}");
        }
        let output = Self::command(target)
            .output()
            .context("failed to run ping")?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_ping_latency(&stdout) {
            Some(ms) => Ok(ms),
            None => bail!("ping to {target} failed"),
        }
    }
}

/// Extract the first round-trip time (ms) from `ping` output.
///
/// Understands `time=12.3 ms`, `time=12ms` and the Windows sub-millisecond
/// form `time<1ms`.
pub fn parse_ping_latency(output: &str) -> Option<f64> {
    output.lines().find_map(|line| {
        let lower = line.to_lowercase();
        let (_, rest) = lower
            .split_once("time=")
            .or_else(|| lower.split_once("time<"))?;
        let value = rest.split("ms").next()?.trim();
        value.parse::<f64>().ok().filter(|ms| ms.is_finite())
    })
}
