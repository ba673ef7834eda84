//! Fakes and helpers shared by the unit tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};

use super::processes::{ProcessEntry, ProcessProvider};

/// Poll `cond` every few milliseconds until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// In-memory process table that records every termination request.
#[derive(Default)]
pub struct FakeProvider {
    table: Mutex<Vec<ProcessEntry>>,
    refuse: Mutex<HashSet<u32>>,
    fail_listing: Mutex<bool>,
    terminated: Mutex<Vec<u32>>,
    listings: Mutex<u64>,
    recycle: Mutex<Option<(u32, String)>>,
    launched: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeProvider {
    pub fn with(entries: &[(u32, &str)]) -> Self {
        let provider = Self::default();
        provider.set_table(entries);
        provider
    }

    pub fn set_table(&self, entries: &[(u32, &str)]) {
        *self.table.lock().unwrap() = entries
            .iter()
            .map(|(pid, name)| ProcessEntry::new(*pid, *name))
            .collect();
    }

    /// Make `terminate(pid)` fail as if access were denied.
    pub fn refuse(&self, pid: u32) {
        self.refuse.lock().unwrap().insert(pid);
    }

    /// After the next listing, hand `pid` to a new process called `name`.
    pub fn recycle_after_listing(&self, pid: u32, name: &str) {
        *self.recycle.lock().unwrap() = Some((pid, name.to_string()));
    }

    pub fn fail_listing(&self, fail: bool) {
        *self.fail_listing.lock().unwrap() = fail;
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().unwrap().clone()
    }

    pub fn launched(&self) -> Vec<(String, Vec<String>)> {
        self.launched.lock().unwrap().clone()
    }

    pub fn listings(&self) -> u64 {
        *self.listings.lock().unwrap()
    }
}

impl ProcessProvider for FakeProvider {
    fn list_processes(&self) -> Result<Vec<ProcessEntry>> {
        *self.listings.lock().unwrap() += 1;
        if *self.fail_listing.lock().unwrap() {
            bail!("snapshot unavailable");
        }
        let mut table = self.table.lock().unwrap();
        let snapshot = table.clone();
        if let Some((pid, name)) = self.recycle.lock().unwrap().take() {
            for entry in table.iter_mut().filter(|e| e.pid == pid) {
                entry.name = name.clone();
            }
        }
        Ok(snapshot)
    }

    fn terminate(&self, pid: u32, expected_name: Option<&str>) -> Result<()> {
        if self.refuse.lock().unwrap().contains(&pid) {
            return Err(anyhow!("access denied for {pid}"));
        }
        if let Some(expected) = expected_name {
            let table = self.table.lock().unwrap();
            match table.iter().find(|e| e.pid == pid) {
                Some(e) if e.name.eq_ignore_ascii_case(expected) => {}
                Some(e) => bail!("pid {pid} now belongs to {}, not {expected}; left running", e.name),
                None => bail!("process {pid} no longer exists"),
            }
        }
        self.terminated.lock().unwrap().push(pid);
        self.table.lock().unwrap().retain(|e| e.pid != pid);
        Ok(())
    }

    /// Launches always succeed except for `missing.exe`; the new process gets
    /// pid `1000 + n` and joins the table.
    fn launch(&self, exe: &str, args: &[String]) -> Result<u32> {
        if exe == "missing.exe" {
            bail!("failed to start {exe}: not found");
        }
        let mut launched = self.launched.lock().unwrap();
        launched.push((exe.to_string(), args.to_vec()));
        let pid = 1000 + launched.len() as u32;
        self.table.lock().unwrap().push(ProcessEntry::new(pid, exe));
        Ok(pid)
    }
}
