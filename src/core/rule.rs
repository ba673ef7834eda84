//! Allow/block rule applied by the process watchdog.
//!
//! Precedence is fixed:
//! 1. If the block list is populated, a process is terminated only when its
//!    name is on it. The allow list is ignored in this mode.
//! 2. Otherwise, if the allow list is populated, anything not on it is
//!    terminated (deny-by-default).
//! 3. With both lists empty nothing is ever terminated.
//!
//! Names are compared case-insensitively against the short process name only.

use std::collections::BTreeSet;

use serde::Serialize;

/// Which of the three precedence tiers a rule operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    /// Both lists empty.
    Inactive,
    /// Allow-by-absence: only blocked names are terminated.
    BlockList,
    /// Deny-by-default: everything not allowed is terminated.
    AllowList,
}

/// Immutable, lowercased allow and block name sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRule {
    allow: BTreeSet<String>,
    block: BTreeSet<String>,
}

impl AccessRule {
    /// Build a rule; entries are trimmed and lowercased, blanks dropped.
    pub fn new<A, B>(allow: A, block: B) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        B: IntoIterator,
        B::Item: AsRef<str>,
    {
        Self {
            allow: normalize(allow),
            block: normalize(block),
        }
    }

    pub fn mode(&self) -> RuleMode {
        if !self.block.is_empty() {
            RuleMode::BlockList
        } else if !self.allow.is_empty() {
            RuleMode::AllowList
        } else {
            RuleMode::Inactive
        }
    }

    /// Pure kill-or-keep decision for one process name.
    pub fn should_terminate(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        match self.mode() {
            RuleMode::BlockList => self.block.contains(&name),
            RuleMode::AllowList => !self.allow.contains(&name),
            RuleMode::Inactive => false,
        }
    }

    /// Allowed names, sorted.
    pub fn allow(&self) -> impl Iterator<Item = &str> {
        self.allow.iter().map(String::as_str)
    }

    /// Blocked names, sorted.
    pub fn block(&self) -> impl Iterator<Item = &str> {
        self.block.iter().map(String::as_str)
    }
}

fn normalize<I>(names: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| n.as_ref().trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .collect()
}
