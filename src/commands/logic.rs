//! Pure business logic functions extracted from the command handlers.
//!
//! These functions take plain parameters (no `AppState` dependency) and can be
//! unit-tested without running any job.

use std::cmp::Ordering;

use serde::Serialize;

use crate::core::{ProcessEntry, Sample};
use crate::error::AppError;

/// Summary of one drained batch of samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleStats {
    /// Probes in the batch, failed ones included.
    pub n: usize,
    /// Mean of the successful probes, rounded to 2 decimals.
    pub avg: Option<f64>,
    /// Most recent successful probe.
    pub last: Option<f64>,
}

/// Column a process listing is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Pid,
    Name,
    Cmd,
}

impl SortKey {
    /// Parse a sort key; unknown keys mean "leave provider order".
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pid" => Some(SortKey::Pid),
            "name" => Some(SortKey::Name),
            "cmd" => Some(SortKey::Cmd),
            _ => None,
        }
    }
}

/// Split newline-separated name input, trimming entries and dropping blanks.
pub fn parse_name_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `asc` / `desc` into "descending?".
pub fn parse_order(raw: &str) -> Result<bool, AppError> {
    match raw.trim().to_lowercase().as_str() {
        "" | "asc" => Ok(false),
        "desc" => Ok(true),
        other => Err(AppError::InvalidInput(format!(
            "sort order must be 'asc' or 'desc', got '{other}'"
        ))),
    }
}

/// Compute the batch summary shown to the operator. `None` for an empty batch.
pub fn summarize_samples(samples: &[Sample]) -> Option<SampleStats> {
    let probes: Vec<&Sample> = samples.iter().filter(|s| !s.is_end()).collect();
    if probes.is_empty() {
        return None;
    }
    let values: Vec<f64> = probes.iter().filter_map(|s| s.value()).collect();
    let avg = if values.is_empty() {
        None
    } else {
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some((mean * 100.0).round() / 100.0)
    };
    Some(SampleStats {
        n: probes.len(),
        avg,
        last: values.last().copied(),
    })
}

/// Filter (case-insensitive substring on name or command line) and sort a
/// process listing.
pub fn query_processes(
    mut entries: Vec<ProcessEntry>,
    query: &str,
    sort: Option<SortKey>,
    descending: bool,
) -> Vec<ProcessEntry> {
    let query = query.trim().to_lowercase();
    if !query.is_empty() {
        entries.retain(|e| {
            e.name.to_lowercase().contains(&query) || e.cmd.to_lowercase().contains(&query)
        });
    }

    if let Some(key) = sort {
        entries.sort_by(|a, b| {
            let ord = compare_by(key, a, b);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }
    entries
}

fn compare_by(key: SortKey, a: &ProcessEntry, b: &ProcessEntry) -> Ordering {
    match key {
        SortKey::Pid => a.pid.cmp(&b.pid),
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortKey::Cmd => a.cmd.to_lowercase().cmp(&b.cmd.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pid: u32, name: &str, cmd: &str) -> ProcessEntry {
        ProcessEntry {
            pid,
            name: name.to_string(),
            cmd: cmd.to_string(),
        }
    }

    #[test]
    fn test_parse_name_list_trims_and_skips_blanks() {
        let text = "  notepad.exe \n\n\tcalc.exe\r\n   \n";
        assert_eq!(parse_name_list(text), vec!["notepad.exe", "calc.exe"]);
        assert!(parse_name_list("").is_empty());
    }

    #[test]
    fn test_parse_order() {
        assert!(!parse_order("asc").unwrap());
        assert!(!parse_order("").unwrap());
        assert!(parse_order("DESC").unwrap());
        assert_eq!(parse_order("sideways").unwrap_err().kind(), "InvalidInput");
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(SortKey::parse("PID"), Some(SortKey::Pid));
        assert_eq!(SortKey::parse("name"), Some(SortKey::Name));
        assert_eq!(SortKey::parse("cmd"), Some(SortKey::Cmd));
        assert_eq!(SortKey::parse("memory"), None);
    }

    #[test]
    fn test_summarize_mixed_batch() {
        let samples = [Sample::Value(10.0), Sample::Missing, Sample::Value(15.005), Sample::Missing];
        let stats = summarize_samples(&samples).unwrap();
        assert_eq!(stats.n, 4);
        assert_eq!(stats.avg, Some(12.5));
        assert_eq!(stats.last, Some(15.005));
    }

    #[test]
    fn test_summarize_all_failed() {
        let stats = summarize_samples(&[Sample::Missing, Sample::Missing]).unwrap();
        assert_eq!(stats, SampleStats { n: 2, avg: None, last: None });
    }

    #[test]
    fn test_summarize_ignores_sentinel_and_empty() {
        assert!(summarize_samples(&[]).is_none());
        assert!(summarize_samples(&[Sample::End]).is_none());
        assert_eq!(summarize_samples(&[Sample::Value(1.0), Sample::End]).unwrap().n, 1);
    }

    #[test]
    fn test_query_filters_on_name_or_cmd() {
        let entries = vec![
            entry(1, "Explorer.exe", ""),
            entry(2, "python.exe", "python.exe C:\\tools\\explorer_helper.py"),
            entry(3, "cmd.exe", "cmd.exe /c dir"),
        ];
        let pids: Vec<u32> = query_processes(entries, "EXPLORER", None, false)
            .iter()
            .map(|e| e.pid)
            .collect();
        assert_eq!(pids, vec![1, 2]);
    }

    #[test]
    fn test_query_sorts_case_insensitively_both_directions() {
        let entries = vec![entry(3, "beta", ""), entry(1, "Alpha", ""), entry(2, "gamma", "")];

        let asc: Vec<u32> = query_processes(entries.clone(), "", Some(SortKey::Name), false)
            .iter()
            .map(|e| e.pid)
            .collect();
        assert_eq!(asc, vec![1, 3, 2]);

        let desc: Vec<u32> = query_processes(entries.clone(), "", Some(SortKey::Pid), true)
            .iter()
            .map(|e| e.pid)
            .collect();
        assert_eq!(desc, vec![3, 2, 1]);

        let unsorted: Vec<u32> = query_processes(entries, "", None, true)
            .iter()
            .map(|e| e.pid)
            .collect();
        assert_eq!(unsorted, vec![3, 1, 2]);
    }
}
