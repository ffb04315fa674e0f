//! Process listing adapter.
//!
//! Consumes `ps` output. Two column layouts are understood:
//!
//! - [`ProcessListingFormat::Basic`]: `PID RSS COMM`
//! - [`ProcessListingFormat::Extended`]: `PID PPID RSS %CPU USER COMM`
//!
//! The command column is last and may contain spaces, so every column
//! before it is split strictly and the remainder of the line is the command.
//! Lines whose numeric columns do not parse (headers, truncated rows) are
//! skipped. Rows sharing a pid are folded into one record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::system_monitor::metrics::ProcessRecord;

const KB_PER_MB: f64 = 1024.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessListingFormat {
    Basic,
    #[default]
    Extended,
}

impl ProcessListingFormat {
    /// `ps` arguments that produce this layout (header included).
    pub fn ps_args(&self) -> Vec<String> {
        let columns = match self {
            ProcessListingFormat::Basic => "pid,rss,comm",
            ProcessListingFormat::Extended => "pid,ppid,rss,%cpu,user,comm",
        };
        vec!["-axww".to_string(), "-o".to_string(), columns.to_string()]
    }
}

/// Parse a `PID RSS COMM` listing.
pub fn parse_process_listing(raw: &str) -> Vec<ProcessRecord> {
    parse_process_listing_with(raw, ProcessListingFormat::Basic)
}

/// Parse a listing in the given layout, merging duplicate pids.
///
/// Output keeps first-seen order; ranking is done elsewhere.
pub fn parse_process_listing_with(raw: &str, format: ProcessListingFormat) -> Vec<ProcessRecord> {
    let mut records: Vec<ProcessRecord> = Vec::new();
    let mut index: HashMap<u32, usize> = HashMap::new();

    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let parsed = match format {
            ProcessListingFormat::Basic => parse_basic_line(line),
            ProcessListingFormat::Extended => parse_extended_line(line),
        };

        let Some(record) = parsed else {
            log::trace!("skipping unparseable process line: {:?}", line);
            continue;
        };

        match index.get(&record.pid) {
            Some(&slot) => {
                // Per-thread rows of one process: sum usage, keep first identity
                let existing = &mut records[slot];
                existing.memory_mb += record.memory_mb;
                existing.cpu_percent += record.cpu_percent;
            }
            None => {
                index.insert(record.pid, records.len());
                records.push(record);
            }
        }
    }

    records
}

fn parse_basic_line(line: &str) -> Option<ProcessRecord> {
    let (pid, rest) = split_field(line)?;
    let (rss, rest) = split_field(rest)?;

    let pid = parse_pid(pid)?;
    let rss_kb: u64 = rss.parse().ok()?;
    let command = rest.trim();

    Some(ProcessRecord {
        pid,
        name: display_name(command),
        memory_mb: rss_kb as f64 / KB_PER_MB,
        command: command.to_string(),
        ..Default::default()
    })
}

fn parse_extended_line(line: &str) -> Option<ProcessRecord> {
    let (pid, rest) = split_field(line)?;
    let (ppid, rest) = split_field(rest)?;
    let (rss, rest) = split_field(rest)?;
    let (cpu, rest) = split_field(rest)?;
    let (user, rest) = split_field(rest)?;

    let pid = parse_pid(pid)?;
    let ppid: u32 = ppid.parse().ok()?;
    let rss_kb: u64 = rss.parse().ok()?;
    // Some locales print a decimal comma
    let cpu: f32 = cpu.replace(',', ".").parse().ok()?;
    let command = rest.trim();

    Some(ProcessRecord {
        pid,
        name: display_name(command),
        user: Some(user.to_string()),
        cpu_percent: cpu.max(0.0),
        memory_mb: rss_kb as f64 / KB_PER_MB,
        command: command.to_string(),
        parent_pid: (ppid > 0).then_some(ppid),
        ..Default::default()
    })
}

fn parse_pid(field: &str) -> Option<u32> {
    field.parse::<u32>().ok().filter(|pid| *pid > 0)
}

/// Split off the first whitespace-delimited field, returning it and the rest.
fn split_field(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(end) => Some((&s[..end], &s[end..])),
        None => Some((s, "")),
    }
}

/// Last path component of the command, e.g. `Safari` for
/// `/Applications/Safari.app/Contents/MacOS/Safari`.
fn display_name(command: &str) -> String {
    command
        .rsplit('/')
        .find(|part| !part.is_empty())
        .unwrap_or(command)
        .to_string()
}
