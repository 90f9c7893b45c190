//! rsync `--stats` output parsing

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static STATS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?): ([0-9][0-9.,]*)(?: (.+))?$").expect("valid regex"));

/// A single reported number
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Int(u64),
    Float(f64),
}

impl StatValue {
    pub fn as_f64(self) -> f64 {
        match self {
            StatValue::Int(v) => v as f64,
            StatValue::Float(v) => v,
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.replace(',', "");
        if raw.contains('.') {
            raw.parse().ok().map(StatValue::Float)
        } else {
            raw.parse().ok().map(StatValue::Int)
        }
    }
}

/// Transfer statistics keyed by rsync's own labels
///
/// Sub-counts such as `Number of files: 2 (reg: 1, dir: 1)` are stored as
/// `Number of files: reg` and `Number of files: dir`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stats(BTreeMap<String, StatValue>);

impl Stats {
    /// Parse `--stats` output
    ///
    /// Lines that look like a statistic but hold an unreadable number (a
    /// file list entry such as `notes: 2024.01.02`) are skipped. Returns
    /// `None` when nothing usable was reported.
    pub fn parse(output: &str) -> Option<Self> {
        let mut stats = BTreeMap::new();

        for line in output.lines() {
            let Some(caps) = STATS_LINE.captures(line.trim_end()) else {
                continue;
            };

            let name = &caps[1];
            let Some(value) = StatValue::parse(&caps[2]) else {
                tracing::debug!("skipping unreadable stats line: {}", line);
                continue;
            };
            stats.insert(name.to_string(), value);

            let Some(unit) = caps.get(3).map(|m| m.as_str()) else {
                continue;
            };
            if !unit.starts_with('(') {
                continue;
            }

            for part in unit.trim_matches(|c| c == '(' || c == ')').split(", ") {
                let Some((subname, value)) = part.split_once(": ") else {
                    continue;
                };
                if let Some(StatValue::Int(v)) = StatValue::parse(value) {
                    stats.insert(format!("{}: {}", name, subname), StatValue::Int(v));
                }
            }
        }

        if stats.is_empty() {
            None
        } else {
            Some(Self(stats))
        }
    }

    pub fn get(&self, name: &str) -> Option<StatValue> {
        self.0.get(name).copied()
    }

    /// First of several alternative labels (rsync renamed some between versions)
    pub fn first_of(&self, names: &[&str]) -> Option<StatValue> {
        names.iter().find_map(|name| self.get(name))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, StatValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, StatValue)> for Stats {
    fn from_iter<I: IntoIterator<Item = (String, StatValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "
Number of files: 2 (reg: 1, dir: 1)
Number of created files: 0
Number of deleted files: 0
Number of regular files transferred: 0
Total file size: 29 bytes
Total transferred file size: 0 bytes
Literal data: 0 bytes
Matched data: 0 bytes
File list size: 0
File list generation time: 0.001 seconds
File list transfer time: 0.000 seconds
Total bytes sent: 65
Total bytes received: 19

sent 65 bytes  received 19 bytes  168.00 bytes/sec
total size is 29  speedup is 0.35
";

    #[test]
    fn test_parse_stats_output() {
        let stats = Stats::parse(OUTPUT).unwrap();

        assert_eq!(stats.get("Number of files"), Some(StatValue::Int(2)));
        assert_eq!(stats.get("Number of files: reg"), Some(StatValue::Int(1)));
        assert_eq!(stats.get("Number of files: dir"), Some(StatValue::Int(1)));
        assert_eq!(stats.get("Total file size"), Some(StatValue::Int(29)));
        assert_eq!(stats.get("File list generation time"), Some(StatValue::Float(0.001)));
        assert_eq!(stats.get("Total bytes received"), Some(StatValue::Int(19)));
        // summary lines are not statistics
        assert!(stats.iter().all(|(name, _)| !name.starts_with("sent")));
        assert_eq!(stats.len(), 15);
    }

    #[test]
    fn test_thousands_separators() {
        let stats = Stats::parse("Number of files: 1,234 (reg: 1,000, dir: 234)\n").unwrap();

        assert_eq!(stats.get("Number of files"), Some(StatValue::Int(1234)));
        assert_eq!(stats.get("Number of files: reg"), Some(StatValue::Int(1000)));
        assert_eq!(stats.get("Number of files: dir"), Some(StatValue::Int(234)));
    }

    #[test]
    fn test_unreadable_lines_are_skipped() {
        let output = format!("notes: 2024.01.02\nreport: 1.2.3 (a: b)\n{}", OUTPUT);
        let stats = Stats::parse(&output).unwrap();

        assert_eq!(stats.get("notes"), None);
        assert_eq!(stats.get("report"), None);
        assert_eq!(stats.get("Total bytes sent"), Some(StatValue::Int(65)));
        assert_eq!(stats.len(), 15);
    }

    #[test]
    fn test_no_stats() {
        assert_eq!(Stats::parse(""), None);
        assert_eq!(Stats::parse("sending incremental file list\n./\n"), None);
    }

    #[test]
    fn test_first_of() {
        let stats = Stats::parse("Number of files transferred: 7\n").unwrap();

        let files = stats.first_of(&[
            "Number of regular files transferred",
            "Number of files transferred",
        ]);
        assert_eq!(files, Some(StatValue::Int(7)));
    }

    #[test]
    fn test_json_shape() {
        let stats = Stats::parse(OUTPUT).unwrap();
        let json = serde_json::to_string(&stats).unwrap();

        assert!(json.contains("\"Number of files\":2"));
        let back: Stats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
