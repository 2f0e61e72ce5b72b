// File: testman/src/harness/report.rs
//
// Run Reports
//
// Outcome tree of a harness run. Rendered for humans on failure and saved as
// JSON when a report directory is configured.

use crate::context::strip_wrapper;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use strum::Display;

/// Final state of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Finished without failing
    #[strum(serialize = "PASS")]
    Passed,
    /// Failed (explicitly, by panic, or through a failed child)
    #[strum(serialize = "FAIL")]
    Failed,
    /// Skipped without failing
    #[strum(serialize = "SKIP")]
    Skipped,
}

/// Outcome of one unit and its children
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Full `/`-separated host name
    pub name: String,
    /// Final state
    pub outcome: Outcome,
    /// RFC 3339 start time
    pub started_at: String,
    /// Wall time including children and cleanups
    pub duration_ms: u64,
    /// Recorded log lines
    pub logs: Vec<String>,
    /// Child units in start order
    pub children: Vec<Report>,
}

impl Report {
    /// True unless the unit failed
    pub fn passed(&self) -> bool {
        self.outcome != Outcome::Failed
    }

    /// First unit (pre-order) whose full name, or name without the wrapper
    /// segment, equals `name`
    pub fn find(&self, name: &str) -> Option<&Report> {
        if self.name == name || strip_wrapper(&self.name) == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    /// Failed units that have no failed children, i.e. where failures started
    pub fn failed_tests(&self) -> Vec<&Report> {
        let mut failed = Vec::new();
        self.collect_failed(&mut failed);
        failed
    }

    fn collect_failed<'a>(&'a self, out: &mut Vec<&'a Report>) {
        if self.outcome != Outcome::Failed {
            return;
        }
        let before = out.len();
        for child in &self.children {
            child.collect_failed(out);
        }
        if out.len() == before {
            out.push(self);
        }
    }

    /// Number of units in the tree, this one included
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Report::count).sum::<usize>()
    }

    /// Human readable tree in `go test -v` style
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let indent = "    ".repeat(depth);
        let _ = writeln!(
            out,
            "{indent}--- {}: {} ({:.2}s)",
            self.outcome,
            self.name,
            self.duration_ms as f64 / 1000.0
        );
        if !self.logs.is_empty() {
            let logs = self.logs.join("\n");
            out.push_str(&textwrap::indent(&logs, &format!("{indent}        ")));
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }

    /// Panic with the rendered tree if the run failed
    pub fn assert_passed(&self) {
        if !self.passed() {
            panic!("{} failed:\n{}", self.name, self.render());
        }
    }

    /// Write the report as `<dir>/<name>.json`, returning the file path
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| {
                format!("Failed to create report directory {}", dir.display())
            })?;

        let path = dir.join(format!("{}.json", sanitize(&self.name)));
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;

        if log::log_enabled!(log::Level::Debug) {
            log::debug!("Saved report for {} to {:?}", self.name, path);
        }

        Ok(path)
    }

    /// Load a report saved by [`Report::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read report {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse report {}", path.display()))
    }
}

/// File-system safe rendition of a test name
pub(crate) fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, outcome: Outcome, children: Vec<Report>) -> Report {
        Report {
            name: name.to_string(),
            outcome,
            started_at: "2026-01-01T00:00:00Z".to_string(),
            duration_ms: 1500,
            logs: Vec::new(),
            children,
        }
    }

    fn sample() -> Report {
        let mut failing = unit("Suite/!/test_b", Outcome::Failed, vec![]);
        failing.logs.push("expected 2, got 3".to_string());

        unit(
            "Suite",
            Outcome::Failed,
            vec![unit(
                "Suite/!",
                Outcome::Failed,
                vec![
                    unit("Suite/!/test_a", Outcome::Passed, vec![]),
                    failing,
                    unit("Suite/!/test_c", Outcome::Skipped, vec![]),
                ],
            )],
        )
    }

    #[test]
    fn test_find_by_full_or_stripped_name() {
        let report = sample();

        assert_eq!(report.find("Suite").unwrap().name, "Suite");
        assert_eq!(
            report.find("Suite/!/test_a").unwrap().outcome,
            Outcome::Passed
        );
        assert_eq!(report.find("test_c").unwrap().outcome, Outcome::Skipped);
        assert!(report.find("test_z").is_none());
        assert_eq!(report.count(), 5);
    }

    #[test]
    fn test_failed_tests_are_leaves() {
        let report = sample();
        let failed: Vec<&str> = report
            .failed_tests()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(failed, vec!["Suite/!/test_b"]);
        assert!(!report.passed());
    }

    #[test]
    fn test_render() {
        let rendered = sample().render();
        assert!(rendered.starts_with("--- FAIL: Suite (1.50s)\n"));
        assert!(rendered.contains("        --- SKIP: Suite/!/test_c"));
        assert!(rendered.contains("                expected 2, got 3\n"));
    }

    #[test]
    #[should_panic(expected = "Suite failed")]
    fn test_assert_passed_panics_on_failure() {
        sample().assert_passed();
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample();

        let path = report.save(dir.path().join("nested")).unwrap();
        assert_eq!(path.file_name().unwrap(), "Suite.json");

        let loaded = Report::load(&path).unwrap();
        assert_eq!(loaded.count(), report.count());
        assert_eq!(
            loaded.find("test_b").unwrap().logs,
            vec!["expected 2, got 3"]
        );
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Suite/!/test_a"), "Suite___test_a");
        assert_eq!(sanitize(""), "unnamed");
        assert_eq!(sanitize(&"x".repeat(100)).len(), 64);
    }
}
