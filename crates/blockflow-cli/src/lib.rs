//! Loading and reporting for the `blockflow` command.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::debug;

use blockflow_eval::{parse_cases, Diagram, Explorer, ExplorerConfig, TestCase, TestReport};

/// Read and validate a diagram file.
pub fn load_diagram(path: &Path) -> Result<Diagram> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read diagram {}", path.display()))?;
    let diagram = Diagram::from_json(&text)
        .with_context(|| format!("failed to load diagram {}", path.display()))?;
    debug!(
        path = %path.display(),
        blocks = diagram.block_count(),
        threads = diagram.thread_count(),
        "loaded diagram"
    );
    Ok(diagram)
}

/// Read a test case file in either supported shape.
pub fn load_cases(path: &Path) -> Result<Vec<TestCase>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read test cases {}", path.display()))?;
    parse_cases(&text).with_context(|| format!("failed to parse test cases {}", path.display()))
}

/// What to test and how far to search.
#[derive(Debug, Clone, Default)]
pub struct TestOptions {
    pub cases: Option<PathBuf>,
    pub inputs: Vec<String>,
    pub expected: Vec<String>,
    pub max_states: Option<usize>,
    pub max_steps: Option<usize>,
}

impl TestOptions {
    /// Cases from the file if one was given, else one case built from the
    /// inline inputs and expected lines.
    pub fn cases(&self) -> Result<Vec<TestCase>> {
        match &self.cases {
            Some(path) => {
                if !self.inputs.is_empty() || !self.expected.is_empty() {
                    bail!("--input and --expect cannot be combined with --cases");
                }
                load_cases(path)
            }
            None => Ok(vec![TestCase::new(
                "inline",
                self.inputs.clone(),
                self.expected.clone(),
            )]),
        }
    }

    pub fn config(&self) -> ExplorerConfig {
        let mut config = ExplorerConfig::new();
        config.max_states = self.max_states;
        config.max_steps = self.max_steps;
        config
    }
}

/// Explore every case against `diagram`.
pub fn run_tests(diagram: &Diagram, options: &TestOptions) -> Result<Vec<(String, TestReport)>> {
    let cases = options.cases()?;
    Ok(Explorer::new(diagram)
        .with_config(options.config())
        .explore_suite(&cases))
}

/// True when every case matched on every explored schedule.
pub fn all_passed(reports: &[(String, TestReport)]) -> bool {
    reports
        .iter()
        .all(|(_, r)| r.total_runs > 0 && r.overall_success_rate() == Some(100.0))
}

/// Human-readable summary of one case. `verbose` adds the per-step-count rates.
pub fn render_report(name: &str, report: &TestReport, verbose: bool) -> String {
    let overall = report.overall_success_rate().unwrap_or(0.0);
    let mut out = format!(
        "{}: {:.1}% of {} runs matched (max {} steps)\n",
        name, overall, report.total_runs, report.max_step_count
    );
    if report.completed_runs < report.total_runs {
        out.push_str(&format!(
            "  {} runs stopped on an error\n",
            report.total_runs - report.completed_runs
        ));
    }
    if report.truncated_runs > 0 {
        out.push_str(&format!(
            "  {} schedules cut at the step limit\n",
            report.truncated_runs
        ));
    }
    if report.interrupted {
        out.push_str("  search interrupted; results are partial\n");
    }
    if verbose {
        for (steps, rate) in &report.success_rate_by_step_count {
            out.push_str(&format!("  <= {:>4} steps: {:>6.2}%\n", steps, rate));
        }
    }
    out
}

/// One entry of the `--json` output.
#[derive(Debug, Serialize)]
struct NamedReport<'a> {
    name: &'a str,
    #[serde(flatten)]
    report: &'a TestReport,
}

/// Reports as a JSON array, one object per case in suite order.
pub fn reports_to_json(reports: &[(String, TestReport)]) -> serde_json::Result<String> {
    let entries: Vec<NamedReport<'_>> = reports
        .iter()
        .map(|(name, report)| NamedReport { name, report })
        .collect();
    serde_json::to_string_pretty(&entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_case() {
        let options = TestOptions {
            inputs: vec!["1".into()],
            expected: vec!["2".into()],
            ..Default::default()
        };
        let cases = options.cases().unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].name, "inline");
        assert_eq!(cases[0].input, vec!["1"]);
    }

    #[test]
    fn test_config_carries_limits() {
        let options = TestOptions {
            max_steps: Some(30),
            ..Default::default()
        };
        let config = options.config();
        assert_eq!(config.max_steps, Some(30));
        assert_eq!(config.max_states, None);
    }

    #[test]
    fn test_render_report_mentions_interruption() {
        let report = TestReport {
            interrupted: true,
            truncated_runs: 2,
            ..Default::default()
        };
        let text = render_report("loop", &report, false);
        assert!(text.starts_with("loop: 0.0% of 0 runs matched"));
        assert!(text.contains("2 schedules cut"));
        assert!(text.contains("interrupted"));
    }

    #[test]
    fn test_json_keeps_duplicate_names_in_order() {
        let first = TestReport {
            total_runs: 3,
            ..Default::default()
        };
        let second = TestReport {
            total_runs: 1,
            ..Default::default()
        };
        let reports = vec![
            ("same".to_string(), first),
            ("same".to_string(), second),
            ("alpha".to_string(), TestReport::default()),
        ];

        let json: serde_json::Value = serde_json::from_str(&reports_to_json(&reports).unwrap()).unwrap();
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["name"], "same");
        assert_eq!(entries[0]["totalRuns"], 3);
        assert_eq!(entries[1]["name"], "same");
        assert_eq!(entries[1]["totalRuns"], 1);
        assert_eq!(entries[2]["name"], "alpha");
        assert!(entries[2]["successRateByStepCount"].is_object());
    }
}
