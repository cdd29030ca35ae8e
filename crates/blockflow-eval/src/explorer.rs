//! Exhaustive exploration of thread interleavings.
//!
//! A state of the search is the list of thread indices stepped so far. The
//! explorer reconstructs any state by replaying that list from a fresh
//! environment, fresh cursors and a fresh [`ScriptedIo`], so the same list
//! always yields the same environment and output.
//!
//! The search is breadth-first. Every thread still live in a dequeued state
//! contributes exactly one child: the state extended by one step of that
//! thread. A child with no live threads left is a terminal run and is
//! scored against the expected output; anything else goes back on the queue.
//! The number of terminal runs grows with the multinomial coefficient of the
//! per-thread step counts, so [`ExplorerConfig`] can cap both the number of
//! dequeued states and the length of a schedule.

use std::collections::{BTreeMap, VecDeque};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::block::Diagram;
use crate::env::Environment;
use crate::interpreter::{Interpreter, ThreadCursor};
use crate::scripted_io::ScriptedIo;
use crate::suite::TestCase;

/// Bounds and pacing for a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExplorerConfig {
    /// Stop after this many states have been dequeued.
    pub max_states: Option<usize>,

    /// Drop any schedule that reaches this many steps without terminating.
    pub max_steps: Option<usize>,

    /// Report progress every this many dequeued states.
    pub progress_interval: usize,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            max_states: None,
            max_steps: None,
            progress_interval: 100,
        }
    }
}

impl ExplorerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_states(mut self, max_states: usize) -> Self {
        self.max_states = Some(max_states);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Zero is treated as one.
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }
}

/// A cancellation flag shared between the search and whoever may stop it.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Statistics over the terminal runs of one search.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    /// For each step count k from 1 to `max_step_count`, the percentage of
    /// terminal runs of at most k steps whose output matched. Zero when no
    /// run is that short.
    pub success_rate_by_step_count: BTreeMap<usize, f64>,
    pub max_step_count: usize,
    pub total_runs: usize,
    /// Terminal runs in which no thread failed.
    pub completed_runs: usize,
    /// Schedules abandoned at the step cap.
    pub truncated_runs: usize,
    /// The search did not cover every interleaving.
    pub interrupted: bool,
}

impl TestReport {
    /// The cumulative rate over every terminal run.
    pub fn overall_success_rate(&self) -> Option<f64> {
        self.success_rate_by_step_count
            .get(&self.max_step_count)
            .copied()
    }
}

/// Per step count: how many terminal runs, and how many of them matched.
#[derive(Debug, Default)]
struct Tally {
    buckets: BTreeMap<usize, (usize, usize)>,
    total: usize,
    completed: usize,
    truncated: usize,
}

impl Tally {
    fn record(&mut self, steps: usize, matched: bool, clean: bool) {
        let bucket = self.buckets.entry(steps).or_default();
        bucket.0 += 1;
        if matched {
            bucket.1 += 1;
        }
        self.total += 1;
        if clean {
            self.completed += 1;
        }
    }

    fn report(&self, interrupted: bool) -> TestReport {
        let max_step_count = self.buckets.keys().next_back().copied().unwrap_or(0);
        let mut rates = BTreeMap::new();
        let (mut runs, mut matched) = (0usize, 0usize);
        for k in 1..=max_step_count {
            if let Some((r, m)) = self.buckets.get(&k) {
                runs += r;
                matched += m;
            }
            let rate = if runs == 0 {
                0.0
            } else {
                matched as f64 * 100.0 / runs as f64
            };
            rates.insert(k, rate);
        }
        TestReport {
            success_rate_by_step_count: rates,
            max_step_count,
            total_runs: self.total,
            completed_runs: self.completed,
            truncated_runs: self.truncated,
            interrupted,
        }
    }
}

/// The reconstructed state of every thread after some schedule.
#[derive(Debug, Clone)]
pub struct Replay {
    env: Environment,
    cursors: Vec<ThreadCursor>,
    io: ScriptedIo,
}

impl Replay {
    fn fresh(diagram: &Diagram, inputs: &[String]) -> Self {
        Self {
            env: Environment::from_variables(diagram.variables()),
            cursors: diagram.threads().iter().copied().map(ThreadCursor::new).collect(),
            io: ScriptedIo::new(inputs.iter().cloned()),
        }
    }

    /// Step thread `index` once. Indices past the last thread are ignored.
    fn step(&mut self, interpreter: &Interpreter<'_>, index: usize) {
        if let Some(cursor) = self.cursors.get_mut(index) {
            cursor.advance(interpreter, &mut self.env, &mut self.io);
        }
    }

    pub fn output(&self) -> &[String] {
        self.io.output()
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn cursors(&self) -> &[ThreadCursor] {
        &self.cursors
    }

    fn is_clean(&self) -> bool {
        self.cursors.iter().all(|c| c.failure().is_none())
    }
}

struct Pending {
    order: Vec<usize>,
    live: Vec<usize>,
}

/// Explores every interleaving of one diagram's threads.
#[derive(Debug, Clone)]
pub struct Explorer<'d> {
    diagram: &'d Diagram,
    config: ExplorerConfig,
    stop: StopSignal,
}

impl<'d> Explorer<'d> {
    pub fn new(diagram: &'d Diagram) -> Self {
        Self {
            diagram,
            config: ExplorerConfig::default(),
            stop: StopSignal::new(),
        }
    }

    pub fn with_config(mut self, config: ExplorerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    /// Rebuild the state reached by stepping threads in `order`, from scratch.
    pub fn replay(&self, order: &[usize], inputs: &[String]) -> Replay {
        let interpreter = Interpreter::new(self.diagram);
        let mut state = Replay::fresh(self.diagram, inputs);
        for &index in order {
            state.step(&interpreter, index);
        }
        state
    }

    /// Search every interleaving and score it against `expected`.
    pub fn explore(&self, inputs: &[String], expected: &[String]) -> TestReport {
        self.explore_with_progress(inputs, expected, |_| ControlFlow::Continue(()))
    }

    /// Like [`explore`](Explorer::explore), calling `progress` with a partial
    /// report every `progress_interval` dequeued states. Returning
    /// `ControlFlow::Break` ends the search early.
    pub fn explore_with_progress<F>(
        &self,
        inputs: &[String],
        expected: &[String],
        mut progress: F,
    ) -> TestReport
    where
        F: FnMut(&TestReport) -> ControlFlow<()>,
    {
        info!(
            threads = self.diagram.thread_count(),
            inputs = inputs.len(),
            "starting exploration"
        );
        let interpreter = Interpreter::new(self.diagram);
        let interval = self.config.progress_interval.max(1);
        let mut tally = Tally::default();
        let mut interrupted = false;
        let mut dequeued = 0usize;

        let mut queue = VecDeque::new();
        queue.push_back(Pending {
            order: Vec::new(),
            live: (0..self.diagram.thread_count()).collect(),
        });

        while let Some(Pending { order, live }) = queue.pop_front() {
            if self.stop.is_stopped() {
                debug!(dequeued, "stop requested");
                interrupted = true;
                break;
            }
            if self.config.max_states.is_some_and(|max| dequeued >= max) {
                debug!(dequeued, "state limit reached");
                interrupted = true;
                break;
            }
            dequeued += 1;
            trace!(depth = order.len(), live = live.len(), "expanding state");

            let base = self.replay(&order, inputs);
            for &thread in &live {
                let mut child = base.clone();
                child.step(&interpreter, thread);

                let mut child_order = order.clone();
                child_order.push(thread);
                let child_live: Vec<usize> = live
                    .iter()
                    .copied()
                    .filter(|&t| t != thread || !child.cursors[t].is_finished())
                    .collect();

                if child_live.is_empty() {
                    let matched = child.output() == expected;
                    tally.record(child_order.len(), matched, child.is_clean());
                } else if self
                    .config
                    .max_steps
                    .is_some_and(|max| child_order.len() >= max)
                {
                    tally.truncated += 1;
                } else {
                    queue.push_back(Pending {
                        order: child_order,
                        live: child_live,
                    });
                }
            }

            if dequeued % interval == 0 && progress(&tally.report(false)).is_break() {
                debug!(dequeued, "progress callback stopped the search");
                interrupted = true;
                break;
            }
        }

        let interrupted = interrupted || tally.truncated > 0;
        let report = tally.report(interrupted);
        info!(
            total_runs = report.total_runs,
            max_step_count = report.max_step_count,
            truncated_runs = report.truncated_runs,
            interrupted = report.interrupted,
            "exploration finished"
        );
        report
    }

    /// Explore once per case.
    ///
    /// A case's own `max_steps` applies when the explorer has none configured.
    pub fn explore_suite(&self, cases: &[TestCase]) -> Vec<(String, TestReport)> {
        cases
            .iter()
            .map(|case| {
                let mut explorer = self.clone();
                if explorer.config.max_steps.is_none() {
                    explorer.config.max_steps = case.max_steps;
                }
                debug!(case = %case.name, "exploring test case");
                let report = explorer.explore(&case.input, &case.expected_output);
                (case.name.clone(), report)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockId, Variable};
    use crate::env::Scope;
    use crate::value::{DataType, Value};

    fn print(id: BlockId, next: BlockId, text: &str) -> Block {
        Block::Print {
            id,
            next,
            expression: text.into(),
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// Thread 0 prints "a", thread 1 prints "b"; each takes two steps.
    fn two_printers() -> Diagram {
        Diagram::new(
            vec![],
            vec![
                print(1, 2, "\"a\""),
                Block::End { id: 2, next: None },
                print(3, 4, "\"b\""),
                Block::End { id: 4, next: None },
            ],
            vec![1, 3],
        )
        .unwrap()
    }

    #[test]
    fn test_two_printers_half_match() {
        let diagram = two_printers();
        let report = Explorer::new(&diagram).explore(&[], &strings(&["\"a\"", "\"b\""]));

        // C(4, 2) interleavings; "a" comes first in the three that start with
        // thread 0.
        assert_eq!(report.total_runs, 6);
        assert_eq!(report.completed_runs, 6);
        assert_eq!(report.max_step_count, 4);
        assert_eq!(report.success_rate_by_step_count[&1], 0.0);
        assert_eq!(report.success_rate_by_step_count[&4], 50.0);
        assert!(!report.interrupted);
    }

    #[test]
    fn test_failed_thread_ends_its_branch() {
        let diagram = Diagram::new(
            vec![Variable::new("n", DataType::Int)],
            vec![
                Block::Input {
                    id: 1,
                    next: 2,
                    variable: "n".into(),
                },
                print(2, 3, "n"),
                Block::End { id: 3, next: None },
            ],
            vec![1],
        )
        .unwrap();

        let report = Explorer::new(&diagram).explore(&[], &strings(&["0"]));
        assert_eq!(report.total_runs, 1);
        assert_eq!(report.completed_runs, 0);
        assert_eq!(report.max_step_count, 1);
        assert_eq!(report.success_rate_by_step_count[&1], 0.0);
    }

    #[test]
    fn test_input_queue_is_shared_between_threads() {
        let diagram = Diagram::new(
            vec![Variable::new("x", DataType::Int)],
            vec![
                Block::Input {
                    id: 1,
                    next: 2,
                    variable: "x".into(),
                },
                Block::End { id: 2, next: None },
            ],
            vec![1, 1],
        )
        .unwrap();

        let explorer = Explorer::new(&diagram);
        let inputs = strings(&["1", "2"]);
        let state = explorer.replay(&[1, 0], &inputs);
        assert_eq!(state.environment().get("x"), Some(Value::Int(2)));
        assert!(state.cursors().iter().all(|c| !c.is_finished()));
    }

    #[test]
    fn test_max_steps_truncates() {
        let diagram = Diagram::new(
            vec![],
            vec![Block::While {
                id: 1,
                expression: "true".into(),
                body: 1,
                next: 1,
            }],
            vec![1],
        )
        .unwrap();

        let config = ExplorerConfig::new().with_max_steps(5);
        let report = Explorer::new(&diagram).with_config(config).explore(&[], &[]);
        assert_eq!(report.total_runs, 0);
        assert_eq!(report.truncated_runs, 1);
        assert!(report.interrupted);
        assert!(report.success_rate_by_step_count.is_empty());
    }

    #[test]
    fn test_max_states_interrupts() {
        let diagram = two_printers();
        let config = ExplorerConfig::new().with_max_states(1);
        let report = Explorer::new(&diagram).with_config(config).explore(&[], &[]);
        assert!(report.interrupted);
        assert_eq!(report.total_runs, 0);
    }

    #[test]
    fn test_stop_signal_interrupts() {
        let diagram = two_printers();
        let stop = StopSignal::new();
        stop.stop();
        let report = Explorer::new(&diagram).with_stop_signal(stop).explore(&[], &[]);
        assert!(report.interrupted);
        assert_eq!(report.total_runs, 0);
    }

    #[test]
    fn test_progress_callback_can_break() {
        let diagram = two_printers();
        let config = ExplorerConfig::new().with_progress_interval(2);
        let mut calls = 0;
        let report = Explorer::new(&diagram)
            .with_config(config)
            .explore_with_progress(&[], &[], |_| {
                calls += 1;
                ControlFlow::Break(())
            });
        assert_eq!(calls, 1);
        assert!(report.interrupted);
        assert!(report.total_runs < 6);
    }

    #[test]
    fn test_progress_fires_every_interval() {
        // Dequeued states: the root, 2 after one step, 4 after two, 6 after three.
        let diagram = two_printers();
        for (interval, expected_calls) in [(1, 13), (3, 4), (20, 0)] {
            let config = ExplorerConfig::new().with_progress_interval(interval);
            let mut seen = Vec::new();
            let report = Explorer::new(&diagram)
                .with_config(config)
                .explore_with_progress(&[], &[], |partial| {
                    assert!(!partial.interrupted);
                    seen.push(partial.total_runs);
                    ControlFlow::Continue(())
                });

            assert_eq!(seen.len(), expected_calls, "interval {}", interval);
            assert!(seen.windows(2).all(|w| w[0] <= w[1]), "runs went down: {:?}", seen);
            assert!(seen.iter().all(|&runs| runs <= report.total_runs));
            assert_eq!(report.total_runs, 6);
            assert!(!report.interrupted);
        }
    }

    #[test]
    fn test_suite_applies_case_step_limit() {
        let diagram = two_printers();
        let cases = vec![
            TestCase::new("full", Vec::<String>::new(), ["\"a\"", "\"b\""]),
            TestCase::new("short", Vec::<String>::new(), ["\"a\"", "\"b\""]).with_max_steps(2),
        ];
        let reports = Explorer::new(&diagram).explore_suite(&cases);
        assert_eq!(reports[0].0, "full");
        assert_eq!(reports[0].1.total_runs, 6);
        assert_eq!(reports[1].1.total_runs, 0);
        assert!(reports[1].1.interrupted);
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: ExplorerConfig = serde_json::from_str(r#"{"maxSteps": 12}"#).unwrap();
        assert_eq!(config.max_steps, Some(12));
        assert_eq!(config.max_states, None);
        assert_eq!(config.progress_interval, 100);
    }
}
