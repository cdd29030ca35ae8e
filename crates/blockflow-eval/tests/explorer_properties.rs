//! Properties of the interleaving explorer over whole diagrams.

use blockflow_eval::{Diagram, Explorer, ExplorerConfig, Scope, Value};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// A single thread that reads `n`, counts `i` up to it and prints the result.
fn counter() -> Diagram {
    Diagram::from_json(
        r#"{
            "variables": [{ "name": "i", "type": "int" }, { "name": "n", "type": "int" }],
            "blocks": [
                { "type": "input", "id": 1, "next": 2, "variable": "n" },
                { "type": "while", "id": 2, "expression": "i < n", "body": 3, "next": 5 },
                { "type": "assign", "id": 3, "next": 4, "expression": "i = i + 1" },
                { "type": "end", "id": 4, "next": 2 },
                { "type": "print", "id": 5, "next": 6, "expression": "\"i = \" i" },
                { "type": "end", "id": 6 }
            ],
            "threads": [1]
        }"#,
    )
    .unwrap()
}

/// Two straight-line threads: `m` assignments then an end, and `n`
/// assignments then an end.
fn straight_lines(m: u32, n: u32) -> Diagram {
    let mut blocks = Vec::new();
    let mut chain = |first: u32, len: u32, var: &str| {
        for k in 0..len {
            blocks.push(format!(
                r#"{{ "type": "assign", "id": {}, "next": {}, "expression": "{} = {} + 1" }}"#,
                first + k,
                first + k + 1,
                var,
                var
            ));
        }
        blocks.push(format!(r#"{{ "type": "end", "id": {} }}"#, first + len));
    };
    chain(100, m, "a");
    chain(200, n, "b");

    Diagram::from_json(&format!(
        r#"{{
            "variables": [{{ "name": "a", "type": "int" }}, {{ "name": "b", "type": "int" }}],
            "blocks": [{}],
            "threads": [100, 200]
        }}"#,
        blocks.join(",")
    ))
    .unwrap()
}

fn binomial(n: usize, k: usize) -> usize {
    (1..=k).fold(1, |acc, i| acc * (n + 1 - i) / i)
}

#[test]
fn test_single_thread_has_one_terminal_run() {
    let diagram = counter();
    let report = Explorer::new(&diagram).explore(&strings(&["2"]), &strings(&["\"i = \" 2"]));

    // input, then two passes of while/assign/end, the failing test, print, end.
    let visited = 1 + 2 * 3 + 1 + 2;
    assert_eq!(report.total_runs, 1);
    assert_eq!(report.completed_runs, 1);
    assert_eq!(report.max_step_count, visited);
    assert_eq!(report.success_rate_by_step_count[&visited], 100.0);
    assert_eq!(report.success_rate_by_step_count[&(visited - 1)], 0.0);
}

#[test]
fn test_two_threads_enumerate_every_interleaving() {
    for (m, n) in [(1, 1), (2, 3), (4, 2)] {
        let diagram = straight_lines(m, n);
        let report = Explorer::new(&diagram).explore(&[], &[]);

        // Each thread takes its assignments plus the closing end.
        let (steps_a, steps_b) = (m as usize + 1, n as usize + 1);
        assert_eq!(
            report.total_runs,
            binomial(steps_a + steps_b, steps_a),
            "m = {}, n = {}",
            m,
            n
        );
        assert_eq!(report.max_step_count, steps_a + steps_b);
        assert_eq!(report.success_rate_by_step_count[&(steps_a + steps_b)], 100.0);
    }
}

#[test]
fn test_rate_domain_covers_every_step_count() {
    let diagram = Diagram::from_json(
        r#"{
            "variables": [{ "name": "x", "type": "int" }],
            "blocks": [
                { "type": "assign", "id": 1, "next": 2, "expression": "x = x + 1" },
                { "type": "print", "id": 2, "next": 3, "expression": "x" },
                { "type": "end", "id": 3 },
                { "type": "condition", "id": 10, "expression": "x > 0", "trueBranch": 11, "falseBranch": 12 },
                { "type": "assign", "id": 11, "next": 12, "expression": "x = x * 10" },
                { "type": "end", "id": 12 }
            ],
            "threads": [1, 10]
        }"#,
    )
    .unwrap();

    let report = Explorer::new(&diagram).explore(&[], &strings(&["10"]));

    assert!(report.total_runs > 0);
    let keys: Vec<usize> = report.success_rate_by_step_count.keys().copied().collect();
    assert_eq!(keys, (1..=report.max_step_count).collect::<Vec<_>>());
    for rate in report.success_rate_by_step_count.values() {
        assert!((0.0..=100.0).contains(rate), "rate {} out of range", rate);
    }
    // Some schedules print 1, some 10; the race is visible.
    let overall = report.overall_success_rate().unwrap();
    assert!(overall > 0.0 && overall < 100.0);
}

#[test]
fn test_replay_is_idempotent() {
    let diagram = straight_lines(2, 2);
    let explorer = Explorer::new(&diagram);
    let order = [0, 1, 1, 0, 1, 0];

    let first = explorer.replay(&order, &[]);
    let second = explorer.replay(&order, &[]);
    assert_eq!(first.output(), second.output());
    assert_eq!(first.environment(), second.environment());
    assert_eq!(first.environment().get("a"), Some(Value::Int(2)));
    assert!(first.cursors().iter().all(|c| c.is_finished()));
}

#[test]
fn test_state_cap_marks_report_interrupted() {
    let diagram = straight_lines(3, 3);
    let config = ExplorerConfig::new().with_max_states(10);
    let report = Explorer::new(&diagram).with_config(config).explore(&[], &[]);

    assert!(report.interrupted);
    assert!(report.total_runs < binomial(8, 4));
}
