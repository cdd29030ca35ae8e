//! Live execution of every thread of a diagram.
//!
//! Each diagram thread gets its own OS thread. All of them step against one
//! [`SharedEnvironment`] and talk to the same [`IoChannel`] session. The call
//! returns once every thread has finished or failed.

use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use crate::block::{BlockId, Diagram};
use crate::env::{Environment, SharedEnvironment};
use crate::error::Error;
use crate::interpreter::{Interpreter, ThreadCursor};
use crate::io::{IoChannel, SessionConsole};

/// How one live thread ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadSummary {
    /// Position of the thread in [`Diagram::threads`].
    pub index: usize,
    pub entry: BlockId,
    pub steps: usize,
    /// The error that stopped the thread, `None` if it ran to completion.
    pub error: Option<Error>,
}

/// The outcome of [`Runtime::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub threads: Vec<ThreadSummary>,
    /// The shared environment after the last thread stopped.
    pub variables: Environment,
}

impl RunSummary {
    pub fn failures(&self) -> impl Iterator<Item = &ThreadSummary> {
        self.threads.iter().filter(|t| t.error.is_some())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Runs diagrams live against an I/O collaborator.
#[derive(Clone)]
pub struct Runtime {
    io: Arc<dyn IoChannel>,
}

impl Runtime {
    pub fn new(io: Arc<dyn IoChannel>) -> Self {
        Self { io }
    }

    /// Run every thread of `diagram` in parallel and wait for all of them.
    ///
    /// A failing thread is logged and recorded in the summary; its siblings
    /// keep running.
    pub fn run(&self, diagram: &Diagram, session: &str) -> RunSummary {
        info!(
            session,
            threads = diagram.thread_count(),
            "starting live run"
        );
        let env = SharedEnvironment::new(Environment::from_variables(diagram.variables()));
        let interpreter = Interpreter::new(diagram);

        let threads = thread::scope(|scope| {
            let handles: Vec<_> = diagram
                .threads()
                .iter()
                .enumerate()
                .map(|(index, &entry)| {
                    let mut env = env.clone();
                    let mut console = SessionConsole::new(self.io.as_ref(), session);
                    scope.spawn(move || {
                        let mut cursor = ThreadCursor::new(entry);
                        while let Some(block) = cursor.current() {
                            debug!(thread = index, block, "step");
                            cursor.advance(&interpreter, &mut env, &mut console);
                        }
                        ThreadSummary {
                            index,
                            entry,
                            steps: cursor.steps(),
                            error: cursor.failure().cloned(),
                        }
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(summary) => summary,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect::<Vec<_>>()
        });

        for thread in &threads {
            if let Some(err) = &thread.error {
                warn!(session, thread = thread.index, error = %err, "thread failed");
            }
        }
        info!(session, "all threads have completed execution");

        RunSummary {
            threads,
            variables: env.snapshot(),
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, Variable};
    use crate::env::Scope;
    use crate::io::{ChannelIo, IoEvent};
    use crate::value::{DataType, Value};

    fn collect_output(events: &mut tokio::sync::mpsc::UnboundedReceiver<IoEvent>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let IoEvent::Output { text, .. } = event {
                lines.push(text);
            }
        }
        lines
    }

    #[test]
    fn test_two_threads_share_environment() {
        let diagram = Diagram::new(
            vec![
                Variable::new("a", DataType::Int),
                Variable::new("b", DataType::Int),
            ],
            vec![
                Block::Assign {
                    id: 1,
                    next: 2,
                    expression: "a = 1".into(),
                },
                Block::End { id: 2, next: None },
                Block::Assign {
                    id: 3,
                    next: 4,
                    expression: "b = 2".into(),
                },
                Block::End { id: 4, next: None },
            ],
            vec![1, 3],
        )
        .unwrap();

        let (io, _events) = ChannelIo::new();
        let summary = Runtime::new(Arc::new(io)).run(&diagram, "s");

        assert!(summary.is_success());
        assert_eq!(summary.threads.len(), 2);
        assert_eq!(summary.variables.get("a"), Some(Value::Int(1)));
        assert_eq!(summary.variables.get("b"), Some(Value::Int(2)));
    }

    #[test]
    fn test_failing_thread_does_not_stop_siblings() {
        let diagram = Diagram::new(
            vec![Variable::new("x", DataType::Int)],
            vec![
                Block::Assign {
                    id: 1,
                    next: 2,
                    expression: "ghost = 1".into(),
                },
                Block::End { id: 2, next: None },
                Block::Print {
                    id: 3,
                    next: 4,
                    expression: "\"still here\"".into(),
                },
                Block::End { id: 4, next: None },
            ],
            vec![1, 3],
        )
        .unwrap();

        let (io, mut events) = ChannelIo::new();
        let summary = Runtime::new(Arc::new(io)).run(&diagram, "s");

        let failed: Vec<_> = summary.failures().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].index, 0);
        assert_eq!(failed[0].error.as_ref().unwrap().block(), Some(1));
        assert_eq!(summary.threads[1].steps, 2);
        assert_eq!(collect_output(&mut events), vec!["\"still here\""]);
    }
}
