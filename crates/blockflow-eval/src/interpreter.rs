//! The single-step block interpreter.

use crate::block::{Block, BlockId, Diagram};
use crate::env::Scope;
use crate::error::Error;
use crate::expr::{evaluate, evaluate_condition};
use crate::io::Console;
use crate::value::Value;

/// The control state of one thread.
///
/// Threads start `Running` at their entry block and end either `Finished`
/// (a block handed back no successor) or `Failed` (a step raised an error).
#[derive(Debug, Clone, PartialEq)]
pub enum ControlState {
    /// The block that will execute on the next step.
    Running(BlockId),

    /// The thread ran off the end of its graph.
    Finished,

    /// The thread stopped on an error.
    Failed(Error),
}

impl ControlState {
    /// Check if the thread can no longer step (Finished or Failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, ControlState::Finished | ControlState::Failed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ControlState::Failed(_))
    }
}

/// Executes blocks of one diagram.
///
/// The interpreter holds no run state of its own: the environment and the
/// console are passed to every call, so one interpreter can drive any
/// number of threads and replays.
#[derive(Debug, Clone, Copy)]
pub struct Interpreter<'d> {
    diagram: &'d Diagram,
}

impl<'d> Interpreter<'d> {
    pub fn new(diagram: &'d Diagram) -> Self {
        Self { diagram }
    }

    pub fn diagram(&self) -> &'d Diagram {
        self.diagram
    }

    /// Execute exactly one block and return its successor, or `None` when
    /// the thread is done. Errors carry the id of the block that raised them.
    pub fn step(
        &self,
        id: BlockId,
        scope: &mut dyn Scope,
        console: &mut dyn Console,
    ) -> crate::Result<Option<BlockId>> {
        let block = self.diagram.block(id)?;
        tracing::trace!(block = id, kind = block.kind(), "step");
        execute(block, scope, console).map_err(|e| e.at_block(id))
    }
}

fn execute(
    block: &Block,
    scope: &mut dyn Scope,
    console: &mut dyn Console,
) -> crate::Result<Option<BlockId>> {
    match block {
        Block::Assign {
            next, expression, ..
        } => {
            let (target, rhs) = expression.split_once('=').ok_or_else(|| {
                Error::Syntax(format!("assignment '{}' has no '='", expression))
            })?;
            let target = target.trim();
            if target.is_empty() {
                return Err(Error::Syntax(format!(
                    "assignment '{}' has no target",
                    expression
                )));
            }
            if !scope.contains(target) {
                return Err(Error::UndeclaredVariable(target.to_string()));
            }
            let value = evaluate(rhs, &*scope)?;
            scope.set(target, value)?;
            Ok(Some(*next))
        }
        Block::Print {
            next, expression, ..
        } => {
            let line = render_template(expression, &*scope);
            console.write_line(&line)?;
            Ok(Some(*next))
        }
        Block::Input { next, variable, .. } => {
            if !scope.contains(variable) {
                return Err(Error::UndeclaredVariable(variable.clone()));
            }
            let reply = console.read_line(&format!("{}:", variable))?;
            scope.set(variable, Value::from_input(&reply))?;
            Ok(Some(*next))
        }
        Block::Condition {
            expression,
            true_next,
            false_next,
            ..
        } => {
            if evaluate_condition(expression, &*scope)? {
                Ok(Some(*true_next))
            } else {
                Ok(Some(*false_next))
            }
        }
        Block::While {
            expression,
            body,
            next,
            ..
        } => {
            if evaluate_condition(expression, &*scope)? {
                Ok(Some(*body))
            } else {
                Ok(Some(*next))
            }
        }
        Block::End { next, .. } => Ok(*next),
    }
}

/// Substitute variables into a print template.
///
/// Quoted regions pass through verbatim, quotes included. Outside them, each
/// maximal run of identifier characters naming a variable is replaced by the
/// variable's literal form; other runs are left as written.
pub fn render_template(template: &str, scope: &dyn Scope) -> String {
    let mut out = String::with_capacity(template.len());
    let mut word = String::new();
    let mut in_quotes = false;

    let flush = |word: &mut String, out: &mut String| {
        if word.is_empty() {
            return;
        }
        match scope.get(word) {
            Some(value) => out.push_str(&value.literal()),
            None => out.push_str(word),
        }
        word.clear();
    };

    for c in template.chars() {
        if c == '"' {
            flush(&mut word, &mut out);
            in_quotes = !in_quotes;
            out.push(c);
        } else if in_quotes {
            out.push(c);
        } else if c.is_alphanumeric() || c == '_' {
            word.push(c);
        } else {
            flush(&mut word, &mut out);
            out.push(c);
        }
    }
    flush(&mut word, &mut out);
    out
}

/// One thread's position in the diagram plus the steps it has taken.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadCursor {
    state: ControlState,
    steps: usize,
}

impl ThreadCursor {
    /// A cursor about to execute `entry`.
    pub fn new(entry: BlockId) -> Self {
        Self {
            state: ControlState::Running(entry),
            steps: 0,
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    /// The block the next step will execute, if the thread is still running.
    pub fn current(&self) -> Option<BlockId> {
        match self.state {
            ControlState::Running(id) => Some(id),
            _ => None,
        }
    }

    /// Steps attempted, including the one that failed, if any.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// The error that stopped the thread.
    pub fn failure(&self) -> Option<&Error> {
        match &self.state {
            ControlState::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Step once. A terminal cursor stays as it is and counts nothing.
    pub fn advance(
        &mut self,
        interpreter: &Interpreter<'_>,
        scope: &mut dyn Scope,
        console: &mut dyn Console,
    ) -> &ControlState {
        let ControlState::Running(id) = self.state else {
            return &self.state;
        };
        self.steps += 1;
        self.state = match interpreter.step(id, scope, console) {
            Ok(Some(next)) => ControlState::Running(next),
            Ok(None) => ControlState::Finished,
            Err(err) => ControlState::Failed(err),
        };
        &self.state
    }
}
