//! Flowchart interpreter and interleaving explorer.
//!
//! A [`Diagram`] is a graph of typed blocks plus the entry block of each of
//! its threads. The [`Interpreter`] executes one block at a time against a
//! variable [`Scope`] and a [`Console`]. On top of that:
//!
//! - [`Runtime`] runs every thread live, in parallel, over one shared
//!   environment and an [`IoChannel`].
//! - [`Explorer`] replays every possible interleaving of the threads against
//!   a scripted input queue and reports how often the output matches an
//!   expected trace.

mod block;
mod env;
mod error;
mod explorer;
mod expr;
mod interpreter;
mod io;
mod runtime;
mod scripted_io;
mod suite;
mod value;

pub use block::{Block, BlockId, Diagram, Variable};
pub use env::{Environment, Scope, SharedEnvironment};
pub use error::Error;
pub use explorer::{Explorer, ExplorerConfig, Replay, StopSignal, TestReport};
pub use expr::{evaluate, evaluate_condition};
pub use interpreter::{render_template, ControlState, Interpreter, ThreadCursor};
pub use io::{ChannelIo, Console, IoChannel, IoEvent, SessionConsole, StdIo};
pub use runtime::{RunSummary, Runtime, ThreadSummary};
pub use scripted_io::ScriptedIo;
pub use suite::{parse_cases, TestCase};
pub use value::{DataType, Value};

/// Result type for interpreter operations.
pub type Result<T> = std::result::Result<T, Error>;
