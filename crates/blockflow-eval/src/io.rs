//! I/O collaborators for live execution.
//!
//! The interpreter only sees a [`Console`]: one thread's view of where its
//! output goes and where its input comes from. Live runs hand each thread a
//! [`SessionConsole`] over a shared [`IoChannel`]; the explorer hands every
//! replay a fresh [`ScriptedIo`](crate::ScriptedIo) instead.

use std::io::{BufRead, Write};
use std::sync::{Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};

use crate::error::Error;

/// What a single interpreter thread can do with the outside world.
pub trait Console {
    /// Emit one line of program output.
    fn write_line(&mut self, text: &str) -> Result<(), Error>;

    /// Block until one line of input is available.
    fn read_line(&mut self, prompt: &str) -> Result<String, Error>;
}

/// A live I/O collaborator shared by every thread of a run.
///
/// `request_input` blocks the calling thread. Implementations must fail it
/// with [`Error::SessionClosed`] rather than hang when the session ends.
pub trait IoChannel: Send + Sync {
    fn send_output(&self, session: &str, text: &str) -> Result<(), Error>;

    fn request_input(&self, session: &str, prompt: &str) -> Result<String, Error>;
}

/// Binds a thread to one session of an [`IoChannel`].
pub struct SessionConsole<'a> {
    channel: &'a dyn IoChannel,
    session: String,
}

impl<'a> SessionConsole<'a> {
    pub fn new(channel: &'a dyn IoChannel, session: impl Into<String>) -> Self {
        Self {
            channel,
            session: session.into(),
        }
    }
}

impl Console for SessionConsole<'_> {
    fn write_line(&mut self, text: &str) -> Result<(), Error> {
        self.channel.send_output(&self.session, text)
    }

    fn read_line(&mut self, prompt: &str) -> Result<String, Error> {
        self.channel.request_input(&self.session, prompt)
    }
}

/// Something a live run wants from whoever is driving the session.
#[derive(Debug)]
pub enum IoEvent {
    /// A line the program printed.
    Output { session: String, text: String },
    /// The program is blocked until `reply` receives a line.
    InputRequest {
        session: String,
        prompt: String,
        reply: oneshot::Sender<String>,
    },
}

/// An [`IoChannel`] that forwards everything to an event receiver.
///
/// Dropping the receiver closes the session: later output fails, and so does
/// any thread waiting for input. Dropping an individual `reply` sender fails
/// just that wait.
#[derive(Debug, Clone)]
pub struct ChannelIo {
    events: mpsc::UnboundedSender<IoEvent>,
}

impl ChannelIo {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<IoEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }
}

impl IoChannel for ChannelIo {
    fn send_output(&self, session: &str, text: &str) -> Result<(), Error> {
        self.events
            .send(IoEvent::Output {
                session: session.to_string(),
                text: text.to_string(),
            })
            .map_err(|_| Error::SessionClosed(session.to_string()))
    }

    fn request_input(&self, session: &str, prompt: &str) -> Result<String, Error> {
        let (reply, answer) = oneshot::channel();
        self.events
            .send(IoEvent::InputRequest {
                session: session.to_string(),
                prompt: prompt.to_string(),
                reply,
            })
            .map_err(|_| Error::SessionClosed(session.to_string()))?;
        answer
            .blocking_recv()
            .map_err(|_| Error::SessionClosed(session.to_string()))
    }
}

/// Process stdin/stdout. Input requests are serialized so prompts from
/// different threads do not interleave with each other's replies.
#[derive(Debug, Default)]
pub struct StdIo {
    input: Mutex<()>,
}

impl StdIo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IoChannel for StdIo {
    fn send_output(&self, _session: &str, text: &str) -> Result<(), Error> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", text)?;
        out.flush()?;
        Ok(())
    }

    fn request_input(&self, session: &str, prompt: &str) -> Result<String, Error> {
        let _turn = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut out = std::io::stdout().lock();
            write!(out, "{} ", prompt)?;
            out.flush()?;
        }

        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(Error::SessionClosed(session.to_string()));
        }
        Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
    }
}
