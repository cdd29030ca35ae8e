//! Deterministic I/O for the interleaving explorer.

use crate::error::Error;
use crate::io::Console;

/// Records output lines and serves input from a fixed queue.
///
/// Every replay starts from a fresh copy, so the same schedule always reads
/// the same inputs in the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptedIo {
    inputs: Vec<String>,
    next: usize,
    output: Vec<String>,
}

impl ScriptedIo {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            next: 0,
            output: Vec::new(),
        }
    }

    pub fn record_output(&mut self, line: &str) {
        self.output.push(line.to_string());
    }

    /// Take the next queued input.
    pub fn next_input(&mut self) -> Result<String, Error> {
        let line = self.inputs.get(self.next).cloned().ok_or(Error::InputExhausted)?;
        self.next += 1;
        Ok(line)
    }

    /// Lines written so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn into_output(self) -> Vec<String> {
        self.output
    }

    /// Inputs not consumed yet.
    pub fn remaining_inputs(&self) -> usize {
        self.inputs.len() - self.next
    }
}

impl Console for ScriptedIo {
    fn write_line(&mut self, text: &str) -> Result<(), Error> {
        self.record_output(text);
        Ok(())
    }

    fn read_line(&mut self, _prompt: &str) -> Result<String, Error> {
        self.next_input()
    }
}
