//! Error types for the flowchart interpreter.

use thiserror::Error;

use crate::block::BlockId;
use crate::value::DataType;

/// Errors that can occur while loading, evaluating or stepping a diagram.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A value could not be converted to the requested type.
    #[error("cannot convert {from} value '{value}' to {to}")]
    TypeCoercion {
        value: String,
        from: DataType,
        to: DataType,
    },

    /// An operator was applied to operand types it does not support.
    #[error("operator '{op}' is not defined for {left} and {right}")]
    TypeMismatch {
        op: String,
        left: DataType,
        right: DataType,
    },

    /// A malformed expression or condition.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A token the evaluator does not recognise.
    #[error("unknown token '{0}'")]
    UnknownToken(String),

    /// Integer division by zero or integer overflow.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// An assignment or input targets a variable the diagram never declared.
    #[error("variable '{0}' is not declared")]
    UndeclaredVariable(String),

    /// A successor link points at a block the diagram does not contain.
    #[error("block {0} does not exist")]
    UnknownBlockId(BlockId),

    /// The diagram failed structural validation at load time.
    #[error("invalid diagram: {0}")]
    InvalidDiagram(String),

    /// The scripted input queue ran dry.
    #[error("no more input available")]
    InputExhausted,

    /// The live I/O session went away while a thread was using it.
    #[error("session '{0}' closed")]
    SessionClosed(String),

    /// A stdio read or write failed.
    #[error("i/o error: {0}")]
    Io(String),

    /// A diagram or test-case document could not be decoded.
    #[error("malformed document: {0}")]
    Json(String),

    /// An error raised while stepping a specific block.
    #[error("block {block}: {source}")]
    AtBlock {
        block: BlockId,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attach the id of the block being stepped.
    ///
    /// Errors that already name a block are left alone so the innermost
    /// location wins.
    pub fn at_block(self, block: BlockId) -> Self {
        match self {
            Error::AtBlock { .. } => self,
            other => Error::AtBlock {
                block,
                source: Box::new(other),
            },
        }
    }

    /// The underlying cause, with any block location stripped.
    pub fn cause(&self) -> &Error {
        match self {
            Error::AtBlock { source, .. } => source.cause(),
            other => other,
        }
    }

    /// The block the error was raised in, if known.
    pub fn block(&self) -> Option<BlockId> {
        match self {
            Error::AtBlock { block, .. } => Some(*block),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
