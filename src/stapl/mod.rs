//! A STAPL (JESD71, "Standard Test and Programming Language") front end
//! and interpreter: lexing and parsing a `.stp`/`.stapl` file into a
//! [`Program`], and executing it against anything implementing [`Host`].
//!
//! Grounded on the `ebyst` project's `stapl` package, which drives the
//! same language over a Python TAP controller.

pub mod aca;
pub mod crc;
mod expr;
mod host;
mod interpreter;
mod lexer;
mod parser;
mod program;
mod value;

pub use host::Host;
pub use interpreter::{Interpreter, Outcome};
pub use parser::parse;
pub use program::{Instruction, Program};
pub use value::{Scope, Value};

/// An error raised while lexing, parsing, or executing a STAPL program.
#[derive(Debug, thiserror::Error)]
pub enum StaplError {
    /// A syntax error while parsing source text.
    #[error("STAPL syntax error: {0}")]
    Parse(String),
    /// A type or runtime-value error (wrong kind coerced, divide by
    /// zero, array index out of range, ...).
    #[error("STAPL value error: {0}")]
    Value(String),
    /// A variable was referenced before it was declared/assigned.
    #[error("variable {0} is not defined")]
    VariableNotDefined(String),
    /// A `GOTO` targeted a label that does not exist in the program.
    #[error("label {0} is not defined")]
    LabelNotDefined(String),
    /// A `CALL` targeted a procedure that does not exist in the program.
    #[error("procedure {0} is not defined")]
    ProcedureNotDefined(String),
    /// A host TAP operation (scan chain validation, state transition)
    /// failed while executing an `IRSCAN`/`DRSCAN`/`STATE`/`WAIT`
    /// instruction.
    #[error(transparent)]
    Chain(#[from] crate::tap::ScanChainError),
    /// A host device operation failed.
    #[error(transparent)]
    Device(#[from] crate::device::UnsupportedOperationError),
}

impl StaplError {
    /// Build a [`Self::Parse`].
    pub fn parse(msg: impl Into<String>) -> Self {
        StaplError::Parse(msg.into())
    }
    /// Build a [`Self::Value`].
    pub fn value(msg: impl Into<String>) -> Self {
        StaplError::Value(msg.into())
    }
    /// Build a [`Self::VariableNotDefined`].
    pub fn variable_not_defined(name: impl Into<String>) -> Self {
        StaplError::VariableNotDefined(name.into())
    }
    /// Build a [`Self::LabelNotDefined`].
    pub fn label_not_defined(name: impl Into<String>) -> Self {
        StaplError::LabelNotDefined(name.into())
    }
    /// Build a [`Self::ProcedureNotDefined`].
    pub fn procedure_not_defined(name: impl Into<String>) -> Self {
        StaplError::ProcedureNotDefined(name.into())
    }
}
