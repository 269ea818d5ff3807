//! Error types for the scripting crate

use skript_core::SkriptError;
use std::fmt;

/// Script-specific error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    /// A pattern did not match, or a structure rejected its input
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// An entry violates the schema of the structure it is in
    #[error("Invalid entry at line {line}: {message}")]
    Config { line: usize, message: String },

    /// A declaration this structure depends on is missing
    #[error("Bind error at line {line}: {message}")]
    Bind { line: usize, message: String },

    /// Unexpected invariant violation
    #[error("Fatal error: {0}")]
    Fatal(String),

    /// The host rejected a registration
    #[error("Host error: {0}")]
    Host(String),

    /// Runtime error while executing a trigger or function
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Stack overflow
    #[error("Stack overflow")]
    StackOverflow,
}

/// Error category, as reported in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    Config,
    Bind,
    Fatal,
    Host,
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Config => "config",
            ErrorKind::Bind => "bind",
            ErrorKind::Fatal => "fatal",
            ErrorKind::Host => "host",
            ErrorKind::Runtime => "runtime",
        };
        f.write_str(name)
    }
}

impl ScriptError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Parse { line, message: message.into() }
    }

    pub fn config(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Config { line, message: message.into() }
    }

    pub fn bind(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Bind { line, message: message.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ScriptError::Parse { .. } => ErrorKind::Parse,
            ScriptError::Config { .. } => ErrorKind::Config,
            ScriptError::Bind { .. } => ErrorKind::Bind,
            ScriptError::Fatal(_) => ErrorKind::Fatal,
            ScriptError::Host(_) => ErrorKind::Host,
            ScriptError::Runtime(_) | ScriptError::StackOverflow => ErrorKind::Runtime,
        }
    }

    /// Source line, when the error carries one
    pub fn line(&self) -> Option<usize> {
        match self {
            ScriptError::Parse { line, .. }
            | ScriptError::Config { line, .. }
            | ScriptError::Bind { line, .. } if *line > 0 => Some(*line),
            _ => None,
        }
    }

    /// Message without the kind/line prefix
    pub fn message(&self) -> String {
        match self {
            ScriptError::Parse { message, .. }
            | ScriptError::Config { message, .. }
            | ScriptError::Bind { message, .. } => message.clone(),
            ScriptError::Fatal(message) | ScriptError::Host(message) | ScriptError::Runtime(message) => {
                message.clone()
            }
            ScriptError::StackOverflow => "stack overflow".into(),
        }
    }

    /// Fill in the line for errors raised without one
    pub fn at_line(self, at: usize) -> Self {
        match self {
            ScriptError::Parse { line: 0, message } => ScriptError::Parse { line: at, message },
            ScriptError::Config { line: 0, message } => ScriptError::Config { line: at, message },
            ScriptError::Bind { line: 0, message } => ScriptError::Bind { line: at, message },
            other => other,
        }
    }
}

impl From<ScriptError> for SkriptError {
    fn from(err: ScriptError) -> Self {
        SkriptError::Script(err.to_string())
    }
}

/// Result type for scripting operations
pub type Result<T> = std::result::Result<T, ScriptError>;
