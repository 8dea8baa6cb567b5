//! Error types.

use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

use crate::datatypes::DataType;

/// The error type returned by the optimizer and its components (memo, rules, cost models).
#[derive(Debug)]
pub enum OptimizerError {
    /// A function has been called with an invalid argument.
    Argument(ArgumentError),
    /// One of internal invariants of the optimizer has been violated.
    Internal(InternalError),
    /// A block of code has not been implemented.
    NotImplemented(String),
    /// The described feature is not supported.
    Unsupported(String),
}

impl OptimizerError {
    /// Creates an [argument error](OptimizerError::Argument).
    pub fn argument<T>(message: T) -> OptimizerError
    where
        T: Into<String>,
    {
        OptimizerError::Argument(ArgumentError::new(message))
    }

    /// Creates an [internal error](OptimizerError::Internal).
    pub fn internal<T>(message: T) -> OptimizerError
    where
        T: Into<String>,
    {
        OptimizerError::Internal(InternalError::new(message, None))
    }

    /// Creates an [unsupported error](OptimizerError::Unsupported).
    pub fn unsupported<T>(message: T) -> OptimizerError
    where
        T: Into<String>,
    {
        OptimizerError::Unsupported(message.into())
    }
}

impl Display for OptimizerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizerError::Argument(err) => write!(f, "Argument error: {}", err),
            OptimizerError::Internal(err) => write!(f, "Internal error: {}", err),
            OptimizerError::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            OptimizerError::Unsupported(msg) => write!(f, "Not supported: {}", msg),
        }
    }
}

impl Error for OptimizerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OptimizerError::Internal(InternalError { cause: Some(error), .. }) => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl From<ArgumentError> for OptimizerError {
    fn from(err: ArgumentError) -> Self {
        OptimizerError::Argument(err)
    }
}

impl From<InternalError> for OptimizerError {
    fn from(err: InternalError) -> Self {
        OptimizerError::Internal(err)
    }
}

/// The error type returned by the execution engine when a query is compiled or executed.
#[derive(Debug)]
pub enum ExecutionError {
    /// A function of the execution engine has been called with an invalid argument.
    Argument(ArgumentError),
    /// An invariant of the execution engine has been violated.
    Internal(InternalError),
    /// A value does not have the type an operator expects.
    Type {
        expected: DataType,
        actual: DataType,
        backtrace: Backtrace,
    },
}

impl ExecutionError {
    /// Creates an [argument error](ExecutionError::Argument).
    pub fn argument<T>(message: T) -> ExecutionError
    where
        T: Into<String>,
    {
        ExecutionError::Argument(ArgumentError::new(message))
    }

    /// Creates an [internal error](ExecutionError::Internal).
    pub fn internal<T>(message: T) -> ExecutionError
    where
        T: Into<String>,
    {
        ExecutionError::Internal(InternalError::new(message, None))
    }

    /// Creates a [type error](ExecutionError::Type).
    pub fn type_mismatch(expected: DataType, actual: DataType) -> ExecutionError {
        ExecutionError::Type {
            expected,
            actual,
            backtrace: Backtrace::new(),
        }
    }
}

impl Display for ExecutionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionError::Argument(err) => write!(f, "Argument error: {}", err),
            ExecutionError::Internal(err) => write!(f, "Internal error: {}", err),
            ExecutionError::Type { expected, actual, .. } => {
                write!(f, "Type error: expected {} but got {}", expected, actual)
            }
        }
    }
}

impl Error for ExecutionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExecutionError::Internal(InternalError { cause: Some(error), .. }) => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl From<OptimizerError> for ExecutionError {
    fn from(err: OptimizerError) -> Self {
        ExecutionError::Internal(InternalError::with_cause("Failed to build a plan", err))
    }
}

/// Argument error. See [OptimizerError::Argument].
#[derive(Debug)]
pub struct ArgumentError {
    message: String,
    backtrace: Backtrace,
}

impl ArgumentError {
    /// Creates a new instance of an [ArgumentError].
    pub fn new<T>(message: T) -> Self
    where
        T: Into<String>,
    {
        ArgumentError {
            message: message.into(),
            backtrace: Backtrace::new(),
        }
    }
}

impl Display for ArgumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.message)
    }
}

/// Internal error. See [OptimizerError::Internal].
#[derive(Debug)]
pub struct InternalError {
    message: String,
    cause: Option<Box<OptimizerError>>,
    backtrace: Backtrace,
}

impl InternalError {
    /// Creates an instance of an [InternalError] with the given message and an optional cause.
    /// This method captures a backtrace.
    pub fn new<T>(message: T, err: Option<OptimizerError>) -> Self
    where
        T: Into<String>,
    {
        InternalError {
            message: message.into(),
            cause: err.map(Box::new),
            backtrace: Backtrace::new(),
        }
    }

    /// Creates an instance of an [InternalError] with the given message and cause.
    pub fn with_cause<T>(message: T, cause: OptimizerError) -> Self
    where
        T: Into<String>,
    {
        InternalError::new(message, Some(cause))
    }
}

impl Display for InternalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(cause) = self.cause.as_ref() {
            write!(f, " caused by: {}", cause)?
        }
        Ok(())
    }
}
