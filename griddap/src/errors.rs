use std::io;
use std::result;

use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    IO(#[from] io::Error),

    /// A remote read or open failed in a way that may succeed if tried again.
    #[error("transport error at {location}: {message}")]
    Transport { location: String, message: String },

    /// A remote server answered with something that could not be understood.
    #[error("protocol error at {location}: {message}")]
    Protocol { location: String, message: String },

    #[error("unrecognized source reference: {0}")]
    UnrecognizedSource(String),

    #[error("no such variable: {0}")]
    BadName(String),

    #[error("no such dimension: {0}")]
    BadDimension(String),

    #[error("cannot work out coordinates of {variable}: {reason}")]
    UnresolvedCoordinates { variable: String, reason: String },

    #[error("invalid time units: {0:?}")]
    BadTimeUnits(String),

    #[error("cannot parse {value:?} with format {format:?}")]
    BadTimestamp { value: String, format: String },

    #[error("time value {0} is out of range")]
    TimeOutOfRange(f64),

    #[error("{0} is not on the aggregated time axis")]
    MissingTimestamp(NaiveDateTime),

    #[error("out of bounds read of {name}: {ranges:?} for shape {shape:?}")]
    OutOfBounds {
        name: String,
        ranges: Vec<std::ops::Range<usize>>,
        shape: Vec<usize>,
    },

    #[error("shape mismatch for {name}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("gave up on {what} after {attempts} attempts: {last}")]
    RetryExhausted {
        what: String,
        attempts: u32,
        #[source]
        last: Box<Error>,
    },

    #[error("cannot place {first} on the stored time axis of {variable} (which starts at {stored})")]
    AmbiguousAppend {
        variable: String,
        first: NaiveDateTime,
        stored: NaiveDateTime,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0} already exists")]
    Exists(String),

    /// The output store failed to define, read or write something.
    #[error("output store error: {0}")]
    Store(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether an operation failing with this error is worth trying again.
    ///
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    pub fn transport<L, M>(location: L, message: M) -> Self
    where
        L: Into<String>,
        M: ToString,
    {
        Self::Transport {
            location: location.into(),
            message: message.to_string(),
        }
    }

    pub fn protocol<L, M>(location: L, message: M) -> Self
    where
        L: Into<String>,
        M: ToString,
    {
        Self::Protocol {
            location: location.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
