//! Error types for the workflow unroller.

use crate::coord::Coordinate;

/// Main error type for `wcgraph-core`.
///
/// All unrolling operations return `Result<T> = std::result::Result<T, CoreError>`.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// The configuration model rejected a declaration before unrolling began.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(#[from] crate::config::ConfigError),

    /// The configuration file could not be read from disk. Kept distinct
    /// from `ConfigInvalid` so callers (the CLI's exit-code mapping) can
    /// tell a missing/unreadable file apart from a rejected configuration.
    #[error("could not read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// A date or duration string could not be parsed.
    #[error(transparent)]
    Temporal(#[from] crate::temporal::TemporalError),

    /// Two items were inserted at the same coordinate in the same Array.
    #[error("array \"{array}\": coordinate {coord:?} already used, cannot set item twice")]
    DuplicateKey { array: String, coord: Coordinate },

    /// A coordinate's dimension set did not match the Array's frozen dimensions.
    #[error("array \"{array}\": coordinate dimensions {got:?} don't match array dimensions {expected:?}")]
    SchemaMismatch {
        array: String,
        expected: Vec<String>,
        got: Vec<String>,
    },

    /// A name or coordinate was not present in a Store/Array.
    #[error("{what} not found: \"{name}\"")]
    NotFound { what: &'static str, name: String },

    /// A dimensioned Array was looked up without a coordinate.
    #[error("array \"{0}\" is dimensioned, a coordinate is required")]
    CoordinateRequired(String),

    /// A zero-dimension (scalar) Array was looked up with a coordinate.
    #[error("array \"{0}\" is scalar, coordinates are not allowed")]
    UnexpectedCoordinate(String),

    /// A reference spec used `lag`/`date` against a target with no `date` dimension.
    #[error("array \"{0}\" has no date dimension, cannot be referenced by date or lag")]
    DateDimMissing(String),

    /// A dimensioned-by-date target was referenced without a date.
    #[error("array \"{0}\" has a date dimension, must be referenced by a date")]
    DateReferenceRequired(String),

    /// A `when` guard referenced `reference.date` but the reference coordinate has none.
    #[error("a `when` guard requires the referencing coordinate to carry a date")]
    GuardNeedsDate,

    /// A lag/absolute date resolved outside the target Array's recorded `date` axis.
    #[error("date {date} is out of range for array \"{array}\"")]
    OutOfRange { array: String, date: String },

    /// Pass 3 could not find the Pass-2 data node an output declares.
    #[error("task \"{task}\" output \"{output}\" was not created in pass 2 at coordinate {coord:?}")]
    UnresolvedOutput {
        task: String,
        output: String,
        coord: Coordinate,
    },

    /// `config.plugin` named a plugin kind with no registered constructor.
    #[error("unknown plugin kind: \"{0}\"")]
    UnknownPlugin(String),

    /// A plugin kind was registered twice.
    #[error("plugin \"{0}\" is already registered")]
    PluginAlreadyRegistered(String),

    /// A reference spec set both `lag` and `date`.
    #[error("reference \"{0}\" sets both `lag` and `date`; only one is allowed")]
    RefMutexViolation(String),

    /// A reference spec carried `lag`/`date`/`parameters` against a scalar target.
    #[error("target \"{0}\" is a scalar (available, unparameterized) item and cannot carry lag/date/parameters")]
    ScalarMisreferenced(String),
}

/// Type alias for `Result` with [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
