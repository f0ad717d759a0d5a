// Error taxonomy for a parallelization sweep.
// Every variant is fatal to the run; the controller restores the source
// file before any of these propagate out of a sweep.

use std::io;
use std::path::PathBuf;

use crate::sweep::Configuration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("source file {0} does not exist")]
    MissingSource(PathBuf),

    #[error("working directory {0} is not an existing directory")]
    BadWorkingDir(PathBuf),

    #[error("lines need to be integers of at least 1, but got {0}")]
    InvalidLine(usize),

    #[error("number of threads has to be an integer of at least 2, but got {0}")]
    InvalidThreadCount(usize),

    #[error("number of executions has to be at least 1")]
    InvalidRepeat,

    #[error("{0} set is empty")]
    EmptyAxis(&'static str),

    #[error("line {line} is past the end of the source file ({len} lines)")]
    LineOutOfRange { line: usize, len: usize },

    #[error("source file has no thread declaration matching \"{0}\"")]
    MissingThreadDeclaration(String),

    #[error("{0} command is empty")]
    EmptyCommand(&'static str),

    #[error("result grid is not rectangular: expected {expected} entries along the {axis} axis, found {found}")]
    RaggedGrid {
        axis: &'static str,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum MeasurementError {
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {status}")]
    ExitStatus { command: String, status: String },

    #[error("no line starting with \"{marker}\" in output of {executable}")]
    NoTimingLine { marker: String, executable: PathBuf },

    #[error("timing value {value} on the \"{marker}\" line of {executable} is out of range")]
    TimingOutOfRange {
        value: String,
        marker: String,
        executable: PathBuf,
    },

    #[error("cannot mark {path} executable: {source}")]
    Permissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("result space is empty, nothing was measured")]
    EmptyResult,

    #[error("fastest configuration {0} reported a runtime of 0, speedup is undefined")]
    ZeroRuntime(Configuration),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Measurement(#[from] MeasurementError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
