//! Error types for the carvel-core library.
//!
//! Every failure the carver can hit is an I/O failure on either the input
//! image or one of the output targets. The variants keep those two sides
//! apart so callers can report which one broke.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for carvel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all carvel operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The input image could not be opened
    #[error("could not open '{path}'")]
    InputOpen {
        /// Path to the image
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Reading from the input image failed mid-scan
    #[error("failed to read input at byte offset {offset}")]
    InputRead {
        /// Offset of the block being read
        offset: u64,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An output target could not be created
    #[error("failed to create output file '{path}'")]
    OutputCreate {
        /// Path of the output target
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Writing to or flushing an output target failed
    #[error("failed to write output file '{path}'")]
    OutputWrite {
        /// Path of the output target
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An output target already exists and overwriting is disabled
    #[error("output file already exists: '{path}'")]
    OutputExists {
        /// Path of the existing file
        path: PathBuf,
    },

    /// Failed to create the output directory
    #[error("failed to create directory '{path}'")]
    DirectoryCreate {
        /// Path to the directory that failed to create
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Creates a new input open error
    pub fn input_open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::InputOpen {
            path: path.into(),
            source,
        }
    }

    /// Creates a new input read error
    pub fn input_read(offset: u64, source: std::io::Error) -> Self {
        Self::InputRead { offset, source }
    }

    /// Creates a new output create error
    pub fn output_create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OutputCreate {
            path: path.into(),
            source,
        }
    }

    /// Creates a new output write error
    pub fn output_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OutputWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new output exists error
    pub fn output_exists(path: impl Into<PathBuf>) -> Self {
        Self::OutputExists { path: path.into() }
    }

    /// Creates a new directory creation error
    pub fn directory_create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreate {
            path: path.into(),
            source,
        }
    }

    /// Returns true if the failure came from the input image rather than an output
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InputOpen { .. } | Self::InputRead { .. })
    }
}
