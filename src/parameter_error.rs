//! Error handling for parameter extractors

use std::io;

/// Unified error to report failures while reading DH tables from YAML.
#[derive(Debug)]
pub enum ParameterError {
    IoError(io::Error),
    ParseError(String),
    InvalidLength { expected: usize, found: usize },
    NonFiniteValue(String),
}

impl std::fmt::Display for ParameterError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            ParameterError::IoError(ref err) =>
                write!(f, "IO Error: {}", err),
            ParameterError::ParseError(ref msg) =>
                write!(f, "Parse Error: {}", msg),
            ParameterError::InvalidLength { expected, found } =>
                write!(f, "Invalid Length: expected {}, found {}", expected, found),
            ParameterError::NonFiniteValue(ref msg) =>
                write!(f, "Non-finite value: {}", msg),
        }
    }
}

impl std::error::Error for ParameterError {}

impl From<io::Error> for ParameterError {
    fn from(err: io::Error) -> Self {
        ParameterError::IoError(err)
    }
}
