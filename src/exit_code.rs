//! Exit codes for CLI operations following Unix conventions.
//!
//! - `0`: Success
//! - `1`: General error - unspecified failure
//! - `5`: Could not read the input stream or write output
//! - `6`: The configuration could not be loaded or is invalid

use crate::error::{ClusterError, ConfigError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// Map a clustering error to an exit code.
    pub fn from_error(error: &ClusterError) -> Self {
        match error {
            ClusterError::InvalidConfig { .. } => ExitCode::ConfigError,
            _ => ExitCode::GeneralError,
        }
    }

    /// Map a configuration error to an exit code.
    pub fn from_config_error(error: &ConfigError) -> Self {
        match error {
            ConfigError::Write { .. } => ExitCode::IoError,
            _ => ExitCode::ConfigError,
        }
    }

    /// Best-effort mapping for errors that reached the top of the binary.
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        if let Some(config) = error.downcast_ref::<ConfigError>() {
            return Self::from_config_error(config);
        }
        if let Some(cluster) = error.downcast_ref::<ClusterError>() {
            return Self::from_error(cluster);
        }
        if error.downcast_ref::<std::io::Error>().is_some() {
            return ExitCode::IoError;
        }
        ExitCode::GeneralError
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}
