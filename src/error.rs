use std::{fmt, io, path::PathBuf};

use crate::selector::DeviceClass;

pub type Result<A, E = Error> = std::result::Result<A, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no platform could create a context for a {class} device (tried: {})", .platforms.join(", "))]
    NoDeviceAvailable {
        class: DeviceClass,
        platforms: Vec<String>,
    },

    /// `log` is the compiler output, untruncated.
    #[error("kernel program failed to build:\n{log}")]
    ProgramBuildFailure { log: String },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("failed to read kernel source {}", .path.display())]
    KernelSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("display error: {0}")]
    Display(String),
}

/// Device-reported failure class. The discriminants are stable and are what
/// [`DispatchError::code`] reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureCode {
    Validation = 1,
    OutOfMemory = 2,
    ArgumentMismatch = 3,
    ResourceLimit = 4,
    MapFailed = 5,
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureCode::Validation => "validation",
            FailureCode::OutOfMemory => "out of memory",
            FailureCode::ArgumentMismatch => "argument mismatch",
            FailureCode::ResourceLimit => "resource limit",
            FailureCode::MapFailed => "buffer map failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct DispatchError {
    pub kind: FailureCode,
    pub message: String,
}

impl DispatchError {
    pub fn new(kind: FailureCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn code(&self) -> i32 {
        self.kind as i32
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kernel dispatch failed: {} ({}): {}",
            self.kind,
            self.code(),
            self.message
        )
    }
}

impl std::error::Error for DispatchError {}

impl From<wgpu::Error> for DispatchError {
    fn from(error: wgpu::Error) -> Self {
        match error {
            wgpu::Error::OutOfMemory { source } => {
                DispatchError::new(FailureCode::OutOfMemory, source.to_string())
            }
            wgpu::Error::Validation {
                source: _,
                description,
            } => DispatchError::new(FailureCode::Validation, description),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_carry_numeric_codes() {
        let error = DispatchError::new(FailureCode::ArgumentMismatch, "argument 2");
        assert_eq!(error.code(), 3);
        assert_eq!(
            error.to_string(),
            "kernel dispatch failed: argument mismatch (3): argument 2"
        );
    }

    #[test]
    fn build_failure_keeps_whole_log() {
        let log = "line 1\nline 2\n".repeat(500);
        let error = Error::ProgramBuildFailure { log: log.clone() };
        assert!(error.to_string().ends_with(&log));
    }
}
