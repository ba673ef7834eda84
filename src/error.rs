//! Unified error type for all control commands.
//!
//! `AppError` is the single error type returned by every control operation.
//! It serializes as `{ "kind": "...", "message": "..." }` so a front end can
//! programmatically distinguish error categories. Failures that happen inside a
//! running job's loop never surface here; they are logged or degrade samples.

use serde::ser::SerializeStruct;

/// Application-level error returned by all control commands.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Invalid or missing user input (bad interval, blank target, parse errors).
    #[error("{0}")]
    InvalidInput(String),

    /// Process enumeration or termination requested directly by the operator failed.
    #[error("{0}")]
    Process(String),

    /// An ad-hoc probe requested directly by the operator failed.
    #[error("{0}")]
    Probe(String),

    /// Job lifecycle misuse (starting a job twice, spawning its thread failed).
    #[error("{0}")]
    Job(String),

    /// I/O and OS-level errors.
    #[error("{0}")]
    Io(String),
}

impl AppError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::Process(_) => "Process",
            AppError::Probe(_) => "Probe",
            AppError::Job(_) => "Job",
            AppError::Io(_) => "Io",
        }
    }
}

/// Custom Serialize: produces `{ "kind": "Variant", "message": "..." }`.
impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}
