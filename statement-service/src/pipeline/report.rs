use std::fmt;

use super::BatchError;

/// The failure that ended a batch, in the form shown to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ErrorReport {
    pub stage: &'static str,
    pub reason: String,
}

impl ErrorReport {
    pub fn from_error(stage: &'static str, err: &BatchError) -> Self {
        Self {
            stage,
            reason: err.to_string(),
        }
    }

    pub fn user_message(&self) -> String {
        format!("{}. Please correct the input and resubmit.", self.reason)
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch failed while {}: {}", self.stage, self.reason)
    }
}

impl std::error::Error for ErrorReport {}

/// Keeps the first failure of a batch. Later failures are ignored.
#[derive(Debug, Default)]
pub struct ErrorReporter {
    first: Option<ErrorReport>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `err` unless a failure is already held, and returns the held one.
    pub fn record(&mut self, stage: &'static str, err: &BatchError) -> &ErrorReport {
        self.first
            .get_or_insert_with(|| ErrorReport::from_error(stage, err))
    }

    pub fn failed(&self) -> bool {
        self.first.is_some()
    }

    pub fn reason(&self) -> Option<&str> {
        self.first.as_ref().map(|r| r.reason.as_str())
    }

    pub fn report(&self) -> Option<&ErrorReport> {
        self.first.as_ref()
    }
}
