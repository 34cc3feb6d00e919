use std::path::{Path, PathBuf};

use statement_domain::domain::RateClass;

use crate::sinks::statement_document::StatementFields;

pub mod batch;
pub mod report;

pub use batch::{BatchInputs, BatchRequest, BatchSettings, BatchState, BatchSummary, StatementBatchBuilder};
pub use report::{ErrorReport, ErrorReporter};

#[derive(thiserror::Error, Debug)]
pub enum BatchError {
    #[error("{file}: not a readable CSV table: {reason}")]
    InputFormat { file: String, reason: String },
    #[error("{file}: {schema} data is missing required column(s): {}", .columns.join(", "))]
    MissingColumns {
        file: String,
        schema: &'static str,
        columns: Vec<String>,
    },
    #[error("{file}: cannot parse date '{value}' (expected M/D/YYYY)")]
    UnparsableDate { file: String, value: String },
    #[error("allow-list {file}: {reason}")]
    MalformedAllowList { file: String, reason: String },
    #[error("customer {id}: no price entered for {rate_class}")]
    UnknownRateClass { id: String, rate_class: RateClass },
    #[error("could not prepare staging directory {}: {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("incomplete form: {0}")]
    IncompleteForm(String),
    #[error("could not load statement template {}: {source}", .path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render statement for {name}: {reason}")]
    Render { name: String, reason: String },
    #[error("failed to write {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to package statements: {0}")]
    Package(String),
}

/// Turns a template plus field values into one statement document.
pub trait Renderer {
    /// File extension of produced documents, without the dot.
    fn extension(&self) -> &str;

    fn render(&self, template: &str, fields: &StatementFields) -> Result<Vec<u8>, BatchError>;
}

/// Bundles a finished statements directory for download.
pub trait Packager {
    /// Packages `dir` and returns the archive path.
    fn package_directory(&self, dir: &Path) -> Result<PathBuf, BatchError>;
}
