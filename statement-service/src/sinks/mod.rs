pub mod reconciliation;
pub mod statement_document;
pub mod zip_archive;

pub use reconciliation::{write_reconciliation, ReconciliationRow};
pub use statement_document::{StatementContext, StatementFields, TemplateRenderer};
pub use zip_archive::ZipPackager;
