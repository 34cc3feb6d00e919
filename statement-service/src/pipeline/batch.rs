use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
};

use statement_domain::{
    domain::{period::slugify, CustomerRecord, ReportingPeriod, SettlementResult},
    CustomerLedger,
};
use time::{macros::format_description, Date};

use super::{BatchError, ErrorReport, ErrorReporter, Packager, Renderer};
use crate::{
    sinks::{
        reconciliation::RECONCILIATION_FILE, write_reconciliation, ReconciliationRow, StatementContext,
        StatementFields,
    },
    sources::{
        allow_list::read_allow_list,
        nepool_quarterly,
        pjm_monthly::{self, GeneratorDetails},
        NormalizedTable, TabularInput,
    },
    transform::{parse_settlement_terms, settle, SettlementTerms},
};

const BLANK_STATEMENT_STEM: &str = "blank";

/// Uploaded tables of one batch, grouped by role.
#[derive(Debug, Clone, Default)]
pub struct BatchInputs {
    pub nepool: Vec<TabularInput>,
    pub pjm: Vec<TabularInput>,
    pub generator_details: Option<TabularInput>,
    pub allow_list: Option<TabularInput>,
}

/// Everything a caller submits for one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    /// Raw form fields (`price*`, `broker_rate`, `agg_rate`).
    pub form: Vec<(String, String)>,
    pub inputs: BatchInputs,
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Directory under which the period-named statements directory is created.
    pub staging_root: PathBuf,
    pub template_path: PathBuf,
    pub logo_path: String,
    pub run_date: Date,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchState {
    Created,
    Validating,
    Accumulating,
    Filtering,
    Settling,
    Rendering,
    Packaged(PathBuf),
    Failed(String),
}

impl BatchState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Validating => "validating",
            Self::Accumulating => "accumulating",
            Self::Filtering => "filtering",
            Self::Settling => "settling",
            Self::Rendering => "rendering",
            Self::Packaged(_) => "packaged",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a packaged batch.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchSummary {
    pub period: String,
    pub customers: usize,
    pub statements_dir: PathBuf,
    pub archive: PathBuf,
    pub total_generation_kwh: f64,
    pub total_net_payment: f64,
    pub dropped_rows: usize,
    pub filtered_out: usize,
    pub reconciliation_digest: String,
}

/// Decoded and validated inputs, ready to accumulate.
struct ValidatedBatch {
    terms: SettlementTerms,
    tables: Vec<NormalizedTable>,
    allow_list: Option<HashSet<i64>>,
    period: ReportingPeriod,
    template: String,
}

/// Runs one batch from uploaded tables to a packaged statements archive.
///
/// Stages run strictly in order. The first error ends the batch: it is kept
/// in the [`ErrorReporter`], the state becomes [`BatchState::Failed`], and no
/// later stage runs. Documents already written stay in the staging directory
/// but are never packaged.
pub struct StatementBatchBuilder<R, P> {
    settings: BatchSettings,
    renderer: R,
    packager: P,
    state: BatchState,
    reporter: ErrorReporter,
}

impl<R, P> StatementBatchBuilder<R, P>
where
    R: Renderer,
    P: Packager,
{
    pub fn new(settings: BatchSettings, renderer: R, packager: P) -> Self {
        Self {
            settings,
            renderer,
            packager,
            state: BatchState::Created,
            reporter: ErrorReporter::new(),
        }
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    /// Runs one batch. Each call starts from [`BatchState::Created`] with an
    /// empty reporter, so a builder can be reused across requests.
    pub fn run(&mut self, request: &BatchRequest) -> Result<BatchSummary, ErrorReport> {
        self.state = BatchState::Created;
        self.reporter = ErrorReporter::new();
        metrics::counter!("statement_batches_total").increment(1);

        match self.execute(request) {
            Ok(summary) => {
                tracing::info!(
                    period = %summary.period,
                    customers = summary.customers,
                    archive = %summary.archive.display(),
                    digest = %summary.reconciliation_digest,
                    "statements successfully generated"
                );
                Ok(summary)
            }
            Err(err) => {
                let stage = self.state.name();
                let report = self.reporter.record(stage, &err).clone();
                tracing::error!(stage, error = %err, "statement batch failed");
                metrics::counter!("statement_batches_failed_total").increment(1);
                self.state = BatchState::Failed(report.reason.clone());
                Err(report)
            }
        }
    }

    fn transition(&mut self, next: BatchState) {
        tracing::info!(from = %self.state, to = %next, "batch stage");
        self.state = next;
    }

    fn execute(&mut self, request: &BatchRequest) -> Result<BatchSummary, BatchError> {
        self.transition(BatchState::Validating);
        let batch = self.validate(request)?;
        let statements_dir = reclaim_directory(&self.settings.staging_root, &batch.period)?;

        self.transition(BatchState::Accumulating);
        let mut ledger = CustomerLedger::new();
        for table in &batch.tables {
            ledger.accumulate(&table.rows);
        }
        let dropped_rows: usize = batch.tables.iter().map(|t| t.dropped).sum();

        let mut filtered_out = 0;
        if let Some(allowed) = &batch.allow_list {
            self.transition(BatchState::Filtering);
            filtered_out = ledger.filter_by_allow_list(allowed);
            tracing::info!(kept = ledger.len(), removed = filtered_out, "applied allow-list");
        }

        self.transition(BatchState::Settling);
        let terms = &batch.terms;
        let settlements = ledger
            .iter()
            .map(|record| {
                settle(record, &terms.prices, terms.broker_rate, terms.agg_rate).map(|s| (record, s))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.transition(BatchState::Rendering);
        let ctx = StatementContext {
            logo_path: self.settings.logo_path.clone(),
            date: format_run_date(self.settings.run_date),
            period: batch.period.to_string(),
        };
        let reconciliation_digest =
            self.render_all(&statements_dir, &batch.template, &ctx, terms, &settlements)?;

        let archive = self.packager.package_directory(&statements_dir)?;
        self.transition(BatchState::Packaged(archive.clone()));

        Ok(BatchSummary {
            period: ctx.period,
            customers: ledger.len(),
            statements_dir,
            archive,
            total_generation_kwh: ledger.total_generation_kwh(),
            total_net_payment: settlements.iter().map(|(_, s)| s.net_payment).sum(),
            dropped_rows,
            filtered_out,
            reconciliation_digest,
        })
    }

    fn validate(&self, request: &BatchRequest) -> Result<ValidatedBatch, BatchError> {
        let terms = parse_settlement_terms(&request.form)?;
        let inputs = &request.inputs;

        if inputs.nepool.is_empty() && inputs.pjm.is_empty() {
            return Err(BatchError::IncompleteForm("no production data file".to_string()));
        }

        let mut tables = Vec::with_capacity(inputs.nepool.len() + inputs.pjm.len());
        for input in &inputs.nepool {
            tables.push(nepool_quarterly::normalize(input)?);
        }
        if !inputs.pjm.is_empty() {
            let details_input = inputs.generator_details.as_ref().ok_or_else(|| {
                BatchError::IncompleteForm("PJM production data requires a generator details file".to_string())
            })?;
            let details = GeneratorDetails::read(details_input)?;
            for input in &inputs.pjm {
                tables.push(pjm_monthly::normalize(input, &details)?);
            }
        }

        let mut period = ReportingPeriod::new();
        for label in tables.iter().filter_map(|t| t.period.clone()) {
            period.push(label);
        }
        if period.is_empty() {
            return Err(BatchError::IncompleteForm("production data contained no rows".to_string()));
        }

        let allow_list = inputs.allow_list.as_ref().map(read_allow_list).transpose()?;

        let template = std::fs::read_to_string(&self.settings.template_path).map_err(|source| {
            BatchError::Template {
                path: self.settings.template_path.clone(),
                source,
            }
        })?;

        tracing::info!(
            period = %period,
            files = tables.len(),
            rows = tables.iter().map(|t| t.rows.len()).sum::<usize>(),
            filtered = allow_list.is_some(),
            "batch inputs validated"
        );

        Ok(ValidatedBatch {
            terms,
            tables,
            allow_list,
            period,
            template,
        })
    }

    /// Writes one document per customer, the blank layout document and the
    /// reconciliation ledger. Returns the ledger digest.
    fn render_all(
        &self,
        dir: &Path,
        template: &str,
        ctx: &StatementContext,
        terms: &SettlementTerms,
        settlements: &[(&CustomerRecord, SettlementResult)],
    ) -> Result<String, BatchError> {
        let total = settlements.len();
        tracing::info!(total, "saving statements");

        let mut ledger_rows = Vec::with_capacity(total);
        let mut stems = HashSet::from([BLANK_STATEMENT_STEM.to_string()]);
        for (i, (record, settlement)) in settlements.iter().enumerate() {
            let fields = StatementFields::for_customer(ctx, record, settlement, terms);
            let stem = unique_stem(&mut stems, document_stem(&record.display_name, &record.id));
            self.write_document(dir, &stem, template, &fields, &record.display_name)?;

            ledger_rows.push(ReconciliationRow {
                date: ctx.date.clone(),
                name: record.display_name.clone(),
                net_payment: settlement.net_payment,
            });
            metrics::counter!("statements_rendered_total").increment(1);
            tracing::debug!(id = %record.id, done = i + 1, remaining = total - i - 1, "statement complete");
        }

        self.write_document(dir, BLANK_STATEMENT_STEM, template, &StatementFields::blank(ctx), "blank")?;

        write_reconciliation(&dir.join(RECONCILIATION_FILE), &ledger_rows)
    }

    fn write_document(
        &self,
        dir: &Path,
        stem: &str,
        template: &str,
        fields: &StatementFields,
        name: &str,
    ) -> Result<(), BatchError> {
        let bytes = self.renderer.render(template, fields).map_err(|e| match e {
            BatchError::Render { .. } => e,
            other => BatchError::Render {
                name: name.to_string(),
                reason: other.to_string(),
            },
        })?;
        let path = dir.join(format!("{stem}_statement.{}", self.renderer.extension()));
        std::fs::write(&path, bytes).map_err(|source| BatchError::Output { path, source })
    }
}

/// `MM/DD/YYYY`.
pub fn format_run_date(date: Date) -> String {
    date.format(format_description!("[month]/[day]/[year]"))
        .unwrap_or_else(|_| date.to_string())
}

/// File stem of a customer document. The id is part of the stem so customers
/// sharing a display name get separate files.
fn document_stem(name: &str, id: &str) -> String {
    [slugify(name), slugify(id)]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Claims `stem` in `taken`, appending `_2`, `_3`, ... when an earlier
/// document already uses it.
fn unique_stem(taken: &mut HashSet<String>, stem: String) -> String {
    if taken.insert(stem.clone()) {
        return stem;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{stem}_{n}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Deletes and recreates `<root>/<period>_statements`.
fn reclaim_directory(root: &Path, period: &ReportingPeriod) -> Result<PathBuf, BatchError> {
    let dir = root.join(format!("{}_statements", period.slug()));
    let dir_err = |source| BatchError::Directory {
        path: dir.clone(),
        source,
    };

    if dir.exists() {
        std::fs::remove_dir_all(&dir).map_err(dir_err)?;
    }
    std::fs::create_dir_all(&dir).map_err(dir_err)?;
    tracing::debug!(dir = %dir.display(), "staging directory ready");
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn run_date_is_zero_padded() {
        assert_eq!(format_run_date(date!(2026-01-05)), "01/05/2026");
    }

    #[test]
    fn document_stem_combines_name_and_id() {
        assert_eq!(document_stem("Jane Doe", "NON-MA-101"), "Jane_Doe_NON_MA_101");
        assert_eq!(document_stem("", "A1"), "A1");
    }

    #[test]
    fn colliding_stems_get_numbered() {
        let mut taken = HashSet::from([BLANK_STATEMENT_STEM.to_string()]);
        let first = unique_stem(&mut taken, document_stem("Jane", "SYS-00-5"));
        let second = unique_stem(&mut taken, document_stem("Jane", "SYS_00_5"));
        let third = unique_stem(&mut taken, document_stem("Jane", "SYS 00 5"));
        assert_eq!(first, "Jane_SYS_00_5");
        assert_eq!(second, "Jane_SYS_00_5_2");
        assert_eq!(third, "Jane_SYS_00_5_3");
        assert_eq!(unique_stem(&mut taken, BLANK_STATEMENT_STEM.to_string()), "blank_2");
    }

    #[test]
    fn state_names_are_stable() {
        assert_eq!(BatchState::Failed("x".into()).name(), "failed");
        assert_eq!(BatchState::Packaged(PathBuf::from("a.zip")).to_string(), "packaged");
    }
}
