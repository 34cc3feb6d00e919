use std::{path::Path, sync::Arc};

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use time::OffsetDateTime;

use super::TabularInput;
use crate::{
    config::StatementsConfig,
    pipeline::{BatchError, BatchInputs, BatchRequest, BatchSettings, ErrorReport, StatementBatchBuilder},
    sinks::{TemplateRenderer, ZipPackager},
};

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Statements Generator</title></head>
<body>
<h1>Statements Generator</h1>
<form action="/statements" method="post" enctype="multipart/form-data">
  <fieldset>
    <legend>Market</legend>
    <label><input type="radio" name="market" value="nepool" checked> NEPool (quarterly)</label>
    <label><input type="radio" name="market" value="pjm"> PJM (monthly)</label>
  </fieldset>
  <p><label>Production data <input type="file" name="prod_file" accept=".csv" multiple></label></p>
  <p><label>Generator details (PJM) <input type="file" name="details_file" accept=".csv"></label></p>
  <p><label>System IDs to include (optional) <input type="file" name="id_file" accept=".csv"></label></p>
  <p><label>Price (program 1) <input name="price"></label></p>
  <p><label>Price DC <input name="price_DC"></label> <label>Price MD <input name="price_MD"></label>
     <label>Price PA <input name="price_PA"></label></p>
  <p><label>Broker rate ($/MWh) <input name="broker_rate"></label></p>
  <p><label>Aggregator rate (fraction) <input name="agg_rate"></label></p>
  <p><button type="submit">Generate statements</button></p>
</form>
</body>
</html>
"#;

#[derive(Clone)]
pub struct AppState {
    statements: Arc<StatementsConfig>,
}

impl AppState {
    pub fn new(statements: StatementsConfig) -> Self {
        Self {
            statements: Arc::new(statements),
        }
    }
}

/// Production market selected on the upload form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Market {
    Nepool,
    Pjm,
}

impl Market {
    pub fn parse(raw: Option<&str>) -> Result<Self, BatchError> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("nepool") => Ok(Self::Nepool),
            Some("pjm") => Ok(Self::Pjm),
            Some(other) => Err(BatchError::IncompleteForm(format!("unknown market '{other}'"))),
        }
    }
}

/// Multipart fields of one submission, before validation.
#[derive(Debug, Default)]
pub struct UploadedForm {
    pub fields: Vec<(String, String)>,
    pub prod_files: Vec<TabularInput>,
    pub details_file: Option<TabularInput>,
    pub id_file: Option<TabularInput>,
}

impl UploadedForm {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sorts uploaded files into batch inputs according to the selected market.
    pub fn into_request(self) -> Result<BatchRequest, BatchError> {
        let market = Market::parse(self.field("market"))?;
        if self.prod_files.is_empty() {
            return Err(BatchError::IncompleteForm("no production data file".to_string()));
        }

        let mut inputs = BatchInputs {
            allow_list: self.id_file,
            ..BatchInputs::default()
        };
        match market {
            Market::Nepool => inputs.nepool = self.prod_files,
            Market::Pjm => {
                inputs.pjm = self.prod_files;
                inputs.generator_details = self.details_file;
            }
        }

        Ok(BatchRequest {
            form: self.fields,
            inputs,
        })
    }
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/statements", post(generate_statements))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadedForm, axum::extract::multipart::MultipartError> {
    let mut form = UploadedForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await?;

        let Some(file_name) = file_name else {
            form.fields.push((name, String::from_utf8_lossy(&data).into_owned()));
            continue;
        };
        // Browsers send an empty part for file inputs left blank.
        if file_name.is_empty() && data.is_empty() {
            continue;
        }

        let input = TabularInput::new(file_name, data.to_vec());
        match name.as_str() {
            "prod_file" => form.prod_files.push(input),
            "details_file" => form.details_file = Some(input),
            "id_file" => form.id_file = Some(input),
            other => tracing::debug!(field = other, "ignoring unexpected upload"),
        }
    }

    Ok(form)
}

fn run_batch(settings: BatchSettings, request: &BatchRequest) -> Result<(String, Vec<u8>), ErrorReport> {
    let mut builder = StatementBatchBuilder::new(settings, TemplateRenderer, ZipPackager);
    let summary = builder.run(request)?;

    let bytes = std::fs::read(&summary.archive).map_err(|source| {
        ErrorReport::from_error(
            builder.state().name(),
            &BatchError::Output {
                path: summary.archive.clone(),
                source,
            },
        )
    })?;
    let file_name = summary
        .archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "statements.zip".to_string());
    Ok((file_name, bytes))
}

async fn remove_staging_root(root: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(root).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %e, root = %root.display(), "failed to remove request staging root");
        }
    }
}

fn unprocessable(report: &ErrorReport) -> Response {
    (StatusCode::UNPROCESSABLE_ENTITY, report.user_message()).into_response()
}

async fn generate_statements(State(state): State<AppState>, multipart: Multipart) -> Response {
    metrics::counter!("http_statement_requests_total").increment(1);

    let upload = match read_upload(multipart).await {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!(error = %e, "rejected malformed upload");
            return (StatusCode::BAD_REQUEST, format!("invalid upload: {e}")).into_response();
        }
    };
    let request = match upload.into_request() {
        Ok(r) => r,
        Err(e) => return unprocessable(&ErrorReport::from_error("validating", &e)),
    };

    let request_root = state
        .statements
        .staging_root
        .join(uuid::Uuid::new_v4().to_string());
    let settings = BatchSettings {
        staging_root: request_root.clone(),
        template_path: state.statements.template_path.clone(),
        logo_path: state.statements.logo_path.clone(),
        run_date: OffsetDateTime::now_utc().date(),
    };

    let outcome = tokio::task::spawn_blocking(move || run_batch(settings, &request)).await;
    remove_staging_root(&request_root).await;

    match outcome {
        Ok(Ok((file_name, bytes))) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/zip".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{file_name}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Ok(Err(report)) => unprocessable(&report),
        Err(e) => {
            tracing::error!(error = %e, "statement batch worker panicked");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to create statements").into_response()
        }
    }
}
