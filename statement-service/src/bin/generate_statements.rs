use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use statement_service::{
    config::AppConfig,
    observability,
    pipeline::{BatchInputs, BatchRequest, BatchSettings, StatementBatchBuilder},
    sinks::{TemplateRenderer, ZipPackager},
    sources::{http_upload::Market, TabularInput},
};
use time::OffsetDateTime;

#[derive(Parser, Debug)]
#[command(name = "generate_statements")]
#[command(about = "Generate a settlement statements bundle from local production CSV files", long_about = None)]
struct Cli {
    /// Production schema of the --prod files (nepool or pjm)
    #[arg(long, default_value = "nepool")]
    market: String,

    /// Production CSV files, merged into one batch
    #[arg(long = "prod", num_args = 1.., required = true)]
    prod: Vec<PathBuf>,

    /// Generator details table (required for pjm)
    #[arg(long)]
    details: Option<PathBuf>,

    /// Allow-list of system ids
    #[arg(long)]
    ids: Option<PathBuf>,

    /// Unit price per rate class, as <class>=<value>
    #[arg(long = "price", num_args = 1.., value_parser = parse_price)]
    prices: Vec<(String, String)>,

    /// Broker payment per MWh
    #[arg(long)]
    broker_rate: String,

    /// Aggregator fee as a fraction of the subtotal
    #[arg(long)]
    agg_rate: String,

    /// Staging root (defaults to the configured one)
    #[arg(long)]
    out: Option<PathBuf>,
}

impl Cli {
    /// Form fields as the upload form would send them.
    fn form(&self) -> Vec<(String, String)> {
        let mut form: Vec<_> = self
            .prices
            .iter()
            .map(|(class, price)| (format!("price_{class}"), price.clone()))
            .collect();
        form.push(("broker_rate".to_string(), self.broker_rate.clone()));
        form.push(("agg_rate".to_string(), self.agg_rate.clone()));
        form
    }
}

fn parse_price(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((class, price)) if !class.trim().is_empty() => {
            Ok((class.trim().to_string(), price.trim().to_string()))
        }
        _ => Err(format!("expected <class>=<value>, got '{raw}'")),
    }
}

fn read_input(path: &Path) -> Result<TabularInput> {
    TabularInput::from_path(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Generate one statements bundle from local CSV files.
fn main() -> Result<()> {
    observability::init_tracing();

    let cli = Cli::parse();

    // Load configuration (STATEMENT_CONFIG can point to a batch-specific file).
    let cfg = AppConfig::load()?;

    let market = Market::parse(Some(cli.market.as_str()))?;
    let prod = cli.prod.iter().map(|p| read_input(p)).collect::<Result<Vec<_>>>()?;
    let mut inputs = BatchInputs {
        allow_list: cli.ids.as_deref().map(read_input).transpose()?,
        ..BatchInputs::default()
    };
    match market {
        Market::Nepool => inputs.nepool = prod,
        Market::Pjm => {
            inputs.pjm = prod;
            inputs.generator_details = cli.details.as_deref().map(read_input).transpose()?;
        }
    }

    let settings = BatchSettings {
        staging_root: cli.out.clone().unwrap_or(cfg.statements.staging_root),
        template_path: cfg.statements.template_path,
        logo_path: cfg.statements.logo_path,
        run_date: OffsetDateTime::now_utc().date(),
    };

    let mut builder = StatementBatchBuilder::new(settings, TemplateRenderer, ZipPackager);
    let summary = match builder.run(&BatchRequest {
        form: cli.form(),
        inputs,
    }) {
        Ok(summary) => summary,
        Err(report) => bail!(report.user_message()),
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
