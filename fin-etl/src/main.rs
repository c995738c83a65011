use clap::{Parser, Subcommand};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use fin_core::domain::{InstitutionKind, ReportCycle};
use fin_core::warehouse::{SqliteWarehouse, Warehouse};
use fin_etl::config::Config;
use fin_etl::pipeline::{self, PipelineContext};
use fin_etl::snapshot::{BlobStore, LocalBlobStore};
use fin_etl::{fetch, observability};

#[derive(Parser)]
#[command(name = "fin-etl")]
#[command(about = "Financial-institution warehouse ETL: fetch, transform, merge")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn parse_institution(s: &str) -> Result<InstitutionKind, String> {
    InstitutionKind::from_str(s)
}

fn parse_cycle(s: &str) -> Result<ReportCycle, String> {
    ReportCycle::from_str(s)
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire raw extracts (paged API for banks, workbook export for credit unions)
    Fetch {
        /// Institution kind: bank or credit-union
        #[arg(long, value_parser = parse_institution)]
        institution: InstitutionKind,
        /// Reporting cycle (YYYY-MM) for sources that do not carry one
        #[arg(long, value_parser = parse_cycle)]
        cycle: Option<ReportCycle>,
    },
    /// Normalize the latest raw extract and replace the staging tables
    Transform {
        #[arg(long, value_parser = parse_institution)]
        institution: InstitutionKind,
    },
    /// Merge staging into the permanent tables
    Load {
        #[arg(long, value_parser = parse_institution)]
        institution: InstitutionKind,
    },
    /// Run fetch, transform, and load in order
    FullPipeline {
        #[arg(long, value_parser = parse_institution)]
        institution: InstitutionKind,
        #[arg(long, value_parser = parse_cycle)]
        cycle: Option<ReportCycle>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize logging and metrics
    observability::logging::init_logging();
    if let Err(e) = observability::metrics::init() {
        eprintln!("metrics init failed: {e}");
    }

    let config = Config::load()?;
    info!(data_root = %config.paths.data_root.display(), "startup");

    // One configured warehouse connection and HTTP client per process,
    // passed explicitly into every stage.
    let warehouse: Arc<dyn Warehouse> = Arc::new(SqliteWarehouse::open(&config.warehouse.db_path)?);
    warehouse.run_migrations().await?;
    let blob_store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(config.paths.blobs_dir()));
    let client = fetch::build_client(config.fdic.timeout_secs)?;

    let ctx = PipelineContext {
        config,
        warehouse,
        blob_store,
        client,
    };

    match cli.command {
        Commands::Fetch { institution, cycle } => {
            let manifest = pipeline::fetch_stage(&ctx, institution, cycle).await?;
            println!(
                "✅ fetch complete for {institution}: complete={}, manifest at {}",
                manifest.complete,
                pipeline::extracts::ExtractManifest::path(&ctx.config.paths.raw_dir(), institution)
                    .display()
            );
        }
        Commands::Transform { institution } => {
            let report = pipeline::transform_stage(&ctx, institution).await?;
            println!(
                "✅ transform complete for {institution}: {} dimension rows, {} fact rows staged ({} dropped)",
                report.dimension_loaded, report.fact_loaded, report.dropped
            );
        }
        Commands::Load { institution } => {
            let report = pipeline::merge_stage(&ctx, institution).await?;
            println!(
                "✅ load complete for {institution}: {} dimension rows, {} fact rows inserted",
                report.dimension_inserted, report.fact_inserted
            );
        }
        Commands::FullPipeline { institution, cycle } => {
            let report = pipeline::full_pipeline(&ctx, institution, cycle).await?;
            println!(
                "✅ pipeline run {} for {institution}: staged {}+{}, inserted {}+{}",
                report.run_id,
                report.transform.dimension_loaded,
                report.transform.fact_loaded,
                report.merge.dimension_inserted,
                report.merge.fact_inserted
            );
        }
    }

    Ok(())
}
