use crate::common::error::{EtlError, Result};
use crate::config::Config;
use crate::export;
use crate::fetch::{self, FdicSource};
use crate::normalize::{self, bank, credit_union};
use crate::observability::metrics;
use crate::snapshot::{self, BlobStore};
use chrono::Utc;
use fin_core::domain::{InstitutionKind, RecordKind, ReportCycle};
use fin_core::warehouse::{TableSchema, Tables, Warehouse};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub mod extracts;
pub mod run_lock;

use extracts::ExtractManifest;

/// Everything a stage needs, constructed once at startup. The warehouse
/// connection and HTTP client are process-scoped and passed explicitly; no
/// stage reaches for hidden shared state.
pub struct PipelineContext {
    pub config: Config,
    pub warehouse: Arc<dyn Warehouse>,
    pub blob_store: Arc<dyn BlobStore>,
    pub client: reqwest::Client,
}

#[derive(Debug)]
pub struct TransformReport {
    pub dimension_loaded: usize,
    pub fact_loaded: usize,
    pub dropped: usize,
    pub extract_complete: bool,
}

#[derive(Debug)]
pub struct MergeReport {
    pub dimension_inserted: usize,
    pub fact_inserted: usize,
}

#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub institution: InstitutionKind,
    pub transform: TransformReport,
    pub merge: MergeReport,
}

/// Acquire raw extracts for one institution kind and persist them with their
/// manifest. Banks page the FDIC API; credit unions consume the latest
/// browser-produced workbook export.
#[instrument(skip(ctx, cycle))]
pub async fn fetch_stage(
    ctx: &PipelineContext,
    kind: InstitutionKind,
    cycle: Option<ReportCycle>,
) -> Result<ExtractManifest> {
    let raw_dir = ctx.config.paths.raw_dir();
    match kind {
        InstitutionKind::Bank => {
            let page_size = ctx.config.fdic.page_size;
            let dim_source = FdicSource::institutions(ctx.client.clone(), &ctx.config.fdic);
            let dimension = fetch::fetch_all(&dim_source, page_size).await?;
            let fact_source = FdicSource::financials(ctx.client.clone(), &ctx.config.fdic);
            let facts = fetch::fetch_all(&fact_source, page_size).await?;

            let complete = dimension.complete && facts.complete;
            let failed_at_offset = dimension.failed_at_offset.or(facts.failed_at_offset);
            if !complete {
                warn!(
                    institution = %kind,
                    ?failed_at_offset,
                    "extract is partial; recording truncation in the manifest"
                );
            }
            extracts::store_extract(
                &raw_dir,
                kind,
                &dimension.records,
                &facts.records,
                complete,
                failed_at_offset,
                cycle,
            )
        }
        InstitutionKind::CreditUnion => {
            let discovered = export::discover_export(&ctx.config.paths.downloads_dir())?;
            let (dimension_rows, fact_rows) = export::read_workbook(&discovered.workbook)?;
            let cycle = cycle.or(discovered.cycle).unwrap_or_else(|| {
                let assumed = ReportCycle::latest_completed(Utc::now().date_naive());
                warn!(%assumed, "no reporting cycle supplied; assuming latest completed quarter");
                assumed
            });
            extracts::store_extract(
                &raw_dir,
                kind,
                &dimension_rows,
                &fact_rows,
                true,
                None,
                Some(cycle),
            )
        }
    }
}

/// Normalize the latest raw extract, persist audit snapshots, and replace the
/// staging tables. Any load failure aborts the run before the merge.
#[instrument(skip(ctx))]
pub async fn transform_stage(
    ctx: &PipelineContext,
    kind: InstitutionKind,
) -> Result<TransformReport> {
    let extract = extracts::load_latest_extract(&ctx.config.paths.raw_dir(), kind)?;
    if !extract.complete {
        warn!(
            institution = %kind,
            "transforming a partial extract; a later complete fetch and re-run fills the gap"
        );
    }

    let (dimension_batch, fact_batch) = match kind {
        InstitutionKind::Bank => (
            normalize::normalize_batch(&extract.dimension_rows, bank::dimension),
            normalize::normalize_batch(&extract.fact_rows, bank::fact),
        ),
        InstitutionKind::CreditUnion => {
            let cycle = extract.cycle.ok_or_else(|| EtlError::Export {
                message: "credit-union extract has no reporting cycle; re-run fetch with --cycle"
                    .to_string(),
            })?;
            (
                normalize::normalize_batch(&extract.dimension_rows, credit_union::dimension),
                normalize::normalize_batch(&extract.fact_rows, |record| {
                    credit_union::fact(record, &cycle)
                }),
            )
        }
    };
    let dropped = dimension_batch.dropped + fact_batch.dropped;
    if dropped > 0 {
        warn!(institution = %kind, dropped, "malformed records dropped during normalization");
    }

    let segment = kind.table_segment();
    let stamp = Utc::now().timestamp();
    let formatted_dir = ctx.config.paths.data_root.join("formatted");
    let dimension_name = format!("formatted_{segment}_dim_{stamp}.csv");
    let fact_name = format!("formatted_{segment}_fact_{stamp}.csv");
    let dimension_path = formatted_dir.join(&dimension_name);
    let fact_path = formatted_dir.join(&fact_name);

    snapshot::write_dimension_snapshot(&dimension_path, &dimension_batch.records)?;
    snapshot::write_fact_snapshot(&fact_path, &fact_batch.records)?;
    ctx.blob_store
        .put(&ctx.config.blob.bucket, &dimension_path, &dimension_name)?;
    ctx.blob_store
        .put(&ctx.config.blob.bucket, &fact_path, &fact_name)?;

    let dimension_loaded = stage_table(ctx, kind, RecordKind::Dimension, &dimension_path).await?;
    let fact_loaded = stage_table(ctx, kind, RecordKind::Fact, &fact_path).await?;

    info!(
        institution = %kind,
        dimension_loaded,
        fact_loaded,
        dropped,
        "staging tables replaced"
    );
    Ok(TransformReport {
        dimension_loaded,
        fact_loaded,
        dropped,
        extract_complete: extract.complete,
    })
}

/// Truncate-then-load one staging table under its run lock.
async fn stage_table(
    ctx: &PipelineContext,
    kind: InstitutionKind,
    record: RecordKind,
    snapshot_path: &Path,
) -> Result<usize> {
    let staging = Tables::staging(kind, record);
    let schema = TableSchema::for_kind(record);
    let _guard = run_lock::acquire(&staging).await;
    ctx.warehouse.truncate(&staging).await?;
    match ctx
        .warehouse
        .bulk_load(&staging, snapshot_path, Some(&schema))
        .await
    {
        Ok(loaded) => {
            metrics::load::rows_loaded(loaded);
            Ok(loaded)
        }
        Err(e) => {
            metrics::load::load_error();
            Err(e.into())
        }
    }
}

/// Merge staging into the permanent tables: insert-only on absent natural
/// keys, idempotent under re-runs with the same staging snapshot.
#[instrument(skip(ctx))]
pub async fn merge_stage(ctx: &PipelineContext, kind: InstitutionKind) -> Result<MergeReport> {
    let dimension_inserted = merge_table(ctx, kind, RecordKind::Dimension).await?;
    let fact_inserted = merge_table(ctx, kind, RecordKind::Fact).await?;
    info!(
        institution = %kind,
        dimension_inserted,
        fact_inserted,
        "merge into permanent tables complete"
    );
    Ok(MergeReport {
        dimension_inserted,
        fact_inserted,
    })
}

async fn merge_table(
    ctx: &PipelineContext,
    kind: InstitutionKind,
    record: RecordKind,
) -> Result<usize> {
    let staging = Tables::staging(kind, record);
    let permanent = Tables::permanent(kind, record);
    let schema = TableSchema::for_kind(record);
    let _guard = run_lock::acquire(&staging).await;
    match ctx
        .warehouse
        .merge_missing(&staging, &permanent, &schema)
        .await
    {
        Ok(inserted) => {
            metrics::merge::rows_inserted(inserted);
            Ok(inserted)
        }
        Err(e) => {
            metrics::merge::merge_error();
            Err(e.into())
        }
    }
}

/// Run fetch, transform, and merge in order for one institution kind. The
/// two institution pipelines share no mutable state and may run as separate
/// concurrent tasks.
pub async fn full_pipeline(
    ctx: &PipelineContext,
    kind: InstitutionKind,
    cycle: Option<ReportCycle>,
) -> Result<RunReport> {
    let run_id = Uuid::new_v4();
    info!(%run_id, institution = %kind, "pipeline run starting");
    fetch_stage(ctx, kind, cycle).await?;
    let transform = transform_stage(ctx, kind).await?;
    let merge = merge_stage(ctx, kind).await?;
    info!(%run_id, institution = %kind, "pipeline run finished");
    Ok(RunReport {
        run_id,
        institution: kind,
        transform,
        merge,
    })
}
