// ==============================================================================
// main.rs - Variant Merge Entry Point
// ==============================================================================
// Description: Command line driver merging staged files of one study into the
//              canonical variant store
// Created: 2026-10-12
// Modified: 2026-10-16
// Version: 1.1.0
// ==============================================================================

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use variant_merge::config::load_study_metadata;
use variant_merge::store::{InMemoryStore, PgVariantStore, StageSource, VariantStore};
use variant_merge::{MergeConfig, MergeFailure, MergeLoader, MergePlan, MergeReport, WriteResult};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Study metadata JSON (study id, files with their samples, indexed files)
    #[arg(long)]
    study_metadata: PathBuf,

    /// Comma-separated ids of the files to merge
    #[arg(long, value_delimiter = ',', required = true)]
    files: Vec<u32>,

    /// Resume an interrupted merge
    #[arg(long)]
    resume: bool,

    /// Worker tasks
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Stage records per batch
    #[arg(long, default_value_t = 1000)]
    batch_size: usize,

    /// Genotype for samples of files with no call at a locus (e.g. "?/?")
    #[arg(long)]
    unknown_genotype: Option<String>,

    /// Do not store sample genotypes
    #[arg(long)]
    exclude_genotypes: bool,

    /// Treat overlapping loci independently
    #[arg(long)]
    ignore_overlapping: bool,

    /// Release number stamped on written variants
    #[arg(long, default_value_t = 1)]
    release: u32,

    /// Lookup timeout in milliseconds
    #[arg(long, default_value_t = 30_000)]
    fetch_timeout_ms: u64,

    /// Merge against an in-memory store loaded from --stage-json
    #[arg(long, requires = "stage_json")]
    dry_run: bool,

    /// Stage records as a JSON array (dry run only)
    #[arg(long)]
    stage_json: Option<PathBuf>,

    /// Database URL (or use DATABASE_URL_FILE env var)
    #[arg(long, env)]
    database_url: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "variant_merge=info".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn database_url(args: &Args) -> Result<String> {
    if let Some(url) = &args.database_url {
        Ok(url.clone())
    } else if let Ok(file_path) = std::env::var("DATABASE_URL_FILE") {
        Ok(std::fs::read_to_string(&file_path)
            .map_err(|e| anyhow::anyhow!("Failed to read DATABASE_URL_FILE: {}", e))?
            .trim()
            .to_string())
    } else {
        anyhow::bail!("DATABASE_URL or DATABASE_URL_FILE must be provided");
    }
}

async fn merge<S, P>(store: Arc<S>, plan: MergePlan, config: MergeConfig, source: P) -> Result<WriteResult, MergeFailure>
where
    S: VariantStore + 'static,
    P: StageSource + 'static,
{
    match MergeLoader::new(store, plan, config) {
        Ok(loader) => loader.run(source).await,
        Err(source) => Err(MergeFailure {
            source,
            partial: WriteResult::default(),
        }),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.log_json);

    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!("Variant merge {} starting...", run_id);

    let config = MergeConfig {
        batch_size: args.batch_size,
        threads: args.threads,
        resume: args.resume,
        ignore_overlapping: args.ignore_overlapping,
        exclude_genotypes: args.exclude_genotypes,
        unknown_genotype: args.unknown_genotype.clone(),
        fetch_timeout_ms: args.fetch_timeout_ms,
        release: args.release,
        ..Default::default()
    };
    config.validate()?;

    let study = load_study_metadata(&args.study_metadata)?;
    let study_id = study.study_id;
    let plan = MergePlan::new(study, args.files.clone(), &config)?;

    let outcome = if args.dry_run {
        let path = args.stage_json.as_deref().context("--dry-run requires --stage-json")?;
        let store = Arc::new(InMemoryStore::from_stage_json(path).context("Failed to load stage records")?);
        warn!("Dry run: merging into an in-memory store, nothing is persisted");
        let source = store.stage_source(study_id, config.batch_size);
        merge(store, plan, config, source).await
    } else {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections((args.threads as u32 + 1).max(5))
            .connect(&database_url(&args)?)
            .await
            .context("Failed to connect to PostgreSQL")?;
        info!("Connected to database");

        let store = Arc::new(PgVariantStore::new(pool));
        store.ensure_schema().await?;
        let source = store.stage_source(study_id, config.batch_size);
        merge(store, plan, config, source).await
    };

    let (result, error) = match outcome {
        Ok(result) => (result, None),
        Err(failure) => {
            error!("Merge failed: {}", failure.source);
            (failure.partial, Some(failure.source.to_string()))
        }
    };

    let report = MergeReport {
        run_id,
        study_id,
        file_ids: args.files.clone(),
        started_at,
        finished_at: Utc::now(),
        success: error.is_none(),
        error: error.clone(),
        result,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    match error {
        Some(message) => anyhow::bail!("Variant merge {} failed: {}", run_id, message),
        None => {
            info!("Variant merge {} completed successfully", run_id);
            Ok(())
        }
    }
}
