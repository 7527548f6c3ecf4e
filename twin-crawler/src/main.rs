use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use twin_crawler::collaborators::{
    BlobPersistence, FsBlobStore, HttpDigitalTwinRegistry, HttpSubmodelFacade, InMemoryBlobStore,
    http::build_client,
};
use twin_crawler::config::CrawlerConfig;
use twin_crawler::crawl::{GraphCrawlHandler, ItemTransferProcessManager, default_pipeline};
use twin_crawler::job::{BomLifecycle, InMemoryJobStore, JobParameters, JobStore};
use twin_crawler::logging::init_logging;
use twin_crawler::orchestrator::JobOrchestrator;
use twin_crawler::query::JobQueryService;

/// Interval between job state polls while waiting for the crawl to finish.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Global asset id of the item to start from
    root_item_id: String,

    /// Maximum depth of the crawled tree
    #[arg(short, long)]
    depth: Option<u32>,

    /// Comma separated aspect types to collect
    #[arg(short, long, value_delimiter = ',')]
    aspects: Vec<String>,

    /// Collect the aspects given with --aspects
    #[arg(long)]
    collect_aspects: bool,

    /// Bill of material lifecycle to follow (asBuilt or asPlanned)
    #[arg(short, long, value_parser = parse_lifecycle, default_value = "asBuilt")]
    lifecycle: BomLifecycle,

    /// Directory for the file blob store (overrides CRAWLER_BLOB_DIR)
    #[arg(long)]
    blob_dir: Option<PathBuf>,

    /// Print the partial result when the job does not complete
    #[arg(long)]
    include_partial: bool,
}

fn parse_lifecycle(raw: &str) -> Result<BomLifecycle, String> {
    BomLifecycle::parse(raw).ok_or_else(|| format!("unknown lifecycle '{raw}'"))
}

impl Args {
    fn parameters(&self) -> JobParameters {
        let mut params = JobParameters::for_root(&self.root_item_id)
            .with_collect_aspects(self.collect_aspects)
            .with_lifecycle(self.lifecycle);
        if let Some(depth) = self.depth {
            params = params.with_depth(depth);
        }
        if !self.aspects.is_empty() {
            params = params.with_aspects(&self.aspects);
        }
        params
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = CrawlerConfig::from_env().context("Failed to load configuration")?;
    if let Some(dir) = &args.blob_dir {
        config.blob_dir = Some(dir.clone());
    }

    let _log_guard = init_logging(config.log_filter.as_deref(), config.log_dir.as_deref())
        .context("Failed to initialize logging")?;

    let client = build_client(config.request_timeout())?;
    let registry = Arc::new(
        HttpDigitalTwinRegistry::new(client.clone(), &config.registry_url, config.retry.clone())
            .context("Failed to create registry client")?,
    );
    let submodels = Arc::new(HttpSubmodelFacade::new(client, config.retry.clone()));
    let blobs: Arc<dyn BlobPersistence> = match &config.blob_dir {
        Some(dir) => Arc::new(FsBlobStore::new(dir)),
        None => Arc::new(InMemoryBlobStore::new()),
    };

    let cancel = CancellationToken::new();
    let (completions_tx, completions_rx) = mpsc::unbounded_channel();
    let transfers = Arc::new(ItemTransferProcessManager::new(
        default_pipeline(registry, submodels),
        Arc::clone(&blobs),
        completions_tx,
        &config.transfers,
        cancel.clone(),
    ));
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::with_config(&config.store));
    let handler = Arc::new(GraphCrawlHandler::new(Arc::clone(&blobs)));
    let orchestrator = Arc::new(JobOrchestrator::with_config(
        Arc::clone(&store),
        handler,
        transfers,
        config.orchestrator.clone(),
    ));

    let completion_loop = tokio::spawn(
        Arc::clone(&orchestrator).run_completion_loop(completions_rx, cancel.clone()),
    );

    let response = orchestrator.start_job(args.parameters()).await?;
    info!(job_id = %response.job_id, status = %response.status, "Submitted crawl job");
    if !response.status.is_ok() {
        warn!(job_id = %response.job_id, "Not every root transfer could be started");
    }

    let started = response.status.is_ok();
    let job_id = response.job_id;
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!(job_id = %job_id, "Interrupted, stopping crawl");
                break;
            }
            _ = interval.tick() => {
                let job = store
                    .find(&job_id)?
                    .with_context(|| format!("Job {job_id} disappeared"))?;
                // A job whose fan-out failed before any transfer started never moves on.
                let stalled = !started && job.outstanding_transfer_ids.is_empty();
                if job.state.is_terminal() || stalled {
                    break;
                }
            }
        }
    }

    cancel.cancel();
    if let Err(e) = completion_loop.await {
        warn!(error = %e, "Completion loop ended abnormally");
    }

    let view = JobQueryService::new(store, blobs)
        .get_job(&job_id, args.include_partial)
        .await?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
