//! Integration tests for job orchestration.
//!
//! The orchestrator tests drive completions by hand through a scripted
//! handler and a transfer manager that only records what it was asked to
//! start. The crawl tests wire the real handler, pipeline and transfer
//! manager to in-process registry and submodel stubs.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

use twin_crawler::collaborators::{DigitalTwinRegistry, InMemoryBlobStore, SubmodelFacade};
use twin_crawler::crawl::{GraphCrawlHandler, ItemTransferProcessManager, TransferConfig, default_pipeline};
use twin_crawler::domain::{ShellDescriptor, SubmodelDescriptor};
use twin_crawler::job::{InMemoryJobStore, JobParameters, JobState, JobStore, MultiTransferJob, TransferProcess};
use twin_crawler::orchestrator::{
    HANDLER_FAILED, JobOrchestrator, OnStarted, OrchestratorConfig, RecursiveJobHandler,
    ResponseStatus, START_FAILED, TransferInitiateResponse, TransferProcessManager,
    TransferRequest,
};
use twin_crawler::query::JobQueryService;
use twin_crawler::{Error, Result, TransportError};

/// Transfer manager that records started transfers without running them.
#[derive(Default)]
struct ManualTransfers {
    started: Mutex<Vec<(String, TransferRequest)>>,
    attempts: AtomicUsize,
    /// Start attempt (0-based) that is refused.
    refuse_attempt: Option<usize>,
}

impl ManualTransfers {
    fn refusing(attempt: usize) -> Self {
        Self {
            refuse_attempt: Some(attempt),
            ..Default::default()
        }
    }

    fn started(&self) -> Vec<(String, TransferRequest)> {
        self.started.lock().clone()
    }

    /// Completion payload of the `index`-th started transfer.
    fn completion(&self, index: usize) -> TransferProcess {
        let (id, request) = self.started.lock()[index].clone();
        TransferProcess::new(id, request.item_id, request.depth)
    }
}

impl TransferProcessManager for ManualTransfers {
    fn initiate(
        &self,
        request: TransferRequest,
        on_started: OnStarted<'_>,
    ) -> Result<TransferInitiateResponse> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse_attempt == Some(attempt) {
            return Ok(TransferInitiateResponse::rejected(ResponseStatus::NotStarted));
        }
        let transfer_id = format!("transfer-{attempt}");
        on_started(&transfer_id)?;
        self.started.lock().push((transfer_id.clone(), request));
        Ok(TransferInitiateResponse::started(transfer_id))
    }
}

/// Handler following a fixed item tree.
#[derive(Default)]
struct ScriptedHandler {
    roots: Vec<String>,
    children: HashMap<String, Vec<String>>,
    fail_recurse: bool,
    fail_complete: bool,
    recurse_calls: AtomicUsize,
    complete_calls: AtomicUsize,
}

impl ScriptedHandler {
    fn with_roots(roots: &[&str]) -> Self {
        Self {
            roots: roots.iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        }
    }

    fn child(mut self, parent: &str, child: &str) -> Self {
        self.children
            .entry(parent.to_string())
            .or_default()
            .push(child.to_string());
        self
    }
}

#[async_trait]
impl RecursiveJobHandler for ScriptedHandler {
    async fn initiate(&self, job: &MultiTransferJob) -> Result<Vec<TransferRequest>> {
        Ok(self
            .roots
            .iter()
            .map(|root| TransferRequest::new(job.id.clone(), root.clone(), 0, job.parameters.clone()))
            .collect())
    }

    async fn recurse(
        &self,
        job: &MultiTransferJob,
        transfer: &TransferProcess,
    ) -> Result<Vec<TransferRequest>> {
        self.recurse_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_recurse {
            return Err(Error::handler("cannot expand"));
        }
        Ok(self
            .children
            .get(&transfer.item_id)
            .into_iter()
            .flatten()
            .map(|child| {
                TransferRequest::new(
                    job.id.clone(),
                    child.clone(),
                    transfer.depth + 1,
                    job.parameters.clone(),
                )
            })
            .collect())
    }

    async fn complete(&self, _job: &MultiTransferJob) -> Result<()> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_complete {
            return Err(Error::handler("cannot assemble"));
        }
        Ok(())
    }
}

struct Harness {
    orchestrator: JobOrchestrator,
    store: Arc<InMemoryJobStore>,
    handler: Arc<ScriptedHandler>,
    transfers: Arc<ManualTransfers>,
}

impl Harness {
    fn new(handler: ScriptedHandler, transfers: ManualTransfers) -> Self {
        Self::with_config(handler, transfers, OrchestratorConfig::default())
    }

    fn with_config(
        handler: ScriptedHandler,
        transfers: ManualTransfers,
        config: OrchestratorConfig,
    ) -> Self {
        let store = Arc::new(InMemoryJobStore::new());
        let handler = Arc::new(handler);
        let transfers = Arc::new(transfers);
        let orchestrator = JobOrchestrator::with_config(
            store.clone(),
            handler.clone(),
            transfers.clone(),
            config,
        );
        Self {
            orchestrator,
            store,
            handler,
            transfers,
        }
    }

    fn job(&self, job_id: &str) -> MultiTransferJob {
        self.store.find(job_id).unwrap().unwrap()
    }
}

fn params() -> JobParameters {
    JobParameters::for_root("X")
}

fn assert_disjoint(job: &MultiTransferJob) {
    for transfer in &job.completed_transfers {
        assert!(
            !job.outstanding_transfer_ids.contains(&transfer.transfer_id),
            "{} is both outstanding and completed",
            transfer.transfer_id
        );
    }
}

mod orchestrator_tests {
    use super::*;

    #[tokio::test]
    async fn test_single_transfer_completes_job() {
        let h = Harness::new(ScriptedHandler::with_roots(&["X"]), ManualTransfers::default());

        let response = h.orchestrator.start_job(params()).await.unwrap();
        assert_eq!(response.status, ResponseStatus::Ok);
        assert_eq!(h.job(&response.job_id).state, JobState::InProgress);

        h.orchestrator
            .transfer_completed(h.transfers.completion(0))
            .await
            .unwrap();

        let job = h.job(&response.job_id);
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.completed_transfers.len(), 1);
        assert!(job.outstanding_transfer_ids.is_empty());
        assert_eq!(h.handler.complete_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_initial_requests_completes_immediately() {
        let h = Harness::new(ScriptedHandler::default(), ManualTransfers::default());
        let response = h.orchestrator.start_job(params()).await.unwrap();
        assert_eq!(response.status, ResponseStatus::Ok);
        assert_eq!(h.job(&response.job_id).state, JobState::Completed);
        assert_eq!(h.handler.complete_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_initial_start_failure_returns_status() {
        let h = Harness::new(
            ScriptedHandler::with_roots(&["A", "B"]),
            ManualTransfers::refusing(1),
        );

        let response = h.orchestrator.start_job(params()).await.unwrap();
        assert_eq!(response.status, ResponseStatus::NotStarted);

        let job = h.job(&response.job_id);
        assert_eq!(job.state, JobState::InProgress);
        assert_eq!(job.outstanding_transfer_ids.len(), 1);
        assert!(job.error_detail.is_none());

        // The transfer that did start still drives the job to the end.
        h.orchestrator
            .transfer_completed(h.transfers.completion(0))
            .await
            .unwrap();
        assert_eq!(h.job(&response.job_id).state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_initial_start_failure_can_fail_job() {
        let h = Harness::with_config(
            ScriptedHandler::with_roots(&["A", "B"]),
            ManualTransfers::refusing(1),
            OrchestratorConfig {
                error_on_initial_start_failure: true,
            },
        );

        let response = h.orchestrator.start_job(params()).await.unwrap();
        assert_eq!(response.status, ResponseStatus::NotStarted);
        let job = h.job(&response.job_id);
        assert_eq!(job.state, JobState::Error);
        assert_eq!(job.error_detail.as_deref(), Some(START_FAILED));

        // Late completion of the started transfer is recorded, not expanded.
        let late = h.transfers.completion(0);
        h.orchestrator.transfer_completed(late.clone()).await.unwrap();
        assert_eq!(h.handler.recurse_calls.load(Ordering::SeqCst), 0);

        let job = h.job(&response.job_id);
        assert_eq!(job.state, JobState::Error);
        assert!(job.outstanding_transfer_ids.is_empty());
        assert!(job.is_transfer_completed(&late.transfer_id));
        assert!(h.store.find_by_transfer_id(&late.transfer_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recurse_failure_marks_error_without_follow_ups() {
        let mut handler = ScriptedHandler::with_roots(&["X"]).child("X", "Y");
        handler.fail_recurse = true;
        let h = Harness::new(handler, ManualTransfers::default());

        let response = h.orchestrator.start_job(params()).await.unwrap();
        h.orchestrator
            .transfer_completed(h.transfers.completion(0))
            .await
            .unwrap();

        let job = h.job(&response.job_id);
        assert_eq!(job.state, JobState::Error);
        assert_eq!(job.error_detail.as_deref(), Some(HANDLER_FAILED));
        assert_eq!(h.transfers.started().len(), 1);
        assert_eq!(h.handler.complete_calls.load(Ordering::SeqCst), 0);
        assert!(job.outstanding_transfer_ids.is_empty());
        assert_eq!(job.completed_transfers.len(), 1);
    }

    #[tokio::test]
    async fn test_follow_up_start_failure_marks_error() {
        let h = Harness::new(
            ScriptedHandler::with_roots(&["X"]).child("X", "Y").child("X", "Z"),
            ManualTransfers::refusing(2),
        );

        let response = h.orchestrator.start_job(params()).await.unwrap();
        h.orchestrator
            .transfer_completed(h.transfers.completion(0))
            .await
            .unwrap();

        let job = h.job(&response.job_id);
        assert_eq!(job.state, JobState::Error);
        assert_eq!(job.error_detail.as_deref(), Some(START_FAILED));
        // The follow-up that did start keeps running but is dropped later.
        assert_eq!(h.transfers.started().len(), 2);
        h.orchestrator
            .transfer_completed(h.transfers.completion(1))
            .await
            .unwrap();
        assert_eq!(h.handler.recurse_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_complete_failure_marks_error() {
        let mut handler = ScriptedHandler::with_roots(&["X"]);
        handler.fail_complete = true;
        let h = Harness::new(handler, ManualTransfers::default());

        let response = h.orchestrator.start_job(params()).await.unwrap();
        h.orchestrator
            .transfer_completed(h.transfers.completion(0))
            .await
            .unwrap();

        let job = h.job(&response.job_id);
        assert_eq!(job.state, JobState::Error);
        assert_eq!(job.error_detail.as_deref(), Some(HANDLER_FAILED));
        assert!(job.outstanding_transfer_ids.is_empty());
    }

    #[tokio::test]
    async fn test_recursion_keeps_job_running_until_leaves_finish() {
        let h = Harness::new(
            ScriptedHandler::with_roots(&["X"]).child("X", "Y").child("Y", "Z"),
            ManualTransfers::default(),
        );
        let response = h.orchestrator.start_job(params()).await.unwrap();

        for index in 0..3 {
            assert_eq!(h.job(&response.job_id).state, JobState::InProgress);
            h.orchestrator
                .transfer_completed(h.transfers.completion(index))
                .await
                .unwrap();
            assert_disjoint(&h.job(&response.job_id));
        }

        let job = h.job(&response.job_id);
        assert_eq!(job.state, JobState::Completed);
        let items: Vec<_> = job
            .completed_transfers
            .iter()
            .map(|t| t.item_id.as_str())
            .collect();
        assert_eq!(items, ["X", "Y", "Z"]);
        assert_eq!(job.completed_transfers[2].depth, 2);
    }

    #[tokio::test]
    async fn test_duplicate_completion_is_ignored() {
        let h = Harness::new(ScriptedHandler::with_roots(&["A", "B"]), ManualTransfers::default());
        let response = h.orchestrator.start_job(params()).await.unwrap();

        let first = h.transfers.completion(0);
        h.orchestrator.transfer_completed(first.clone()).await.unwrap();
        let before = h.job(&response.job_id);

        h.orchestrator.transfer_completed(first.clone()).await.unwrap();
        let after = h.job(&response.job_id);
        assert_eq!(before, after);
        assert_eq!(h.handler.recurse_calls.load(Ordering::SeqCst), 1);

        h.orchestrator
            .transfer_completed(h.transfers.completion(1))
            .await
            .unwrap();
        let done = h.job(&response.job_id);
        assert_eq!(done.state, JobState::Completed);

        // Late duplicate after the job is terminal.
        h.orchestrator.transfer_completed(first).await.unwrap();
        assert_eq!(h.job(&response.job_id), done);
        assert_eq!(h.handler.recurse_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.handler.complete_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_transfer_is_ignored() {
        let h = Harness::new(ScriptedHandler::with_roots(&["X"]), ManualTransfers::default());
        h.orchestrator
            .transfer_completed(TransferProcess::new("nobody", "X", 0))
            .await
            .unwrap();
        assert_eq!(h.handler.recurse_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_completion_order_does_not_matter() {
        let mut finals = Vec::new();
        for order in [[0usize, 1], [1, 0]] {
            let h = Harness::new(
                ScriptedHandler::with_roots(&["A", "B"]),
                ManualTransfers::default(),
            );
            let response = h.orchestrator.start_job(params()).await.unwrap();
            for index in order {
                h.orchestrator
                    .transfer_completed(h.transfers.completion(index))
                    .await
                    .unwrap();
            }

            let job = h.job(&response.job_id);
            let mut completed: Vec<_> = job
                .completed_transfers
                .iter()
                .map(|t| t.transfer_id.clone())
                .collect();
            completed.sort();
            finals.push((job.state, job.outstanding_transfer_ids.len(), completed));
        }
        assert_eq!(finals[0], finals[1]);
        assert_eq!(finals[0].0, JobState::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_completions_finish_job_once() {
        let roots: Vec<String> = (0..32).map(|i| format!("item-{i}")).collect();
        let root_refs: Vec<&str> = roots.iter().map(String::as_str).collect();
        let h = Arc::new(Harness::new(
            ScriptedHandler::with_roots(&root_refs),
            ManualTransfers::default(),
        ));
        let response = h.orchestrator.start_job(params()).await.unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for index in 0..32 {
            let h = Arc::clone(&h);
            tasks.spawn(async move {
                let completion = h.transfers.completion(index);
                // Every completion is delivered twice.
                h.orchestrator.transfer_completed(completion.clone()).await.unwrap();
                h.orchestrator.transfer_completed(completion).await.unwrap();
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap();
        }

        let job = h.job(&response.job_id);
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.completed_transfers.len(), 32);
        assert_eq!(h.handler.complete_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.handler.recurse_calls.load(Ordering::SeqCst), 32);
    }
}

/// Handler whose expansion of `A` waits for the test to release it and
/// whose expansion of `B` fails.
#[derive(Default)]
struct GatedHandler {
    entered: Notify,
    release: Notify,
    abandoned: AtomicUsize,
}

#[async_trait]
impl RecursiveJobHandler for GatedHandler {
    async fn initiate(&self, job: &MultiTransferJob) -> Result<Vec<TransferRequest>> {
        Ok(["A", "B"]
            .into_iter()
            .map(|item| TransferRequest::new(job.id.clone(), item, 0, job.parameters.clone()))
            .collect())
    }

    async fn recurse(
        &self,
        job: &MultiTransferJob,
        transfer: &TransferProcess,
    ) -> Result<Vec<TransferRequest>> {
        if transfer.item_id == "B" {
            return Err(Error::handler("cannot expand"));
        }
        self.entered.notify_one();
        self.release.notified().await;
        Ok(vec![TransferRequest::new(job.id.clone(), "C", 1, job.parameters.clone())])
    }

    async fn complete(&self, _job: &MultiTransferJob) -> Result<()> {
        Ok(())
    }

    fn abandon(&self, _job_id: &str) {
        self.abandoned.fetch_add(1, Ordering::SeqCst);
    }
}

mod failure_race_tests {
    use super::*;

    #[tokio::test]
    async fn test_job_failing_during_expansion_is_abandoned_again() {
        let store = Arc::new(InMemoryJobStore::new());
        let handler = Arc::new(GatedHandler::default());
        let transfers = Arc::new(ManualTransfers::default());
        let orchestrator = Arc::new(JobOrchestrator::new(
            store.clone(),
            handler.clone(),
            transfers.clone(),
        ));
        let response = orchestrator.start_job(params()).await.unwrap();

        let expanding = {
            let orchestrator = Arc::clone(&orchestrator);
            let completion = transfers.completion(0);
            tokio::spawn(async move { orchestrator.transfer_completed(completion).await })
        };
        handler.entered.notified().await;

        // B fails the job while A is still being expanded.
        orchestrator
            .transfer_completed(transfers.completion(1))
            .await
            .unwrap();
        assert_eq!(store.find(&response.job_id).unwrap().unwrap().state, JobState::Error);
        assert_eq!(handler.abandoned.load(Ordering::SeqCst), 1);

        handler.release.notify_one();
        expanding.await.unwrap().unwrap();

        let job = store.find(&response.job_id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Error);
        assert_eq!(job.error_detail.as_deref(), Some(HANDLER_FAILED));
        assert!(job.outstanding_transfer_ids.is_empty());
        assert_eq!(job.completed_transfers.len(), 2);
        assert_eq!(handler.abandoned.load(Ordering::SeqCst), 2);

        // The follow-up started for A never joined the failed job.
        let (follow_up, _) = transfers.started()[2].clone();
        assert!(store.find_by_transfer_id(&follow_up).unwrap().is_none());
    }
}

mod crawl_tests {
    use super::*;

    const BOM: &str = "urn:samm:io.catenax.single_level_bom_as_built:3.0.0#SingleLevelBomAsBuilt";

    #[derive(Default)]
    struct Network {
        shells: HashMap<String, ShellDescriptor>,
        payloads: HashMap<String, Value>,
    }

    impl Network {
        /// Register `item` with one BOM endpoint listing `children`.
        fn item(mut self, item: &str, children: &[&str]) -> Self {
            let href = format!("http://edc/{item}/bom");
            let child_items: Vec<Value> = children.iter().map(|c| json!({"catenaXId": c})).collect();
            self.payloads
                .insert(href.clone(), json!({"catenaXId": item, "childItems": child_items}));
            self.shells.insert(
                item.to_string(),
                ShellDescriptor {
                    id: format!("shell-{item}"),
                    global_asset_id: Some(item.to_string()),
                    id_short: None,
                    submodel_descriptors: vec![SubmodelDescriptor::new(format!("{item}-bom"), BOM, href)],
                },
            );
            self
        }

        /// Add a second BOM endpoint to `item` that always fails.
        fn failing_bom(mut self, item: &str) -> Self {
            if let Some(shell) = self.shells.get_mut(item) {
                shell.submodel_descriptors.push(SubmodelDescriptor::new(
                    format!("{item}-bom-broken"),
                    BOM,
                    format!("http://edc/{item}/bom-broken"),
                ));
            }
            self
        }
    }

    struct StubRegistry(HashMap<String, ShellDescriptor>);

    #[async_trait]
    impl DigitalTwinRegistry for StubRegistry {
        async fn resolve(&self, item_id: &str) -> Result<ShellDescriptor> {
            self.0
                .get(item_id)
                .cloned()
                .ok_or_else(|| TransportError::new("http://registry", "no twin", 1).into())
        }
    }

    struct StubSubmodels(HashMap<String, Value>);

    #[async_trait]
    impl SubmodelFacade for StubSubmodels {
        async fn fetch(&self, endpoint: &str) -> Result<Value> {
            self.0
                .get(endpoint)
                .cloned()
                .ok_or_else(|| TransportError::new(endpoint, "HTTP 502", 3).into())
        }
    }

    struct Crawler {
        orchestrator: Arc<JobOrchestrator>,
        query: JobQueryService,
        store: Arc<InMemoryJobStore>,
        cancel: CancellationToken,
    }

    fn crawler(network: Network) -> Crawler {
        let store = Arc::new(InMemoryJobStore::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let pipeline = default_pipeline(
            Arc::new(StubRegistry(network.shells)),
            Arc::new(StubSubmodels(network.payloads)),
        );
        let transfers = Arc::new(ItemTransferProcessManager::new(
            pipeline,
            blobs.clone(),
            tx,
            &TransferConfig::default(),
            cancel.clone(),
        ));
        let orchestrator = Arc::new(JobOrchestrator::new(
            store.clone(),
            Arc::new(GraphCrawlHandler::new(blobs.clone())),
            transfers,
        ));
        tokio::spawn(Arc::clone(&orchestrator).run_completion_loop(rx, cancel.clone()));

        Crawler {
            orchestrator,
            query: JobQueryService::new(store.clone(), blobs),
            store,
            cancel,
        }
    }

    impl Crawler {
        async fn run(&self, params: JobParameters) -> MultiTransferJob {
            let response = self.orchestrator.start_job(params).await.unwrap();
            assert_eq!(response.status, ResponseStatus::Ok);
            let job = tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    let job = self.store.find(&response.job_id).unwrap().unwrap();
                    if job.state.is_terminal() {
                        return job;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("job did not finish in time");
            self.cancel.cancel();
            job
        }
    }

    #[tokio::test]
    async fn test_leaf_root_completes_without_tombstones() {
        let crawler = crawler(Network::default().item("X", &[]));
        let job = crawler.run(JobParameters::for_root("X")).await;

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.completed_transfers.len(), 1);

        let view = crawler.query.get_job(&job.id, false).await.unwrap();
        let result = view.result.unwrap();
        assert_eq!(result.shells.len(), 1);
        assert!(result.tombstones.is_empty());
        assert_eq!(view.summary.tombstones, 0);
    }

    #[tokio::test]
    async fn test_failing_endpoint_leaves_one_tombstone() {
        let crawler = crawler(
            Network::default()
                .item("X", &["Y"])
                .failing_bom("X")
                .item("Y", &[]),
        );
        let job = crawler.run(JobParameters::for_root("X")).await;
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.completed_transfers.len(), 2);

        let result = crawler.query.get_job(&job.id, false).await.unwrap().result.unwrap();
        assert_eq!(result.relationships.len(), 1);
        assert_eq!(result.relationships[0].linked_item.child_catena_x_id, "Y");
        assert_eq!(result.tombstones.len(), 1);
        assert_eq!(
            result.tombstones[0].endpoint_url.as_deref(),
            Some("http://edc/X/bom-broken")
        );
        assert_eq!(result.tombstones[0].processing_error.retry_counter, 3);
    }

    #[tokio::test]
    async fn test_depth_limit_and_shared_children() {
        // X -> A, B; A -> C; B -> C; C -> D
        let crawler = crawler(
            Network::default()
                .item("X", &["A", "B"])
                .item("A", &["C"])
                .item("B", &["C"])
                .item("C", &["D"])
                .item("D", &[]),
        );
        let job = crawler.run(JobParameters::for_root("X").with_depth(2)).await;
        assert_eq!(job.state, JobState::Completed);

        let mut crawled: Vec<_> = job
            .completed_transfers
            .iter()
            .map(|t| t.item_id.clone())
            .collect();
        crawled.sort();
        assert_eq!(crawled, ["A", "B", "C", "X"]);

        let result = crawler.query.get_job(&job.id, false).await.unwrap().result.unwrap();
        // C is crawled once at the depth limit; its edge to D is kept.
        assert_eq!(result.relationships.len(), 5);
        assert_eq!(result.shells.len(), 4);
    }

    #[tokio::test]
    async fn test_unknown_root_is_tombstoned() {
        let crawler = crawler(Network::default());
        let job = crawler.run(JobParameters::for_root("ghost")).await;
        assert_eq!(job.state, JobState::Completed);

        let result = crawler.query.get_job(&job.id, false).await.unwrap().result.unwrap();
        assert!(result.shells.is_empty());
        assert_eq!(result.tombstones.len(), 1);
        assert_eq!(result.tombstones[0].catena_x_id, "ghost");
    }

    #[tokio::test]
    async fn test_missing_root_parameter_fails_job() {
        let crawler = crawler(Network::default());
        let response = crawler
            .orchestrator
            .start_job(JobParameters::new())
            .await
            .unwrap();
        assert_eq!(response.status, ResponseStatus::FatalError);

        let view = crawler.query.get_job(&response.job_id, true).await.unwrap();
        assert_eq!(view.job.state, JobState::Error);
        assert_eq!(view.job.error_detail.as_deref(), Some(HANDLER_FAILED));
    }
}
