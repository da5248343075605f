//! Encoding job manager.
//!
//! Owns the job queue and drives jobs through the pipeline. Exactly one job
//! may occupy each of the three stage slots (build, encode, post-process) at
//! a time; each slot invocation gets its own cancellation token. Requests
//! arrive over the manager's queue, snapshot reads go straight through the
//! shared job list, and every observable change is published as an update.

use crate::engine::{EncodeProgress, EncodingEngine, EngineError};
use crate::job::{
    current_timestamp_ms, BuildingStep, EncodingJob, EncodingJobStatus, RemovedJobReason,
};
use crate::manager::{request_queue, RequestQueue, RequestStream};
use crate::protocol::message::{
    JobProcessingDataUpdate, JobProgressUpdate, JobQueueUpdate, JobQueueUpdateKind,
    JobStatusUpdate, UpdateMessage,
};
use crate::readiness::{self, wait_until_ready};
use crate::source_file::{path_key, translate_job_status, SourceFile, SourceFileEncodingStatus};
use crate::discovery::SourceFileRequest;
use encoda_config::{LimitsConfig, PostProcessingConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Seconds between retention sweeps.
const RETENTION_SWEEP_SECS: u64 = 3600;

/// A request handled by the encoding job manager.
#[derive(Debug)]
pub enum JobManagerRequest {
    /// Create a job for a source file. Post-processing settings are the
    /// directory's raw configuration; copy paths are rewritten here.
    CreateJob {
        source_file: SourceFile,
        post_processing: Option<PostProcessingConfig>,
    },
    /// Remove a job from the queue.
    RemoveJob {
        job_id: u64,
        reason: RemovedJobReason,
    },
    /// Cancel a job's current stage. Ignored unless the job is processing.
    CancelJob { job_id: u64 },
    /// Pause a job: immediate when idle, deferred while processing.
    PauseJob { job_id: u64 },
    /// Resume a paused job.
    ResumeJob { job_id: u64 },
    /// Cancel the current stage and pause the job.
    PauseCancelJob { job_id: u64 },
}

/// The pipeline stage a slot runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Build,
    Encode,
    PostProcess,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Build => write!(f, "build"),
            Stage::Encode => write!(f, "encode"),
            Stage::PostProcess => write!(f, "post_process"),
        }
    }
}

/// A stage slot's running invocation.
struct RunningStage {
    job_id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Shared job list, ordered by creation time (oldest first).
struct JobQueueState {
    jobs: RwLock<Vec<EncodingJob>>,
}

/// Cloneable handle for submitting requests and reading snapshots.
#[derive(Clone)]
pub struct EncodingJobManagerHandle {
    state: Arc<JobQueueState>,
    requests: RequestQueue<JobManagerRequest>,
    wake: Arc<Notify>,
}

impl EncodingJobManagerHandle {
    /// Snapshot of the queue, oldest first.
    pub async fn job_queue(&self) -> Vec<EncodingJob> {
        self.state.jobs.read().await.clone()
    }

    /// Status of the job created for a source path, if one exists.
    ///
    /// Paths are compared case-insensitively, matching how discovery keys
    /// files.
    pub async fn job_status_for_path(&self, path: &Path) -> Option<EncodingJobStatus> {
        let key = path_key(path);
        self.state
            .jobs
            .read()
            .await
            .iter()
            .find(|job| path_key(&job.source_path) == key)
            .map(|job| job.status)
    }

    /// Whether a job exists for the given source file.
    pub async fn exists_for_source(&self, source_file_id: Uuid) -> bool {
        self.state
            .jobs
            .read()
            .await
            .iter()
            .any(|job| job.source_file_id == source_file_id)
    }

    /// Enqueue a request. Returns `false` once the manager is shutting down.
    pub fn submit(&self, request: JobManagerRequest) -> bool {
        let accepted = self.requests.submit(request);
        if accepted {
            self.wake.notify_one();
        }
        accepted
    }

    /// Stop accepting requests.
    pub fn close(&self) {
        self.requests.close();
        self.wake.notify_one();
    }
}

/// The encoding job manager. Constructed with `new`, driven by `run`.
pub struct EncodingJobManager {
    state: Arc<JobQueueState>,
    requests: RequestStream<JobManagerRequest>,
    publisher: crate::protocol::UpdatePublisher,
    source_feedback: RequestQueue<SourceFileRequest>,
    limits: LimitsConfig,
    engine: Arc<dyn EncodingEngine>,
    shutdown: CancellationToken,
    wake: Arc<Notify>,
    build_slot: Option<RunningStage>,
    encode_slot: Option<RunningStage>,
    post_process_slot: Option<RunningStage>,
    next_job_id: u64,
    pub(crate) readiness_wait_secs: u64,
    pub(crate) readiness_attempts: u32,
    pub(crate) retention_sweep_secs: u64,
}

impl EncodingJobManager {
    pub fn new(
        limits: LimitsConfig,
        engine: Arc<dyn EncodingEngine>,
        publisher: crate::protocol::UpdatePublisher,
        source_feedback: RequestQueue<SourceFileRequest>,
        shutdown: CancellationToken,
    ) -> (Self, EncodingJobManagerHandle) {
        let state = Arc::new(JobQueueState {
            jobs: RwLock::new(Vec::new()),
        });
        let (queue, stream) = request_queue();
        let wake = Arc::new(Notify::new());

        let handle = EncodingJobManagerHandle {
            state: state.clone(),
            requests: queue,
            wake: wake.clone(),
        };

        let manager = Self {
            state,
            requests: stream,
            publisher,
            source_feedback,
            limits,
            engine,
            shutdown,
            wake,
            build_slot: None,
            encode_slot: None,
            post_process_slot: None,
            next_job_id: 1,
            readiness_wait_secs: readiness::DEFAULT_SAMPLE_WAIT_SECS,
            readiness_attempts: readiness::DEFAULT_MAX_ATTEMPTS,
            retention_sweep_secs: RETENTION_SWEEP_SECS,
        };

        (manager, handle)
    }

    /// Run the manager until shutdown.
    ///
    /// The retention arm is gated on a non-empty queue, so an idle manager
    /// sleeps on its wake sources alone. Stage completion is observed by
    /// awaiting the slot handles directly rather than polling them.
    pub async fn run(mut self) {
        let mut retention = tokio::time::interval(Duration::from_secs(self.retention_sweep_secs));
        retention.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let has_jobs = !self.state.jobs.read().await.is_empty();

            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                _ = self.wake.notified() => {}

                _ = retention.tick(), if has_jobs => {
                    self.sweep_expired_jobs().await;
                }

                _ = slot_done(&mut self.build_slot) => {}

                _ = slot_done(&mut self.encode_slot) => {}

                _ = slot_done(&mut self.post_process_slot) => {}

                request = self.requests.recv() => {
                    match request {
                        Some(request) => self.handle_request(request).await,
                        None => break,
                    }
                }
            }

            self.reap_finished_slots();
            self.dispatch_stages().await;
        }

        self.stop_running_stages().await;
        tracing::info!("encoding job manager stopped");
    }

    async fn handle_request(&mut self, request: JobManagerRequest) {
        match request {
            JobManagerRequest::CreateJob {
                source_file,
                post_processing,
            } => self.create_job(source_file, post_processing).await,
            JobManagerRequest::RemoveJob { job_id, reason } => {
                self.remove_job(job_id, reason).await;
            }
            JobManagerRequest::CancelJob { job_id } => self.cancel_job(job_id).await,
            JobManagerRequest::PauseJob { job_id } => self.pause_job(job_id).await,
            JobManagerRequest::ResumeJob { job_id } => self.resume_job(job_id).await,
            JobManagerRequest::PauseCancelJob { job_id } => self.pause_cancel_job(job_id).await,
        }
    }

    /// Create a job after the depth, duplicate, and readiness checks pass.
    async fn create_job(
        &mut self,
        source_file: SourceFile,
        post_processing: Option<PostProcessingConfig>,
    ) {
        {
            let jobs = self.state.jobs.read().await;
            if jobs.len() >= self.limits.max_jobs_in_queue as usize {
                tracing::warn!(
                    file = %source_file.path.display(),
                    depth = jobs.len(),
                    "queue is full; not creating job"
                );
                return;
            }
            if jobs.iter().any(|j| j.source_file_id == source_file.id) {
                tracing::debug!(
                    file = %source_file.path.display(),
                    "job already exists for source file"
                );
                return;
            }
        }

        if let Err(e) = wait_until_ready(
            &source_file.path,
            self.readiness_wait_secs,
            self.readiness_attempts,
        )
        .await
        {
            tracing::warn!(
                file = %source_file.path.display(),
                error = %e,
                "source file not ready; not creating job"
            );
            return;
        }

        let post_processing =
            post_processing.map(|pp| rewrite_copy_paths(&pp, &source_file));
        let job = EncodingJob::new(self.next_job_id, &source_file, post_processing);
        self.next_job_id += 1;

        tracing::info!(job_id = job.id, file = %source_file.path.display(), "job created");
        self.publisher
            .publish(UpdateMessage::EncodingJobQueue(JobQueueUpdate {
                kind: JobQueueUpdateKind::Add,
                job: job.clone(),
                removed_reason: None,
            }));
        self.send_source_feedback(job.source_file_id, translate_job_status(job.status));

        self.state.jobs.write().await.push(job);
    }

    /// Remove a job, cancelling its running stage first if needed.
    async fn remove_job(&mut self, job_id: u64, reason: RemovedJobReason) -> bool {
        self.cancel_slot_for(job_id);

        let removed = {
            let mut jobs = self.state.jobs.write().await;
            let index = jobs.iter().position(|j| j.id == job_id);
            index.map(|i| jobs.remove(i))
        };

        let Some(job) = removed else { return false };

        tracing::info!(job_id = %job_id, ?reason, "job removed");
        let status = if job.complete() {
            SourceFileEncodingStatus::Encoded
        } else {
            SourceFileEncodingStatus::NotEncoded
        };
        self.send_source_feedback(job.source_file_id, status);
        self.publisher
            .publish(UpdateMessage::EncodingJobQueue(JobQueueUpdate {
                kind: JobQueueUpdateKind::Remove,
                job,
                removed_reason: Some(reason),
            }));

        true
    }

    /// Cancel a job's current stage. Only accepted while processing.
    async fn cancel_job(&mut self, job_id: u64) {
        let mut jobs = self.state.jobs.write().await;
        let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) else {
            return;
        };
        if !job.is_processing() {
            tracing::debug!(job_id = %job_id, "cancel ignored; job is not processing");
            return;
        }

        job.mark_canceled();
        self.publisher
            .publish(UpdateMessage::EncodingJobStatus(JobStatusUpdate::from_job(
                job,
            )));
        drop(jobs);

        self.cancel_slot_for(job_id);
    }

    async fn pause_job(&mut self, job_id: u64) {
        let mut jobs = self.state.jobs.write().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.pause();
            tracing::info!(job_id = %job_id, deferred = job.to_be_paused, "pause requested");
            self.publisher
                .publish(UpdateMessage::EncodingJobStatus(JobStatusUpdate::from_job(
                    job,
                )));
        }
    }

    async fn resume_job(&mut self, job_id: u64) {
        let mut jobs = self.state.jobs.write().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.resume();
            tracing::info!(job_id = %job_id, "job resumed");
            self.publisher
                .publish(UpdateMessage::EncodingJobStatus(JobStatusUpdate::from_job(
                    job,
                )));
        }
    }

    async fn pause_cancel_job(&mut self, job_id: u64) {
        let mut jobs = self.state.jobs.write().await;
        let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) else {
            return;
        };

        if job.is_processing() {
            job.mark_canceled();
        }
        job.pause();
        self.publisher
            .publish(UpdateMessage::EncodingJobStatus(JobStatusUpdate::from_job(
                job,
            )));
        drop(jobs);

        self.cancel_slot_for(job_id);
    }

    /// Cancel whichever slot is running the given job.
    fn cancel_slot_for(&self, job_id: u64) {
        for slot in [&self.build_slot, &self.encode_slot, &self.post_process_slot]
            .into_iter()
            .flatten()
        {
            if slot.job_id == job_id {
                slot.cancel.cancel();
            }
        }
    }

    /// Clear slots whose stage task has finished.
    fn reap_finished_slots(&mut self) {
        for slot in [
            &mut self.build_slot,
            &mut self.encode_slot,
            &mut self.post_process_slot,
        ] {
            if slot.as_ref().is_some_and(|s| s.handle.is_finished()) {
                *slot = None;
            }
        }
    }

    /// Start a stage for the oldest eligible job wherever a slot is idle.
    async fn dispatch_stages(&mut self) {
        if self.build_slot.is_none() {
            if let Some(job_id) = self.claim_stage(Stage::Build).await {
                self.build_slot = Some(self.spawn_build(job_id).await);
            }
        }
        if self.encode_slot.is_none() {
            if let Some(job_id) = self.claim_stage(Stage::Encode).await {
                self.encode_slot = Some(self.spawn_encode(job_id).await);
            }
        }
        if self.post_process_slot.is_none() {
            if let Some(job_id) = self.claim_stage(Stage::PostProcess).await {
                self.post_process_slot = Some(self.spawn_post_process(job_id).await);
            }
        }
    }

    /// Pick the next job for a stage and advance its status.
    async fn claim_stage(&self, stage: Stage) -> Option<u64> {
        let mut jobs = self.state.jobs.write().await;
        let index = next_for_stage(&jobs, stage)?;
        let job = &mut jobs[index];

        job.status = match stage {
            Stage::Build => EncodingJobStatus::Building,
            Stage::Encode => EncodingJobStatus::Encoding,
            Stage::PostProcess => EncodingJobStatus::PostProcessing,
        };
        tracing::info!(job_id = %job.id, %stage, "stage started");
        self.publisher
            .publish(UpdateMessage::EncodingJobStatus(JobStatusUpdate::from_job(
                job,
            )));
        self.send_source_feedback(job.source_file_id, translate_job_status(job.status));

        Some(job.id)
    }

    async fn spawn_build(&self, job_id: u64) -> RunningStage {
        let cancel = CancellationToken::new();
        let state = self.state.clone();
        let publisher = self.publisher.clone();
        let feedback = self.source_feedback.clone();
        let engine = self.engine.clone();
        let task_cancel = cancel.clone();

        let (source, destination) = {
            let jobs = self.state.jobs.read().await;
            let job = jobs.iter().find(|j| j.id == job_id);
            match job {
                Some(job) => (job.source_path.clone(), job.destination_path.clone()),
                None => (Default::default(), Default::default()),
            }
        };

        let handle = tokio::spawn(async move {
            let blocking_state = state.clone();
            let blocking_publisher = publisher.clone();
            let result = tokio::task::spawn_blocking(move || {
                let step_fn = move |step: BuildingStep| {
                    let mut jobs = blocking_state.jobs.blocking_write();
                    if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
                        job.building_step = Some(step);
                        blocking_publisher.publish(UpdateMessage::EncodingJobStatus(
                            JobStatusUpdate::from_job(job),
                        ));
                    }
                };
                engine.build(&source, &destination, &step_fn, &task_cancel)
            })
            .await;

            let mut jobs = state.jobs.write().await;
            if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
                match result {
                    Ok(Ok(artifacts)) => {
                        job.stream_data = Some(artifacts.stream_data);
                        job.instructions = Some(artifacts.instructions);
                        job.command = Some(artifacts.command);
                        job.building_step = None;
                        job.status = EncodingJobStatus::Built;
                        tracing::info!(job_id = %job_id, "build finished");
                        publisher.publish(UpdateMessage::EncodingJobProcessingData(
                            JobProcessingDataUpdate {
                                job_id,
                                stream_data: job.stream_data.clone(),
                                instructions: job.instructions.clone(),
                                command: job.command.clone(),
                            },
                        ));
                    }
                    Ok(Err(EngineError::Canceled)) => {
                        tracing::info!(job_id = %job_id, "build canceled");
                        job.reset_status();
                    }
                    Ok(Err(e)) => {
                        tracing::error!(job_id = %job_id, error = %e, "build failed");
                        job.set_error(e.to_string());
                    }
                    Err(e) => {
                        tracing::error!(job_id = %job_id, error = %e, "build task panicked");
                        job.set_error(format!("build task failed: {}", e));
                    }
                }
                finish_stage(job, &publisher, &feedback);
            }
        });

        RunningStage {
            job_id,
            cancel,
            handle,
        }
    }

    async fn spawn_encode(&self, job_id: u64) -> RunningStage {
        let cancel = CancellationToken::new();
        let state = self.state.clone();
        let publisher = self.publisher.clone();
        let feedback = self.source_feedback.clone();
        let engine = self.engine.clone();
        let task_cancel = cancel.clone();

        let command = {
            let jobs = self.state.jobs.read().await;
            jobs.iter()
                .find(|j| j.id == job_id)
                .and_then(|j| j.command.clone())
        };

        let handle = tokio::spawn(async move {
            let result = match command {
                Some(command) => {
                    let blocking_state = state.clone();
                    let blocking_publisher = publisher.clone();
                    tokio::task::spawn_blocking(move || {
                        let progress_fn = move |progress: EncodeProgress| {
                            let mut jobs = blocking_state.jobs.blocking_write();
                            if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
                                job.update_encoding_progress(
                                    progress.percent,
                                    progress.fps,
                                    progress.estimated_seconds_remaining,
                                    progress.elapsed_seconds,
                                );
                                blocking_publisher.publish(
                                    UpdateMessage::EncodingJobEncodingProgress(
                                        JobProgressUpdate::from_job(job),
                                    ),
                                );
                            }
                        };
                        engine.encode(&command, &progress_fn, &task_cancel)
                    })
                    .await
                }
                None => Ok(Err(EngineError::Probe(
                    "job has no assembled command".to_string(),
                ))),
            };

            let mut jobs = state.jobs.write().await;
            if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
                match result {
                    Ok(Ok(())) => {
                        job.complete_encoding();
                        tracing::info!(job_id = %job_id, "encode finished");
                        publisher.publish(UpdateMessage::EncodingJobEncodingProgress(
                            JobProgressUpdate::from_job(job),
                        ));
                    }
                    Ok(Err(EngineError::Canceled)) => {
                        tracing::info!(job_id = %job_id, "encode canceled");
                        job.reset_status();
                    }
                    Ok(Err(e)) => {
                        tracing::error!(job_id = %job_id, error = %e, "encode failed");
                        job.set_error(e.to_string());
                    }
                    Err(e) => {
                        tracing::error!(job_id = %job_id, error = %e, "encode task panicked");
                        job.set_error(format!("encode task failed: {}", e));
                    }
                }
                finish_stage(job, &publisher, &feedback);
            }
        });

        RunningStage {
            job_id,
            cancel,
            handle,
        }
    }

    async fn spawn_post_process(&self, job_id: u64) -> RunningStage {
        let cancel = CancellationToken::new();
        let state = self.state.clone();
        let publisher = self.publisher.clone();
        let feedback = self.source_feedback.clone();
        let task_cancel = cancel.clone();

        let params = {
            let jobs = self.state.jobs.read().await;
            jobs.iter().find(|j| j.id == job_id).map(|j| {
                (
                    j.destination_path.clone(),
                    j.source_path.clone(),
                    j.post_processing.clone().unwrap_or_default(),
                )
            })
        };

        let handle = tokio::spawn(async move {
            let result = match params {
                Some((output, source, settings)) => {
                    tokio::task::spawn_blocking(move || {
                        crate::engine::run_post_processing(
                            &output,
                            &source,
                            &settings,
                            &task_cancel,
                        )
                    })
                    .await
                }
                None => return,
            };

            let mut jobs = state.jobs.write().await;
            if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
                match result {
                    Ok(Ok(())) => {
                        job.complete_post_processing();
                        tracing::info!(job_id = %job_id, "post-processing finished");
                    }
                    Ok(Err(EngineError::Canceled)) => {
                        tracing::info!(job_id = %job_id, "post-processing canceled");
                        job.reset_status();
                    }
                    Ok(Err(e)) => {
                        tracing::error!(job_id = %job_id, error = %e, "post-processing failed");
                        job.set_error(e.to_string());
                    }
                    Err(e) => {
                        tracing::error!(
                            job_id = %job_id,
                            error = %e,
                            "post-processing task panicked"
                        );
                        job.set_error(format!("post-processing task failed: {}", e));
                    }
                }
                finish_stage(job, &publisher, &feedback);
            }
        });

        RunningStage {
            job_id,
            cancel,
            handle,
        }
    }

    /// Remove completed and errored jobs that outlived their retention window.
    async fn sweep_expired_jobs(&mut self) {
        let expired = {
            let jobs = self.state.jobs.read().await;
            expired_jobs(&jobs, current_timestamp_ms(), &self.limits)
        };

        for (job_id, reason) in expired {
            self.remove_job(job_id, reason).await;
        }
    }

    fn send_source_feedback(&self, source_file_id: Uuid, status: SourceFileEncodingStatus) {
        self.source_feedback.submit(SourceFileRequest::UpdateEncodingStatus {
            source_file_id,
            status,
        });
    }

    /// Cancel running stages and wait for them to wind down.
    async fn stop_running_stages(&mut self) {
        for slot in [
            self.build_slot.take(),
            self.encode_slot.take(),
            self.post_process_slot.take(),
        ]
        .into_iter()
        .flatten()
        {
            slot.cancel.cancel();
            let _ = slot.handle.await;
        }
    }
}

/// Resolves when the slot's stage task finishes. An idle slot pends forever,
/// leaving the other select arms in charge.
async fn slot_done(slot: &mut Option<RunningStage>) {
    match slot {
        Some(stage) => {
            let _ = (&mut stage.handle).await;
        }
        None => std::future::pending().await,
    }
}

/// Stage-completion bookkeeping shared by all three stages.
fn finish_stage(
    job: &mut EncodingJob,
    publisher: &crate::protocol::UpdatePublisher,
    feedback: &RequestQueue<SourceFileRequest>,
) {
    job.cleanup();
    publisher.publish(UpdateMessage::EncodingJobStatus(JobStatusUpdate::from_job(
        job,
    )));
    feedback.submit(SourceFileRequest::UpdateEncodingStatus {
        source_file_id: job.source_file_id,
        status: translate_job_status(job.status),
    });
}

/// Index of the oldest job eligible for a stage.
///
/// The job list is ordered by creation, so the first match is the oldest.
fn next_for_stage(jobs: &[EncodingJob], stage: Stage) -> Option<usize> {
    jobs.iter().position(|job| {
        if job.paused || job.to_be_paused || job.has_error || job.canceled {
            return false;
        }
        match stage {
            Stage::Build => job.status == EncodingJobStatus::New,
            Stage::Encode => job.status == EncodingJobStatus::Built,
            Stage::PostProcess => {
                job.status == EncodingJobStatus::Encoded && job.needs_post_processing()
            }
        }
    })
}

/// Jobs whose retention window has elapsed, with the matching removal reason.
fn expired_jobs(
    jobs: &[EncodingJob],
    now_ms: i64,
    limits: &LimitsConfig,
) -> Vec<(u64, RemovedJobReason)> {
    let completed_window = hours_to_ms(limits.hours_completed_until_removal);
    let errored_window = hours_to_ms(limits.hours_errored_until_removal);

    jobs.iter()
        .filter_map(|job| {
            if job.complete() {
                job.completed_time()
                    .filter(|t| now_ms - t >= completed_window)
                    .map(|_| (job.id, RemovedJobReason::Completed))
            } else if job.has_error {
                job.error_time
                    .filter(|t| now_ms - t >= errored_window)
                    .map(|_| (job.id, RemovedJobReason::Errored))
            } else {
                None
            }
        })
        .collect()
}

fn hours_to_ms(hours: u32) -> i64 {
    i64::from(hours) * 3_600_000
}

/// Rewrite post-processing copy roots into full file paths by appending the
/// source file's sub-path under its search directory.
fn rewrite_copy_paths(
    settings: &PostProcessingConfig,
    source_file: &SourceFile,
) -> PostProcessingConfig {
    let sub_path = source_file.sub_path();
    PostProcessingConfig {
        copy_file_paths: settings
            .copy_file_paths
            .iter()
            .map(|root| root.join(&sub_path))
            .collect(),
        delete_source_file: settings.delete_source_file,
    }
}
