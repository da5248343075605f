//! Source file manager.
//!
//! Periodically scans every configured search directory, diffs the results
//! against the known source files, and publishes the changes as one batch.
//! While a diff is being applied a gate closes; snapshot requests wait for
//! the gate to reopen (bounded) so clients never observe a half-applied
//! rebuild. Automated directories get encoding jobs queued for every
//! unencoded file found.

use crate::manager::{RequestQueue, RequestStream};
use crate::protocol::message::{
    SourceFileUpdateItem, SourceFileUpdateKind, UpdateMessage,
};
use crate::protocol::UpdatePublisher;
use crate::scan::{scan_directory, DirectoryScan};
use crate::scheduler::{EncodingJobManagerHandle, JobManagerRequest};
use crate::source_file::{path_key, translate_job_status, SourceFile, SourceFileEncodingStatus};
use encoda_config::{DiscoveryConfig, SearchDirectoryConfig};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Directories scanned concurrently per cycle.
const MAX_CONCURRENT_SCANS: usize = 4;

/// Longest a snapshot request waits for an in-flight rebuild.
const SNAPSHOT_GATE_WAIT_SECS: u64 = 45;

/// A request handled by the source file manager.
#[derive(Debug)]
pub enum SourceFileRequest {
    /// The job pipeline reports a source file's encoding status.
    UpdateEncodingStatus {
        source_file_id: Uuid,
        status: SourceFileEncodingStatus,
    },
}

struct SourceFileState {
    files: RwLock<HashMap<Uuid, SourceFile>>,
}

/// Cloneable handle for snapshots and encode requests.
#[derive(Clone)]
pub struct SourceFileManagerHandle {
    state: Arc<SourceFileState>,
    directories: Arc<HashMap<String, SearchDirectoryConfig>>,
    jobs: EncodingJobManagerHandle,
    gate: watch::Receiver<bool>,
}

impl SourceFileManagerHandle {
    /// Snapshot of known source files, grouped by search directory name.
    ///
    /// Waits for an in-flight rebuild to finish, bounded by
    /// `SNAPSHOT_GATE_WAIT_SECS`; after that the current state is returned
    /// as-is.
    pub async fn source_files(&self) -> HashMap<String, Vec<SourceFile>> {
        let mut gate = self.gate.clone();
        let _ = tokio::time::timeout(
            Duration::from_secs(SNAPSHOT_GATE_WAIT_SECS),
            gate.wait_for(|open| *open),
        )
        .await;

        let files = self.state.files.read().await;
        let mut grouped: HashMap<String, Vec<SourceFile>> = HashMap::new();
        for file in files.values() {
            grouped
                .entry(file.search_directory.clone())
                .or_default()
                .push(file.clone());
        }
        for group in grouped.values_mut() {
            group.sort_by(|a, b| a.path.cmp(&b.path));
        }
        grouped
    }

    /// Queue an encoding job for a source file.
    ///
    /// `None` when the source file is unknown; otherwise whether the job
    /// manager accepted the request.
    pub async fn request_encode(&self, source_file_id: Uuid) -> Option<bool> {
        let file = {
            let files = self.state.files.read().await;
            files.get(&source_file_id).cloned()
        }?;

        let post_processing = self
            .directories
            .get(&file.search_directory)
            .and_then(|dir| dir.post_processing.clone());

        Some(self.jobs.submit(JobManagerRequest::CreateJob {
            source_file: file,
            post_processing,
        }))
    }

    /// Queue encoding jobs for several source files.
    ///
    /// Returns the names of the files that could not be queued.
    pub async fn request_bulk_encode(&self, source_file_ids: &[Uuid]) -> Vec<String> {
        let mut failed = Vec::new();
        for id in source_file_ids {
            let name = {
                let files = self.state.files.read().await;
                files.get(id).map(|f| f.file_name())
            };
            match self.request_encode(*id).await {
                Some(true) => {}
                Some(false) | None => {
                    failed.push(name.unwrap_or_else(|| id.to_string()));
                }
            }
        }
        failed
    }
}

/// The source file manager. Constructed with `new`, driven by `run`.
pub struct SourceFileManager {
    state: Arc<SourceFileState>,
    directories: Arc<HashMap<String, SearchDirectoryConfig>>,
    discovery: DiscoveryConfig,
    requests: RequestStream<SourceFileRequest>,
    publisher: UpdatePublisher,
    jobs: EncodingJobManagerHandle,
    gate: watch::Sender<bool>,
    shutdown: CancellationToken,
}

impl SourceFileManager {
    pub fn new(
        directories: HashMap<String, SearchDirectoryConfig>,
        discovery: DiscoveryConfig,
        requests: RequestStream<SourceFileRequest>,
        publisher: UpdatePublisher,
        jobs: EncodingJobManagerHandle,
        shutdown: CancellationToken,
    ) -> (Self, SourceFileManagerHandle) {
        let state = Arc::new(SourceFileState {
            files: RwLock::new(HashMap::new()),
        });
        let directories = Arc::new(directories);
        let (gate_tx, gate_rx) = watch::channel(true);

        let handle = SourceFileManagerHandle {
            state: state.clone(),
            directories: directories.clone(),
            jobs: jobs.clone(),
            gate: gate_rx,
        };

        let manager = Self {
            state,
            directories,
            discovery,
            requests,
            publisher,
            jobs,
            gate: gate_tx,
            shutdown,
        };

        (manager, handle)
    }

    /// Run the manager until shutdown. The first scan happens immediately.
    pub async fn run(mut self) {
        let mut scan = tokio::time::interval(Duration::from_secs(
            self.discovery.scan_interval_secs.max(1),
        ));

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                _ = scan.tick() => {
                    self.run_scan_cycle().await;
                }

                request = self.requests.recv() => {
                    match request {
                        Some(request) => self.handle_request(request).await,
                        None => break,
                    }
                }
            }
        }

        tracing::info!("source file manager stopped");
    }

    async fn handle_request(&self, request: SourceFileRequest) {
        match request {
            SourceFileRequest::UpdateEncodingStatus {
                source_file_id,
                status,
            } => {
                let mut files = self.state.files.write().await;
                let Some(file) = files.get_mut(&source_file_id) else {
                    return;
                };
                if file.status == status {
                    return;
                }
                file.status = status;
                tracing::debug!(
                    file = %file.path.display(),
                    %status,
                    "source file status updated"
                );
                let item = SourceFileUpdateItem {
                    kind: SourceFileUpdateKind::Update,
                    source_file: file.clone(),
                };
                drop(files);
                self.publisher
                    .publish(UpdateMessage::SourceFilesUpdate(vec![item]));
            }
        }
    }

    /// One full discovery cycle: scan, diff behind the gate, publish,
    /// queue automated jobs.
    pub(crate) async fn run_scan_cycle(&self) {
        let scans = self.scan_all_directories().await;

        let _ = self.gate.send(false);
        let updates = self.apply_scans(scans).await;
        let _ = self.gate.send(true);

        if !updates.is_empty() {
            tracing::info!(changes = updates.len(), "source files changed");
            self.publisher
                .publish(UpdateMessage::SourceFilesUpdate(updates));
        }

        self.queue_automated_jobs().await;
    }

    /// Scan every search directory, a few at a time, on blocking threads.
    async fn scan_all_directories(&self) -> Vec<(String, DirectoryScan)> {
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_SCANS));
        let mut tasks = JoinSet::new();

        for (name, directory) in self.directories.iter() {
            let name = name.clone();
            let directory = directory.clone();
            let extensions = self.discovery.video_extensions.clone();
            let skip = self.discovery.secondary_skip_extension.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let scan = tokio::task::spawn_blocking(move || {
                    scan_directory(&directory, &extensions, &skip)
                })
                .await
                .ok()?;
                Some((name, scan))
            });
        }

        let mut scans = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Some(scan)) => scans.push(scan),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "directory scan task failed"),
            }
        }
        scans
    }

    /// Diff scan results into the file map, returning the resulting changes.
    async fn apply_scans(
        &self,
        scans: Vec<(String, DirectoryScan)>,
    ) -> Vec<SourceFileUpdateItem> {
        let mut updates = Vec::new();

        for (name, scan) in scans {
            let Some(directory) = self.directories.get(&name) else {
                continue;
            };

            // Paths compare case-insensitively so a rename that only changes
            // case is not treated as a remove plus an add.
            let candidate_keys: HashMap<String, &crate::scan::ScanCandidate> = scan
                .candidates
                .iter()
                .map(|c| (path_key(&c.path), c))
                .collect();

            let mut files = self.state.files.write().await;

            let removed_ids: Vec<Uuid> = files
                .values()
                .filter(|f| f.search_directory == name)
                .filter(|f| !candidate_keys.contains_key(&path_key(&f.path)))
                .map(|f| f.id)
                .collect();
            for id in removed_ids {
                if let Some(file) = files.remove(&id) {
                    updates.push(SourceFileUpdateItem {
                        kind: SourceFileUpdateKind::Remove,
                        source_file: file,
                    });
                }
            }

            let existing_by_key: HashMap<String, Uuid> = files
                .values()
                .filter(|f| f.search_directory == name)
                .map(|f| (path_key(&f.path), f.id))
                .collect();

            for candidate in &scan.candidates {
                let status = self
                    .derive_status(&candidate.path, candidate.destination_exists)
                    .await;

                match existing_by_key.get(&path_key(&candidate.path)) {
                    Some(id) => {
                        let Some(file) = files.get_mut(id) else { continue };
                        if file.status != status {
                            file.status = status;
                            updates.push(SourceFileUpdateItem {
                                kind: SourceFileUpdateKind::Update,
                                source_file: file.clone(),
                            });
                        }
                    }
                    None => {
                        let file = SourceFile {
                            id: Uuid::new_v4(),
                            path: candidate.path.clone(),
                            destination_path: candidate.destination_path.clone(),
                            search_directory: name.clone(),
                            source_directory: directory.source.clone(),
                            is_episode: directory.episode_naming,
                            status,
                        };
                        files.insert(file.id, file.clone());
                        updates.push(SourceFileUpdateItem {
                            kind: SourceFileUpdateKind::Add,
                            source_file: file,
                        });
                    }
                }
            }
        }

        updates
    }

    /// Derive a source file's status from the job queue and the destination.
    async fn derive_status(
        &self,
        path: &Path,
        destination_exists: bool,
    ) -> SourceFileEncodingStatus {
        match self.jobs.job_status_for_path(path).await {
            Some(job_status) => translate_job_status(job_status),
            None if destination_exists => SourceFileEncodingStatus::Encoded,
            None => SourceFileEncodingStatus::NotEncoded,
        }
    }

    /// Queue jobs for unencoded files in automated directories, oldest path
    /// order. The job manager deduplicates repeated submissions.
    async fn queue_automated_jobs(&self) {
        for (name, directory) in self.directories.iter() {
            if !directory.automated {
                continue;
            }

            let mut pending: Vec<SourceFile> = {
                let files = self.state.files.read().await;
                files
                    .values()
                    .filter(|f| f.search_directory == *name)
                    .filter(|f| f.status == SourceFileEncodingStatus::NotEncoded)
                    .cloned()
                    .collect()
            };
            pending.sort_by(|a, b| a.path.cmp(&b.path));

            for file in pending {
                tracing::debug!(file = %file.path.display(), "queueing automated encode");
                self.jobs.submit(JobManagerRequest::CreateJob {
                    source_file: file,
                    post_processing: directory.post_processing.clone(),
                });
            }
        }
    }
}

/// Create the request queue pair linking the job pipeline back to the
/// source file manager.
pub fn source_file_request_queue() -> (
    RequestQueue<SourceFileRequest>,
    RequestStream<SourceFileRequest>,
) {
    crate::manager::request_queue()
}
