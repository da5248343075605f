//! Daemon server.
//!
//! Wires the managers together, binds the two network endpoints, and runs
//! until interrupted. The request/reply endpoint is served by a
//! `Dispatcher` that maps each request onto the owning manager's handle.

use crate::discovery::{source_file_request_queue, SourceFileManager, SourceFileManagerHandle};
use crate::engine::{CommandEngine, EncodingEngine};
use crate::job::RemovedJobReason;
use crate::protocol::message::{RequestMessage, ResponseMessage};
use crate::protocol::{run_publisher, run_router, update_channel};
use crate::scheduler::{EncodingJobManager, EncodingJobManagerHandle, JobManagerRequest};
use encoda_config::{Config, ConfigError};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Error type for server startup and shutdown
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A listener could not be bound or the signal handler failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Maps requests from the request/reply endpoint onto manager handles.
#[derive(Clone)]
pub struct Dispatcher {
    sources: SourceFileManagerHandle,
    jobs: EncodingJobManagerHandle,
}

impl Dispatcher {
    pub fn new(sources: SourceFileManagerHandle, jobs: EncodingJobManagerHandle) -> Self {
        Self { sources, jobs }
    }

    /// Handle one request and produce its reply.
    pub async fn dispatch(&self, request: RequestMessage) -> ResponseMessage {
        match request {
            RequestMessage::SourceFilesRequest => {
                ResponseMessage::SourceFilesResponse(self.sources.source_files().await)
            }
            RequestMessage::CancelRequest { job_id } => ResponseMessage::CancelResponse(
                self.jobs.submit(JobManagerRequest::CancelJob { job_id }),
            ),
            RequestMessage::PauseRequest { job_id } => ResponseMessage::PauseResponse(
                self.jobs.submit(JobManagerRequest::PauseJob { job_id }),
            ),
            RequestMessage::ResumeRequest { job_id } => ResponseMessage::ResumeResponse(
                self.jobs.submit(JobManagerRequest::ResumeJob { job_id }),
            ),
            RequestMessage::PauseCancelRequest { job_id } => {
                ResponseMessage::PauseCancelResponse(
                    self.jobs.submit(JobManagerRequest::PauseCancelJob { job_id }),
                )
            }
            RequestMessage::EncodeRequest { source_file_id } => {
                match self.sources.request_encode(source_file_id).await {
                    Some(accepted) => ResponseMessage::EncodeResponse(accepted),
                    None => ResponseMessage::Error(format!(
                        "unknown source file: {}",
                        source_file_id
                    )),
                }
            }
            RequestMessage::BulkEncodeRequest { source_file_ids } => {
                ResponseMessage::BulkEncodeResponse(
                    self.sources.request_bulk_encode(&source_file_ids).await,
                )
            }
            RequestMessage::RemoveJobRequest { job_id } => ResponseMessage::RemoveJobResponse(
                self.jobs.submit(JobManagerRequest::RemoveJob {
                    job_id,
                    reason: RemovedJobReason::UserRequested,
                }),
            ),
            RequestMessage::JobQueueRequest => {
                ResponseMessage::JobQueueResponse(self.jobs.job_queue().await)
            }
        }
    }
}

/// The daemon server.
pub struct Server;

impl Server {
    /// Run the daemon with the given configuration until interrupted.
    pub async fn run(config: Config) -> Result<(), ServerError> {
        let shutdown = CancellationToken::new();
        let (publisher, update_rx) = update_channel();
        let (feedback_queue, feedback_stream) = source_file_request_queue();

        let engine: Arc<dyn EncodingEngine> = Arc::new(CommandEngine::new());
        let (job_manager, jobs) = EncodingJobManager::new(
            config.limits.clone(),
            engine,
            publisher.clone(),
            feedback_queue,
            shutdown.clone(),
        );
        let (source_manager, sources) = SourceFileManager::new(
            config.directories.clone(),
            config.discovery.clone(),
            feedback_stream,
            publisher.clone(),
            jobs.clone(),
            shutdown.clone(),
        );

        let ip = config.connection.ip.as_str();
        let router_listener =
            TcpListener::bind((ip, config.connection.router_port)).await?;
        let publisher_listener =
            TcpListener::bind((ip, config.connection.publisher_port)).await?;
        tracing::info!(
            router = %router_listener.local_addr()?,
            publisher = %publisher_listener.local_addr()?,
            directories = config.directories.len(),
            "daemon listening"
        );

        let dispatcher = Dispatcher::new(sources, jobs.clone());
        let handler = move |request: RequestMessage| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.dispatch(request).await }
        };

        let tasks = vec![
            tokio::spawn(job_manager.run()),
            tokio::spawn(source_manager.run()),
            tokio::spawn(run_publisher(publisher_listener, update_rx, shutdown.clone())),
            tokio::spawn(run_router(router_listener, handler, shutdown.clone())),
        ];

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutdown signal received");

        jobs.close();
        shutdown.cancel();
        for task in tasks {
            let _ = task.await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BuildArtifacts, EngineError, ProgressFn, StepFn};
    use crate::job::{
        EncodingCommandArguments, EncodingInstructions, SourceStreamData, VideoScanType,
    };
    use crate::source_file::SourceFileEncodingStatus;
    use encoda_config::{DiscoveryConfig, LimitsConfig, SearchDirectoryConfig};
    use std::collections::HashMap;
    use std::fs::{self, File};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::{sleep, timeout};
    use uuid::Uuid;

    struct NoopEngine;

    impl EncodingEngine for NoopEngine {
        fn build(
            &self,
            source: &std::path::Path,
            destination: &std::path::Path,
            _step: &StepFn,
            _cancel: &CancellationToken,
        ) -> Result<BuildArtifacts, EngineError> {
            Ok(BuildArtifacts {
                stream_data: SourceStreamData {
                    duration_secs: 10.0,
                    video_codec: "hevc".to_string(),
                    width: 1280,
                    height: 720,
                    audio_streams: 1,
                    subtitle_streams: 0,
                    scan_type: VideoScanType::Progressive,
                },
                instructions: EncodingInstructions {
                    deinterlace: false,
                    crop: None,
                    video_crf: 22,
                },
                command: EncodingCommandArguments {
                    program: "true".to_string(),
                    args: Vec::new(),
                    output_path: destination.to_path_buf(),
                    duration_secs: Some(10.0),
                },
            })
        }

        fn encode(
            &self,
            _command: &EncodingCommandArguments,
            _progress: &ProgressFn,
            _cancel: &CancellationToken,
        ) -> Result<(), EngineError> {
            Ok(())
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        source_manager: SourceFileManager,
        shutdown: CancellationToken,
    }

    fn fixture(directories: HashMap<String, SearchDirectoryConfig>) -> Fixture {
        let (publisher, _updates) = update_channel();
        let shutdown = CancellationToken::new();
        let (feedback_queue, feedback_stream) = source_file_request_queue();

        let (mut job_manager, jobs) = EncodingJobManager::new(
            LimitsConfig::default(),
            Arc::new(NoopEngine),
            publisher.clone(),
            feedback_queue,
            shutdown.clone(),
        );
        job_manager.readiness_wait_secs = 0;
        job_manager.readiness_attempts = 1;
        tokio::spawn(job_manager.run());

        let (source_manager, sources) = SourceFileManager::new(
            directories,
            DiscoveryConfig::default(),
            feedback_stream,
            publisher,
            jobs.clone(),
            shutdown.clone(),
        );

        Fixture {
            dispatcher: Dispatcher::new(sources, jobs),
            source_manager,
            shutdown,
        }
    }

    fn make_directory(temp: &TempDir, name: &str) -> SearchDirectoryConfig {
        let source = temp.path().join(format!("{}/source", name));
        let destination = temp.path().join(format!("{}/dest", name));
        fs::create_dir_all(&source).unwrap();
        SearchDirectoryConfig {
            source,
            destination,
            automated: false,
            episode_naming: false,
            post_processing: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_source_files_request_returns_groups() {
        let temp = TempDir::new().unwrap();
        let dir = make_directory(&temp, "movies");
        File::create(dir.source.join("film.mkv")).unwrap();

        let fixture = fixture(HashMap::from([("movies".to_string(), dir)]));
        fixture.source_manager.run_scan_cycle().await;

        let response = fixture
            .dispatcher
            .dispatch(RequestMessage::SourceFilesRequest)
            .await;
        match response {
            ResponseMessage::SourceFilesResponse(groups) => {
                assert_eq!(groups["movies"].len(), 1);
                assert_eq!(
                    groups["movies"][0].status,
                    SourceFileEncodingStatus::NotEncoded
                );
            }
            other => panic!("unexpected response: {:?}", other),
        }

        fixture.shutdown.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_encode_request_unknown_file_is_error() {
        let fixture = fixture(HashMap::new());

        let response = fixture
            .dispatcher
            .dispatch(RequestMessage::EncodeRequest {
                source_file_id: Uuid::new_v4(),
            })
            .await;

        assert!(matches!(response, ResponseMessage::Error(_)));

        fixture.shutdown.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_encode_request_creates_job() {
        let temp = TempDir::new().unwrap();
        let dir = make_directory(&temp, "movies");
        File::create(dir.source.join("film.mkv")).unwrap();

        let fixture = fixture(HashMap::from([("movies".to_string(), dir)]));
        fixture.source_manager.run_scan_cycle().await;

        let id = match fixture
            .dispatcher
            .dispatch(RequestMessage::SourceFilesRequest)
            .await
        {
            ResponseMessage::SourceFilesResponse(groups) => groups["movies"][0].id,
            other => panic!("unexpected response: {:?}", other),
        };

        let response = fixture
            .dispatcher
            .dispatch(RequestMessage::EncodeRequest {
                source_file_id: id,
            })
            .await;
        assert_eq!(response, ResponseMessage::EncodeResponse(true));

        // The job shows up in the queue snapshot once the manager creates it
        let jobs = timeout(Duration::from_secs(5), async {
            loop {
                match fixture
                    .dispatcher
                    .dispatch(RequestMessage::JobQueueRequest)
                    .await
                {
                    ResponseMessage::JobQueueResponse(jobs) if !jobs.is_empty() => return jobs,
                    ResponseMessage::JobQueueResponse(_) => {
                        sleep(Duration::from_millis(20)).await;
                    }
                    other => panic!("unexpected response: {:?}", other),
                }
            }
        })
        .await
        .expect("job created");

        assert_eq!(jobs[0].source_file_id, id);

        fixture.shutdown.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_job_control_requests_are_accepted() {
        let fixture = fixture(HashMap::new());
        let job_id = 99u64;

        // Control requests are accepted for queueing even when the job id
        // is unknown; the manager resolves them against its queue.
        for (request, expected) in [
            (
                RequestMessage::PauseRequest { job_id },
                ResponseMessage::PauseResponse(true),
            ),
            (
                RequestMessage::ResumeRequest { job_id },
                ResponseMessage::ResumeResponse(true),
            ),
            (
                RequestMessage::CancelRequest { job_id },
                ResponseMessage::CancelResponse(true),
            ),
            (
                RequestMessage::PauseCancelRequest { job_id },
                ResponseMessage::PauseCancelResponse(true),
            ),
            (
                RequestMessage::RemoveJobRequest { job_id },
                ResponseMessage::RemoveJobResponse(true),
            ),
        ] {
            let response = fixture.dispatcher.dispatch(request).await;
            assert_eq!(response, expected);
        }

        fixture.shutdown.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bulk_encode_reports_failures() {
        let temp = TempDir::new().unwrap();
        let dir = make_directory(&temp, "movies");
        File::create(dir.source.join("film.mkv")).unwrap();

        let fixture = fixture(HashMap::from([("movies".to_string(), dir)]));
        fixture.source_manager.run_scan_cycle().await;

        let id = match fixture
            .dispatcher
            .dispatch(RequestMessage::SourceFilesRequest)
            .await
        {
            ResponseMessage::SourceFilesResponse(groups) => groups["movies"][0].id,
            other => panic!("unexpected response: {:?}", other),
        };
        let unknown = Uuid::new_v4();

        let response = fixture
            .dispatcher
            .dispatch(RequestMessage::BulkEncodeRequest {
                source_file_ids: vec![id, unknown],
            })
            .await;

        match response {
            ResponseMessage::BulkEncodeResponse(failed) => {
                assert_eq!(failed, vec![unknown.to_string()]);
            }
            other => panic!("unexpected response: {:?}", other),
        }

        fixture.shutdown.cancel();
    }
}
