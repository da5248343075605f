//! Encoda Daemon
//!
//! Headless service that discovers source media files, drives encoding jobs
//! through a staged pipeline, and serves clients over a request/reply and a
//! publish/subscribe endpoint.

pub mod discovery;
pub mod engine;
pub mod job;
pub mod manager;
pub mod protocol;
pub mod readiness;
pub mod scan;
pub mod scheduler;
pub mod server;
pub mod source_file;

pub use encoda_config as config;
pub use encoda_config::Config;
pub use discovery::{SourceFileManager, SourceFileManagerHandle, SourceFileRequest};
pub use engine::{BuildArtifacts, CommandEngine, EncodingEngine, EngineError};
pub use job::{EncodingJob, EncodingJobStatus, RemovedJobReason};
pub use manager::{request_queue, RequestQueue, RequestStream};
pub use protocol::{
    run_publisher, run_router, update_channel, MultipartCodec, RequestMessage, ResponseMessage,
    UpdateMessage, UpdatePublisher,
};
pub use scheduler::{EncodingJobManager, EncodingJobManagerHandle, JobManagerRequest};
pub use server::{Server, ServerError};
pub use source_file::{SourceFile, SourceFileEncodingStatus};
