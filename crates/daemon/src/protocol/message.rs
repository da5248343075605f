//! Message envelopes for the request/reply and publish endpoints.
//!
//! Every message is a JSON object `{"type": ..., "data": ...}`. Request and
//! response kinds pair one-to-one, with `Error` as the catch-all reply when
//! a handler fails. Updates are pushed on topics: two global topics plus
//! per-job topics of the form `{job_id}-{kind}`.

use crate::job::{
    BuildingStep, EncodingCommandArguments, EncodingInstructions, EncodingJob, EncodingJobStatus,
    RemovedJobReason, SourceStreamData,
};
use crate::source_file::SourceFile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Topic carrying source file add/remove/update batches.
pub const SOURCE_FILES_TOPIC: &str = "SourceFilesUpdate";

/// Topic carrying job queue membership changes.
pub const JOB_QUEUE_TOPIC: &str = "EncodingJobQueue";

/// Per-job topic for an update kind.
pub fn job_topic(job_id: u64, kind: &str) -> String {
    format!("{}-{}", job_id, kind)
}

/// A request received on the request/reply endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RequestMessage {
    /// Snapshot of all known source files.
    SourceFilesRequest,
    /// Cancel the named job's current stage.
    CancelRequest { job_id: u64 },
    /// Pause the named job.
    PauseRequest { job_id: u64 },
    /// Resume the named job.
    ResumeRequest { job_id: u64 },
    /// Cancel the named job's current stage, then pause it.
    PauseCancelRequest { job_id: u64 },
    /// Create an encoding job for a source file.
    EncodeRequest { source_file_id: Uuid },
    /// Create encoding jobs for several source files.
    BulkEncodeRequest { source_file_ids: Vec<Uuid> },
    /// Remove a job from the queue.
    RemoveJobRequest { job_id: u64 },
    /// Snapshot of the job queue.
    JobQueueRequest,
}

/// A reply sent on the request/reply endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ResponseMessage {
    /// Source files grouped by search directory name.
    SourceFilesResponse(HashMap<String, Vec<SourceFile>>),
    /// Whether the cancel request was accepted.
    CancelResponse(bool),
    /// Whether the pause request was accepted.
    PauseResponse(bool),
    /// Whether the resume request was accepted.
    ResumeResponse(bool),
    /// Whether the pause-cancel request was accepted.
    PauseCancelResponse(bool),
    /// Whether the encode request was accepted.
    EncodeResponse(bool),
    /// Names of the source files that could not be queued.
    BulkEncodeResponse(Vec<String>),
    /// Whether the remove request was accepted.
    RemoveJobResponse(bool),
    /// Current job queue, oldest first.
    JobQueueResponse(Vec<EncodingJob>),
    /// The handler failed.
    Error(String),
}

/// How a source file entry changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFileUpdateKind {
    Add,
    Remove,
    Update,
}

/// One source file change within a `SourceFilesUpdate` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFileUpdateItem {
    pub kind: SourceFileUpdateKind,
    pub source_file: SourceFile,
}

/// How the job queue membership changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobQueueUpdateKind {
    Add,
    Remove,
    Move,
}

/// A job queue membership change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobQueueUpdate {
    pub kind: JobQueueUpdateKind,
    pub job: EncodingJob,
    /// Why the job left the queue; only set for removals.
    pub removed_reason: Option<RemovedJobReason>,
}

/// A job's status and flags changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusUpdate {
    pub job_id: u64,
    pub status: EncodingJobStatus,
    pub building_step: Option<BuildingStep>,
    pub paused: bool,
    pub to_be_paused: bool,
    pub canceled: bool,
    pub has_error: bool,
    pub error_message: Option<String>,
}

impl JobStatusUpdate {
    pub fn from_job(job: &EncodingJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            building_step: job.building_step,
            paused: job.paused,
            to_be_paused: job.to_be_paused,
            canceled: job.canceled,
            has_error: job.has_error,
            error_message: job.error_message.clone(),
        }
    }
}

/// A job's build artifacts became available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProcessingDataUpdate {
    pub job_id: u64,
    pub stream_data: Option<SourceStreamData>,
    pub instructions: Option<EncodingInstructions>,
    pub command: Option<EncodingCommandArguments>,
}

/// A job's encode progress changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgressUpdate {
    pub job_id: u64,
    pub encoding_progress: u8,
    pub current_fps: Option<f64>,
    pub estimated_seconds_remaining: Option<i64>,
    pub elapsed_seconds: i64,
}

impl JobProgressUpdate {
    pub fn from_job(job: &EncodingJob) -> Self {
        Self {
            job_id: job.id,
            encoding_progress: job.encoding_progress,
            current_fps: job.current_fps,
            estimated_seconds_remaining: job.estimated_seconds_remaining,
            elapsed_seconds: job.elapsed_seconds,
        }
    }
}

/// An update pushed on the publish endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UpdateMessage {
    SourceFilesUpdate(Vec<SourceFileUpdateItem>),
    EncodingJobQueue(JobQueueUpdate),
    EncodingJobStatus(JobStatusUpdate),
    EncodingJobProcessingData(JobProcessingDataUpdate),
    EncodingJobEncodingProgress(JobProgressUpdate),
}

impl UpdateMessage {
    /// Topic this update is published on.
    pub fn topic(&self) -> String {
        match self {
            UpdateMessage::SourceFilesUpdate(_) => SOURCE_FILES_TOPIC.to_string(),
            UpdateMessage::EncodingJobQueue(_) => JOB_QUEUE_TOPIC.to_string(),
            UpdateMessage::EncodingJobStatus(u) => job_topic(u.job_id, "EncodingJobStatus"),
            UpdateMessage::EncodingJobProcessingData(u) => {
                job_topic(u.job_id, "EncodingJobProcessingData")
            }
            UpdateMessage::EncodingJobEncodingProgress(u) => {
                job_topic(u.job_id, "EncodingJobEncodingProgress")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn request_strategy() -> impl Strategy<Value = RequestMessage> {
        let job_id = any::<u64>();
        let source_id = Just(Uuid::new_v4());
        prop_oneof![
            Just(RequestMessage::SourceFilesRequest),
            job_id.clone().prop_map(|job_id| RequestMessage::CancelRequest { job_id }),
            job_id.clone().prop_map(|job_id| RequestMessage::PauseRequest { job_id }),
            job_id.clone().prop_map(|job_id| RequestMessage::ResumeRequest { job_id }),
            job_id.clone()
                .prop_map(|job_id| RequestMessage::PauseCancelRequest { job_id }),
            source_id.clone()
                .prop_map(|source_file_id| RequestMessage::EncodeRequest { source_file_id }),
            prop::collection::vec(source_id, 0..5)
                .prop_map(|source_file_ids| RequestMessage::BulkEncodeRequest { source_file_ids }),
            job_id.prop_map(|job_id| RequestMessage::RemoveJobRequest { job_id }),
            Just(RequestMessage::JobQueueRequest),
        ]
    }

    #[test]
    fn test_envelope_shape() {
        let json = serde_json::to_value(RequestMessage::CancelRequest { job_id: 7 }).unwrap();

        assert_eq!(json["type"], "CancelRequest");
        assert_eq!(json["data"]["job_id"], 7);
    }

    #[test]
    fn test_unit_request_has_no_data() {
        let json = serde_json::to_value(RequestMessage::SourceFilesRequest).unwrap();
        assert_eq!(json["type"], "SourceFilesRequest");
        assert!(json.get("data").is_none());

        // And it parses back from the bare envelope
        let parsed: RequestMessage =
            serde_json::from_str(r#"{"type":"SourceFilesRequest"}"#).unwrap();
        assert_eq!(parsed, RequestMessage::SourceFilesRequest);
    }

    #[test]
    fn test_error_response_round_trip() {
        let response = ResponseMessage::Error("handler failed".to_string());
        let json = serde_json::to_string(&response).unwrap();
        let back: ResponseMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(response, back);
    }

    #[test]
    fn test_global_topics() {
        let update = UpdateMessage::SourceFilesUpdate(Vec::new());
        assert_eq!(update.topic(), "SourceFilesUpdate");
    }

    #[test]
    fn test_per_job_topic_format() {
        let job_id = 42;
        let update = UpdateMessage::EncodingJobEncodingProgress(JobProgressUpdate {
            job_id,
            encoding_progress: 50,
            current_fps: None,
            estimated_seconds_remaining: None,
            elapsed_seconds: 10,
        });

        assert_eq!(
            update.topic(),
            format!("{}-EncodingJobEncodingProgress", job_id)
        );
    }

    #[test]
    fn test_status_update_topic() {
        let job_id = 9;
        let update = UpdateMessage::EncodingJobStatus(JobStatusUpdate {
            job_id,
            status: EncodingJobStatus::Encoding,
            building_step: None,
            paused: false,
            to_be_paused: false,
            canceled: false,
            has_error: false,
            error_message: None,
        });

        assert_eq!(update.topic(), format!("{}-EncodingJobStatus", job_id));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // Every request kind survives a JSON round trip.
        #[test]
        fn prop_request_round_trip(request in request_strategy()) {
            let json = serde_json::to_string(&request).expect("request serializes");
            let back: RequestMessage = serde_json::from_str(&json).expect("request deserializes");
            prop_assert_eq!(request, back);
        }

        // Malformed request payloads never parse.
        #[test]
        fn prop_garbage_does_not_parse(garbage in "[a-z0-9{}\\[\\] ]{0,40}") {
            prop_assume!(serde_json::from_str::<serde_json::Value>(&garbage).is_err()
                || !garbage.contains("type"));
            let parsed = serde_json::from_str::<RequestMessage>(&garbage);
            prop_assert!(parsed.is_err());
        }
    }
}
