//! Encoding job model.
//!
//! A job moves through a seven-state pipeline, advancing one state per stage
//! and rolling back exactly one state on error or cancellation. Completion is
//! derived from the job's status and flags rather than stored.

use crate::source_file::SourceFile;
use encoda_config::PostProcessingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Pipeline state of an encoding job.
///
/// The derived ordering follows pipeline progress: a status is "later" than
/// another when it appears further down the declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingJobStatus {
    /// Created, nothing run yet.
    New,
    /// Build stage is analyzing the source.
    Building,
    /// Build artifacts are ready.
    Built,
    /// Encode stage is running.
    Encoding,
    /// Encoded output exists.
    Encoded,
    /// Post-processing stage is running.
    PostProcessing,
    /// Post-processing finished.
    PostProcessed,
}

impl Default for EncodingJobStatus {
    fn default() -> Self {
        Self::New
    }
}

impl std::fmt::Display for EncodingJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodingJobStatus::New => write!(f, "new"),
            EncodingJobStatus::Building => write!(f, "building"),
            EncodingJobStatus::Built => write!(f, "built"),
            EncodingJobStatus::Encoding => write!(f, "encoding"),
            EncodingJobStatus::Encoded => write!(f, "encoded"),
            EncodingJobStatus::PostProcessing => write!(f, "post_processing"),
            EncodingJobStatus::PostProcessed => write!(f, "post_processed"),
        }
    }
}

impl EncodingJobStatus {
    /// The status one step earlier in the pipeline. `New` has no predecessor.
    fn previous(self) -> Self {
        match self {
            EncodingJobStatus::New => EncodingJobStatus::New,
            EncodingJobStatus::Building => EncodingJobStatus::New,
            EncodingJobStatus::Built => EncodingJobStatus::Building,
            EncodingJobStatus::Encoding => EncodingJobStatus::Built,
            EncodingJobStatus::Encoded => EncodingJobStatus::Encoding,
            EncodingJobStatus::PostProcessing => EncodingJobStatus::Encoded,
            EncodingJobStatus::PostProcessed => EncodingJobStatus::PostProcessing,
        }
    }
}

/// Sub-step reported while a job is in the build stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingStep {
    /// Probing source streams.
    Probing,
    /// Determining the video scan type.
    ScanType,
    /// Detecting crop.
    Crop,
    /// Deciding encoding instructions.
    Instructions,
    /// Assembling the encoder command.
    Command,
}

impl std::fmt::Display for BuildingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildingStep::Probing => write!(f, "probing"),
            BuildingStep::ScanType => write!(f, "scan_type"),
            BuildingStep::Crop => write!(f, "crop"),
            BuildingStep::Instructions => write!(f, "instructions"),
            BuildingStep::Command => write!(f, "command"),
        }
    }
}

/// Reason a job was removed from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovedJobReason {
    /// Retention removed a completed job.
    Completed,
    /// Retention removed an errored job.
    Errored,
    /// A client asked for the job to be removed.
    UserRequested,
}

/// Video scan type determined during the build stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoScanType {
    Progressive,
    Interlaced,
    Undetermined,
}

/// Stream facts probed from the source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceStreamData {
    /// Source duration in seconds.
    pub duration_secs: f64,
    /// Video codec name.
    pub video_codec: String,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Number of audio streams.
    pub audio_streams: u32,
    /// Number of subtitle streams.
    pub subtitle_streams: u32,
    /// Scan type of the video stream.
    pub scan_type: VideoScanType,
}

/// Decisions made from the probed stream data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingInstructions {
    /// Deinterlace the video during encode.
    pub deinterlace: bool,
    /// Crop filter expression, if any.
    pub crop: Option<String>,
    /// Constant rate factor for the encoder.
    pub video_crf: u8,
}

/// The fully assembled encoder invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingCommandArguments {
    /// Program to run.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Output file the command writes.
    pub output_path: PathBuf,
    /// Source duration, used to estimate progress.
    pub duration_secs: Option<f64>,
}

/// An encoding job in the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingJob {
    /// Job identifier, assigned from a counter that only moves forward, so
    /// ids also encode creation order.
    pub id: u64,
    /// Identifier of the source file the job was created for.
    pub source_file_id: Uuid,
    /// Display name (the source file name).
    pub name: String,
    /// Full path to the source file.
    pub source_path: PathBuf,
    /// Full path the encoded output is written to.
    pub destination_path: PathBuf,
    /// Current pipeline state.
    pub status: EncodingJobStatus,
    /// Sub-step while building, `None` otherwise.
    pub building_step: Option<BuildingStep>,
    /// Pause was requested while the job was processing.
    pub to_be_paused: bool,
    /// Job is paused and will not be picked up by any stage.
    pub paused: bool,
    /// Cancellation was requested for the current stage.
    pub canceled: bool,
    /// Job hit an error.
    pub has_error: bool,
    /// Error description, if any.
    pub error_message: Option<String>,
    /// Unix timestamp (milliseconds) of the error, if any.
    pub error_time: Option<i64>,
    /// Encode progress, 0-100.
    pub encoding_progress: u8,
    /// Encoder frames per second, while encoding.
    pub current_fps: Option<f64>,
    /// Estimated seconds remaining, while encoding.
    pub estimated_seconds_remaining: Option<i64>,
    /// Seconds spent encoding so far.
    pub elapsed_seconds: i64,
    /// Unix timestamp (milliseconds) when encoding finished.
    pub completed_encoding_time: Option<i64>,
    /// Unix timestamp (milliseconds) when post-processing finished.
    pub completed_post_processing_time: Option<i64>,
    /// Post-processing actions, with copy paths already rewritten for this file.
    pub post_processing: Option<PostProcessingConfig>,
    /// Probed stream data, set by the build stage.
    pub stream_data: Option<SourceStreamData>,
    /// Encoding decisions, set by the build stage.
    pub instructions: Option<EncodingInstructions>,
    /// Assembled encoder command, set by the build stage.
    pub command: Option<EncodingCommandArguments>,
    /// Unix timestamp (milliseconds) when the job was created.
    pub created_at: i64,
}

impl EncodingJob {
    /// Create a new job for a source file. The id comes from the manager's
    /// creation counter.
    pub fn new(
        id: u64,
        source_file: &SourceFile,
        post_processing: Option<PostProcessingConfig>,
    ) -> Self {
        Self {
            id,
            source_file_id: source_file.id,
            name: source_file.file_name(),
            source_path: source_file.path.clone(),
            destination_path: source_file.destination_path.clone(),
            status: EncodingJobStatus::New,
            building_step: None,
            to_be_paused: false,
            paused: false,
            canceled: false,
            has_error: false,
            error_message: None,
            error_time: None,
            encoding_progress: 0,
            current_fps: None,
            estimated_seconds_remaining: None,
            elapsed_seconds: 0,
            completed_encoding_time: None,
            completed_post_processing_time: None,
            post_processing,
            stream_data: None,
            instructions: None,
            command: None,
            created_at: current_timestamp_ms(),
        }
    }

    /// True while a stage is actively working the job.
    pub fn is_processing(&self) -> bool {
        matches!(
            self.status,
            EncodingJobStatus::Building
                | EncodingJobStatus::Encoding
                | EncodingJobStatus::PostProcessing
        )
    }

    /// Whether any post-processing action applies to this job.
    pub fn needs_post_processing(&self) -> bool {
        self.post_processing
            .as_ref()
            .map(PostProcessingConfig::any_enabled)
            .unwrap_or(false)
    }

    /// Derived completion predicate.
    ///
    /// A job is complete when it has fully encoded (and post-processed, if
    /// required) and carries no error.
    pub fn complete(&self) -> bool {
        if self.has_error {
            return false;
        }

        if self.needs_post_processing() {
            self.status == EncodingJobStatus::PostProcessed
        } else {
            self.status == EncodingJobStatus::Encoded && self.encoding_progress == 100
        }
    }

    /// True once retention may consider the job for completed-job removal.
    pub fn completed_time(&self) -> Option<i64> {
        if self.needs_post_processing() {
            self.completed_post_processing_time
        } else {
            self.completed_encoding_time
        }
    }

    /// Roll the status back exactly one state.
    ///
    /// Leaving `Encoding` also clears progress and the completed-encoding
    /// timestamp, since partial encode output is discarded.
    pub fn reset_status(&mut self) {
        if self.status == EncodingJobStatus::New {
            return;
        }
        if self.status == EncodingJobStatus::Encoding {
            self.completed_encoding_time = None;
            self.reset_encoding_progress();
        }
        if self.status == EncodingJobStatus::Building {
            self.building_step = None;
        }
        self.status = self.status.previous();
    }

    /// Record an error and roll back one state.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.has_error = true;
        self.error_message = Some(message.into());
        self.error_time = Some(current_timestamp_ms());
        self.reset_status();
    }

    /// Clamp and record encode progress along with rate metrics.
    pub fn update_encoding_progress(
        &mut self,
        progress: u8,
        fps: Option<f64>,
        estimated_seconds_remaining: Option<i64>,
        elapsed_seconds: i64,
    ) {
        self.encoding_progress = progress.min(100);
        self.current_fps = fps;
        self.estimated_seconds_remaining = estimated_seconds_remaining;
        self.elapsed_seconds = elapsed_seconds;
    }

    /// Clear all encode progress fields.
    pub fn reset_encoding_progress(&mut self) {
        self.encoding_progress = 0;
        self.current_fps = None;
        self.estimated_seconds_remaining = None;
        self.elapsed_seconds = 0;
    }

    /// Mark encoding finished: full progress, timestamp, encoded state.
    pub fn complete_encoding(&mut self) {
        self.completed_encoding_time = Some(current_timestamp_ms());
        self.encoding_progress = 100;
        self.estimated_seconds_remaining = None;
        self.current_fps = None;
        self.status = EncodingJobStatus::Encoded;
    }

    /// Mark post-processing finished.
    pub fn complete_post_processing(&mut self) {
        self.completed_post_processing_time = Some(current_timestamp_ms());
        self.status = EncodingJobStatus::PostProcessed;
    }

    /// Pause the job: immediate when idle, deferred while processing.
    pub fn pause(&mut self) {
        if self.is_processing() {
            self.to_be_paused = true;
        } else {
            self.paused = true;
            self.to_be_paused = false;
        }
    }

    /// Clear both pause flags.
    pub fn resume(&mut self) {
        self.paused = false;
        self.to_be_paused = false;
    }

    /// Flag the current stage for cancellation.
    pub fn mark_canceled(&mut self) {
        self.canceled = true;
    }

    /// Stage-completion cleanup.
    ///
    /// Clears the cancel flag and resolves a deferred pause: a complete job
    /// resumes instead of pausing.
    pub fn cleanup(&mut self) {
        if self.to_be_paused {
            if self.complete() {
                self.resume();
            } else {
                self.paused = true;
                self.to_be_paused = false;
            }
        }
        self.canceled = false;
    }
}

/// Get current timestamp in milliseconds since Unix epoch.
pub(crate) fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
