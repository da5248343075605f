//! Encoding engine seam.
//!
//! The scheduler drives stages through the `EncodingEngine` trait so the
//! pipeline logic stays independent of any particular transcoder. The
//! shipped implementation, `CommandEngine`, probes sources with ffprobe and
//! encodes with ffmpeg, mapping process exit status onto error variants.
//! Engine calls block and are run under `spawn_blocking` by the scheduler.

use crate::job::{
    BuildingStep, EncodingCommandArguments, EncodingInstructions, SourceStreamData, VideoScanType,
};
use encoda_config::PostProcessingConfig;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Error type for engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// The stage was canceled before it finished
    #[error("operation was canceled")]
    Canceled,

    /// Encoder process exited with non-zero status
    #[error("encoder process failed with exit code: {0}")]
    ProcessFailed(i32),

    /// Encoder process was terminated by signal
    #[error("encoder process was terminated by signal")]
    ProcessTerminated,

    /// Source probing failed
    #[error("probe failed: {0}")]
    Probe(String),

    /// IO error during an engine operation
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A progress sample reported during encoding.
#[derive(Debug, Clone, Copy)]
pub struct EncodeProgress {
    /// Percent complete, 0-100.
    pub percent: u8,
    /// Encoder frames per second, when known.
    pub fps: Option<f64>,
    /// Estimated seconds remaining, when known.
    pub estimated_seconds_remaining: Option<i64>,
    /// Seconds elapsed since the encode started.
    pub elapsed_seconds: i64,
}

/// Callback invoked with progress samples while encoding.
pub type ProgressFn = dyn Fn(EncodeProgress) + Send + Sync;

/// Callback invoked as the build stage moves between sub-steps.
pub type StepFn = dyn Fn(BuildingStep) + Send + Sync;

/// Everything the build stage produces for a job.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildArtifacts {
    pub stream_data: SourceStreamData,
    pub instructions: EncodingInstructions,
    pub command: EncodingCommandArguments,
}

/// Seam between the pipeline scheduler and a concrete transcoder.
pub trait EncodingEngine: Send + Sync {
    /// Analyze a source and produce the artifacts needed to encode it.
    fn build(
        &self,
        source: &Path,
        destination: &Path,
        step: &StepFn,
        cancel: &CancellationToken,
    ) -> Result<BuildArtifacts, EngineError>;

    /// Run the assembled command to completion, reporting progress.
    fn encode(
        &self,
        command: &EncodingCommandArguments,
        progress: &ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError>;
}

/// Constant rate factor used for all encodes.
const DEFAULT_CRF: u8 = 22;

/// Engine that shells out to ffprobe and ffmpeg.
#[derive(Debug, Default)]
pub struct CommandEngine;

impl CommandEngine {
    pub fn new() -> Self {
        Self
    }
}

impl EncodingEngine for CommandEngine {
    fn build(
        &self,
        source: &Path,
        destination: &Path,
        step: &StepFn,
        cancel: &CancellationToken,
    ) -> Result<BuildArtifacts, EngineError> {
        step(BuildingStep::Probing);
        let probe = run_ffprobe(source)?;
        if cancel.is_cancelled() {
            return Err(EngineError::Canceled);
        }

        step(BuildingStep::ScanType);
        let stream_data = parse_probe_output(&probe)?;

        step(BuildingStep::Crop);
        // Crop detection is not performed; sources are encoded full-frame.
        let crop = None;

        step(BuildingStep::Instructions);
        let instructions = EncodingInstructions {
            deinterlace: stream_data.scan_type == VideoScanType::Interlaced,
            crop,
            video_crf: DEFAULT_CRF,
        };

        step(BuildingStep::Command);
        let command = build_encode_command(
            source,
            destination,
            &instructions,
            Some(stream_data.duration_secs),
        );

        if cancel.is_cancelled() {
            return Err(EngineError::Canceled);
        }

        Ok(BuildArtifacts {
            stream_data,
            instructions,
            command,
        })
    }

    fn encode(
        &self,
        command: &EncodingCommandArguments,
        progress: &ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Canceled);
        }

        if let Some(parent) = command.output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);

        let mut child = cmd.spawn()?;
        let started = Instant::now();

        let status = loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                remove_partial_output(&command.output_path);
                return Err(EngineError::Canceled);
            }

            match child.try_wait()? {
                Some(status) => break status,
                None => {
                    let elapsed = started.elapsed().as_secs() as i64;
                    progress(EncodeProgress {
                        percent: estimate_percent(elapsed, command.duration_secs),
                        fps: None,
                        estimated_seconds_remaining: estimate_remaining(
                            elapsed,
                            command.duration_secs,
                        ),
                        elapsed_seconds: elapsed,
                    });
                    std::thread::sleep(Duration::from_millis(500));
                }
            }
        };

        if status.success() {
            Ok(())
        } else {
            remove_partial_output(&command.output_path);
            match status.code() {
                Some(code) => Err(EngineError::ProcessFailed(code)),
                None => Err(EngineError::ProcessTerminated),
            }
        }
    }
}

/// Estimate percent complete from wall-clock elapsed time.
///
/// Capped at 99; only a finished encode reports 100.
fn estimate_percent(elapsed_secs: i64, duration_secs: Option<f64>) -> u8 {
    match duration_secs {
        Some(duration) if duration > 0.0 => {
            let pct = (elapsed_secs as f64 / duration * 100.0) as i64;
            pct.clamp(0, 99) as u8
        }
        _ => 0,
    }
}

/// Estimate seconds remaining from wall-clock elapsed time.
fn estimate_remaining(elapsed_secs: i64, duration_secs: Option<f64>) -> Option<i64> {
    duration_secs
        .filter(|d| *d > 0.0)
        .map(|d| ((d as i64) - elapsed_secs).max(0))
}

fn remove_partial_output(path: &Path) {
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
}

/// Build the ffmpeg command for a source and its encoding instructions.
///
/// Video is re-encoded with SVT-AV1 at the configured CRF; audio and
/// subtitle streams are copied. Deinterlace and crop become a `-vf` chain.
pub fn build_encode_command(
    source: &Path,
    destination: &Path,
    instructions: &EncodingInstructions,
    duration_secs: Option<f64>,
) -> EncodingCommandArguments {
    let mut args: Vec<String> = Vec::new();

    args.push("-y".to_string());
    args.push("-i".to_string());
    args.push(source.to_string_lossy().into_owned());

    let mut filters: Vec<String> = Vec::new();
    if instructions.deinterlace {
        filters.push("yadif".to_string());
    }
    if let Some(crop) = &instructions.crop {
        filters.push(format!("crop={}", crop));
    }
    if !filters.is_empty() {
        args.push("-vf".to_string());
        args.push(filters.join(","));
    }

    args.push("-c:v".to_string());
    args.push("libsvtav1".to_string());
    args.push("-crf".to_string());
    args.push(instructions.video_crf.to_string());
    args.push("-c:a".to_string());
    args.push("copy".to_string());
    args.push("-c:s".to_string());
    args.push("copy".to_string());
    args.push(destination.to_string_lossy().into_owned());

    EncodingCommandArguments {
        program: "ffmpeg".to_string(),
        args,
        output_path: destination.to_path_buf(),
        duration_secs,
    }
}

/// Run ffprobe against a source and return its JSON output.
fn run_ffprobe(source: &Path) -> Result<String, EngineError> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-print_format")
        .arg("json")
        .arg("-show_format")
        .arg("-show_streams")
        .arg(source)
        .output()?;

    if !output.status.success() {
        return Err(EngineError::Probe(
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse ffprobe JSON into stream data.
///
/// Exposed separately so parsing is testable without running ffprobe.
pub fn parse_probe_output(json: &str) -> Result<SourceStreamData, EngineError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| EngineError::Probe(e.to_string()))?;

    let streams = value["streams"]
        .as_array()
        .ok_or_else(|| EngineError::Probe("no streams in probe output".to_string()))?;

    let video = streams
        .iter()
        .find(|s| s["codec_type"] == "video")
        .ok_or_else(|| EngineError::Probe("no video stream in source".to_string()))?;

    let count_type = |kind: &str| -> u32 {
        streams
            .iter()
            .filter(|s| s["codec_type"] == kind)
            .count() as u32
    };

    let duration_secs = value["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let scan_type = match video["field_order"].as_str() {
        Some("progressive") => VideoScanType::Progressive,
        Some("tt") | Some("bb") | Some("tb") | Some("bt") => VideoScanType::Interlaced,
        _ => VideoScanType::Undetermined,
    };

    Ok(SourceStreamData {
        duration_secs,
        video_codec: video["codec_name"].as_str().unwrap_or("unknown").to_string(),
        width: video["width"].as_u64().unwrap_or(0) as u32,
        height: video["height"].as_u64().unwrap_or(0) as u32,
        audio_streams: count_type("audio"),
        subtitle_streams: count_type("subtitle"),
        scan_type,
    })
}

/// Execute a job's post-processing actions.
///
/// Copies the encoded output to each configured path (creating parent
/// directories as needed), then optionally deletes the source file. Copy
/// paths have already been rewritten to full file paths at job creation.
pub fn run_post_processing(
    encoded_output: &Path,
    source: &Path,
    settings: &PostProcessingConfig,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    for copy_path in &settings.copy_file_paths {
        if cancel.is_cancelled() {
            return Err(EngineError::Canceled);
        }
        if let Some(parent) = copy_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(encoded_output, copy_path)?;
    }

    if settings.delete_source_file {
        std::fs::remove_file(source)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Helper to check if args contain a flag with a specific value
    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2)
            .any(|pair| pair[0] == flag && pair[1] == value)
    }

    const PROBE_JSON: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "hevc", "width": 1920, "height": 1080, "field_order": "progressive"},
            {"codec_type": "audio", "codec_name": "aac"},
            {"codec_type": "audio", "codec_name": "dts"},
            {"codec_type": "subtitle", "codec_name": "subrip"}
        ],
        "format": {"duration": "7200.5"}
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let data = parse_probe_output(PROBE_JSON).expect("probe parses");

        assert_eq!(data.video_codec, "hevc");
        assert_eq!(data.width, 1920);
        assert_eq!(data.height, 1080);
        assert_eq!(data.audio_streams, 2);
        assert_eq!(data.subtitle_streams, 1);
        assert_eq!(data.scan_type, VideoScanType::Progressive);
        assert!((data.duration_secs - 7200.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_probe_interlaced_and_unknown_field_order() {
        let interlaced = PROBE_JSON.replace("progressive", "tt");
        let data = parse_probe_output(&interlaced).unwrap();
        assert_eq!(data.scan_type, VideoScanType::Interlaced);

        let unknown = PROBE_JSON.replace("progressive", "whatever");
        let data = parse_probe_output(&unknown).unwrap();
        assert_eq!(data.scan_type, VideoScanType::Undetermined);
    }

    #[test]
    fn test_parse_probe_without_video_stream_fails() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(EngineError::Probe(_))
        ));
    }

    #[test]
    fn test_estimate_percent_caps_at_99() {
        assert_eq!(estimate_percent(0, Some(100.0)), 0);
        assert_eq!(estimate_percent(50, Some(100.0)), 50);
        assert_eq!(estimate_percent(100, Some(100.0)), 99);
        assert_eq!(estimate_percent(5000, Some(100.0)), 99);
        assert_eq!(estimate_percent(50, None), 0);
        assert_eq!(estimate_percent(50, Some(0.0)), 0);
    }

    #[test]
    fn test_estimate_remaining_never_negative() {
        assert_eq!(estimate_remaining(30, Some(100.0)), Some(70));
        assert_eq!(estimate_remaining(500, Some(100.0)), Some(0));
        assert_eq!(estimate_remaining(30, None), None);
    }

    #[test]
    fn test_run_post_processing_copies_and_deletes() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("encoded/film.mkv");
        let source = temp.path().join("source/film.mkv");
        fs::create_dir_all(output.parent().unwrap()).unwrap();
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&output, b"encoded bytes").unwrap();
        fs::write(&source, b"source bytes").unwrap();

        let settings = PostProcessingConfig {
            copy_file_paths: vec![
                temp.path().join("nas/movies/film.mkv"),
                temp.path().join("backup/film.mkv"),
            ],
            delete_source_file: true,
        };

        run_post_processing(&output, &source, &settings, &CancellationToken::new())
            .expect("post-processing succeeds");

        for copy_path in &settings.copy_file_paths {
            assert_eq!(fs::read(copy_path).unwrap(), b"encoded bytes");
        }
        assert!(!source.exists());
        assert!(output.exists());
    }

    #[test]
    fn test_run_post_processing_canceled_token() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("film.mkv");
        let source = temp.path().join("source.mkv");
        fs::write(&output, b"x").unwrap();
        fs::write(&source, b"y").unwrap();

        let settings = PostProcessingConfig {
            copy_file_paths: vec![temp.path().join("copy/film.mkv")],
            delete_source_file: false,
        };
        let token = CancellationToken::new();
        token.cancel();

        let result = run_post_processing(&output, &source, &settings, &token);
        assert!(matches!(result, Err(EngineError::Canceled)));
        assert!(!settings.copy_file_paths[0].exists());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // The assembled command always carries the source, the encoder
        // settings, stream copies, and the destination as the final arg.
        #[test]
        fn prop_encode_command_completeness(
            source in "[a-zA-Z0-9_/.-]{1,40}",
            dest in "[a-zA-Z0-9_/.-]{1,40}",
            crf in 10u8..45,
            deinterlace in proptest::bool::ANY,
            crop in prop::option::of("[0-9]{2,4}:[0-9]{2,4}:[0-9]{1,3}:[0-9]{1,3}"),
        ) {
            let instructions = EncodingInstructions {
                deinterlace,
                crop: crop.clone(),
                video_crf: crf,
            };
            let command = build_encode_command(
                Path::new(&source),
                Path::new(&dest),
                &instructions,
                Some(3600.0),
            );

            prop_assert_eq!(&command.program, "ffmpeg");
            prop_assert!(has_flag_with_value(&command.args, "-i", &source));
            prop_assert!(has_flag_with_value(&command.args, "-c:v", "libsvtav1"));
            prop_assert!(has_flag_with_value(&command.args, "-crf", &crf.to_string()));
            prop_assert!(has_flag_with_value(&command.args, "-c:a", "copy"));
            prop_assert!(has_flag_with_value(&command.args, "-c:s", "copy"));
            prop_assert_eq!(command.args.last().map(String::as_str), Some(dest.as_str()));
            prop_assert_eq!(&command.output_path, &PathBuf::from(&dest));

            let has_vf = command.args.iter().any(|a| a == "-vf");
            prop_assert_eq!(has_vf, deinterlace || crop.is_some());
            if deinterlace {
                prop_assert!(command.args.iter().any(|a| a.contains("yadif")));
            }
            if let Some(c) = &crop {
                let crop_filter = format!("crop={}", c);
                prop_assert!(command.args.iter().any(|a| a.contains(&crop_filter)));
            }
        }
    }
}
