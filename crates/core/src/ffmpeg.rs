//! FFmpeg/FFprobe command utilities.
//!
//! Shared by the video source (stream properties and frame decoding) and the
//! stream inspector (codec identity). Every invocation runs as a child
//! process through [`tokio::process::Command`].

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;

use crate::error::VideoError;

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    #[serde(default)]
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Default, Deserialize)]
pub struct FfprobeStream {
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// e.g. "30/1" or "24000/1001"
    pub r_frame_rate: Option<String>,
    /// Average rate over the whole stream; preferred over `r_frame_rate`.
    pub avg_frame_rate: Option<String>,
    pub duration: Option<String>,
    pub nb_frames: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Default, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run `ffprobe` on a video file and return the parsed JSON output.
pub async fn probe_video(path: &Path) -> Result<FfprobeOutput, VideoError> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(VideoError::VideoNotFound(path.display().to_string()));
    }

    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(VideoError::NotFound)?;

    if !output.status.success() {
        return Err(VideoError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| VideoError::ParseError(format!("{e}: {stdout}")))
}

/// Ask `ffprobe` for the codec name of the first video stream only.
pub async fn probe_codec(path: &Path) -> Result<String, VideoError> {
    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=codec_name",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .await
        .map_err(VideoError::NotFound)?;

    if !output.status.success() {
        return Err(VideoError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    parse_codec_output(&output.stdout)
        .ok_or_else(|| VideoError::NoVideoStream(path.display().to_string()))
}

/// Spawn `ffmpeg` decoding `path` into packed RGB24 frames on stdout.
///
/// The child is killed when dropped, so abandoning the frame stream early
/// never leaves a decoder running.
pub fn spawn_rgb_decoder(path: &Path) -> Result<tokio::process::Child, VideoError> {
    tokio::process::Command::new("ffmpeg")
        .args(rgb_decoder_args(path))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(VideoError::NotFound)
}

/// Arguments for [`spawn_rgb_decoder`].
///
/// Frames keep the coded orientation that ffprobe reports. Without
/// `-noautorotate` a clip carrying a 90/270 degree display matrix would be
/// emitted with width and height swapped.
pub fn rgb_decoder_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-noautorotate", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_owned());
    args.extend(
        ["-f", "rawvideo", "-pix_fmt", "rgb24", "-"]
            .into_iter()
            .map(OsString::from),
    );
    args
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CodecEntries {
    #[serde(default)]
    streams: Vec<CodecStream>,
}

#[derive(Debug, Deserialize)]
struct CodecStream {
    codec_name: Option<String>,
}

/// Extract the codec name from `-show_entries stream=codec_name` output.
fn parse_codec_output(stdout: &[u8]) -> Option<String> {
    serde_json::from_slice::<CodecEntries>(stdout)
        .ok()?
        .streams
        .into_iter()
        .next()?
        .codec_name
        .filter(|c| !c.is_empty())
}

/// Find the first video stream in the ffprobe output.
pub fn first_video_stream(info: &FfprobeOutput) -> Option<&FfprobeStream> {
    info
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
}

/// Parse the video duration in seconds from ffprobe output.
pub fn parse_duration(info: &FfprobeOutput) -> f64 {
    // Try format-level duration first.
    if let Some(d) = &info.format.duration {
        if let Ok(secs) = d.parse::<f64>() {
            return secs;
        }
    }
    // Fall back to the first video stream's duration.
    first_video_stream(info)
        .and_then(|s| s.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Parse the video frame rate from ffprobe output.
///
/// Uses `avg_frame_rate` when it is meaningful, `r_frame_rate` otherwise.
pub fn parse_framerate(info: &FfprobeOutput) -> f64 {
    let Some(stream) = first_video_stream(info) else {
        return 0.0;
    };
    stream
        .avg_frame_rate
        .as_deref()
        .map(parse_fraction)
        .filter(|fps| *fps > 0.0)
        .or_else(|| stream.r_frame_rate.as_deref().map(parse_fraction))
        .unwrap_or(0.0)
}

/// Parse a fraction string like `"30/1"` into a float.
pub fn parse_fraction(s: &str) -> f64 {
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() == 2 {
        let num = parts[0].parse::<f64>().unwrap_or(0.0);
        let den = parts[1].parse::<f64>().unwrap_or(1.0);
        if den > 0.0 {
            return num / den;
        }
    }
    s.parse::<f64>().unwrap_or(0.0)
}

/// Count total frames from ffprobe output.
pub fn parse_total_frames(info: &FfprobeOutput) -> i64 {
    if let Some(stream) = first_video_stream(info) {
        if let Some(nb) = &stream.nb_frames {
            if let Ok(n) = nb.parse::<i64>() {
                return n;
            }
        }
    }
    // Estimate from duration * framerate.
    let duration = parse_duration(info);
    let fps = parse_framerate(info);
    if duration > 0.0 && fps > 0.0 {
        return (duration * fps).round() as i64;
    }
    0
}

/// Find the first video stream's resolution.
pub fn parse_resolution(info: &FfprobeOutput) -> (i32, i32) {
    first_video_stream(info)
        .map(|s| (s.width.unwrap_or(0), s.height.unwrap_or(0)))
        .unwrap_or((0, 0))
}
