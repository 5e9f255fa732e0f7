//! Video access seams: a frame source and a stream inspector.
//!
//! The pipeline only talks to the [`VideoSource`] and [`StreamInspector`]
//! traits. [`FfmpegVideoSource`] and [`FfprobeInspector`] are the production
//! implementations backed by `ffprobe`/`ffmpeg` child processes.

use std::future::Future;
use std::path::Path;

use futures::stream::{BoxStream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStdout};

use crate::error::VideoError;
use crate::ffmpeg;

/// One decoded frame as packed RGB24 pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, row-major.
    pub data: Vec<u8>,
}

impl Frame {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }
}

/// Container-level properties of the first video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamProperties {
    pub frame_count: i64,
    pub fps: f64,
    pub width: i32,
    pub height: i32,
}

/// Lazy, finite, non-restartable sequence of decoded frames in file order.
pub type FrameStream = BoxStream<'static, Result<Frame, VideoError>>;

/// Opens video files for probing and sequential decoding.
pub trait VideoSource: Send + Sync {
    /// Read frame count, frame rate and dimensions without decoding.
    fn properties(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<StreamProperties, VideoError>> + Send;

    /// Open the file and return its frames from the first one onwards.
    ///
    /// An `Err` means the stream could not be opened at all.
    fn frames(&self, path: &Path) -> impl Future<Output = Result<FrameStream, VideoError>> + Send;
}

/// External stream-inspection capability used to recover codec identity.
pub trait StreamInspector: Send + Sync {
    /// Short codec name of the first video stream, e.g. `"h264"`.
    fn codec(&self, path: &Path) -> impl Future<Output = Result<String, VideoError>> + Send;
}

// ---------------------------------------------------------------------------
// ffmpeg-backed implementations
// ---------------------------------------------------------------------------

/// [`VideoSource`] backed by `ffprobe` for properties and `ffmpeg` for decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegVideoSource;

impl VideoSource for FfmpegVideoSource {
    async fn properties(&self, path: &Path) -> Result<StreamProperties, VideoError> {
        let info = ffmpeg::probe_video(path).await?;
        if ffmpeg::first_video_stream(&info).is_none() {
            return Err(VideoError::NoVideoStream(path.display().to_string()));
        }
        let (width, height) = ffmpeg::parse_resolution(&info);
        Ok(StreamProperties {
            frame_count: ffmpeg::parse_total_frames(&info),
            fps: ffmpeg::parse_framerate(&info),
            width,
            height,
        })
    }

    async fn frames(&self, path: &Path) -> Result<FrameStream, VideoError> {
        let props = self.properties(path).await?;
        if props.width <= 0 || props.height <= 0 {
            return Err(VideoError::NoVideoStream(path.display().to_string()));
        }
        let (width, height) = (props.width as u32, props.height as u32);

        let mut child = ffmpeg::spawn_rgb_decoder(path)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VideoError::Decode("ffmpeg stdout not captured".into()))?;

        let decoder = RawDecoder {
            _child: child,
            stdout,
            width,
            height,
            frame_len: width as usize * height as usize * 3,
        };
        Ok(decoder.into_stream())
    }
}

/// [`StreamInspector`] running a dedicated `ffprobe` per file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfprobeInspector;

impl StreamInspector for FfprobeInspector {
    async fn codec(&self, path: &Path) -> Result<String, VideoError> {
        ffmpeg::probe_codec(path).await
    }
}

/// Splits the rawvideo byte stream of a running decoder into frames.
struct RawDecoder {
    /// Held so the decoder lives exactly as long as the stream.
    _child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    frame_len: usize,
}

impl RawDecoder {
    fn into_stream(self) -> FrameStream {
        futures::stream::unfold(Some(self), |state| async move {
            let mut decoder = state?;
            let mut buf = vec![0u8; decoder.frame_len];
            match read_up_to(&mut decoder.stdout, &mut buf).await {
                // A short trailing read is a truncated frame, not a frame.
                Ok(n) if n < decoder.frame_len => None,
                Ok(_) => {
                    let frame = Frame {
                        width: decoder.width,
                        height: decoder.height,
                        data: buf,
                    };
                    Some((Ok(frame), Some(decoder)))
                }
                Err(e) => Some((Err(VideoError::Io(e)), None)),
            }
        })
        .boxed()
    }
}

/// Fill `buf` from `reader` until it is full or the reader hits EOF.
/// Returns the number of bytes read.
async fn read_up_to<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
