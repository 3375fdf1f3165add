//! Media probing and delivery-format conversion via ffprobe / ffmpeg

use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::handlers::Dimensions;

/// Scale filter rounding both sides down to even values
pub const EVEN_SCALE_FILTER: &str = "scale=trunc(iw/2)*2:trunc(ih/2)*2";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("unreadable probe output: {0}")]
    InvalidOutput(String),

    #[error("expected exactly one video stream, found {0}")]
    StreamCount(usize),

    #[error("video stream has no usable dimensions")]
    MissingDimensions,
}

pub type Result<T> = std::result::Result<T, MediaError>;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u64>,
    height: Option<u64>,
}

/// Parse `ffprobe -show_streams -select_streams v -of json` output
pub fn parse_probe_output(raw: &[u8]) -> Result<Dimensions> {
    let output: ProbeOutput =
        serde_json::from_slice(raw).map_err(|e| MediaError::InvalidOutput(e.to_string()))?;

    if output.streams.len() != 1 {
        return Err(MediaError::StreamCount(output.streams.len()));
    }

    let stream = &output.streams[0];
    Dimensions::from_parts(stream.width, stream.height).ok_or(MediaError::MissingDimensions)
}

/// ffmpeg arguments turning `source` into an even-sized, yuv420p, fast-start MP4
pub fn delivery_args(source: &Path, dest: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(source.into());
    args.extend(
        [
            "-vsync", "0", "-vf", EVEN_SCALE_FILTER,
            "-pix_fmt", "yuv420p", "-movflags", "+faststart",
        ]
        .into_iter()
        .map(OsString::from),
    );
    args.push(dest.into());
    args
}

/// Paths to the ffmpeg tool binaries
#[derive(Debug, Clone)]
pub struct MediaTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for MediaTools {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl MediaTools {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Pixel dimensions of the single video stream in `path`
    pub async fn probe(&self, path: &Path) -> Result<Dimensions> {
        let output = run(
            Command::new(&self.ffprobe)
                .args(["-v", "error", "-select_streams", "v", "-show_streams", "-of", "json"])
                .arg(path),
            &self.ffprobe,
        )
        .await?;

        let dim = parse_probe_output(&output)?;
        debug!(path = %path.display(), width = dim.width, height = dim.height, "Probed media");
        Ok(dim)
    }

    /// Transcode `source` into an even-sized, yuv420p, fast-start MP4 at `dest`
    pub async fn convert_to_delivery_format(&self, source: &Path, dest: &Path) -> Result<()> {
        run(
            Command::new(&self.ffmpeg).args(delivery_args(source, dest)),
            &self.ffmpeg,
        )
        .await?;

        info!(source = %source.display(), dest = %dest.display(), "Converted to delivery format");
        Ok(())
    }
}

async fn run(command: &mut Command, tool: &Path) -> Result<Vec<u8>> {
    let tool = tool.display().to_string();
    let output = command
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| MediaError::Spawn {
            tool: tool.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(MediaError::Failed {
            tool,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_single_stream() {
        let raw = br#"{"streams": [{"index": 0, "codec_type": "video", "width": 1280, "height": 720}]}"#;
        let dim = parse_probe_output(raw).unwrap();
        assert_eq!(dim, Dimensions { width: 1280, height: 720 });
    }

    #[test]
    fn test_parse_requires_exactly_one_stream() {
        let none = br#"{"streams": []}"#;
        assert!(matches!(parse_probe_output(none), Err(MediaError::StreamCount(0))));

        let missing = br#"{}"#;
        assert!(matches!(parse_probe_output(missing), Err(MediaError::StreamCount(0))));

        let two = br#"{"streams": [{"width": 1, "height": 1}, {"width": 2, "height": 2}]}"#;
        assert!(matches!(parse_probe_output(two), Err(MediaError::StreamCount(2))));
    }

    #[test]
    fn test_parse_missing_dimensions() {
        let raw = br#"{"streams": [{"codec_type": "video"}]}"#;
        assert!(matches!(parse_probe_output(raw), Err(MediaError::MissingDimensions)));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_probe_output(b"not json"),
            Err(MediaError::InvalidOutput(_))
        ));
    }

    #[test]
    fn test_delivery_args_force_even_faststart_output() {
        let args = delivery_args(Path::new("/tmp/in.gif"), Path::new("/tmp/out.mp4"));
        let args: Vec<&str> = args.iter().map(|a| a.to_str().unwrap()).collect();

        let after = |flag: &str| {
            let at = args.iter().position(|a| *a == flag).unwrap();
            args[at + 1]
        };
        assert_eq!(after("-i"), "/tmp/in.gif");
        assert_eq!(after("-vf"), EVEN_SCALE_FILTER);
        assert_eq!(after("-pix_fmt"), "yuv420p");
        assert_eq!(after("-movflags"), "+faststart");
        assert_eq!(args.last(), Some(&"/tmp/out.mp4"));
        assert!(args.contains(&"-y"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let tools = MediaTools::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        let result = tools.probe(Path::new("/nonexistent/video.mp4")).await;
        assert!(matches!(result, Err(MediaError::Spawn { .. })));
    }

    async fn ffmpeg_available() -> bool {
        let ffmpeg = Command::new("ffmpeg").arg("-version").output().await;
        let ffprobe = Command::new("ffprobe").arg("-version").output().await;
        matches!((ffmpeg, ffprobe), (Ok(a), Ok(b)) if a.status.success() && b.status.success())
    }

    #[tokio::test]
    async fn test_convert_rounds_odd_dimensions_to_even() {
        if !ffmpeg_available().await {
            eprintln!("skipping: ffmpeg/ffprobe not installed");
            return;
        }

        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("odd.gif");
        let dest = tmp.path().join("even.mp4");

        let status = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-y", "-f", "lavfi"])
            .args(["-i", "testsrc=size=33x17:rate=5:duration=1"])
            .arg(&source)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        let tools = MediaTools::default();
        tools.convert_to_delivery_format(&source, &dest).await.unwrap();

        let dim = tools.probe(&dest).await.unwrap();
        assert_eq!(dim, Dimensions { width: 32, height: 16 });
    }
}
