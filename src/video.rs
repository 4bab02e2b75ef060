// src/video.rs - Clip probing, single-frame decode and per-call temp storage
use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, Result};
use crate::process::{self, Deadline};
use image::DynamicImage;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub fps: f64,
    pub frame_count: usize,
    pub width: u32,
    pub height: u32,
}

impl VideoInfo {
    /// Clip length in seconds; zero when the frame rate is unknown.
    pub fn duration_seconds(&self) -> f64 {
        if self.fps.is_finite() && self.fps > 0.0 {
            self.frame_count as f64 / self.fps
        } else {
            0.0
        }
    }
}

/// A decodable clip that can hand out individual frames by index.
pub trait FrameSource {
    fn info(&self) -> &VideoInfo;

    fn read_frame(&mut self, index: usize) -> Result<DynamicImage>;
}

/// Scratch directory owned by a single analysis call. Removed on drop, so
/// every exit path (including unwinding) releases the decoded media.
pub struct TempWorkspace {
    dir: PathBuf,
}

impl TempWorkspace {
    pub fn create(base: impl AsRef<Path>) -> Result<Self> {
        let dir = base
            .as_ref()
            .join(format!("presence_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).map_err(|e| AnalysisError::io(&dir, e))?;
        debug!("Created workspace {}", dir.display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Stores the uploaded clip, keeping the original extension so the
    /// demuxer can use it as a hint.
    pub fn write_input(&self, bytes: &[u8], original_filename: &str) -> Result<PathBuf> {
        let extension = Path::new(original_filename)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        let path = self.dir.join(format!("input{}", extension));
        fs::write(&path, bytes).map_err(|e| AnalysisError::io(&path, e))?;
        Ok(path)
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove workspace {}: {}", self.dir.display(), e);
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    nb_read_frames: Option<String>,
}

/// Parses ffprobe rates such as `30000/1001` or `25`. A zero denominator
/// yields zero rather than infinity.
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                0.0
            } else {
                num / den
            }
        }
        None => raw.parse().ok()?,
    };
    rate.is_finite().then_some(rate.max(0.0))
}

fn parse_probe_output(json: &str) -> Result<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| AnalysisError::MediaOpen(format!("unreadable ffprobe output: {}", e)))?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| AnalysisError::MediaOpen("no video stream found".to_string()))?;

    let fps = [&stream.r_frame_rate, &stream.avg_frame_rate]
        .into_iter()
        .flatten()
        .filter_map(|rate| parse_frame_rate(rate))
        .find(|rate| *rate > 0.0)
        .unwrap_or(0.0);

    let frame_count = [&stream.nb_frames, &stream.nb_read_frames]
        .into_iter()
        .flatten()
        .filter_map(|count| count.trim().parse::<usize>().ok())
        .find(|count| *count > 0)
        .unwrap_or(0);

    if frame_count == 0 {
        return Err(AnalysisError::MediaOpen("video has no frames".to_string()));
    }

    Ok(VideoInfo {
        fps,
        frame_count,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
    })
}

/// ffmpeg-backed clip reader. Frames are decoded one at a time into the
/// call's workspace and removed as soon as they are loaded.
#[derive(Debug)]
pub struct VideoFileReader {
    path: PathBuf,
    info: VideoInfo,
    ffmpeg_path: PathBuf,
    scratch_dir: PathBuf,
    deadline: Deadline,
}

impl VideoFileReader {
    /// Probes the clip. Every ffprobe/ffmpeg child this reader starts is
    /// killed once `deadline` passes.
    pub fn open(
        path: impl AsRef<Path>,
        workspace: &TempWorkspace,
        config: &AnalyzerConfig,
        deadline: Deadline,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(AnalysisError::MediaOpen(format!(
                "video file does not exist: {}",
                path.display()
            )));
        }

        let mut command = Command::new(&config.ffprobe_path);
        command
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-count_frames",
                "-show_entries",
                "stream=width,height,r_frame_rate,avg_frame_rate,nb_frames,nb_read_frames",
                "-of",
                "json",
            ])
            .arg(&path);
        let output = process::run(&mut command, None, deadline).map_err(|e| {
            if process::is_timeout(&e) {
                deadline.timeout_error()
            } else {
                AnalysisError::MediaOpen(format!(
                    "failed to run {}: {}",
                    config.ffprobe_path.display(),
                    e
                ))
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalysisError::MediaOpen(format!(
                "invalid video format or corrupted file: {}",
                stderr.trim()
            )));
        }

        let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout))?;
        info!(
            "Opened {}: {} frames at {:.2} fps ({}x{})",
            path.display(),
            info.frame_count,
            info.fps,
            info.width,
            info.height
        );

        Ok(Self {
            path,
            info,
            ffmpeg_path: config.ffmpeg_path.clone(),
            scratch_dir: workspace.path().to_path_buf(),
            deadline,
        })
    }
}

impl FrameSource for VideoFileReader {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn read_frame(&mut self, index: usize) -> Result<DynamicImage> {
        let frame_path = self.scratch_dir.join(format!("frame_{:06}.png", index));
        let decode_error = |reason: String| AnalysisError::FrameDecode { index, reason };
        let select = format!("select=eq(n\\,{})", index);

        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(["-v", "error", "-i"])
            .arg(&self.path)
            .args([
                "-vf",
                select.as_str(),
                "-vsync",
                "vfr",
                "-frames:v",
                "1",
                "-y",
            ])
            .arg(&frame_path);
        let output = process::run(&mut command, None, self.deadline).map_err(|e| {
            if process::is_timeout(&e) {
                self.deadline.timeout_error()
            } else {
                decode_error(format!("failed to run ffmpeg: {}", e))
            }
        })?;

        if !output.status.success() || !frame_path.exists() {
            return Err(decode_error(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let frame = image::open(&frame_path).map_err(|e| decode_error(e.to_string()));
        let _ = fs::remove_file(&frame_path);
        frame
    }
}

pub fn validate_file_size(len_bytes: u64, max_size_mb: u64) -> bool {
    len_bytes as f64 / (1024.0 * 1024.0) <= max_size_mb as f64
}

pub fn validate_file_format(filename: &str, allowed_formats: &[String]) -> bool {
    let filename = filename.to_lowercase();
    allowed_formats
        .iter()
        .any(|format| filename.ends_with(&format.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn frame_rate_fractions() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), Some(0.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn duration_is_zero_without_fps() {
        let info = VideoInfo {
            fps: 0.0,
            frame_count: 300,
            width: 640,
            height: 480,
        };
        assert_eq!(info.duration_seconds(), 0.0);

        let info = VideoInfo { fps: 30.0, ..info };
        assert_eq!(info.duration_seconds(), 10.0);
    }

    #[test]
    fn probe_prefers_container_frame_count() {
        let json = r#"{"streams":[{"width":1280,"height":720,"r_frame_rate":"30/1",
            "avg_frame_rate":"30/1","nb_frames":"301","nb_read_frames":"300"}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.frame_count, 301);
        assert_eq!(info.fps, 30.0);
        assert_eq!((info.width, info.height), (1280, 720));
    }

    #[test]
    fn probe_falls_back_to_counted_frames() {
        // webm containers usually omit nb_frames
        let json = r#"{"streams":[{"width":640,"height":480,"r_frame_rate":"0/0",
            "avg_frame_rate":"24/1","nb_read_frames":"48"}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.frame_count, 48);
        assert_eq!(info.fps, 24.0);
    }

    #[test]
    fn probe_without_streams_cannot_open() {
        assert_matches!(
            parse_probe_output(r#"{"streams":[]}"#),
            Err(AnalysisError::MediaOpen(_))
        );
        assert_matches!(
            parse_probe_output(r#"{"streams":[{"r_frame_rate":"30/1","nb_frames":"0"}]}"#),
            Err(AnalysisError::MediaOpen(_))
        );
    }

    #[test]
    fn workspace_is_removed_on_drop() {
        let base = tempfile::tempdir().unwrap();
        let dir;
        {
            let workspace = TempWorkspace::create(base.path()).unwrap();
            let input = workspace.write_input(b"bytes", "answer.MP4").unwrap();
            assert!(input.ends_with("input.mp4"));
            dir = workspace.path().to_path_buf();
            assert!(dir.exists());
        }
        assert!(!dir.exists());
    }

    #[test]
    fn missing_file_cannot_open() {
        let base = tempfile::tempdir().unwrap();
        let workspace = TempWorkspace::create(base.path()).unwrap();
        let result = VideoFileReader::open(
            workspace.path().join("absent.mp4"),
            &workspace,
            &AnalyzerConfig::default(),
            Deadline::unbounded(),
        );
        assert_matches!(result, Err(AnalysisError::MediaOpen(_)));
    }

    #[test]
    fn upload_validation() {
        let formats = AnalyzerConfig::default().supported_video_formats;
        assert!(validate_file_format("Answer.MOV", &formats));
        assert!(!validate_file_format("answer.mkv", &formats));
        assert!(validate_file_size(100 * 1024 * 1024, 100));
        assert!(!validate_file_size(100 * 1024 * 1024 + 1, 100));
    }
}
