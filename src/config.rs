// src/config.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// External landmark estimator. `None` runs the metadata-only pipeline.
    pub landmark_command: Option<PathBuf>,
    /// Arguments placed before the modality, e.g. a script path.
    pub landmark_args: Vec<String>,
    pub temp_dir: PathBuf,
    pub max_video_size_mb: u64,
    pub supported_video_formats: Vec<String>,
    /// Wall-clock limit for one analysis, subprocesses included. Zero
    /// disables it.
    pub analysis_timeout_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            landmark_command: None,
            landmark_args: Vec::new(),
            temp_dir: std::env::temp_dir(),
            max_video_size_mb: 100,
            supported_video_formats: [".mp4", ".avi", ".mov", ".webm"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            analysis_timeout_secs: 120,
        }
    }
}

impl AnalyzerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// `<config dir>/presence-analyzer/config.json` for the current user.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "presence-analyzer")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Loads an explicit path, falling back to the default location and then
    /// to built-in defaults when no file exists there.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_upload_limits() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.max_video_size_mb, 100);
        assert_eq!(config.supported_video_formats.len(), 4);
        assert!(config.landmark_command.is_none());
        assert!(config.landmark_args.is_empty());
        assert_eq!(config.analysis_timeout_secs, 120);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "landmark_command": "/opt/landmarks/bin/estimate", "max_video_size_mb": 50 }}"#
        )
        .unwrap();

        let config = AnalyzerConfig::load(file.path()).unwrap();
        assert_eq!(
            config.landmark_command,
            Some(PathBuf::from("/opt/landmarks/bin/estimate"))
        );
        assert_eq!(config.max_video_size_mb, 50);
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(AnalyzerConfig::load(file.path()).is_err());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(AnalyzerConfig::load_or_default(Some(&missing)).is_err());
    }
}
