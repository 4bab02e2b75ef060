// src/data.rs
use crate::features::{FrameFeatures, PostureClass};
use anyhow::Result;
use chrono::Local;
use csv::Writer;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct FeatureRecord {
    frame: usize,
    timestamp_seconds: Option<f64>,
    posture_score: Option<f64>,
    posture_class: Option<String>,
    eye_contact_score: Option<f64>,
    hands_visible: u8,
}

/// Writes the per-frame feature series of one analysis to CSV.
pub struct FeatureExporter {
    output_dir: PathBuf,
    session_name: String,
}

impl FeatureExporter {
    pub fn new(output_dir: impl AsRef<Path>, session_name: Option<String>) -> Self {
        let session_name = session_name.unwrap_or_else(|| {
            format!("session_{}", Local::now().format("%Y%m%d_%H%M%S"))
        });

        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            session_name,
        }
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// `fps` converts frame indices to clip timestamps; pass 0 when unknown.
    pub fn export_csv(&self, features: &[FrameFeatures], fps: f64) -> Result<PathBuf> {
        let csv_path = self
            .output_dir
            .join(&self.session_name)
            .join("frame_features.csv");

        if let Some(parent) = csv_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(&csv_path)?;
        let mut writer = Writer::from_writer(file);

        for frame in features {
            writer.serialize(Self::create_record(frame, fps))?;
        }

        writer.flush()?;
        Ok(csv_path)
    }

    fn create_record(frame: &FrameFeatures, fps: f64) -> FeatureRecord {
        FeatureRecord {
            frame: frame.frame_index,
            timestamp_seconds: (fps > 0.0).then(|| frame.frame_index as f64 / fps),
            posture_score: frame.posture_score,
            posture_class: frame.posture_class().map(|class| match class {
                PostureClass::Good => "good".to_string(),
                PostureClass::Slouching => "slouching".to_string(),
            }),
            eye_contact_score: frame.eye_contact_score,
            hands_visible: frame.hand_presence_count,
        }
    }
}
