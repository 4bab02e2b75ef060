// src/aggregate.rs
use crate::features::{FrameFeatures, PostureClass, NEUTRAL_SCORE};
use serde::{Deserialize, Serialize};

pub const POSTURE_WEIGHT: f64 = 0.4;
pub const EYE_CONTACT_WEIGHT: f64 = 0.35;
pub const GESTURE_WEIGHT: f64 = 0.25;

/// Session-level reduction of the per-frame feature series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAggregate {
    pub mean_posture: f64,
    pub mean_eye_contact: f64,
    pub mean_gesture: f64,
    pub good_posture_frames: usize,
    pub slouching_frames: usize,
    pub frames_analyzed: usize,
    pub duration_seconds: f64,
}

/// Mean over the present values only. Summed in sorted order so the result
/// does not depend on frame order.
fn mean(mut values: Vec<f64>, default: f64) -> f64 {
    if values.is_empty() {
        return default;
    }
    values.sort_by(f64::total_cmp);
    values.iter().sum::<f64>() / values.len() as f64
}

impl SessionAggregate {
    pub fn from_features(features: &[FrameFeatures], duration_seconds: f64) -> Self {
        let postures: Vec<f64> = features.iter().filter_map(|f| f.posture_score).collect();
        let eye_contact: Vec<f64> = features.iter().filter_map(|f| f.eye_contact_score).collect();
        // Frames without hands count as zero here, unlike the scores above.
        let hands: Vec<f64> = features
            .iter()
            .map(|f| f64::from(f.hand_presence_count))
            .collect();

        let good_posture_frames = features
            .iter()
            .filter(|f| f.posture_class() == Some(PostureClass::Good))
            .count();
        let slouching_frames = features
            .iter()
            .filter(|f| f.posture_class() == Some(PostureClass::Slouching))
            .count();

        Self {
            mean_posture: mean(postures, NEUTRAL_SCORE),
            mean_eye_contact: mean(eye_contact, NEUTRAL_SCORE),
            mean_gesture: mean(hands, 0.0),
            good_posture_frames,
            slouching_frames,
            frames_analyzed: features.len(),
            duration_seconds,
        }
    }

    pub fn gesture_score(&self) -> f64 {
        (self.mean_gesture * 10.0).min(100.0)
    }

    pub fn body_language_score(&self) -> f64 {
        self.mean_posture * POSTURE_WEIGHT
            + self.mean_eye_contact * EYE_CONTACT_WEIGHT
            + self.gesture_score() * GESTURE_WEIGHT
    }

    /// Frames that produced a posture score.
    pub fn posture_frames(&self) -> usize {
        self.good_posture_frames + self.slouching_frames
    }

    /// Share of posture-scored frames classified as slouching, in percent.
    pub fn slouch_percentage(&self) -> f64 {
        match self.posture_frames() {
            0 => 0.0,
            total => self.slouching_frames as f64 / total as f64 * 100.0,
        }
    }
}
