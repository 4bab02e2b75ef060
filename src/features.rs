// src/features.rs - Per-frame posture, eye-contact and gesture signals
use crate::error::{AnalysisError, Result};
use crate::landmarks::{face_mesh, pose, Keypoints, LandmarkSet, MAX_HANDS};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Returned by a scorer that could not evaluate its landmarks.
pub const NEUTRAL_SCORE: f64 = 50.0;

pub const GOOD_POSTURE_THRESHOLD: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostureClass {
    Good,
    Slouching,
}

impl PostureClass {
    pub fn classify(posture_score: f64) -> Self {
        if posture_score >= GOOD_POSTURE_THRESHOLD {
            PostureClass::Good
        } else {
            PostureClass::Slouching
        }
    }
}

/// Scalars derived from one frame's landmarks. Frames are scored in
/// isolation; nothing carries over from the previous frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameFeatures {
    pub frame_index: usize,
    pub posture_score: Option<f64>,
    pub eye_contact_score: Option<f64>,
    pub hand_presence_count: u8,
}

impl FrameFeatures {
    /// Consumes the frame's landmarks.
    pub fn extract(frame_index: usize, landmarks: LandmarkSet) -> Self {
        Self {
            frame_index,
            posture_score: landmarks.pose.as_ref().map(posture_score),
            eye_contact_score: landmarks.face.as_ref().map(eye_contact_score),
            hand_presence_count: hand_presence_count(&landmarks.hands),
        }
    }

    pub fn posture_class(&self) -> Option<PostureClass> {
        self.posture_score.map(PostureClass::classify)
    }
}

fn landmark<'a>(points: &'a Keypoints, index: usize, name: &str) -> Result<&'a Vector3<f64>> {
    let point = points.get(index).ok_or_else(|| {
        AnalysisError::FeatureComputation(format!("missing {} landmark (index {})", name, index))
    })?;

    if !(point.x.is_finite() && point.y.is_finite() && point.z.is_finite()) {
        return Err(AnalysisError::FeatureComputation(format!(
            "non-finite {} landmark",
            name
        )));
    }
    Ok(point)
}

fn finite(score: f64, what: &str) -> Result<f64> {
    if score.is_finite() {
        Ok(score)
    } else {
        Err(AnalysisError::FeatureComputation(format!("{} is not finite", what)))
    }
}

/// Bands the hip-to-shoulder vertical gap. Larger gaps mean a more upright
/// torso.
pub fn spine_score(spine_alignment: f64) -> f64 {
    if spine_alignment > 0.15 {
        100.0
    } else if spine_alignment > 0.10 {
        75.0
    } else if spine_alignment > 0.05 {
        50.0
    } else {
        25.0
    }
}

/// Combines shoulder levelness, spine uprightness and forward-head depth.
pub fn try_posture_score(points: &Keypoints) -> Result<f64> {
    let left_shoulder = landmark(points, pose::LEFT_SHOULDER, "left shoulder")?;
    let right_shoulder = landmark(points, pose::RIGHT_SHOULDER, "right shoulder")?;
    let left_hip = landmark(points, pose::LEFT_HIP, "left hip")?;
    let right_hip = landmark(points, pose::RIGHT_HIP, "right hip")?;
    let nose = landmark(points, pose::NOSE, "nose")?;

    let shoulder_diff = (left_shoulder.y - right_shoulder.y).abs();
    let shoulder_score = (100.0 - shoulder_diff * 500.0).max(0.0);

    let avg_shoulder_y = (left_shoulder.y + right_shoulder.y) / 2.0;
    let avg_hip_y = (left_hip.y + right_hip.y) / 2.0;
    let spine = spine_score(avg_hip_y - avg_shoulder_y);

    let head_forward = (nose.z - left_shoulder.z).abs();
    let head_score = (100.0 - head_forward * 300.0).max(0.0);

    let score = shoulder_score * 0.3 + spine * 0.5 + head_score * 0.2;
    Ok(finite(score, "posture score")?.clamp(0.0, 100.0))
}

pub fn posture_score(points: &Keypoints) -> f64 {
    try_posture_score(points).unwrap_or_else(|e| {
        warn!("Posture scoring failed, using neutral score: {}", e);
        NEUTRAL_SCORE
    })
}

/// Eye-contact proxy from face-mesh geometry.
///
/// Wide apparent eye separation with the nose not receding suggests a
/// frontal face. This is an uncalibrated heuristic, not gaze estimation.
pub fn try_eye_contact_score(points: &Keypoints) -> Result<f64> {
    let nose_tip = landmark(points, face_mesh::NOSE_TIP, "nose tip")?;
    let left_eye = landmark(points, face_mesh::LEFT_EYE_OUTER, "left eye")?;
    let right_eye = landmark(points, face_mesh::RIGHT_EYE_OUTER, "right eye")?;

    let eye_diff = (left_eye.x - right_eye.x).abs();

    let score = if eye_diff > 0.10 && nose_tip.z > -0.10 {
        85.0
    } else if eye_diff > 0.08 {
        70.0
    } else if eye_diff > 0.05 {
        55.0
    } else {
        40.0
    };
    Ok(score)
}

pub fn eye_contact_score(points: &Keypoints) -> f64 {
    try_eye_contact_score(points).unwrap_or_else(|e| {
        warn!("Eye-contact scoring failed, using neutral score: {}", e);
        NEUTRAL_SCORE
    })
}

/// Number of visible hands, at most two. No gesture classification.
pub fn hand_presence_count(hands: &[Keypoints]) -> u8 {
    hands.len().min(MAX_HANDS) as u8
}
