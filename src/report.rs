// src/report.rs
use crate::aggregate::SessionAggregate;
use crate::feedback::FeedbackSet;
use crate::video::VideoInfo;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Final body-language result. Every field is populated in every state;
/// callers tell degraded runs apart through `degraded` and `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyLanguageReport {
    pub duration_seconds: f64,
    pub frames_analyzed: usize,
    pub total_frames: usize,
    pub posture_score: f64,
    pub eye_contact_score: f64,
    pub gesture_score: f64,
    pub body_language_score: f64,
    pub posture_feedback: String,
    pub facial_expression_feedback: String,
    pub gesture_feedback: String,
    pub overall_presence_feedback: String,
    pub degraded: bool,
    pub error: Option<String>,
}

/// Keeps every score inside [0, 100]; NaN collapses to 0.
fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl BodyLanguageReport {
    pub fn full(aggregate: &SessionAggregate, total_frames: usize) -> Self {
        let feedback = FeedbackSet::from_aggregate(aggregate);
        Self {
            duration_seconds: aggregate.duration_seconds,
            frames_analyzed: aggregate.frames_analyzed,
            total_frames,
            posture_score: clamp_score(aggregate.mean_posture),
            eye_contact_score: clamp_score(aggregate.mean_eye_contact),
            gesture_score: clamp_score(aggregate.gesture_score()),
            body_language_score: clamp_score(aggregate.body_language_score()),
            posture_feedback: feedback.posture,
            facial_expression_feedback: feedback.facial_expression,
            gesture_feedback: feedback.gesture,
            overall_presence_feedback: feedback.overall_presence,
            degraded: false,
            error: None,
        }
    }

    /// Metadata-only report for runs without landmark estimation.
    pub fn basic(info: &VideoInfo) -> Self {
        let duration_seconds = info.duration_seconds();
        let feedback = FeedbackSet::capability_missing(duration_seconds);
        Self {
            duration_seconds,
            frames_analyzed: 0,
            total_frames: info.frame_count,
            posture_score: 0.0,
            eye_contact_score: 0.0,
            gesture_score: 0.0,
            body_language_score: 0.0,
            posture_feedback: feedback.posture,
            facial_expression_feedback: feedback.facial_expression,
            gesture_feedback: feedback.gesture,
            overall_presence_feedback: feedback.overall_presence,
            degraded: true,
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        let mut reason = reason.into();
        if reason.trim().is_empty() {
            reason = "unknown analysis failure".to_string();
        }
        let feedback = FeedbackSet::unable_to_analyze();
        Self {
            duration_seconds: 0.0,
            frames_analyzed: 0,
            total_frames: 0,
            posture_score: 0.0,
            eye_contact_score: 0.0,
            gesture_score: 0.0,
            body_language_score: 0.0,
            posture_feedback: feedback.posture,
            facial_expression_feedback: feedback.facial_expression,
            gesture_feedback: feedback.gesture,
            overall_presence_feedback: feedback.overall_presence,
            degraded: true,
            error: Some(reason),
        }
    }

    /// Rounded analysis payload for the language-model feedback step.
    pub fn to_prompt_data(&self) -> Value {
        let mut data = json!({
            "duration_seconds": round1(self.duration_seconds),
            "frames_analyzed": self.frames_analyzed,
            "total_frames": self.total_frames,
            "posture_score": round1(self.posture_score),
            "eye_contact_score": round1(self.eye_contact_score),
            "gesture_score": round1(self.gesture_score),
            "body_language_score": round1(self.body_language_score),
            "posture": self.posture_feedback,
            "facial_expressions": self.facial_expression_feedback,
            "gestures": self.gesture_feedback,
            "overall_presence": self.overall_presence_feedback,
            "degraded": self.degraded,
        });
        if let Some(error) = &self.error {
            data["error"] = Value::String(error.clone());
        }
        data
    }

    pub fn scores(&self) -> [f64; 4] {
        [
            self.posture_score,
            self.eye_contact_score,
            self.gesture_score,
            self.body_language_score,
        ]
    }
}
