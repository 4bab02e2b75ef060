// src/feedback.rs - Every user-facing body-language sentence lives here
use crate::aggregate::SessionAggregate;
use serde::{Deserialize, Serialize};

pub const UNABLE_TO_ANALYZE: &str = "Unable to analyze";

const POSTURE_BANDS: [f64; 3] = [80.0, 65.0, 50.0];
const EYE_CONTACT_BANDS: [f64; 3] = [75.0, 60.0, 45.0];
const GESTURE_BANDS: [f64; 3] = [1.5, 0.8, 0.3];
const OVERALL_BANDS: [f64; 3] = [80.0, 65.0, 50.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Band {
    Excellent,
    Good,
    NeedsImprovement,
    Poor,
}

impl Band {
    /// `thresholds` are the inclusive lower bounds of the first three bands,
    /// highest first.
    pub fn from_value(value: f64, thresholds: [f64; 3]) -> Self {
        if value >= thresholds[0] {
            Band::Excellent
        } else if value >= thresholds[1] {
            Band::Good
        } else if value >= thresholds[2] {
            Band::NeedsImprovement
        } else {
            Band::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackSet {
    pub posture: String,
    pub facial_expression: String,
    pub gesture: String,
    pub overall_presence: String,
}

impl FeedbackSet {
    pub fn from_aggregate(aggregate: &SessionAggregate) -> Self {
        Self {
            posture: posture_feedback(aggregate),
            facial_expression: eye_contact_feedback(aggregate.mean_eye_contact),
            gesture: gesture_feedback(aggregate.mean_gesture),
            overall_presence: overall_feedback(
                aggregate.body_language_score(),
                aggregate.duration_seconds,
            ),
        }
    }

    /// Guidance for clips analyzed without a landmark estimator.
    pub fn capability_missing(duration_seconds: f64) -> Self {
        Self {
            posture: "Landmark estimation is not available. Configure a landmark estimator \
                      (landmark_command) for detailed posture analysis."
                .to_string(),
            facial_expression: "Eye-contact analysis requires a landmark estimator.".to_string(),
            gesture: "Configure a landmark estimator for hand gesture tracking.".to_string(),
            overall_presence: format!(
                "Video duration: {:.1}s. Configure a landmark estimator for body language \
                 analysis.",
                duration_seconds
            ),
        }
    }

    pub fn unable_to_analyze() -> Self {
        Self {
            posture: UNABLE_TO_ANALYZE.to_string(),
            facial_expression: UNABLE_TO_ANALYZE.to_string(),
            gesture: UNABLE_TO_ANALYZE.to_string(),
            overall_presence: UNABLE_TO_ANALYZE.to_string(),
        }
    }
}

pub fn posture_feedback(aggregate: &SessionAggregate) -> String {
    let slouch_pct = aggregate.slouch_percentage();

    match Band::from_value(aggregate.mean_posture, POSTURE_BANDS) {
        Band::Excellent => format!(
            "Excellent posture maintained throughout! ({}/{} frames with good posture)",
            aggregate.good_posture_frames,
            aggregate.posture_frames()
        ),
        Band::Good => format!(
            "Good overall posture. Minor adjustments: keep shoulders level and spine straight. \
             ({:.0}% of the time showed slight slouching)",
            slouch_pct
        ),
        Band::NeedsImprovement => format!(
            "Posture needs improvement. You slouched {:.0}% of the time. \
             Sit up straighter and keep your shoulders back.",
            slouch_pct
        ),
        Band::Poor => format!(
            "Poor posture detected. Slouching was observed {:.0}% of the time. \
             Maintain an upright position with shoulders back and spine straight.",
            slouch_pct
        ),
    }
}

pub fn eye_contact_feedback(score: f64) -> String {
    let text = match Band::from_value(score, EYE_CONTACT_BANDS) {
        Band::Excellent => {
            "Excellent eye contact maintained with the camera. Shows confidence and engagement."
        }
        Band::Good => {
            "Good eye contact overall. Try to look directly at the camera more consistently."
        }
        Band::NeedsImprovement => {
            "Eye contact needs improvement. Look at the camera more frequently to show engagement."
        }
        Band::Poor => {
            "Poor eye contact detected. Look directly at the camera regularly to establish \
             connection."
        }
    };
    format!("{} (eye-contact score {:.0}/100)", text, score)
}

pub fn gesture_feedback(mean_gesture: f64) -> String {
    match Band::from_value(mean_gesture, GESTURE_BANDS) {
        Band::Excellent => format!(
            "Great use of hand gestures! {:.1} hands visible per frame on average.",
            mean_gesture
        ),
        Band::Good => format!(
            "Good use of hand gestures ({:.1} hands per frame). Slightly more expressive \
             movements would help emphasize points.",
            mean_gesture
        ),
        Band::NeedsImprovement => format!(
            "Limited hand gestures detected ({:.1} hands per frame). Use your hands more \
             naturally to emphasize key points.",
            mean_gesture
        ),
        Band::Poor => format!(
            "Very few hand gestures observed ({:.1} hands per frame). Try to be more \
             expressive with natural hand movements.",
            mean_gesture
        ),
    }
}

pub fn overall_feedback(score: f64, duration_seconds: f64) -> String {
    match Band::from_value(score, OVERALL_BANDS) {
        Band::Excellent => format!(
            "Outstanding professional presence! ({:.1}s video) You demonstrated excellent \
             body language throughout.",
            duration_seconds
        ),
        Band::Good => format!(
            "Good professional presence overall ({:.1}s video). Minor improvements in posture \
             and eye contact would enhance your performance.",
            duration_seconds
        ),
        Band::NeedsImprovement => format!(
            "Acceptable presence ({:.1}s video), but noticeable areas for improvement in body \
             language and engagement.",
            duration_seconds
        ),
        Band::Poor => format!(
            "Body language needs significant improvement ({:.1}s video). Focus on posture, \
             eye contact, and natural gestures.",
            duration_seconds
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_edges_are_inclusive() {
        assert_eq!(Band::from_value(80.0, POSTURE_BANDS), Band::Excellent);
        assert_eq!(Band::from_value(79.99, POSTURE_BANDS), Band::Good);
        assert_eq!(Band::from_value(65.0, POSTURE_BANDS), Band::Good);
        assert_eq!(Band::from_value(50.0, POSTURE_BANDS), Band::NeedsImprovement);
        assert_eq!(Band::from_value(49.9, POSTURE_BANDS), Band::Poor);
        assert_eq!(Band::from_value(0.3, GESTURE_BANDS), Band::NeedsImprovement);
        assert_eq!(Band::from_value(0.29, GESTURE_BANDS), Band::Poor);
    }

    fn posture(mean_posture: f64, slouching_frames: usize, good_posture_frames: usize) -> String {
        posture_feedback(&SessionAggregate {
            mean_posture,
            mean_eye_contact: 50.0,
            mean_gesture: 0.0,
            good_posture_frames,
            slouching_frames,
            frames_analyzed: good_posture_frames + slouching_frames,
            duration_seconds: 10.0,
        })
    }

    #[test]
    fn posture_feedback_interpolates_counts() {
        assert!(posture(90.0, 1, 9).contains("9/10 frames"));
        assert!(posture(55.0, 8, 17).contains("slouched 32% of the time"));
        assert!(posture(30.0, 5, 0).contains("100% of the time"));
        assert!(posture(70.0, 0, 0).contains("0% of the time"));
    }

    #[test]
    fn eye_contact_feedback_bands() {
        assert!(eye_contact_feedback(85.0).starts_with("Excellent"));
        assert!(eye_contact_feedback(60.0).starts_with("Good"));
        assert!(eye_contact_feedback(45.0).starts_with("Eye contact needs improvement"));
        assert!(eye_contact_feedback(40.0).starts_with("Poor"));
    }

    #[test]
    fn gesture_feedback_uses_mean_count() {
        assert!(gesture_feedback(1.6).starts_with("Great"));
        assert!(gesture_feedback(1.0).starts_with("Good"));
        assert!(gesture_feedback(0.5).contains("0.5 hands per frame"));
        assert!(gesture_feedback(0.0).starts_with("Very few"));
    }

    #[test]
    fn overall_feedback_mentions_duration() {
        assert!(overall_feedback(65.25, 12.34).contains("12.3s video"));
        assert!(overall_feedback(85.0, 3.0).starts_with("Outstanding"));
        assert!(overall_feedback(10.0, 3.0).starts_with("Body language needs"));
    }

    #[test]
    fn fallback_sets() {
        let unable = FeedbackSet::unable_to_analyze();
        for text in [
            &unable.posture,
            &unable.facial_expression,
            &unable.gesture,
            &unable.overall_presence,
        ] {
            assert_eq!(text, UNABLE_TO_ANALYZE);
        }

        let missing = FeedbackSet::capability_missing(7.5);
        assert!(missing.posture.contains("landmark estimator"));
        assert!(!missing.posture.chars().any(|c| c.is_ascii_digit()));
        assert!(missing.overall_presence.contains("7.5s"));
    }
}
