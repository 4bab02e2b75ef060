// src/landmarks.rs - Pose/face/hand landmark estimation behind a swappable trait
use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, Result};
use image::DynamicImage;
use nalgebra::Vector3;
use crate::process::{self, Deadline};
use std::io::Cursor;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

/// MediaPipe pose landmark indices.
pub mod pose {
    pub const NOSE: usize = 0;
    pub const LEFT_SHOULDER: usize = 11;
    pub const RIGHT_SHOULDER: usize = 12;
    pub const LEFT_HIP: usize = 23;
    pub const RIGHT_HIP: usize = 24;
}

/// MediaPipe face mesh indices.
pub mod face_mesh {
    pub const NOSE_TIP: usize = 1;
    pub const LEFT_EYE_OUTER: usize = 33;
    pub const RIGHT_EYE_OUTER: usize = 263;
}

pub const MAX_HANDS: usize = 2;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Normalized keypoints for one detected body, face or hand. x/y are image
/// fractions, z is relative depth.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Keypoints {
    pub points: Vec<Vector3<f64>>,
}

impl Keypoints {
    pub fn new(points: Vec<Vector3<f64>>) -> Self {
        Self { points }
    }

    pub fn from_rows(rows: &[[f64; 3]]) -> Self {
        Self {
            points: rows
                .iter()
                .map(|row| Vector3::new(row[0], row[1], row[2]))
                .collect(),
        }
    }

    pub fn get(&self, index: usize) -> Option<&Vector3<f64>> {
        self.points.get(index)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Landmarks for a single frame. Each modality is detected on its own; a
/// pose does not imply a face and vice versa.
#[derive(Debug, Clone, Default)]
pub struct LandmarkSet {
    pub pose: Option<Keypoints>,
    pub face: Option<Keypoints>,
    pub hands: Vec<Keypoints>,
}

pub trait LandmarkEstimator: Send {
    fn detect_pose(&mut self, frame: &DynamicImage) -> Result<Option<Keypoints>>;

    fn detect_face(&mut self, frame: &DynamicImage) -> Result<Option<Keypoints>>;

    fn detect_hands(&mut self, frame: &DynamicImage) -> Result<Vec<Keypoints>>;

    /// Bounds every later detector call. Estimators that do no blocking work
    /// can ignore it.
    fn set_deadline(&mut self, _deadline: Deadline) {}
}

/// Runs all three detectors on `frame`. A failing detector is logged and
/// reported as "not detected" without affecting the other two.
pub fn estimate(estimator: &mut dyn LandmarkEstimator, frame: &DynamicImage) -> LandmarkSet {
    let pose = estimator.detect_pose(frame).unwrap_or_else(|e| {
        warn!("Pose detection failed: {}", e);
        None
    });

    let face = estimator.detect_face(frame).unwrap_or_else(|e| {
        warn!("Face detection failed: {}", e);
        None
    });

    let mut hands = estimator.detect_hands(frame).unwrap_or_else(|e| {
        warn!("Hand detection failed: {}", e);
        Vec::new()
    });
    if hands.len() > MAX_HANDS {
        debug!("Ignoring {} extra hand(s)", hands.len() - MAX_HANDS);
        hands.truncate(MAX_HANDS);
    }

    LandmarkSet { pose, face, hands }
}

/// Estimator backed by an external executable.
///
/// Invoked as `<program> [args...] pose|face|hands` with the frame
/// PNG-encoded on stdin. Stdout carries JSON: `null` or `[[x, y, z], ...]`
/// for pose and face, `[[[x, y, z], ...], ...]` for hands.
#[derive(Debug)]
pub struct ExternalEstimator {
    program: PathBuf,
    args: Vec<String>,
    deadline: Deadline,
}

impl ExternalEstimator {
    /// Checks that `<program> [args...] --version` runs before accepting it.
    pub fn probe(program: impl Into<PathBuf>, args: Vec<String>) -> Result<Self> {
        let program = program.into();
        let mut command = Command::new(&program);
        command.args(&args).arg("--version");
        let output = process::run(&mut command, None, Deadline::after(PROBE_TIMEOUT))
            .map_err(|e| {
                AnalysisError::CapabilityUnavailable(format!("{}: {}", program.display(), e))
            })?;

        if !output.status.success() {
            return Err(AnalysisError::CapabilityUnavailable(format!(
                "{} --version exited with {}",
                program.display(),
                output.status
            )));
        }

        info!(
            "Landmark estimator ready: {} ({})",
            program.display(),
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(Self {
            program,
            args,
            deadline: Deadline::unbounded(),
        })
    }

    fn run(&self, modality: &str, frame: &DynamicImage) -> Result<Vec<u8>> {
        let mut png = Vec::new();
        frame
            .write_to(&mut Cursor::new(&mut png), image::ImageOutputFormat::Png)
            .map_err(|e| AnalysisError::Landmark(format!("failed to encode frame: {}", e)))?;

        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(modality);
        let output = process::run(&mut command, Some(png), self.deadline).map_err(|e| {
            if process::is_timeout(&e) {
                self.deadline.timeout_error()
            } else {
                AnalysisError::Landmark(format!("failed to run estimator: {}", e))
            }
        })?;

        if !output.status.success() {
            return Err(AnalysisError::Landmark(format!(
                "{} detector exited with {}: {}",
                modality,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(output.stdout)
    }
}

fn parse_single(stdout: &[u8]) -> Result<Option<Keypoints>> {
    let rows: Option<Vec<[f64; 3]>> = serde_json::from_slice(stdout)
        .map_err(|e| AnalysisError::Landmark(format!("malformed estimator output: {}", e)))?;
    Ok(rows
        .filter(|rows| !rows.is_empty())
        .map(|rows| Keypoints::from_rows(&rows)))
}

fn parse_hands(stdout: &[u8]) -> Result<Vec<Keypoints>> {
    let hands: Vec<Vec<[f64; 3]>> = serde_json::from_slice(stdout)
        .map_err(|e| AnalysisError::Landmark(format!("malformed estimator output: {}", e)))?;
    Ok(hands
        .iter()
        .filter(|rows| !rows.is_empty())
        .map(|rows| Keypoints::from_rows(rows))
        .collect())
}

impl LandmarkEstimator for ExternalEstimator {
    fn set_deadline(&mut self, deadline: Deadline) {
        self.deadline = deadline;
    }

    fn detect_pose(&mut self, frame: &DynamicImage) -> Result<Option<Keypoints>> {
        parse_single(&self.run("pose", frame)?)
    }

    fn detect_face(&mut self, frame: &DynamicImage) -> Result<Option<Keypoints>> {
        parse_single(&self.run("face", frame)?)
    }

    fn detect_hands(&mut self, frame: &DynamicImage) -> Result<Vec<Keypoints>> {
        parse_hands(&self.run("hands", frame)?)
    }
}

/// Resolves the landmark capability once. `Err(CapabilityUnavailable)`
/// means the analyzer must run the metadata-only pipeline.
pub fn resolve_estimator(config: &AnalyzerConfig) -> Result<Box<dyn LandmarkEstimator>> {
    let program = config.landmark_command.as_ref().ok_or_else(|| {
        AnalysisError::CapabilityUnavailable("no landmark_command configured".to_string())
    })?;
    Ok(Box::new(ExternalEstimator::probe(
        program,
        config.landmark_args.clone(),
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    struct FlakyEstimator {
        pose_fails: bool,
        face_fails: bool,
        hands: usize,
    }

    impl LandmarkEstimator for FlakyEstimator {
        fn detect_pose(&mut self, _frame: &DynamicImage) -> Result<Option<Keypoints>> {
            if self.pose_fails {
                return Err(AnalysisError::Landmark("pose model crashed".to_string()));
            }
            Ok(Some(Keypoints::from_rows(&[[0.5, 0.5, 0.0]; 33])))
        }

        fn detect_face(&mut self, _frame: &DynamicImage) -> Result<Option<Keypoints>> {
            if self.face_fails {
                return Err(AnalysisError::Landmark("face model crashed".to_string()));
            }
            Ok(Some(Keypoints::from_rows(&[[0.5, 0.4, 0.0]; 468])))
        }

        fn detect_hands(&mut self, _frame: &DynamicImage) -> Result<Vec<Keypoints>> {
            Ok(vec![Keypoints::from_rows(&[[0.3, 0.7, 0.0]; 21]); self.hands])
        }
    }

    #[test]
    fn detector_failures_are_isolated() {
        let frame = DynamicImage::new_rgb8(2, 2);

        let mut estimator = FlakyEstimator {
            pose_fails: true,
            face_fails: false,
            hands: 1,
        };
        let set = estimate(&mut estimator, &frame);
        assert!(set.pose.is_none());
        assert!(set.face.is_some());
        assert_eq!(set.hands.len(), 1);

        let mut estimator = FlakyEstimator {
            pose_fails: false,
            face_fails: true,
            hands: 0,
        };
        let set = estimate(&mut estimator, &frame);
        assert_eq!(set.pose.map(|p| p.len()), Some(33));
        assert!(set.face.is_none());
        assert!(set.hands.is_empty());
    }

    #[test]
    fn extra_hands_are_dropped() {
        let frame = DynamicImage::new_rgb8(2, 2);
        let mut estimator = FlakyEstimator {
            pose_fails: false,
            face_fails: false,
            hands: 4,
        };
        assert_eq!(estimate(&mut estimator, &frame).hands.len(), MAX_HANDS);
    }

    #[test]
    fn parses_estimator_output() {
        let pose = parse_single(b"[[0.1, 0.2, 0.3], [0.4, 0.5, -0.6]]").unwrap().unwrap();
        assert_eq!(pose.len(), 2);
        assert_eq!(pose.get(1), Some(&Vector3::new(0.4, 0.5, -0.6)));
        assert!(pose.get(2).is_none());

        assert!(parse_single(b"null").unwrap().is_none());
        assert!(parse_single(b"[]").unwrap().is_none());

        let hands = parse_hands(b"[[[0.1, 0.1, 0.0]], [], [[0.9, 0.9, 0.0]]]").unwrap();
        assert_eq!(hands.len(), 2);
    }

    #[test]
    fn malformed_output_is_a_detector_error() {
        assert_matches!(parse_single(b"{\"oops\": 1}"), Err(AnalysisError::Landmark(_)));
        assert_matches!(parse_hands(b""), Err(AnalysisError::Landmark(_)));
    }

    #[test]
    fn missing_program_means_capability_unavailable() {
        assert_matches!(
            ExternalEstimator::probe("/nonexistent/landmark-estimator", Vec::new()),
            Err(AnalysisError::CapabilityUnavailable(_))
        );

        let config = AnalyzerConfig::default();
        assert_matches!(
            resolve_estimator(&config).err(),
            Some(AnalysisError::CapabilityUnavailable(_))
        );
    }

    const SCRIPTED_ESTIMATOR: &str = r#"
case "$1" in
  --version)
    echo "scripted-estimator 1.0" ;;
  pose)
    signature=$(head -c 4 | tail -c 3)
    cat > /dev/null
    [ "$signature" = "PNG" ] || exit 4
    echo '[[0.5, 0.15, 0.0], [0.6, 0.3, -0.1]]' ;;
  face)
    echo "face model not loaded" >&2
    exit 3 ;;
  hands)
    cat > /dev/null
    echo '[[[0.2, 0.8, 0.0]], [[0.7, 0.8, 0.0]], [[0.5, 0.5, 0.0]]]' ;;
  *)
    exit 2 ;;
esac
"#;

    /// Runs `body` through `/bin/sh`, so the script needs no exec bit.
    #[cfg(unix)]
    fn scripted(dir: &std::path::Path, body: &str) -> Result<ExternalEstimator> {
        let script = dir.join("estimator.sh");
        std::fs::write(&script, body).unwrap();
        ExternalEstimator::probe("/bin/sh", vec![script.to_string_lossy().into_owned()])
    }

    /// Incompressible frame whose PNG is larger than a pipe buffer.
    fn noisy_frame() -> DynamicImage {
        let mut state: u32 = 0x1234_5678;
        DynamicImage::ImageRgb8(image::RgbImage::from_fn(512, 512, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            image::Rgb([r, g, b])
        }))
    }

    #[cfg(unix)]
    #[test]
    fn external_estimator_exchanges_png_for_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut estimator = scripted(dir.path(), SCRIPTED_ESTIMATOR).unwrap();
        let frame = DynamicImage::new_rgb8(4, 4);

        assert_matches!(
            estimator.detect_face(&frame),
            Err(AnalysisError::Landmark(msg)) if msg.contains("face model not loaded")
        );

        let set = estimate(&mut estimator, &frame);
        let pose = set.pose.unwrap();
        assert_eq!(pose.len(), 2);
        assert_eq!(pose.get(1), Some(&Vector3::new(0.6, 0.3, -0.1)));
        assert!(set.face.is_none());
        assert_eq!(set.hands.len(), MAX_HANDS);
    }

    #[cfg(unix)]
    #[test]
    fn failed_version_check_means_capability_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            scripted(dir.path(), "exit 1"),
            Err(AnalysisError::CapabilityUnavailable(_))
        );
    }

    #[cfg(unix)]
    #[test]
    fn estimator_may_answer_without_reading_the_frame() {
        let dir = tempfile::tempdir().unwrap();
        let script = r#"case "$1" in --version) echo 1 ;; *) echo '[]' ;; esac"#;
        let mut estimator = scripted(dir.path(), script).unwrap();

        for _ in 0..3 {
            assert!(estimator.detect_hands(&noisy_frame()).unwrap().is_empty());
            assert!(estimator.detect_pose(&noisy_frame()).unwrap().is_none());
        }
    }

    #[cfg(unix)]
    #[test]
    fn hung_estimator_is_stopped_at_the_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let script = r#"case "$1" in --version) echo 1 ;; *) exec sleep 30 ;; esac"#;
        let mut estimator = scripted(dir.path(), script).unwrap();
        estimator.set_deadline(Deadline::after(Duration::from_millis(300)));

        let started = std::time::Instant::now();
        assert_matches!(
            estimator.detect_pose(&DynamicImage::new_rgb8(2, 2)),
            Err(AnalysisError::Timeout(_))
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
