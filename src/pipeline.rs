// src/pipeline.rs - Runs the full, basic or error path and always yields a report
use crate::aggregate::SessionAggregate;
use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, Result};
use crate::features::FrameFeatures;
use crate::landmarks::{self, LandmarkEstimator};
use crate::process::Deadline;
use crate::report::BodyLanguageReport;
use crate::sampler::sample_frames;
use crate::video::{FrameSource, TempWorkspace, VideoFileReader};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::{error, info, warn};

/// Slack the outer timer gives a job to notice its own deadline and clean up.
pub const JOB_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisState {
    /// Landmarks estimated and scored for every sampled frame.
    Full,
    /// No landmark capability; clip metadata only.
    Basic,
    /// The clip could not be analyzed at all.
    Error,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub state: AnalysisState,
    pub report: BodyLanguageReport,
    pub frame_features: Vec<FrameFeatures>,
    pub fps: f64,
}

impl AnalysisOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            state: AnalysisState::Error,
            report: BodyLanguageReport::failed(reason),
            frame_features: Vec::new(),
            fps: 0.0,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// One analyzer per concurrent analysis; the estimator it owns is not shared.
pub struct BodyLanguageAnalyzer {
    config: AnalyzerConfig,
    estimator: Option<Box<dyn LandmarkEstimator>>,
}

impl BodyLanguageAnalyzer {
    /// Resolves the landmark capability once, up front.
    pub fn new(config: AnalyzerConfig) -> Self {
        let estimator = match landmarks::resolve_estimator(&config) {
            Ok(estimator) => Some(estimator),
            Err(e) => {
                warn!("{}; body language analysis limited to clip metadata", e);
                None
            }
        };
        Self { config, estimator }
    }

    pub fn with_estimator(
        config: AnalyzerConfig,
        estimator: Option<Box<dyn LandmarkEstimator>>,
    ) -> Self {
        Self { config, estimator }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn initial_state(&self) -> AnalysisState {
        if self.estimator.is_some() {
            AnalysisState::Full
        } else {
            AnalysisState::Basic
        }
    }

    /// Analyzes an uploaded clip. Never fails: problems are reported through
    /// the report's `degraded` and `error` fields.
    pub fn analyze(&mut self, video_bytes: &[u8], original_filename: &str) -> BodyLanguageReport {
        self.analyze_detailed(video_bytes, original_filename).report
    }

    /// Like [`analyze`](Self::analyze), also returning the per-frame series.
    pub fn analyze_detailed(
        &mut self,
        video_bytes: &[u8],
        original_filename: &str,
    ) -> AnalysisOutcome {
        let deadline = self.deadline();
        self.guarded(|analyzer| analyzer.run_upload(video_bytes, original_filename, deadline))
    }

    /// Analyzes an already opened clip.
    pub fn analyze_source(&mut self, source: &mut dyn FrameSource) -> AnalysisOutcome {
        let deadline = self.deadline();
        self.guarded(|analyzer| analyzer.run_source(source, deadline))
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(Duration::from_secs(self.config.analysis_timeout_secs))
    }

    fn guarded<F>(&mut self, run: F) -> AnalysisOutcome
    where
        F: FnOnce(&mut Self) -> Result<AnalysisOutcome>,
    {
        match panic::catch_unwind(AssertUnwindSafe(|| run(self))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!("Body language analysis failed: {}", e);
                AnalysisOutcome::failed(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                error!("Unexpected fault during body language analysis: {}", message);
                // The estimator may be left mid-call; later runs fall back to Basic.
                if self.estimator.take().is_some() {
                    warn!("Landmark estimator disabled after a fault");
                }
                AnalysisOutcome::failed(format!("unexpected fault: {}", message))
            }
        }
    }

    fn run_upload(
        &mut self,
        video_bytes: &[u8],
        original_filename: &str,
        deadline: Deadline,
    ) -> Result<AnalysisOutcome> {
        if video_bytes.is_empty() {
            return Err(AnalysisError::MediaOpen("empty video upload".to_string()));
        }

        let workspace = TempWorkspace::create(&self.config.temp_dir)?;
        let input = workspace.write_input(video_bytes, original_filename)?;
        info!(
            "Processing video file: {} ({} bytes)",
            original_filename,
            video_bytes.len()
        );

        let mut reader = VideoFileReader::open(&input, &workspace, &self.config, deadline)?;
        self.run_source(&mut reader, deadline)
    }

    fn run_source(
        &mut self,
        source: &mut dyn FrameSource,
        deadline: Deadline,
    ) -> Result<AnalysisOutcome> {
        let info = source.info().clone();

        let Some(estimator) = self.estimator.as_mut() else {
            info!(
                "No landmark estimator; reporting metadata for {:.1}s clip",
                info.duration_seconds()
            );
            return Ok(AnalysisOutcome {
                state: AnalysisState::Basic,
                report: BodyLanguageReport::basic(&info),
                frame_features: Vec::new(),
                fps: info.fps,
            });
        };
        estimator.set_deadline(deadline);

        let mut frame_features = Vec::new();
        let mut sampler = sample_frames(source);
        for (index, frame) in sampler.by_ref() {
            deadline.check()?;
            let landmarks = landmarks::estimate(estimator.as_mut(), &frame);
            frame_features.push(FrameFeatures::extract(index, landmarks));
        }
        // Decodes cut short by the deadline are not a partial result.
        deadline.check()?;
        if sampler.skipped() > 0 {
            warn!("{} sampled frame(s) could not be decoded", sampler.skipped());
        }

        let aggregate = SessionAggregate::from_features(&frame_features, info.duration_seconds());
        let report = BodyLanguageReport::full(&aggregate, info.frame_count);
        info!(
            "Body language analysis complete: score {:.1}, {} frames",
            report.body_language_score, report.frames_analyzed
        );

        Ok(AnalysisOutcome {
            state: AnalysisState::Full,
            report,
            frame_features,
            fps: info.fps,
        })
    }
}

/// Runs a blocking analysis job under a wall-clock limit. Timeouts and
/// task failures become error reports.
///
/// A job that outlives `limit` is abandoned, not stopped; bound the work
/// itself with a [`Deadline`].
pub async fn run_with_timeout<F>(limit: Duration, job: F) -> AnalysisOutcome
where
    F: FnOnce() -> AnalysisOutcome + Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(job)).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) => {
            error!("Analysis task failed: {}", join_error);
            AnalysisOutcome::failed(format!("analysis task failed: {}", join_error))
        }
        Err(_) => {
            let e = AnalysisError::Timeout(limit.as_secs());
            warn!("{}", e);
            AnalysisOutcome::failed(e.to_string())
        }
    }
}

/// Analyzes an upload on the blocking pool. The analyzer's own deadline
/// (`analysis_timeout_secs`) stops the work and releases its workspace; the
/// outer timer only fires if that fails by more than [`JOB_GRACE`].
pub async fn analyze_with_timeout(
    mut analyzer: BodyLanguageAnalyzer,
    video_bytes: Vec<u8>,
    original_filename: String,
) -> AnalysisOutcome {
    let limit = Duration::from_secs(analyzer.config().analysis_timeout_secs);
    let job = move || analyzer.analyze_detailed(&video_bytes, &original_filename);

    if limit.is_zero() {
        return tokio::task::spawn_blocking(job).await.unwrap_or_else(|join_error| {
            error!("Analysis task failed: {}", join_error);
            AnalysisOutcome::failed(format!("analysis task failed: {}", join_error))
        });
    }
    run_with_timeout(limit + JOB_GRACE, job).await
}
