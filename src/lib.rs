//! Body-language scoring for recorded interview answers.
//!
//! A clip is sampled at roughly one frame per second (at most 30 frames),
//! each frame is run through a landmark estimator, and the per-frame
//! posture, eye-contact and hand-presence signals are reduced to a single
//! [`BodyLanguageReport`]. Without a landmark estimator only clip metadata
//! is reported; unreadable clips produce an error report. [`analyze`]
//! never fails.
//!
//! [`analyze`]: BodyLanguageAnalyzer::analyze

pub mod aggregate;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod feedback;
pub mod landmarks;
pub mod pipeline;
pub mod process;
pub mod report;
pub mod sampler;
pub mod video;

pub use aggregate::SessionAggregate;
pub use config::AnalyzerConfig;
pub use error::AnalysisError;
pub use features::FrameFeatures;
pub use landmarks::{Keypoints, LandmarkEstimator, LandmarkSet};
pub use pipeline::{analyze_with_timeout, AnalysisOutcome, AnalysisState, BodyLanguageAnalyzer};
pub use process::Deadline;
pub use report::BodyLanguageReport;
pub use video::{FrameSource, VideoInfo};
