// src/sampler.rs
use crate::video::FrameSource;
use image::DynamicImage;
use std::iter::StepBy;
use std::ops::Range;
use tracing::{debug, warn};

/// Upper bound on frames analyzed per clip, regardless of its length.
pub const MAX_SAMPLED_FRAMES: usize = 30;

/// Roughly one sample per second of footage.
pub fn frame_stride(fps: f64) -> usize {
    if fps.is_finite() && fps >= 1.0 {
        fps as usize
    } else {
        1
    }
}

pub fn candidate_indices(frame_count: usize, fps: f64) -> StepBy<Range<usize>> {
    (0..frame_count).step_by(frame_stride(fps))
}

/// Yields `(index, frame)` pairs at the sampling stride. Indices that fail to
/// decode are skipped and do not count toward [`MAX_SAMPLED_FRAMES`].
pub struct SampledFrames<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
    candidates: StepBy<Range<usize>>,
    yielded: usize,
    skipped: usize,
}

impl<'a, S: FrameSource + ?Sized> SampledFrames<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        let info = source.info();
        let candidates = candidate_indices(info.frame_count, info.fps);
        Self {
            source,
            candidates,
            yielded: 0,
            skipped: 0,
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<S: FrameSource + ?Sized> Iterator for SampledFrames<'_, S> {
    type Item = (usize, DynamicImage);

    fn next(&mut self) -> Option<Self::Item> {
        if self.yielded >= MAX_SAMPLED_FRAMES {
            return None;
        }

        loop {
            let index = self.candidates.next()?;
            match self.source.read_frame(index) {
                Ok(frame) => {
                    self.yielded += 1;
                    debug!("Sampled frame {} ({}/{})", index, self.yielded, MAX_SAMPLED_FRAMES);
                    return Some((index, frame));
                }
                Err(e) => {
                    self.skipped += 1;
                    warn!("Skipping frame: {}", e);
                }
            }
        }
    }
}

pub fn sample_frames<S: FrameSource + ?Sized>(source: &mut S) -> SampledFrames<'_, S> {
    SampledFrames::new(source)
}
