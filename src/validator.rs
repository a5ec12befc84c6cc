use serde_derive::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::config::ValidatorConfig;
use crate::detection::Detection;

/// Why a detection was dropped before association.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Rejection {
    #[error("confidence {0} is not a probability")]
    InvalidConfidence(f32),

    #[error("confidence too low ({confidence:.3} < {threshold:.3})")]
    LowConfidence { confidence: f32, threshold: f32 },

    #[error("box too small ({width:.0}x{height:.0})")]
    TooSmall { width: f32, height: f32 },

    #[error("box too large ({:.1}% x {:.1}% of the frame)", .width_ratio * 100.0, .height_ratio * 100.0)]
    TooLarge { width_ratio: f32, height_ratio: f32 },

    #[error("abnormal aspect ratio ({0:.2})")]
    BadAspect(f32),

    #[error("box lies outside the frame")]
    OutOfBounds,
}

/// Running count of rejections by reason.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RejectionCounts {
    pub invalid_confidence: u64,
    pub low_confidence: u64,
    pub too_small: u64,
    pub too_large: u64,
    pub bad_aspect: u64,
    pub out_of_bounds: u64,
}

impl RejectionCounts {
    pub fn record(&mut self, rejection: &Rejection) {
        let slot = match rejection {
            Rejection::InvalidConfidence(_) => &mut self.invalid_confidence,
            Rejection::LowConfidence { .. } => &mut self.low_confidence,
            Rejection::TooSmall { .. } => &mut self.too_small,
            Rejection::TooLarge { .. } => &mut self.too_large,
            Rejection::BadAspect(_) => &mut self.bad_aspect,
            Rejection::OutOfBounds => &mut self.out_of_bounds,
        };

        *slot += 1;
    }

    pub fn total(&self) -> u64 {
        self.invalid_confidence
            + self.low_confidence
            + self.too_small + self.too_large + self.bad_aspect + self.out_of_bounds
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    #[inline]
    pub fn threshold(&self, class: &str) -> f32 {
        self.config.thresholds.get(class)
    }

    /// Checks a detection against the class threshold and the geometric
    /// sanity rules for a frame of `dims` = (width, height) pixels.
    pub fn validate(&self, det: &Detection, dims: (u32, u32)) -> Result<(), Rejection> {
        let cfg = &self.config;

        if !(0.0..=1.0).contains(&det.confidence) {
            return Err(Rejection::InvalidConfidence(det.confidence));
        }

        let threshold = self.threshold(&det.class);
        if det.confidence < threshold {
            return Err(Rejection::LowConfidence {
                confidence: det.confidence,
                threshold,
            });
        }

        let width = det.width();
        let height = det.height();
        if width < cfg.min_detection_size || height < cfg.min_detection_size {
            return Err(Rejection::TooSmall { width, height });
        }

        let (fw, fh) = (dims.0 as f32, dims.1 as f32);
        let width_ratio = width / fw;
        let height_ratio = height / fh;
        if width_ratio > cfg.max_detection_size || height_ratio > cfg.max_detection_size {
            return Err(Rejection::TooLarge {
                width_ratio,
                height_ratio,
            });
        }

        let aspect = det.bbox.aspect_ratio();
        if !(cfg.min_aspect_ratio..=cfg.max_aspect_ratio).contains(&aspect) {
            return Err(Rejection::BadAspect(aspect));
        }

        let m = cfg.bounds_margin;
        let b = &det.bbox;
        if b.left() < -m || b.top() < -m || b.right() > fw + m || b.bottom() > fh + m {
            return Err(Rejection::OutOfBounds);
        }

        Ok(())
    }

    /// Keeps the detections that pass, tallying the others into `counts`.
    pub fn filter(
        &self,
        detections: Vec<Detection>,
        dims: (u32, u32),
        counts: &mut RejectionCounts,
    ) -> Vec<Detection> {
        detections
            .into_iter()
            .filter(|det| match self.validate(det, dims) {
                Ok(()) => true,
                Err(rejection) => {
                    trace!(class = %det.class, %rejection, "detection rejected");
                    counts.record(&rejection);
                    false
                }
            })
            .collect()
    }
}
