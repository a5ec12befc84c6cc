use ndarray::Array2;
use tracing::{debug, trace};

use crate::config::{AssociationConfig, ClassThresholds};
use crate::matcher::{GreedyMatcher, Matcher, FORBIDDEN};
use crate::math;
use crate::store::TrackStore;
use crate::Detection;

/// What one association pass did to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssociationReport {
    pub matched: usize,
    pub born: usize,
    /// unmatched detections that did not clear the admission bar
    pub refused: usize,
    pub dropped: usize,
}

/// Carries identities from one frame to the next.
#[derive(Debug)]
pub struct Associator {
    config: AssociationConfig,
    thresholds: ClassThresholds,
    matcher: Box<dyn Matcher>,
}

impl Associator {
    pub fn new(config: AssociationConfig, thresholds: ClassThresholds) -> Self {
        Self {
            config,
            thresholds,
            matcher: Box::new(GreedyMatcher),
        }
    }

    pub fn with_matcher(mut self, matcher: Box<dyn Matcher>) -> Self {
        self.matcher = matcher;
        self
    }

    #[inline]
    pub fn config(&self) -> &AssociationConfig {
        &self.config
    }

    #[inline]
    pub fn matcher(&self) -> &dyn Matcher {
        self.matcher.as_ref()
    }

    /// Track × detection distances; pairs of different class are forbidden.
    pub fn cost_matrix(store: &TrackStore, detections: &[Detection]) -> Array2<f32> {
        let tracks = store.as_slice();

        Array2::from_shape_fn((tracks.len(), detections.len()), |(r, c)| {
            let (track, det) = (&tracks[r], &detections[c]);

            if track.class == det.class {
                math::weighted_distance(&track.bbox, &det.bbox)
            } else {
                FORBIDDEN
            }
        })
    }

    #[inline]
    fn admits(&self, det: &Detection) -> bool {
        det.confidence > self.thresholds.get(&det.class) + self.config.admission_bonus
    }

    /// Updates `store` with this frame's validated detections: matched tracks
    /// absorb their detection, unmatched tracks die, and leftover detections
    /// confident enough become new tracks.
    pub fn associate(&self, store: &mut TrackStore, detections: Vec<Detection>) -> AssociationReport {
        let mut report = AssociationReport::default();

        if store.is_empty() {
            for det in detections {
                store.spawn(det);
                report.born += 1;
            }

            debug!(?report, "association (cold start)");
            return report;
        }

        let costs = Self::cost_matrix(store, &detections);
        let assignments = self
            .matcher
            .assign(costs.view(), self.config.max_match_distance);

        let mut hits: Vec<Option<usize>> = vec![None; store.len()];
        for &(track_idx, det_idx, _) in &assignments {
            hits[track_idx] = Some(det_idx);
        }

        let mut pool: Vec<Option<Detection>> = detections.into_iter().map(Some).collect();

        for (track, hit) in store.iter_mut().zip(&hits) {
            if let Some(det) = hit.and_then(|idx| pool[idx].take()) {
                track.update(det, self.config.max_stable_count);
                report.matched += 1;
            }
        }

        let keep: Vec<bool> = hits.iter().map(Option::is_some).collect();
        report.dropped = store.retain_flagged(&keep);

        for det in pool.into_iter().flatten() {
            if self.admits(&det) {
                store.spawn(det);
                report.born += 1;
            } else {
                trace!(class = %det.class, confidence = det.confidence, "below admission bar");
                report.refused += 1;
            }
        }

        debug!(matcher = self.matcher.name(), ?report, "association");
        report
    }
}
