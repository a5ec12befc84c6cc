use std::rc::Rc;

use image::RgbImage;
use serde_derive::Serialize;
use tracing::debug;

use crate::association::Associator;
use crate::config::PipelineConfig;
use crate::enricher::Enricher;
use crate::gate::EnrichmentGate;
use crate::matcher::Matcher;
use crate::store::TrackStore;
use crate::track::TrackSnapshot;
use crate::validator::{RejectionCounts, Validator};
use crate::{Frame, Tracking};

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineStats {
    pub frames: u64,
    pub total_detections: u64,
    pub valid_detections: u64,
    pub rejections: RejectionCounts,
    pub tracks_born: u64,
    pub tracks_dropped: u64,
    /// tracks that passed the gate and were looked up
    pub enrichment_calls: u64,
    pub enrichment_hits: u64,
    /// mean of `avg_confidence` over the tracks alive after the last frame
    pub mean_confidence: f32,
}

impl PipelineStats {
    /// Share of detections that survived validation, in percent.
    pub fn accuracy(&self) -> f32 {
        if self.total_detections == 0 {
            0.0
        } else {
            self.valid_detections as f32 / self.total_detections as f32 * 100.0
        }
    }
}

/// Validation, association and enrichment for one video source.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    validator: Validator,
    associator: Associator,
    store: TrackStore,
    gate: EnrichmentGate,
    enricher: Option<Enricher>,
    stats: PipelineStats,
    snapshots: Rc<[TrackSnapshot]>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            validator: Validator::new(config.validator.clone()),
            associator: Associator::new(config.association.clone(), config.validator.thresholds.clone()),
            store: TrackStore::new(config.association.history_len),
            gate: EnrichmentGate::new(config.gate.clone()),
            enricher: None,
            stats: PipelineStats::default(),
            snapshots: Rc::new([]),
            config,
        }
    }

    pub fn with_enricher(mut self, enricher: Enricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_matcher(mut self, matcher: Box<dyn Matcher>) -> Self {
        self.associator = Associator::new(
            self.config.association.clone(),
            self.config.validator.thresholds.clone(),
        )
        .with_matcher(matcher);
        self
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[inline]
    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    #[inline]
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    #[inline]
    pub fn enricher(&self) -> Option<&Enricher> {
        self.enricher.as_ref()
    }

    /// Runs one frame through the pipeline and returns the stable tracks.
    ///
    /// Enrichment only happens when `image` holds the pixels of this frame.
    pub fn process(&mut self, frame: Frame, image: Option<&RgbImage>) -> Vec<TrackSnapshot> {
        let frame_index = self.stats.frames;
        self.stats.frames += 1;

        let dims = frame.dims();
        self.stats.total_detections += frame.len() as u64;

        let valid = self
            .validator
            .filter(frame.detections, dims, &mut self.stats.rejections);
        self.stats.valid_detections += valid.len() as u64;

        let report = self.associator.associate(&mut self.store, valid);
        self.stats.tracks_born += report.born as u64;
        self.stats.tracks_dropped += report.dropped as u64;

        if let (Some(enricher), Some(image)) = (self.enricher.as_mut(), image) {
            enricher.purge_expired();

            let threshold = self.config.association.stability_threshold;
            for track in self.store.iter_mut() {
                if !track.is_stable(threshold) || !self.gate.should_enrich(track, frame_index) {
                    continue;
                }

                self.stats.enrichment_calls += 1;
                if let Some(enrichment) = enricher.enrich(image, track) {
                    self.stats.enrichment_hits += 1;
                    track.attach(enrichment);
                }
            }
        }

        self.stats.mean_confidence = if self.store.is_empty() {
            0.0
        } else {
            self.store.iter().map(|t| t.avg_confidence).sum::<f32>() / self.store.len() as f32
        };

        let snapshots: Vec<TrackSnapshot> = self
            .store
            .stable(self.config.association.stability_threshold)
            .map(|t| t.snapshot())
            .collect();

        debug!(
            frame = frame_index,
            tracks = self.store.len(),
            stable = snapshots.len(),
            "frame processed"
        );

        self.snapshots = snapshots.clone().into();
        snapshots
    }

    /// Forgets every track; ids keep increasing.
    pub fn reset(&mut self) {
        self.store.clear();
        self.snapshots = Rc::new([]);
    }
}

impl Tracking for Pipeline {
    #[inline]
    fn update(&mut self, frame: Frame, image: Option<&RgbImage>) {
        self.process(frame, image);
    }

    #[inline]
    fn tracks(&self) -> Rc<[TrackSnapshot]> {
        self.snapshots.clone()
    }
}
