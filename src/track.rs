use serde_derive::Serialize;

use crate::bbox::{BBox, Ltrb};
use crate::circular_queue::CircularQueue;
use crate::enrichment::{compose_display_name, Enrichment};
use crate::math;
use crate::Detection;

/// One followed object. The class is fixed at birth.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub class: String,
    pub bbox: BBox<Ltrb>,
    pub confidence: f32,
    pub avg_confidence: f32,
    pub total_frames: u32,
    pub stable_count: u32,
    pub enrichment: Option<Enrichment>,
    history: CircularQueue<BBox<Ltrb>>,
}

impl Track {
    pub(crate) fn new(id: u32, det: Detection, history_len: usize) -> Self {
        let mut history = CircularQueue::with_capacity(history_len);
        history.push(det.bbox);

        Self {
            id,
            class: det.class,
            bbox: det.bbox,
            confidence: det.confidence,
            avg_confidence: det.confidence,
            total_frames: 1,
            stable_count: 1,
            enrichment: det.enrichment,
            history,
        }
    }

    /// Folds a matched detection into the track.
    pub(crate) fn update(&mut self, det: Detection, max_stable_count: u32) {
        self.avg_confidence = math::running_mean(self.avg_confidence, self.total_frames, det.confidence);
        self.total_frames += 1;
        self.stable_count = (self.stable_count + 1).min(max_stable_count);

        self.bbox = det.bbox;
        self.confidence = det.confidence;
        self.history.push(det.bbox);

        if let Some(enrichment) = det.enrichment {
            self.attach(enrichment);
        }
    }

    /// Keeps whichever enrichment is newer.
    pub fn attach(&mut self, enrichment: Enrichment) -> bool {
        if enrichment.is_fresher_than(self.enrichment.as_ref()) {
            self.enrichment = Some(enrichment);
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn is_stable(&self, threshold: u32) -> bool {
        self.stable_count >= threshold
    }

    /// Past boxes, oldest first, ending with the current one.
    #[inline]
    pub fn history(&self) -> impl Iterator<Item = &BBox<Ltrb>> {
        self.history.asc_iter()
    }

    pub fn display_name(&self) -> String {
        compose_display_name(
            self.enrichment.as_ref().map(|e| &e.attributes),
            &self.class,
        )
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            id: self.id,
            class: self.class.clone(),
            bbox: self.bbox,
            confidence: self.confidence,
            avg_confidence: self.avg_confidence,
            stable_count: self.stable_count,
            enrichment: self.enrichment.clone(),
            display_name: self.display_name(),
        }
    }
}

/// What downstream consumers (overlay, logs) get for each stable track.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TrackSnapshot {
    pub id: u32,
    pub class: String,
    #[serde(rename = "box")]
    pub bbox: BBox<Ltrb>,
    pub confidence: f32,
    pub avg_confidence: f32,
    pub stable_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
    pub display_name: String,
}
