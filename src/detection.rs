use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};
use crate::enrichment::Enrichment;

/// One detector output: corners, class label and confidence.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: BBox<Ltrb>,
    pub class: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
}

impl Detection {
    pub fn new(bbox: BBox<Ltrb>, class: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            class: class.into(),
            confidence,
            enrichment: None,
        }
    }

    #[inline]
    pub fn ltrb(x1: f32, y1: f32, x2: f32, y2: f32, class: impl Into<String>, confidence: f32) -> Self {
        Self::new(BBox::ltrb(x1, y1, x2, y2), class, confidence)
    }

    pub fn with_enrichment(mut self, enrichment: Enrichment) -> Self {
        self.enrichment = Some(enrichment);
        self
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.bbox.width()
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.bbox.height()
    }
}
