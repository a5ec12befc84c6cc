use serde_derive::{Deserialize, Serialize};

use crate::detection::Detection;

/// Everything the detector produced for one video frame.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Frame {
    #[serde(default)]
    pub index: u64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn new(index: u64, dims: (u32, u32), detections: Vec<Detection>) -> Self {
        Self {
            index,
            width: dims.0,
            height: dims.1,
            detections,
        }
    }

    #[inline]
    pub fn dims(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
