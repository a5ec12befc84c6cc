pub mod association;
pub mod bbox;
pub mod cache;
pub mod chain;
pub mod circular_queue;
pub mod config;
pub mod crop;
pub mod detection;
pub mod enricher;
pub mod enrichment;
pub mod error;
pub mod frame;
pub mod gate;
pub mod matcher;
pub mod math;
pub mod pipeline;
pub mod provider;
pub mod providers;
pub mod store;
pub mod validator;

mod track;

pub use config::{DetectorTier, PipelineConfig};
pub use detection::Detection;
pub use enrichment::{Attributes, Enrichment};
pub use error::Error;
pub use frame::Frame;
pub use pipeline::{Pipeline, PipelineStats};
pub use track::{Track, TrackSnapshot};

use image::RgbImage;
use std::rc::Rc;

/// Frame-by-frame tracker over one video source.
pub trait Tracking {
    /// Feeds the detections of the next frame, with its pixels when the
    /// caller has them.
    fn update(&mut self, frame: Frame, image: Option<&RgbImage>);

    /// Stable tracks as of the last update.
    fn tracks(&self) -> Rc<[TrackSnapshot]>;
}
