use crate::config::GateConfig;
use crate::track::Track;

/// Picks the few tracks worth a remote classification call.
#[derive(Debug, Clone)]
pub struct EnrichmentGate {
    config: GateConfig,
}

impl EnrichmentGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Classes missing from the table have priority 0.
    #[inline]
    pub fn priority(&self, class: &str) -> i32 {
        self.config.priorities.get(class).copied().unwrap_or(0)
    }

    #[inline]
    pub fn is_sampling_frame(&self, frame_index: u64) -> bool {
        frame_index % self.config.interval.max(1) == 0
    }

    pub fn should_enrich(&self, track: &Track, frame_index: u64) -> bool {
        track.confidence >= self.config.confidence_floor
            && self.priority(&track.class) >= self.config.priority_floor
            && self.is_sampling_frame(frame_index)
    }
}
