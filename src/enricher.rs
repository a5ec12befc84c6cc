use image::RgbImage;
use serde_derive::Serialize;
use tracing::{debug, trace, warn};

use crate::cache::{Clock, EnrichmentCache, SystemClock};
use crate::chain::FallbackChain;
use crate::config::EnricherConfig;
use crate::crop;
use crate::enrichment::Enrichment;
use crate::provider::Provider;
use crate::track::Track;

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnricherStats {
    pub lookups: u64,
    pub cache_hits: u64,
    /// requests that reached the provider chain
    pub provider_calls: u64,
    pub provider_successes: u64,
    pub empty_crops: u64,
}

/// Cache in front of the provider chain.
pub struct Enricher {
    config: EnricherConfig,
    cache: EnrichmentCache,
    chain: FallbackChain,
    clock: Box<dyn Clock>,
    stats: EnricherStats,
}

impl Enricher {
    pub fn new(config: EnricherConfig, providers: Vec<Box<dyn Provider>>) -> Self {
        let cache = EnrichmentCache::new(config.cache_key, config.cache_window_secs, config.cache_expiry_secs);

        Self {
            config,
            cache,
            chain: FallbackChain::new(providers),
            clock: Box::new(SystemClock),
            stats: EnricherStats::default(),
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[inline]
    pub fn stats(&self) -> &EnricherStats {
        &self.stats
    }

    #[inline]
    pub fn cache(&self) -> &EnrichmentCache {
        &self.cache
    }

    #[inline]
    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    /// Describes `track` as seen in `frame`, from cache when possible.
    pub fn enrich(&mut self, frame: &RgbImage, track: &Track) -> Option<Enrichment> {
        let now = self.clock.now();
        let key = self.cache.key(&track.class, track.id, now);
        self.stats.lookups += 1;

        if let Some(cached) = self.cache.get(&key) {
            debug!(track = track.id, class = %track.class, provider = %cached.provider, "enrichment cache hit");
            self.stats.cache_hits += 1;
            return Some(cached.clone());
        }

        if self.chain.is_empty() {
            return None;
        }

        let Some(region) = crop::crop_region(frame, &track.bbox, self.config.crop_padding) else {
            trace!(track = track.id, "empty crop");
            self.stats.empty_crops += 1;
            return None;
        };

        let encoded = match crop::encode_jpeg(&region, self.config.max_image_side, self.config.jpeg_quality) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(track = track.id, %err, "crop encoding failed");
                return None;
            }
        };

        self.stats.provider_calls += 1;
        let enrichment = self.chain.run(&encoded, &track.class, now)?;
        self.stats.provider_successes += 1;

        self.cache.insert(key, enrichment.clone());
        Some(enrichment)
    }

    pub fn purge_expired(&mut self) -> usize {
        let purged = self.cache.purge_expired(self.clock.now());
        if purged > 0 {
            trace!(purged, "expired enrichment entries");
        }

        purged
    }
}

impl std::fmt::Debug for Enricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enricher")
            .field("chain", &self.chain)
            .field("cached", &self.cache.len())
            .field("stats", &self.stats)
            .finish()
    }
}
