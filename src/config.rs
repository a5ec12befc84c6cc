use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

use crate::cache::CacheKeyPolicy;
use crate::error::Error;

/// Detection-model capacity profile. Larger models see more and jitter more,
/// so they get looser thresholds and wider match radii.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorTier {
    #[default]
    Nano,
    Small,
    Medium,
    Large,
    ExtraLarge,
}

impl DetectorTier {
    #[inline]
    pub fn is_high_capacity(self) -> bool {
        matches!(self, DetectorTier::Large | DetectorTier::ExtraLarge)
    }

    pub fn max_match_distance(self) -> f32 {
        match self {
            DetectorTier::Large | DetectorTier::ExtraLarge => 250.0,
            DetectorTier::Medium => 200.0,
            DetectorTier::Nano | DetectorTier::Small => 150.0,
        }
    }

    pub fn admission_bonus(self) -> f32 {
        match self {
            DetectorTier::Large | DetectorTier::ExtraLarge => 0.02,
            DetectorTier::Medium => 0.05,
            DetectorTier::Nano | DetectorTier::Small => 0.1,
        }
    }

    pub fn stability_threshold(self) -> u32 {
        if self.is_high_capacity() {
            2
        } else {
            3
        }
    }

    pub fn min_detection_size(self) -> f32 {
        if self.is_high_capacity() {
            10.0
        } else {
            15.0
        }
    }
}

impl FromStr for DetectorTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "n" | "nano" => DetectorTier::Nano,
            "s" | "small" => DetectorTier::Small,
            "m" | "medium" => DetectorTier::Medium,
            "l" | "large" => DetectorTier::Large,
            "x" | "extra-large" | "xlarge" => DetectorTier::ExtraLarge,
            _ => return Err(Error::UnknownTier(s.to_string())),
        })
    }
}

const BASE_CLASS_THRESHOLDS: &[(&str, f32)] = &[
    ("person", 0.6),
    ("dog", 0.55),
    ("cat", 0.55),
    ("bird", 0.65),
    ("horse", 0.5),
    ("sheep", 0.5),
    ("cow", 0.5),
    ("elephant", 0.45),
    ("bear", 0.55),
    ("zebra", 0.5),
    ("giraffe", 0.45),
    ("car", 0.4),
    ("truck", 0.4),
    ("bus", 0.4),
    ("motorcycle", 0.5),
    ("bicycle", 0.5),
    ("train", 0.35),
    ("boat", 0.45),
    ("airplane", 0.35),
    ("cell phone", 0.65),
    ("laptop", 0.45),
    ("tv", 0.3),
    ("keyboard", 0.5),
    ("mouse", 0.55),
    ("remote", 0.6),
    ("microwave", 0.4),
    ("oven", 0.35),
    ("refrigerator", 0.3),
    ("chair", 0.35),
    ("couch", 0.35),
    ("bed", 0.3),
    ("dining table", 0.3),
    ("toilet", 0.4),
    ("banana", 0.7),
    ("apple", 0.7),
    ("sandwich", 0.6),
    ("orange", 0.65),
    ("broccoli", 0.6),
    ("carrot", 0.65),
    ("pizza", 0.5),
    ("donut", 0.6),
    ("cake", 0.55),
    ("bottle", 0.55),
    ("cup", 0.6),
    ("fork", 0.65),
    ("knife", 0.65),
    ("spoon", 0.65),
    ("bowl", 0.55),
    ("wine glass", 0.6),
    ("book", 0.45),
    ("clock", 0.5),
    ("vase", 0.5),
    ("scissors", 0.6),
    ("teddy bear", 0.5),
    ("hair drier", 0.55),
    ("toothbrush", 0.65),
    ("umbrella", 0.45),
    ("handbag", 0.5),
    ("tie", 0.55),
    ("suitcase", 0.4),
    ("frisbee", 0.55),
    ("skis", 0.5),
    ("snowboard", 0.5),
    ("sports ball", 0.6),
    ("kite", 0.5),
    ("baseball bat", 0.5),
    ("baseball glove", 0.55),
    ("skateboard", 0.5),
    ("surfboard", 0.45),
    ("tennis racket", 0.5),
];

const ENRICHMENT_PRIORITIES: &[(&str, i32)] = &[
    ("cell phone", 10),
    ("laptop", 9),
    ("car", 8),
    ("truck", 7),
    ("person", 6),
    ("tv", 5),
    ("book", 4),
    ("bottle", 3),
    ("chair", 2),
    ("cup", 1),
];

/// Per-class minimum confidence, with a fallback for classes not listed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClassThresholds {
    pub default: f32,
    #[serde(default)]
    pub classes: HashMap<String, f32>,
}

impl ClassThresholds {
    pub fn new(default: f32) -> Self {
        Self {
            default,
            classes: HashMap::new(),
        }
    }

    pub fn for_tier(tier: DetectorTier) -> Self {
        let adjust = |t: f32| match tier {
            DetectorTier::Large | DetectorTier::ExtraLarge => (t - 0.15).max(0.25),
            DetectorTier::Medium => (t - 0.1).max(0.3),
            DetectorTier::Nano | DetectorTier::Small => t,
        };

        let default = if tier.is_high_capacity() { 0.25 } else { 0.4 };

        Self {
            default,
            classes: BASE_CLASS_THRESHOLDS
                .iter()
                .map(|&(class, t)| (class.to_string(), adjust(t)))
                .collect(),
        }
    }

    pub fn with(mut self, class: impl Into<String>, threshold: f32) -> Self {
        self.classes.insert(class.into(), threshold);
        self
    }

    #[inline]
    pub fn get(&self, class: &str) -> f32 {
        self.classes.get(class).copied().unwrap_or(self.default)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ValidatorConfig {
    pub thresholds: ClassThresholds,
    /// px, applied to both width and height
    pub min_detection_size: f32,
    /// fraction of the frame on either axis
    pub max_detection_size: f32,
    pub min_aspect_ratio: f32,
    pub max_aspect_ratio: f32,
    /// px of slack around the frame edges
    pub bounds_margin: f32,
}

impl ValidatorConfig {
    pub fn for_tier(tier: DetectorTier) -> Self {
        Self {
            thresholds: ClassThresholds::for_tier(tier),
            min_detection_size: tier.min_detection_size(),
            max_detection_size: 0.95,
            min_aspect_ratio: 0.05,
            max_aspect_ratio: 10.0,
            bounds_margin: 5.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AssociationConfig {
    pub max_match_distance: f32,
    pub admission_bonus: f32,
    pub stability_threshold: u32,
    pub max_stable_count: u32,
    pub history_len: usize,
}

impl AssociationConfig {
    pub fn for_tier(tier: DetectorTier) -> Self {
        Self {
            max_match_distance: tier.max_match_distance(),
            admission_bonus: tier.admission_bonus(),
            stability_threshold: tier.stability_threshold(),
            max_stable_count: 20,
            history_len: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GateConfig {
    pub confidence_floor: f32,
    pub priority_floor: i32,
    /// enrichment runs on every n-th frame
    pub interval: u64,
    pub priorities: HashMap<String, i32>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.7,
            priority_floor: 5,
            interval: 5,
            priorities: ENRICHMENT_PRIORITIES
                .iter()
                .map(|&(class, p)| (class.to_string(), p))
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EnricherConfig {
    /// fraction of the box added on each side before cropping
    pub crop_padding: f32,
    pub max_image_side: u32,
    pub jpeg_quality: u8,
    pub provider_timeout_ms: u64,
    pub cache_window_secs: i64,
    pub cache_expiry_secs: i64,
    pub cache_key: CacheKeyPolicy,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            crop_padding: 0.1,
            max_image_side: 512,
            jpeg_quality: 85,
            provider_timeout_ms: 10_000,
            cache_window_secs: 60,
            cache_expiry_secs: 300,
            cache_key: CacheKeyPolicy::default(),
        }
    }
}

impl EnricherConfig {
    #[inline]
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub tier: DetectorTier,
    pub validator: ValidatorConfig,
    pub association: AssociationConfig,
    pub gate: GateConfig,
    pub enricher: EnricherConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_tier(DetectorTier::default())
    }
}

impl PipelineConfig {
    pub fn for_tier(tier: DetectorTier) -> Self {
        Self {
            tier,
            validator: ValidatorConfig::for_tier(tier),
            association: AssociationConfig::for_tier(tier),
            gate: GateConfig::default(),
            enricher: EnricherConfig::default(),
        }
    }

    /// Reads a JSON document whose keys override the defaults of the tier it
    /// names (or of `fallback_tier` when it names none).
    pub fn from_json_str(json: &str, fallback_tier: DetectorTier) -> Result<Self, Error> {
        let overrides: serde_json::Value = serde_json::from_str(json)?;

        let tier = match overrides.get("tier") {
            Some(tier) => serde_json::from_value(tier.clone())?,
            None => fallback_tier,
        };

        let mut merged = serde_json::to_value(Self::for_tier(tier))?;
        merge(&mut merged, overrides);

        let config: Self = serde_json::from_value(merged)?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P, fallback_tier: DetectorTier) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path)?;

        Self::from_json_str(&json, fallback_tier)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let v = &self.validator;
        let a = &self.association;
        let g = &self.gate;
        let e = &self.enricher;

        let checks: [(bool, &str); 12] = [
            (v.min_detection_size >= 0.0, "validator.min_detection_size must be >= 0"),
            (
                v.max_detection_size > 0.0 && v.max_detection_size <= 1.0,
                "validator.max_detection_size must be in (0, 1]",
            ),
            (
                v.min_aspect_ratio > 0.0 && v.min_aspect_ratio < v.max_aspect_ratio,
                "validator aspect ratio bounds are inverted",
            ),
            (a.max_match_distance > 0.0, "association.max_match_distance must be > 0"),
            (a.stability_threshold >= 1, "association.stability_threshold must be >= 1"),
            (
                a.max_stable_count >= a.stability_threshold,
                "association.max_stable_count is below the stability threshold",
            ),
            (g.interval >= 1, "gate.interval must be >= 1"),
            (e.max_image_side >= 1, "enricher.max_image_side must be >= 1"),
            (
                (1..=100).contains(&e.jpeg_quality),
                "enricher.jpeg_quality must be in 1..=100",
            ),
            (e.cache_window_secs >= 1, "enricher.cache_window_secs must be >= 1"),
            (e.cache_expiry_secs >= 0, "enricher.cache_expiry_secs must be >= 0"),
            (e.provider_timeout_ms >= 1, "enricher.provider_timeout_ms must be >= 1"),
        ];

        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, msg)) => Err(Error::InvalidConfig(msg.to_string())),
            None => Ok(()),
        }
    }
}

fn merge(base: &mut serde_json::Value, overrides: serde_json::Value) {
    match (base, overrides) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
