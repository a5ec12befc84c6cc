use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::{Rgb, RgbImage};
use qtrack_enrich::association::Associator;
use qtrack_enrich::cache::{CacheKeyPolicy, Clock};
use qtrack_enrich::config::{AssociationConfig, ClassThresholds, EnricherConfig};
use qtrack_enrich::crop::EncodedImage;
use qtrack_enrich::enricher::Enricher;
use qtrack_enrich::provider::{Provider, ProviderError};
use qtrack_enrich::store::TrackStore;
use qtrack_enrich::{
    Attributes, Detection, DetectorTier, Enrichment, Frame, Pipeline, PipelineConfig, Track, Tracking,
};

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn clock_at(secs: i64) -> Box<dyn Clock> {
    Box::new(FixedClock(DateTime::from_timestamp(secs, 0).unwrap()))
}

/// Scripted provider counting how often it was asked.
struct Scripted {
    name: &'static str,
    configured: bool,
    reply: Result<Attributes, u16>,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    fn ok(name: &'static str, brand: &str, model: &str, confidence: f32) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let attributes = Attributes {
            brand: Some(brand.to_string()),
            model: Some(model.to_string()),
            confidence,
            ..Default::default()
        };

        let provider = Self {
            name,
            configured: true,
            reply: Ok(attributes),
            calls: calls.clone(),
        };

        (provider, calls)
    }

    fn failing(name: &'static str, status: u16) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Self {
            name,
            configured: true,
            reply: Err(status),
            calls: calls.clone(),
        };

        (provider, calls)
    }

    fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }
}

impl Provider for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn classify(&self, image: &EncodedImage, _class: &str) -> Result<Attributes, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(&image.jpeg[..2], &[0xff, 0xd8]);

        self.reply.clone().map_err(ProviderError::Http)
    }
}

fn scene() -> RgbImage {
    RgbImage::from_fn(640, 480, |x, y| Rgb([(x / 3) as u8, (y / 2) as u8, 90]))
}

fn tracks(dets: Vec<Detection>) -> Vec<Track> {
    let associator = Associator::new(
        AssociationConfig::for_tier(DetectorTier::Nano),
        ClassThresholds::for_tier(DetectorTier::Nano),
    );
    let mut store = TrackStore::default();
    associator.associate(&mut store, dets);

    store.iter().cloned().collect()
}

fn phone(x: f32) -> Detection {
    Detection::ltrb(x, 100.0, x + 60.0, 220.0, "cell phone", 0.9)
}

#[test]
fn same_class_within_window_hits_cache() {
    let (provider, calls) = Scripted::ok("primary", "Apple", "iPhone 15", 0.9);
    let mut enricher =
        Enricher::new(EnricherConfig::default(), vec![Box::new(provider)]).with_clock(clock_at(1_700_000_000));

    let phones = tracks(vec![phone(50.0), phone(400.0)]);
    let first = enricher.enrich(&scene(), &phones[0]).unwrap();
    let second = enricher.enrich(&scene(), &phones[1]).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.attributes.model.as_deref(), Some("iPhone 15"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(enricher.stats().cache_hits, 1);
}

#[test]
fn track_keyed_cache_separates_same_class_objects() {
    let (provider, calls) = Scripted::ok("primary", "Apple", "iPhone 15", 0.9);
    let config = EnricherConfig {
        cache_key: CacheKeyPolicy::TrackMinute,
        ..Default::default()
    };
    let mut enricher = Enricher::new(config, vec![Box::new(provider)]).with_clock(clock_at(1_700_000_000));

    let phones = tracks(vec![phone(50.0), phone(400.0)]);
    enricher.enrich(&scene(), &phones[0]).unwrap();
    enricher.enrich(&scene(), &phones[1]).unwrap();
    enricher.enrich(&scene(), &phones[0]).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn chain_stops_at_first_success() {
    let (a, a_calls) = Scripted::failing("a", 500);
    let (b, b_calls) = Scripted::ok("b", "Samsung", "Galaxy S23", 0.85);
    let (c, c_calls) = Scripted::ok("c", "Google", "Pixel 8", 0.99);

    let mut enricher = Enricher::new(
        EnricherConfig::default(),
        vec![Box::new(a), Box::new(b), Box::new(c)],
    )
    .with_clock(clock_at(0));

    let phones = tracks(vec![phone(100.0)]);
    let enrichment = enricher.enrich(&scene(), &phones[0]).unwrap();

    assert_eq!(enrichment.provider, "b");
    assert_eq!(enrichment.confidence(), 0.85);
    assert_eq!(enrichment.timestamp, DateTime::from_timestamp(0, 0).unwrap());
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    assert_eq!(c_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn unconfigured_providers_are_never_called() {
    let (a, a_calls) = Scripted::ok("a", "Dell", "XPS 13", 0.9);
    let (b, b_calls) = Scripted::ok("b", "Lenovo", "ThinkPad X1", 0.9);

    let mut enricher = Enricher::new(
        EnricherConfig::default(),
        vec![Box::new(a.unconfigured()), Box::new(b)],
    );
    assert_eq!(enricher.chain().names(), vec!["b"]);

    let laptop = tracks(vec![Detection::ltrb(100.0, 100.0, 300.0, 250.0, "laptop", 0.9)]);
    let enrichment = enricher.enrich(&scene(), &laptop[0]).unwrap();

    assert_eq!(enrichment.provider, "b");
    assert_eq!(a_calls.load(Ordering::SeqCst), 0);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn failures_are_not_cached() {
    let (a, a_calls) = Scripted::failing("a", 429);
    let mut enricher = Enricher::new(EnricherConfig::default(), vec![Box::new(a)]).with_clock(clock_at(60));

    let phones = tracks(vec![phone(100.0)]);
    assert!(enricher.enrich(&scene(), &phones[0]).is_none());
    assert!(enricher.enrich(&scene(), &phones[0]).is_none());

    assert_eq!(a_calls.load(Ordering::SeqCst), 2);
    assert!(enricher.cache().is_empty());
}

fn run_phone(pipeline: &mut Pipeline, frames: u64, image: Option<&RgbImage>) {
    for i in 0..frames {
        let frame = Frame::new(i, (640, 480), vec![phone(200.0 + i as f32 * 2.0)]);
        pipeline.process(frame, image);
    }
}

#[test]
fn pipeline_enriches_stable_tracks_on_sampling_frames() {
    let (provider, calls) = Scripted::ok("primary", "Apple", "iPhone 15", 0.9);
    let enricher = Enricher::new(EnricherConfig::default(), vec![Box::new(provider)]).with_clock(clock_at(1_000));
    let mut pipeline = Pipeline::new(PipelineConfig::for_tier(DetectorTier::Nano)).with_enricher(enricher);
    let image = scene();

    // stable from the third frame, first sampling frame after that is #5
    run_phone(&mut pipeline, 5, Some(&image));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.tracks()[0].display_name, "cell phone");

    pipeline.process(Frame::new(5, (640, 480), vec![phone(210.0)]), Some(&image));

    let tracks = pipeline.tracks();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(tracks[0].display_name, "Apple iPhone 15");
    assert_eq!(tracks[0].enrichment.as_ref().map(|e| e.provider.as_str()), Some("primary"));
    assert_eq!(pipeline.stats().enrichment_calls, 1);
    assert_eq!(pipeline.stats().enrichment_hits, 1);

    let json = serde_json::to_value(&tracks[0]).unwrap();
    assert_eq!(json["enrichment"]["brand"], "Apple");
    assert_eq!(json["enrichment"]["provider"], "primary");
}

#[test]
fn no_image_means_no_enrichment() {
    let (provider, calls) = Scripted::ok("primary", "Apple", "iPhone 15", 0.9);
    let enricher = Enricher::new(EnricherConfig::default(), vec![Box::new(provider)]);
    let mut pipeline = Pipeline::new(PipelineConfig::for_tier(DetectorTier::Nano)).with_enricher(enricher);

    run_phone(&mut pipeline, 11, None);

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.tracks()[0].display_name, "cell phone");
}

#[test]
fn failed_enrichment_leaves_track_unchanged() {
    let (a, _) = Scripted::failing("a", 503);
    let enricher = Enricher::new(EnricherConfig::default(), vec![Box::new(a)]);
    let mut pipeline = Pipeline::new(PipelineConfig::for_tier(DetectorTier::Nano)).with_enricher(enricher);
    let image = scene();

    run_phone(&mut pipeline, 6, Some(&image));

    let tracks = pipeline.tracks();
    assert_eq!(tracks.len(), 1);
    assert!(tracks[0].enrichment.is_none());
    assert_eq!(tracks[0].display_name, "cell phone");
    assert_eq!(pipeline.stats().enrichment_calls, 1);
    assert_eq!(pipeline.stats().enrichment_hits, 0);
}

#[test]
fn failed_refresh_keeps_existing_enrichment() {
    let (a, a_calls) = Scripted::failing("a", 503);
    let enricher = Enricher::new(EnricherConfig::default(), vec![Box::new(a)]).with_clock(clock_at(2_000));
    let mut pipeline = Pipeline::new(PipelineConfig::for_tier(DetectorTier::Nano)).with_enricher(enricher);
    let image = scene();

    let seeded = Enrichment::new(
        Attributes {
            brand: Some("Apple".to_string()),
            model: Some("X".to_string()),
            confidence: 0.9,
            ..Default::default()
        },
        "upstream",
        DateTime::from_timestamp(1_000, 0).unwrap(),
    );
    pipeline.process(
        Frame::new(0, (640, 480), vec![phone(200.0).with_enrichment(seeded)]),
        Some(&image),
    );

    for i in 1..6 {
        let frame = Frame::new(i, (640, 480), vec![phone(200.0 + i as f32 * 2.0)]);
        pipeline.process(frame, Some(&image));
    }

    let tracks = pipeline.tracks();
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.stats().enrichment_hits, 0);
    assert_eq!(tracks[0].display_name, "Apple X");
    assert_eq!(tracks[0].enrichment.as_ref().map(|e| e.provider.as_str()), Some("upstream"));
}
