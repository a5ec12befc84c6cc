use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use image::RgbImage;
use serde_derive::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::filter::LevelFilter;

use qtrack_enrich::enricher::Enricher;
use qtrack_enrich::matcher::{GreedyMatcher, Matcher, OptimalMatcher};
use qtrack_enrich::providers::ProviderSet;
use qtrack_enrich::{DetectorTier, Frame, Pipeline, PipelineConfig, TrackSnapshot};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MatcherKind {
    Greedy,
    Optimal,
}

/// Replays a detection log through the tracker and prints the stable tracks
/// of every frame as JSON lines.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Detection log, one JSON frame per line; `-` reads stdin
    #[arg(default_value = "-")]
    input: String,

    /// Detector tier (n/s/m/l/x)
    #[arg(short, long, default_value = "n")]
    tier: DetectorTier,

    /// JSON file overriding the tier defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = MatcherKind::Greedy)]
    matcher: MatcherKind,

    /// Directory with frame images named `<index>.jpg` or `<index>.png`;
    /// enables enrichment
    #[arg(short, long)]
    images: Option<PathBuf>,

    /// More logging (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    index: u64,
    tracks: &'a [TrackSnapshot],
}

fn load_image(dir: &Path, index: u64) -> Option<RgbImage> {
    let path = ["jpg", "png"]
        .iter()
        .map(|ext| dir.join(format!("{}.{}", index, ext)))
        .find(|p| p.exists())?;

    match image::open(&path) {
        Ok(img) => Some(img.to_rgb8()),
        Err(err) => {
            warn!(path = %path.display(), %err, "could not read frame image");
            None
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path, args.tier)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::for_tier(args.tier),
    };

    let matcher: Box<dyn Matcher> = match args.matcher {
        MatcherKind::Greedy => Box::new(GreedyMatcher),
        MatcherKind::Optimal => Box::new(OptimalMatcher),
    };

    info!(tier = ?config.tier, matcher = matcher.name(), "starting replay");

    let mut pipeline = Pipeline::new(config.clone()).with_matcher(matcher);

    if args.images.is_some() {
        let providers = ProviderSet::from_env(config.enricher.provider_timeout()).into_vec();
        let enricher = Enricher::new(config.enricher.clone(), providers);

        if enricher.chain().is_empty() {
            warn!("no enrichment provider configured, tracks will carry detector classes only");
        } else {
            info!(providers = ?enricher.chain().names(), "enrichment enabled");
        }

        pipeline = pipeline.with_enricher(enricher);
    }

    let reader: Box<dyn BufRead> = if args.input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(&args.input).with_context(|| format!("opening {}", args.input))?;
        Box::new(BufReader::new(file))
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let frame: Frame = serde_json::from_str(&line)
            .with_context(|| format!("line {}: bad frame record", lineno + 1))?;
        let index = frame.index;

        let image = args.images.as_deref().and_then(|dir| load_image(dir, index));
        if args.images.is_some() && image.is_none() {
            debug!(index, "no image for frame");
        }

        let tracks = pipeline.process(frame, image.as_ref());

        serde_json::to_writer(&mut out, &FrameOutput { index, tracks: &tracks })?;
        out.write_all(b"\n")?;
    }

    out.flush()?;

    let stats = pipeline.stats();
    info!(
        frames = stats.frames,
        detections = stats.total_detections,
        accuracy = %format!("{:.1}%", stats.accuracy()),
        tracks_born = stats.tracks_born,
        enrichment_calls = stats.enrichment_calls,
        enrichment_hits = stats.enrichment_hits,
        mean_confidence = stats.mean_confidence,
        "replay finished"
    );
    debug!(rejections = ?stats.rejections, "rejections by reason");

    Ok(())
}
