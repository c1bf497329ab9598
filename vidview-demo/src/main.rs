use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn};
use vidview_core::logging::{self, PREFIX};
use vidview_core::registry;
use vidview_core::{
    default_engine, Color, DecodeEngine, FrameBufferHost, PatternEngine, PlayerConfig,
    PlayerEvent, PlayerSession, Rect, WindowRegion,
};

/// Stand-in for a native window handle; the core never dereferences it.
const DEMO_WINDOW: usize = 0x1;

/// URL handed to the synthetic engine, which ignores it
const PATTERN_SOURCE: &str = "rtsp://localhost/pattern";

#[derive(Parser, Debug)]
#[command(name = "vidview-demo")]
#[command(about = "Play a source into an off-screen surface with a rectangle overlay")]
#[command(version)]
struct Args {
    /// File, image directory or stream URL; color bars when omitted
    source: Option<String>,

    /// Region width in pixels
    #[arg(long, default_value = "800")]
    width: f32,

    /// Region height in pixels
    #[arg(long, default_value = "600")]
    height: f32,

    /// Replace the scripted timeline with a moving detection box every second
    #[arg(long)]
    detect: bool,

    /// Total run time in seconds
    #[arg(long, default_value = "14")]
    duration: f64,

    /// Multiply every timeline delay by this factor
    #[arg(long, default_value = "1.0")]
    time_scale: f64,

    /// JSON player configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the last presented surface here as PNG
    #[arg(short, long, default_value = "vidview-last-frame.png")]
    output: PathBuf,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

enum Step {
    Annotate,
    Clear,
    Pause,
    Resume,
}

/// Delay in seconds after play, then the action.
const TIMELINE: &[(f64, Step)] = &[
    (3.0, Step::Annotate),
    (6.0, Step::Clear),
    (10.0, Step::Pause),
    (12.0, Step::Resume),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init_with_filter(&args.log_level);

    let config = match &args.config {
        Some(path) => PlayerConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => PlayerConfig::default(),
    };

    let (engine, source): (Arc<dyn DecodeEngine>, String) = match &args.source {
        Some(source) => (default_engine(), source.clone()),
        None => (
            Arc::new(PatternEngine::new(640, 360, 25.0)),
            PATTERN_SOURCE.to_string(),
        ),
    };

    let host = FrameBufferHost::new();
    let region = WindowRegion::new(DEMO_WINDOW, 50.0, 50.0, args.width, args.height)?;
    let handle = registry::create_player(region, engine, host.clone(), config)?;
    let session = registry::resolve(handle)?;
    let events = session.subscribe();

    info!("{} playing {}", PREFIX, source);
    session.play(&source)?;

    let started = Instant::now();
    let deadline = started + Duration::from_secs_f64(args.duration * args.time_scale);
    if args.detect {
        run_detection(&session, deadline, args.time_scale)?;
    } else {
        run_timeline(&session, started, deadline, args.time_scale)?;
    }

    for event in events.try_iter() {
        match event {
            PlayerEvent::SourceUnavailable { source, reason } => {
                warn!("{} {} unavailable: {}", PREFIX, source, reason)
            }
            other => info!("{} event: {:?}", PREFIX, other),
        }
    }

    session.stop()?;
    info!("{} final state {}", PREFIX, session.state().as_str());
    for line in session.stats_text().lines() {
        info!("{}   {}", PREFIX, line);
    }

    match host.latest() {
        Some(frame) => {
            frame.image.save(&args.output)?;
            info!(
                "{} saved {}x{} surface to {}",
                PREFIX,
                frame.width(),
                frame.height(),
                args.output.display()
            );
        }
        None => warn!("{} nothing was presented", PREFIX),
    }

    registry::release_player(handle)?;
    Ok(())
}

fn run_timeline(
    session: &PlayerSession,
    started: Instant,
    deadline: Instant,
    time_scale: f64,
) -> vidview_core::Result<()> {
    for (at, step) in TIMELINE {
        let due = started + Duration::from_secs_f64(at * time_scale);
        if due > deadline {
            break;
        }
        thread::sleep(due.saturating_duration_since(Instant::now()));
        match step {
            Step::Annotate => {
                let rectangles = vec![
                    Rect::new(100.0, 100.0, 200.0, 150.0),
                    Rect::new(400.0, 200.0, 150.0, 100.0),
                ];
                session.update_rectangles(rectangles, 3.0, Color::new(0.0, 1.0, 0.0, 1.0))?;
                info!("{} drew 2 rectangles", PREFIX);
            }
            Step::Clear => {
                session.clear_rectangles()?;
                info!("{} cleared rectangles", PREFIX);
            }
            Step::Pause => {
                session.pause()?;
                info!("{} paused", PREFIX);
            }
            Step::Resume => {
                session.resume()?;
                info!("{} resumed", PREFIX);
            }
        }
    }
    thread::sleep(deadline.saturating_duration_since(Instant::now()));
    Ok(())
}

/// Sweep one to three boxes across the region, one update per second.
fn run_detection(
    session: &PlayerSession,
    deadline: Instant,
    time_scale: f64,
) -> vidview_core::Result<()> {
    let period = Duration::from_secs_f64(time_scale.max(0.01));
    let region = session.region();
    let mut tick = 0u32;
    while Instant::now() < deadline {
        let count = tick % 3 + 1;
        let rectangles = (0..count)
            .map(|i| {
                let x = (tick * 60 + i * 150) as f32 % (region.width - 150.0).max(1.0);
                let y = 100.0 + (i * 120) as f32 % (region.height - 150.0).max(1.0);
                Rect::new(x, y, 50.0 + (tick % 4 * 25) as f32, 50.0 + (i * 30) as f32)
            })
            .collect();
        session.update_rectangles(rectangles, 2.5, Color::new(1.0, 0.0, 0.0, 0.8))?;
        info!("{} tick {}: {} objects", PREFIX, tick, count);

        tick += 1;
        thread::sleep(period.min(deadline.saturating_duration_since(Instant::now())));
    }
    session.clear_rectangles()
}
