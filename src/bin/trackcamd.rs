//! trackcamd - run the tracking pipeline and drive it from stdin
//!
//! Commands, one per line (`;` groups several into one atomic batch):
//!
//!   mode <idle|draw|manual|motion|contrast|neural>
//!   bbox <x0> <y0> <x1> <y1> | bbox none
//!   param <name> <value>
//!   model <model.onnx> <classes.txt> | model none
//!   stop
//!
//! Status notices are written to stdout as JSON lines.

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use trackcam::detect::default_loader;
use trackcam::engine::Command;
use trackcam::track::TemplateTrackerFactory;
use trackcam::vision::LabelFont;
use trackcam::{
    open_source, BoundingBox, CancellationToken, DetectionEngine, DetectionMode, EventPublisher,
    Pipeline, Point, StatusEvent, Subscription, TrackcamConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "TRACKCAM_CONFIG")]
    config: Option<PathBuf>,
    /// Capture source (stub://<scene>, /dev/videoN, image directory, video file).
    #[arg(long)]
    source: Option<String>,
    /// Target frame rate; 0 runs unpaced.
    #[arg(long)]
    fps: Option<u32>,
    /// Mode to enter at startup.
    #[arg(long, default_value = "idle")]
    mode: DetectionMode,
    /// ONNX model for neural mode.
    #[arg(long, requires = "classes")]
    model: Option<PathBuf>,
    /// Class list for neural mode, one name per line.
    #[arg(long, requires = "model")]
    classes: Option<PathBuf>,
    /// TTF font for detection labels.
    #[arg(long)]
    font: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = TrackcamConfig::load_from(args.config.as_deref())?;
    if let Some(source) = args.source {
        cfg.source.id = source;
    }
    if let Some(fps) = args.fps {
        cfg.source.target_fps = fps;
    }
    if args.model.is_some() {
        cfg.neural.model_path = args.model;
        cfg.neural.classes_path = args.classes;
    }
    if args.font.is_some() {
        cfg.neural.font_path = args.font;
    }
    cfg.validate()?;

    let source = open_source(&cfg.source)
        .with_context(|| format!("open capture source {}", cfg.source.id))?;
    let engine = DetectionEngine::new(
        cfg.engine_settings(),
        Box::new(TemplateTrackerFactory::new(cfg.tracker)),
        default_loader(cfg.neural.settings.input_size),
    )
    .with_font(LabelFont::load(cfg.neural.font_path.as_deref()));

    let pipeline = Pipeline::spawn(source, engine, EventPublisher::new(cfg.event_capacity))?;

    let mut startup = Vec::new();
    if let (Some(model), Some(classes)) = (&cfg.neural.model_path, &cfg.neural.classes_path) {
        startup.push(Command::set_model_paths(model, classes));
    }
    startup.push(Command::SetMode(args.mode));
    pipeline.send(Command::Batch(startup))?;

    let cancel = pipeline.cancel_token();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            log::info!("trackcamd: interrupt received, stopping");
            cancel.cancel();
        })
        .context("install Ctrl-C handler")?;
    }

    let commands = pipeline.commands();
    std::thread::Builder::new()
        .name("trackcamd-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse_line(&line) {
                    Ok(Some(command)) => {
                        if commands.send(command).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => log::warn!("trackcamd: {}", err),
                }
            }
        })
        .context("spawn stdin reader")?;

    let monitor = {
        let subscription = pipeline.subscribe();
        let cancel = cancel.clone();
        std::thread::Builder::new()
            .name("trackcamd-monitor".to_string())
            .spawn(move || monitor(subscription, cancel))
            .context("spawn monitor")?
    };

    for status in pipeline.status().iter() {
        println!("{}", serde_json::to_string(&status)?);
        if let StatusEvent::Stopped(_) = status {
            break;
        }
    }

    pipeline.stop();
    let reason = pipeline.join()?;
    if monitor.join().is_err() {
        log::error!("trackcamd: monitor thread panicked");
    }
    log::info!("trackcamd: stopped ({})", reason);
    Ok(())
}

/// Log frame statistics once per second until cancelled.
fn monitor(subscription: Subscription, cancel: CancellationToken) {
    let mut last_log = Instant::now();
    while !cancel.is_cancelled() {
        let Some(event) = subscription.recv_timeout(Duration::from_millis(200)) else {
            continue;
        };
        if last_log.elapsed() < Duration::from_secs(1) {
            continue;
        }
        last_log = Instant::now();
        log::info!(
            "frame={} {}x{} fps={:.1} mode={}/{} mean=[{:.1} {:.1} {:.1}] min={} max={} tracked={:?} detections={}",
            event.index,
            event.frame.width(),
            event.frame.height(),
            event.fps,
            event.mode,
            event.state,
            event.stats.mean[0],
            event.stats.mean[1],
            event.stats.mean[2],
            event.stats.min,
            event.stats.max,
            event.tracked,
            event.detections.len()
        );
    }
}

fn parse_line(line: &str) -> Result<Option<Command>> {
    let mut commands = line
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty() && !part.starts_with('#'))
        .map(parse_command)
        .collect::<Result<Vec<_>>>()?;
    Ok(match commands.len() {
        0 => None,
        1 => commands.pop(),
        _ => Some(Command::Batch(commands)),
    })
}

fn parse_command(text: &str) -> Result<Command> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let Some((&verb, rest)) = words.split_first() else {
        bail!("empty command");
    };
    match (verb.to_ascii_lowercase().as_str(), rest) {
        ("mode", [mode]) => Ok(Command::SetMode(mode.parse().map_err(|e| anyhow!("{}", e))?)),
        ("bbox", ["none"]) => Ok(Command::SetBoundingBox(None)),
        ("bbox", [x0, y0, x1, y1]) => {
            let coord = |s: &str| {
                s.parse::<i32>()
                    .map_err(|_| anyhow!("bbox coordinate '{}' is not an integer", s))
            };
            Ok(Command::SetBoundingBox(Some(BoundingBox::from_corners(
                Point::new(coord(*x0)?, coord(*y0)?),
                Point::new(coord(*x1)?, coord(*y1)?),
            ))))
        }
        // Names may contain spaces ("H min"); the value is the last word.
        ("param", [name @ .., value]) if !name.is_empty() => {
            let value = value
                .parse::<i64>()
                .map_err(|_| anyhow!("parameter value '{}' is not an integer", value))?;
            Ok(Command::set_parameter(name.join(" "), value))
        }
        ("model", ["none"]) => Ok(Command::clear_model_paths()),
        ("model", [model, classes]) => Ok(Command::set_model_paths(*model, *classes)),
        ("stop", []) => Ok(Command::Stop),
        _ => bail!("unrecognized command '{}'", text),
    }
}
