use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gesture_core::{
    detection::{load_script, ScriptedBackend},
    runtime::resolve_config,
    video::ReplayCamera,
    CaptureArtifact, CaptureSession, Handedness, LandmarkSet, SessionEvent, SessionOutcome,
};

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "gesture-capture",
    version,
    about = "Hands-free photo capture driven by a three-step finger gesture",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full capture session against scripted detector output.
    Replay {
        /// Detector script (JSON array of per-frame steps)
        #[arg(short, long)]
        script: PathBuf,

        /// Directory of PNG/JPEG frames to use as the camera feed
        #[arg(short, long)]
        frames: Option<PathBuf>,

        /// Session config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Where to write the captured photo
        #[arg(short, long, default_value = "captures")]
        output: PathBuf,

        /// Stop the camera feed after this many frames
        #[arg(long)]
        max_frames: Option<u64>,
    },

    /// Print the extended-finger count for one landmark set.
    Count {
        /// JSON array of 21 `{x, y}` landmarks
        #[arg(short, long)]
        landmarks: PathBuf,

        #[arg(long, value_enum, default_value_t = HandArg::Right)]
        handedness: HandArg,

        /// Print a JSON object instead of a bare number
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum HandArg {
    Left,
    Right,
}

impl From<HandArg> for Handedness {
    fn from(arg: HandArg) -> Self {
        match arg {
            HandArg::Left => Handedness::Left,
            HandArg::Right => Handedness::Right,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Respect RUST_LOG; default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            script,
            frames,
            config,
            output,
            max_frames,
        } => cmd_replay(script, frames, config, output, max_frames).await,
        Commands::Count {
            landmarks,
            handedness,
            json,
        } => cmd_count(landmarks, handedness.into(), json),
    }
}

// ── replay ────────────────────────────────────────────────────────────────────

async fn cmd_replay(
    script: PathBuf,
    frames: Option<PathBuf>,
    config: Option<PathBuf>,
    output: PathBuf,
    max_frames: Option<u64>,
) -> Result<()> {
    info!("Gesture capture replay");
    info!("  script : {}", script.display());
    info!("  output : {}", output.display());

    let config = resolve_config(config.as_deref())?;
    let steps = load_script(&script)?;

    let mut camera = match frames {
        Some(dir) => ReplayCamera::from_dir(&dir)
            .with_context(|| format!("failed to load frames from {}", dir.display()))?,
        None => ReplayCamera::blank(config.camera.width, config.camera.height),
    };
    if let Some(max) = max_frames {
        camera = camera.with_max_frames(max);
    }

    let pb = spinner("Loading hand detector…");
    let mut session = CaptureSession::new(camera, config);
    session
        .load_detector(&mut ScriptedBackend::new(steps))
        .await
        .context("hand detector failed to load")?;
    session.open().await.context("failed to open camera")?;

    let pb2 = pb.clone();
    session.set_event_sink(Box::new(move |event| match event {
        SessionEvent::FrameProcessed {
            fingers,
            step,
            progress,
        } => {
            pb2.set_message(format!(
                "Step {step} (Pose {step}) · fingers {} · hold {:>3.0}%",
                fingers.map_or_else(|| "-".to_string(), |f| f.to_string()),
                progress * 100.0
            ));
        }
        SessionEvent::StepAdvanced { to, .. } => {
            pb2.println(format!("✓ pose {} held", to - 1));
        }
        SessionEvent::SequenceComplete => pb2.println("✓ sequence complete"),
        SessionEvent::Countdown { remaining } => {
            pb2.set_message(format!("Capturing photo in {remaining}"));
        }
        SessionEvent::Captured { width, height } => {
            pb2.println(format!("✓ captured {width}×{height}"));
        }
        SessionEvent::CaptureFailed(msg) => {
            pb2.println(format!("✗ capture failed: {msg}"));
        }
    }));

    let submitted: Arc<Mutex<Option<CaptureArtifact>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&submitted);
    session.on_submit(Box::new(move |artifact| {
        if let Ok(mut slot) = slot.lock() {
            *slot = Some(artifact);
        }
    }));

    let handle = session.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    match session.run().await {
        SessionOutcome::Captured => {
            session.submit().context("failed to submit capture")?;
            let artifact = submitted
                .lock()
                .ok()
                .and_then(|mut slot| slot.take())
                .context("submit handler did not receive the capture")?;
            let path = artifact.save_to_dir(&output)?;
            pb.finish_with_message(format!("Saved {}", path.display()));
            Ok(())
        }
        SessionOutcome::Cancelled => {
            pb.abandon_with_message("Cancelled.");
            Ok(())
        }
        SessionOutcome::SourceEnded => {
            pb.abandon();
            bail!(
                "camera feed ended before a photo was captured (reached step {})",
                session.sequencer().current_step()
            )
        }
        outcome => {
            pb.abandon();
            bail!("capture session could not run: {outcome:?}")
        }
    }
}

// ── count ─────────────────────────────────────────────────────────────────────

fn cmd_count(landmarks: PathBuf, handedness: Handedness, json: bool) -> Result<()> {
    let raw = std::fs::read_to_string(&landmarks)
        .with_context(|| format!("failed to read {}", landmarks.display()))?;
    let set: LandmarkSet = serde_json::from_str(&raw)
        .with_context(|| format!("invalid landmark set in {}", landmarks.display()))?;

    let fingers = set.finger_count(handedness);
    if json {
        println!(
            "{}",
            serde_json::json!({ "fingers": fingers, "handedness": handedness.as_str() })
        );
    } else {
        println!("{fingers}");
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}
