//! Vision Coach host binary
//!
//! Replays a recorded pose trace through the full coaching session: rep
//! counting, quest progress and audio feedback. Snapshots are logged as they
//! change; the final one is printed as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use coachconf::CoachConfig;
use futures::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use visioncoach::audio::default_backend;
use visioncoach::{
    CameraState, ChallengeId, CueBank, EngineConfig, FeedbackSequencer, MemoryQuestTracker,
    Pacing, ReplayCamera, ReplayEstimator, RingEngine, SequencerConfig, SessionController,
    SessionSettings, Trace,
};

/// Count push-ups from a recorded pose trace
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON-lines pose trace to replay
    #[arg(short, long)]
    trace: PathBuf,

    /// Config file (takes precedence over ./visioncoach.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pace frames by their timestamps instead of as fast as they are processed
    #[arg(long)]
    realtime: bool,

    /// Challenge to credit reps to
    #[arg(long)]
    challenge: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

/// CLI flags win over every config layer, and are held to the same checks
fn apply_overrides(config: &mut CoachConfig, cli: &Cli) -> Result<()> {
    if let Some(challenge) = &cli.challenge {
        config.coaching.challenge_id = challenge.clone();
    }
    config.validate().context("invalid command-line override")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        CoachConfig::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    apply_overrides(&mut config, &cli)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.infra.telemetry.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if cli.print_config {
        print!("{}", config.to_toml());
        return Ok(());
    }

    info!("visioncoach {} starting", env!("CARGO_PKG_VERSION"));

    let trace = Trace::load(&cli.trace)
        .with_context(|| format!("failed to load trace {}", cli.trace.display()))?;
    let pacing = if cli.realtime {
        Pacing::RealTime
    } else {
        Pacing::Lockstep
    };

    let engine_config = EngineConfig::from(&config.infra.audio);
    let cues = CueBank::load(&config.infra.media, engine_config.sample_rate);
    let engine = RingEngine::new(engine_config, default_backend());
    let sequencer = FeedbackSequencer::new(
        SequencerConfig::from(&config.coaching),
        Box::new(engine),
        cues,
    );

    let quest = Arc::new(MemoryQuestTracker::new());
    let estimator = Arc::new(ReplayEstimator::new(&trace));
    let camera = Arc::new(ReplayCamera::new(trace, pacing));

    let mut controller = SessionController::new(
        camera,
        estimator,
        quest.clone(),
        sequencer,
        SessionSettings::from(&config),
    );

    let mut snapshots = controller.snapshots();
    let logger = tokio::spawn(async move {
        while let Some(snapshot) = snapshots.next().await {
            info!(
                "{:?} reps={} hint={}",
                snapshot.camera_state, snapshot.rep_count, snapshot.hint
            );
        }
    });

    let teardown = controller.teardown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, stopping session");
            teardown.cancel();
        }
    });

    let state = controller.start().await?;
    if state != CameraState::Ready {
        bail!("camera not ready: {:?}", state);
    }

    let reps = controller.join().await?;
    let challenge = ChallengeId::new(config.coaching.challenge_id.clone());
    let progress = quest.progress(&challenge);
    if progress != reps {
        warn!("quest progress {} differs from rep count {}", progress, reps);
    }

    let snapshot = controller.snapshot();
    drop(controller);
    logger.abort();

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    info!("{} reps credited to {}", reps, challenge);
    Ok(())
}
