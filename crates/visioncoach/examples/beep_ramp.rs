//! Plays the rep feedback through PipeWire: a handful of rising beeps, then
//! the finale.
//!
//! Run with: cargo run -p visioncoach --features pipewire --example beep_ramp

use std::time::Duration;

use visioncoach::audio::{
    default_backend, AudioEngine, CueBank, EngineConfig, FeedbackSequencer, RingEngine,
    SequencerConfig,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = EngineConfig {
        name: "visioncoach-beep-ramp".to_string(),
        ..Default::default()
    };
    println!(
        "Configured latency: {} frames ({:.1}ms)",
        config.latency_frames,
        config.latency_ms()
    );

    let cues = CueBank::synthesized(config.sample_rate);
    let mut engine = RingEngine::new(config, default_backend());
    engine.start()?;

    // Short ramp so every step is audible
    let finale_rep = 8;
    let mut sequencer = FeedbackSequencer::new(
        SequencerConfig {
            finale_rep,
            max_pitch_cents: 1200.0,
        },
        Box::new(engine),
        cues,
    );
    sequencer.reset_session();

    for rep in 1..=finale_rep {
        println!("rep {rep}");
        sequencer.handle_rep(rep);
        std::thread::sleep(Duration::from_millis(400));
    }

    std::thread::sleep(Duration::from_secs(2));
    sequencer.stop();
    println!("Done.");
    Ok(())
}
