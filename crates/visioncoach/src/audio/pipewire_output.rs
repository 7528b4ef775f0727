//! PipeWire output backend
//!
//! Runs the `VoiceRenderer` inside PipeWire's process callback. The PipeWire
//! main loop lives on its own thread; a 100ms timer watches the running flag
//! and quits the loop once `stop()` clears it.
//!
//! ```text
//! RingEngine (control side)          PipeWire (PW's RT thread)
//!        │                                    │
//!        ▼                                    ▼
//!   producer.push(cmd)               process callback
//!        │                                    │
//!        └──────────► rtrb ring ─────────────►│
//!                                             ▼
//!                                   renderer.render(out)
//!                                   f32 LE into PW buffer
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::engine::{EngineConfig, OutputBackend, VoiceRenderer};
use super::AudioError;

/// Largest callback we pre-allocate for, in frames
const MAX_CALLBACK_FRAMES: usize = 8192;

/// How long `start` waits for the stream to connect
const SETUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Runtime statistics from the PipeWire callback
#[derive(Debug, Default)]
pub struct StreamStats {
    pub callbacks: AtomicU64,
    pub samples_written: AtomicU64,
    /// Callbacks in which at least one cue was sounding
    pub active_callbacks: AtomicU64,
}

#[derive(Default)]
pub struct PipeWireBackend {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    stats: Arc<StreamStats>,
}

impl PipeWireBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputBackend for PipeWireBackend {
    fn start(&mut self, renderer: VoiceRenderer, config: &EngineConfig) -> Result<(), AudioError> {
        self.stop();

        pipewire::init();

        let running = Arc::new(AtomicBool::new(true));
        self.running = Arc::clone(&running);
        let stats = Arc::clone(&self.stats);
        let config = config.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        debug!(
            "creating output stream: {} @ {}Hz, {} channels",
            config.name, config.sample_rate, config.channels
        );

        let handle = thread::Builder::new()
            .name("visioncoach-audio".to_string())
            .spawn(move || {
                let result = run_pipewire_loop(&config, renderer, &running, stats, &ready_tx);
                running.store(false, Ordering::Release);
                if let Err(e) = result {
                    error!("PipeWire output thread failed: {}", e);
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| AudioError::ThreadSpawn(e.to_string()))?;
        self.thread_handle = Some(handle);

        match wait_for_setup(&ready_rx, SETUP_TIMEOUT) {
            Ok(()) => Ok(()),
            Err(SetupFailure::Timeout(e)) => {
                // The loop never ran, so its timer cannot quit it. Detach.
                self.running.store(false, Ordering::Release);
                if self.thread_handle.take().is_some() {
                    warn!("detaching PipeWire thread stuck in setup");
                }
                Err(e)
            }
            Err(SetupFailure::Failed(e)) => {
                self.stop();
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            debug!("waiting for PipeWire thread to stop");
            if handle.join().is_err() {
                warn!("PipeWire thread panicked");
            }
            info!(
                "PipeWire output stopped after {} callbacks",
                self.stats.callbacks.load(Ordering::Relaxed)
            );
        }
    }

    fn is_running(&self) -> bool {
        self.thread_handle.is_some() && self.running.load(Ordering::Acquire)
    }
}

impl Drop for PipeWireBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

enum SetupFailure {
    /// Setup thread still running
    Timeout(AudioError),
    /// Setup thread reported an error or exited
    Failed(AudioError),
}

fn wait_for_setup(
    ready: &mpsc::Receiver<Result<(), AudioError>>,
    timeout: Duration,
) -> Result<(), SetupFailure> {
    match ready.recv_timeout(timeout) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SetupFailure::Failed(e)),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(SetupFailure::Timeout(AudioError::Init(
            format!("PipeWire did not connect within {}ms", timeout.as_millis()),
        ))),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(SetupFailure::Failed(AudioError::Init(
            "audio thread exited during setup".to_string(),
        ))),
    }
}

fn run_pipewire_loop(
    config: &EngineConfig,
    renderer: VoiceRenderer,
    running: &Arc<AtomicBool>,
    stats: Arc<StreamStats>,
    ready: &mpsc::SyncSender<Result<(), AudioError>>,
) -> Result<(), AudioError> {
    use pipewire as pw;
    use pw::spa::pod::Pod;
    use pw::{properties::properties, spa};

    let init = |what: &str, e: &dyn std::fmt::Display| AudioError::Init(format!("{what}: {e}"));

    let mainloop =
        pw::main_loop::MainLoopRc::new(None).map_err(|e| init("failed to create main loop", &e))?;
    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| init("failed to create context", &e))?;
    let core = context
        .connect_rc(None)
        .map_err(|e| init("failed to connect to PipeWire", &e))?;

    let mut props = properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_ROLE => "Game",
        *pw::keys::MEDIA_CATEGORY => "Playback",
        *pw::keys::AUDIO_CHANNELS => config.channels.to_string(),
    };
    if config.latency_frames > 0 {
        let latency = format!("{}/{}", config.latency_frames, config.sample_rate);
        props.insert("node.latency", latency.as_str());
        debug!("requesting latency {} ({:.1}ms)", latency, config.latency_ms());
    }

    let stream = pw::stream::StreamBox::new(&core, &config.name, props)
        .map_err(|e| init("failed to create stream", &e))?;

    let channels = renderer.channels();
    let sample_size = std::mem::size_of::<f32>();
    let stride = sample_size * channels;
    let target_frames = config.latency_frames.max(1) as usize;
    let mix_buffer = vec![0.0f32; MAX_CALLBACK_FRAMES * channels];

    let _listener = stream
        .add_local_listener_with_user_data((stats, renderer, mix_buffer))
        .process(move |stream, (stats, renderer, mix_buffer)| {
            stats.callbacks.fetch_add(1, Ordering::Relaxed);

            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };

            let requested = buffer.requested() as usize;
            let datas = buffer.datas_mut();
            let Some(data) = datas.first_mut() else {
                return;
            };
            let Some(slice) = data.data() else {
                return;
            };

            let max_frames = (slice.len() / stride).min(MAX_CALLBACK_FRAMES);
            let n_frames = if requested > 0 {
                target_frames.min(requested).min(max_frames)
            } else {
                target_frames.min(max_frames)
            };
            let samples = n_frames * channels;

            let out = &mut mix_buffer[..samples];
            if renderer.render(out) {
                stats.active_callbacks.fetch_add(1, Ordering::Relaxed);
            }
            stats
                .samples_written
                .fetch_add(samples as u64, Ordering::Relaxed);

            for (i, sample) in out.iter().enumerate() {
                let start = i * sample_size;
                slice[start..start + sample_size].copy_from_slice(&sample.to_le_bytes());
            }

            let chunk = data.chunk_mut();
            *chunk.offset_mut() = 0;
            *chunk.stride_mut() = stride as i32;
            *chunk.size_mut() = (stride * n_frames) as u32;
        })
        .register()
        .map_err(|e| init("failed to register listener", &e))?;

    let mut audio_info = spa::param::audio::AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::F32LE);
    audio_info.set_rate(config.sample_rate);
    audio_info.set_channels(config.channels);

    let mut position = [0u32; spa::param::audio::MAX_CHANNELS];
    if config.channels >= 1 {
        position[0] = pw::spa::sys::SPA_AUDIO_CHANNEL_FL;
    }
    if config.channels >= 2 {
        position[1] = pw::spa::sys::SPA_AUDIO_CHANNEL_FR;
    }
    audio_info.set_position(position);

    let values: Vec<u8> = pw::spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &pw::spa::pod::Value::Object(pw::spa::pod::Object {
            type_: pw::spa::sys::SPA_TYPE_OBJECT_Format,
            id: pw::spa::sys::SPA_PARAM_EnumFormat,
            properties: audio_info.into(),
        }),
    )
    .map_err(|e| init("failed to serialize format", &e))?
    .0
    .into_inner();

    let mut params = [Pod::from_bytes(&values)
        .ok_or_else(|| AudioError::Init("failed to create Pod from bytes".to_string()))?];

    stream
        .connect(
            spa::utils::Direction::Output,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| init("failed to connect stream", &e))?;

    let mainloop_weak = mainloop.downgrade();
    let running_for_timer = Arc::clone(running);
    let timer = mainloop.loop_().add_timer(move |_| {
        if !running_for_timer.load(Ordering::Acquire) {
            if let Some(ml) = mainloop_weak.upgrade() {
                ml.quit();
            }
        }
    });
    timer
        .update_timer(
            Some(Duration::from_millis(100)),
            Some(Duration::from_millis(100)),
        )
        .into_result()
        .map_err(|e| init("failed to set timer", &e))?;

    info!("PipeWire stream connected, entering main loop");
    let _ = ready.send(Ok(()));

    mainloop.run();

    info!("PipeWire main loop exited");
    Ok(())
}
