//! NEXUS - dual-deck DJ console
//!
//! Headless mixer driven by typed commands on stdin. Optional arguments
//! are tracks to load onto deck A and deck B at start-up.

mod console;

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use console::{format_status, parse_line, ConsoleCommand, HELP};
use nexus_audio::{
    AudioClock, AudioCommand, AudioEngine, AudioEvent, DeckCommand, DeckId, EngineSettings,
    EngineSnapshot, EngineState, ReverbImpulse, LOOKAHEAD_INTERVAL,
};
use nexus_library::{Config, TrackLoader};

/// How often the control thread publishes a state snapshot
const STATE_UPDATE_INTERVAL: Duration = Duration::from_millis(33);

/// How long to wait for the output device before giving up
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_thread_names(true)
        .init();

    let mut config = Config::load();
    let settings = config.engine_settings();

    // Create audio channels
    let (cmd_tx, cmd_rx, evt_tx, evt_rx) = AudioEngine::create_channels();

    // Shutdown flag
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_audio = shutdown.clone();

    let audio_handle = thread::Builder::new()
        .name("audio".into())
        .spawn(move || run_audio_thread(cmd_rx, evt_tx, shutdown_audio, settings))
        .context("Failed to spawn audio thread")?;

    let engine = AudioEngine::new(cmd_tx, evt_rx);

    let result = run_console(&engine, &mut config);

    // Cleanup
    shutdown.store(true, Ordering::Relaxed);
    engine.shutdown();
    let _ = audio_handle.join();

    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    result
}

/// Wait for the output device, then run the stdin command loop
fn run_console(engine: &AudioEngine, config: &mut Config) -> anyhow::Result<()> {
    let sample_rate = wait_for_engine(engine)?;
    let loader = TrackLoader::with_sample_rate(sample_rate);

    for (deck, path) in [DeckId::A, DeckId::B]
        .into_iter()
        .zip(std::env::args_os().skip(1).map(PathBuf::from))
    {
        load_track(engine, &loader, config, deck, &path);
    }

    let lines = spawn_stdin_reader();
    let mut last_snapshot: Option<Box<EngineSnapshot>> = None;
    println!("NEXUS ready at {sample_rate} Hz. Type 'help' for commands.");

    loop {
        select! {
            recv(lines) -> line => {
                // Stdin closed
                let Ok(line) = line else { break };
                let cmd = match parse_line(&line) {
                    Ok(cmd) => cmd,
                    Err(console::ParseError::Empty) => continue,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                };
                match cmd {
                    ConsoleCommand::Quit => break,
                    ConsoleCommand::Help => println!("{HELP}"),
                    ConsoleCommand::Status => match last_snapshot {
                        Some(ref snapshot) => println!("{}", format_status(snapshot)),
                        None => println!("No state yet"),
                    },
                    ConsoleCommand::Engine(cmd) => engine.send(cmd),
                    ConsoleCommand::Load { deck, path } => {
                        load_track(engine, &loader, config, deck, &path)
                    }
                    ConsoleCommand::LoadSample { deck, pad, path } => {
                        load_sample(engine, &loader, config, deck, pad, &path)
                    }
                }
            }
            recv(engine.event_rx) -> event => {
                let Ok(event) = event else { break };
                match event {
                    AudioEvent::StateUpdate(snapshot) => last_snapshot = Some(snapshot),
                    AudioEvent::TrackLoaded { deck, name } => {
                        println!("Deck {}: {}", deck.label(), name.as_deref().unwrap_or("untitled"));
                    }
                    AudioEvent::Error(message) => error!(%message, "Audio engine error"),
                    AudioEvent::EngineReady { .. } => {}
                }
            }
        }
    }

    Ok(())
}

/// Block until the audio thread reports its sample rate
fn wait_for_engine(engine: &AudioEngine) -> anyhow::Result<u32> {
    let deadline = Instant::now() + STARTUP_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match engine.event_rx.recv_timeout(remaining) {
            Ok(AudioEvent::EngineReady { sample_rate }) => return Ok(sample_rate),
            Ok(AudioEvent::Error(message)) => anyhow::bail!(message),
            Ok(_) => {}
            Err(_) => anyhow::bail!("Audio engine did not start"),
        }
    }
}

fn load_track(
    engine: &AudioEngine,
    loader: &TrackLoader,
    config: &mut Config,
    deck: DeckId,
    path: &Path,
) {
    let path = config.resolve_track_path(path);
    match loader.load(&path) {
        Ok(track) => {
            engine.send_deck(
                deck,
                DeckCommand::Load {
                    buffer: track.buffer,
                    name: Some(track.metadata.title),
                },
            );
            config.remember_track(&path);
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to load track");
            println!("Could not load {}: {e}", path.display());
        }
    }
}

fn load_sample(
    engine: &AudioEngine,
    loader: &TrackLoader,
    config: &Config,
    deck: DeckId,
    pad: usize,
    path: &Path,
) {
    let path = config.resolve_track_path(path);
    match loader.load(&path) {
        Ok(sample) => engine.send(AudioCommand::LoadSample {
            deck,
            pad,
            buffer: sample.buffer,
            name: sample.metadata.title,
        }),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to load sample");
            println!("Could not load {}: {e}", path.display());
        }
    }
}

/// Forward stdin lines over a channel so the console can also watch engine events
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let spawned = thread::Builder::new().name("stdin".into()).spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    if let Err(e) = spawned {
        error!(error = %e, "Failed to spawn stdin reader");
    }
    rx
}

fn run_audio_thread(
    cmd_rx: Receiver<AudioCommand>,
    evt_tx: Sender<AudioEvent>,
    shutdown: Arc<AtomicBool>,
    settings: EngineSettings,
) {
    // Get audio host and device
    let host = cpal::default_host();
    let device = match host.default_output_device() {
        Some(d) => d,
        None => {
            let _ = evt_tx.send(AudioEvent::Error("No audio output device found".into()));
            return;
        }
    };

    let config = match device.default_output_config() {
        Ok(c) => c,
        Err(e) => {
            let _ = evt_tx.send(AudioEvent::Error(format!(
                "Failed to get audio config: {}",
                e
            )));
            return;
        }
    };

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    info!(
        device = %device.name().unwrap_or_default(),
        sample_rate,
        channels,
        "Opening output device"
    );

    // Create engine state
    let clock = AudioClock::new(sample_rate);
    let engine_state = Arc::new(Mutex::new(EngineState::new(clock, settings)));
    let engine_for_callback = engine_state.clone();

    // Pre-allocate stereo render buffer (avoid allocation in audio callback)
    // Max buffer size for typical audio: 8192 frames stereo = 16384 floats
    let mut render_buffer = vec![0.0f32; 16384];

    // Build audio stream
    let stream = device.build_output_stream(
        &config.into(),
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            // Use try_lock to avoid blocking the real-time audio thread
            // On contention (rare), output silence rather than blocking
            let Some(mut state) = engine_for_callback.try_lock() else {
                data.fill(0.0);
                return;
            };
            if channels == 2 {
                state.process(data);
                return;
            }

            let frames = data.len() / channels.max(1);
            if render_buffer.len() < frames * 2 {
                render_buffer.resize(frames * 2, 0.0);
            }
            let stereo = &mut render_buffer[..frames * 2];
            state.process(stereo);
            for (frame, out) in data.chunks_mut(channels.max(1)).enumerate() {
                let (l, r) = (stereo[frame * 2], stereo[frame * 2 + 1]);
                match out {
                    [mono] => *mono = (l + r) * 0.5,
                    [left, right, rest @ ..] => {
                        *left = l;
                        *right = r;
                        rest.fill(0.0);
                    }
                    [] => {}
                }
            }
        },
        |err| {
            error!(error = %err, "Audio stream error");
        },
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = evt_tx.send(AudioEvent::Error(format!(
                "Failed to create audio stream: {}",
                e
            )));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = evt_tx.send(AudioEvent::Error(format!("Failed to start audio: {}", e)));
        return;
    }

    {
        let mut state = engine_state.lock();
        state.register_deck(DeckId::A);
        state.register_deck(DeckId::B);
    }
    let _ = evt_tx.send(AudioEvent::EngineReady { sample_rate });

    let mut last_state_update = Instant::now();
    let mut last_schedule = Instant::now();

    // Command processing loop
    while !shutdown.load(Ordering::Relaxed) {
        match cmd_rx.recv_timeout(Duration::from_millis(5)) {
            Ok(AudioCommand::Shutdown) => {
                engine_state.lock().handle_command(AudioCommand::Shutdown);
                break;
            }
            Ok(AudioCommand::SetReverbTime(time)) => {
                // Convolver set-up is slow; keep it off the render lock
                let impulse = ReverbImpulse::build(time, sample_rate as f32);
                engine_state.lock().reverb.install_impulse(impulse);
            }
            Ok(cmd) => {
                if let Some(event) = engine_state.lock().handle_command(cmd) {
                    let _ = evt_tx.try_send(event);
                }
            }
            Err(_) => {}
        }

        // Gate lookahead tick
        if last_schedule.elapsed() >= LOOKAHEAD_INTERVAL {
            engine_state.lock().run_schedulers();
            last_schedule = Instant::now();
        }

        // Send state updates periodically
        if last_state_update.elapsed() >= STATE_UPDATE_INTERVAL {
            let event = engine_state.lock().get_state();
            let _ = evt_tx.try_send(event);
            last_state_update = Instant::now();
        }
    }

    info!("Audio thread stopped");
}
