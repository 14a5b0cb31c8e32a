//! Audio engine - orchestrates decks, mixer, reverb bus and samplers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, info};

use crate::buffer::AudioBuffer;
use crate::clock::AudioClock;
use crate::deck::{Deck, DeckId, DeckState, EqBand, DEFAULT_BPM};
use crate::gate::{GatePattern, GateRate};
use crate::mixer::Mixer;
use crate::reverb::{ReverbBus, DEFAULT_REVERB_SIZE, DEFAULT_REVERB_TIME};
use crate::rolls::{RollMode, RollPads};
use crate::sampler::{SamplerBank, SAMPLER_PADS};
use crate::sync::request_sync;

/// Default tape stop length in seconds
pub const DEFAULT_TAPE_STOP_SECS: f64 = 0.8;

/// Commands addressed to one deck
#[derive(Debug, Clone)]
pub enum DeckCommand {
    /// Using Arc to avoid copying sample data through channels
    Load {
        buffer: Arc<AudioBuffer>,
        name: Option<String>,
    },
    Play,
    Pause,
    Stop,
    TogglePlay,
    /// Spin down over the given seconds, or the configured default
    TapeStop(Option<f64>),
    Seek(f64),
    SetPitch(f32),
    SetBpm(f32),
    ToggleReverse,

    SetGain(f32),
    SetEq(EqBand, f32),
    SetFilter(f32),
    SetDistortion(f32),
    SetDelay { wet: f32, time: f32 },
    SetNoise(f32),
    SetFlange(f32),
    SetVolume(f32),
    SetPan(f32),

    StartScratch,
    ScratchMovement(f32),
    StopScratch,

    /// Loop N beats, 0 leaves the loop
    ToggleLoop(f32),
    RollPress { beats: f32, mode: RollMode },
    RollRelease(f32),
    TriggerHotCue(usize),
    ClearHotCue(usize),

    SetGatePattern(GatePattern),
    ToggleGateStep(usize),
    SetGateMix(f32),
    SetGateRate(GateRate),
}

/// Commands sent to the audio engine
#[derive(Debug, Clone)]
pub enum AudioCommand {
    Deck(DeckId, DeckCommand),
    /// Attach a deck's graph to the audio clock
    RegisterDeck(DeckId),
    /// Lock the given deck to the other one
    Sync(DeckId),

    // Mixer commands
    SetCrossfader(f32),
    MoveCrossfader(f32),
    SetChannelVolume(DeckId, f32),
    SetReverbSend(DeckId, f32),
    SetReverbTime(f32),
    SetReverbSize(f32),
    SetMasterVolume(f32),

    // Sampler commands
    LoadSample {
        deck: DeckId,
        pad: usize,
        buffer: Arc<AudioBuffer>,
        name: String,
    },
    TriggerSample {
        deck: DeckId,
        pad: usize,
    },

    // System
    Shutdown,
}

/// Mixer-wide state for rendering
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub deck_a: DeckState,
    pub deck_b: DeckState,
    pub crossfader: f32,
    pub channel_volume: [f32; 2],
    pub reverb_send: [f32; 2],
    pub reverb_time: f32,
    pub reverb_size: f32,
    pub master_volume: f32,
    pub sampler_pads: [[Option<String>; SAMPLER_PADS]; 2],
}

/// Events sent from the audio engine
#[derive(Debug, Clone)]
pub enum AudioEvent {
    /// Output device is running
    EngineReady { sample_rate: u32 },
    /// State update for rendering
    StateUpdate(Box<EngineSnapshot>),
    /// Track loaded successfully
    TrackLoaded { deck: DeckId, name: Option<String> },
    /// Error occurred
    Error(String),
}

/// Start-up defaults
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub default_bpm: f32,
    pub tape_stop_secs: f64,
    pub reverb_time: f32,
    pub reverb_size: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_bpm: DEFAULT_BPM,
            tape_stop_secs: DEFAULT_TAPE_STOP_SECS,
            reverb_time: DEFAULT_REVERB_TIME,
            reverb_size: DEFAULT_REVERB_SIZE,
        }
    }
}

/// Maximum buffer size for pre-allocated processing buffers
/// Sized for 2048 stereo samples (typical maximum)
const MAX_BUFFER_SIZE: usize = 4096;

/// Audio engine state (held behind a mutex shared by the audio and control threads)
pub struct EngineState {
    clock: Arc<AudioClock>,
    settings: EngineSettings,
    decks: [Deck; 2],
    rolls: [RollPads; 2],
    samplers: [SamplerBank; 2],
    pub mixer: Mixer,
    pub reverb: ReverbBus,
    // Pre-allocated processing buffers (avoids allocation in audio callback)
    buffer_a: Vec<f32>,
    buffer_b: Vec<f32>,
    send_buffer: Vec<f32>,
}

impl EngineState {
    pub fn new(clock: Arc<AudioClock>, settings: EngineSettings) -> Self {
        let sample_rate = clock.sample_rate() as f32;
        Self {
            decks: [
                Deck::new(DeckId::A, settings.default_bpm),
                Deck::new(DeckId::B, settings.default_bpm),
            ],
            rolls: [RollPads::new(), RollPads::new()],
            samplers: [SamplerBank::new(), SamplerBank::new()],
            mixer: Mixer::new(),
            reverb: ReverbBus::new(sample_rate, settings.reverb_time, settings.reverb_size),
            clock,
            settings,
            buffer_a: vec![0.0f32; MAX_BUFFER_SIZE],
            buffer_b: vec![0.0f32; MAX_BUFFER_SIZE],
            send_buffer: vec![0.0f32; MAX_BUFFER_SIZE],
        }
    }

    pub fn clock(&self) -> &Arc<AudioClock> {
        &self.clock
    }

    pub fn deck(&self, id: DeckId) -> &Deck {
        &self.decks[id.index()]
    }

    pub fn deck_mut(&mut self, id: DeckId) -> &mut Deck {
        &mut self.decks[id.index()]
    }

    pub fn register_deck(&mut self, id: DeckId) {
        let clock = Arc::clone(&self.clock);
        self.decks[id.index()].initialize(clock);
    }

    /// Process a command
    ///
    /// Returns an event worth publishing, if the command produced one.
    pub fn handle_command(&mut self, cmd: AudioCommand) -> Option<AudioEvent> {
        let now = self.clock.now();
        match cmd {
            AudioCommand::Deck(id, cmd) => return self.handle_deck_command(id, cmd),
            AudioCommand::RegisterDeck(id) => self.register_deck(id),
            AudioCommand::Sync(source) => self.sync(source),

            AudioCommand::SetCrossfader(pos) => self.mixer.set_crossfader(now, pos),
            AudioCommand::MoveCrossfader(delta) => self.mixer.move_crossfader(now, delta),
            AudioCommand::SetChannelVolume(id, vol) => self.mixer.set_channel_volume(now, id, vol),
            AudioCommand::SetReverbSend(id, level) => self.mixer.set_reverb_send(now, id, level),
            AudioCommand::SetReverbTime(time) => self.reverb.set_time(time),
            AudioCommand::SetReverbSize(size) => self.reverb.set_size(now, size),
            AudioCommand::SetMasterVolume(vol) => self.mixer.set_master_volume(now, vol),

            AudioCommand::LoadSample {
                deck,
                pad,
                buffer,
                name,
            } => self.samplers[deck.index()].load_pad(pad, buffer, &name),
            AudioCommand::TriggerSample { deck, pad } => {
                if !self.samplers[deck.index()].trigger(pad, now) {
                    debug!(deck = %deck.label(), pad, "Empty sample pad");
                }
            }

            AudioCommand::Shutdown => {
                for deck in self.decks.iter_mut() {
                    deck.tear_down();
                }
            }
        }
        None
    }

    fn handle_deck_command(&mut self, id: DeckId, cmd: DeckCommand) -> Option<AudioEvent> {
        let index = id.index();
        let deck = &mut self.decks[index];
        match cmd {
            DeckCommand::Load { buffer, name } => {
                deck.load_track(buffer, name.clone());
                return Some(AudioEvent::TrackLoaded { deck: id, name });
            }
            DeckCommand::Play => deck.play(),
            DeckCommand::Pause => deck.pause(),
            DeckCommand::Stop => deck.stop(),
            DeckCommand::TogglePlay => {
                if deck.playback().is_sounding() {
                    deck.pause();
                } else {
                    deck.play();
                }
            }
            DeckCommand::TapeStop(duration) => {
                deck.tape_stop(duration.unwrap_or(self.settings.tape_stop_secs))
            }
            DeckCommand::Seek(pos) => deck.seek(pos),
            DeckCommand::SetPitch(pitch) => deck.set_pitch(pitch),
            DeckCommand::SetBpm(bpm) => deck.set_bpm(bpm),
            DeckCommand::ToggleReverse => deck.toggle_reverse(),

            DeckCommand::SetGain(gain) => deck.set_gain(gain),
            DeckCommand::SetEq(band, db) => deck.set_eq(band, db),
            DeckCommand::SetFilter(value) => deck.set_filter(value),
            DeckCommand::SetDistortion(amount) => deck.set_distortion(amount),
            DeckCommand::SetDelay { wet, time } => deck.set_delay(wet, time),
            DeckCommand::SetNoise(value) => deck.set_noise(value),
            DeckCommand::SetFlange(value) => deck.set_flange(value),
            DeckCommand::SetVolume(value) => deck.set_volume(value),
            DeckCommand::SetPan(value) => deck.set_pan(value),

            DeckCommand::StartScratch => deck.start_scratch(),
            DeckCommand::ScratchMovement(velocity) => deck.scratch_movement(velocity),
            DeckCommand::StopScratch => deck.stop_scratch(),

            DeckCommand::ToggleLoop(beats) => deck.toggle_loop(beats),
            DeckCommand::RollPress { beats, mode } => {
                let beats = self.rolls[index].press(beats, mode, &deck.loop_state(), deck.bpm());
                deck.toggle_loop(beats);
            }
            DeckCommand::RollRelease(beats) => {
                if let Some(beats) = self.rolls[index].release(beats) {
                    deck.toggle_loop(beats);
                }
            }
            DeckCommand::TriggerHotCue(slot) => deck.trigger_hot_cue(slot),
            DeckCommand::ClearHotCue(slot) => deck.clear_hot_cue(slot),

            DeckCommand::SetGatePattern(pattern) => deck.set_gate_pattern(pattern),
            DeckCommand::ToggleGateStep(step) => deck.toggle_gate_step(step),
            DeckCommand::SetGateMix(mix) => deck.set_gate_mix(mix),
            DeckCommand::SetGateRate(rate) => deck.set_gate_rate(rate),
        }
        None
    }

    /// One-shot tempo and phase lock of `source` onto the other deck
    fn sync(&mut self, source: DeckId) {
        let [deck_a, deck_b] = &mut self.decks;
        let applied = match source {
            DeckId::A => request_sync(deck_a, &*deck_b),
            DeckId::B => request_sync(deck_b, &*deck_a),
        };
        match applied {
            Some(correction) => info!(
                deck = %source.label(),
                pitch = correction.pitch,
                nudge = correction.nudge,
                "Synced"
            ),
            None => debug!(deck = %source.label(), "Sync unavailable"),
        }
    }

    /// Lookahead tick for both gate schedulers
    pub fn run_schedulers(&mut self) {
        for deck in self.decks.iter_mut() {
            deck.run_gate_scheduler();
        }
    }

    /// Snapshot of everything the surface displays
    pub fn get_state(&mut self) -> AudioEvent {
        let [deck_a, deck_b] = &mut self.decks;
        AudioEvent::StateUpdate(Box::new(EngineSnapshot {
            deck_a: deck_a.state(),
            deck_b: deck_b.state(),
            crossfader: self.mixer.crossfader(),
            channel_volume: [
                self.mixer.channel_volume(DeckId::A),
                self.mixer.channel_volume(DeckId::B),
            ],
            reverb_send: [
                self.mixer.reverb_send(DeckId::A),
                self.mixer.reverb_send(DeckId::B),
            ],
            reverb_time: self.reverb.time(),
            reverb_size: self.reverb.size(),
            master_volume: self.mixer.master_volume(),
            sampler_pads: [self.samplers[0].pad_names(), self.samplers[1].pad_names()],
        }))
    }

    /// Render one output block, then advance the audio clock past it
    pub fn process(&mut self, output: &mut [f32]) {
        let len = output.len();

        // Ensure pre-allocated buffers are large enough
        // This should rarely happen after the first call
        if len > self.buffer_a.len() {
            self.buffer_a.resize(len, 0.0);
            self.buffer_b.resize(len, 0.0);
            self.send_buffer.resize(len, 0.0);
        }

        let ctx = self.clock.block();
        let buf_a = &mut self.buffer_a[..len];
        let buf_b = &mut self.buffer_b[..len];

        self.decks[0].process(buf_a, &ctx);
        self.samplers[0].render(buf_a, &ctx);
        self.decks[1].process(buf_b, &ctx);
        self.samplers[1].render(buf_b, &ctx);

        self.mixer.mix(
            buf_a,
            buf_b,
            &mut self.reverb,
            &mut self.send_buffer[..len],
            output,
            &ctx,
        );

        self.clock.advance((len / 2) as u64);
    }
}

/// Handle to communicate with the audio engine
pub struct AudioEngine {
    /// Send commands to the control thread
    pub command_tx: Sender<AudioCommand>,
    /// Receive events from the control thread
    pub event_rx: Receiver<AudioEvent>,
    /// Shutdown flag
    shutdown: Arc<AtomicBool>,
}

impl AudioEngine {
    /// Create channels for engine communication
    /// Buffer size of 1024 provides headroom for command bursts without saturation
    pub fn create_channels() -> (
        Sender<AudioCommand>,
        Receiver<AudioCommand>,
        Sender<AudioEvent>,
        Receiver<AudioEvent>,
    ) {
        let (cmd_tx, cmd_rx) = bounded(1024);
        let (evt_tx, evt_rx) = bounded(1024);
        (cmd_tx, cmd_rx, evt_tx, evt_rx)
    }

    /// Create a new engine handle
    pub fn new(command_tx: Sender<AudioCommand>, event_rx: Receiver<AudioEvent>) -> Self {
        Self {
            command_tx,
            event_rx,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Send a command to the audio engine
    pub fn send(&self, cmd: AudioCommand) {
        if self.command_tx.try_send(cmd).is_err() {
            debug!("Command queue full or closed, dropping command");
        }
    }

    /// Shorthand for a deck command
    pub fn send_deck(&self, deck: DeckId, cmd: DeckCommand) {
        self.send(AudioCommand::Deck(deck, cmd));
    }

    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.command_tx.try_send(AudioCommand::Shutdown);
    }
}
