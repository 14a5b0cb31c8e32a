//! Deck implementation - transport, signal chain and beat gate for one side
//!
//! A deck owns its processing graph behind an explicit lifecycle:
//! `Uninitialized -> Ready -> TornDown`. Operations that need the graph or the
//! audio clock are silent no-ops outside `Ready`; plain settings (BPM, gate
//! pattern, cues) are recorded regardless.

mod chain;
mod transport;

pub use chain::{
    echo_dry_for_wet, filter_cutoffs, ChainSettings, EqBand, SignalChain, FILTER_OPEN_HZ,
    GAIN_TIME_CONSTANT, MAX_EQ_DB, MAX_TRIM, MAX_VOLUME, MIN_EQ_DB, TONE_TIME_CONSTANT,
};
pub use transport::{
    LoopRegion, LoopState, PlaybackState, Transport, TransportClock, MIN_LOOP_SECS,
    RATE_TIME_CONSTANT, TAPE_STOP_FLOOR,
};

use std::sync::Arc;

use nexus_analysis::SpectrumData;
use tracing::{debug, info, warn};

use crate::buffer::AudioBuffer;
use crate::clock::{AudioClock, RenderContext};
use crate::gate::{GatePattern, GateRate, GateScheduler, GATE_STEPS};
use crate::param::sanitize;
use crate::sync::{DeckControls, SyncSnapshot, NUDGE_THRESHOLD};

pub const DEFAULT_BPM: f32 = 174.0;
pub const MIN_BPM: f32 = 1.0;
pub const MAX_BPM: f32 = 999.0;
pub const MIN_PITCH: f32 = 0.05;
pub const MAX_PITCH: f32 = 4.0;
pub const HOT_CUE_SLOTS: usize = 4;

/// Which side of the mixer a deck sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeckId {
    A,
    B,
}

impl DeckId {
    pub fn other(self) -> Self {
        match self {
            DeckId::A => DeckId::B,
            DeckId::B => DeckId::A,
        }
    }

    pub fn index(self) -> usize {
        match self {
            DeckId::A => 0,
            DeckId::B => 1,
        }
    }

    pub fn label(self) -> char {
        match self {
            DeckId::A => 'A',
            DeckId::B => 'B',
        }
    }
}

/// Where a deck is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Ready,
    TornDown,
}

/// Everything that only exists once the deck is attached to a clock
struct DeckGraph {
    clock: Arc<AudioClock>,
    chain: SignalChain,
    gate: GateScheduler,
}

enum Graph {
    Uninitialized,
    Ready(Box<DeckGraph>),
    TornDown,
}

/// Complete deck state for rendering
#[derive(Debug, Clone)]
pub struct DeckState {
    pub id: DeckId,
    pub lifecycle: Lifecycle,
    pub playback: PlaybackState,
    pub is_playing: bool,
    /// Seconds, loop-wrapped when looping
    pub current_time: f64,
    pub duration: f64,
    pub file_loaded: bool,
    pub track_name: Option<String>,
    pub bpm: f32,
    pub pitch: f32,
    pub reversed: bool,
    pub loop_state: LoopState,
    pub hot_cues: [Option<f64>; HOT_CUE_SLOTS],
    pub gate_pattern: GatePattern,
    pub gate_mix: f32,
    pub gate_rate: GateRate,
    pub gate_step: Option<usize>,
    pub settings: ChainSettings,
    pub spectrum: SpectrumData,
}

/// A single DJ deck
pub struct Deck {
    id: DeckId,
    graph: Graph,
    transport: Transport,
    track_name: Option<String>,
    /// Nominal tempo of the loaded track
    bpm: f32,
    /// Playback-rate multiplier
    pitch: f32,
    reversed: bool,
    hot_cues: [Option<f64>; HOT_CUE_SLOTS],
    gate_pattern: GatePattern,
    gate_mix: f32,
    gate_rate: GateRate,
}

impl Deck {
    pub fn new(id: DeckId, bpm: f32) -> Self {
        Self {
            id,
            graph: Graph::Uninitialized,
            transport: Transport::new(),
            track_name: None,
            bpm: sanitize(bpm, DEFAULT_BPM, MIN_BPM, MAX_BPM),
            pitch: 1.0,
            reversed: false,
            hot_cues: [None; HOT_CUE_SLOTS],
            gate_pattern: GatePattern::default(),
            gate_mix: 0.0,
            gate_rate: GateRate::default(),
        }
    }

    pub fn id(&self) -> DeckId {
        self.id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match self.graph {
            Graph::Uninitialized => Lifecycle::Uninitialized,
            Graph::Ready(_) => Lifecycle::Ready,
            Graph::TornDown => Lifecycle::TornDown,
        }
    }

    /// Build the processing graph against the shared audio clock
    pub fn initialize(&mut self, clock: Arc<AudioClock>) {
        if !matches!(self.graph, Graph::Uninitialized) {
            debug!(deck = %self.id.label(), "Deck already initialized");
            return;
        }
        let chain = SignalChain::new(clock.sample_rate() as f32);
        self.graph = Graph::Ready(Box::new(DeckGraph {
            clock,
            chain,
            gate: GateScheduler::new(),
        }));
        debug!(deck = %self.id.label(), "Deck graph ready");
    }

    /// Drop the processing graph; the deck stays silent from here on
    pub fn tear_down(&mut self) {
        if let Some(now) = self.now() {
            self.transport.stop(now);
        }
        self.graph = Graph::TornDown;
        debug!(deck = %self.id.label(), "Deck torn down");
    }

    fn now(&self) -> Option<f64> {
        match &self.graph {
            Graph::Ready(graph) => Some(graph.clock.now()),
            _ => None,
        }
    }

    /// Audio time, or `None` (with a debug line) when the graph is missing
    fn ready_now(&self, operation: &str) -> Option<f64> {
        let now = self.now();
        if now.is_none() {
            debug!(deck = %self.id.label(), operation, "Deck not ready, ignoring");
        }
        now
    }

    fn graph_mut(&mut self) -> Option<&mut DeckGraph> {
        match &mut self.graph {
            Graph::Ready(graph) => Some(graph.as_mut()),
            _ => None,
        }
    }

    /// Signed generator rate for the current pitch and direction
    fn rate(&self) -> f64 {
        let rate = self.pitch as f64;
        if self.reversed {
            -rate
        } else {
            rate
        }
    }

    /// Start or stop the gate scheduler to follow the transport
    fn follow_transport(&mut self, now: f64) {
        let sounding = self.transport.state().is_sounding();
        if let Graph::Ready(graph) = &mut self.graph {
            if sounding && !graph.gate.is_running() {
                graph.gate.start(now);
            } else if !sounding && graph.gate.is_running() {
                graph.gate.stop(now, graph.chain.gate_mut());
            }
        }
    }

    /// Swap in a new track; playback state, loop and cues are dropped
    pub fn load_track(&mut self, buffer: Arc<AudioBuffer>, name: Option<String>) {
        let now = self.now().unwrap_or(0.0);
        info!(
            deck = %self.id.label(),
            name = name.as_deref().unwrap_or("<untitled>"),
            duration = buffer.duration(),
            "Track loaded"
        );
        self.transport.load(now, buffer);
        // Tails of the previous track must not bleed into the new one
        if let Some(graph) = self.graph_mut() {
            graph.chain.reset();
        }
        self.track_name = name;
        self.hot_cues = [None; HOT_CUE_SLOTS];
        self.follow_transport(now);
    }

    pub fn play(&mut self) {
        let Some(now) = self.ready_now("play") else {
            return;
        };
        if !self.transport.play(now, self.rate()) {
            debug!(deck = %self.id.label(), "No track loaded");
        }
        self.follow_transport(now);
    }

    pub fn pause(&mut self) {
        let Some(now) = self.ready_now("pause") else {
            return;
        };
        self.transport.pause(now);
        self.follow_transport(now);
    }

    /// Back to the top: clears the loop and the reverse flag
    pub fn stop(&mut self) {
        let Some(now) = self.ready_now("stop") else {
            return;
        };
        self.transport.stop(now);
        self.reversed = false;
        self.follow_transport(now);
    }

    /// Spin down over `duration` seconds, then pause
    pub fn tape_stop(&mut self, duration: f64) {
        let Some(now) = self.ready_now("tape_stop") else {
            return;
        };
        if !duration.is_finite() || duration <= 0.0 {
            self.transport.pause(now);
        } else {
            self.transport.tape_stop(now, duration);
        }
        self.follow_transport(now);
    }

    pub fn seek(&mut self, seconds: f64) {
        let Some(now) = self.ready_now("seek") else {
            return;
        };
        self.transport.seek(now, seconds, self.rate());
        self.follow_transport(now);
    }

    /// Playback-rate multiplier; NaN keeps the current pitch
    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = sanitize(pitch, self.pitch, MIN_PITCH, MAX_PITCH);
        if let Some(now) = self.now() {
            self.transport.set_rate(now, self.rate());
        }
    }

    /// Nominal tempo; only future gate steps and loops pick it up
    pub fn set_bpm(&mut self, bpm: f32) {
        self.bpm = sanitize(bpm, self.bpm, MIN_BPM, MAX_BPM);
    }

    pub fn toggle_reverse(&mut self) {
        self.reversed = !self.reversed;
        if let Some(now) = self.now() {
            self.transport.redirect(now, self.rate());
        }
        debug!(deck = %self.id.label(), reversed = self.reversed, "Direction");
    }

    /// Loop `beats` beats from the current position; 0 leaves the loop
    pub fn toggle_loop(&mut self, beats: f32) {
        let Some(now) = self.ready_now("toggle_loop") else {
            return;
        };
        if beats == 0.0 {
            self.transport.disable_loop(now);
        } else if beats.is_finite() && beats > 0.0 {
            let seconds = beats as f64 * 60.0 / self.bpm as f64;
            self.transport.enable_loop(now, seconds, self.rate());
        } else {
            debug!(deck = %self.id.label(), beats, "Rejected loop length");
        }
        self.follow_transport(now);
    }

    /// Jump to a stored cue, or store the current position in an empty slot
    pub fn trigger_hot_cue(&mut self, index: usize) {
        if index >= HOT_CUE_SLOTS || !self.transport.has_track() {
            return;
        }
        let Some(now) = self.ready_now("trigger_hot_cue") else {
            return;
        };
        match self.hot_cues[index] {
            Some(position) => {
                self.transport.seek(now, position, self.rate());
                self.follow_transport(now);
            }
            None => {
                let position = self.transport.position(now);
                self.hot_cues[index] = Some(position);
                debug!(deck = %self.id.label(), index, position, "Hot cue set");
            }
        }
    }

    pub fn clear_hot_cue(&mut self, index: usize) {
        if let Some(slot) = self.hot_cues.get_mut(index) {
            *slot = None;
        }
    }

    pub fn start_scratch(&mut self) {
        let Some(now) = self.ready_now("start_scratch") else {
            return;
        };
        self.transport.start_scratch(now);
        self.follow_transport(now);
    }

    /// Drive the playhead at a signed velocity (1.0 = normal speed)
    pub fn scratch_movement(&mut self, velocity: f32) {
        let Some(now) = self.now() else {
            return;
        };
        self.transport.scratch_movement(now, velocity as f64);
    }

    pub fn stop_scratch(&mut self) {
        let Some(now) = self.ready_now("stop_scratch") else {
            return;
        };
        self.transport.stop_scratch(now, self.rate());
        self.follow_transport(now);
    }

    pub fn set_gate_pattern(&mut self, pattern: GatePattern) {
        self.gate_pattern = pattern;
    }

    pub fn toggle_gate_step(&mut self, step: usize) {
        self.gate_pattern.toggle(step % GATE_STEPS);
    }

    /// Gate depth: how far closed steps dip (0..1)
    pub fn set_gate_mix(&mut self, mix: f32) {
        self.gate_mix = sanitize(mix, self.gate_mix, 0.0, 1.0);
    }

    pub fn set_gate_rate(&mut self, rate: GateRate) {
        self.gate_rate = rate;
    }

    /// One lookahead tick; call every `LOOKAHEAD_INTERVAL`
    pub fn run_gate_scheduler(&mut self) -> usize {
        let (bpm, rate, pattern, mix) = (self.bpm, self.gate_rate, self.gate_pattern, self.gate_mix);
        let Some(graph) = self.graph_mut() else {
            return 0;
        };
        let now = graph.clock.now();
        graph
            .gate
            .schedule(now, graph.chain.gate_mut(), bpm, rate, &pattern, mix)
    }

    pub fn set_gain(&mut self, value: f32) {
        self.with_chain(|chain, now| chain.set_gain(now, value));
    }

    pub fn set_eq(&mut self, band: EqBand, db: f32) {
        self.with_chain(|chain, now| chain.set_eq(now, band, db));
    }

    pub fn set_filter(&mut self, value: f32) {
        self.with_chain(|chain, now| chain.set_filter(now, value));
    }

    pub fn set_distortion(&mut self, amount: f32) {
        self.with_chain(|chain, _| chain.set_distortion(amount));
    }

    pub fn set_delay(&mut self, wet: f32, time: f32) {
        self.with_chain(|chain, now| chain.set_delay(now, wet, time));
    }

    pub fn set_noise(&mut self, value: f32) {
        self.with_chain(|chain, now| chain.set_noise(now, value));
    }

    pub fn set_flange(&mut self, value: f32) {
        self.with_chain(|chain, now| chain.set_flange(now, value));
    }

    pub fn set_volume(&mut self, value: f32) {
        self.with_chain(|chain, now| chain.set_volume(now, value));
    }

    pub fn set_pan(&mut self, value: f32) {
        self.with_chain(|chain, now| chain.set_pan(now, value));
    }

    fn with_chain(&mut self, f: impl FnOnce(&mut SignalChain, f64)) {
        match self.graph_mut() {
            Some(graph) => {
                let now = graph.clock.now();
                f(&mut graph.chain, now);
            }
            None => debug!(deck = %self.id.label(), "Chain not built, ignoring"),
        }
    }

    /// Render one block of deck output into `out` (interleaved stereo)
    pub fn process(&mut self, out: &mut [f32], ctx: &RenderContext) {
        let Graph::Ready(graph) = &mut self.graph else {
            out.fill(0.0);
            return;
        };
        self.transport.render(out, ctx);
        graph.chain.process(out, ctx);
        // The transport may have settled (run out, tape stop done) this block
        self.follow_transport(ctx.end_time(out.len() / 2));
    }

    pub fn has_track(&self) -> bool {
        self.transport.has_track()
    }

    pub fn playback(&self) -> PlaybackState {
        self.transport.state()
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    pub fn hot_cues(&self) -> &[Option<f64>; HOT_CUE_SLOTS] {
        &self.hot_cues
    }

    pub fn loop_state(&self) -> LoopState {
        self.transport.loop_state()
    }

    /// Resolved position at the current audio time
    pub fn current_time(&self) -> f64 {
        let now = self.now().unwrap_or(self.transport.clock().reference_time);
        self.transport.position(now)
    }

    /// Snapshot for rendering; also pulls the analyser's latest frame
    pub fn state(&mut self) -> DeckState {
        let current_time = self.current_time();
        let lifecycle = self.lifecycle();
        let (settings, spectrum, gate_step) = match &mut self.graph {
            Graph::Ready(graph) => (
                *graph.chain.settings(),
                graph.chain.frequency_data(),
                graph.gate.is_running().then(|| graph.gate.current_step()),
            ),
            _ => (ChainSettings::default(), SpectrumData::default(), None),
        };
        let playback = self.transport.state();
        DeckState {
            id: self.id,
            lifecycle,
            playback,
            is_playing: playback.is_sounding(),
            current_time,
            duration: self.transport.duration(),
            file_loaded: self.transport.has_track(),
            track_name: self.track_name.clone(),
            bpm: self.bpm,
            pitch: self.pitch,
            reversed: self.reversed,
            loop_state: self.transport.loop_state(),
            hot_cues: self.hot_cues,
            gate_pattern: self.gate_pattern,
            gate_mix: self.gate_mix,
            gate_rate: self.gate_rate,
            gate_step,
            settings,
            spectrum,
        }
    }
}

impl DeckControls for Deck {
    fn sync_snapshot(&self) -> Option<SyncSnapshot> {
        self.now()?;
        if !self.transport.has_track() {
            return None;
        }
        Some(SyncSnapshot {
            bpm: self.bpm,
            pitch: self.pitch,
            current_time: self.current_time(),
            is_playing: self.transport.state().is_sounding(),
            duration: self.transport.duration(),
        })
    }

    fn apply_sync(&mut self, pitch: f32, nudge: f64) {
        if !(MIN_PITCH..=MAX_PITCH).contains(&pitch) {
            warn!(
                deck = %self.id.label(),
                pitch,
                min = MIN_PITCH,
                max = MAX_PITCH,
                "Sync pitch out of range, tempo match is approximate"
            );
        }
        self.set_pitch(pitch);
        if nudge.abs() > NUDGE_THRESHOLD {
            let target = self.current_time() + nudge;
            self.seek(target);
        }
    }

    fn load_track(&mut self, buffer: Arc<AudioBuffer>, name: Option<String>) {
        Deck::load_track(self, buffer, name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::request_sync;

    const SR: u32 = 1000;
    /// 10 ms blocks
    const BLOCK_FRAMES: usize = 10;

    fn ready_deck(id: DeckId, clock: &Arc<AudioClock>, seconds: usize) -> Deck {
        let mut deck = Deck::new(id, 120.0);
        deck.initialize(Arc::clone(clock));
        deck.load_track(
            Arc::new(AudioBuffer::from_fn(seconds * SR as usize, SR, |_| (0.5, 0.5))),
            Some("test".to_string()),
        );
        deck
    }

    /// Render `seconds` of audio, advancing the clock
    fn run(decks: &mut [&mut Deck], clock: &AudioClock, seconds: f64) {
        let blocks = (seconds * SR as f64 / BLOCK_FRAMES as f64).round() as usize;
        let mut out = vec![0.0; BLOCK_FRAMES * 2];
        for _ in 0..blocks {
            let ctx = clock.block();
            for deck in decks.iter_mut() {
                deck.process(&mut out, &ctx);
            }
            clock.advance(BLOCK_FRAMES as u64);
        }
    }

    #[test]
    fn test_uninitialized_deck_ignores_transport() {
        let mut deck = Deck::new(DeckId::A, 120.0);
        deck.load_track(Arc::new(AudioBuffer::silence(1000, SR)), None);
        deck.play();
        assert_eq!(deck.playback(), PlaybackState::Stopped);
        assert_eq!(deck.lifecycle(), Lifecycle::Uninitialized);
        // Plain settings still stick
        deck.set_bpm(128.0);
        assert_eq!(deck.bpm(), 128.0);
        let mut out = vec![1.0; 8];
        deck.process(&mut out, &RenderContext::new(0.0, SR as f32));
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_position_continuity() {
        let clock = AudioClock::new(SR);
        let mut deck = ready_deck(DeckId::A, &clock, 60);
        deck.play();
        run(&mut [&mut deck], &clock, 1.0);
        assert!((deck.current_time() - 1.0).abs() < 1e-9);

        deck.set_pitch(1.5);
        run(&mut [&mut deck], &clock, 1.0);
        assert!((deck.current_time() - 2.5).abs() < 1e-9);

        deck.pause();
        deck.pause();
        run(&mut [&mut deck], &clock, 1.0);
        assert!((deck.current_time() - 2.5).abs() < 1e-9);
        assert!(!deck.state().is_playing);
    }

    #[test]
    fn test_reverse_runs_backwards() {
        let clock = AudioClock::new(SR);
        let mut deck = ready_deck(DeckId::A, &clock, 60);
        deck.seek(10.0);
        deck.play();
        deck.toggle_reverse();
        run(&mut [&mut deck], &clock, 2.0);
        assert!((deck.current_time() - 8.0).abs() < 1e-9);

        deck.stop();
        assert!(!deck.is_reversed());
        assert_eq!(deck.current_time(), 0.0);
    }

    #[test]
    fn test_toggle_loop_in_beats() {
        let clock = AudioClock::new(SR);
        let mut deck = ready_deck(DeckId::A, &clock, 60);
        deck.seek(4.0);
        deck.play();
        // 1 beat at 120 BPM
        deck.toggle_loop(1.0);
        let loop_state = deck.loop_state();
        assert!(loop_state.active);
        assert!((loop_state.length() - 0.5).abs() < 1e-9);

        run(&mut [&mut deck], &clock, 1.2);
        assert!((deck.current_time() - 4.2).abs() < 1e-9);

        deck.toggle_loop(0.0);
        assert!(!deck.loop_state().active);
        run(&mut [&mut deck], &clock, 0.5);
        assert!((deck.current_time() - 4.7).abs() < 1e-9);
    }

    #[test]
    fn test_negative_loop_is_ignored() {
        let clock = AudioClock::new(SR);
        let mut deck = ready_deck(DeckId::A, &clock, 60);
        deck.toggle_loop(-2.0);
        assert!(!deck.loop_state().active);
        assert_eq!(deck.playback(), PlaybackState::Stopped);
    }

    #[test]
    fn test_hot_cue_set_then_jump() {
        let clock = AudioClock::new(SR);
        let mut deck = ready_deck(DeckId::A, &clock, 60);
        deck.play();
        run(&mut [&mut deck], &clock, 1.0);
        deck.trigger_hot_cue(2);
        assert_eq!(deck.hot_cues()[2], Some(1.0));

        run(&mut [&mut deck], &clock, 2.0);
        deck.trigger_hot_cue(2);
        assert!((deck.current_time() - 1.0).abs() < 1e-9);
        assert_eq!(deck.playback(), PlaybackState::Playing);

        deck.clear_hot_cue(2);
        assert_eq!(deck.hot_cues()[2], None);
        // Out of range slots are ignored
        deck.trigger_hot_cue(9);
        deck.clear_hot_cue(9);
    }

    #[test]
    fn test_tape_stop_then_pause() {
        let clock = AudioClock::new(SR);
        let mut deck = ready_deck(DeckId::A, &clock, 60);
        deck.play();
        run(&mut [&mut deck], &clock, 1.0);
        deck.tape_stop(0.5);
        assert_eq!(deck.playback(), PlaybackState::TapeStopping);
        run(&mut [&mut deck], &clock, 1.0);
        assert_eq!(deck.playback(), PlaybackState::Paused);
        let position = deck.current_time();
        // Travelled less than it would have at full speed
        assert!(position > 1.0 && position < 1.5);
    }

    #[test]
    fn test_gate_follows_transport() {
        let clock = AudioClock::new(SR);
        let mut deck = ready_deck(DeckId::A, &clock, 60);
        deck.set_gate_pattern(GatePattern::preset("CHOPPER").unwrap_or_default());
        deck.set_gate_mix(1.0);
        assert_eq!(deck.run_gate_scheduler(), 0);

        deck.play();
        assert!(deck.run_gate_scheduler() > 0);
        assert!(deck.state().gate_step.is_some());

        deck.pause();
        assert_eq!(deck.state().gate_step, None);
        assert_eq!(deck.run_gate_scheduler(), 0);
    }

    #[test]
    fn test_gate_stops_when_track_runs_out() {
        let clock = AudioClock::new(SR);
        let mut deck = ready_deck(DeckId::A, &clock, 1);
        deck.play();
        deck.run_gate_scheduler();
        run(&mut [&mut deck], &clock, 1.5);
        assert_eq!(deck.playback(), PlaybackState::Paused);
        assert_eq!(deck.state().gate_step, None);
    }

    #[test]
    fn test_sync_between_decks() {
        let clock = AudioClock::new(SR);
        let mut deck_a = ready_deck(DeckId::A, &clock, 60);
        let mut deck_b = ready_deck(DeckId::B, &clock, 60);
        deck_a.set_bpm(128.0);
        deck_b.set_bpm(140.0);
        deck_a.seek(10.0);
        deck_b.seek(3.0);

        let correction = request_sync(&mut deck_b, &deck_a).unwrap();
        assert!((correction.nudge + 0.03125).abs() < 1e-9);
        assert!((deck_b.pitch() - 0.914_285_7).abs() < 1e-6);
        assert!((deck_b.current_time() - 2.96875).abs() < 1e-9);
        // Target untouched
        assert_eq!(deck_a.pitch(), 1.0);
    }

    #[test]
    fn test_sync_needs_loaded_target() {
        let clock = AudioClock::new(SR);
        let mut deck_a = Deck::new(DeckId::A, 128.0);
        deck_a.initialize(Arc::clone(&clock));
        let mut deck_b = ready_deck(DeckId::B, &clock, 60);
        assert!(request_sync(&mut deck_b, &deck_a).is_none());
        assert_eq!(deck_b.pitch(), 1.0);
    }

    #[test]
    fn test_extreme_sync_clamps_pitch() {
        let clock = AudioClock::new(SR);
        let mut deck_a = ready_deck(DeckId::A, &clock, 60);
        let mut deck_b = ready_deck(DeckId::B, &clock, 60);
        deck_a.set_bpm(180.0);
        deck_b.set_bpm(40.0);

        let correction = request_sync(&mut deck_b, &deck_a).unwrap();
        assert!((correction.pitch - 4.5).abs() < 1e-6);
        assert_eq!(deck_b.pitch(), MAX_PITCH);
    }

    #[test]
    fn test_load_clears_echo_tail() {
        let clock = AudioClock::new(SR);
        let mut deck = ready_deck(DeckId::A, &clock, 60);
        deck.set_delay(1.0, 0.3);
        deck.play();
        run(&mut [&mut deck], &clock, 1.0);

        deck.load_track(Arc::new(AudioBuffer::silence(1000, SR)), None);
        let mut out = vec![1.0; BLOCK_FRAMES * 2];
        deck.process(&mut out, &clock.block());
        assert!(out.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_pitch_is_sanitized() {
        let mut deck = Deck::new(DeckId::B, 174.0);
        deck.set_pitch(f32::NAN);
        assert_eq!(deck.pitch(), 1.0);
        deck.set_pitch(100.0);
        assert_eq!(deck.pitch(), MAX_PITCH);
        deck.set_bpm(-5.0);
        assert_eq!(deck.bpm(), MIN_BPM);
    }

    #[test]
    fn test_torn_down_deck_is_silent() {
        let clock = AudioClock::new(SR);
        let mut deck = ready_deck(DeckId::A, &clock, 60);
        deck.play();
        deck.tear_down();
        assert_eq!(deck.lifecycle(), Lifecycle::TornDown);
        deck.play();
        assert_eq!(deck.playback(), PlaybackState::Stopped);
        let mut out = vec![1.0; 20];
        deck.process(&mut out, &clock.block());
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_deck_produces_sound_when_playing() {
        let clock = AudioClock::new(SR);
        let mut deck = ready_deck(DeckId::A, &clock, 60);
        deck.play();
        let mut out = vec![0.0; 200];
        deck.process(&mut out, &clock.block());
        assert!(out.iter().any(|&s| s.abs() > 0.01));
    }
}
