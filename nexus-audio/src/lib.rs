//! Audio engine for NEXUS - decks, mixer, and effects
//!
//! This module provides the core audio processing pipeline:
//! - Clock/Param: audio-time base and sample-accurate parameter automation
//! - Deck: transport, signal chain, loops and beat gate per side
//! - Sync: one-shot tempo and phase lock between decks
//! - Mixer: equal-power crossfader, channel gains and reverb sends
//! - Reverb: shared convolution send bus with a generated impulse response

mod buffer;
mod clock;
mod deck;
mod effects;
mod engine;
mod gate;
mod generator;
mod mixer;
mod param;
mod reverb;
mod rolls;
mod sampler;
mod sync;

pub use buffer::{AudioBuffer, BufferError};
pub use clock::{AudioClock, RenderContext};
pub use deck::{
    filter_cutoffs, ChainSettings, Deck, DeckId, DeckState, EqBand, Lifecycle, LoopState,
    PlaybackState, DEFAULT_BPM, HOT_CUE_SLOTS, MAX_PITCH, MIN_PITCH,
};
pub use effects::{Effect, CONVOLVER_BLOCK};
pub use engine::{
    AudioCommand, AudioEngine, AudioEvent, DeckCommand, EngineSettings, EngineSnapshot,
    EngineState, DEFAULT_TAPE_STOP_SECS,
};
pub use gate::{
    step_duration, GatePattern, GateRate, GateScheduler, GATE_PRESETS, GATE_STEPS,
    LOOKAHEAD_INTERVAL, SCHEDULE_AHEAD_SECS,
};
pub use generator::BufferSource;
pub use mixer::{crossfade_gains, Mixer};
pub use param::AudioParam;
pub use reverb::{
    ReverbBus, ReverbImpulse, DEFAULT_REVERB_SIZE, DEFAULT_REVERB_TIME, MAX_REVERB_TIME,
    MIN_REVERB_TIME,
};
pub use rolls::{is_loop_active, RollMode, RollPads, PHRASE_BEATS, ROLL_BEATS};
pub use sampler::{SamplerBank, SAMPLER_PADS};
pub use sync::{compute_sync, request_sync, DeckControls, SyncCorrection, SyncSnapshot};
