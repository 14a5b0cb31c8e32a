//! Roll pads - momentary and latched beat loops on top of `Deck::toggle_loop`
//!
//! The deck only knows "loop N beats" and "leave the loop". Whether a pad
//! holds the loop while pressed or toggles it is decided here.

use crate::deck::LoopState;

/// How close an active loop must be to a pad's length to count as that pad's
/// loop, in seconds. Must stay under half the gap between 1/8 and 1/4 beat at
/// club tempos.
pub const LOOP_MATCH_TOLERANCE: f64 = 0.01;

/// Standard roll pad lengths in beats
pub const ROLL_BEATS: [f32; 4] = [0.125, 0.25, 0.5, 1.0];
/// Standard phrase loop lengths in beats
pub const PHRASE_BEATS: [f32; 4] = [4.0, 8.0, 16.0, 32.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollMode {
    /// Loop while held, release to leave
    #[default]
    Momentary,
    /// Press toggles the loop on and off
    Latched,
}

/// Whether the active loop is `beats` long at `bpm`
pub fn is_loop_active(loop_state: &LoopState, bpm: f32, beats: f32) -> bool {
    if !loop_state.active || bpm <= 0.0 {
        return false;
    }
    let expected = beats as f64 * 60.0 / bpm as f64;
    (loop_state.length() - expected).abs() < LOOP_MATCH_TOLERANCE
}

/// Pad state for one deck
#[derive(Debug, Clone, Default)]
pub struct RollPads {
    /// Momentary pad currently held
    held: Option<f32>,
}

impl RollPads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Press a pad; returns the argument for `toggle_loop`
    ///
    /// A momentary press always re-triggers, so repeated presses stutter and
    /// a latched loop of the same length can be grabbed.
    pub fn press(&mut self, beats: f32, mode: RollMode, loop_state: &LoopState, bpm: f32) -> f32 {
        match mode {
            RollMode::Momentary => {
                self.held = Some(beats);
                beats
            }
            RollMode::Latched => {
                if is_loop_active(loop_state, bpm, beats) {
                    0.0
                } else {
                    beats
                }
            }
        }
    }

    /// Release a pad; returns `Some(0.0)` when a held loop should end
    pub fn release(&mut self, beats: f32) -> Option<f32> {
        match self.held {
            Some(held) if held == beats => {
                self.held = None;
                Some(0.0)
            }
            _ => None,
        }
    }
}
