//! Beat-gate lookahead scheduler
//!
//! A 16-step on/off pattern chops the deck's gate gain in time with the track.
//! A coarse control-thread timer calls [`GateScheduler::schedule`] every
//! [`LOOKAHEAD_INTERVAL`]; each call books every step that begins within the
//! next [`SCHEDULE_AHEAD_SECS`] as sample-accurate automation, so timer jitter
//! never shifts a step.

use std::time::Duration;

use tracing::trace;

use crate::param::AudioParam;

pub const GATE_STEPS: usize = 16;
/// How often the control thread should call `schedule`
pub const LOOKAHEAD_INTERVAL: Duration = Duration::from_millis(25);
/// How far ahead of the audio clock steps are booked
pub const SCHEDULE_AHEAD_SECS: f64 = 0.1;
/// Edge time constant for each step
pub const STEP_TIME_CONSTANT: f64 = 0.003;
/// Time constant for the return to unity when the gate stops
pub const RELEASE_TIME_CONSTANT: f64 = 0.1;

/// Step subdivision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateRate {
    Eighth,
    #[default]
    Sixteenth,
    ThirtySecond,
}

impl GateRate {
    /// Steps per whole note
    pub fn steps(self) -> u32 {
        match self {
            GateRate::Eighth => 8,
            GateRate::Sixteenth => 16,
            GateRate::ThirtySecond => 32,
        }
    }

    pub fn from_steps(steps: u32) -> Option<Self> {
        match steps {
            8 => Some(GateRate::Eighth),
            16 => Some(GateRate::Sixteenth),
            32 => Some(GateRate::ThirtySecond),
            _ => None,
        }
    }
}

/// Duration of one gate step at a nominal tempo
///
/// `(60 / bpm) / (steps / 4)`: a sixteenth at 120 BPM is 0.125 s.
pub fn step_duration(bpm: f32, rate: GateRate) -> f64 {
    (60.0 / bpm as f64) / (rate.steps() as f64 / 4.0)
}

/// Named factory patterns
pub const GATE_PRESETS: &[(&str, [u8; GATE_STEPS])] = &[
    ("TRANCE 1", [1, 1, 0, 1, 1, 1, 0, 1, 1, 1, 0, 1, 1, 1, 0, 1]),
    ("CHOPPER", [1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0]),
    ("GALOP", [1, 0, 1, 1, 1, 0, 1, 1, 1, 0, 1, 1, 1, 0, 1, 1]),
    ("OFFBEAT", [0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0]),
    ("BROKEN", [1, 1, 0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 1, 1, 1, 0]),
    ("PEAK", [1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0]),
    ("FULL", [1; GATE_STEPS]),
];

/// Sixteen on/off steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePattern([bool; GATE_STEPS]);

impl Default for GatePattern {
    fn default() -> Self {
        Self([true; GATE_STEPS])
    }
}

impl GatePattern {
    pub fn new(steps: [bool; GATE_STEPS]) -> Self {
        Self(steps)
    }

    /// Build from exactly 16 values; nonzero means open
    pub fn from_bits(bits: &[u8]) -> Option<Self> {
        let bits: &[u8; GATE_STEPS] = bits.try_into().ok()?;
        Some(Self(bits.map(|b| b != 0)))
    }

    /// Look up a factory pattern by name (case-insensitive)
    pub fn preset(name: &str) -> Option<Self> {
        GATE_PRESETS
            .iter()
            .find(|(preset, _)| preset.eq_ignore_ascii_case(name.trim()))
            .and_then(|(_, bits)| Self::from_bits(bits))
    }

    pub fn is_open(&self, step: usize) -> bool {
        self.0[step % GATE_STEPS]
    }

    pub fn toggle(&mut self, step: usize) {
        let step = step % GATE_STEPS;
        self.0[step] = !self.0[step];
    }

    pub fn steps(&self) -> &[bool; GATE_STEPS] {
        &self.0
    }
}

/// Gain a step asks for: closed steps dip by `mix`
pub fn step_gain(open: bool, mix: f32) -> f32 {
    if open {
        1.0
    } else {
        1.0 - mix.clamp(0.0, 1.0)
    }
}

/// Lookahead scheduler state for one deck
#[derive(Debug, Clone, Default)]
pub struct GateScheduler {
    running: bool,
    next_step_time: f64,
    current_step: usize,
}

impl GateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn next_step_time(&self) -> f64 {
        self.next_step_time
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Begin at step 0 on the current audio time
    pub fn start(&mut self, now: f64) {
        self.running = true;
        self.next_step_time = now;
        self.current_step = 0;
    }

    /// Stop scheduling and glide the gate back open
    pub fn stop(&mut self, now: f64, gain: &mut AudioParam) {
        if !self.running {
            return;
        }
        self.running = false;
        gain.cancel_scheduled_values(now);
        gain.set_target_at_time(1.0, now, RELEASE_TIME_CONSTANT);
    }

    /// Book every step starting before `now + SCHEDULE_AHEAD_SECS`
    ///
    /// Returns the number of steps booked.
    pub fn schedule(
        &mut self,
        now: f64,
        gain: &mut AudioParam,
        bpm: f32,
        rate: GateRate,
        pattern: &GatePattern,
        mix: f32,
    ) -> usize {
        if !self.running {
            return 0;
        }
        let step = step_duration(bpm, rate);
        if !step.is_finite() || step <= 0.0 {
            return 0;
        }

        // After a stall, skip whole steps so the grid keeps its phase
        if self.next_step_time < now - SCHEDULE_AHEAD_SECS {
            let missed = ((now - self.next_step_time) / step).floor();
            self.next_step_time += missed * step;
            self.current_step = (self.current_step + missed as usize) % GATE_STEPS;
        }

        let mut booked = 0;
        while self.next_step_time < now + SCHEDULE_AHEAD_SECS {
            let time = self.next_step_time;
            let target = step_gain(pattern.is_open(self.current_step), mix);
            gain.cancel_scheduled_values(time);
            let current = gain.value_at(time);
            gain.set_value_at_time(current, time);
            gain.set_target_at_time(target, time, STEP_TIME_CONSTANT);
            trace!(step = self.current_step, time, target, "Gate step");

            self.next_step_time += step;
            self.current_step = (self.current_step + 1) % GATE_STEPS;
            booked += 1;
        }
        booked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chopper() -> GatePattern {
        GatePattern::preset("chopper").unwrap()
    }

    #[test]
    fn test_step_duration() {
        assert!((step_duration(120.0, GateRate::Sixteenth) - 0.125).abs() < 1e-12);
        assert!((step_duration(120.0, GateRate::Eighth) - 0.25).abs() < 1e-12);
        assert!((step_duration(120.0, GateRate::ThirtySecond) - 0.0625).abs() < 1e-12);
        // Sixteen sixteenths span exactly one bar
        assert!((step_duration(174.0, GateRate::Sixteenth) * 16.0 - 4.0 * 60.0 / 174.0).abs() < 1e-9);
    }

    #[test]
    fn test_presets() {
        assert_eq!(GATE_PRESETS.len(), 7);
        let full = GatePattern::preset("FULL").unwrap();
        assert!(full.steps().iter().all(|&s| s));
        let offbeat = GatePattern::preset("offbeat").unwrap();
        assert!(!offbeat.is_open(0) && offbeat.is_open(2));
        assert!(GatePattern::preset("nope").is_none());
        assert!(GatePattern::from_bits(&[1, 0]).is_none());
    }

    #[test]
    fn test_toggle() {
        let mut pattern = GatePattern::default();
        pattern.toggle(3);
        assert!(!pattern.is_open(3));
        assert!(!pattern.is_open(19));
    }

    #[test]
    fn test_step_gain() {
        assert_eq!(step_gain(true, 0.7), 1.0);
        assert!((step_gain(false, 0.7) - 0.3).abs() < 1e-6);
        assert_eq!(step_gain(false, 1.0), 0.0);
    }

    #[test]
    fn test_schedules_within_lookahead() {
        let mut gate = GateScheduler::new();
        let mut gain = AudioParam::new(1.0, 0.0, 1.0);
        gate.start(0.0);
        let booked = gate.schedule(0.0, &mut gain, 120.0, GateRate::Sixteenth, &chopper(), 1.0);
        assert_eq!(booked, 1);
        assert!((gate.next_step_time() - 0.125).abs() < 1e-12);

        // Next tick books step 1 (closed)
        assert_eq!(gate.schedule(0.05, &mut gain, 120.0, GateRate::Sixteenth, &chopper(), 1.0), 1);
        assert!(gain.value_at(0.12) > 0.99);
        assert!(gain.value_at(0.145) < 0.01);

        // Step 2 (open) reopens the gate
        gate.schedule(0.175, &mut gain, 120.0, GateRate::Sixteenth, &chopper(), 1.0);
        assert!(gain.value_at(0.27) > 0.99);
        assert_eq!(gate.current_step(), 3);
    }

    #[test]
    fn test_mix_sets_depth() {
        let mut gate = GateScheduler::new();
        let mut gain = AudioParam::new(1.0, 0.0, 1.0);
        gate.start(0.0);
        gate.schedule(0.05, &mut gain, 120.0, GateRate::Sixteenth, &chopper(), 0.5);
        assert!((gain.value_at(0.2) - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_stop_returns_to_unity() {
        let mut gate = GateScheduler::new();
        let mut gain = AudioParam::new(1.0, 0.0, 1.0);
        gate.start(0.0);
        gate.schedule(0.05, &mut gain, 120.0, GateRate::Sixteenth, &chopper(), 1.0);
        gate.stop(0.2, &mut gain);
        assert!(!gate.is_running());
        assert!(gain.value_at(1.5) > 0.99);
        assert_eq!(gate.schedule(0.3, &mut gain, 120.0, GateRate::Sixteenth, &chopper(), 1.0), 0);
    }

    #[test]
    fn test_stall_keeps_phase() {
        let mut gate = GateScheduler::new();
        let mut gain = AudioParam::new(1.0, 0.0, 1.0);
        gate.start(0.0);
        gate.schedule(0.0, &mut gain, 120.0, GateRate::Sixteenth, &chopper(), 1.0);
        // Timer stalls for over a second
        gate.schedule(1.3, &mut gain, 120.0, GateRate::Sixteenth, &chopper(), 1.0);
        // First grid point past the lookahead window
        assert!((gate.next_step_time() - 1.5).abs() < 1e-9);
        assert_eq!(gate.current_step(), 12);
    }

    #[test]
    fn test_invalid_bpm_books_nothing() {
        let mut gate = GateScheduler::new();
        let mut gain = AudioParam::new(1.0, 0.0, 1.0);
        gate.start(0.0);
        assert_eq!(gate.schedule(0.0, &mut gain, 0.0, GateRate::Sixteenth, &chopper(), 1.0), 0);
    }
}
