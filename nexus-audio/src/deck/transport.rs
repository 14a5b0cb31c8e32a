//! Transport and position tracking
//!
//! Playback position is never read back from the generator. It is derived
//! from an anchor `(reference_time, reference_position, rate)` that is rebased
//! on every discontinuity, so position stays continuous across pitch changes,
//! loops, scratches and generator swaps.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::buffer::AudioBuffer;
use crate::clock::RenderContext;
use crate::generator::{BufferSource, MAX_PLAYBACK_RATE};

/// Rate the tape-stop ramp decays toward (sign follows the playing direction)
pub const TAPE_STOP_FLOOR: f64 = 0.001;
/// Time constant for playback-rate changes
pub const RATE_TIME_CONSTANT: f64 = 0.05;
/// Shortest loop the engine will arm, in seconds
pub const MIN_LOOP_SECS: f64 = 0.001;

/// Playback state for a deck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
    Scratching,
    TapeStopping,
}

impl PlaybackState {
    /// Whether the deck is producing (or about to produce) sound
    pub fn is_sounding(self) -> bool {
        matches!(
            self,
            PlaybackState::Playing | PlaybackState::Scratching | PlaybackState::TapeStopping
        )
    }
}

/// Anchor from which the current position is extrapolated
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportClock {
    /// Audio time at which the anchor was taken
    pub reference_time: f64,
    /// Track position at `reference_time`, in seconds
    pub reference_position: f64,
    /// Signed playback rate since `reference_time`
    pub rate: f64,
}

impl TransportClock {
    pub fn at_rest(now: f64, position: f64) -> Self {
        Self {
            reference_time: now,
            reference_position: position,
            rate: 0.0,
        }
    }

    /// Unconstrained position at `now`
    #[inline]
    pub fn position_at(&self, now: f64) -> f64 {
        self.reference_position + (now - self.reference_time) * self.rate
    }

    pub fn rebase(&mut self, now: f64, position: f64, rate: f64) {
        self.reference_time = now;
        self.reference_position = position;
        self.rate = rate;
    }
}

/// Active loop bounds in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopRegion {
    pub start: f64,
    pub end: f64,
}

impl LoopRegion {
    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    /// Fold a position into `[start, end)`, in either direction
    pub fn wrap(&self, position: f64) -> f64 {
        let length = self.length();
        if length <= 0.0 {
            return self.start;
        }
        self.start + (position - self.start).rem_euclid(length)
    }

}

/// Published loop status
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoopState {
    pub active: bool,
    pub start: f64,
    pub end: f64,
}

impl LoopState {
    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

/// Exponential rate decay from the start of a tape stop
#[derive(Debug, Clone, Copy, PartialEq)]
struct TapeStopRamp {
    start_time: f64,
    start_position: f64,
    start_rate: f64,
    duration: f64,
}

impl TapeStopRamp {
    fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    fn elapsed(&self, now: f64) -> f64 {
        (now - self.start_time).clamp(0.0, self.duration)
    }

    /// Decay constant; `None` when the rate is already at the floor
    fn lambda(&self) -> Option<f64> {
        let magnitude = self.start_rate.abs();
        if magnitude <= TAPE_STOP_FLOOR || self.duration <= 0.0 {
            return None;
        }
        Some((magnitude / TAPE_STOP_FLOOR).ln() / self.duration)
    }

    fn rate_at(&self, now: f64) -> f64 {
        match self.lambda() {
            Some(lambda) => self.start_rate * (-lambda * self.elapsed(now)).exp(),
            None => self.start_rate,
        }
    }

    /// Position reached `now`, integrating the decaying rate exactly
    fn position_at(&self, now: f64) -> f64 {
        let elapsed = self.elapsed(now);
        match self.lambda() {
            // rate(t) = r0 * e^(-lambda t), reaching the floor after `duration`
            Some(lambda) => {
                self.start_position + self.start_rate * (1.0 - (-lambda * elapsed).exp()) / lambda
            }
            None => self.start_position + self.start_rate * elapsed,
        }
    }

    /// Re-anchor the remaining decay at `now` from `position`
    fn rebase(&mut self, now: f64, position: f64) {
        let elapsed = self.elapsed(now);
        self.start_rate = self.rate_at(now);
        self.start_position = position;
        self.duration -= elapsed;
        self.start_time = now;
    }
}

/// Deck transport: the generator slot, its anchor, and the playback state machine
pub struct Transport {
    state: PlaybackState,
    clock: TransportClock,
    buffer: Option<Arc<AudioBuffer>>,
    generator: Option<BufferSource>,
    loop_region: Option<LoopRegion>,
    tape_stop: Option<TapeStopRamp>,
    /// Whether playback resumes when the current scratch is released
    scratch_resumes: bool,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Stopped,
            clock: TransportClock::at_rest(0.0, 0.0),
            buffer: None,
            generator: None,
            loop_region: None,
            tape_stop: None,
            scratch_resumes: false,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn clock(&self) -> &TransportClock {
        &self.clock
    }

    pub fn has_track(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn duration(&self) -> f64 {
        self.buffer.as_ref().map(|b| b.duration()).unwrap_or(0.0)
    }

    pub fn loop_state(&self) -> LoopState {
        match self.loop_region {
            Some(region) => LoopState {
                active: true,
                start: region.start,
                end: region.end,
            },
            None => LoopState::default(),
        }
    }

    /// Position at `now`: loop-wrapped when a loop is active, otherwise
    /// clamped to the track
    pub fn position(&self, now: f64) -> f64 {
        let raw = match (self.state, &self.tape_stop) {
            (PlaybackState::TapeStopping, Some(ramp)) => ramp.position_at(now),
            _ => self.clock.position_at(now),
        };
        self.constrain(raw)
    }

    fn constrain(&self, position: f64) -> f64 {
        if !position.is_finite() {
            return 0.0;
        }
        match self.loop_region {
            Some(region) => region.wrap(position),
            None => position.clamp(0.0, self.duration()),
        }
    }

    /// Swap in a new track, dropping any playback state
    pub fn load(&mut self, now: f64, buffer: Arc<AudioBuffer>) {
        self.discard_generator(now);
        self.buffer = Some(buffer);
        self.loop_region = None;
        self.tape_stop = None;
        self.clock = TransportClock::at_rest(now, 0.0);
        self.state = PlaybackState::Stopped;
    }

    /// Stop the old generator and start a fresh one at `position`
    ///
    /// Rebases the anchor at the same instant, so the position reported
    /// before and after the swap is continuous.
    fn launch(&mut self, now: f64, position: f64, rate: f64) {
        self.discard_generator(now);
        let Some(buffer) = self.buffer.clone() else {
            return;
        };
        let mut generator = BufferSource::start(buffer, now, position, rate as f32);
        generator.set_loop(self.loop_region.map(|r| (r.start, r.end)));
        self.generator = Some(generator);
        self.clock.rebase(now, position, rate);
        trace!(position, rate, "Generator launched");
    }

    /// Resolve the current position, then relaunch there (or at `target`)
    fn relaunch(&mut self, now: f64, target: Option<f64>, rate: f64) {
        let position = match target {
            Some(target) => self.constrain(target),
            None => self.position(now),
        };
        self.launch(now, position, rate);
    }

    fn discard_generator(&mut self, now: f64) {
        if let Some(mut generator) = self.generator.take() {
            generator.stop(now);
        }
    }

    /// Come to rest at the current position
    fn rest(&mut self, now: f64, state: PlaybackState) {
        let position = self.position(now);
        self.discard_generator(now);
        self.tape_stop = None;
        self.clock = TransportClock::at_rest(now, position);
        self.state = state;
    }

    /// Start playback from the resolved position
    ///
    /// Returns false when there is nothing to play.
    pub fn play(&mut self, now: f64, rate: f64) -> bool {
        if self.buffer.is_none() {
            return false;
        }
        match self.state {
            PlaybackState::Playing => return true,
            PlaybackState::Scratching => {
                self.scratch_resumes = true;
                return true;
            }
            PlaybackState::TapeStopping | PlaybackState::Paused | PlaybackState::Stopped => {}
        }

        let mut position = self.position(now);
        let duration = self.duration();
        if self.loop_region.is_none() {
            if rate >= 0.0 && position >= duration {
                position = 0.0;
            } else if rate < 0.0 && position <= 0.0 {
                position = duration;
            }
        }
        self.tape_stop = None;
        self.launch(now, position, rate);
        self.state = PlaybackState::Playing;
        true
    }

    pub fn pause(&mut self, now: f64) {
        match self.state {
            PlaybackState::Playing | PlaybackState::TapeStopping => {
                self.rest(now, PlaybackState::Paused)
            }
            PlaybackState::Scratching => self.scratch_resumes = false,
            PlaybackState::Paused | PlaybackState::Stopped => {}
        }
    }

    /// Stop, clear any loop and return to the top of the track
    pub fn stop(&mut self, now: f64) {
        self.discard_generator(now);
        self.loop_region = None;
        self.tape_stop = None;
        self.clock = TransportClock::at_rest(now, 0.0);
        self.state = PlaybackState::Stopped;
    }

    /// Jump to `target` seconds (NaN is treated as 0)
    pub fn seek(&mut self, now: f64, target: f64, rate: f64) {
        if self.buffer.is_none() {
            return;
        }
        let target = if target.is_finite() { target } else { 0.0 };
        let target = self.constrain(target.clamp(0.0, self.duration()));
        match self.state {
            PlaybackState::Playing | PlaybackState::TapeStopping => {
                self.tape_stop = None;
                self.relaunch(now, Some(target), rate);
                self.state = PlaybackState::Playing;
            }
            PlaybackState::Scratching => {
                let velocity = self.clock.rate;
                self.relaunch(now, Some(target), velocity);
            }
            PlaybackState::Paused | PlaybackState::Stopped => {
                self.clock = TransportClock::at_rest(now, target);
                self.state = PlaybackState::Paused;
            }
        }
        debug!(target, "Seek");
    }

    /// Glide to a new playback rate without moving the position
    pub fn set_rate(&mut self, now: f64, rate: f64) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let position = self.position(now);
        self.clock.rebase(now, position, rate);
        if let Some(generator) = self.generator.as_mut() {
            let param = generator.playback_rate_mut();
            param.cancel_scheduled_values(now);
            param.set_target_at_time(rate as f32, now, RATE_TIME_CONSTANT);
        }
    }

    /// Restart the generator in a new direction (reverse toggle)
    pub fn redirect(&mut self, now: f64, rate: f64) {
        if self.state == PlaybackState::Playing {
            self.relaunch(now, None, rate);
        }
    }

    /// Decay the rate to a halt over `duration` seconds, then pause
    pub fn tape_stop(&mut self, now: f64, duration: f64) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let Some(generator) = self.generator.as_mut() else {
            return;
        };
        let position = self.clock.position_at(now);
        let start_rate = generator.playback_rate().value_at(now) as f64;
        if start_rate == 0.0 {
            self.rest(now, PlaybackState::Paused);
            return;
        }
        let floor = TAPE_STOP_FLOOR.copysign(start_rate);
        let param = generator.playback_rate_mut();
        param.cancel_scheduled_values(now);
        param.set_value_at_time(start_rate as f32, now);
        param.exponential_ramp_to_value_at_time(floor as f32, now + duration);
        generator.stop(now + duration);

        self.tape_stop = Some(TapeStopRamp {
            start_time: now,
            start_position: position,
            start_rate,
            duration,
        });
        self.state = PlaybackState::TapeStopping;
        debug!(duration, "Tape stop");
    }

    /// Take manual control of the playhead at zero velocity
    pub fn start_scratch(&mut self, now: f64) {
        if self.buffer.is_none() || self.state == PlaybackState::Scratching {
            return;
        }
        let position = self.position(now);
        self.scratch_resumes = self.state == PlaybackState::Playing;
        // A tape-stopping generator already has its end scheduled
        let reusable = self.state == PlaybackState::Playing;
        self.tape_stop = None;
        match self.generator.as_mut() {
            Some(generator) if reusable && !generator.is_finished() => {
                let param = generator.playback_rate_mut();
                param.cancel_scheduled_values(now);
                param.set_value_at_time(0.0, now);
            }
            _ => self.launch(now, position, 0.0),
        }
        self.clock.rebase(now, position, 0.0);
        self.state = PlaybackState::Scratching;
    }

    /// Drive the playhead at `velocity` (signed, 1.0 = normal speed)
    ///
    /// Velocity is capped at the generator's rate range so the anchor never
    /// runs ahead of what is heard.
    pub fn scratch_movement(&mut self, now: f64, velocity: f64) {
        if self.state != PlaybackState::Scratching || !velocity.is_finite() {
            return;
        }
        let limit = MAX_PLAYBACK_RATE as f64;
        let velocity = velocity.clamp(-limit, limit);
        let position = self.position(now);
        self.clock.rebase(now, position, velocity);
        match self.generator.as_mut() {
            Some(generator) if !generator.is_finished() => {
                let param = generator.playback_rate_mut();
                param.cancel_scheduled_values(now);
                param.set_value_at_time(velocity as f32, now);
            }
            // Ran off an edge of the track; pick up from the clamped position
            _ => self.launch(now, position, velocity),
        }
    }

    /// Release the playhead: resume at `rate` if playback was running, else pause
    pub fn stop_scratch(&mut self, now: f64, rate: f64) {
        if self.state != PlaybackState::Scratching {
            return;
        }
        if !self.scratch_resumes {
            self.rest(now, PlaybackState::Paused);
            return;
        }
        let position = self.position(now);
        match self.generator.as_mut() {
            Some(generator) if !generator.is_finished() => {
                let param = generator.playback_rate_mut();
                param.cancel_scheduled_values(now);
                param.set_target_at_time(rate as f32, now, RATE_TIME_CONSTANT);
                self.clock.rebase(now, position, rate);
            }
            _ => self.launch(now, position, rate),
        }
        self.state = PlaybackState::Playing;
    }

    /// Arm a loop of `seconds` starting at the current position
    ///
    /// Starts playback when paused. Returns false when no loop was armed.
    pub fn enable_loop(&mut self, now: f64, seconds: f64, rate: f64) -> bool {
        if self.buffer.is_none() || !seconds.is_finite() || seconds <= 0.0 {
            return false;
        }
        if matches!(
            self.state,
            PlaybackState::Scratching | PlaybackState::TapeStopping
        ) {
            return false;
        }
        let start = self.position(now);
        let end = (start + seconds).min(self.duration());
        if end - start < MIN_LOOP_SECS {
            return false;
        }
        self.loop_region = Some(LoopRegion { start, end });
        self.launch(now, start, rate);
        self.state = PlaybackState::Playing;
        debug!(start, end, "Loop enabled");
        true
    }

    /// Leave the loop, continuing from the wrapped position
    pub fn disable_loop(&mut self, now: f64) {
        if self.loop_region.is_none() {
            return;
        }
        let position = self.position(now);
        self.loop_region = None;
        let rate = self.clock.rate;
        self.clock.rebase(now, position, rate);
        if let Some(ramp) = self.tape_stop.as_mut() {
            ramp.rebase(now, position);
        }
        if let Some(generator) = self.generator.as_mut() {
            generator.set_loop(None);
        }
        debug!(position, "Loop disabled");
    }

    /// Render the generator into `out`, then settle any state changes the
    /// block caused (tape stop completing, track running out)
    pub fn render(&mut self, out: &mut [f32], ctx: &RenderContext) {
        match self.generator.as_mut() {
            Some(generator) => generator.render(out, ctx),
            None => out.fill(0.0),
        }
        self.update(ctx.end_time(out.len() / 2));
    }

    /// Finalize transitions that complete on the audio timeline
    pub fn update(&mut self, now: f64) {
        match self.state {
            PlaybackState::TapeStopping => {
                if self.tape_stop.is_some_and(|ramp| now >= ramp.end_time()) {
                    self.rest(now, PlaybackState::Paused);
                    debug!("Tape stop complete");
                }
            }
            PlaybackState::Playing => {
                if self.generator.as_ref().is_some_and(|g| g.is_finished()) {
                    self.rest(now, PlaybackState::Paused);
                    debug!("Reached end of track");
                }
            }
            _ => {}
        }
    }
}
