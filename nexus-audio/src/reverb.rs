//! Shared reverb send bus
//!
//! Signal flow: pre-delay -> tone low-pass -> convolution -> makeup gain.
//! The impulse response is synthesized rather than loaded: decorrelated noise
//! per channel under a `(1 - t)^4` envelope.

use crate::clock::RenderContext;
use crate::effects::{
    Biquad, BiquadType, Convolver, DelayLine, Effect, XorShift64, CONVOLVER_BLOCK,
};
use crate::param::{sanitize, AudioParam};
use tracing::debug;

pub const DEFAULT_REVERB_TIME: f32 = 3.0;
pub const DEFAULT_REVERB_SIZE: f32 = 0.4;
pub const MIN_REVERB_TIME: f32 = 0.1;
pub const MAX_REVERB_TIME: f32 = 10.0;

const MAX_PRE_DELAY_SECS: f32 = 1.0;
/// Pre-delay at full size, in seconds
const PRE_DELAY_RANGE: f32 = 0.15;
const TONE_INITIAL_HZ: f32 = 8000.0;
const MAKEUP_GAIN: f32 = 1.5;
const DECAY_EXPONENT: i32 = 4;
const RAMP_TIME_CONSTANT: f64 = 0.1;
const IMPULSE_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// Generate a stereo noise-burst impulse response `time` seconds long
///
/// Never shorter than 0.1 s.
pub(crate) fn generate_impulse(
    time: f32,
    sample_rate: f32,
    rng: &mut XorShift64,
) -> [Vec<f32>; 2] {
    let shortest = (sample_rate * MIN_REVERB_TIME) as usize;
    let length = ((sample_rate * time).floor() as usize).max(shortest).max(1);
    let mut left = Vec::with_capacity(length);
    let mut right = Vec::with_capacity(length);
    for i in 0..length {
        let t = i as f32 / length as f32;
        let envelope = (1.0 - t).powi(DECAY_EXPONENT);
        left.push(rng.next_bipolar() * envelope);
        right.push(rng.next_bipolar() * envelope);
    }
    [left, right]
}

/// Pre-delay in seconds for a room size
pub fn pre_delay_for_size(size: f32) -> f32 {
    size * PRE_DELAY_RANGE
}

/// Tone filter cutoff in Hz for a room size; bigger rooms sound darker
pub fn tone_for_size(size: f32) -> f32 {
    12000.0 - size * 6000.0
}

/// A generated tail, ready to swap into a running bus
///
/// Building one costs an FFT per partition, so callers sharing the bus with
/// the render callback build it first and only lock for `install_impulse`.
pub struct ReverbImpulse {
    time: f32,
    convolver: Convolver,
}

impl ReverbImpulse {
    pub fn build(time: f32, sample_rate: f32) -> Self {
        let time = sanitize(time, DEFAULT_REVERB_TIME, MIN_REVERB_TIME, MAX_REVERB_TIME);
        let mut rng = XorShift64::new(IMPULSE_SEED ^ time.to_bits() as u64);
        let impulse = generate_impulse(time, sample_rate, &mut rng);
        Self {
            time,
            convolver: Convolver::new(impulse, sample_rate, CONVOLVER_BLOCK, true),
        }
    }

    pub fn time(&self) -> f32 {
        self.time
    }
}

pub struct ReverbBus {
    sample_rate: f32,
    time: f32,
    size: f32,
    pre_delay: DelayLine,
    /// Pre-delay time in seconds
    pre_delay_time: AudioParam,
    tone: Biquad,
    convolver: Convolver,
    makeup: AudioParam,
}

impl ReverbBus {
    pub fn new(sample_rate: f32, time: f32, size: f32) -> Self {
        let impulse = ReverbImpulse::build(time, sample_rate);
        let size = sanitize(size, DEFAULT_REVERB_SIZE, 0.0, 1.0);

        let mut bus = Self {
            sample_rate,
            time: impulse.time,
            size,
            pre_delay: DelayLine::new(sample_rate, MAX_PRE_DELAY_SECS),
            pre_delay_time: AudioParam::new(0.0, 0.0, MAX_PRE_DELAY_SECS),
            tone: Biquad::new(BiquadType::LowPass, sample_rate, TONE_INITIAL_HZ),
            convolver: impulse.convolver,
            makeup: AudioParam::new(MAKEUP_GAIN, 0.0, 4.0),
        };
        bus.apply_size(0.0);
        bus
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Change the tail length, regenerating the impulse response
    pub fn set_time(&mut self, time: f32) {
        let time = sanitize(time, self.time, MIN_REVERB_TIME, MAX_REVERB_TIME);
        if time == self.time {
            return;
        }
        self.install_impulse(ReverbImpulse::build(time, self.sample_rate));
    }

    /// Swap in a prebuilt tail; the old tail is dropped mid-ring
    pub fn install_impulse(&mut self, impulse: ReverbImpulse) {
        self.time = impulse.time;
        self.convolver = impulse.convolver;
        self.makeup.set_value(MAKEUP_GAIN);
        debug!(time = self.time, "Reverb impulse regenerated");
    }

    /// Change the room size; pre-delay and tone glide to their new values
    pub fn set_size(&mut self, now: f64, size: f32) {
        self.size = sanitize(size, self.size, 0.0, 1.0);
        self.apply_size(now);
    }

    fn apply_size(&mut self, now: f64) {
        self.pre_delay_time
            .set_target_at_time(pre_delay_for_size(self.size), now, RAMP_TIME_CONSTANT);
        self.tone
            .frequency
            .set_target_at_time(tone_for_size(self.size), now, RAMP_TIME_CONSTANT);
    }

    /// Pre-delay the block in place
    fn delay_block(&mut self, samples: &mut [f32], ctx: &RenderContext) {
        for (i, frame) in samples.chunks_mut(2).enumerate() {
            if frame.len() != 2 {
                continue;
            }
            let delay = self.pre_delay_time.value_at(ctx.frame_time(i)) * self.sample_rate;
            let (l, r) = self.pre_delay.read(delay);
            self.pre_delay.write(frame[0], frame[1]);
            frame[0] = l;
            frame[1] = r;
        }
        self.pre_delay_time.prune(ctx.end_time(samples.len() / 2));
    }
}

impl Effect for ReverbBus {
    fn process(&mut self, samples: &mut [f32], ctx: &RenderContext) {
        self.delay_block(samples, ctx);
        self.tone.process(samples, ctx);
        self.convolver.process(samples, ctx);
        crate::effects::apply_gain(samples, &mut self.makeup, ctx);
    }

    fn reset(&mut self) {
        self.pre_delay.clear();
        self.tone.reset();
        self.convolver.reset();
    }

    fn name(&self) -> &'static str {
        "Reverb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_length_and_envelope() {
        let mut rng = XorShift64::default();
        let [left, right] = generate_impulse(2.0, 1000.0, &mut rng);
        assert_eq!(left.len(), 2000);
        assert_eq!(right.len(), 2000);
        assert!(left.iter().all(|s| s.abs() <= 1.0));
        // Tail decays toward silence
        assert!(left[1990..].iter().all(|s| s.abs() < 1e-6));
        // Channels are decorrelated
        assert_ne!(left[..10], right[..10]);
    }

    #[test]
    fn test_impulse_minimum_length() {
        let mut rng = XorShift64::default();
        let [left, _] = generate_impulse(0.01, 1000.0, &mut rng);
        assert_eq!(left.len(), 100);
    }

    #[test]
    fn test_size_mappings() {
        assert!((pre_delay_for_size(0.4) - 0.06).abs() < 1e-6);
        assert!((tone_for_size(0.4) - 9600.0).abs() < 1e-3);
        assert_eq!(tone_for_size(1.0), 6000.0);
    }

    #[test]
    fn test_set_size_glides() {
        let mut bus = ReverbBus::new(48000.0, 1.0, 0.0);
        bus.set_size(1.0, 1.0);
        assert_eq!(bus.size(), 1.0);
        assert!((bus.tone.frequency.destination() - 6000.0).abs() < 1e-3);
        assert!((bus.pre_delay_time.destination() - 0.15).abs() < 1e-6);
        // Nothing jumps at the moment of the change
        assert!((bus.tone.frequency.value_at(1.0) - 12000.0).abs() < 1.0);
    }

    #[test]
    fn test_time_is_clamped() {
        let mut bus = ReverbBus::new(8000.0, 3.0, 0.4);
        bus.set_time(50.0);
        assert_eq!(bus.time(), MAX_REVERB_TIME);
        bus.set_time(f32::NAN);
        assert_eq!(bus.time(), MAX_REVERB_TIME);
    }

    #[test]
    fn test_install_prebuilt_impulse() {
        let mut bus = ReverbBus::new(8000.0, 1.0, 0.4);
        let impulse = ReverbImpulse::build(2.0, bus.sample_rate());
        let partitions = impulse.convolver.partition_count();
        assert_eq!(impulse.time(), 2.0);

        bus.install_impulse(impulse);
        assert_eq!(bus.time(), 2.0);
        assert_eq!(bus.convolver.partition_count(), partitions);
        assert!(partitions > ReverbImpulse::build(1.0, 8000.0).convolver.partition_count());
    }

    #[test]
    fn test_build_sanitizes_time() {
        assert_eq!(ReverbImpulse::build(f32::NAN, 8000.0).time(), DEFAULT_REVERB_TIME);
        assert_eq!(ReverbImpulse::build(0.0, 8000.0).time(), MIN_REVERB_TIME);
    }

    #[test]
    fn test_produces_tail_after_input() {
        let mut bus = ReverbBus::new(8000.0, 0.5, 0.0);
        let mut samples = vec![0.0; 2 * 4000];
        for s in samples.iter_mut().take(2 * 200) {
            *s = 0.5;
        }
        bus.process(&mut samples, &RenderContext::new(0.0, 8000.0));
        let tail_energy: f32 = samples[2 * 1000..2 * 2000].iter().map(|s| s * s).sum();
        assert!(tail_energy > 0.0);
    }
}
