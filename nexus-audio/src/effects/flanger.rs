//! Flanger - sweeping comb filter for jet-plane swoosh
//!
//! The dry signal always passes; a short delay swept by a slow sine LFO is
//! fed back on itself and blended in through the wet gain.

use super::{DelayLine, Effect};
use crate::clock::RenderContext;
use crate::param::AudioParam;
use std::f64::consts::TAU;

/// Centre of the swept delay in seconds
const BASE_DELAY_SECS: f32 = 0.005;
/// LFO excursion around the centre in seconds
const LFO_DEPTH_SECS: f32 = 0.002;
const LFO_RATE_HZ: f64 = 0.25;
const FEEDBACK: f32 = 0.5;
const MAX_DELAY_SECS: f32 = 0.1;

pub struct Flanger {
    sample_rate: f32,
    line: DelayLine,
    /// Amount of the swept signal mixed in (0.0 - 1.0)
    pub wet: AudioParam,
}

impl Flanger {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            line: DelayLine::new(sample_rate, MAX_DELAY_SECS),
            wet: AudioParam::new(0.0, 0.0, 1.0),
        }
    }

    /// Swept delay at audio time `t`, in seconds
    #[inline]
    fn delay_at(t: f64) -> f32 {
        BASE_DELAY_SECS + LFO_DEPTH_SECS * (TAU * LFO_RATE_HZ * t).sin() as f32
    }
}

impl Effect for Flanger {
    fn process(&mut self, samples: &mut [f32], ctx: &RenderContext) {
        for (i, frame) in samples.chunks_mut(2).enumerate() {
            if frame.len() != 2 {
                continue;
            }
            let t = ctx.frame_time(i);
            let (dl, dr) = self.line.read(Self::delay_at(t) * self.sample_rate);
            let (l, r) = (frame[0], frame[1]);
            self.line.write(l + dl * FEEDBACK, r + dr * FEEDBACK);

            let wet = self.wet.value_at(t);
            frame[0] = l + dl * wet;
            frame[1] = r + dr * wet;
        }
        self.wet.prune(ctx.end_time(samples.len() / 2));
    }

    fn reset(&mut self) {
        self.line.clear();
    }

    fn name(&self) -> &'static str {
        "Flanger"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_stays_within_depth() {
        for i in 0..400 {
            let d = Flanger::delay_at(i as f64 * 0.01);
            assert!(d >= 0.003 - 1e-6 && d <= 0.007 + 1e-6);
        }
    }

    #[test]
    fn test_dry_passes_when_wet_is_zero() {
        let mut flanger = Flanger::new(48000.0);
        let mut samples: Vec<f32> = (0..960).map(|i| (i as f32 * 0.01).sin()).collect();
        let original = samples.clone();
        flanger.process(&mut samples, &RenderContext::new(0.0, 48000.0));
        assert_eq!(samples, original);
    }

    #[test]
    fn test_wet_adds_delayed_copy() {
        let mut flanger = Flanger::new(48000.0);
        flanger.wet.set_value(1.0);
        let mut samples = vec![0.0; 2 * 480];
        samples[0] = 1.0;
        flanger.process(&mut samples, &RenderContext::new(0.0, 48000.0));
        // The impulse reappears roughly 5 ms (240 frames) later
        let echo_energy: f32 = samples[2 * 230..2 * 250].iter().step_by(2).map(|s| s.abs()).sum();
        assert!(echo_energy > 0.5);
    }
}
