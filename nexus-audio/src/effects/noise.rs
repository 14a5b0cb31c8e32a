//! Looped white-noise source injected ahead of the filters

use super::{Effect, XorShift64};
use crate::clock::RenderContext;
use crate::param::AudioParam;

/// Length of the generated noise loop
const NOISE_LOOP_SECS: f32 = 2.0;
/// Peak amplitude of the stored noise
const NOISE_AMPLITUDE: f32 = 0.4;

/// Adds a mono noise loop, scaled by `gain`, to both channels
pub struct NoiseSource {
    table: Vec<f32>,
    position: usize,
    pub gain: AudioParam,
}

impl NoiseSource {
    pub fn new(sample_rate: f32) -> Self {
        let mut rng = XorShift64::default();
        let len = ((sample_rate * NOISE_LOOP_SECS) as usize).max(1);
        let table = (0..len).map(|_| rng.next_unit() * NOISE_AMPLITUDE).collect();
        Self {
            table,
            position: 0,
            gain: AudioParam::new(0.0, 0.0, 1.0),
        }
    }
}

impl Effect for NoiseSource {
    fn process(&mut self, samples: &mut [f32], ctx: &RenderContext) {
        for (i, frame) in samples.chunks_mut(2).enumerate() {
            let g = self.gain.value_at(ctx.frame_time(i));
            let n = self.table[self.position] * g;
            self.position = (self.position + 1) % self.table.len();
            for sample in frame {
                *sample += n;
            }
        }
        self.gain.prune(ctx.end_time(samples.len() / 2));
    }

    fn reset(&mut self) {
        self.position = 0;
    }

    fn name(&self) -> &'static str {
        "Noise"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_at_zero_gain() {
        let mut noise = NoiseSource::new(48000.0);
        let mut samples = vec![0.1; 64];
        noise.process(&mut samples, &RenderContext::new(0.0, 48000.0));
        assert!(samples.iter().all(|&s| s == 0.1));
    }

    #[test]
    fn test_noise_bounded_by_amplitude() {
        let mut noise = NoiseSource::new(1000.0);
        noise.gain.set_value(1.0);
        let mut samples = vec![0.0; 2 * 4000];
        noise.process(&mut samples, &RenderContext::new(0.0, 1000.0));
        assert!(samples.iter().all(|&s| (0.0..=NOISE_AMPLITUDE).contains(&s)));
        assert!(samples.iter().any(|&s| s > 0.1));
        // Table loops every two seconds
        assert_eq!(samples[0], samples[4000]);
    }
}
