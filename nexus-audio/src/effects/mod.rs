//! Signal-chain nodes
//!
//! Each node processes stereo interleaved blocks in place and evaluates its
//! automatable parameters against the block's audio time.

mod convolver;
mod delay;
mod distortion;
mod filter;
mod flanger;
mod noise;
mod panner;
mod rng;

pub use convolver::{Convolver, DEFAULT_BLOCK as CONVOLVER_BLOCK};
pub use delay::{DelayLine, Echo, MAX_ECHO_SECS};
pub use distortion::Distortion;
pub use filter::{Biquad, BiquadType};
pub use flanger::Flanger;
pub use noise::NoiseSource;
pub use panner::StereoPanner;
pub(crate) use rng::XorShift64;

use crate::clock::RenderContext;
use crate::param::AudioParam;

/// Trait for audio effects
pub trait Effect: Send {
    /// Process audio samples in place (stereo interleaved)
    fn process(&mut self, samples: &mut [f32], ctx: &RenderContext);

    /// Reset effect state
    fn reset(&mut self);

    /// Get effect name
    fn name(&self) -> &'static str;
}

/// Multiply a block by an automated gain and retire elapsed automation
pub fn apply_gain(samples: &mut [f32], gain: &mut AudioParam, ctx: &RenderContext) {
    for (i, frame) in samples.chunks_mut(2).enumerate() {
        let g = gain.value_at(ctx.frame_time(i));
        for sample in frame {
            *sample *= g;
        }
    }
    gain.prune(ctx.end_time(samples.len() / 2));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_gain_follows_automation() {
        let mut gain = AudioParam::new(1.0, 0.0, 1.0);
        gain.set_value_at_time(0.0, 0.002);
        let mut samples = vec![1.0; 8];
        apply_gain(&mut samples, &mut gain, &RenderContext::new(0.0, 1000.0));
        assert_eq!(samples, vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(gain.pending(), 0);
    }
}
