//! Equal-power stereo panner

use super::Effect;
use crate::clock::RenderContext;
use crate::param::AudioParam;
use std::f32::consts::FRAC_PI_2;

/// Stereo panner; -1.0 is hard left, 1.0 hard right
///
/// Panning a stereo source folds the far channel into the near one rather
/// than simply attenuating it, so nothing is lost at the extremes.
pub struct StereoPanner {
    pub pan: AudioParam,
}

impl StereoPanner {
    pub fn new() -> Self {
        Self {
            pan: AudioParam::new(0.0, -1.0, 1.0),
        }
    }
}

impl Default for StereoPanner {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn pan_frame(pan: f32, left: f32, right: f32) -> (f32, f32) {
    if pan <= 0.0 {
        let x = (pan + 1.0) * FRAC_PI_2;
        (left + right * x.cos(), right * x.sin())
    } else {
        let x = pan * FRAC_PI_2;
        (left * x.cos(), right + left * x.sin())
    }
}

impl Effect for StereoPanner {
    fn process(&mut self, samples: &mut [f32], ctx: &RenderContext) {
        for (i, frame) in samples.chunks_mut(2).enumerate() {
            if frame.len() == 2 {
                let pan = self.pan.value_at(ctx.frame_time(i));
                let (l, r) = pan_frame(pan, frame[0], frame[1]);
                frame[0] = l;
                frame[1] = r;
            }
        }
        self.pan.prune(ctx.end_time(samples.len() / 2));
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "Pan"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centre_is_transparent() {
        let (l, r) = pan_frame(0.0, 0.3, -0.7);
        assert!((l - 0.3).abs() < 1e-6);
        assert!((r + 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_hard_left_folds_right_in() {
        let (l, r) = pan_frame(-1.0, 0.5, 0.25);
        assert!((l - 0.75).abs() < 1e-6);
        assert!(r.abs() < 1e-6);
    }

    #[test]
    fn test_hard_right_folds_left_in() {
        let mut panner = StereoPanner::new();
        panner.pan.set_value(1.0);
        let mut samples = vec![0.5, 0.25];
        panner.process(&mut samples, &RenderContext::new(0.0, 48000.0));
        assert!(samples[0].abs() < 1e-6);
        assert!((samples[1] - 0.75).abs() < 1e-6);
    }
}
