//! Waveshaping distortion
//!
//! The transfer curve is rebuilt whenever the amount changes. Swapping curves
//! outright would click, so the previous curve keeps sounding and is
//! crossfaded out over a few milliseconds.

use super::Effect;
use crate::clock::RenderContext;
use std::f32::consts::PI;

/// Points in each transfer curve
pub const CURVE_POINTS: usize = 44100;

/// Crossfade smoothing coefficient (~10ms at 48kHz)
const CURVE_SMOOTH_COEFF: f32 = 0.9995;

/// Build the soft-clipping curve for `amount` in 0.0 - 1.0
///
/// `curve(x) = (3 + k) * x * 20deg / (pi + k * |x|)` with `k = amount * 400`.
pub fn make_curve(amount: f32) -> Vec<f32> {
    let k = amount.clamp(0.0, 1.0) * 400.0;
    let deg = PI / 180.0;
    (0..CURVE_POINTS)
        .map(|i| {
            let x = i as f32 * 2.0 / CURVE_POINTS as f32 - 1.0;
            (3.0 + k) * x * 20.0 * deg / (PI + k * x.abs())
        })
        .collect()
}

/// Map a sample through a curve spanning -1..1 with linear interpolation
#[inline]
fn shape(curve: &[f32], input: f32) -> f32 {
    let last = curve.len() - 1;
    let v = (last as f32) * (input + 1.0) / 2.0;
    if v <= 0.0 {
        return curve[0];
    }
    if v >= last as f32 {
        return curve[last];
    }
    let k = v as usize;
    let f = v - k as f32;
    curve[k] + (curve[k + 1] - curve[k]) * f
}

pub struct Distortion {
    amount: f32,
    curve: Vec<f32>,
    previous: Vec<f32>,
    /// Weight of the current curve, rising to 1.0 after each change
    blend: f32,
}

impl Distortion {
    pub fn new() -> Self {
        let curve = make_curve(0.0);
        Self {
            amount: 0.0,
            previous: curve.clone(),
            curve,
            blend: 1.0,
        }
    }

    /// Set the drive (0.0 - 1.0)
    pub fn set_amount(&mut self, amount: f32) {
        let amount = amount.clamp(0.0, 1.0);
        if amount == self.amount {
            return;
        }
        self.amount = amount;
        let next = make_curve(amount);
        self.previous = std::mem::replace(&mut self.curve, next);
        self.blend = 0.0;
    }

    pub fn amount(&self) -> f32 {
        self.amount
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Distortion {
    fn process(&mut self, samples: &mut [f32], _ctx: &RenderContext) {
        for frame in samples.chunks_mut(2) {
            self.blend = CURVE_SMOOTH_COEFF * self.blend + (1.0 - CURVE_SMOOTH_COEFF);
            if self.blend > 0.9999 {
                self.blend = 1.0;
            }
            for sample in frame {
                let current = shape(&self.curve, *sample);
                *sample = if self.blend >= 1.0 {
                    current
                } else {
                    let old = shape(&self.previous, *sample);
                    old + (current - old) * self.blend
                };
            }
        }
    }

    fn reset(&mut self) {
        self.blend = 1.0;
    }

    fn name(&self) -> &'static str {
        "Distortion"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_amount_scales_by_a_third() {
        let curve = make_curve(0.0);
        // (3 * x * 20deg) / pi == x / 3
        assert!((shape(&curve, 0.6) - 0.2).abs() < 1e-4);
        assert!((shape(&curve, -0.3) + 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_full_amount_saturates() {
        let curve = make_curve(1.0);
        let quiet = shape(&curve, 0.05);
        let loud = shape(&curve, 0.9);
        // Heavy compression: 18x the input gives far less than 18x the output
        assert!(loud / quiet < 3.0);
        assert!(shape(&curve, 5.0) == curve[CURVE_POINTS - 1]);
    }

    #[test]
    fn test_amount_change_crossfades() {
        let mut dist = Distortion::new();
        dist.set_amount(1.0);
        let mut samples = vec![0.5, 0.5];
        dist.process(&mut samples, &RenderContext::new(0.0, 48000.0));
        let target = shape(&make_curve(1.0), 0.5);
        // First frame is still mostly the old curve
        assert!((samples[0] - 0.5 / 3.0).abs() < (samples[0] - target).abs());

        let mut block = vec![0.5; 2 * 48000];
        dist.process(&mut block, &RenderContext::new(0.0, 48000.0));
        assert!((block[block.len() - 1] - target).abs() < 1e-4);
    }
}
