//! Biquad filter (low/high-pass, shelves, peaking)
//!
//! Coefficients follow the Audio EQ Cookbook as used by browser audio engines:
//! the pass filters read Q in dB, shelves use a fixed slope of 1.

use super::Effect;
use crate::clock::RenderContext;
use crate::param::AudioParam;
use std::f64::consts::PI;

/// Frames between coefficient refreshes while parameters move
const CONTROL_INTERVAL: usize = 32;

/// Filter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BiquadType {
    #[default]
    LowPass,
    HighPass,
    LowShelf,
    Peaking,
    HighShelf,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Coefficients {
    const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    const SILENT: Self = Self {
        b0: 0.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: (b0 / a0) as f32,
            b1: (b1 / a0) as f32,
            b2: (b2 / a0) as f32,
            a1: (a1 / a0) as f32,
            a2: (a2 / a0) as f32,
        }
    }

    fn compute(kind: BiquadType, frequency: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let nyquist = sample_rate as f64 / 2.0;
        // Normalized frequency, 1.0 at Nyquist
        let f = (frequency as f64 / nyquist).clamp(0.0, 1.0);

        match kind {
            BiquadType::LowPass if f >= 1.0 => return Self::IDENTITY,
            BiquadType::LowPass if f <= 0.0 => return Self::SILENT,
            BiquadType::HighPass if f >= 1.0 => return Self::SILENT,
            BiquadType::HighPass if f <= 0.0 => return Self::IDENTITY,
            _ => {}
        }

        let w0 = PI * f;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let a = 10f64.powf(gain_db as f64 / 40.0);

        match kind {
            BiquadType::LowPass => {
                let alpha = sin_w0 / (2.0 * 10f64.powf(q as f64 / 20.0));
                Self::normalized(
                    (1.0 - cos_w0) / 2.0,
                    1.0 - cos_w0,
                    (1.0 - cos_w0) / 2.0,
                    1.0 + alpha,
                    -2.0 * cos_w0,
                    1.0 - alpha,
                )
            }
            BiquadType::HighPass => {
                let alpha = sin_w0 / (2.0 * 10f64.powf(q as f64 / 20.0));
                Self::normalized(
                    (1.0 + cos_w0) / 2.0,
                    -(1.0 + cos_w0),
                    (1.0 + cos_w0) / 2.0,
                    1.0 + alpha,
                    -2.0 * cos_w0,
                    1.0 - alpha,
                )
            }
            BiquadType::Peaking => {
                if f <= 0.0 || f >= 1.0 {
                    return Self::IDENTITY;
                }
                let q = (q as f64).max(1e-4);
                let alpha = sin_w0 / (2.0 * q);
                Self::normalized(
                    1.0 + alpha * a,
                    -2.0 * cos_w0,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_w0,
                    1.0 - alpha / a,
                )
            }
            BiquadType::LowShelf => {
                if f >= 1.0 {
                    return Self::normalized(a * a, 0.0, 0.0, 1.0, 0.0, 0.0);
                }
                if f <= 0.0 {
                    return Self::IDENTITY;
                }
                let two_sqrt_a_alpha = a.sqrt() * sin_w0 * std::f64::consts::SQRT_2;
                Self::normalized(
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            BiquadType::HighShelf => {
                if f >= 1.0 {
                    return Self::IDENTITY;
                }
                if f <= 0.0 {
                    return Self::normalized(a * a, 0.0, 0.0, 1.0, 0.0, 0.0);
                }
                let two_sqrt_a_alpha = a.sqrt() * sin_w0 * std::f64::consts::SQRT_2;
                Self::normalized(
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
        }
    }
}

/// Per-channel direct form I state
#[derive(Debug, Clone, Copy, Default)]
struct ChannelState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl ChannelState {
    #[inline]
    fn tick(&mut self, c: &Coefficients, input: f32) -> f32 {
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

/// Stereo biquad with automatable frequency, Q and gain
pub struct Biquad {
    kind: BiquadType,
    sample_rate: f32,
    /// Cutoff or centre frequency in Hz
    pub frequency: AudioParam,
    pub q: AudioParam,
    /// Gain in dB (shelves and peaking only)
    pub gain: AudioParam,
    coefficients: Coefficients,
    /// Parameter values the current coefficients were computed from
    computed_for: (f32, f32, f32),
    left: ChannelState,
    right: ChannelState,
}

impl Biquad {
    pub fn new(kind: BiquadType, sample_rate: f32, frequency: f32) -> Self {
        let nyquist = sample_rate / 2.0;
        let mut filter = Self {
            kind,
            sample_rate,
            frequency: AudioParam::new(frequency, 0.0, nyquist),
            q: AudioParam::new(1.0, -770.0, 770.0),
            gain: AudioParam::new(0.0, -40.0, 40.0),
            coefficients: Coefficients::IDENTITY,
            computed_for: (f32::NAN, f32::NAN, f32::NAN),
            left: ChannelState::default(),
            right: ChannelState::default(),
        };
        filter.refresh(0.0);
        filter
    }

    pub fn with_q(mut self, q: f32) -> Self {
        self.q.set_value(q);
        self.refresh(0.0);
        self
    }

    pub fn kind(&self) -> BiquadType {
        self.kind
    }

    /// Recompute coefficients if any parameter moved since the last refresh
    fn refresh(&mut self, t: f64) {
        let current = (
            self.frequency.value_at(t),
            self.q.value_at(t),
            self.gain.value_at(t),
        );
        if current == self.computed_for {
            return;
        }
        self.coefficients =
            Coefficients::compute(self.kind, current.0, current.1, current.2, self.sample_rate);
        self.computed_for = current;
    }
}

impl Effect for Biquad {
    fn process(&mut self, samples: &mut [f32], ctx: &RenderContext) {
        for (i, frame) in samples.chunks_mut(2).enumerate() {
            if i % CONTROL_INTERVAL == 0 {
                self.refresh(ctx.frame_time(i));
            }
            if frame.len() == 2 {
                frame[0] = self.left.tick(&self.coefficients, frame[0]);
                frame[1] = self.right.tick(&self.coefficients, frame[1]);
            }
        }

        let end = ctx.end_time(samples.len() / 2);
        self.frequency.prune(end);
        self.q.prune(end);
        self.gain.prune(end);
    }

    fn reset(&mut self) {
        self.left = ChannelState::default();
        self.right = ChannelState::default();
    }

    fn name(&self) -> &'static str {
        match self.kind {
            BiquadType::LowPass => "Low-pass",
            BiquadType::HighPass => "High-pass",
            BiquadType::LowShelf => "Low shelf",
            BiquadType::Peaking => "Peaking",
            BiquadType::HighShelf => "High shelf",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    /// RMS of the filter's steady-state response to a sine
    fn sine_gain(filter: &mut Biquad, freq: f32) -> f32 {
        let frames = 9600;
        let mut samples: Vec<f32> = (0..frames)
            .flat_map(|i| {
                let s = (2.0 * std::f32::consts::PI * freq * i as f32 / SR).sin();
                [s, s]
            })
            .collect();
        filter.process(&mut samples, &RenderContext::new(0.0, SR));
        let tail = &samples[frames..];
        let rms = (tail.iter().map(|s| s * s).sum::<f32>() / tail.len() as f32).sqrt();
        rms / std::f32::consts::FRAC_1_SQRT_2
    }

    #[test]
    fn test_lowpass_attenuates_highs() {
        let mut filter = Biquad::new(BiquadType::LowPass, SR, 500.0);
        assert!(sine_gain(&mut filter, 8000.0) < 0.05);
        filter.reset();
        assert!(sine_gain(&mut filter, 50.0) > 0.95);
    }

    #[test]
    fn test_highpass_at_zero_is_transparent() {
        let mut filter = Biquad::new(BiquadType::HighPass, SR, 0.0);
        let mut samples = vec![0.3, -0.2, 0.5, 0.1];
        filter.process(&mut samples, &RenderContext::new(0.0, SR));
        assert_eq!(samples, vec![0.3, -0.2, 0.5, 0.1]);
    }

    #[test]
    fn test_lowpass_at_nyquist_is_transparent() {
        let mut filter = Biquad::new(BiquadType::LowPass, SR, SR / 2.0);
        let mut samples = vec![0.3, -0.2, 0.5, 0.1];
        filter.process(&mut samples, &RenderContext::new(0.0, SR));
        assert_eq!(samples, vec![0.3, -0.2, 0.5, 0.1]);
    }

    #[test]
    fn test_low_shelf_boosts_lows() {
        let mut filter = Biquad::new(BiquadType::LowShelf, SR, 320.0);
        filter.gain.set_value(12.0);
        let gain = sine_gain(&mut filter, 40.0);
        // +12 dB is roughly x4
        assert!(gain > 3.5 && gain < 4.3, "gain {gain}");
    }

    #[test]
    fn test_peaking_cut() {
        let mut filter = Biquad::new(BiquadType::Peaking, SR, 1000.0).with_q(0.5);
        filter.gain.set_value(-40.0);
        assert!(sine_gain(&mut filter, 1000.0) < 0.05);
    }

    #[test]
    fn test_frequency_automation_is_tracked() {
        let mut filter = Biquad::new(BiquadType::LowPass, SR, 22000.0);
        filter.frequency.set_target_at_time(200.0, 0.0, 0.01);
        let mut samples = vec![0.0; 2 * 4800];
        filter.process(&mut samples, &RenderContext::new(0.0, SR));
        assert!((filter.computed_for.0 - 200.0).abs() < 2.0);
    }
}
