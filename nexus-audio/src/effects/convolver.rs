//! Stereo FFT convolution with a uniformly partitioned impulse response
//!
//! Overlap-save with `block`-sized partitions: each input block is transformed
//! once and multiplied against every partition's spectrum from a
//! frequency-domain delay line. Output lags input by one block.

use super::Effect;
use crate::clock::RenderContext;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Default partition size in frames
pub const DEFAULT_BLOCK: usize = 256;

/// Power floor used when normalizing near-silent responses
const MIN_POWER: f32 = 0.000125;
/// Loudness calibration applied to normalized responses
const GAIN_CALIBRATION: f32 = 0.00125;
const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44100.0;

/// Scale that brings an impulse response to a standard loudness
pub fn normalization_scale(channels: &[Vec<f32>; 2], sample_rate: f32) -> f32 {
    let length = channels[0].len().max(channels[1].len());
    if length == 0 {
        return 1.0;
    }
    let energy: f32 = channels.iter().flatten().map(|s| s * s).sum();
    let mut power = (energy / (2 * length) as f32).sqrt();
    if !power.is_finite() || power < MIN_POWER {
        power = MIN_POWER;
    }
    (1.0 / power) * GAIN_CALIBRATION * (GAIN_CALIBRATION_SAMPLE_RATE / sample_rate)
}

pub struct Convolver {
    block: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    /// Spectrum of each impulse response partition, per channel
    partitions: [Vec<Vec<Complex<f32>>>; 2],
    /// Spectra of recent input blocks, a ring indexed from `head`
    history: [Vec<Vec<Complex<f32>>>; 2],
    head: usize,
    /// Last two blocks of input per channel, older block first
    window: [Vec<f32>; 2],
    fill: usize,
    /// Output of the most recently completed block
    output: [Vec<f32>; 2],
    spectrum: Vec<Complex<f32>>,
    accumulator: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    /// Consecutive all-zero input blocks
    silent_blocks: usize,
}

impl Convolver {
    /// Build a convolver from a stereo impulse response
    ///
    /// With `normalize` the response is scaled to a standard loudness, the
    /// way browser convolvers treat generated reverbs.
    pub fn new(ir: [Vec<f32>; 2], sample_rate: f32, block: usize, normalize: bool) -> Self {
        let block = block.max(1);
        let size = block * 2;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let ifft = planner.plan_fft_inverse(size);

        let scale = if normalize {
            normalization_scale(&ir, sample_rate)
        } else {
            1.0
        };

        let length = ir[0].len().max(ir[1].len()).max(1);
        let count = length.div_ceil(block);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(ifft.get_inplace_scratch_len());
        let mut fft_scratch = vec![Complex::new(0.0, 0.0); scratch_len];

        let partitions = [0, 1].map(|ch| {
            (0..count)
                .map(|p| {
                    let mut spectrum = vec![Complex::new(0.0, 0.0); size];
                    for (i, bin) in spectrum.iter_mut().take(block).enumerate() {
                        let sample = ir[ch].get(p * block + i).copied().unwrap_or(0.0);
                        *bin = Complex::new(sample * scale, 0.0);
                    }
                    fft.process_with_scratch(&mut spectrum, &mut fft_scratch);
                    spectrum
                })
                .collect::<Vec<_>>()
        });

        let history = [0, 1].map(|_| vec![vec![Complex::new(0.0, 0.0); size]; count]);

        Self {
            block,
            fft,
            ifft,
            partitions,
            history,
            head: 0,
            window: [vec![0.0; size], vec![0.0; size]],
            fill: 0,
            output: [vec![0.0; block], vec![0.0; block]],
            spectrum: vec![Complex::new(0.0, 0.0); size],
            accumulator: vec![Complex::new(0.0, 0.0); size],
            fft_scratch,
            silent_blocks: 0,
        }
    }

    /// Processing latency in frames
    pub fn latency(&self) -> usize {
        self.block
    }

    /// Number of impulse response partitions
    pub fn partition_count(&self) -> usize {
        self.partitions[0].len()
    }

    fn compute_block(&mut self) {
        let block = self.block;
        let count = self.partition_count();

        let silent = self
            .window
            .iter()
            .all(|w| w[block..].iter().all(|&s| s == 0.0));
        self.silent_blocks = if silent { self.silent_blocks + 1 } else { 0 };

        // Once the tail has fully drained every history slot is zero
        if self.silent_blocks > count + 1 {
            for out in &mut self.output {
                out.fill(0.0);
            }
            return;
        }

        self.head = (self.head + 1) % count;
        let norm = 1.0 / (2 * block) as f32;

        for ch in 0..2 {
            for (bin, &sample) in self.spectrum.iter_mut().zip(&self.window[ch]) {
                *bin = Complex::new(sample, 0.0);
            }
            self.fft
                .process_with_scratch(&mut self.spectrum, &mut self.fft_scratch);
            self.history[ch][self.head].copy_from_slice(&self.spectrum);

            self.accumulator.fill(Complex::new(0.0, 0.0));
            for (p, partition) in self.partitions[ch].iter().enumerate() {
                let input = &self.history[ch][(self.head + count - p) % count];
                for ((acc, x), h) in self.accumulator.iter_mut().zip(input).zip(partition) {
                    *acc += x * h;
                }
            }
            self.ifft
                .process_with_scratch(&mut self.accumulator, &mut self.fft_scratch);

            for (out, bin) in self.output[ch].iter_mut().zip(&self.accumulator[block..]) {
                *out = bin.re * norm;
            }
            self.window[ch].copy_within(block.., 0);
        }
    }
}

impl Effect for Convolver {
    fn process(&mut self, samples: &mut [f32], _ctx: &RenderContext) {
        for frame in samples.chunks_mut(2) {
            if frame.len() != 2 {
                continue;
            }
            let slot = self.block + self.fill;
            self.window[0][slot] = frame[0];
            self.window[1][slot] = frame[1];
            frame[0] = self.output[0][self.fill];
            frame[1] = self.output[1][self.fill];

            self.fill += 1;
            if self.fill == self.block {
                self.compute_block();
                self.fill = 0;
            }
        }
    }

    fn reset(&mut self) {
        for ch in 0..2 {
            self.window[ch].fill(0.0);
            self.output[ch].fill(0.0);
            for spectrum in &mut self.history[ch] {
                spectrum.fill(Complex::new(0.0, 0.0));
            }
        }
        self.fill = 0;
        self.silent_blocks = 0;
    }

    fn name(&self) -> &'static str {
        "Convolver"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse_response(convolver: &mut Convolver, frames: usize) -> Vec<f32> {
        let mut samples = vec![0.0; frames * 2];
        samples[0] = 1.0;
        samples[1] = 1.0;
        convolver.process(&mut samples, &RenderContext::new(0.0, 44100.0));
        samples.chunks(2).map(|f| f[0]).collect()
    }

    #[test]
    fn test_delta_response_delays_by_one_block() {
        let mut convolver = Convolver::new([vec![1.0], vec![1.0]], 44100.0, 4, false);
        let out = impulse_response(&mut convolver, 12);
        assert!((out[4] - 1.0).abs() < 1e-5);
        for (i, s) in out.iter().enumerate() {
            if i != 4 {
                assert!(s.abs() < 1e-5, "frame {i} = {s}");
            }
        }
    }

    #[test]
    fn test_later_partitions_contribute() {
        let mut ir = vec![0.0; 8];
        ir[5] = 0.5;
        let mut convolver = Convolver::new([ir.clone(), ir], 44100.0, 4, false);
        assert_eq!(convolver.partition_count(), 2);
        let out = impulse_response(&mut convolver, 16);
        assert!((out[9] - 0.5).abs() < 1e-5);
        assert!(out[..9].iter().all(|s| s.abs() < 1e-5));
    }

    #[test]
    fn test_normalization_scale() {
        let ir = [vec![1.0; 4], vec![1.0; 4]];
        assert!((normalization_scale(&ir, 44100.0) - 0.00125).abs() < 1e-7);
        assert!((normalization_scale(&ir, 88200.0) - 0.000625).abs() < 1e-7);
        let silent = [vec![0.0; 4], vec![0.0; 4]];
        assert!((normalization_scale(&silent, 44100.0) - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_tail_drains_to_silence() {
        let mut convolver = Convolver::new([vec![1.0, 0.5], vec![1.0, 0.5]], 44100.0, 4, false);
        impulse_response(&mut convolver, 8);
        let mut samples = vec![0.0; 2 * 64];
        convolver.process(&mut samples, &RenderContext::new(0.0, 44100.0));
        assert!(samples.iter().all(|s| s.abs() < 1e-6));
    }
}
