//! FFT-based analyser tap for real-time metering

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Samples per analysis frame
pub const FFT_SIZE: usize = 256;
/// Frequency bins reported (half the FFT size)
pub const FREQUENCY_BINS: usize = FFT_SIZE / 2;
/// Level mapped to byte 0
pub const MIN_DECIBELS: f32 = -100.0;
/// Level mapped to byte 255
pub const MAX_DECIBELS: f32 = -30.0;
/// Weight given to the previous frame when smoothing magnitudes
pub const SMOOTHING_TIME_CONSTANT: f32 = 0.5;

/// Frequency data for visualization
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpectrumData {
    /// Level per bin, `MIN_DECIBELS..MAX_DECIBELS` mapped onto 0 - 255
    pub bins: [u8; FREQUENCY_BINS],
    /// Peak absolute sample in the analysis window
    pub peak: f32,
}

impl Default for SpectrumData {
    fn default() -> Self {
        Self {
            bins: [0; FREQUENCY_BINS],
            peak: 0.0,
        }
    }
}

/// Convert a linear magnitude to a byte on the analyser's dB scale
pub fn magnitude_to_byte(magnitude: f32) -> u8 {
    if magnitude <= 0.0 || !magnitude.is_finite() {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = 255.0 / (MAX_DECIBELS - MIN_DECIBELS) * (db - MIN_DECIBELS);
    scaled.floor().clamp(0.0, 255.0) as u8
}

/// Real-time analyser over the most recent `FFT_SIZE` mono samples
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Most recent samples, written circularly
    history: [f32; FFT_SIZE],
    write_pos: usize,
    smoothed: [f32; FREQUENCY_BINS],
    /// Pre-allocated FFT buffer to avoid allocation in frequency_data()
    fft_buffer: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        // Blackman window
        let n = FFT_SIZE as f32;
        let window: Vec<f32> = (0..FFT_SIZE)
            .map(|i| {
                let x = i as f32 / n;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();

        Self {
            fft,
            window,
            history: [0.0; FFT_SIZE],
            write_pos: 0,
            smoothed: [0.0; FREQUENCY_BINS],
            fft_buffer: vec![Complex::new(0.0, 0.0); FFT_SIZE],
        }
    }

    /// Feed stereo interleaved samples (downmixed to mono)
    pub fn push_stereo(&mut self, samples: &[f32]) {
        for frame in samples.chunks_exact(2) {
            self.push((frame[0] + frame[1]) * 0.5);
        }
    }

    #[inline]
    pub fn push(&mut self, sample: f32) {
        self.history[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % FFT_SIZE;
    }

    /// Peak absolute level over the analysis window
    pub fn peak_level(&self) -> f32 {
        self.history.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }

    /// Analyse the current window, updating the smoothed magnitudes
    pub fn frequency_data(&mut self) -> SpectrumData {
        // Oldest sample first
        for i in 0..FFT_SIZE {
            let sample = self.history[(self.write_pos + i) % FFT_SIZE];
            self.fft_buffer[i] = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.fft_buffer);

        let mut bins = [0u8; FREQUENCY_BINS];
        let scale = 1.0 / FFT_SIZE as f32;
        for ((bin, smoothed), value) in bins
            .iter_mut()
            .zip(self.smoothed.iter_mut())
            .zip(self.fft_buffer.iter())
        {
            let magnitude = value.norm() * scale;
            *smoothed =
                SMOOTHING_TIME_CONSTANT * *smoothed + (1.0 - SMOOTHING_TIME_CONSTANT) * magnitude;
            if !smoothed.is_finite() {
                *smoothed = 0.0;
            }
            *bin = magnitude_to_byte(*smoothed);
        }

        SpectrumData {
            bins,
            peak: self.peak_level(),
        }
    }

    /// Forget history and smoothing state
    pub fn reset(&mut self) {
        self.history = [0.0; FFT_SIZE];
        self.smoothed = [0.0; FREQUENCY_BINS];
        self.write_pos = 0;
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
