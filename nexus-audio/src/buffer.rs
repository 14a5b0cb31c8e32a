//! Decoded audio held in memory

use thiserror::Error;

/// Errors raised when building an audio buffer
#[derive(Debug, Error, PartialEq)]
pub enum BufferError {
    #[error("buffer has no channels")]
    NoChannels,
    #[error("sample count {samples} is not a multiple of {channels} channels")]
    Misaligned { samples: usize, channels: usize },
    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),
}

/// Stereo interleaved audio at a fixed sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Build a stereo buffer from interleaved samples with any channel count
    ///
    /// Mono is duplicated to both sides; beyond two channels only the first
    /// pair is kept.
    pub fn from_interleaved(
        samples: Vec<f32>,
        channels: usize,
        sample_rate: u32,
    ) -> Result<Self, BufferError> {
        if channels == 0 {
            return Err(BufferError::NoChannels);
        }
        if sample_rate == 0 {
            return Err(BufferError::InvalidSampleRate(sample_rate));
        }
        if samples.len() % channels != 0 {
            return Err(BufferError::Misaligned {
                samples: samples.len(),
                channels,
            });
        }

        let samples = match channels {
            2 => samples,
            1 => samples.iter().flat_map(|&s| [s, s]).collect(),
            _ => samples
                .chunks_exact(channels)
                .flat_map(|frame| [frame[0], frame[1]])
                .collect(),
        };

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Build a stereo buffer from a per-frame generator
    pub fn from_fn(frames: usize, sample_rate: u32, mut f: impl FnMut(usize) -> (f32, f32)) -> Self {
        let mut samples = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let (l, r) = f(i);
            samples.push(l);
            samples.push(r);
        }
        Self {
            samples,
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn silence(frames: usize, sample_rate: u32) -> Self {
        Self::from_fn(frames, sample_rate, |_| (0.0, 0.0))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of stereo frames
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Frame at `index`, silent past either end
    #[inline]
    pub fn frame(&self, index: usize) -> (f32, f32) {
        match self.samples.get(index * 2..index * 2 + 2) {
            Some(frame) => (frame[0], frame[1]),
            None => (0.0, 0.0),
        }
    }
}
