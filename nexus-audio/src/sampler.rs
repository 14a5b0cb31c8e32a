//! One-shot sample pads
//!
//! Each mixer side has a bank of four pads. Triggering a loaded pad starts a
//! fresh generator that plays the sample once; overlapping triggers layer.
//! The bank's output joins its deck post-chain, so it follows the channel
//! fader, the crossfader and the reverb send.

use std::sync::Arc;

use tracing::debug;

use crate::buffer::AudioBuffer;
use crate::clock::RenderContext;
use crate::generator::BufferSource;

pub const SAMPLER_PADS: usize = 4;
/// Voices beyond this steal the oldest
pub const MAX_VOICES: usize = 16;
/// Display names are cut to this many characters
pub const PAD_NAME_CHARS: usize = 8;

#[derive(Clone)]
pub struct SamplerPad {
    pub buffer: Arc<AudioBuffer>,
    pub name: String,
}

pub struct SamplerBank {
    pads: [Option<SamplerPad>; SAMPLER_PADS],
    voices: Vec<BufferSource>,
    scratch: Vec<f32>,
}

impl Default for SamplerBank {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplerBank {
    pub fn new() -> Self {
        Self {
            pads: Default::default(),
            voices: Vec::with_capacity(MAX_VOICES),
            scratch: Vec::new(),
        }
    }

    pub fn load_pad(&mut self, index: usize, buffer: Arc<AudioBuffer>, name: &str) {
        let Some(slot) = self.pads.get_mut(index) else {
            return;
        };
        let name: String = name.chars().take(PAD_NAME_CHARS).collect();
        debug!(pad = index, name = %name, "Sample loaded");
        *slot = Some(SamplerPad { buffer, name });
    }

    pub fn pad(&self, index: usize) -> Option<&SamplerPad> {
        self.pads.get(index).and_then(Option::as_ref)
    }

    /// Names for display, `None` for empty pads
    pub fn pad_names(&self) -> [Option<String>; SAMPLER_PADS] {
        std::array::from_fn(|i| self.pad(i).map(|pad| pad.name.clone()))
    }

    /// Fire a pad at `now`; returns false for an empty pad
    pub fn trigger(&mut self, index: usize, now: f64) -> bool {
        let Some(pad) = self.pad(index) else {
            return false;
        };
        let voice = BufferSource::start(Arc::clone(&pad.buffer), now, 0.0, 1.0);
        if self.voices.len() >= MAX_VOICES {
            self.voices.remove(0);
        }
        self.voices.push(voice);
        true
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Add every sounding voice into `out`
    pub fn render(&mut self, out: &mut [f32], ctx: &RenderContext) {
        if self.voices.is_empty() {
            return;
        }
        if self.scratch.len() < out.len() {
            self.scratch.resize(out.len(), 0.0);
        }
        let scratch = &mut self.scratch[..out.len()];
        for voice in self.voices.iter_mut() {
            voice.render(scratch, ctx);
            for (o, s) in out.iter_mut().zip(scratch.iter()) {
                *o += *s;
            }
        }
        self.voices.retain(|voice| !voice.is_finished());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click(frames: usize) -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer::from_fn(frames, 1000, |_| (0.25, 0.25)))
    }

    #[test]
    fn test_empty_pad_does_nothing() {
        let mut bank = SamplerBank::new();
        assert!(!bank.trigger(0, 0.0));
        assert!(!bank.trigger(7, 0.0));
        assert_eq!(bank.active_voices(), 0);
    }

    #[test]
    fn test_plays_once_and_retires() {
        let mut bank = SamplerBank::new();
        bank.load_pad(1, click(20), "snare");
        assert!(bank.trigger(1, 0.0));

        let mut out = vec![0.0; 20];
        bank.render(&mut out, &RenderContext::new(0.0, 1000.0));
        assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
        assert_eq!(bank.active_voices(), 1);

        let mut out = vec![0.0; 60];
        bank.render(&mut out, &RenderContext::new(0.01, 1000.0));
        assert!(out[40..].iter().all(|&s| s == 0.0));
        assert_eq!(bank.active_voices(), 0);
    }

    #[test]
    fn test_voices_layer() {
        let mut bank = SamplerBank::new();
        bank.load_pad(0, click(100), "kick");
        bank.trigger(0, 0.0);
        bank.trigger(0, 0.0);
        let mut out = vec![0.1; 10];
        bank.render(&mut out, &RenderContext::new(0.0, 1000.0));
        assert!(out.iter().all(|&s| (s - 0.6).abs() < 1e-6));
    }

    #[test]
    fn test_names_are_truncated() {
        let mut bank = SamplerBank::new();
        bank.load_pad(3, click(10), "airhorn_long.wav");
        assert_eq!(bank.pad_names()[3].as_deref(), Some("airhorn_"));
        assert!(bank.pad_names()[0].is_none());
    }

    #[test]
    fn test_voice_cap() {
        let mut bank = SamplerBank::new();
        bank.load_pad(0, click(1000), "hat");
        for _ in 0..MAX_VOICES + 4 {
            bank.trigger(0, 0.0);
        }
        assert_eq!(bank.active_voices(), MAX_VOICES);
    }
}
