//! Single-use buffer playback generator
//!
//! A `BufferSource` is created already started, plays its buffer at a signed
//! automatable rate, and is discarded once stopped. It can never be restarted:
//! the transport replaces it with a fresh generator on every jump.

use std::sync::Arc;

use crate::buffer::AudioBuffer;
use crate::clock::RenderContext;
use crate::param::AudioParam;

/// Lowest and highest playback rate a generator accepts (negative plays in reverse)
pub const MAX_PLAYBACK_RATE: f32 = 8.0;

/// One-shot playback of a shared buffer
pub struct BufferSource {
    buffer: Arc<AudioBuffer>,
    playback_rate: AudioParam,
    /// Loop bounds in buffer frames
    loop_frames: Option<(f64, f64)>,
    start_time: f64,
    stop_time: Option<f64>,
    /// Read position in buffer frames
    playhead: f64,
    finished: bool,
}

impl BufferSource {
    /// Create a generator that starts at `when`, reading from `offset` seconds
    pub fn start(buffer: Arc<AudioBuffer>, when: f64, offset: f64, rate: f32) -> Self {
        let offset = if offset.is_finite() { offset } else { 0.0 };
        let playhead = (offset * buffer.sample_rate() as f64).clamp(0.0, buffer.frames() as f64);
        Self {
            buffer,
            playback_rate: AudioParam::new(rate, -MAX_PLAYBACK_RATE, MAX_PLAYBACK_RATE),
            loop_frames: None,
            start_time: when,
            stop_time: None,
            playhead,
            finished: false,
        }
    }

    /// Native loop between two positions in seconds, or `None` to play through
    pub fn set_loop(&mut self, region: Option<(f64, f64)>) {
        let sr = self.buffer.sample_rate() as f64;
        let frames = self.buffer.frames() as f64;
        self.loop_frames = region
            .map(|(start, end)| ((start * sr).clamp(0.0, frames), (end * sr).clamp(0.0, frames)))
            .filter(|(start, end)| end > start);
    }

    pub fn playback_rate(&self) -> &AudioParam {
        &self.playback_rate
    }

    pub fn playback_rate_mut(&mut self) -> &mut AudioParam {
        &mut self.playback_rate
    }

    /// Schedule the end of playback; an earlier stop always wins
    pub fn stop(&mut self, when: f64) {
        self.stop_time = Some(match self.stop_time {
            Some(existing) => existing.min(when),
            None => when,
        });
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Current read position in seconds
    pub fn position(&self) -> f64 {
        self.playhead / self.buffer.sample_rate() as f64
    }

    /// Render into a stereo interleaved block, overwriting it
    pub fn render(&mut self, out: &mut [f32], ctx: &RenderContext) {
        let step_scale = self.buffer.sample_rate() as f64 / ctx.sample_rate as f64;
        let frames = self.buffer.frames() as f64;

        for (i, frame) in out.chunks_mut(2).enumerate() {
            let t = ctx.frame_time(i);
            if self.finished || t < self.start_time {
                frame.fill(0.0);
                continue;
            }
            if self.stop_time.is_some_and(|stop| t >= stop) {
                self.finished = true;
                frame.fill(0.0);
                continue;
            }

            let (l, r) = self.read_interpolated();
            frame[0] = l;
            if frame.len() > 1 {
                frame[1] = r;
            }

            let rate = self.playback_rate.value_at(t) as f64;
            self.playhead += rate * step_scale;

            match self.loop_frames {
                Some((loop_start, loop_end)) => {
                    let length = loop_end - loop_start;
                    if (rate >= 0.0 && self.playhead >= loop_end)
                        || (rate < 0.0 && self.playhead < loop_start)
                    {
                        self.playhead = loop_start + (self.playhead - loop_start).rem_euclid(length);
                    }
                }
                None => {
                    if self.playhead >= frames || self.playhead < 0.0 {
                        self.playhead = self.playhead.clamp(0.0, frames);
                        self.finished = true;
                    }
                }
            }
        }

        self.playback_rate.prune(ctx.end_time(out.len() / 2));
    }

    /// Linear interpolation between neighbouring frames
    #[inline]
    fn read_interpolated(&self) -> (f32, f32) {
        let index = self.playhead.floor();
        let frac = (self.playhead - index) as f32;
        let index = index as usize;
        let (l0, r0) = self.buffer.frame(index);
        let next = match self.loop_frames {
            Some((_, loop_end)) if index + 1 >= loop_end as usize => {
                self.loop_frames.map(|(start, _)| start as usize).unwrap_or(index + 1)
            }
            _ => index + 1,
        };
        let (l1, r1) = self.buffer.frame(next);
        (l0 + (l1 - l0) * frac, r0 + (r1 - r0) * frac)
    }
}
