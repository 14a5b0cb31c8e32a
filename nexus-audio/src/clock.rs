//! Audio clock - the time base every ramp and generator start is stamped against
//!
//! The render callback advances the clock by the number of frames it produced.
//! Control code reads `now()` to timestamp automation, so scheduled events land
//! on exact frame positions regardless of when the control thread woke up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Sample-counting clock shared between the render path and the control path
#[derive(Debug)]
pub struct AudioClock {
    sample_rate: u32,
    frames: AtomicU64,
}

impl AudioClock {
    /// Create a clock at time zero
    pub fn new(sample_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            sample_rate: sample_rate.max(1),
            frames: AtomicU64::new(0),
        })
    }

    /// Output sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames rendered so far
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Current audio time in seconds
    pub fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Advance the clock after a block has been rendered
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }

    /// Context describing a block that starts at the current time
    pub fn block(&self) -> RenderContext {
        RenderContext::new(self.now(), self.sample_rate as f32)
    }
}

/// Timing information for one render block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderContext {
    /// Audio time of the first frame in the block
    pub start_time: f64,
    /// Output sample rate in Hz
    pub sample_rate: f32,
}

impl RenderContext {
    pub fn new(start_time: f64, sample_rate: f32) -> Self {
        Self {
            start_time,
            sample_rate,
        }
    }

    /// Audio time of frame `index` within the block
    #[inline]
    pub fn frame_time(&self, index: usize) -> f64 {
        self.start_time + index as f64 / self.sample_rate as f64
    }

    /// Audio time just after the last frame of a block of `frames` frames
    #[inline]
    pub fn end_time(&self, frames: usize) -> f64 {
        self.frame_time(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_in_frames() {
        let clock = AudioClock::new(48000);
        assert_eq!(clock.now(), 0.0);
        clock.advance(24000);
        assert!((clock.now() - 0.5).abs() < 1e-12);
        assert_eq!(clock.frames(), 24000);
    }

    #[test]
    fn test_block_frame_times() {
        let clock = AudioClock::new(48000);
        clock.advance(48000);
        let ctx = clock.block();
        assert!((ctx.frame_time(0) - 1.0).abs() < 1e-12);
        assert!((ctx.end_time(480) - 1.01).abs() < 1e-9);
    }
}
