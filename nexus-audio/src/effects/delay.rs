//! Fractional delay line and the feedback echo built on it

use super::Effect;
use crate::clock::RenderContext;
use crate::param::AudioParam;

/// Stereo circular buffer read at fractional delays
pub struct DelayLine {
    /// Stereo interleaved: L,R,L,R,...
    buffer: Vec<f32>,
    /// Buffer length in stereo frames
    frames: usize,
    /// Next frame to be written
    write_pos: usize,
}

impl DelayLine {
    /// Create a line able to hold `max_delay_secs` of audio
    pub fn new(sample_rate: f32, max_delay_secs: f32) -> Self {
        // One spare frame so the longest delay never reads the slot being written
        let frames = ((sample_rate * max_delay_secs).ceil() as usize).max(1) + 2;
        Self {
            buffer: vec![0.0; frames * 2],
            frames,
            write_pos: 0,
        }
    }

    /// Longest delay that can be read, in frames
    pub fn max_delay_frames(&self) -> f32 {
        (self.frames - 2) as f32
    }

    /// Read the frame written `delay_frames` ago (linear interpolation)
    ///
    /// Delays below one frame are raised to one so a feedback path always has
    /// a frame of latency.
    #[inline]
    pub fn read(&self, delay_frames: f32) -> (f32, f32) {
        let delay = delay_frames.clamp(1.0, self.max_delay_frames().max(1.0));
        let int_delay = delay as usize;
        let frac = delay - int_delay as f32;

        let newer = (self.write_pos + self.frames - int_delay) % self.frames;
        let older = (newer + self.frames - 1) % self.frames;

        let (l0, r0) = (self.buffer[newer * 2], self.buffer[newer * 2 + 1]);
        let (l1, r1) = (self.buffer[older * 2], self.buffer[older * 2 + 1]);
        (l0 + (l1 - l0) * frac, r0 + (r1 - r0) * frac)
    }

    /// Push a frame and advance
    #[inline]
    pub fn write(&mut self, left: f32, right: f32) {
        self.buffer[self.write_pos * 2] = left;
        self.buffer[self.write_pos * 2 + 1] = right;
        self.write_pos = (self.write_pos + 1) % self.frames;
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Maximum echo time in seconds
pub const MAX_ECHO_SECS: f32 = 2.0;

/// Feedback echo with separate dry and wet gains
///
/// The input feeds the line together with the fed-back output; the wet tap
/// is the line output.
pub struct Echo {
    sample_rate: f32,
    line: DelayLine,
    /// Delay time in seconds
    pub time: AudioParam,
    pub feedback: AudioParam,
    pub wet: AudioParam,
    pub dry: AudioParam,
}

impl Echo {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            line: DelayLine::new(sample_rate, MAX_ECHO_SECS),
            time: AudioParam::new(0.33, 0.0, MAX_ECHO_SECS),
            feedback: AudioParam::new(0.4, 0.0, 0.95),
            wet: AudioParam::new(0.0, 0.0, 1.0),
            dry: AudioParam::new(1.0, 0.0, 1.0),
        }
    }
}

impl Effect for Echo {
    fn process(&mut self, samples: &mut [f32], ctx: &RenderContext) {
        for (i, frame) in samples.chunks_mut(2).enumerate() {
            if frame.len() != 2 {
                continue;
            }
            let t = ctx.frame_time(i);
            let delay_frames = self.time.value_at(t) * self.sample_rate;
            let feedback = self.feedback.value_at(t);
            let (dl, dr) = self.line.read(delay_frames);

            let (l, r) = (frame[0], frame[1]);
            self.line.write(l + dl * feedback, r + dr * feedback);

            let wet = self.wet.value_at(t);
            let dry = self.dry.value_at(t);
            frame[0] = l * dry + dl * wet;
            frame[1] = r * dry + dr * wet;
        }

        let end = ctx.end_time(samples.len() / 2);
        self.time.prune(end);
        self.feedback.prune(end);
        self.wet.prune(end);
        self.dry.prune(end);
    }

    fn reset(&mut self) {
        self.line.clear();
    }

    fn name(&self) -> &'static str {
        "Echo"
    }
}
