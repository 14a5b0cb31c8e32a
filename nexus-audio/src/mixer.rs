//! Mixer implementation - crossfader, channel gains, reverb sends and master

use std::f32::consts::FRAC_PI_2;

use crate::clock::RenderContext;
use crate::deck::DeckId;
use crate::effects::Effect;
use crate::param::{sanitize, AudioParam};
use crate::reverb::ReverbBus;

/// Smoothing for crossfader, channel and master gains
pub const MIX_TIME_CONSTANT: f64 = 0.05;
/// Smoothing for reverb sends
pub const SEND_TIME_CONSTANT: f64 = 0.1;
pub const MAX_MASTER_VOLUME: f32 = 2.0;

/// Equal-power crossfade law
///
/// `cf` runs from -1.0 (all A) to 1.0 (all B); each side is scaled by its
/// channel volume. At centre both sides sit at `cos(pi/4)`.
pub fn crossfade_gains(crossfader: f32, volume_a: f32, volume_b: f32) -> (f32, f32) {
    let x = 0.5 * (crossfader.clamp(-1.0, 1.0) + 1.0);
    let gain_a = (x * FRAC_PI_2).cos() * volume_a;
    let gain_b = ((1.0 - x) * FRAC_PI_2).cos() * volume_b;
    (gain_a, gain_b)
}

/// Mixer for combining deck outputs
pub struct Mixer {
    /// Crossfader position (-1.0 = full A, 0.0 = center, 1.0 = full B)
    crossfader: f32,
    channel_volume: [f32; 2],
    /// Post-crossfade gain per channel
    gain: [AudioParam; 2],
    /// Pre-crossfade reverb send per channel
    send: [AudioParam; 2],
    send_level: [f32; 2],
    master_volume: f32,
    master: AudioParam,
}

impl Default for Mixer {
    fn default() -> Self {
        let (gain_a, gain_b) = crossfade_gains(0.0, 1.0, 1.0);
        Self {
            crossfader: 0.0,
            channel_volume: [1.0; 2],
            gain: [
                AudioParam::new(gain_a, 0.0, 1.0),
                AudioParam::new(gain_b, 0.0, 1.0),
            ],
            send: [AudioParam::new(0.0, 0.0, 1.0), AudioParam::new(0.0, 0.0, 1.0)],
            send_level: [0.0; 2],
            master_volume: 1.0,
            master: AudioParam::new(1.0, 0.0, MAX_MASTER_VOLUME),
        }
    }
}

impl Mixer {
    /// Create a new mixer
    pub fn new() -> Self {
        Self::default()
    }

    /// Set crossfader position (-1.0 to 1.0)
    pub fn set_crossfader(&mut self, now: f64, position: f32) {
        self.crossfader = sanitize(position, self.crossfader, -1.0, 1.0);
        self.update_gains(now);
    }

    /// Move crossfader by delta
    pub fn move_crossfader(&mut self, now: f64, delta: f32) {
        self.set_crossfader(now, self.crossfader + delta);
    }

    pub fn crossfader(&self) -> f32 {
        self.crossfader
    }

    /// Channel fader (0.0 - 1.0)
    pub fn set_channel_volume(&mut self, now: f64, deck: DeckId, volume: f32) {
        let slot = &mut self.channel_volume[deck.index()];
        *slot = sanitize(volume, *slot, 0.0, 1.0);
        self.update_gains(now);
    }

    pub fn channel_volume(&self, deck: DeckId) -> f32 {
        self.channel_volume[deck.index()]
    }

    /// Reverb send level (0.0 - 1.0)
    pub fn set_reverb_send(&mut self, now: f64, deck: DeckId, level: f32) {
        let index = deck.index();
        let level = sanitize(level, self.send_level[index], 0.0, 1.0);
        self.send_level[index] = level;
        self.send[index].set_target_at_time(level, now, SEND_TIME_CONSTANT);
    }

    pub fn reverb_send(&self, deck: DeckId) -> f32 {
        self.send_level[deck.index()]
    }

    pub fn set_master_volume(&mut self, now: f64, volume: f32) {
        self.master_volume = sanitize(volume, self.master_volume, 0.0, MAX_MASTER_VOLUME);
        self.master
            .set_target_at_time(self.master_volume, now, MIX_TIME_CONSTANT);
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    fn update_gains(&mut self, now: f64) {
        let (gain_a, gain_b) = crossfade_gains(
            self.crossfader,
            self.channel_volume[0],
            self.channel_volume[1],
        );
        self.gain[0].set_target_at_time(gain_a, now, MIX_TIME_CONSTANT);
        self.gain[1].set_target_at_time(gain_b, now, MIX_TIME_CONSTANT);
    }

    /// Mix two deck blocks into `output` (all interleaved stereo)
    ///
    /// Sends tap each deck before the crossfader into `send_buffer`, which is
    /// run through the reverb bus and summed into the master.
    pub fn mix(
        &mut self,
        deck_a: &[f32],
        deck_b: &[f32],
        reverb: &mut ReverbBus,
        send_buffer: &mut [f32],
        output: &mut [f32],
        ctx: &RenderContext,
    ) {
        let len = output
            .len()
            .min(deck_a.len())
            .min(deck_b.len())
            .min(send_buffer.len());
        let frames = len / 2;

        for i in 0..frames {
            let t = ctx.frame_time(i);
            let (send_a, send_b) = (self.send[0].value_at(t), self.send[1].value_at(t));
            let (gain_a, gain_b) = (self.gain[0].value_at(t), self.gain[1].value_at(t));
            for ch in 0..2 {
                let idx = i * 2 + ch;
                send_buffer[idx] = deck_a[idx] * send_a + deck_b[idx] * send_b;
                output[idx] = deck_a[idx] * gain_a + deck_b[idx] * gain_b;
            }
        }

        reverb.process(&mut send_buffer[..frames * 2], ctx);

        for i in 0..frames {
            let master = self.master.value_at(ctx.frame_time(i));
            for ch in 0..2 {
                let idx = i * 2 + ch;
                output[idx] = soft_clip((output[idx] + send_buffer[idx]) * master);
            }
        }
        output[frames * 2..].fill(0.0);

        let end = ctx.end_time(frames);
        for param in self.gain.iter_mut().chain(self.send.iter_mut()) {
            param.prune(end);
        }
        self.master.prune(end);
    }
}

/// Soft clip threshold
const SOFT_CLIP_THRESHOLD: f32 = 0.75;
/// Soft clip ceiling
const SOFT_CLIP_CEILING: f32 = 0.89;

/// Gentle soft clipper for the master bus
///
/// Transparent below the threshold, asymptotic to the ceiling above it.
#[inline(always)]
fn soft_clip(x: f32) -> f32 {
    let abs_x = x.abs();
    if abs_x <= SOFT_CLIP_THRESHOLD {
        return x;
    }
    let knee_width = SOFT_CLIP_CEILING - SOFT_CLIP_THRESHOLD;
    let ratio = (abs_x - SOFT_CLIP_THRESHOLD) / knee_width;
    let compressed = SOFT_CLIP_THRESHOLD + knee_width * (1.0 - (-ratio * 3.0).exp());
    x.signum() * compressed.min(SOFT_CLIP_CEILING)
}
