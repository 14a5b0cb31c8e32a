//! Per-deck signal chain
//!
//! Fixed topology, generator first:
//! trim -> EQ (low shelf, peaking, high shelf) -> flanger -> (+ noise) ->
//! high-pass -> low-pass -> distortion -> gate -> echo -> volume -> pan ->
//! analyser tap.
//!
//! Every setter glides its parameter with an exponential approach from the
//! current audio time; none of them jump.

use nexus_analysis::{SpectrumAnalyzer, SpectrumData};

use crate::clock::RenderContext;
use crate::effects::{
    apply_gain, Biquad, BiquadType, Distortion, Echo, Effect, Flanger, NoiseSource, StereoPanner,
};
use crate::param::{sanitize, AudioParam};

/// Glide for gain-like controls
pub const GAIN_TIME_CONSTANT: f64 = 0.05;
/// Glide for tone, pan and effect controls
pub const TONE_TIME_CONSTANT: f64 = 0.1;

pub const MAX_TRIM: f32 = 2.0;
pub const MAX_VOLUME: f32 = 1.5;
pub const MIN_EQ_DB: f32 = -40.0;
pub const MAX_EQ_DB: f32 = 15.0;

const LOW_SHELF_HZ: f32 = 320.0;
const MID_PEAK_HZ: f32 = 1000.0;
const MID_PEAK_Q: f32 = 0.5;
const HIGH_SHELF_HZ: f32 = 3200.0;
/// Low-pass cutoff when the filter knob is centred or above
pub const FILTER_OPEN_HZ: f32 = 22000.0;
const FILTER_FLOOR_HZ: f32 = 20.0;

/// EQ band selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqBand {
    Low,
    Mid,
    High,
}

/// Map the one-knob filter position to `(low_pass_hz, high_pass_hz)`
///
/// Below centre the low-pass sweeps 20 Hz -> 22 kHz exponentially with the
/// high-pass parked at 0 Hz; above centre the high-pass sweeps the same
/// range with the low-pass parked open. Centre is transparent.
pub fn filter_cutoffs(value: f32) -> (f32, f32) {
    let value = value.clamp(0.0, 1.0);
    let sweep = |normalized: f32| FILTER_FLOOR_HZ * (FILTER_OPEN_HZ / FILTER_FLOOR_HZ).powf(normalized);
    if value < 0.5 {
        (sweep(value * 2.0), 0.0)
    } else if value == 0.5 {
        (FILTER_OPEN_HZ, 0.0)
    } else {
        (FILTER_OPEN_HZ, sweep((value - 0.5) * 2.0))
    }
}

/// Dry gain paired with an echo wet level
pub fn echo_dry_for_wet(wet: f32) -> f32 {
    1.0 - wet * 0.5
}

/// Last value requested for each control, for display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainSettings {
    pub gain: f32,
    pub eq_low: f32,
    pub eq_mid: f32,
    pub eq_high: f32,
    pub filter: f32,
    pub distortion: f32,
    pub echo_wet: f32,
    pub echo_time: f32,
    pub noise: f32,
    pub flange: f32,
    pub volume: f32,
    pub pan: f32,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            gain: 1.0,
            eq_low: 0.0,
            eq_mid: 0.0,
            eq_high: 0.0,
            filter: 0.5,
            distortion: 0.0,
            echo_wet: 0.0,
            echo_time: 0.33,
            noise: 0.0,
            flange: 0.0,
            volume: 1.0,
            pan: 0.0,
        }
    }
}

pub struct SignalChain {
    trim: AudioParam,
    eq_low: Biquad,
    eq_mid: Biquad,
    eq_high: Biquad,
    flanger: Flanger,
    noise: NoiseSource,
    highpass: Biquad,
    lowpass: Biquad,
    distortion: Distortion,
    gate: AudioParam,
    echo: Echo,
    volume: AudioParam,
    panner: StereoPanner,
    analyser: SpectrumAnalyzer,
    settings: ChainSettings,
}

impl SignalChain {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            trim: AudioParam::new(1.0, 0.0, MAX_TRIM),
            eq_low: Biquad::new(BiquadType::LowShelf, sample_rate, LOW_SHELF_HZ),
            eq_mid: Biquad::new(BiquadType::Peaking, sample_rate, MID_PEAK_HZ).with_q(MID_PEAK_Q),
            eq_high: Biquad::new(BiquadType::HighShelf, sample_rate, HIGH_SHELF_HZ),
            flanger: Flanger::new(sample_rate),
            noise: NoiseSource::new(sample_rate),
            highpass: Biquad::new(BiquadType::HighPass, sample_rate, 0.0),
            lowpass: Biquad::new(BiquadType::LowPass, sample_rate, FILTER_OPEN_HZ),
            distortion: Distortion::new(),
            gate: AudioParam::new(1.0, 0.0, 1.0),
            echo: Echo::new(sample_rate),
            volume: AudioParam::new(1.0, 0.0, MAX_VOLUME),
            panner: StereoPanner::new(),
            analyser: SpectrumAnalyzer::new(),
            settings: ChainSettings::default(),
        }
    }

    pub fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    /// Gate gain, driven by the beat-gate scheduler
    pub fn gate_mut(&mut self) -> &mut AudioParam {
        &mut self.gate
    }

    pub fn set_gain(&mut self, now: f64, value: f32) {
        let value = sanitize(value, self.settings.gain, 0.0, MAX_TRIM);
        self.settings.gain = value;
        self.trim.set_target_at_time(value, now, GAIN_TIME_CONSTANT);
    }

    /// Set an EQ band's gain in dB
    pub fn set_eq(&mut self, now: f64, band: EqBand, db: f32) {
        let (filter, setting) = match band {
            EqBand::Low => (&mut self.eq_low, &mut self.settings.eq_low),
            EqBand::Mid => (&mut self.eq_mid, &mut self.settings.eq_mid),
            EqBand::High => (&mut self.eq_high, &mut self.settings.eq_high),
        };
        let db = sanitize(db, *setting, MIN_EQ_DB, MAX_EQ_DB);
        *setting = db;
        filter.gain.set_target_at_time(db, now, TONE_TIME_CONSTANT);
    }

    /// One-knob filter: 0.0 closes the low-pass, 1.0 closes the high-pass
    pub fn set_filter(&mut self, now: f64, value: f32) {
        let value = sanitize(value, self.settings.filter, 0.0, 1.0);
        self.settings.filter = value;
        let (lp, hp) = filter_cutoffs(value);
        self.lowpass
            .frequency
            .set_target_at_time(lp, now, TONE_TIME_CONSTANT);
        self.highpass
            .frequency
            .set_target_at_time(hp, now, TONE_TIME_CONSTANT);
    }

    pub fn set_distortion(&mut self, value: f32) {
        let value = sanitize(value, self.settings.distortion, 0.0, 1.0);
        self.settings.distortion = value;
        self.distortion.set_amount(value);
    }

    /// Echo wet level and delay time (seconds); dry dips as wet rises
    pub fn set_delay(&mut self, now: f64, wet: f32, time: f32) {
        let wet = sanitize(wet, self.settings.echo_wet, 0.0, 1.0);
        let time = sanitize(time, self.settings.echo_time, 0.0, crate::effects::MAX_ECHO_SECS);
        self.settings.echo_wet = wet;
        self.settings.echo_time = time;
        self.echo.wet.set_target_at_time(wet, now, TONE_TIME_CONSTANT);
        self.echo
            .dry
            .set_target_at_time(echo_dry_for_wet(wet), now, TONE_TIME_CONSTANT);
        self.echo.time.set_target_at_time(time, now, TONE_TIME_CONSTANT);
    }

    pub fn set_noise(&mut self, now: f64, value: f32) {
        let value = sanitize(value, self.settings.noise, 0.0, 1.0);
        self.settings.noise = value;
        self.noise.gain.set_target_at_time(value, now, TONE_TIME_CONSTANT);
    }

    pub fn set_flange(&mut self, now: f64, value: f32) {
        let value = sanitize(value, self.settings.flange, 0.0, 1.0);
        self.settings.flange = value;
        self.flanger.wet.set_target_at_time(value, now, TONE_TIME_CONSTANT);
    }

    pub fn set_volume(&mut self, now: f64, value: f32) {
        let value = sanitize(value, self.settings.volume, 0.0, MAX_VOLUME);
        self.settings.volume = value;
        self.volume.set_target_at_time(value, now, GAIN_TIME_CONSTANT);
    }

    pub fn set_pan(&mut self, now: f64, value: f32) {
        let value = sanitize(value, self.settings.pan, -1.0, 1.0);
        self.settings.pan = value;
        self.panner.pan.set_target_at_time(value, now, TONE_TIME_CONSTANT);
    }

    /// Run a block of generator output through the chain in place
    pub fn process(&mut self, samples: &mut [f32], ctx: &RenderContext) {
        apply_gain(samples, &mut self.trim, ctx);
        self.eq_low.process(samples, ctx);
        self.eq_mid.process(samples, ctx);
        self.eq_high.process(samples, ctx);
        self.flanger.process(samples, ctx);
        self.noise.process(samples, ctx);
        self.highpass.process(samples, ctx);
        self.lowpass.process(samples, ctx);
        self.distortion.process(samples, ctx);
        apply_gain(samples, &mut self.gate, ctx);
        self.echo.process(samples, ctx);
        apply_gain(samples, &mut self.volume, ctx);
        self.panner.process(samples, ctx);
        self.analyser.push_stereo(samples);
    }

    /// Analyse the most recent output
    pub fn frequency_data(&mut self) -> SpectrumData {
        self.analyser.frequency_data()
    }

    /// Clear filter memories and delay lines
    pub fn reset(&mut self) {
        self.eq_low.reset();
        self.eq_mid.reset();
        self.eq_high.reset();
        self.flanger.reset();
        self.highpass.reset();
        self.lowpass.reset();
        self.distortion.reset();
        self.echo.reset();
        self.analyser.reset();
    }

    #[cfg(test)]
    pub(crate) fn filter_targets(&self) -> (f32, f32) {
        (
            self.lowpass.frequency.destination(),
            self.highpass.frequency.destination(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_mapping_endpoints() {
        let (lp, hp) = filter_cutoffs(0.0);
        assert!((lp - 20.0).abs() < 1e-3);
        assert_eq!(hp, 0.0);

        assert_eq!(filter_cutoffs(0.5), (22000.0, 0.0));

        let (lp, hp) = filter_cutoffs(1.0);
        assert_eq!(lp, 22000.0);
        assert!((hp - 22000.0).abs() < 0.5);
    }

    #[test]
    fn test_filter_mapping_is_exponential() {
        // A quarter turn is the geometric mean of 20 Hz and 22 kHz
        let (lp, _) = filter_cutoffs(0.25);
        assert!((lp - (20.0f32 * 22000.0).sqrt()).abs() < 0.5);
        let (_, hp) = filter_cutoffs(0.75);
        assert!((hp - (20.0f32 * 22000.0).sqrt()).abs() < 0.5);
    }

    #[test]
    fn test_filter_continuity_across_centre() {
        let (lp_below, hp_below) = filter_cutoffs(0.4999);
        let (lp_above, hp_above) = filter_cutoffs(0.5001);
        assert!(lp_below > 21900.0 && lp_above == 22000.0);
        assert!(hp_below == 0.0 && hp_above < 25.0);
    }

    #[test]
    fn test_set_filter_targets() {
        let mut chain = SignalChain::new(48000.0);
        chain.set_filter(0.0, 0.75);
        let (lp, hp) = chain.filter_targets();
        assert_eq!(lp, 22000.0);
        assert!((hp - 663.3).abs() < 0.5);
    }

    #[test]
    fn test_echo_dry_tracks_wet() {
        assert_eq!(echo_dry_for_wet(0.0), 1.0);
        assert_eq!(echo_dry_for_wet(1.0), 0.5);
        let mut chain = SignalChain::new(48000.0);
        chain.set_delay(0.0, 0.6, 0.5);
        assert_eq!(chain.settings().echo_wet, 0.6);
        assert!((chain.echo.dry.destination() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_setters_sanitize() {
        let mut chain = SignalChain::new(48000.0);
        chain.set_volume(0.0, f32::NAN);
        assert_eq!(chain.settings().volume, 1.0);
        chain.set_pan(0.0, -3.0);
        assert_eq!(chain.settings().pan, -1.0);
        chain.set_eq(0.0, EqBand::Mid, 99.0);
        assert_eq!(chain.settings().eq_mid, MAX_EQ_DB);
    }

    #[test]
    fn test_default_chain_is_near_transparent() {
        let mut chain = SignalChain::new(48000.0);
        let mut samples: Vec<f32> = (0..4800)
            .flat_map(|i| {
                let s = 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 48000.0).sin();
                [s, s]
            })
            .collect();
        let input_rms = (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt();
        chain.process(&mut samples, &RenderContext::new(0.0, 48000.0));
        let tail = &samples[4800..];
        let output_rms = (tail.iter().map(|s| s * s).sum::<f32>() / tail.len() as f32).sqrt();
        // Only the distortion's fixed 1/3 scaling remains
        assert!((output_rms / input_rms - 1.0 / 3.0).abs() < 0.03, "ratio {}", output_rms / input_rms);
    }

    #[test]
    fn test_gate_gain_silences() {
        let mut chain = SignalChain::new(48000.0);
        chain.gate_mut().set_value(0.0);
        let mut samples = vec![0.5; 2 * 256];
        chain.process(&mut samples, &RenderContext::new(0.0, 48000.0));
        assert!(samples.iter().all(|&s| s == 0.0));
    }
}
