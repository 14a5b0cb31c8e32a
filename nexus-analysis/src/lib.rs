//! Audio analysis for NEXUS
//!
//! Provides the per-deck analyser tap: a short windowed FFT with temporal
//! smoothing, reported as byte-scaled frequency bins for meters.

mod spectrum;

pub use spectrum::{
    SpectrumAnalyzer, SpectrumData, FFT_SIZE, FREQUENCY_BINS, MAX_DECIBELS, MIN_DECIBELS,
    SMOOTHING_TIME_CONSTANT,
};
