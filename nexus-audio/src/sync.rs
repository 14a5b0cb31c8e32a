//! Beat sync between the two decks
//!
//! Sync is one-shot: the source deck's pitch is set so its effective tempo
//! matches the target's, and its position is nudged by the smallest phase
//! difference within one beat. Nothing tracks afterwards.

use std::sync::Arc;

use tracing::debug;

use crate::buffer::AudioBuffer;

/// Nudges at or below this (seconds) are not worth a generator swap
pub const NUDGE_THRESHOLD: f64 = 0.001;

/// What sync needs to know about a deck
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncSnapshot {
    /// Nominal tempo of the loaded track
    pub bpm: f32,
    /// Current playback rate multiplier
    pub pitch: f32,
    /// Resolved position in seconds
    pub current_time: f64,
    pub is_playing: bool,
    pub duration: f64,
}

impl SyncSnapshot {
    pub fn effective_bpm(&self) -> f32 {
        self.bpm * self.pitch
    }
}

/// Correction to apply to the source deck
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncCorrection {
    pub pitch: f32,
    /// Signed seconds to move the source deck
    pub nudge: f64,
}

/// The slice of a deck's surface sync talks to
pub trait DeckControls {
    /// `None` when the deck has no track or no audio graph
    fn sync_snapshot(&self) -> Option<SyncSnapshot>;

    fn apply_sync(&mut self, pitch: f32, nudge: f64);

    fn load_track(&mut self, buffer: Arc<AudioBuffer>, name: Option<String>);
}

/// Pitch and phase correction that locks `source` to `target`
///
/// Returns `None` when either tempo is unusable.
pub fn compute_sync(target: &SyncSnapshot, source: &SyncSnapshot) -> Option<SyncCorrection> {
    let valid = |bpm: f32| bpm.is_finite() && bpm > 0.0;
    if !valid(target.bpm) || !valid(source.bpm) || !valid(target.pitch) {
        return None;
    }

    let target_bpm = target.effective_bpm() as f64;
    let pitch = (target_bpm / source.bpm as f64) as f32;

    let beat = 60.0 / target_bpm;
    let target_phase = target.current_time.rem_euclid(beat);
    let source_phase = source.current_time.rem_euclid(beat);
    let mut diff = target_phase - source_phase;
    if diff > beat / 2.0 {
        diff -= beat;
    } else if diff < -beat / 2.0 {
        diff += beat;
    }

    Some(SyncCorrection { pitch, nudge: diff })
}

/// Lock `source` to `target`, returning the correction that was applied
pub fn request_sync<S, T>(source: &mut S, target: &T) -> Option<SyncCorrection>
where
    S: DeckControls + ?Sized,
    T: DeckControls + ?Sized,
{
    let target_state = target.sync_snapshot()?;
    let source_state = source.sync_snapshot()?;
    let correction = compute_sync(&target_state, &source_state)?;
    debug!(
        pitch = correction.pitch,
        nudge = correction.nudge,
        "Applying sync"
    );
    source.apply_sync(correction.pitch, correction.nudge);
    Some(correction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(bpm: f32, pitch: f32, current_time: f64) -> SyncSnapshot {
        SyncSnapshot {
            bpm,
            pitch,
            current_time,
            is_playing: true,
            duration: 300.0,
        }
    }

    #[test]
    fn test_reference_example() {
        let target = snapshot(128.0, 1.0, 10.0);
        let source = snapshot(140.0, 1.0, 3.0);
        let correction = compute_sync(&target, &source).unwrap();
        assert!((correction.pitch - 0.914_285_7).abs() < 1e-6);
        assert!((correction.nudge + 0.03125).abs() < 1e-9);
    }

    #[test]
    fn test_nudge_within_half_beat() {
        let target = snapshot(120.0, 1.0, 0.0);
        for i in 0..50 {
            let source = snapshot(120.0, 1.0, i as f64 * 0.037);
            let correction = compute_sync(&target, &source).unwrap();
            assert!(correction.nudge.abs() <= 0.25 + 1e-12);
        }
    }

    #[test]
    fn test_wraps_to_shortest_direction() {
        // Target just after a beat, source just before one
        let target = snapshot(120.0, 1.0, 1.01);
        let source = snapshot(120.0, 1.0, 0.99);
        let correction = compute_sync(&target, &source).unwrap();
        assert!((correction.nudge - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_uses_target_effective_tempo() {
        let target = snapshot(100.0, 1.2, 0.0);
        let source = snapshot(150.0, 1.0, 0.0);
        let correction = compute_sync(&target, &source).unwrap();
        assert!((correction.pitch - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_invalid_tempo() {
        let good = snapshot(120.0, 1.0, 0.0);
        assert!(compute_sync(&snapshot(0.0, 1.0, 0.0), &good).is_none());
        assert!(compute_sync(&good, &snapshot(f32::NAN, 1.0, 0.0)).is_none());
    }

    struct FakeDeck {
        snapshot: Option<SyncSnapshot>,
        applied: Option<(f32, f64)>,
    }

    impl DeckControls for FakeDeck {
        fn sync_snapshot(&self) -> Option<SyncSnapshot> {
            self.snapshot
        }

        fn apply_sync(&mut self, pitch: f32, nudge: f64) {
            self.applied = Some((pitch, nudge));
        }

        fn load_track(&mut self, _buffer: Arc<AudioBuffer>, _name: Option<String>) {}
    }

    #[test]
    fn test_request_sync_applies_to_source() {
        let mut source = FakeDeck {
            snapshot: Some(snapshot(140.0, 1.0, 3.0)),
            applied: None,
        };
        let target = FakeDeck {
            snapshot: Some(snapshot(128.0, 1.0, 10.0)),
            applied: None,
        };
        assert!(request_sync(&mut source, &target).is_some());
        let (pitch, nudge) = source.applied.unwrap();
        assert!((pitch - 0.914_285_7).abs() < 1e-6);
        assert!((nudge + 0.03125).abs() < 1e-9);
    }

    #[test]
    fn test_request_sync_without_target_track() {
        let mut source = FakeDeck {
            snapshot: Some(snapshot(140.0, 1.0, 3.0)),
            applied: None,
        };
        let target = FakeDeck {
            snapshot: None,
            applied: None,
        };
        assert!(request_sync(&mut source, &target).is_none());
        assert!(source.applied.is_none());
    }
}
