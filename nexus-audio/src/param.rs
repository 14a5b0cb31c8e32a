//! Automatable parameters
//!
//! Every continuously-variable quantity in the graph (gains, cutoffs, playback
//! rates) is an `AudioParam`. Control code schedules changes against the audio
//! clock and the render path evaluates the resulting curve per frame, so a
//! change requested between two callbacks still lands on an exact frame.

/// A scheduled automation event
#[derive(Debug, Clone, Copy, PartialEq)]
enum Automation {
    /// Jump to `value` at `time`
    SetValue { time: f64, value: f32 },
    /// Approach `target` exponentially from `time` with time constant `time_constant`
    SetTarget {
        time: f64,
        target: f32,
        time_constant: f64,
    },
    /// Exponential ramp from the previous event, arriving at `value` at `end_time`
    ExponentialRamp { end_time: f64, value: f32 },
}

impl Automation {
    fn time(&self) -> f64 {
        match *self {
            Automation::SetValue { time, .. } => time,
            Automation::SetTarget { time, .. } => time,
            Automation::ExponentialRamp { end_time, .. } => end_time,
        }
    }
}

/// Curve state after all events up to `time` have been applied
#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    value: f32,
    time: f64,
    target: Option<(f32, f64)>,
}

impl Segment {
    fn fixed(value: f32, time: f64) -> Self {
        Self {
            value,
            time,
            target: None,
        }
    }

    fn value_at(&self, t: f64) -> f32 {
        match self.target {
            Some((target, time_constant)) if t > self.time => {
                let decay = (-(t - self.time) / time_constant).exp() as f32;
                target + (self.value - target) * decay
            }
            _ => self.value,
        }
    }

    /// Value the segment is heading toward
    fn destination(&self) -> f32 {
        self.target.map(|(target, _)| target).unwrap_or(self.value)
    }
}

/// Exponential interpolation between two points, held when signs differ
fn exponential_ramp(v0: f32, t0: f64, v1: f32, t1: f64, t: f64) -> f32 {
    if t1 <= t0 {
        return v1;
    }
    if v0 == 0.0 || v1 == 0.0 || (v0 < 0.0) != (v1 < 0.0) {
        return v0;
    }
    let progress = ((t - t0) / (t1 - t0)).clamp(0.0, 1.0);
    v0 * (v1 / v0).powf(progress as f32)
}

/// A parameter whose value follows a timeline of scheduled automation
#[derive(Debug, Clone)]
pub struct AudioParam {
    min: f32,
    max: f32,
    settled: Segment,
    events: Vec<Automation>,
}

impl AudioParam {
    /// Create a parameter with an initial value and a hard range
    pub fn new(value: f32, min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            settled: Segment::fixed(value.clamp(min, max), 0.0),
            events: Vec::new(),
        }
    }

    /// Set the value immediately, discarding all automation
    pub fn set_value(&mut self, value: f32) {
        self.events.clear();
        self.settled = Segment::fixed(value.clamp(self.min, self.max), 0.0);
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Automation::SetValue { time, value });
    }

    /// Start an exponential approach to `target` at `time`
    ///
    /// A non-positive time constant degenerates into an immediate jump.
    pub fn set_target_at_time(&mut self, target: f32, time: f64, time_constant: f64) {
        if time_constant <= 0.0 || !time_constant.is_finite() {
            self.insert(Automation::SetValue {
                time,
                value: target,
            });
            return;
        }
        self.insert(Automation::SetTarget {
            time,
            target,
            time_constant,
        });
    }

    pub fn exponential_ramp_to_value_at_time(&mut self, value: f32, end_time: f64) {
        self.insert(Automation::ExponentialRamp { end_time, value });
    }

    /// Remove every event scheduled at or after `time`
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|event| event.time() < time);
    }

    /// Value of the curve at audio time `t`
    pub fn value_at(&self, t: f64) -> f32 {
        let mut segment = self.settled;
        for event in &self.events {
            match *event {
                Automation::SetValue { time, value } => {
                    if time > t {
                        break;
                    }
                    segment = Segment::fixed(value, time);
                }
                Automation::SetTarget {
                    time,
                    target,
                    time_constant,
                } => {
                    if time > t {
                        break;
                    }
                    segment = Segment {
                        value: segment.value_at(time),
                        time,
                        target: Some((target, time_constant)),
                    };
                }
                Automation::ExponentialRamp { end_time, value } => {
                    if end_time > t {
                        let v =
                            exponential_ramp(segment.value, segment.time, value, end_time, t);
                        return v.clamp(self.min, self.max);
                    }
                    segment = Segment::fixed(value, end_time);
                }
            }
        }
        segment.value_at(t).clamp(self.min, self.max)
    }

    /// Value the parameter will settle at once all automation has played out
    pub fn destination(&self) -> f32 {
        let value = match self.events.last() {
            Some(Automation::SetValue { value, .. }) => *value,
            Some(Automation::SetTarget { target, .. }) => *target,
            Some(Automation::ExponentialRamp { value, .. }) => *value,
            None => self.settled.destination(),
        };
        value.clamp(self.min, self.max)
    }

    /// Fold every event that has fully elapsed by `t` into the settled state
    pub fn prune(&mut self, t: f64) {
        let mut consumed = 0;
        for event in &self.events {
            match *event {
                Automation::SetValue { time, value } => {
                    if time > t {
                        break;
                    }
                    self.settled = Segment::fixed(value, time);
                }
                Automation::SetTarget {
                    time,
                    target,
                    time_constant,
                } => {
                    if time > t {
                        break;
                    }
                    self.settled = Segment {
                        value: self.settled.value_at(time),
                        time,
                        target: Some((target, time_constant)),
                    };
                }
                Automation::ExponentialRamp { end_time, value } => {
                    if end_time > t {
                        break;
                    }
                    self.settled = Segment::fixed(value, end_time);
                }
            }
            consumed += 1;
        }
        self.events.drain(..consumed);

        // A target that has converged is indistinguishable from a fixed value
        if let Some((target, time_constant)) = self.settled.target {
            if self.events.is_empty() && t - self.settled.time > time_constant * 30.0 {
                self.settled = Segment::fixed(target, t);
            }
        }
    }

    /// Number of pending events
    pub fn pending(&self) -> usize {
        self.events.len()
    }

    fn insert(&mut self, event: Automation) {
        let time = event.time();
        if !time.is_finite() {
            return;
        }
        let index = self
            .events
            .iter()
            .position(|existing| existing.time() > time)
            .unwrap_or(self.events.len());
        self.events.insert(index, event);
    }
}

/// Replace non-finite input with a fallback and clamp into range
pub(crate) fn sanitize(value: f32, fallback: f32, min: f32, max: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_value_holds() {
        let param = AudioParam::new(0.5, 0.0, 1.0);
        assert_eq!(param.value_at(0.0), 0.5);
        assert_eq!(param.value_at(100.0), 0.5);
    }

    #[test]
    fn test_set_value_at_time_steps() {
        let mut param = AudioParam::new(1.0, 0.0, 1.0);
        param.set_value_at_time(0.0, 1.0);
        assert_eq!(param.value_at(0.99), 1.0);
        assert_eq!(param.value_at(1.0), 0.0);
    }

    #[test]
    fn test_set_target_converges() {
        let mut param = AudioParam::new(0.0, 0.0, 1.0);
        param.set_target_at_time(1.0, 0.0, 0.05);
        // One time constant reaches ~63%
        let v = param.value_at(0.05);
        assert!((v - 0.632).abs() < 0.01);
        assert!(param.value_at(1.0) > 0.999);
        assert_eq!(param.destination(), 1.0);
    }

    #[test]
    fn test_set_target_starts_from_current_curve() {
        let mut param = AudioParam::new(0.0, 0.0, 1.0);
        param.set_target_at_time(1.0, 0.0, 0.1);
        let mid = param.value_at(0.1);
        param.set_target_at_time(0.0, 0.1, 0.1);
        assert!((param.value_at(0.1) - mid).abs() < 1e-6);
        assert!(param.value_at(0.2) < mid);
    }

    #[test]
    fn test_exponential_ramp() {
        let mut param = AudioParam::new(1.0, 0.0, 4.0);
        param.set_value_at_time(1.0, 0.0);
        param.exponential_ramp_to_value_at_time(0.001, 1.0);
        assert!((param.value_at(0.5) - 0.031_62).abs() < 1e-3);
        assert!((param.value_at(1.0) - 0.001).abs() < 1e-6);
        assert!((param.value_at(2.0) - 0.001).abs() < 1e-6);
    }

    #[test]
    fn test_cancel_scheduled_values() {
        let mut param = AudioParam::new(1.0, 0.0, 1.0);
        param.set_value_at_time(0.0, 1.0);
        param.set_value_at_time(0.5, 2.0);
        param.cancel_scheduled_values(1.5);
        assert_eq!(param.pending(), 1);
        assert_eq!(param.value_at(3.0), 0.0);
    }

    #[test]
    fn test_prune_preserves_curve() {
        let mut param = AudioParam::new(0.0, 0.0, 1.0);
        param.set_target_at_time(1.0, 0.0, 0.1);
        param.set_value_at_time(0.25, 0.5);
        let before = param.value_at(0.3);
        param.prune(0.3);
        assert_eq!(param.pending(), 1);
        assert!((param.value_at(0.3) - before).abs() < 1e-6);
        param.prune(0.6);
        assert_eq!(param.pending(), 0);
        assert_eq!(param.value_at(0.7), 0.25);
    }

    #[test]
    fn test_values_are_clamped() {
        let mut param = AudioParam::new(0.0, -1.0, 1.0);
        param.set_value_at_time(5.0, 0.0);
        assert_eq!(param.value_at(0.0), 1.0);
    }

    #[test]
    fn test_non_finite_times_are_ignored() {
        let mut param = AudioParam::new(0.3, 0.0, 1.0);
        param.set_value_at_time(1.0, f64::NAN);
        assert_eq!(param.pending(), 0);
        assert_eq!(param.value_at(1.0), 0.3);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize(f32::NAN, 0.5, 0.0, 1.0), 0.5);
        assert_eq!(sanitize(2.0, 0.5, 0.0, 1.0), 1.0);
        assert_eq!(sanitize(0.25, 0.5, 0.0, 1.0), 0.25);
    }
}
