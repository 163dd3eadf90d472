//! Automatable parameters scheduled on the audio clock.
//!
//! An [`AudioParam`] holds a timeline of automation events. Values are
//! never assigned directly on a live signal path: callers cancel pending
//! automation, pin the current value, then schedule a ramp or an
//! exponential approach from there.

/// Time constant used for click-free parameter changes (seconds).
pub const SMOOTHING_TIME_CONSTANT: f64 = 0.02;

/// Pending events kept without reallocating.
const EVENT_CAPACITY: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq)]
enum ParamEvent {
    SetValue { time: f64, value: f32 },
    LinearRamp { time: f64, value: f32 },
    SetTarget { time: f64, target: f32, time_constant: f64 },
}

impl ParamEvent {
    fn time(&self) -> f64 {
        match *self {
            ParamEvent::SetValue { time, .. }
            | ParamEvent::LinearRamp { time, .. }
            | ParamEvent::SetTarget { time, .. } => time,
        }
    }
}

/// A range-clamped value with an automation timeline.
#[derive(Clone, Debug)]
pub struct AudioParam {
    /// Value before the first pending event
    base: f32,
    default: f32,
    min: f32,
    max: f32,
    events: Vec<ParamEvent>,
}

impl AudioParam {
    pub fn new(default: f32, min: f32, max: f32) -> Self {
        let default = default.clamp(min, max);
        Self {
            base: default,
            default,
            min,
            max,
            events: Vec::with_capacity(EVENT_CAPACITY),
        }
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }

    fn insert(&mut self, event: ParamEvent) {
        let time = event.time();
        let pos = self.events.partition_point(|e| e.time() <= time);
        self.events.insert(pos, event);
    }

    /// Replace the value and drop all automation. Only for paths not yet sounding.
    pub fn set_immediate(&mut self, value: f32) {
        self.events.clear();
        self.base = self.clamp(value);
    }

    /// Jump to `value` at `time`.
    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        let value = self.clamp(value);
        self.insert(ParamEvent::SetValue { time, value });
    }

    /// Ramp linearly from the previous event to `value`, arriving at `time`.
    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        let value = self.clamp(value);
        self.insert(ParamEvent::LinearRamp { time, value });
    }

    /// Approach `target` exponentially from `start` with `time_constant`.
    pub fn set_target_at_time(&mut self, target: f32, start: f64, time_constant: f64) {
        let target = self.clamp(target);
        self.insert(ParamEvent::SetTarget {
            time: start,
            target,
            time_constant,
        });
    }

    /// Drop every event at or after `time`.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    /// Cancel automation from `time` on and pin the value it had there.
    ///
    /// A linear ramp still in flight at `time` is truncated rather than
    /// dropped, so the value keeps moving along it until `time`.
    pub fn hold_at(&mut self, time: f64) -> f32 {
        let value = self.value_at(time);
        let truncated = self
            .events
            .iter()
            .find(|e| e.time() >= time)
            .is_some_and(|e| matches!(*e, ParamEvent::LinearRamp { time: end, .. } if end > time));
        self.cancel_scheduled_values(time);
        if truncated {
            self.insert(ParamEvent::LinearRamp { time, value });
        } else {
            self.insert(ParamEvent::SetValue { time, value });
        }
        value
    }

    /// Glide to `value` starting at `now` without a discontinuity.
    pub fn smooth_to(&mut self, value: f32, now: f64) {
        self.hold_at(now);
        self.set_target_at_time(value, now, SMOOTHING_TIME_CONSTANT);
    }

    /// Value of the parameter at audio-clock time `t`.
    pub fn value_at(&self, t: f64) -> f32 {
        let mut value = self.base;
        let mut anchor = f64::NEG_INFINITY;
        let mut target: Option<(f32, f64)> = None;

        for event in &self.events {
            let time = event.time();
            if time > t {
                if let ParamEvent::LinearRamp { time: end, value: end_value } = *event {
                    if anchor.is_finite() && end > anchor {
                        let frac = ((t - anchor) / (end - anchor)) as f32;
                        return value + (end_value - value) * frac;
                    }
                }
                break;
            }
            if let Some((goal, tc)) = target.take() {
                value = approach(value, goal, tc, time - anchor);
            }
            match *event {
                ParamEvent::SetValue { value: v, .. } | ParamEvent::LinearRamp { value: v, .. } => {
                    value = v
                }
                ParamEvent::SetTarget {
                    target: goal,
                    time_constant,
                    ..
                } => target = Some((goal, time_constant)),
            }
            anchor = time;
        }

        if let Some((goal, tc)) = target {
            value = approach(value, goal, tc, t - anchor);
        }
        value
    }

    /// Value once all scheduled automation has run its course.
    pub fn settled_value(&self) -> f32 {
        self.value_at(f64::INFINITY)
    }

    /// Write per-frame values for a block starting at `start`.
    pub fn fill(&self, start: f64, dt: f64, out: &mut [f32]) {
        if self.events.is_empty() {
            out.fill(self.base);
            return;
        }
        for (i, v) in out.iter_mut().enumerate() {
            *v = self.value_at(start + i as f64 * dt);
        }
    }

    /// Fold events that are fully in the past into the base value.
    pub fn prune(&mut self, now: f64) {
        let past = self.events.partition_point(|e| e.time() <= now);
        if past == 0 {
            return;
        }
        if past == self.events.len() {
            let settled = match self.events[past - 1] {
                ParamEvent::SetValue { value, .. } | ParamEvent::LinearRamp { value, .. } => {
                    Some(value)
                }
                ParamEvent::SetTarget { target, .. } => {
                    let current = self.value_at(now);
                    ((current - target).abs() < 1e-5).then_some(target)
                }
            };
            if let Some(value) = settled {
                self.base = value;
                self.events.clear();
                return;
            }
        }
        let anchor_time = self.events[past - 1].time();
        self.base = self.value_at(anchor_time);
        self.events.drain(..past - 1);
    }

    /// Whether any automation is still pending or in progress.
    pub fn is_automating(&self) -> bool {
        !self.events.is_empty()
    }
}

fn approach(from: f32, to: f32, time_constant: f64, elapsed: f64) -> f32 {
    if time_constant <= 0.0 {
        return to;
    }
    let k = (-elapsed.max(0.0) / time_constant).exp() as f32;
    to + (from - to) * k
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn static_value_without_events() {
        let p = AudioParam::new(0.5, 0.0, 1.0);
        assert_eq!(p.value_at(10.0), 0.5);
    }

    #[test]
    fn linear_ramp_interpolates_from_previous_event() {
        let mut p = AudioParam::new(0.0, 0.0, 1.0);
        p.set_value_at_time(0.0, 1.0);
        p.linear_ramp_to_value_at_time(1.0, 2.0);
        assert!(close(p.value_at(0.5), 0.0));
        assert!(close(p.value_at(1.25), 0.25));
        assert!(close(p.value_at(2.0), 1.0));
        assert!(close(p.value_at(5.0), 1.0));
    }

    #[test]
    fn set_target_approaches_exponentially() {
        let mut p = AudioParam::new(0.0, 0.0, 1.0);
        p.set_target_at_time(1.0, 0.0, 0.1);
        let expected = 1.0 - (-1.0f32).exp();
        assert!(close(p.value_at(0.1), expected));
        assert!(p.value_at(2.0) > 0.999);
    }

    #[test]
    fn cancel_drops_future_events_only() {
        let mut p = AudioParam::new(0.0, 0.0, 1.0);
        p.set_value_at_time(0.2, 1.0);
        p.set_value_at_time(0.9, 3.0);
        p.cancel_scheduled_values(2.0);
        assert!(close(p.value_at(4.0), 0.2));
    }

    #[test]
    fn hold_pins_mid_ramp_value() {
        let mut p = AudioParam::new(0.0, 0.0, 1.0);
        p.set_value_at_time(0.0, 0.0);
        p.linear_ramp_to_value_at_time(1.0, 1.0);
        let held = p.hold_at(0.5);
        assert!(close(held, 0.5));
        assert!(close(p.value_at(0.9), 0.5));
    }

    #[test]
    fn hold_ahead_of_time_keeps_ramp_until_hold() {
        let mut p = AudioParam::new(0.0, 0.0, 1.0);
        p.set_value_at_time(0.0, 0.0);
        p.linear_ramp_to_value_at_time(1.0, 1.0);
        p.linear_ramp_to_value_at_time(0.5, 2.0);
        // scheduled while the value is still at the start of the ramp
        let held = p.hold_at(0.5);
        assert!(close(held, 0.5));
        assert!(close(p.value_at(0.25), 0.25));
        assert!(close(p.value_at(0.4999), 0.4999));
        assert!(close(p.value_at(0.5), 0.5));
        assert!(close(p.value_at(3.0), 0.5));
    }

    #[test]
    fn hold_between_events_is_a_plain_set() {
        let mut p = AudioParam::new(0.0, 0.0, 1.0);
        p.set_value_at_time(0.3, 0.0);
        p.set_value_at_time(0.9, 2.0);
        p.hold_at(1.0);
        assert!(close(p.value_at(0.5), 0.3));
        assert!(close(p.value_at(2.5), 0.3));
    }

    #[test]
    fn smooth_to_has_no_jump() {
        let mut p = AudioParam::new(1.0, 0.0, 1.0);
        p.smooth_to(0.0, 1.0);
        assert!(close(p.value_at(1.0), 1.0));
        assert!(p.value_at(1.0 + SMOOTHING_TIME_CONSTANT) < 0.4);
        assert!(p.value_at(1.5) < 1e-3);
    }

    #[test]
    fn writes_are_clamped() {
        let mut p = AudioParam::new(0.5, 0.0, 1.0);
        p.set_value_at_time(5.0, 0.0);
        assert_eq!(p.value_at(0.0), 1.0);
        p.set_immediate(f32::NAN);
        assert_eq!(p.value_at(0.0), 0.5);
    }

    #[test]
    fn prune_keeps_ramp_anchor() {
        let mut p = AudioParam::new(0.0, 0.0, 1.0);
        p.set_value_at_time(0.0, 0.0);
        p.linear_ramp_to_value_at_time(1.0, 0.1);
        p.linear_ramp_to_value_at_time(0.5, 1.1);
        let before = p.value_at(0.6);
        p.prune(0.5);
        assert!(close(p.value_at(0.6), before));
        p.prune(2.0);
        assert!(!p.is_automating());
        assert!(close(p.value_at(3.0), 0.5));
    }

    #[test]
    fn prune_settles_converged_target() {
        let mut p = AudioParam::new(0.0, 0.0, 1.0);
        p.set_target_at_time(1.0, 0.0, 0.01);
        p.prune(0.05);
        assert!(p.is_automating());
        p.prune(1.0);
        assert!(!p.is_automating());
        assert_eq!(p.value_at(1.0), 1.0);
    }

    #[test]
    fn settled_value_is_final_target() {
        let mut p = AudioParam::new(0.0, 0.0, 1.0);
        p.smooth_to(0.7, 0.0);
        assert!(close(p.settled_value(), 0.7));
        p.linear_ramp_to_value_at_time(0.2, 5.0);
        assert!(close(p.settled_value(), 0.2));
    }

    #[test]
    fn fill_matches_value_at() {
        let mut p = AudioParam::new(0.0, 0.0, 1.0);
        p.set_value_at_time(0.0, 0.0);
        p.linear_ramp_to_value_at_time(1.0, 0.004);
        let mut out = [0.0; 4];
        p.fill(0.0, 0.001, &mut out);
        assert!(close(out[0], 0.0));
        assert!(close(out[2], 0.5));
    }
}
