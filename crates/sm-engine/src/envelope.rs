//! ADSR gain envelope.

use sm_ir::{EnvelopeParams, Velocity};

use crate::param::AudioParam;

/// Shortest stage length; keeps every ramp strictly monotonic.
const MIN_STAGE: f32 = 0.001;

/// Fade used when a voice is cut to make room for a retrigger.
pub const FORCE_RELEASE_TIME: f64 = 0.005;

/// Attack/decay/sustain/release shaper for a voice gain parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Adsr {
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,
}

impl Adsr {
    /// Build from preset parameters, clamping stage times and sustain.
    pub fn new(params: EnvelopeParams) -> Self {
        let stage = |t: f32| if t.is_nan() { MIN_STAGE } else { t.max(MIN_STAGE) };
        let sustain = if params.sustain.is_nan() {
            1.0
        } else {
            params.sustain.clamp(0.0, 1.0)
        };
        Self {
            attack: stage(params.attack),
            decay: stage(params.decay),
            sustain,
            release: stage(params.release),
        }
    }

    pub fn release_time(&self) -> f64 {
        self.release as f64
    }

    /// Schedule attack and decay starting at `at`.
    ///
    /// Rises from 0 to the velocity peak over `attack`, then falls to
    /// `peak * sustain` over `decay`. Earlier automation from `at` on is
    /// cancelled first.
    pub fn apply(&self, gain: &mut AudioParam, velocity: Velocity, at: f64) {
        let peak = velocity.get();
        let attack_end = at + self.attack as f64;
        gain.cancel_scheduled_values(at);
        gain.set_value_at_time(0.0, at);
        gain.linear_ramp_to_value_at_time(peak, attack_end);
        gain.linear_ramp_to_value_at_time(peak * self.sustain, attack_end + self.decay as f64);
    }

    /// Ramp to silence from whatever value the gain has at `at`.
    ///
    /// Returns the time the gain reaches zero.
    pub fn release(&self, gain: &mut AudioParam, at: f64) -> f64 {
        release_over(gain, at, self.release as f64)
    }
}

/// Cancel-then-set-then-ramp to zero over `duration`. Returns the end time.
pub fn release_over(gain: &mut AudioParam, at: f64, duration: f64) -> f64 {
    let end = at + duration;
    gain.hold_at(at);
    gain.linear_ramp_to_value_at_time(0.0, end);
    end
}
