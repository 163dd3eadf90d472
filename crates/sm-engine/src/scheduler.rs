//! Look-ahead step scheduler and step subscriptions.
//!
//! The scheduler runs on a coarse wall-clock tick but stamps every step
//! with an exact audio-clock time. On each tick it emits every step whose
//! start falls inside the look-ahead window, so voices can be started
//! sample-accurately even though ticks jitter.

use crossbeam_channel::{Receiver, Sender};
use sm_ir::{StepEvent, TransportState};

/// How far ahead of the audio clock steps are scheduled (seconds).
pub const LOOK_AHEAD: f64 = 0.1;
/// Delay between `play` and the first step (seconds).
pub const START_DELAY: f64 = 0.05;
/// Fraction of a note's length that the gate stays open.
pub const GATE_FRACTION: f64 = 0.95;

pub struct Scheduler {
    look_ahead: f64,
    start_delay: f64,
    running: bool,
    /// Audio-clock time of the next unscheduled step
    next_time: f64,
    next_step: u32,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(LOOK_AHEAD, START_DELAY)
    }
}

impl Scheduler {
    pub fn new(look_ahead: f64, start_delay: f64) -> Self {
        Self {
            look_ahead: look_ahead.max(0.001),
            start_delay: start_delay.max(0.0),
            running: false,
            next_time: 0.0,
            next_step: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn look_ahead(&self) -> f64 {
        self.look_ahead
    }

    /// Audio-clock time of the next step to be scheduled.
    pub fn next_time(&self) -> f64 {
        self.next_time
    }

    /// Start from `loop_start`, `start_delay` after `now`, and run the first tick.
    pub fn play(&mut self, now: f64, transport: &mut TransportState, out: &mut Vec<StepEvent>) {
        self.running = true;
        self.next_step = transport.loop_start;
        self.next_time = now + self.start_delay;
        transport.is_playing = true;
        transport.current_step = -1;
        self.tick(now, transport, out);
    }

    /// Halt scheduling. Nothing is emitted until the next `play`.
    pub fn stop(&mut self, transport: &mut TransportState) {
        self.running = false;
        transport.is_playing = false;
        transport.current_step = -1;
    }

    /// Push every step starting before `now + look_ahead` onto `out`.
    ///
    /// Each step takes its duration from the tempo in force when it is
    /// scheduled, so tempo changes only affect steps not yet emitted.
    pub fn tick(&mut self, now: f64, transport: &mut TransportState, out: &mut Vec<StepEvent>) {
        if !self.running {
            return;
        }
        if self.next_time < now - self.look_ahead {
            log::warn!(
                "scheduler fell {:.3}s behind; skipping to the audio clock",
                now - self.next_time
            );
            self.next_time = now;
        }
        let horizon = now + self.look_ahead;
        while self.next_time < horizon {
            if !transport.in_loop(self.next_step as i64) {
                self.next_step = transport.loop_start;
            }
            let step = self.next_step;
            let duration = transport.step_duration();
            out.push(StepEvent {
                step,
                time: self.next_time,
                duration,
            });
            transport.current_step = step as i64;
            self.next_step = transport.next_step(step as i64);
            self.next_time += duration;
        }
    }
}

/// Handle returned by [`StepSubscribers::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Fan-out of step events to external listeners.
#[derive(Default)]
pub struct StepSubscribers {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Sender<StepEvent>)>,
}

impl StepSubscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> (SubscriptionId, Receiver<StepEvent>) {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push((id, tx));
        (id, rx)
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Deliver to every subscriber, dropping those whose receiver is gone.
    pub fn publish(&mut self, event: StepEvent) {
        self.subscribers.retain(|(id, tx)| {
            let alive = tx.send(event).is_ok();
            if !alive {
                log::debug!("step subscriber {id:?} disconnected");
            }
            alive
        });
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
