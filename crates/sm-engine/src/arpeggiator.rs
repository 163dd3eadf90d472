//! Step-driven arpeggiator.

use arrayvec::ArrayVec;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sm_ir::{StepEvent, Velocity, MAX_PITCH};

/// Most notes an arpeggio cycles through.
pub const MAX_ARP_NOTES: usize = 16;

/// C major triad.
pub const DEFAULT_NOTES: [u8; 3] = [60, 64, 67];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ArpMode {
    #[default]
    Up,
    Down,
    /// Up then down without repeating the end notes
    UpDown,
    Random,
}

/// One note produced by the arpeggiator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArpNote {
    pub pitch: u8,
    pub velocity: Velocity,
    /// Audio-clock start
    pub time: f64,
    /// Gate length in seconds
    pub duration: f64,
}

pub struct Arpeggiator {
    mode: ArpMode,
    /// Sorted ascending
    notes: ArrayVec<u8, MAX_ARP_NOTES>,
    /// Steps per arpeggio note
    rate: u32,
    /// Fraction of the note span the gate stays open
    gate: f32,
    velocity: Velocity,
    position: usize,
    counter: u32,
    rng: StdRng,
}

impl Arpeggiator {
    pub fn new(seed: u64) -> Self {
        let mut arp = Self {
            mode: ArpMode::Up,
            notes: ArrayVec::new(),
            rate: 1,
            gate: 0.5,
            velocity: Velocity::default(),
            position: 0,
            counter: 0,
            rng: StdRng::seed_from_u64(seed),
        };
        arp.set_notes(&DEFAULT_NOTES);
        arp
    }

    pub fn mode(&self) -> ArpMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ArpMode) {
        self.mode = mode;
        self.position = 0;
    }

    /// Replace the note set. Extra notes past [`MAX_ARP_NOTES`] are dropped.
    pub fn set_notes(&mut self, notes: &[u8]) {
        self.notes.clear();
        for &n in notes.iter().take(MAX_ARP_NOTES) {
            self.notes.push(n.min(MAX_PITCH));
        }
        self.notes.sort_unstable();
        self.position = 0;
    }

    pub fn notes(&self) -> &[u8] {
        &self.notes
    }

    pub fn set_rate(&mut self, steps: u32) {
        self.rate = steps.max(1);
    }

    pub fn set_gate(&mut self, gate: f32) {
        self.gate = if gate.is_nan() { 0.5 } else { gate.clamp(0.05, 1.0) };
    }

    pub fn set_velocity(&mut self, velocity: Velocity) {
        self.velocity = velocity;
    }

    /// Restart the pattern from its first note.
    pub fn reset(&mut self) {
        self.position = 0;
        self.counter = 0;
    }

    /// Advance by one sequencer step; returns a note on every `rate`-th step.
    pub fn on_step(&mut self, event: &StepEvent) -> Option<ArpNote> {
        let fire = self.counter % self.rate == 0;
        self.counter = self.counter.wrapping_add(1);
        if !fire || self.notes.is_empty() {
            return None;
        }
        let pitch = self.next_pitch();
        Some(ArpNote {
            pitch,
            velocity: self.velocity,
            time: event.time,
            duration: event.duration * self.rate as f64 * self.gate as f64,
        })
    }

    fn next_pitch(&mut self) -> u8 {
        let len = self.notes.len();
        let index = match self.mode {
            ArpMode::Up => self.position % len,
            ArpMode::Down => len - 1 - self.position % len,
            ArpMode::UpDown => {
                if len == 1 {
                    0
                } else {
                    let period = 2 * (len - 1);
                    let p = self.position % period;
                    if p < len {
                        p
                    } else {
                        period - p
                    }
                }
            }
            ArpMode::Random => self.rng.gen_range(0..len),
        };
        self.position = self.position.wrapping_add(1);
        self.notes[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(i: u32) -> StepEvent {
        StepEvent {
            step: i,
            time: i as f64 * 0.125,
            duration: 0.125,
        }
    }

    fn run(arp: &mut Arpeggiator, n: u32) -> Vec<u8> {
        (0..n).filter_map(|i| arp.on_step(&step(i))).map(|n| n.pitch).collect()
    }

    #[test]
    fn up_and_down() {
        let mut arp = Arpeggiator::new(1);
        assert_eq!(run(&mut arp, 4), vec![60, 64, 67, 60]);
        arp.set_mode(ArpMode::Down);
        assert_eq!(run(&mut arp, 4), vec![67, 64, 60, 67]);
    }

    #[test]
    fn up_down_does_not_repeat_ends() {
        let mut arp = Arpeggiator::new(1);
        arp.set_mode(ArpMode::UpDown);
        assert_eq!(run(&mut arp, 6), vec![60, 64, 67, 64, 60, 64]);
    }

    #[test]
    fn random_mode_is_deterministic_per_seed() {
        let mut a = Arpeggiator::new(42);
        let mut b = Arpeggiator::new(42);
        a.set_mode(ArpMode::Random);
        b.set_mode(ArpMode::Random);
        let seq = run(&mut a, 32);
        assert_eq!(seq, run(&mut b, 32));
        assert!(seq.iter().all(|p| DEFAULT_NOTES.contains(p)));
    }

    #[test]
    fn rate_and_gate_shape_timing() {
        let mut arp = Arpeggiator::new(1);
        arp.set_rate(2);
        arp.set_gate(0.5);
        let notes: Vec<ArpNote> = (0..4).filter_map(|i| arp.on_step(&step(i))).collect();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[1].time, 0.25);
        assert!((notes[0].duration - 0.125).abs() < 1e-12);
    }

    #[test]
    fn notes_are_sorted_and_capped() {
        let mut arp = Arpeggiator::new(1);
        let many: Vec<u8> = (0..40).rev().collect();
        arp.set_notes(&many);
        assert_eq!(arp.notes().len(), MAX_ARP_NOTES);
        assert!(arp.notes().windows(2).all(|w| w[0] <= w[1]));
        arp.set_notes(&[]);
        assert!(arp.on_step(&step(0)).is_none());
    }
}
