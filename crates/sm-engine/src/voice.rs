//! Voice: one sounding note of an instrument.

use sm_ir::{AudioBuffer, Velocity};

use crate::context::RenderContext;
use crate::envelope::{release_over, Adsr, FORCE_RELEASE_TIME};
use crate::oscillator::Oscillator;
use crate::param::AudioParam;
use crate::sample_bank::{SampleBank, SampleKey};

/// Voice lifecycle state. A voice that finishes releasing is destroyed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoiceState {
    /// Started; the envelope is in attack, decay or sustain.
    #[default]
    Sounding,
    /// Release scheduled; the gain is ramping to zero.
    Releasing,
}

/// What a voice reads its signal from.
#[derive(Clone, Debug)]
pub enum VoiceSource {
    Oscillator(Oscillator),
    Sample {
        key: SampleKey,
        /// Read position in source frames
        position: f64,
        /// Source frames advanced per output frame
        increment: f64,
    },
}

/// A single note: a source shaped by an ADSR gain envelope.
#[derive(Clone, Debug)]
pub struct Voice {
    pub pitch: u8,
    pub source: VoiceSource,
    pub state: VoiceState,
    envelope: Adsr,
    gain: AudioParam,
    /// Audio-clock time the note starts
    start: f64,
    /// Time the release ramp reaches zero
    stop_at: Option<f64>,
    /// Set once the voice has nothing left to play
    finished: bool,
}

impl Voice {
    /// Create a voice starting at `at` and schedule its attack/decay.
    pub fn new(pitch: u8, source: VoiceSource, envelope: Adsr, velocity: Velocity, at: f64) -> Self {
        let mut gain = AudioParam::new(0.0, 0.0, 1.0);
        envelope.apply(&mut gain, velocity, at);
        Self {
            pitch,
            source,
            state: VoiceState::Sounding,
            envelope,
            gain,
            start: at,
            stop_at: None,
            finished: false,
        }
    }

    pub fn start_time(&self) -> f64 {
        self.start
    }

    /// Time the voice falls silent, once a release is scheduled.
    pub fn stop_time(&self) -> Option<f64> {
        self.stop_at
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Schedule the envelope release at `at`.
    ///
    /// A release that would end later than one already pending is ignored.
    pub fn release(&mut self, at: f64) -> f64 {
        self.release_with(at, self.envelope.release_time())
    }

    /// Fade out over [`FORCE_RELEASE_TIME`], used when the pitch is retriggered.
    pub fn force_release(&mut self, at: f64) -> f64 {
        self.release_with(at, FORCE_RELEASE_TIME)
    }

    fn release_with(&mut self, at: f64, duration: f64) -> f64 {
        let at = at.max(self.start);
        if let Some(end) = self.stop_at {
            if end <= at + duration {
                return end;
            }
        }
        let end = release_over(&mut self.gain, at, duration);
        self.state = VoiceState::Releasing;
        self.stop_at = Some(end);
        end
    }

    /// Add this block's output into the first two channels of `out`.
    pub fn render(&mut self, ctx: &RenderContext, bank: &SampleBank, out: &mut AudioBuffer) {
        if self.finished {
            return;
        }
        let frames = ctx.frames.min(out.frames());
        let Some((left, right)) = out.stereo_mut() else {
            return;
        };

        for i in 0..frames {
            let t = ctx.time_at(i);
            if t < self.start {
                continue;
            }
            if matches!(self.stop_at, Some(end) if t >= end) {
                self.finished = true;
                break;
            }
            let g = self.gain.value_at(t);
            let (l, r) = match &mut self.source {
                VoiceSource::Oscillator(osc) => {
                    let s = osc.next_sample();
                    (s, s)
                }
                VoiceSource::Sample {
                    key,
                    position,
                    increment,
                } => {
                    let Some(sample) = bank.get(*key) else {
                        self.finished = true;
                        break;
                    };
                    if *position >= sample.frames() as f64 {
                        self.finished = true;
                        break;
                    }
                    let frame = (sample.read(0, *position), sample.read(1, *position));
                    *position += *increment;
                    frame
                }
            };
            left[i] += l * g;
            right[i] += r * g;
        }

        self.gain.prune(ctx.end_time());
        if matches!(self.stop_at, Some(end) if end <= ctx.end_time()) {
            self.finished = true;
        }
    }
}
