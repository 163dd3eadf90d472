//! Band-limited phase-accumulator oscillator.

use std::f64::consts::TAU;

use sm_ir::Waveform;

/// Single oscillator with PolyBLEP correction on the saw and square edges.
#[derive(Clone, Debug)]
pub struct Oscillator {
    waveform: Waveform,
    /// Current phase (0.0 to 1.0)
    phase: f64,
    /// Phase increment per frame (frequency / sample_rate)
    increment: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f32, sample_rate: u32) -> Self {
        Self {
            waveform,
            phase: 0.0,
            increment: frequency as f64 / sample_rate.max(1) as f64,
        }
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Change the shape without resetting phase.
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    pub fn set_frequency(&mut self, frequency: f32, sample_rate: u32) {
        self.increment = frequency as f64 / sample_rate.max(1) as f64;
    }

    /// Produce one sample in [-1, 1] and advance the phase.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let t = self.phase;
        let dt = self.increment;
        let sample = match self.waveform {
            Waveform::Sine => (TAU * t).sin(),
            Waveform::Sawtooth => 2.0 * t - 1.0 - poly_blep(t, dt),
            Waveform::Square => {
                let naive = if t < 0.5 { 1.0 } else { -1.0 };
                naive + poly_blep(t, dt) - poly_blep((t + 0.5).fract(), dt)
            }
            Waveform::Triangle => 1.0 - 4.0 * (t - 0.5).abs(),
        };

        self.phase += dt;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        sample as f32
    }
}

/// Polynomial band-limited step residual around a discontinuity at phase 0.
#[inline]
fn poly_blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        0.0
    } else if t < dt {
        let x = t / dt;
        2.0 * x - x * x - 1.0
    } else if t > 1.0 - dt {
        let x = (t - 1.0) / dt;
        x * x + 2.0 * x + 1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(osc: &mut Oscillator, n: usize) -> Vec<f32> {
        (0..n).map(|_| osc.next_sample()).collect()
    }

    #[test]
    fn every_shape_stays_in_range() {
        for shape in [Waveform::Sine, Waveform::Square, Waveform::Sawtooth, Waveform::Triangle] {
            let mut osc = Oscillator::new(shape, 440.0, 44100);
            for s in render(&mut osc, 44100) {
                assert!(s.abs() <= 1.0001, "{shape:?} produced {s}");
            }
        }
    }

    #[test]
    fn sine_has_expected_period() {
        let mut osc = Oscillator::new(Waveform::Sine, 100.0, 1000);
        let out = render(&mut osc, 11);
        assert!(out[0].abs() < 1e-6);
        assert!((out[10]).abs() < 1e-4);
        assert!((out[5]).abs() < 1e-4);
        assert!(out[2] > 0.9);
    }

    #[test]
    fn square_averages_to_zero() {
        let mut osc = Oscillator::new(Waveform::Square, 441.0, 44100);
        let out = render(&mut osc, 4410);
        let mean: f32 = out.iter().sum::<f32>() / out.len() as f32;
        assert!(mean.abs() < 0.01);
    }

    #[test]
    fn waveform_switch_keeps_phase() {
        let mut osc = Oscillator::new(Waveform::Sine, 100.0, 1000);
        render(&mut osc, 3);
        osc.set_waveform(Waveform::Triangle);
        assert_eq!(osc.waveform(), Waveform::Triangle);
        let s = osc.next_sample();
        assert!((s - (1.0 - 4.0 * (0.3f32 - 0.5).abs())).abs() < 1e-4);
    }
}
