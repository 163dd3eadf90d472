//! Uniformly partitioned FFT convolution.
//!
//! The impulse response is split into partitions of one block each. Every
//! partition is transformed once at construction; at run time each input
//! block is transformed, pushed into a frequency-domain delay line and
//! multiplied against all partitions (overlap-save). Processing happens on
//! whole blocks behind an input/output FIFO, so the output lags the input
//! by exactly one block.

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use sm_ir::AudioBuffer;

const ZERO: Complex<f32> = Complex { re: 0.0, im: 0.0 };

struct ChannelState {
    /// Spectra of the impulse response partitions
    partitions: Vec<Vec<Complex<f32>>>,
    /// Spectra of past input blocks, newest at `head`
    history: Vec<Vec<Complex<f32>>>,
    head: usize,
    /// Previous and current input block, time domain
    window: Vec<f32>,
    input: Vec<f32>,
    output: Vec<f32>,
}

/// Stereo partitioned convolver.
pub struct Convolver {
    block: usize,
    fft_size: usize,
    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,
    channels: Vec<ChannelState>,
    time: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    /// Position inside the current block
    pos: usize,
}

impl Convolver {
    /// Build a convolver for `impulse`, processing `block` frames at a time.
    ///
    /// A mono impulse is used for both channels.
    pub fn new(impulse: &AudioBuffer, block: usize) -> Self {
        let block = block.max(1);
        let fft_size = block * 2;
        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(fft_size);
        let c2r = planner.plan_fft_inverse(fft_size);
        let bins = fft_size / 2 + 1;
        let scratch_len = r2c.get_scratch_len().max(c2r.get_scratch_len());

        let mut time = vec![0.0; fft_size];
        let mut scratch = vec![ZERO; scratch_len];
        let count = impulse.frames().div_ceil(block).max(1);

        let channels = (0..2)
            .map(|ch| {
                let ir = impulse.channel(ch.min(impulse.channels() - 1));
                let partitions = (0..count)
                    .map(|p| {
                        time.fill(0.0);
                        let start = p * block;
                        let end = (start + block).min(ir.len());
                        if start < end {
                            time[..end - start].copy_from_slice(&ir[start..end]);
                        }
                        let mut spectrum = vec![ZERO; bins];
                        if r2c
                            .process_with_scratch(&mut time, &mut spectrum, &mut scratch)
                            .is_err()
                        {
                            spectrum.fill(ZERO);
                        }
                        spectrum
                    })
                    .collect();
                ChannelState {
                    partitions,
                    history: vec![vec![ZERO; bins]; count],
                    head: 0,
                    window: vec![0.0; fft_size],
                    input: vec![0.0; block],
                    output: vec![0.0; block],
                }
            })
            .collect();

        Self {
            block,
            fft_size,
            r2c,
            c2r,
            channels,
            time,
            spectrum: vec![ZERO; bins],
            scratch,
            pos: 0,
        }
    }

    /// Delay between input and output, in frames.
    pub fn latency(&self) -> usize {
        self.block
    }

    /// Number of impulse partitions per channel.
    pub fn partitions(&self) -> usize {
        self.channels.first().map_or(0, |c| c.partitions.len())
    }

    /// Convolve a stereo block. Output slices must be as long as the input.
    pub fn process(&mut self, left: &[f32], right: &[f32], out_left: &mut [f32], out_right: &mut [f32]) {
        let frames = left.len().min(right.len()).min(out_left.len()).min(out_right.len());
        for i in 0..frames {
            let pos = self.pos;
            self.channels[0].input[pos] = left[i];
            self.channels[1].input[pos] = right[i];
            out_left[i] = self.channels[0].output[pos];
            out_right[i] = self.channels[1].output[pos];
            self.pos += 1;
            if self.pos == self.block {
                self.pos = 0;
                for ch in 0..self.channels.len() {
                    self.run_block(ch);
                }
            }
        }
    }

    fn run_block(&mut self, ch: usize) {
        let block = self.block;
        let state = &mut self.channels[ch];

        // slide the window: previous block, then the new one
        state.window.copy_within(block.., 0);
        state.window[block..].copy_from_slice(&state.input);

        let count = state.history.len();
        state.head = (state.head + 1) % count;
        self.time.copy_from_slice(&state.window);
        let head = state.head;
        if self
            .r2c
            .process_with_scratch(&mut self.time, &mut state.history[head], &mut self.scratch)
            .is_err()
        {
            state.history[head].fill(ZERO);
        }

        self.spectrum.fill(ZERO);
        for (p, h) in state.partitions.iter().enumerate() {
            let x = &state.history[(head + count - p) % count];
            for ((acc, a), b) in self.spectrum.iter_mut().zip(x).zip(h) {
                *acc += a * b;
            }
        }
        // c2r rejects imaginary parts on the DC and Nyquist bins
        if let Some(first) = self.spectrum.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = self.spectrum.last_mut() {
            last.im = 0.0;
        }

        if self
            .c2r
            .process_with_scratch(&mut self.spectrum, &mut self.time, &mut self.scratch)
            .is_err()
        {
            state.output.fill(0.0);
            return;
        }
        let scale = 1.0 / self.fft_size as f32;
        for (out, t) in state.output.iter_mut().zip(&self.time[block..]) {
            *out = t * scale;
        }
    }

    /// Clear all history and pending output.
    pub fn reset(&mut self) {
        for state in &mut self.channels {
            for spectrum in &mut state.history {
                spectrum.fill(ZERO);
            }
            state.window.fill(0.0);
            state.input.fill(0.0);
            state.output.fill(0.0);
        }
        self.pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(conv: &mut Convolver, input: &[f32]) -> Vec<f32> {
        let mut out_l = vec![0.0; input.len()];
        let mut out_r = vec![0.0; input.len()];
        conv.process(input, input, &mut out_l, &mut out_r);
        assert_eq!(out_l, out_r);
        out_l
    }

    #[test]
    fn short_impulse_after_one_block() {
        let ir = AudioBuffer::from_interleaved(&[1.0, 0.5], 1);
        let mut conv = Convolver::new(&ir, 8);
        let mut input = vec![0.0; 32];
        input[0] = 1.0;
        let out = run(&mut conv, &input);
        assert!(out[..8].iter().all(|s| s.abs() < 1e-6));
        assert!((out[8] - 1.0).abs() < 1e-5);
        assert!((out[9] - 0.5).abs() < 1e-5);
        assert!(out[10..].iter().all(|s| s.abs() < 1e-5));
    }

    #[test]
    fn long_impulse_spans_partitions() {
        let mut taps = vec![0.0; 20];
        taps[13] = 0.25;
        let ir = AudioBuffer::from_interleaved(&taps, 1);
        let mut conv = Convolver::new(&ir, 4);
        assert_eq!(conv.partitions(), 5);
        let mut input = vec![0.0; 40];
        input[2] = 1.0;
        let out = run(&mut conv, &input);
        let peak = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(2 + 13 + 4));
        assert!((out[19] - 0.25).abs() < 1e-5);
    }

    #[test]
    fn matches_direct_convolution() {
        let taps: Vec<f32> = (0..10).map(|i| 1.0 / (i as f32 + 1.0)).collect();
        let ir = AudioBuffer::from_interleaved(&taps, 1);
        let mut conv = Convolver::new(&ir, 4);
        let input: Vec<f32> = (0..24).map(|i| ((i * 7) % 5) as f32 - 2.0).collect();
        let out = run(&mut conv, &input);
        for n in 4..24 {
            let expected: f32 = (0..taps.len())
                .filter(|&k| k <= n - 4)
                .map(|k| taps[k] * input[n - 4 - k])
                .sum();
            assert!((out[n] - expected).abs() < 1e-4, "frame {n}: {} vs {expected}", out[n]);
        }
    }

    #[test]
    fn reset_clears_tail() {
        let ir = AudioBuffer::from_interleaved(&[1.0; 12], 1);
        let mut conv = Convolver::new(&ir, 4);
        run(&mut conv, &[1.0; 8]);
        conv.reset();
        let out = run(&mut conv, &[0.0; 16]);
        assert!(out.iter().all(|s| *s == 0.0));
    }
}
