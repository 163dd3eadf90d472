//! Sample-rate conversion for decoded audio.

use sm_ir::AudioBuffer;

/// Linear-interpolation resample of every channel from `from` to `to` Hz.
pub fn resample_linear(buffer: &AudioBuffer, from: u32, to: u32) -> AudioBuffer {
    if from == to || from == 0 || to == 0 || buffer.frames() == 0 {
        return buffer.clone();
    }
    let ratio = to as f64 / from as f64;
    let in_len = buffer.frames();
    let out_len = ((in_len as f64) * ratio).ceil() as usize;
    let mut out = AudioBuffer::new(buffer.channels(), out_len);

    for ch in 0..buffer.channels() {
        let src = buffer.channel(ch);
        let dst = out.channel_mut(ch);
        for (i, sample) in dst.iter_mut().enumerate() {
            let pos = i as f64 / ratio;
            let idx = pos as usize;
            if idx + 1 >= in_len {
                *sample = src[in_len - 1];
            } else {
                let frac = (pos - idx as f64) as f32;
                *sample = src[idx] + (src[idx + 1] - src[idx]) * frac;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize) -> AudioBuffer {
        let mut b = AudioBuffer::new(2, frames);
        for (i, s) in b.channel_mut(0).iter_mut().enumerate() {
            *s = i as f32;
        }
        b
    }

    #[test]
    fn same_rate_is_identity() {
        let b = ramp(10);
        assert_eq!(resample_linear(&b, 44100, 44100), b);
    }

    #[test]
    fn upsampling_interpolates() {
        let out = resample_linear(&ramp(4), 1, 2);
        assert_eq!(out.frames(), 8);
        assert_eq!(&out.channel(0)[..7], &[0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0]);
        // past the last input frame the tail holds
        assert_eq!(out.channel(0)[7], 3.0);
    }

    #[test]
    fn downsampling_halves_length() {
        let out = resample_linear(&ramp(100), 48000, 24000);
        assert_eq!(out.frames(), 50);
        assert_eq!(out.channel(0)[10], 20.0);
    }
}
