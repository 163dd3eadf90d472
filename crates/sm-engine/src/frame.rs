//! Interleaved stereo frame handed to output backends.

/// One stereo output frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Frame {
    pub left: f32,
    pub right: f32,
}

impl Frame {
    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    /// A silent frame.
    pub fn silence() -> Self {
        Self::default()
    }

    /// Sum two frames.
    pub fn mix(self, other: Frame) -> Frame {
        Frame {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }

    /// Hard-limit both channels to [-1, 1] for device output.
    pub fn clamped(self) -> Frame {
        Frame {
            left: self.left.clamp(-1.0, 1.0),
            right: self.right.clamp(-1.0, 1.0),
        }
    }

    pub fn is_silent(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_and_clamp() {
        let f = Frame::new(0.8, -0.5).mix(Frame::new(0.5, -0.7)).clamped();
        assert_eq!(f, Frame::new(1.0, -1.0));
        assert!(Frame::silence().is_silent());
    }
}
