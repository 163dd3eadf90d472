//! Audio file formats for smuve.
//!
//! Encodes recorded takes and rendered audio as WAV, and decodes WAV data
//! into engine buffers at the engine's sample rate.

mod error;
mod resample;
mod wav;

pub use error::{FormatError, FormatResult};
pub use resample::resample_linear;
pub use wav::{decode_wav, encode_capture, encode_frames, encode_wav, load_wav_file, write_wav_file};
