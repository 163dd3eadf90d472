//! Audio output backends for smuve.

mod cpal_backend;
mod null;
mod traits;

pub use cpal_backend::CpalOutput;
pub use null::NullOutput;
pub use traits::{AudioError, AudioOutput};
