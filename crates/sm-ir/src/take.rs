//! Recorded takes of the master bus.

use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Container/sample format of a recorded take.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordingFormat {
    /// 16-bit integer PCM in a RIFF/WAVE container
    #[default]
    WavPcm16,
    /// 32-bit float PCM in a RIFF/WAVE container
    WavFloat32,
}

impl RecordingFormat {
    pub fn mime_type(self) -> &'static str {
        "audio/wav"
    }

    pub fn extension(self) -> &'static str {
        "wav"
    }

    /// Bits per encoded sample.
    pub fn bits_per_sample(self) -> u16 {
        match self {
            RecordingFormat::WavPcm16 => 16,
            RecordingFormat::WavFloat32 => 32,
        }
    }
}

/// Identifier of a take, unique within a [`TakeList`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TakeId(pub u64);

/// One completed capture of the master bus. Immutable once created.
#[derive(Clone, Debug, PartialEq)]
pub struct Take {
    pub id: TakeId,
    pub name: String,
    /// Encoded audio container
    pub blob: Vec<u8>,
    pub duration_ms: u64,
    /// Wall-clock start, milliseconds since the Unix epoch
    pub started_at_ms: u64,
    pub format: RecordingFormat,
    /// Labels of the channels armed when recording started
    pub channels: Vec<String>,
}

impl Take {
    /// Suggested download file name.
    pub fn file_name(&self) -> String {
        let mut name: String = self
            .name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        if name.is_empty() {
            name.push_str("take");
        }
        name.push('.');
        name.push_str(self.format.extension());
        name
    }
}

/// Session take list, newest first.
#[derive(Clone, Debug, Default)]
pub struct TakeList {
    takes: Vec<Take>,
    next_id: u64,
}

impl TakeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the id for the next take.
    pub fn next_id(&mut self) -> TakeId {
        self.next_id += 1;
        TakeId(self.next_id)
    }

    /// Add a finished take at the front of the list.
    pub fn push(&mut self, take: Take) {
        self.takes.insert(0, take);
    }

    pub fn get(&self, id: TakeId) -> Option<&Take> {
        self.takes.iter().find(|t| t.id == id)
    }

    pub fn delete(&mut self, id: TakeId) -> ModelResult<Take> {
        let pos = self
            .takes
            .iter()
            .position(|t| t.id == id)
            .ok_or(ModelError::UnknownTake)?;
        Ok(self.takes.remove(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Take> + '_ {
        self.takes.iter()
    }

    pub fn len(&self) -> usize {
        self.takes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.takes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take(list: &mut TakeList, name: &str) -> Take {
        Take {
            id: list.next_id(),
            name: name.into(),
            blob: vec![1, 2, 3],
            duration_ms: 1000,
            started_at_ms: 0,
            format: RecordingFormat::WavPcm16,
            channels: vec!["master".into()],
        }
    }

    #[test]
    fn newest_take_first() {
        let mut list = TakeList::new();
        let first = take(&mut list, "first");
        let second = take(&mut list, "second");
        list.push(first);
        list.push(second);
        let names: Vec<&str> = list.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn delete_removes_only_that_take() {
        let mut list = TakeList::new();
        let a = take(&mut list, "a");
        let b = take(&mut list, "b");
        let a_id = a.id;
        list.push(a);
        list.push(b);
        assert_eq!(list.delete(a_id).unwrap().name, "a");
        assert_eq!(list.len(), 1);
        assert_eq!(list.delete(a_id), Err(ModelError::UnknownTake));
    }

    #[test]
    fn file_name_is_sanitized() {
        let mut list = TakeList::new();
        let t = take(&mut list, "Take 1/final");
        assert_eq!(t.file_name(), "Take_1_final.wav");
    }
}
