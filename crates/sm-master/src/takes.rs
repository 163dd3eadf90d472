//! Turning captures into takes and writing them out.

use std::path::{Path, PathBuf};

use sm_engine::Capture;
use sm_ir::{Take, TakeId};

use crate::error::ControllerResult;

/// Encode a capture into an immutable take.
pub fn assemble_take(id: TakeId, capture: Capture) -> ControllerResult<Take> {
    let blob = sm_formats::encode_capture(&capture)?;
    let duration_ms = capture.duration_ms();
    log::info!("take {} '{}': {} ms, {} bytes", id.0, capture.name, duration_ms, blob.len());
    Ok(Take {
        id,
        name: capture.name,
        blob,
        duration_ms,
        started_at_ms: capture.started_at_ms,
        format: capture.format,
        channels: capture.channels,
    })
}

/// Write a take's blob. A directory target gets the take's own file name.
pub fn export_take(take: &Take, target: &Path) -> ControllerResult<PathBuf> {
    let path = if target.is_dir() {
        target.join(take.file_name())
    } else {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        target.to_path_buf()
    };
    std::fs::write(&path, &take.blob)?;
    log::info!("exported take {} to {}", take.id.0, path.display());
    Ok(path)
}
