use std::sync::{Mutex, PoisonError};

use crate::error::Result;
use crate::image::PackedImage;

/// The display side of the pipeline, typically a GPU texture.
///
/// `publish` is called from the render thread. The image is only borrowed
/// for the duration of the call and goes back to the pipeline's buffer pool
/// afterwards, so a sink must copy (or upload) whatever it keeps.
pub trait DisplaySink: Send + Sync + 'static {
    /// Take a snapshot of `image`. Return
    /// [`Error::SinkUnavailable`](crate::Error::SinkUnavailable) if the
    /// display is not ready; the frame is then dropped without a report.
    fn publish(&self, image: &PackedImage, sequence: u64) -> Result<()>;
}

/// The most recent image handed to a [`SnapshotSink`].
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub sequence: u64,
    pub image: PackedImage,
}

#[derive(Debug, Default)]
struct SnapshotState {
    latest: Option<Snapshot>,
    updated: bool,
    ready: bool,
}

/// A sink that keeps a copy of the last published image for a texture
/// upload loop to pick up.
///
/// Starts not ready; call [`set_ready`](Self::set_ready) once the surface
/// exists.
#[derive(Debug, Default)]
pub struct SnapshotSink {
    state: Mutex<SnapshotState>,
}

impl SnapshotSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.lock().ready = ready;
    }

    /// The latest image if it changed since the last call, for the upload
    /// loop to push to the GPU.
    pub fn take_update(&self) -> Option<Snapshot> {
        let mut state = self.lock();
        if !state.updated {
            return None;
        }
        state.updated = false;
        state.latest.clone()
    }

    pub fn latest_sequence(&self) -> Option<u64> {
        self.lock().latest.as_ref().map(|s| s.sequence)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SnapshotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DisplaySink for SnapshotSink {
    fn publish(&self, image: &PackedImage, sequence: u64) -> Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.ready {
            return Err(crate::Error::SinkUnavailable);
        }
        match &mut state.latest {
            // Reuse the previous snapshot's allocation.
            Some(latest) => {
                latest.image.clone_from(image);
                latest.sequence = sequence;
            }
            None => {
                state.latest = Some(Snapshot {
                    sequence,
                    image: image.clone(),
                })
            }
        }
        state.updated = true;
        Ok(())
    }
}
