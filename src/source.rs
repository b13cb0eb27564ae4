use core::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::frame::Frame;

/// Push-based frame delivery from a camera.
///
/// The source owns the device and its capture thread. Every frame passed to
/// the delivery callback must come back through [`release`](Self::release)
/// exactly once; the pipeline guarantees this.
pub trait CaptureSource: Send + Sync + 'static {
    type Frame: Frame + Send + 'static;
    type Error: core::error::Error + Send + Sync + 'static;

    /// Start streaming. `deliver` is invoked on the source's capture thread
    /// for each frame.
    fn start<F>(&self, deliver: F) -> Result<(), Self::Error>
    where
        F: FnMut(Self::Frame) + Send + 'static;

    /// Stop streaming and drop the delivery callback.
    fn stop(&self) -> Result<(), Self::Error>;

    /// Hand a delivered frame back to the source.
    fn release(&self, frame: Self::Frame);
}

/// Holds a delivered frame and releases it back to its source on drop.
pub(crate) struct FrameLease<'a, S: CaptureSource> {
    source: &'a S,
    /// Always `Some` until the lease is dropped.
    frame: Option<S::Frame>,
    released: &'a AtomicU64,
}

impl<'a, S: CaptureSource> FrameLease<'a, S> {
    pub(crate) fn new(source: &'a S, frame: S::Frame, released: &'a AtomicU64) -> Self {
        Self {
            source,
            frame: Some(frame),
            released,
        }
    }
}

impl<S: CaptureSource> Deref for FrameLease<'_, S> {
    type Target = S::Frame;

    fn deref(&self) -> &S::Frame {
        self.frame.as_ref().expect("frame is only taken on drop")
    }
}

impl<S: CaptureSource> Drop for FrameLease<'_, S> {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.source.release(frame);
            self.released.fetch_add(1, Ordering::Relaxed);
        }
    }
}
