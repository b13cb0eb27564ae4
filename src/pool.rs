use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::image::PackedImage;

#[derive(Debug, Default)]
struct Free {
    images: Vec<PackedImage>,
    closed: bool,
}

/// Idle image buffers kept between frames.
///
/// Buffers are taken out by value and given back when nothing references
/// them any more, so a buffer can never be reused while the display is
/// still reading it.
#[derive(Debug)]
pub(crate) struct BufferPool {
    free: Mutex<Free>,
    capacity: usize,
}

impl BufferPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Free::default()),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Free> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A buffer from the pool, or an empty one to be sized by its user.
    pub(crate) fn take(&self) -> PackedImage {
        self.lock().images.pop().unwrap_or_default()
    }

    /// Return a buffer. It is freed if the pool is full or closed.
    pub(crate) fn give(&self, image: PackedImage) {
        let mut free = self.lock();
        if !free.closed && free.images.len() < self.capacity {
            free.images.push(image);
        }
    }

    /// Free every idle buffer and stop keeping returned ones.
    pub(crate) fn close(&self) {
        let mut free = self.lock();
        free.closed = true;
        free.images = Vec::new();
    }

    pub(crate) fn reopen(&self) {
        self.lock().closed = false;
    }

    #[cfg(test)]
    pub(crate) fn idle(&self) -> usize {
        self.lock().images.len()
    }
}
