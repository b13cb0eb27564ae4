//! The single-slot hand-off between capture-side processing and the render
//! thread.

use core::time::Duration;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::config::Backpressure;
use crate::image::PackedImage;

/// A filtered frame waiting for the display.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// Position of the frame in arrival order, assigned by the pipeline.
    pub sequence: u64,
    /// Capture timestamp reported by the source.
    pub timestamp: Duration,
    pub image: PackedImage,
}

/// Result of offering a frame to the mailbox.
#[derive(Debug)]
pub(crate) enum Offer {
    /// The frame is pending. `replaced` is the unconsumed frame it evicted.
    Accepted { replaced: Option<ProcessedFrame> },
    /// The frame was older than one already accepted, or the mailbox is
    /// closed. Ownership comes back to the caller.
    Rejected(ProcessedFrame),
}

#[derive(Debug, Default)]
struct Slot {
    pending: Option<ProcessedFrame>,
    newest: Option<u64>,
    closed: bool,
}

impl Slot {
    fn refuses(&self, sequence: u64) -> bool {
        self.closed || self.newest.is_some_and(|newest| newest >= sequence)
    }
}

/// Holds at most one pending frame. Sequence numbers leaving the mailbox
/// are strictly increasing.
#[derive(Debug, Default)]
pub(crate) struct Mailbox {
    slot: Mutex<Slot>,
    /// Signalled when the pending frame is taken or the mailbox closes.
    emptied: Condvar,
    /// Signalled when a frame is posted or the mailbox closes.
    filled: Condvar,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn offer(&self, frame: ProcessedFrame, policy: Backpressure) -> Offer {
        let mut slot = self.lock();
        if slot.refuses(frame.sequence) {
            return Offer::Rejected(frame);
        }
        if let Backpressure::Wait { timeout } = policy {
            if slot.pending.is_some() {
                slot = self
                    .emptied
                    .wait_timeout_while(slot, timeout, |s| s.pending.is_some() && !s.closed)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
                // Another producer may have posted a newer frame meanwhile.
                if slot.refuses(frame.sequence) {
                    return Offer::Rejected(frame);
                }
            }
        }
        slot.newest = Some(frame.sequence);
        let replaced = slot.pending.replace(frame);
        self.filled.notify_one();
        Offer::Accepted { replaced }
    }

    /// Take the pending frame without waiting.
    pub(crate) fn take(&self) -> Option<ProcessedFrame> {
        let frame = self.lock().pending.take();
        if frame.is_some() {
            self.emptied.notify_all();
        }
        frame
    }

    /// Wait up to `timeout` for a frame to be posted, then take it.
    pub(crate) fn wait_take(&self, timeout: Duration) -> Option<ProcessedFrame> {
        let frame = self
            .filled
            .wait_timeout_while(self.lock(), timeout, |s| s.pending.is_none() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner)
            .0
            .pending
            .take();
        if frame.is_some() {
            self.emptied.notify_all();
        }
        frame
    }

    /// Refuse further frames, wake any waiters, and return the pending one.
    pub(crate) fn close(&self) -> Option<ProcessedFrame> {
        let frame = {
            let mut slot = self.lock();
            slot.closed = true;
            slot.pending.take()
        };
        self.emptied.notify_all();
        self.filled.notify_all();
        frame
    }

    /// Accept frames again after [`close`](Self::close). Ordering carries
    /// over, so a restarted pipeline never goes backwards.
    pub(crate) fn reopen(&self) {
        self.lock().closed = false;
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.lock().pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Size;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn frame(sequence: u64) -> ProcessedFrame {
        ProcessedFrame {
            sequence,
            timestamp: Duration::ZERO,
            image: PackedImage::new(Size::new(1, 1)).unwrap(),
        }
    }

    fn accepted(offer: Offer) -> Option<u64> {
        match offer {
            Offer::Accepted { replaced } => replaced.map(|f| f.sequence),
            Offer::Rejected(f) => panic!("frame {} rejected", f.sequence),
        }
    }

    #[test]
    fn drop_oldest_replaces_pending() {
        let mailbox = Mailbox::new();
        assert_eq!(accepted(mailbox.offer(frame(1), Backpressure::DropOldest)), None);
        assert_eq!(accepted(mailbox.offer(frame(2), Backpressure::DropOldest)), Some(1));
        assert_eq!(mailbox.take().map(|f| f.sequence), Some(2));
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn older_frames_are_rejected() {
        let mailbox = Mailbox::new();
        accepted(mailbox.offer(frame(5), Backpressure::DropOldest));
        mailbox.take();
        assert!(matches!(
            mailbox.offer(frame(4), Backpressure::DropOldest),
            Offer::Rejected(f) if f.sequence == 4
        ));
        assert!(matches!(
            mailbox.offer(frame(5), Backpressure::DropOldest),
            Offer::Rejected(_)
        ));
    }

    #[test]
    fn closed_mailbox_rejects_and_returns_pending() {
        let mailbox = Mailbox::new();
        accepted(mailbox.offer(frame(1), Backpressure::DropOldest));
        assert_eq!(mailbox.close().map(|f| f.sequence), Some(1));
        assert!(matches!(
            mailbox.offer(frame(2), Backpressure::DropOldest),
            Offer::Rejected(_)
        ));
        mailbox.reopen();
        assert_eq!(accepted(mailbox.offer(frame(2), Backpressure::DropOldest)), None);
    }

    #[test]
    fn wait_times_out_then_drops_oldest() {
        let mailbox = Mailbox::new();
        let policy = Backpressure::Wait {
            timeout: Duration::from_millis(20),
        };
        accepted(mailbox.offer(frame(1), policy));
        let start = Instant::now();
        assert_eq!(accepted(mailbox.offer(frame(2), policy)), Some(1));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wait_returns_once_consumer_takes() {
        let mailbox = Arc::new(Mailbox::new());
        let policy = Backpressure::Wait {
            timeout: Duration::from_secs(10),
        };
        accepted(mailbox.offer(frame(1), policy));
        let consumer = {
            let mailbox = Arc::clone(&mailbox);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                mailbox.take().map(|f| f.sequence)
            })
        };
        let start = Instant::now();
        assert_eq!(accepted(mailbox.offer(frame(2), policy)), None);
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(consumer.join().unwrap(), Some(1));
    }

    #[test]
    fn wait_take_wakes_on_post() {
        let mailbox = Arc::new(Mailbox::new());
        let producer = {
            let mailbox = Arc::clone(&mailbox);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                accepted(mailbox.offer(frame(3), Backpressure::DropOldest));
            })
        };
        let got = mailbox.wait_take(Duration::from_secs(10));
        producer.join().unwrap();
        assert_eq!(got.map(|f| f.sequence), Some(3));
        assert!(!mailbox.is_pending());
    }

    #[test]
    fn wait_take_times_out_empty() {
        let mailbox = Mailbox::new();
        assert!(mailbox.wait_take(Duration::from_millis(5)).is_none());
    }
}
