//! Orchestration of capture, conversion, filtering and display.
//!
//! The capture side runs in [`FramePipeline::on_frame`] on whatever thread
//! the source delivers frames on. The render side runs in
//! [`Presenter::present`] on the render thread. The two meet only at a
//! single-slot mailbox holding the latest filtered frame.

use core::time::Duration;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::convert::convert_into;
use crate::error::{Error, FormatError, Result};
use crate::filter::EdgeFilter;
use crate::frame::Frame;
use crate::mailbox::{Mailbox, Offer, ProcessedFrame};
use crate::pool::BufferPool;
use crate::sink::DisplaySink;
use crate::source::{CaptureSource, FrameLease};
use crate::stats::{Counters, PipelineStats, ThroughputMeter};

/// Receives per-frame errors the pipeline skipped over.
pub trait ErrorReporter: Send + Sync + 'static {
    fn report(&self, sequence: u64, error: &Error);
}

impl<F> ErrorReporter for F
where
    F: Fn(u64, &Error) + Send + Sync + 'static,
{
    fn report(&self, sequence: u64, error: &Error) {
        self(sequence, error)
    }
}

/// Logs skipped frames as warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, sequence: u64, error: &Error) {
        warn!(sequence, error = %error, "skipping frame");
    }
}

struct Shared<S: CaptureSource, D: DisplaySink> {
    config: PipelineConfig,
    source: Arc<S>,
    sink: Arc<D>,
    reporter: Box<dyn ErrorReporter>,
    running: AtomicBool,
    next_sequence: AtomicU64,
    filter: Mutex<EdgeFilter>,
    mailbox: Mailbox,
    pool: BufferPool,
    counters: Counters,
    meter: Mutex<ThroughputMeter>,
}

impl<S: CaptureSource, D: DisplaySink> Shared<S, D> {
    fn on_frame(&self, frame: S::Frame) {
        let frame = FrameLease::new(&*self.source, frame, &self.counters.released);
        Counters::bump(&self.counters.received);
        if !self.running.load(Ordering::Acquire) {
            debug!("pipeline stopped, releasing frame unprocessed");
            return;
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let processed = match self.process(&frame, sequence) {
            Ok(processed) => processed,
            Err(e) => {
                Counters::bump(&self.counters.failed);
                self.reporter.report(sequence, &e);
                return;
            }
        };
        Counters::bump(&self.counters.processed);
        self.record_throughput();

        match self.mailbox.offer(processed, self.config.backpressure) {
            Offer::Accepted { replaced: None } => {}
            Offer::Accepted {
                replaced: Some(old),
            } => {
                debug!(sequence = old.sequence, "display busy, dropping older frame");
                Counters::bump(&self.counters.dropped);
                self.pool.give(old.image);
            }
            Offer::Rejected(frame) => {
                debug!(sequence = frame.sequence, "frame superseded or pipeline stopping");
                Counters::bump(&self.counters.dropped);
                self.pool.give(frame.image);
            }
        }
    }

    fn process(&self, frame: &S::Frame, sequence: u64) -> Result<ProcessedFrame> {
        let size = frame.size();
        if size != self.config.resolution {
            return Err(FormatError::SizeMismatch {
                expected: self.config.resolution,
                found: size,
            }
            .into());
        }

        let mut rgba = self.pool.take();
        let mut edges = self.pool.take();
        let outcome = convert_into(frame, &mut rgba)
            .and_then(|()| self.filter().apply_into(&rgba, &mut edges));
        self.pool.give(rgba);
        match outcome {
            Ok(()) => Ok(ProcessedFrame {
                sequence,
                timestamp: frame.timestamp(),
                image: edges,
            }),
            Err(e) => {
                self.pool.give(edges);
                Err(e)
            }
        }
    }

    fn filter(&self) -> MutexGuard<'_, EdgeFilter> {
        self.filter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn meter(&self) -> MutexGuard<'_, ThroughputMeter> {
        self.meter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_throughput(&self) {
        if let Some(fps) = self.meter().record(Instant::now()) {
            info!("edge pipeline throughput: {fps:.1} fps");
        }
    }

    fn publish(&self, frame: ProcessedFrame) -> Option<u64> {
        let sequence = frame.sequence;
        let result = self.sink.publish(&frame.image, sequence);
        self.pool.give(frame.image);
        match result {
            Ok(()) => {
                Counters::bump(&self.counters.published);
                Some(sequence)
            }
            Err(Error::SinkUnavailable) => {
                debug!(sequence, "display not ready, dropping frame");
                Counters::bump(&self.counters.dropped);
                None
            }
            Err(e) => {
                Counters::bump(&self.counters.failed);
                self.reporter.report(sequence, &e);
                None
            }
        }
    }

    fn stats(&self) -> PipelineStats {
        self.counters.snapshot(self.meter().fps_at(Instant::now()))
    }
}

/// Drives frames from a [`CaptureSource`] through conversion and edge
/// detection and keeps the latest result for a [`DisplaySink`].
///
/// Every frame the pipeline receives is released back to the source
/// exactly once, whether it was displayed, dropped, or failed.
pub struct FramePipeline<S: CaptureSource, D: DisplaySink> {
    shared: Arc<Shared<S, D>>,
}

impl<S: CaptureSource, D: DisplaySink> FramePipeline<S, D> {
    /// Build a pipeline that logs skipped frames with [`TracingReporter`].
    pub fn new(config: PipelineConfig, source: Arc<S>, sink: Arc<D>) -> Result<Self> {
        Self::with_reporter(config, source, sink, TracingReporter)
    }

    pub fn with_reporter(
        config: PipelineConfig,
        source: Arc<S>,
        sink: Arc<D>,
        reporter: impl ErrorReporter,
    ) -> Result<Self> {
        config.validate()?;
        let filter = EdgeFilter::new(config.filter)?;
        let pool = BufferPool::new(config.pool_capacity);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                source,
                sink,
                reporter: Box::new(reporter),
                running: AtomicBool::new(false),
                next_sequence: AtomicU64::new(0),
                filter: Mutex::new(filter),
                mailbox: Mailbox::new(),
                pool,
                counters: Counters::default(),
                meter: Mutex::new(ThroughputMeter::new()),
            }),
        })
    }

    /// Start the source, routing its frames into [`on_frame`](Self::on_frame).
    pub fn start(&self) -> Result<()> {
        let shared = &self.shared;
        if shared.running.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyStarted);
        }
        shared.mailbox.reopen();
        shared.pool.reopen();

        // Weak handles: the source stores the callback, so strong ones
        // would keep the pipeline and the source alive forever.
        let pipeline = Arc::downgrade(shared);
        let source = Arc::downgrade(&shared.source);
        let deliver = move |frame: S::Frame| match pipeline.upgrade() {
            Some(pipeline) => pipeline.on_frame(frame),
            None => {
                if let Some(source) = source.upgrade() {
                    source.release(frame);
                }
            }
        };

        if let Err(e) = shared.source.start(deliver) {
            shared.running.store(false, Ordering::Release);
            return Err(Error::Capture(Box::new(e)));
        }
        info!(
            width = shared.config.resolution.width,
            height = shared.config.resolution.height,
            backpressure = ?shared.config.backpressure,
            "edge pipeline started"
        );
        Ok(())
    }

    /// Stop accepting frames, free pooled buffers and stop the source.
    ///
    /// Frames still in flight finish on their own thread; their results are
    /// discarded and the frames are released as usual. A producer blocked
    /// under [`Backpressure::Wait`](crate::Backpressure::Wait) is woken
    /// before the source is stopped, so a source that joins its capture
    /// thread does not sit out the timeout.
    pub fn stop(&self) -> Result<()> {
        let shared = &self.shared;
        if !shared.running.swap(false, Ordering::AcqRel) {
            return Err(Error::NotStarted);
        }
        if shared.mailbox.close().is_some() {
            Counters::bump(&shared.counters.dropped);
        }
        shared.pool.close();
        let stopped = shared.source.stop();

        let stats = shared.stats();
        info!(
            received = stats.received,
            processed = stats.processed,
            published = stats.published,
            dropped = stats.dropped,
            failed = stats.failed,
            "edge pipeline stopped"
        );
        stopped.map_err(|e| Error::Capture(Box::new(e)))
    }

    /// Process one captured frame. Called by the source's delivery
    /// callback after [`start`](Self::start), or directly by hosts that
    /// drive capture themselves.
    ///
    /// Never returns an error: failures are counted and reported, and the
    /// frame is skipped.
    pub fn on_frame(&self, frame: S::Frame) {
        self.shared.on_frame(frame);
    }

    /// A handle for the render thread.
    pub fn presenter(&self) -> Presenter<S, D> {
        Presenter {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.stats()
    }
}

impl<S: CaptureSource, D: DisplaySink> Drop for FramePipeline<S, D> {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.stop() {
                warn!(error = %e, "failed to stop edge pipeline");
            }
        }
    }
}

/// Render-thread handle that moves the latest filtered frame to the
/// [`DisplaySink`].
pub struct Presenter<S: CaptureSource, D: DisplaySink> {
    shared: Arc<Shared<S, D>>,
}

impl<S: CaptureSource, D: DisplaySink> Clone for Presenter<S, D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: CaptureSource, D: DisplaySink> Presenter<S, D> {
    /// Publish the pending frame, if any. Returns its sequence number when
    /// the sink accepted it.
    pub fn present(&self) -> Option<u64> {
        let frame = self.shared.mailbox.take()?;
        self.shared.publish(frame)
    }

    /// Like [`present`](Self::present), but wait up to `timeout` for a
    /// frame to arrive first.
    pub fn wait_and_present(&self, timeout: Duration) -> Option<u64> {
        let frame = self.shared.mailbox.wait_take(timeout)?;
        self.shared.publish(frame)
    }

    /// Whether a filtered frame is waiting for the display.
    pub fn has_pending(&self) -> bool {
        self.shared.mailbox.is_pending()
    }
}
