use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use edge_stream::{CaptureSource, FramePipeline, PipelineConfig, RawFrame, Size, SnapshotSink};
use tracing_subscriber::EnvFilter;

const RESOLUTION: Size = Size::new(320, 240);
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Stands in for a camera: renders a bright bar sweeping across a dark
/// background on its own thread.
#[derive(Default)]
struct SweepSource {
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    released: AtomicU64,
}

fn sweep_frame(n: u64) -> RawFrame {
    let width = RESOLUTION.width;
    let bar = (n * 4 % u64::from(width)) as u32;
    let luma = (0..RESOLUTION.height)
        .flat_map(|_| (0..width).map(move |x| if x.abs_diff(bar) < 24 { 220 } else { 30 }))
        .collect();
    let chroma = vec![128; RESOLUTION.chroma().pixel_count() * 2];
    RawFrame::nv12(RESOLUTION, luma, chroma).with_timestamp(FRAME_INTERVAL * n as u32)
}

impl CaptureSource for SweepSource {
    type Frame = RawFrame;
    type Error = std::io::Error;

    fn start<F>(&self, mut deliver: F) -> Result<(), Self::Error>
    where
        F: FnMut(RawFrame) + Send + 'static,
    {
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let handle = thread::Builder::new()
            .name("sweep-capture".into())
            .spawn(move || {
                let mut n = 0;
                while running.load(Ordering::SeqCst) {
                    deliver(sweep_frame(n));
                    n += 1;
                    thread::sleep(FRAME_INTERVAL);
                }
            })?;
        *self.worker.lock().unwrap() = Some(handle);
        Ok(())
    }

    fn stop(&self) -> Result<(), Self::Error> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            handle
                .join()
                .map_err(|_| std::io::Error::other("capture thread panicked"))?;
        }
        Ok(())
    }

    fn release(&self, _frame: RawFrame) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }
}

fn main() {
    // Respect RUST_LOG; default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let source = Arc::new(SweepSource::default());
    let sink = Arc::new(SnapshotSink::new());
    sink.set_ready(true);

    let pipeline = FramePipeline::new(
        PipelineConfig::new(RESOLUTION),
        Arc::clone(&source),
        Arc::clone(&sink),
    )
    .expect("invalid pipeline configuration");
    pipeline.start().expect("failed to start capture");

    // Render loop: move the latest edge map to the sink, then "upload" it.
    let presenter = pipeline.presenter();
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        presenter.wait_and_present(Duration::from_millis(100));
        if let Some(snapshot) = sink.take_update() {
            let edges = snapshot.image.pixels().filter(|p| p[0] == 255).count();
            println!("frame {:>4}: {} edge pixels", snapshot.sequence, edges);
        }
    }

    pipeline.stop().expect("failed to stop capture");
    let stats = pipeline.stats();
    println!(
        "\nreceived {} processed {} published {} dropped {} failed {} ({:.1} fps)",
        stats.received,
        stats.processed,
        stats.published,
        stats.dropped,
        stats.failed,
        stats.frames_per_second,
    );
    println!(
        "source got back {} of {} frames",
        source.released.load(Ordering::Relaxed),
        stats.received
    );
}
