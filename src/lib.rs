pub mod config;
pub mod convert;
pub mod error;
pub mod filter;
pub mod frame;
pub mod image;
pub mod mailbox;
pub mod pipeline;
mod pool;
pub mod sink;
pub mod source;
pub mod stats;
pub mod types;

// Re-exports
pub use config::*;
pub use convert::{convert, convert_into, yuv_to_rgba};
pub use error::*;
pub use filter::*;
pub use frame::*;
pub use image::*;
pub use mailbox::ProcessedFrame;
pub use pipeline::*;
pub use sink::*;
pub use source::CaptureSource;
pub use stats::{PipelineStats, THROUGHPUT_WINDOW, ThroughputMeter};
pub use types::*;
