use core::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::filter::FilterParameters;
use crate::types::Size;

/// What to do with a processed frame when the display has not yet taken
/// the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Backpressure {
    /// Replace the pending frame immediately. Capture never blocks.
    #[default]
    DropOldest,
    /// Wait up to `timeout` for the display to take the pending frame,
    /// then replace it.
    Wait { timeout: Duration },
}

/// Construction-time settings for a [`FramePipeline`](crate::pipeline::FramePipeline).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    /// Resolution the capture source was configured for. Frames of any
    /// other size are rejected.
    pub resolution: Size,
    pub filter: FilterParameters,
    pub backpressure: Backpressure,
    /// Number of idle image buffers kept for reuse.
    pub pool_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolution: Size::new(640, 480),
            filter: FilterParameters::default(),
            backpressure: Backpressure::default(),
            pool_capacity: 4,
        }
    }
}

impl PipelineConfig {
    pub fn new(resolution: Size) -> Self {
        Self {
            resolution,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: FilterParameters) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }

    pub fn with_pool_capacity(mut self, pool_capacity: usize) -> Self {
        self.pool_capacity = pool_capacity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolution.is_empty() {
            return Err(Error::InvalidConfig("resolution must be non-zero"));
        }
        self.filter.validate()
    }
}
