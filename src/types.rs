#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pixel formats a capture source may deliver.
///
/// Only the YUV 4:2:0 variants can be converted by
/// [`convert`](crate::convert::convert); the rest let sources describe
/// what they produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum PixelFormat {
    /// Y plane followed by one interleaved U/V plane.
    Nv12,
    /// Y plane followed by one interleaved V/U plane.
    Nv21,
    /// Separate Y, U and V planes, each with its own row and pixel stride.
    Yuv420,
    Yuyv,
    Uyvy,
    Bgra32,
    Jpeg,
}

impl PixelFormat {
    /// Number of planes the format is delivered in.
    pub fn plane_count(&self) -> usize {
        match self {
            Self::Nv12 | Self::Nv21 => 2,
            Self::Yuv420 => 3,
            Self::Yuyv | Self::Uyvy | Self::Bgra32 | Self::Jpeg => 1,
        }
    }

    /// Whether the format carries a full-resolution luma plane and 2x2
    /// subsampled chroma.
    pub fn is_yuv420(&self) -> bool {
        matches!(self, Self::Nv12 | Self::Nv21 | Self::Yuv420)
    }
}

/// Pixel dimensions of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Dimensions of a 2x2 subsampled chroma plane.
    ///
    /// Odd dimensions are floored, but never below one sample so that a
    /// one-pixel-wide frame still has chroma to clamp to.
    pub fn chroma(&self) -> Size {
        Size {
            width: (self.width / 2).max(1),
            height: (self.height / 2).max(1),
        }
    }
}

impl core::fmt::Display for Size {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chroma_floors_odd_dimensions() {
        assert_eq!(Size::new(7, 5).chroma(), Size::new(3, 2));
        assert_eq!(Size::new(640, 480).chroma(), Size::new(320, 240));
    }

    #[test]
    fn chroma_keeps_at_least_one_sample() {
        assert_eq!(Size::new(1, 1).chroma(), Size::new(1, 1));
        assert_eq!(Size::new(1, 6).chroma(), Size::new(1, 3));
    }

    #[test]
    fn plane_counts() {
        assert_eq!(PixelFormat::Nv21.plane_count(), 2);
        assert_eq!(PixelFormat::Yuv420.plane_count(), 3);
        assert!(!PixelFormat::Bgra32.is_yuv420());
    }
}
