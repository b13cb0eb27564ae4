use core::time::Duration;

use arrayvec::ArrayVec;

use crate::error::{Error, FormatError};
use crate::types::{PixelFormat, Size};

/// Maximum number of planes a frame can carry.
pub const MAX_PLANES: usize = 3;

/// A borrowed view of one plane of image data.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub bytes_per_row: usize,
    /// Distance in bytes between two horizontally adjacent samples.
    pub bytes_per_pixel: usize,
}

/// A captured video frame.
///
/// The pipeline only reads a frame; it never mutates plane data and hands
/// the frame back to its source once processed.
pub trait Frame {
    fn pixel_format(&self) -> PixelFormat;
    fn size(&self) -> Size;
    fn planes(&self) -> ArrayVec<Plane<'_>, MAX_PLANES>;
    fn timestamp(&self) -> Duration;
}

/// One owned plane of a [`RawFrame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneBuffer {
    pub data: Vec<u8>,
    pub bytes_per_row: usize,
    pub bytes_per_pixel: usize,
}

impl PlaneBuffer {
    pub fn new(data: Vec<u8>, bytes_per_row: usize, bytes_per_pixel: usize) -> Self {
        Self {
            data,
            bytes_per_row,
            bytes_per_pixel,
        }
    }

    fn as_plane(&self) -> Plane<'_> {
        Plane {
            data: &self.data,
            bytes_per_row: self.bytes_per_row,
            bytes_per_pixel: self.bytes_per_pixel,
        }
    }
}

/// A frame whose planes have been copied out of device memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pixel_format: PixelFormat,
    size: Size,
    timestamp: Duration,
    planes: ArrayVec<PlaneBuffer, MAX_PLANES>,
}

impl RawFrame {
    /// Build a frame from its planes.
    ///
    /// Only the number of planes is checked here; layout is validated when
    /// the frame is converted.
    pub fn from_planes(
        pixel_format: PixelFormat,
        size: Size,
        timestamp: Duration,
        planes: impl IntoIterator<Item = PlaneBuffer>,
    ) -> Result<Self, Error> {
        let mut stored = ArrayVec::new();
        let mut found = 0;
        for plane in planes {
            found += 1;
            // Keep counting past capacity so the error reports the real number.
            let _ = stored.try_push(plane);
        }
        if found > MAX_PLANES {
            return Err(FormatError::PlaneCount {
                expected: pixel_format.plane_count(),
                found,
            }
            .into());
        }
        Ok(Self {
            pixel_format,
            size,
            timestamp,
            planes: stored,
        })
    }

    /// A tightly packed NV12 frame: `luma` is `width * height` bytes and
    /// `chroma` holds one interleaved U/V pair per 2x2 block, rows of
    /// [`Size::chroma`] width.
    pub fn nv12(size: Size, luma: Vec<u8>, chroma: Vec<u8>) -> Self {
        Self::semi_planar(PixelFormat::Nv12, size, luma, chroma)
    }

    /// Like [`RawFrame::nv12`] with V/U ordering.
    pub fn nv21(size: Size, luma: Vec<u8>, chroma: Vec<u8>) -> Self {
        Self::semi_planar(PixelFormat::Nv21, size, luma, chroma)
    }

    fn semi_planar(pixel_format: PixelFormat, size: Size, luma: Vec<u8>, chroma: Vec<u8>) -> Self {
        let width = size.width as usize;
        let mut planes = ArrayVec::new();
        planes.push(PlaneBuffer::new(luma, width, 1));
        planes.push(PlaneBuffer::new(chroma, size.chroma().width as usize * 2, 2));
        Self {
            pixel_format,
            size,
            timestamp: Duration::ZERO,
            planes,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn plane_buffers(&self) -> &[PlaneBuffer] {
        &self.planes
    }
}

impl Frame for RawFrame {
    fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn size(&self) -> Size {
        self.size
    }

    fn planes(&self) -> ArrayVec<Plane<'_>, MAX_PLANES> {
        self.planes.iter().map(PlaneBuffer::as_plane).collect()
    }

    fn timestamp(&self) -> Duration {
        self.timestamp
    }
}
