//! YUV 4:2:0 to RGBA conversion.
//!
//! Chroma is upsampled by replication: each chroma sample covers the 2x2
//! luma block above it. Colours use the BT.601 video-range matrix in 20-bit
//! fixed point with round-half-up, so results are exact and reproducible.

use crate::error::{FormatError, Result};
use crate::frame::{Frame, Plane};
use crate::image::{BYTES_PER_PIXEL, PackedImage};
use crate::types::{PixelFormat, Size};

const SHIFT: u32 = 20;
const ROUND: i32 = 1 << (SHIFT - 1);
const CY: i32 = 1_220_542;
const CUB: i32 = 2_116_026;
const CUG: i32 = -409_993;
const CVG: i32 = -852_492;
const CVR: i32 = 1_673_527;

/// Where one channel's samples live inside a plane.
#[derive(Debug, Clone, Copy)]
struct Channel<'a> {
    data: &'a [u8],
    bytes_per_row: usize,
    bytes_per_pixel: usize,
    offset: usize,
}

impl<'a> Channel<'a> {
    /// Validate that `cols x rows` samples starting at `offset` fit in `plane`.
    fn new(
        index: usize,
        plane: &Plane<'a>,
        cols: usize,
        rows: usize,
        offset: usize,
        min_pixel_stride: usize,
    ) -> Result<Self> {
        if plane.bytes_per_pixel < min_pixel_stride {
            return Err(FormatError::PixelStride {
                plane: index,
                bytes_per_pixel: plane.bytes_per_pixel,
            }
            .into());
        }
        let row_span = (cols - 1)
            .checked_mul(plane.bytes_per_pixel)
            .and_then(|span| span.checked_add(offset + 1))
            .ok_or(FormatError::PixelStride {
                plane: index,
                bytes_per_pixel: plane.bytes_per_pixel,
            })?;
        if rows > 1 && plane.bytes_per_row < row_span {
            return Err(FormatError::RowStride {
                plane: index,
                bytes_per_row: plane.bytes_per_row,
                required: row_span,
            }
            .into());
        }
        // The last row may be truncated to its samples; some camera stacks
        // do not pad it out to the full stride.
        let required = (rows - 1)
            .checked_mul(plane.bytes_per_row)
            .and_then(|n| n.checked_add(row_span))
            .unwrap_or(usize::MAX);
        if plane.data.len() < required {
            return Err(FormatError::PlaneTooShort {
                plane: index,
                len: plane.data.len(),
                required,
            }
            .into());
        }
        Ok(Self {
            data: plane.data,
            bytes_per_row: plane.bytes_per_row,
            bytes_per_pixel: plane.bytes_per_pixel,
            offset,
        })
    }

    #[inline]
    fn row(&self, y: usize) -> &'a [u8] {
        &self.data[y * self.bytes_per_row..]
    }

    #[inline]
    fn sample(&self, row: &[u8], x: usize) -> u8 {
        row[x * self.bytes_per_pixel + self.offset]
    }
}

struct Layout<'a> {
    luma: Channel<'a>,
    u: Channel<'a>,
    v: Channel<'a>,
    chroma: Size,
}

fn layout<'a>(format: PixelFormat, size: Size, planes: &[Plane<'a>]) -> Result<Layout<'a>> {
    if !format.is_yuv420() {
        return Err(FormatError::UnsupportedFormat(format).into());
    }
    if planes.len() != format.plane_count() {
        return Err(FormatError::PlaneCount {
            expected: format.plane_count(),
            found: planes.len(),
        }
        .into());
    }
    if size.is_empty() {
        return Err(FormatError::EmptyFrame.into());
    }

    let (w, h) = (size.width as usize, size.height as usize);
    let chroma = size.chroma();
    let (cw, ch) = (chroma.width as usize, chroma.height as usize);
    let luma = Channel::new(0, &planes[0], w, h, 0, 1)?;

    let (u, v) = match format {
        PixelFormat::Nv12 => (
            Channel::new(1, &planes[1], cw, ch, 0, 2)?,
            Channel::new(1, &planes[1], cw, ch, 1, 2)?,
        ),
        PixelFormat::Nv21 => (
            Channel::new(1, &planes[1], cw, ch, 1, 2)?,
            Channel::new(1, &planes[1], cw, ch, 0, 2)?,
        ),
        _ => (
            Channel::new(1, &planes[1], cw, ch, 0, 1)?,
            Channel::new(2, &planes[2], cw, ch, 0, 1)?,
        ),
    };

    Ok(Layout { luma, u, v, chroma })
}

/// Convert one YUV sample to RGBA.
#[inline]
pub fn yuv_to_rgba(y: u8, u: u8, v: u8) -> [u8; 4] {
    let y = (i32::from(y) - 16).max(0) * CY;
    let u = i32::from(u) - 128;
    let v = i32::from(v) - 128;
    let r = (y + CVR * v + ROUND) >> SHIFT;
    let g = (y + CVG * v + CUG * u + ROUND) >> SHIFT;
    let b = (y + CUB * u + ROUND) >> SHIFT;
    [clamp(r), clamp(g), clamp(b), u8::MAX]
}

#[inline]
fn clamp(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Convert a frame into a newly allocated RGBA image.
pub fn convert<F: Frame + ?Sized>(frame: &F) -> Result<PackedImage> {
    let mut image = PackedImage::empty();
    convert_into(frame, &mut image)?;
    Ok(image)
}

/// Convert a frame into `dst`, reusing its allocation.
///
/// `dst` takes the frame's dimensions. On error its contents are
/// unspecified but it stays valid for reuse.
pub fn convert_into<F: Frame + ?Sized>(frame: &F, dst: &mut PackedImage) -> Result<()> {
    let size = frame.size();
    let planes = frame.planes();
    let layout = layout(frame.pixel_format(), size, &planes)?;
    dst.reshape(size)?;

    let width = size.width as usize;
    let last_cx = layout.chroma.width as usize - 1;
    let last_cy = layout.chroma.height as usize - 1;

    for (y, out) in dst
        .as_bytes_mut()
        .chunks_exact_mut(width * BYTES_PER_PIXEL)
        .enumerate()
    {
        let cy = (y / 2).min(last_cy);
        let luma_row = layout.luma.row(y);
        let u_row = layout.u.row(cy);
        let v_row = layout.v.row(cy);
        for (x, px) in out.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let cx = (x / 2).min(last_cx);
            let rgba = yuv_to_rgba(
                layout.luma.sample(luma_row, x),
                layout.u.sample(u_row, cx),
                layout.v.sample(v_row, cx),
            );
            px.copy_from_slice(&rgba);
        }
    }
    Ok(())
}
