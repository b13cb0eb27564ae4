use crate::error::Result;
use crate::types::Size;

/// Bytes per pixel of a [`PackedImage`].
pub const BYTES_PER_PIXEL: usize = 4;

/// An RGBA8 image, row-major with no row padding.
#[derive(PartialEq, Eq)]
pub struct PackedImage {
    size: Size,
    data: Vec<u8>,
}

impl PackedImage {
    /// An image with no pixels, used as a placeholder buffer.
    pub const fn empty() -> Self {
        Self {
            size: Size::new(0, 0),
            data: Vec::new(),
        }
    }

    /// Allocate a transparent black image.
    pub fn new(size: Size) -> Result<Self> {
        let mut image = Self::empty();
        image.reshape(size)?;
        Ok(image)
    }

    /// Wrap existing RGBA bytes. Returns `None` if the length does not match.
    pub fn from_rgba(size: Size, data: Vec<u8>) -> Option<Self> {
        (data.len() == size.pixel_count() * BYTES_PER_PIXEL).then_some(Self { size, data })
    }

    /// Resize the buffer to hold `size`, reusing the allocation when it is
    /// large enough. Pixel contents are unspecified afterwards.
    pub fn reshape(&mut self, size: Size) -> Result<()> {
        let len = size.pixel_count() * BYTES_PER_PIXEL;
        if len > self.data.len() {
            self.data.try_reserve_exact(len - self.data.len())?;
        }
        self.data.resize(len, 0);
        self.size = size;
        Ok(())
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn bytes_per_row(&self) -> usize {
        self.size.width as usize * BYTES_PER_PIXEL
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// The RGBA value at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(x < self.size.width && y < self.size.height, "pixel out of bounds");
        let i = (y as usize * self.size.width as usize + x as usize) * BYTES_PER_PIXEL;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    pub fn pixels(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(BYTES_PER_PIXEL)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        // chunks_exact panics on a zero chunk size.
        self.data.chunks_exact(self.bytes_per_row().max(1))
    }
}

impl Clone for PackedImage {
    fn clone(&self) -> Self {
        Self {
            size: self.size,
            data: self.data.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.size = source.size;
        self.data.clone_from(&source.data);
    }
}

impl Default for PackedImage {
    fn default() -> Self {
        Self::empty()
    }
}

impl core::fmt::Debug for PackedImage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PackedImage({}, {} bytes)", self.size, self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reshape_reuses_allocation() {
        let mut image = PackedImage::new(Size::new(8, 8)).unwrap();
        let capacity = image.as_bytes().len();
        image.reshape(Size::new(4, 4)).unwrap();
        assert_eq!(image.as_bytes().len(), 64);
        image.reshape(Size::new(8, 8)).unwrap();
        assert_eq!(image.as_bytes().len(), capacity);
    }

    #[test]
    fn from_rgba_checks_length() {
        assert!(PackedImage::from_rgba(Size::new(2, 2), vec![0; 16]).is_some());
        assert!(PackedImage::from_rgba(Size::new(2, 2), vec![0; 15]).is_none());
    }

    #[test]
    fn pixel_reads_rgba() {
        let data = (0..16).collect::<Vec<u8>>();
        let image = PackedImage::from_rgba(Size::new(2, 2), data).unwrap();
        assert_eq!(image.pixel(1, 1), [12, 13, 14, 15]);
        assert_eq!(image.rows().count(), 2);
    }
}
