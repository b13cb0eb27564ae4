use core::fmt;
use std::collections::TryReserveError;

use crate::types::{PixelFormat, Size};

/// Why a frame's layout could not be converted.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FormatError {
    UnsupportedFormat(PixelFormat),
    PlaneCount {
        expected: usize,
        found: usize,
    },
    EmptyFrame,
    /// The frame does not match the resolution the pipeline was built for.
    SizeMismatch {
        expected: Size,
        found: Size,
    },
    /// A pixel stride is too small for the samples it must hold.
    PixelStride {
        plane: usize,
        bytes_per_pixel: usize,
    },
    /// A row stride is shorter than one row of samples.
    RowStride {
        plane: usize,
        bytes_per_row: usize,
        required: usize,
    },
    /// The plane buffer ends before its last addressed sample.
    PlaneTooShort {
        plane: usize,
        len: usize,
        required: usize,
    },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFormat(format) => write!(f, "unsupported pixel format {format:?}"),
            Self::PlaneCount { expected, found } => {
                write!(f, "expected {expected} planes, found {found}")
            }
            Self::EmptyFrame => f.write_str("frame has zero width or height"),
            Self::SizeMismatch { expected, found } => {
                write!(f, "frame is {found}, pipeline expects {expected}")
            }
            Self::PixelStride {
                plane,
                bytes_per_pixel,
            } => write!(f, "plane {plane}: pixel stride {bytes_per_pixel} is too small"),
            Self::RowStride {
                plane,
                bytes_per_row,
                required,
            } => write!(
                f,
                "plane {plane}: row stride {bytes_per_row} is shorter than {required}"
            ),
            Self::PlaneTooShort {
                plane,
                len,
                required,
            } => write!(f, "plane {plane}: {len} bytes, need at least {required}"),
        }
    }
}

impl core::error::Error for FormatError {}

/// Top-level crate error.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Malformed or unsupported frame layout.
    Format(FormatError),
    /// A frame buffer could not be allocated.
    Resource(TryReserveError),
    /// The display is not ready to take a frame.
    SinkUnavailable,
    InvalidConfig(&'static str),
    AlreadyStarted,
    NotStarted,
    /// The capture source failed to start or stop.
    Capture(Box<dyn core::error::Error + Send + Sync + 'static>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(e) => write!(f, "format error: {e}"),
            Self::Resource(e) => write!(f, "buffer allocation failed: {e}"),
            Self::SinkUnavailable => f.write_str("display sink unavailable"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::AlreadyStarted => f.write_str("pipeline already started"),
            Self::NotStarted => f.write_str("pipeline not started"),
            Self::Capture(e) => write!(f, "capture source error: {e}"),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Format(e) => Some(e),
            Self::Resource(e) => Some(e),
            Self::Capture(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self {
        Self::Format(e)
    }
}

impl From<TryReserveError> for Error {
    fn from(e: TryReserveError) -> Self {
        Self::Resource(e)
    }
}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use core::error::Error as _;

    #[test]
    fn display_includes_format_detail() {
        let err = Error::from(FormatError::SizeMismatch {
            expected: Size::new(640, 480),
            found: Size::new(320, 240),
        });
        assert_eq!(
            err.to_string(),
            "format error: frame is 320x240, pipeline expects 640x480"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn allocation_failure_maps_to_resource() {
        let mut buf: Vec<u8> = Vec::new();
        let reserve = buf.try_reserve_exact(usize::MAX).unwrap_err();
        let err = Error::from(reserve);
        assert!(matches!(err, Error::Resource(_)));
    }
}
