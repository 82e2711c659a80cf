//! # Input frames

use crate::prelude::v1::*;
use opencv::core::{Mat, Scalar, CV_8UC1, CV_8UC3, CV_8UC4};
use opencv::imgproc;
use opencv::prelude::*;

/// Layout of the pixels stored in a [`Frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum PixelFormat {
    /// Single 8-bit intensity channel.
    Gray,
    /// Packed `[r, g, b]` triplets.
    Rgb,
    /// Packed `[r, g, b, a]` quadruplets.
    Rgba,
}

impl PixelFormat {
    /// Number of bytes each pixel occupies.
    pub fn channels(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    fn mat_type(self) -> i32 {
        match self {
            Self::Gray => CV_8UC1,
            Self::Rgb => CV_8UC3,
            Self::Rgba => CV_8UC4,
        }
    }
}

/// Decoded camera frame.
///
/// Frames are immutable once constructed. The constructor validates that the buffer matches the
/// dimensions and pixel format, so a `Frame` is always well formed.
#[derive(Clone, Debug)]
pub struct Frame {
    width: usize,
    height: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Frame {
    /// Create a new frame.
    ///
    /// # Arguments
    ///
    /// * `width` - width of the frame in pixels.
    /// * `height` - height of the frame in pixels.
    /// * `format` - layout of the pixels in `data`.
    /// * `data` - row-major pixel data.
    pub fn new(width: usize, height: usize, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("Frame has zero size ({width}x{height})"));
        }

        // OpenCV addresses rows and columns with i32.
        if i32::try_from(width).is_err() || i32::try_from(height).is_err() {
            return Err(anyhow!("Frame is too large ({width}x{height})"));
        }

        let expected = width
            .checked_mul(height)
            .and_then(|px| px.checked_mul(format.channels()))
            .ok_or_else(|| anyhow!("Frame size overflows ({width}x{height} {format:?})"))?;

        if data.len() != expected {
            return Err(anyhow!(
                "Frame buffer holds {} bytes, but {width}x{height} {format:?} needs {expected}",
                data.len()
            ));
        }

        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Create a single channel frame.
    pub fn gray(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        Self::new(width, height, PixelFormat::Gray, data)
    }

    /// Create a frame from packed `[r, g, b]` data.
    pub fn rgb(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        Self::new(width, height, PixelFormat::Rgb, data)
    }

    /// Create a frame from packed `[r, g, b, a]` data.
    pub fn rgba(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        Self::new(width, height, PixelFormat::Rgba, data)
    }

    /// Get width and height of the frame.
    pub fn dim(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Get the pixel format of the frame.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Get the raw pixel data.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copy the frame into an OpenCV matrix with the frame's channel count.
    pub fn to_mat(&self) -> Result<Mat> {
        let mut mat = Mat::new_rows_cols_with_default(
            self.height as _,
            self.width as _,
            self.format.mat_type(),
            Scalar::all(0.0),
        )?;

        mat.data_bytes_mut()?.copy_from_slice(&self.data);

        Ok(mat)
    }

    /// Convert the frame to a single 8-bit intensity channel (ITU-R BT.601 luma).
    pub fn to_gray(&self) -> Result<Mat> {
        let mat = self.to_mat()?;

        let code = match self.format {
            PixelFormat::Gray => return Ok(mat),
            PixelFormat::Rgb => imgproc::COLOR_RGB2GRAY,
            PixelFormat::Rgba => imgproc::COLOR_RGBA2GRAY,
        };

        let mut gray = Mat::default();
        imgproc::cvt_color(&mat, &mut gray, code, 0)?;

        Ok(gray)
    }
}
