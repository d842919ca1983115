//! Converted (display-ready) frame types

use crate::error::{Error, Result};

/// Bytes per pixel of the packed RGB output
pub const RGB_BYTES_PER_PIXEL: usize = 3;

/// Width/height pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The size reported when no frame is available
    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// System-memory image in packed RGB24 layout.
///
/// The buffer length always equals `width * height * 3`; construction
/// fails otherwise, so a published frame can never disagree with its size.
#[derive(Clone)]
pub struct RgbFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    pts_us: Option<i64>,
    frame_number: u64,
}

impl RgbFrame {
    /// Wrap an already packed buffer
    pub fn from_packed(
        data: Vec<u8>,
        width: u32,
        height: u32,
        pts_us: Option<i64>,
        frame_number: u64,
    ) -> Result<Self> {
        let expected = Self::expected_size(width, height);
        if width == 0 || height == 0 || data.len() != expected {
            return Err(Error::Conversion(format!(
                "buffer of {} bytes does not match {}x{} RGB24 ({} bytes)",
                data.len(),
                width,
                height,
                expected
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            pts_us,
            frame_number,
        })
    }

    /// Copy rows out of a plane whose lines are `stride` bytes apart
    pub fn from_strided(
        plane: &[u8],
        stride: usize,
        width: u32,
        height: u32,
        pts_us: Option<i64>,
        frame_number: u64,
    ) -> Result<Self> {
        let row_bytes = width as usize * RGB_BYTES_PER_PIXEL;
        let rows = height as usize;
        if stride < row_bytes || rows == 0 || plane.len() < stride * (rows - 1) + row_bytes {
            return Err(Error::Conversion(format!(
                "plane of {} bytes with stride {} cannot hold {}x{} RGB24",
                plane.len(),
                stride,
                width,
                height
            )));
        }

        let mut data = Vec::with_capacity(row_bytes * rows);
        for row in plane.chunks(stride).take(rows) {
            data.extend_from_slice(&row[..row_bytes]);
        }

        Self::from_packed(data, width, height, pts_us, frame_number)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    /// Bytes per row (rows are packed)
    pub fn stride(&self) -> u32 {
        self.width * RGB_BYTES_PER_PIXEL as u32
    }

    /// Presentation timestamp in microseconds, if the stream carried one
    pub fn pts_us(&self) -> Option<i64> {
        self.pts_us
    }

    /// Sequential number within the session, starting at 1
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Presentation time in seconds
    pub fn pts_seconds(&self) -> Option<f64> {
        self.pts_us.map(|pts| pts as f64 / 1_000_000.0)
    }

    pub fn expected_size(width: u32, height: u32) -> usize {
        width as usize * height as usize * RGB_BYTES_PER_PIXEL
    }

    /// Create a test frame (for testing only)
    #[cfg(test)]
    pub fn test_frame(width: u32, height: u32, frame_number: u64) -> Self {
        let data = vec![(frame_number % 256) as u8; Self::expected_size(width, height)];
        Self::from_packed(data, width, height, Some(frame_number as i64 * 40_000), frame_number)
            .expect("test frame dimensions are valid")
    }
}

impl std::fmt::Debug for RgbFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RgbFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pts_us", &self.pts_us)
            .field("frame_number", &self.frame_number)
            .field("data_size", &self.data.len())
            .finish()
    }
}

/// Convert a timestamp in `num/den` time base units to microseconds
#[cfg_attr(not(feature = "ffmpeg"), allow(dead_code))]
pub(crate) fn pts_to_us(pts: i64, num: i32, den: i32) -> i64 {
    if den == 0 {
        return pts;
    }
    (pts as i128 * 1_000_000 * num as i128 / den as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = RgbFrame::test_frame(1920, 1080, 1);
        assert_eq!(frame.size(), FrameSize::new(1920, 1080));
        assert_eq!(frame.stride(), 5760);
        assert_eq!(frame.pts_seconds(), Some(0.04));
    }

    #[test]
    fn test_expected_size() {
        // 1080p RGB24 = 1920 * 1080 * 3 = 6,220,800 bytes
        assert_eq!(RgbFrame::expected_size(1920, 1080), 6_220_800);
    }

    #[test]
    fn test_mismatched_buffer_rejected() {
        let result = RgbFrame::from_packed(vec![0; 10], 4, 4, None, 1);
        assert!(matches!(result, Err(Error::Conversion(_))));

        let result = RgbFrame::from_packed(Vec::new(), 0, 0, None, 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_strided_drops_padding() {
        // 2x2 frame, 6 bytes of pixels per row padded to 8
        let plane = [1, 1, 1, 2, 2, 2, 0, 0, 3, 3, 3, 4, 4, 4, 0, 0];
        let frame = RgbFrame::from_strided(&plane, 8, 2, 2, None, 1).unwrap();
        assert_eq!(frame.data(), &[1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4]);
    }

    #[test]
    fn test_from_strided_short_plane() {
        let plane = [0u8; 10];
        assert!(RgbFrame::from_strided(&plane, 6, 2, 2, None, 1).is_err());
        assert!(RgbFrame::from_strided(&plane, 4, 2, 1, None, 1).is_err());
    }

    #[test]
    fn test_pts_conversion() {
        // 90000 pts @ 1/90000 = 1 second
        assert_eq!(pts_to_us(90_000, 1, 90_000), 1_000_000);
        assert_eq!(pts_to_us(3, 1, 25), 120_000);
        assert_eq!(pts_to_us(42, 1, 0), 42);
    }

    #[test]
    fn test_zero_size() {
        assert!(FrameSize::zero().is_empty());
        assert!(!FrameSize::new(640, 480).is_empty());
    }
}
