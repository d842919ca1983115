//! Stream information types

use crate::session::config::HardwareDevice;

/// Codecs with a hardware decode path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    H264,
    Hevc,
}

impl CodecKind {
    /// Short codec name
    pub fn name(self) -> &'static str {
        match self {
            CodecKind::H264 => "h264",
            CodecKind::Hevc => "hevc",
        }
    }

    /// Name of the FFmpeg decoder that decodes this codec on `device`
    pub fn hardware_decoder_name(self, device: HardwareDevice) -> &'static str {
        match (self, device) {
            (CodecKind::H264, HardwareDevice::Cuda) => "h264_cuvid",
            (CodecKind::Hevc, HardwareDevice::Cuda) => "hevc_cuvid",
        }
    }
}

impl std::fmt::Display for CodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Properties of the selected video stream, known after initialization
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Source URL
    pub url: String,

    /// Index of the selected video stream in the container
    pub stream_index: usize,

    /// Video codec
    pub codec: CodecKind,

    /// Decoder in use (e.g. "h264_cuvid")
    pub decoder_name: String,

    /// Coded width in pixels (0 if not signalled before the first frame)
    pub width: u32,

    /// Coded height in pixels
    pub height: u32,

    /// Frame rate in frames per second (informational)
    pub frame_rate: f64,

    /// Container/demuxer name (e.g. "rtsp")
    pub container_format: String,
}

impl StreamInfo {
    /// Nominal frame interval in microseconds
    pub fn frame_interval_us(&self) -> Option<i64> {
        if self.frame_rate > 0.0 {
            Some((1_000_000.0 / self.frame_rate) as i64)
        } else {
            None
        }
    }
}

/// Frame rate from a rational, 0.0 when the denominator is unset
pub fn frame_rate_from(numerator: i32, denominator: i32) -> f64 {
    if denominator > 0 && numerator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cuda_decoder_names() {
        assert_eq!(
            CodecKind::H264.hardware_decoder_name(HardwareDevice::Cuda),
            "h264_cuvid"
        );
        assert_eq!(
            CodecKind::Hevc.hardware_decoder_name(HardwareDevice::Cuda),
            "hevc_cuvid"
        );
    }

    #[test]
    fn test_frame_rate() {
        assert_eq!(frame_rate_from(25, 1), 25.0);
        assert!((frame_rate_from(30000, 1001) - 29.97).abs() < 0.01);
        assert_eq!(frame_rate_from(0, 0), 0.0);
    }

    #[test]
    fn test_frame_interval() {
        let info = StreamInfo {
            url: "rtsp://camera/stream".to_string(),
            stream_index: 0,
            codec: CodecKind::H264,
            decoder_name: "h264_cuvid".to_string(),
            width: 1920,
            height: 1080,
            frame_rate: 25.0,
            container_format: "rtsp".to_string(),
        };
        assert_eq!(info.frame_interval_us(), Some(40_000));

        let unknown = StreamInfo {
            frame_rate: 0.0,
            ..info
        };
        assert_eq!(unknown.frame_interval_us(), None);
    }
}
