//! Raw and encoded frame carriers.
//!
//! Frames own their buffers. Sources fill a frame handed to them by the
//! caller, so the compositor can keep one scratch frame per source and reuse
//! its allocation on every tick.

use serde::{Deserialize, Serialize};
use simpleobs_common::error::{ObsError, ObsResult};
use simpleobs_common::MAX_AUDIO_CHANNELS;

/// Maximum number of data planes a video frame may carry.
pub const MAX_PLANES: usize = 4;

/// Maximum number of channel buffers an audio frame may carry.
pub const MAX_CHANNELS: usize = MAX_AUDIO_CHANNELS as usize;

/// Pixel layout tag for a video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Packed 8-bit RGBA, straight alpha. The canvas format.
    #[default]
    Rgba8,
    /// Packed 8-bit BGRA, straight alpha.
    Bgra8,
    /// Planar Y, U, V with 2x2 chroma subsampling.
    I420,
    /// Y plane plus interleaved UV plane with 2x2 chroma subsampling.
    Nv12,
}

impl PixelFormat {
    /// Bytes per pixel for packed formats, `None` for planar ones.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            Self::Rgba8 | Self::Bgra8 => Some(4),
            Self::I420 | Self::Nv12 => None,
        }
    }

    /// Number of planes a frame of this format carries.
    pub fn plane_count(self) -> usize {
        match self {
            Self::Rgba8 | Self::Bgra8 => 1,
            Self::Nv12 => 2,
            Self::I420 => 3,
        }
    }

    /// Minimum `(stride, rows)` of a plane for the given frame size.
    fn plane_geometry(self, plane: usize, width: usize, height: usize) -> (usize, usize) {
        let chroma_w = width.div_ceil(2);
        let chroma_h = height.div_ceil(2);
        match (self, plane) {
            (Self::Rgba8 | Self::Bgra8, _) => (width * 4, height),
            (Self::I420 | Self::Nv12, 0) => (width, height),
            (Self::I420, _) => (chroma_w, chroma_h),
            (Self::Nv12, _) => (chroma_w * 2, chroma_h),
        }
    }
}

/// One plane of pixel data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plane {
    /// Row-major bytes, `stride * rows` long at minimum.
    pub data: Vec<u8>,

    /// Bytes per row, including padding.
    pub stride: usize,
}

/// A raw video frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoFrame {
    /// Populated planes, at most [`MAX_PLANES`].
    pub planes: Vec<Plane>,

    /// Width in pixels.
    pub width: u32,

    /// Height in pixels.
    pub height: u32,

    /// Pixel layout shared by every plane.
    pub format: PixelFormat,

    /// Presentation timestamp in microseconds.
    pub timestamp_us: u64,
}

impl VideoFrame {
    /// Allocate a zeroed (fully transparent for packed formats) frame.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let mut frame = Self::default();
        frame.reshape(width, height, format);
        frame
    }

    /// A frame filled with a single RGBA color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut frame = Self::new(width, height, PixelFormat::Rgba8);
        frame.fill(rgba);
        frame
    }

    /// Resize the frame's planes for a new layout, reusing existing buffers.
    ///
    /// Contents are unspecified afterwards unless the layout was unchanged.
    pub fn reshape(&mut self, width: u32, height: u32, format: PixelFormat) {
        let planes = format.plane_count();
        self.planes.resize_with(planes, Plane::default);
        for (index, plane) in self.planes.iter_mut().enumerate() {
            let (stride, rows) = format.plane_geometry(index, width as usize, height as usize);
            plane.stride = stride;
            plane.data.resize(stride * rows, 0);
        }
        self.width = width;
        self.height = height;
        self.format = format;
    }

    /// Whether the frame carries no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.planes.is_empty()
    }

    /// Check that the planes match the declared geometry and format.
    pub fn validate(&self) -> ObsResult<()> {
        if self.planes.len() > MAX_PLANES {
            return Err(ObsError::frame(format!(
                "{} planes exceeds the maximum of {MAX_PLANES}",
                self.planes.len()
            )));
        }
        if self.planes.len() != self.format.plane_count() {
            return Err(ObsError::frame(format!(
                "{:?} expects {} planes, frame has {}",
                self.format,
                self.format.plane_count(),
                self.planes.len()
            )));
        }
        for (index, plane) in self.planes.iter().enumerate() {
            let (min_stride, rows) =
                self.format
                    .plane_geometry(index, self.width as usize, self.height as usize);
            if plane.stride < min_stride {
                return Err(ObsError::frame(format!(
                    "plane {index} stride {} is below the minimum {min_stride}",
                    plane.stride
                )));
            }
            if plane.data.len() < plane.stride * rows {
                return Err(ObsError::frame(format!(
                    "plane {index} holds {} bytes, needs {}",
                    plane.data.len(),
                    plane.stride * rows
                )));
            }
        }
        Ok(())
    }

    /// Read a pixel as RGBA. Only packed formats are addressable.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel()?;
        let plane = self.planes.first()?;
        let offset = y as usize * plane.stride + x as usize * bpp;
        let px = plane.data.get(offset..offset + 4)?;
        Some(match self.format {
            PixelFormat::Bgra8 => [px[2], px[1], px[0], px[3]],
            _ => [px[0], px[1], px[2], px[3]],
        })
    }

    /// Fill every pixel of a packed frame with one RGBA color.
    pub fn fill(&mut self, rgba: [u8; 4]) {
        let Some(bpp) = self.format.bytes_per_pixel() else {
            return;
        };
        let value = match self.format {
            PixelFormat::Bgra8 => [rgba[2], rgba[1], rgba[0], rgba[3]],
            _ => rgba,
        };
        let row_bytes = self.width as usize * bpp;
        if let Some(plane) = self.planes.first_mut() {
            for row in plane.data.chunks_mut(plane.stride.max(1)) {
                let end = row_bytes.min(row.len());
                for px in row[..end].chunks_exact_mut(4) {
                    px.copy_from_slice(&value);
                }
            }
        }
    }
}

/// A raw planar audio frame with `f32` samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioFrame {
    /// One buffer per channel, at most [`MAX_CHANNELS`].
    pub channels: Vec<Vec<f32>>,

    /// Samples per channel.
    pub samples: usize,

    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Presentation timestamp in microseconds.
    pub timestamp_us: u64,
}

impl AudioFrame {
    /// A frame of silence.
    pub fn silence(sample_rate: u32, channels: u16, samples: usize) -> Self {
        let mut frame = Self::default();
        frame.reshape(sample_rate, channels, samples);
        frame
    }

    /// Resize the frame's buffers for a new layout and zero them.
    pub fn reshape(&mut self, sample_rate: u32, channels: u16, samples: usize) {
        self.channels.resize_with(channels as usize, Vec::new);
        for channel in &mut self.channels {
            channel.clear();
            channel.resize(samples, 0.0);
        }
        self.samples = samples;
        self.sample_rate = sample_rate;
    }

    /// Number of populated channels.
    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Check the per-channel length invariant.
    pub fn validate(&self) -> ObsResult<()> {
        if self.channels.len() > MAX_CHANNELS {
            return Err(ObsError::frame(format!(
                "{} channels exceeds the maximum of {MAX_CHANNELS}",
                self.channels.len()
            )));
        }
        if let Some((index, channel)) = self
            .channels
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != self.samples)
        {
            return Err(ObsError::frame(format!(
                "channel {index} holds {} samples, frame declares {}",
                channel.len(),
                self.samples
            )));
        }
        Ok(())
    }

    /// Samples interleaved channel by channel (`L R L R ...`).
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.samples * self.channels.len());
        for i in 0..self.samples {
            for channel in &self.channels {
                out.push(channel.get(i).copied().unwrap_or(0.0));
            }
        }
        out
    }
}

/// Kind of media a packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
}

/// Encoder output handed to outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    /// Media kind.
    pub kind: MediaKind,

    /// Encoded payload.
    pub data: Vec<u8>,

    /// Presentation timestamp in microseconds.
    pub pts_us: u64,

    /// Whether the packet can be decoded without earlier packets.
    pub keyframe: bool,

    /// Name of the encoder that produced the packet.
    pub encoder: String,
}
