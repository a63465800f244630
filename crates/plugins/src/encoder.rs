//! Passthrough "encoder" that packs raw frames into packets.

use std::sync::atomic::{AtomicU64, Ordering};

use simpleobs_common::error::{ObsError, ObsResult};
use simpleobs_media::component::{Component, ComponentId, Encoder};
use simpleobs_media::frame::{AudioFrame, EncodedPacket, MediaKind, VideoFrame};

use crate::RAW_ENCODER;

/// Emits one packet per frame carrying the raw plane bytes (video) or
/// little-endian interleaved `f32` samples (audio). Every packet is a
/// keyframe.
#[derive(Debug)]
pub struct RawEncoder {
    id: ComponentId,
    name: String,
    video_packets: AtomicU64,
    audio_packets: AtomicU64,
}

impl RawEncoder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ComponentId::next(),
            name: name.into(),
            video_packets: AtomicU64::new(0),
            audio_packets: AtomicU64::new(0),
        }
    }

    /// Packets produced so far, `(video, audio)`.
    pub fn packet_counts(&self) -> (u64, u64) {
        (
            self.video_packets.load(Ordering::Relaxed),
            self.audio_packets.load(Ordering::Relaxed),
        )
    }

    fn packet(&self, kind: MediaKind, data: Vec<u8>, pts_us: u64) -> EncodedPacket {
        EncodedPacket {
            kind,
            data,
            pts_us,
            keyframe: true,
            encoder: self.name.clone(),
        }
    }
}

impl Component for RawEncoder {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn component_type(&self) -> &str {
        RAW_ENCODER
    }
}

impl Encoder for RawEncoder {
    fn encode_video(&self, frame: &VideoFrame) -> ObsResult<Vec<EncodedPacket>> {
        frame
            .validate()
            .map_err(|e| ObsError::encoder(format!("{}: {e}", self.name)))?;
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        let size = frame.planes.iter().map(|p| p.data.len()).sum();
        let mut data = Vec::with_capacity(size);
        for plane in &frame.planes {
            data.extend_from_slice(&plane.data);
        }

        self.video_packets.fetch_add(1, Ordering::Relaxed);
        Ok(vec![self.packet(MediaKind::Video, data, frame.timestamp_us)])
    }

    fn encode_audio(&self, frame: &AudioFrame) -> ObsResult<Vec<EncodedPacket>> {
        frame
            .validate()
            .map_err(|e| ObsError::encoder(format!("{}: {e}", self.name)))?;
        if frame.samples == 0 {
            return Ok(Vec::new());
        }

        let data = frame
            .interleaved()
            .into_iter()
            .flat_map(f32::to_le_bytes)
            .collect();

        self.audio_packets.fetch_add(1, Ordering::Relaxed);
        Ok(vec![self.packet(MediaKind::Audio, data, frame.timestamp_us)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_packet_carries_plane_bytes() {
        let encoder = RawEncoder::new("raw");
        let mut frame = VideoFrame::solid(2, 1, [1, 2, 3, 4]);
        frame.timestamp_us = 16_667;

        let packets = encoder.encode_video(&frame).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data, vec![1, 2, 3, 4, 1, 2, 3, 4]);
        assert_eq!(packets[0].pts_us, 16_667);
        assert_eq!(packets[0].kind, MediaKind::Video);
        assert!(packets[0].keyframe);
        assert_eq!(packets[0].encoder, "raw");
    }

    #[test]
    fn test_audio_packet_is_interleaved_le_f32() {
        let encoder = RawEncoder::new("raw");
        let mut frame = AudioFrame::silence(48000, 2, 1);
        frame.channels[0][0] = 0.5;
        frame.channels[1][0] = -1.0;

        let packets = encoder.encode_audio(&frame).unwrap();
        let mut expected = 0.5f32.to_le_bytes().to_vec();
        expected.extend_from_slice(&(-1.0f32).to_le_bytes());
        assert_eq!(packets[0].data, expected);
        assert_eq!(encoder.packet_counts(), (0, 1));
    }

    #[test]
    fn test_empty_frames_produce_no_packets() {
        let encoder = RawEncoder::new("raw");
        assert!(encoder.encode_video(&VideoFrame::default()).unwrap().is_empty());
        assert!(encoder.encode_audio(&AudioFrame::default()).unwrap().is_empty());
        assert_eq!(encoder.packet_counts(), (0, 0));
    }

    #[test]
    fn test_malformed_frame_is_an_encoder_error() {
        let encoder = RawEncoder::new("raw");
        let mut frame = AudioFrame::silence(48000, 2, 4);
        frame.channels[1].pop();
        assert!(matches!(
            encoder.encode_audio(&frame),
            Err(ObsError::Encoder { .. })
        ));
    }
}
