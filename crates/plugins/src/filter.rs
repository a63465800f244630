//! Audio gain filter.

use std::sync::atomic::{AtomicU32, Ordering};

use simpleobs_common::error::{ObsError, ObsResult};
use simpleobs_media::component::{Component, ComponentId, Filter};
use simpleobs_media::frame::{AudioFrame, VideoFrame};

use crate::GAIN_FILTER;

/// Multiplies every audio sample by a linear gain. Video passes untouched.
///
/// The result is not clipped; encoders and outputs see the scaled values.
#[derive(Debug)]
pub struct GainFilter {
    id: ComponentId,
    name: String,
    /// `f32` bits, so the gain can change while the pipeline runs.
    gain: AtomicU32,
}

impl GainFilter {
    pub fn new(name: impl Into<String>, gain: f32) -> Self {
        Self {
            id: ComponentId::next(),
            name: name.into(),
            gain: AtomicU32::new(gain.to_bits()),
        }
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    pub fn set_gain(&self, gain: f32) -> ObsResult<()> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(ObsError::invalid_argument(format!(
                "gain must be a finite, non-negative number, got {gain}"
            )));
        }
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
        Ok(())
    }
}

impl Component for GainFilter {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn component_type(&self) -> &str {
        GAIN_FILTER
    }
}

impl Filter for GainFilter {
    fn process_video(&self, _frame: &mut VideoFrame) -> ObsResult<()> {
        Ok(())
    }

    fn process_audio(&self, frame: &mut AudioFrame) -> ObsResult<()> {
        let gain = self.gain();
        if gain == 1.0 {
            return Ok(());
        }
        for sample in frame.channels.iter_mut().flatten() {
            *sample *= gain;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_scales_all_channels() {
        let filter = GainFilter::new("vol", 0.5);
        let mut frame = AudioFrame::silence(48000, 2, 2);
        for channel in &mut frame.channels {
            channel.fill(0.8);
        }
        filter.process_audio(&mut frame).unwrap();
        assert!(frame
            .channels
            .iter()
            .flatten()
            .all(|s| (*s - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_video_is_untouched() {
        let filter = GainFilter::new("vol", 0.0);
        let mut frame = VideoFrame::solid(2, 2, [1, 2, 3, 4]);
        filter.process_video(&mut frame).unwrap();
        assert_eq!(frame, VideoFrame::solid(2, 2, [1, 2, 3, 4]));
    }

    #[test]
    fn test_set_gain_validates() {
        let filter = GainFilter::new("vol", 1.0);
        assert!(filter.set_gain(f32::NAN).is_err());
        assert!(filter.set_gain(-0.5).is_err());
        filter.set_gain(2.0).unwrap();
        assert_eq!(filter.gain(), 2.0);
    }
}
