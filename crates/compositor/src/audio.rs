//! Audio mixing: per-source gain, sample-aligned summing, hard clipping.

use simpleobs_common::error::{ObsError, ObsResult};
use simpleobs_media::frame::AudioFrame;

/// Clip a mixed sample to the valid amplitude range. NaN mixes to silence.
#[inline]
pub fn clip_sample(sample: f32) -> f32 {
    if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    }
}

/// Summing bus with a fixed format.
#[derive(Debug, Clone)]
pub struct AudioMixer {
    sample_rate: u32,
    channels: u16,
    samples: usize,
    bus: Vec<Vec<f32>>,
}

impl AudioMixer {
    pub fn new(sample_rate: u32, channels: u16, samples: usize) -> Self {
        Self {
            sample_rate,
            channels,
            samples,
            bus: vec![vec![0.0; samples]; channels as usize],
        }
    }

    /// Zero the bus for a new render.
    pub fn clear(&mut self) {
        for channel in &mut self.bus {
            channel.fill(0.0);
        }
    }

    /// Add `frame * gain` onto the bus.
    ///
    /// Frames shorter than the bus contribute silence past their end; longer
    /// frames are truncated. A frame in a different sample rate or channel
    /// count is rejected and leaves the bus unchanged.
    pub fn accumulate(&mut self, frame: &AudioFrame, gain: f32) -> ObsResult<()> {
        if frame.sample_rate != self.sample_rate || frame.channel_count() != self.channels {
            return Err(ObsError::frame(format!(
                "{} Hz / {} ch does not match the mix format {} Hz / {} ch",
                frame.sample_rate,
                frame.channel_count(),
                self.sample_rate,
                self.channels
            )));
        }
        frame.validate()?;

        for (bus, input) in self.bus.iter_mut().zip(&frame.channels) {
            for (acc, sample) in bus.iter_mut().zip(input.iter()) {
                *acc += sample * gain;
            }
        }
        Ok(())
    }

    /// Write the clipped mix into `out`, reshaping it to the mix format.
    pub fn finish(&self, out: &mut AudioFrame) {
        out.reshape(self.sample_rate, self.channels, self.samples);
        for (dst, bus) in out.channels.iter_mut().zip(&self.bus) {
            for (d, s) in dst.iter_mut().zip(bus) {
                *d = clip_sample(*s);
            }
        }
    }
}
