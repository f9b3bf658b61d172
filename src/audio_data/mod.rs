//! Decoded sound data and the conversions that prepare it for hardware buffers.
//!
//! - [`TagSonicAudioData`]: shared, immutable, interleaved f32 samples
//! - [`DefaultAudioLoader`]: Symphonia-backed decoding from files
//! - [`AudioResampler`]: rubato-backed rate conversion
//! - [`PcmStream`]: read cursor that encodes conformed data into buffer PCM

mod default_loader;
mod load_options;
mod loader;
mod pcm;
mod resampler;

use crate::config::PcmFormat;
use crate::error::{Result, TagSonicError};
pub use default_loader::DefaultAudioLoader;
pub use load_options::{ConvertToMono, LoadOptions};
pub use loader::AudioDataLoader;
pub use pcm::PcmStream;
pub use resampler::AudioResampler;
use std::sync::Arc;
use std::time::Duration;

/// Container for decoded audio with reference-counted sharing.
///
/// Samples are stored **interleaved**: `[L0, R0, L1, R1, ...]` for stereo,
/// `[M0, M1, ...]` for mono.
#[derive(Debug, Clone)]
pub struct TagSonicAudioData {
    inner: Arc<AudioDataInner>,
}

#[derive(Debug)]
pub(crate) struct AudioDataInner {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: Duration,
    pub total_frames: usize,
}

impl TagSonicAudioData {
    /// Wrap already-decoded interleaved samples.
    ///
    /// # Errors
    ///
    /// Returns `AudioFormat` for a zero sample rate or channel count.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(TagSonicError::AudioFormat(format!(
                "Invalid audio layout: {} Hz, {} channels",
                sample_rate, channels
            )));
        }

        let total_frames = samples.len() / channels as usize;
        let duration = Duration::from_secs_f64(total_frames as f64 / sample_rate as f64);
        Ok(Self {
            inner: Arc::new(AudioDataInner {
                samples,
                sample_rate,
                channels,
                duration,
                total_frames,
            }),
        })
    }

    /// Load audio data from a file path using the default loader.
    pub fn from_path(path: &str) -> Result<Arc<Self>> {
        DefaultAudioLoader.load(path, &LoadOptions::default())
    }

    /// Load audio data from a file path with custom loading options.
    pub fn from_path_with_options(path: &str, options: &LoadOptions) -> Result<Arc<Self>> {
        DefaultAudioLoader.load(path, options)
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    pub fn duration(&self) -> Duration {
        self.inner.duration
    }

    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }

    pub fn total_frames(&self) -> usize {
        self.inner.total_frames
    }

    pub fn is_empty(&self) -> bool {
        self.inner.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.samples.len()
    }

    /// Get samples for a specific channel (0-indexed)
    pub fn channel_samples(&self, channel: usize) -> Result<Vec<f32>> {
        if channel >= self.inner.channels as usize {
            return Err(TagSonicError::AudioFormat(format!(
                "Channel {} out of range (max: {})",
                channel,
                self.inner.channels - 1
            )));
        }

        Ok(self
            .inner
            .samples
            .chunks(self.inner.channels as usize)
            .map(|frame| frame[channel])
            .collect())
    }

    /// Convert to mono by averaging all channels
    pub fn to_mono(&self) -> Result<Self> {
        if self.inner.channels == 1 {
            return Ok(self.clone());
        }

        let channels = self.inner.channels as usize;
        let mono_samples: Vec<f32> = self
            .inner
            .samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        Self::from_samples(mono_samples, self.inner.sample_rate, 1)
    }

    /// Convert to two channels: mono is duplicated, wider layouts keep their front pair.
    pub fn to_stereo(&self) -> Result<Self> {
        let channels = self.inner.channels as usize;
        let stereo_samples: Vec<f32> = match channels {
            2 => return Ok(self.clone()),
            1 => self.inner.samples.iter().flat_map(|&s| [s, s]).collect(),
            _ => self
                .inner
                .samples
                .chunks(channels)
                .flat_map(|frame| [frame[0], frame[1]])
                .collect(),
        };

        Self::from_samples(stereo_samples, self.inner.sample_rate, 2)
    }

    /// Resample to a different sample rate using rubato
    pub fn resample(&self, target_sample_rate: u32) -> Result<Self> {
        if target_sample_rate == self.inner.sample_rate {
            return Ok(self.clone());
        }

        let resampler =
            AudioResampler::new(self.inner.sample_rate, target_sample_rate, self.inner.channels)?;
        let resampled_samples = resampler.resample(&self.inner.samples)?;
        Self::from_samples(resampled_samples, target_sample_rate, self.inner.channels)
    }

    /// Convert channel count and sample rate to match a buffer format.
    ///
    /// Only 1 and 2 channel targets are supported, which covers effect and music buffers.
    pub fn conform(&self, format: &PcmFormat) -> Result<Self> {
        let remixed = match format.channels {
            1 => self.to_mono()?,
            2 => self.to_stereo()?,
            other => {
                return Err(TagSonicError::AudioFormat(format!(
                    "Cannot conform audio to {} channels",
                    other
                )));
            }
        };
        remixed.resample(format.sample_rate)
    }
}
