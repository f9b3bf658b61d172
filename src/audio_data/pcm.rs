use crate::audio_data::TagSonicAudioData;
use crate::config::PcmFormat;
use crate::error::{Result, TagSonicError};

/// Read cursor that encodes conformed audio into integer PCM bytes.
///
/// One stream exists per playing audio instance; the decoded samples are shared.
#[derive(Debug, Clone)]
pub struct PcmStream {
    data: TagSonicAudioData,
    format: PcmFormat,
    frame: usize,
}

impl PcmStream {
    /// # Errors
    ///
    /// Returns `AudioFormat` if `data` was not conformed to `format` first.
    pub fn new(data: TagSonicAudioData, format: PcmFormat) -> Result<Self> {
        if data.channels() != format.channels || data.sample_rate() != format.sample_rate {
            return Err(TagSonicError::AudioFormat(format!(
                "Stream data is {} Hz/{} ch but the buffer expects {} Hz/{} ch",
                data.sample_rate(),
                data.channels(),
                format.sample_rate,
                format.channels
            )));
        }
        format.validate()?;
        Ok(Self {
            data,
            format,
            frame: 0,
        })
    }

    pub fn format(&self) -> &PcmFormat {
        &self.format
    }

    /// Encode as many whole frames as fit in `dst`, returning the bytes written.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let block = self.format.block_align();
        let channels = self.format.channels as usize;
        let frames = (dst.len() / block).min(self.data.total_frames() - self.frame);
        let start = self.frame * channels;
        let samples = &self.data.samples()[start..start + frames * channels];

        match self.format.bits_per_sample {
            8 => {
                for (out, &sample) in dst.iter_mut().zip(samples) {
                    *out = (sample.clamp(-1.0, 1.0) * 127.0 + 128.0) as u8;
                }
            }
            _ => {
                for (out, &sample) in dst.chunks_exact_mut(2).zip(samples) {
                    let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    out.copy_from_slice(&value.to_le_bytes());
                }
            }
        }

        self.frame += frames;
        frames * block
    }

    pub fn rewind(&mut self) {
        self.frame = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.frame >= self.data.total_frames()
    }

    /// Total playback length in milliseconds.
    pub fn length_ms(&self) -> u32 {
        (self.data.total_frames() as u64 * 1000 / self.format.sample_rate as u64) as u32
    }

    pub fn position_ms(&self) -> u32 {
        (self.frame as u64 * 1000 / self.format.sample_rate as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(samples: Vec<f32>, channels: u16, bits: u16) -> PcmStream {
        let data = TagSonicAudioData::from_samples(samples, 1000, channels).unwrap();
        PcmStream::new(data, PcmFormat::new(channels, 1000, bits)).unwrap()
    }

    #[test]
    fn test_eight_bit_encoding() {
        let mut pcm = stream(vec![0.0, 1.0, -1.0], 1, 8);
        let mut out = [0u8; 3];
        assert_eq!(pcm.read(&mut out), 3);
        assert_eq!(out, [128, 255, 1]);
        assert!(pcm.is_exhausted());
    }

    #[test]
    fn test_sixteen_bit_encoding() {
        let mut pcm = stream(vec![1.0, -1.0], 2, 16);
        let mut out = [0u8; 4];
        assert_eq!(pcm.read(&mut out), 4);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), -i16::MAX);
    }

    #[test]
    fn test_partial_read_then_rewind() {
        let mut pcm = stream(vec![0.0; 10], 1, 8);
        let mut out = [0u8; 4];
        assert_eq!(pcm.read(&mut out), 4);
        assert_eq!(pcm.read(&mut out), 4);
        assert_eq!(pcm.read(&mut out), 2);
        assert!(pcm.is_exhausted());
        assert_eq!(pcm.read(&mut out), 0);

        pcm.rewind();
        assert!(!pcm.is_exhausted());
        assert_eq!(pcm.position_ms(), 0);
        assert_eq!(pcm.length_ms(), 10);
    }

    #[test]
    fn test_rejects_unconformed_data() {
        let data = TagSonicAudioData::from_samples(vec![0.0; 4], 44100, 2).unwrap();
        assert!(PcmStream::new(data, PcmFormat::new(1, 44100, 16)).is_err());
    }
}
