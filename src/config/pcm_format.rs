use crate::error::{Result, TagSonicError};

/// Integer PCM format of a hardware buffer.
///
/// 8-bit samples are unsigned (silence = `0x80`), 16-bit samples are signed little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    pub fn new(channels: u16, sample_rate: u32, bits_per_sample: u16) -> Self {
        Self {
            channels,
            sample_rate,
            bits_per_sample,
        }
    }

    /// Bytes in one frame (one sample for every channel).
    pub fn block_align(&self) -> usize {
        (self.bits_per_sample as usize / 8) * self.channels as usize
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.block_align()
    }

    /// Byte count covering `ms` milliseconds, rounded down to whole frames.
    pub fn bytes_for_millis(&self, ms: u32) -> usize {
        let block = self.block_align().max(1);
        let bytes = self.bytes_per_second() * ms as usize / 1000;
        bytes - bytes % block
    }

    pub fn millis_for_bytes(&self, bytes: usize) -> u32 {
        let per_second = self.bytes_per_second();
        if per_second == 0 {
            return 0;
        }
        (bytes as u64 * 1000 / per_second as u64) as u32
    }

    /// Byte value that encodes silence.
    pub fn silence(&self) -> u8 {
        if self.bits_per_sample == 8 { 0x80 } else { 0 }
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.sample_rate == 0 {
            return Err(TagSonicError::Configuration(format!(
                "PCM format needs channels and a sample rate, got {}ch {}Hz",
                self.channels, self.sample_rate
            )));
        }
        if self.bits_per_sample != 8 && self.bits_per_sample != 16 {
            return Err(TagSonicError::Configuration(format!(
                "Unsupported bit depth {} (8 or 16)",
                self.bits_per_sample
            )));
        }
        Ok(())
    }
}

/// Byte sizes that drive ring-buffer streaming for one pool.
///
/// The buffer is primed with `initial_read_bytes`, then refilled one `chunk_bytes`
/// at a time while the play cursor trails the write cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLayout {
    pub buffer_bytes: usize,
    pub initial_read_bytes: usize,
    pub chunk_bytes: usize,
}

impl StreamLayout {
    pub fn new(buffer_bytes: usize, initial_read_bytes: usize, chunk_bytes: usize) -> Self {
        Self {
            buffer_bytes,
            initial_read_bytes,
            chunk_bytes,
        }
    }

    pub fn from_millis(format: &PcmFormat, buffer_ms: u32, initial_ms: u32, chunk_ms: u32) -> Self {
        Self {
            buffer_bytes: format.bytes_for_millis(buffer_ms),
            initial_read_bytes: format.bytes_for_millis(initial_ms),
            chunk_bytes: format.bytes_for_millis(chunk_ms),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_bytes == 0 || self.initial_read_bytes == 0 {
            return Err(TagSonicError::Configuration(
                "Stream layout needs a non-empty initial read and chunk".to_string(),
            ));
        }
        if self.initial_read_bytes + self.chunk_bytes > self.buffer_bytes {
            return Err(TagSonicError::Configuration(format!(
                "Buffer of {} bytes cannot hold an initial read of {} plus a chunk of {}",
                self.buffer_bytes, self.initial_read_bytes, self.chunk_bytes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_align_and_rates() {
        let format = PcmFormat::new(2, 22050, 16);
        assert_eq!(format.block_align(), 4);
        assert_eq!(format.bytes_per_second(), 88200);
        assert_eq!(format.bytes_for_millis(1000), 88200);
        assert_eq!(format.bytes_for_millis(10) % 4, 0);
    }

    #[test]
    fn test_millis_round_trip_for_byte_rate_format() {
        let format = PcmFormat::new(1, 1000, 8);
        assert_eq!(format.bytes_for_millis(250), 250);
        assert_eq!(format.millis_for_bytes(250), 250);
        assert_eq!(format.silence(), 0x80);
    }

    #[test]
    fn test_layout_validation() {
        let format = PcmFormat::new(1, 1000, 8);
        assert!(StreamLayout::from_millis(&format, 400, 200, 100).validate().is_ok());
        assert!(StreamLayout::from_millis(&format, 250, 200, 100).validate().is_err());
        assert!(StreamLayout::new(400, 0, 100).validate().is_err());
    }

    #[test]
    fn test_unsupported_bit_depth() {
        assert!(PcmFormat::new(2, 44100, 24).validate().is_err());
        assert!(PcmFormat::new(0, 44100, 16).validate().is_err());
    }
}
