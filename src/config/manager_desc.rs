use super::{PcmFormat, StreamLayout, VOLUME_MAX};
use crate::error::{Result, TagSonicError};
use std::time::Duration;

/// 3D algorithm requested for positional (effect) buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HrtfQuality {
    /// Highest quality virtualization the device offers
    #[default]
    Full,
    /// Cheaper virtualization
    Light,
    /// Attenuation only, no virtualization
    None,
}

/// Configuration descriptor for a [`TagSonicManager`](crate::TagSonicManager).
///
/// Everything here is fixed once the manager is constructed: pool sizes and buffer
/// layouts decide how many hardware buffers get created up front.
#[derive(Debug, Clone)]
pub struct TagSonicDesc {
    /// Channel count of the primary (output) buffer
    pub channels: u16,
    /// Sample rate shared by the primary buffer and every slot buffer
    pub sample_rate: u32,
    /// Bits per sample, 8 or 16
    pub bits_per_sample: u16,
    /// Algorithm used for 3D effect buffers
    pub hrtf: HrtfQuality,
    /// Number of mono 3D buffers shared by all effect and sound tags
    pub effect_slots: usize,
    /// Number of stereo buffers shared by music tags
    pub music_slots: usize,
    /// Effect ring size, initial read and refill chunk, in milliseconds
    pub effect_buffer_ms: u32,
    pub effect_initial_read_ms: u32,
    pub effect_chunk_ms: u32,
    /// Music ring size, initial read and refill chunk, in milliseconds
    pub music_buffer_ms: u32,
    pub music_initial_read_ms: u32,
    pub music_chunk_ms: u32,
    pub distance_factor: f32,
    pub rolloff_factor: f32,
    pub doppler_factor: f32,
    /// Distance under which effect buffers play at full volume
    pub min_distance: f32,
    /// Distance beyond which effect buffers stop attenuating
    pub max_distance: f32,
    /// Master volume in millibels, before per-tag adjustment
    pub master_volume: i32,
    /// Restore calls attempted per tick for a lost buffer
    pub restore_attempts: u32,
    /// Sleep between restore calls
    pub restore_backoff: Duration,
}

impl Default for TagSonicDesc {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            hrtf: HrtfQuality::Full,
            effect_slots: 16,
            music_slots: 2,
            effect_buffer_ms: 1000,
            effect_initial_read_ms: 500,
            effect_chunk_ms: 250,
            music_buffer_ms: 4000,
            music_initial_read_ms: 2000,
            music_chunk_ms: 1000,
            distance_factor: 1.0,
            rolloff_factor: 1.0,
            doppler_factor: 1.0,
            min_distance: 100.0,
            max_distance: 10_000.0,
            master_volume: VOLUME_MAX - 2000,
            restore_attempts: 100,
            restore_backoff: Duration::from_millis(10),
        }
    }
}

impl TagSonicDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn bits_per_sample(mut self, bits: u16) -> Self {
        self.bits_per_sample = bits;
        self
    }

    pub fn hrtf(mut self, hrtf: HrtfQuality) -> Self {
        self.hrtf = hrtf;
        self
    }

    pub fn effect_slots(mut self, slots: usize) -> Self {
        self.effect_slots = slots;
        self
    }

    pub fn music_slots(mut self, slots: usize) -> Self {
        self.music_slots = slots;
        self
    }

    pub fn effect_streaming(mut self, buffer_ms: u32, initial_read_ms: u32, chunk_ms: u32) -> Self {
        self.effect_buffer_ms = buffer_ms;
        self.effect_initial_read_ms = initial_read_ms;
        self.effect_chunk_ms = chunk_ms;
        self
    }

    pub fn music_streaming(mut self, buffer_ms: u32, initial_read_ms: u32, chunk_ms: u32) -> Self {
        self.music_buffer_ms = buffer_ms;
        self.music_initial_read_ms = initial_read_ms;
        self.music_chunk_ms = chunk_ms;
        self
    }

    pub fn master_volume(mut self, volume: i32) -> Self {
        self.master_volume = volume;
        self
    }

    pub fn listener_factors(mut self, distance: f32, rolloff: f32, doppler: f32) -> Self {
        self.distance_factor = distance;
        self.rolloff_factor = rolloff;
        self.doppler_factor = doppler;
        self
    }

    pub fn distance_range(mut self, min: f32, max: f32) -> Self {
        self.min_distance = min;
        self.max_distance = max;
        self
    }

    pub fn restore_policy(mut self, attempts: u32, backoff: Duration) -> Self {
        self.restore_attempts = attempts;
        self.restore_backoff = backoff;
        self
    }

    /// Format of the primary buffer the device mixes into.
    pub fn primary_format(&self) -> PcmFormat {
        PcmFormat::new(self.channels, self.sample_rate, self.bits_per_sample)
    }

    /// Effect buffers are mono so the device can position them in 3D.
    pub fn effect_format(&self) -> PcmFormat {
        PcmFormat::new(1, self.sample_rate, self.bits_per_sample)
    }

    pub fn music_format(&self) -> PcmFormat {
        PcmFormat::new(2, self.sample_rate, self.bits_per_sample)
    }

    pub fn effect_layout(&self) -> StreamLayout {
        StreamLayout::from_millis(
            &self.effect_format(),
            self.effect_buffer_ms,
            self.effect_initial_read_ms,
            self.effect_chunk_ms,
        )
    }

    pub fn music_layout(&self) -> StreamLayout {
        StreamLayout::from_millis(
            &self.music_format(),
            self.music_buffer_ms,
            self.music_initial_read_ms,
            self.music_chunk_ms,
        )
    }

    pub fn validate(&self) -> Result<()> {
        self.primary_format().validate()?;
        if self.effect_slots == 0 || self.music_slots == 0 {
            return Err(TagSonicError::Configuration(format!(
                "Pools need at least one slot each (effects: {}, music: {})",
                self.effect_slots, self.music_slots
            )));
        }
        if self.min_distance <= 0.0 || self.max_distance < self.min_distance {
            return Err(TagSonicError::Configuration(format!(
                "Invalid distance range {}..{}",
                self.min_distance, self.max_distance
            )));
        }
        self.effect_layout().validate()?;
        self.music_layout().validate()
    }
}
