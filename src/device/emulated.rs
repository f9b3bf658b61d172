//! Software ring buffers shared by the headless and cpal devices.

use super::{BufferDesc, BufferStatus, ListenerParams, PlayMode, SoundBuffer, millibels_to_gain};
use crate::config::{HrtfQuality, VOLUME_MAX};
use crate::error::{Result, TagSonicError};
use crate::math::Vec3;
use std::f32::consts::FRAC_PI_4;
use std::sync::{Arc, Mutex, MutexGuard};

/// Speed of sound in meters per second.
const SPEED_OF_SOUND: f32 = 343.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Spatial {
    pub position: Vec3,
    pub velocity: Vec3,
    pub min_distance: f32,
    pub max_distance: f32,
    pub head_relative: bool,
}

impl Default for Spatial {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            min_distance: 1.0,
            max_distance: 1_000_000_000.0,
            head_relative: false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct EmulatedBuffer {
    pub desc: BufferDesc,
    pub data: Vec<u8>,
    /// Play position in frames; fractional so pitch-shifted playback stays smooth
    pub position: f64,
    pub playing: bool,
    pub looping: bool,
    pub volume: i32,
    pub pending: Spatial,
    pub committed: Spatial,
    pub lost: bool,
    pub writes: usize,
    pub bytes_written: usize,
}

impl EmulatedBuffer {
    pub fn new(desc: BufferDesc) -> Self {
        Self {
            data: vec![desc.format.silence(); desc.size],
            desc,
            position: 0.0,
            playing: false,
            looping: false,
            volume: VOLUME_MAX,
            pending: Spatial::default(),
            committed: Spatial::default(),
            lost: false,
            writes: 0,
            bytes_written: 0,
        }
    }

    pub fn frames(&self) -> usize {
        self.desc.size / self.desc.format.block_align()
    }

    pub fn cursor(&self) -> usize {
        (self.position as usize).min(self.frames().saturating_sub(1)) * self.desc.format.block_align()
    }

    pub fn write(&mut self, offset: usize, src: &[u8]) {
        let size = self.data.len();
        if size == 0 || self.lost {
            return;
        }
        let start = offset % size;
        let first = src.len().min(size - start);
        self.data[start..start + first].copy_from_slice(&src[..first]);
        let mut rest = &src[first..];
        while !rest.is_empty() {
            let n = rest.len().min(size);
            self.data[..n].copy_from_slice(&rest[..n]);
            rest = &rest[n..];
        }
        self.writes += 1;
        self.bytes_written += src.len();
    }

    /// Move the cursor forward, wrapping or stopping at the end of the ring.
    pub fn advance(&mut self, frames: f64) {
        if !self.playing || self.lost {
            return;
        }
        let total = self.frames() as f64;
        if total == 0.0 {
            self.playing = false;
            return;
        }
        self.position += frames;
        if self.position >= total {
            if self.looping {
                self.position %= total;
            } else {
                self.position = 0.0;
                self.playing = false;
            }
        }
    }

    /// Sample of `channel` at frame `frame`, normalized to `-1.0..=1.0`.
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let format = &self.desc.format;
        let channel = channel.min(format.channels as usize - 1);
        let offset = frame * format.block_align() + channel * (format.bits_per_sample as usize / 8);
        match format.bits_per_sample {
            8 => (self.data[offset] as f32 - 128.0) / 128.0,
            _ => i16::from_le_bytes([self.data[offset], self.data[offset + 1]]) as f32 / 32768.0,
        }
    }

    fn interpolated(&self, channel: usize) -> f32 {
        let frames = self.frames();
        let index = self.position as usize % frames;
        let next = (index + 1) % frames;
        let t = self.position.fract() as f32;
        let a = self.sample(index, channel);
        let b = self.sample(next, channel);
        a + (b - a) * t
    }

    pub fn lose(&mut self) {
        self.lost = true;
        self.playing = false;
        self.looping = false;
        self.data.fill(self.desc.format.silence());
    }
}

#[derive(Debug, Default)]
pub(crate) struct DeviceState {
    pub buffers: Vec<EmulatedBuffer>,
    pub pending_listener: ListenerParams,
    pub listener: ListenerParams,
    pub commits: usize,
    /// Restores that still fail before the device hands memory back
    pub restore_failures: u32,
}

impl DeviceState {
    pub fn commit(&mut self) {
        self.listener = self.pending_listener;
        for buffer in &mut self.buffers {
            buffer.committed = buffer.pending;
        }
        self.commits += 1;
    }

    /// Mix every playing buffer into interleaved f32 output and advance cursors.
    pub fn mix(&mut self, out: &mut [f32], out_channels: u16, out_rate: u32) {
        out.fill(0.0);
        let out_channels = out_channels.max(1) as usize;
        let listener = self.listener;

        for buffer in &mut self.buffers {
            if !buffer.playing || buffer.lost || buffer.frames() == 0 {
                continue;
            }

            let gain = millibels_to_gain(buffer.volume);
            let (left, right, pitch) = if buffer.desc.spatial {
                spatialize(&listener, &buffer.committed, buffer.desc.hrtf)
            } else {
                (1.0, 1.0, 1.0)
            };
            let step = buffer.desc.format.sample_rate as f64 / out_rate as f64 * pitch as f64;
            let stereo = buffer.desc.format.channels >= 2;

            for frame in out.chunks_mut(out_channels) {
                if !buffer.playing {
                    break;
                }
                let (l, r) = if stereo {
                    (buffer.interpolated(0), buffer.interpolated(1))
                } else {
                    let s = buffer.interpolated(0);
                    (s, s)
                };
                let (l, r) = (l * left * gain, r * right * gain);
                if out_channels == 1 {
                    frame[0] += (l + r) * 0.5;
                } else {
                    frame[0] += l;
                    frame[1] += r;
                }
                buffer.advance(step);
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}

/// Left gain, right gain and pitch ratio for one source.
fn spatialize(listener: &ListenerParams, source: &Spatial, hrtf: HrtfQuality) -> (f32, f32, f32) {
    let relative = if source.head_relative {
        source.position
    } else {
        source.position - listener.position
    };
    let distance = relative.length() * listener.distance_factor;
    let min = source.min_distance.max(f32::EPSILON);
    let clamped = distance.clamp(min, source.max_distance.max(min));
    let attenuation = min / (min + listener.rolloff_factor * (clamped - min));

    let right_axis = listener.front.cross(listener.top).normalize_or_zero();
    let direction = relative.normalize_or_zero();
    let pan = if source.head_relative {
        direction.x
    } else {
        direction.dot(right_axis)
    }
    .clamp(-1.0, 1.0);

    let (left, right) = match hrtf {
        HrtfQuality::Full => {
            let angle = (pan + 1.0) * FRAC_PI_4;
            (angle.cos(), angle.sin())
        }
        HrtfQuality::Light => ((1.0 - pan) * 0.5, (1.0 + pan) * 0.5),
        HrtfQuality::None => (FRAC_PI_4.cos(), FRAC_PI_4.sin()),
    };

    let pitch = if source.head_relative || listener.doppler_factor == 0.0 {
        1.0
    } else {
        let speed = SPEED_OF_SOUND / listener.distance_factor.max(f32::EPSILON);
        let toward = listener.velocity.dot(direction) * listener.doppler_factor;
        let away = source.velocity.dot(direction) * listener.doppler_factor;
        ((speed + toward) / (speed + away).max(f32::EPSILON)).clamp(0.5, 2.0)
    };

    (left * attenuation, right * attenuation, pitch)
}

pub(crate) type SharedState = Arc<Mutex<DeviceState>>;

pub(crate) fn lock(state: &SharedState) -> MutexGuard<'_, DeviceState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Create a buffer in `state` and return its handle.
pub(crate) fn create_buffer(state: &SharedState, desc: &BufferDesc) -> Result<Box<dyn SoundBuffer>> {
    desc.format.validate()?;
    if desc.size == 0 || desc.size % desc.format.block_align() != 0 {
        return Err(TagSonicError::AudioDevice(format!(
            "Buffer size {} is not a whole number of {}-byte frames",
            desc.size,
            desc.format.block_align()
        )));
    }
    let mut guard = lock(state);
    guard.buffers.push(EmulatedBuffer::new(*desc));
    Ok(Box::new(BufferHandle {
        state: Arc::clone(state),
        index: guard.buffers.len() - 1,
    }))
}

/// A slot's view of one emulated buffer.
pub(crate) struct BufferHandle {
    state: SharedState,
    index: usize,
}

impl BufferHandle {
    fn with<R>(&self, f: impl FnOnce(&mut EmulatedBuffer) -> R) -> R {
        let mut guard = lock(&self.state);
        f(&mut guard.buffers[self.index])
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut DeviceState, usize) -> R) -> R {
        let mut guard = lock(&self.state);
        f(&mut guard, self.index)
    }
}

impl SoundBuffer for BufferHandle {
    fn size(&self) -> usize {
        self.with(|b| b.desc.size)
    }

    fn write(&mut self, offset: usize, data: &[u8]) {
        self.with(|b| b.write(offset, data));
    }

    fn set_current_position(&mut self, position: usize) {
        self.with(|b| {
            let block = b.desc.format.block_align();
            b.position = ((position % b.desc.size.max(1)) / block) as f64;
        });
    }

    fn play_cursor(&self) -> usize {
        self.with(|b| b.cursor())
    }

    fn play(&mut self, mode: PlayMode) {
        self.with(|b| {
            if b.lost {
                return;
            }
            b.playing = true;
            b.looping = mode == PlayMode::Looping;
        });
    }

    fn stop(&mut self) {
        self.with(|b| b.playing = false);
    }

    fn set_volume(&mut self, millibels: i32) {
        self.with(|b| b.volume = crate::config::clamp_volume(millibels));
    }

    fn set_position(&mut self, position: Vec3) {
        self.with(|b| b.pending.position = position);
    }

    fn set_velocity(&mut self, velocity: Vec3) {
        self.with(|b| b.pending.velocity = velocity);
    }

    fn set_distance_range(&mut self, min: f32, max: f32) {
        self.with(|b| {
            b.pending.min_distance = min;
            b.pending.max_distance = max;
        });
    }

    fn set_head_relative(&mut self, head_relative: bool) {
        self.with(|b| b.pending.head_relative = head_relative);
    }

    fn status(&self) -> BufferStatus {
        self.with(|b| BufferStatus {
            playing: b.playing,
            looping: b.playing && b.looping,
            lost: b.lost,
        })
    }

    fn restore(&mut self) -> Result<()> {
        self.with_state(|state, index| {
            if !state.buffers[index].lost {
                return Ok(());
            }
            if state.restore_failures > 0 {
                state.restore_failures -= 1;
                return Err(TagSonicError::BufferLost);
            }
            let buffer = &mut state.buffers[index];
            buffer.lost = false;
            buffer.position = 0.0;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PcmFormat;

    fn desc(size: usize, spatial: bool) -> BufferDesc {
        BufferDesc {
            size,
            format: PcmFormat::new(1, 1000, 8),
            spatial,
            hrtf: HrtfQuality::Full,
        }
    }

    #[test]
    fn test_write_wraps_around_ring() {
        let mut buffer = EmulatedBuffer::new(desc(8, false));
        buffer.write(6, &[1, 2, 3, 4]);
        assert_eq!(buffer.data, vec![3, 4, 128, 128, 128, 128, 1, 2]);
        assert_eq!(buffer.writes, 1);
    }

    #[test]
    fn test_advance_once_stops_at_end() {
        let mut buffer = EmulatedBuffer::new(desc(10, false));
        buffer.playing = true;
        buffer.advance(6.0);
        assert_eq!(buffer.cursor(), 6);
        buffer.advance(6.0);
        assert!(!buffer.playing);
        assert_eq!(buffer.cursor(), 0);
    }

    #[test]
    fn test_advance_looping_wraps() {
        let mut buffer = EmulatedBuffer::new(desc(10, false));
        buffer.playing = true;
        buffer.looping = true;
        buffer.advance(13.0);
        assert!(buffer.playing);
        assert_eq!(buffer.cursor(), 3);
    }

    #[test]
    fn test_mix_applies_volume() {
        let mut state = DeviceState::default();
        let mut buffer = EmulatedBuffer::new(desc(4, false));
        buffer.data = vec![255; 4];
        buffer.playing = true;
        buffer.looping = true;
        buffer.volume = -2000;
        state.buffers.push(buffer);

        let mut out = vec![0.0f32; 4];
        state.mix(&mut out, 2, 1000);
        assert!((out[0] - 0.0992).abs() < 1e-3);
        assert!((out[1] - 0.0992).abs() < 1e-3);
    }

    #[test]
    fn test_spatialize_pans_and_attenuates() {
        let listener = ListenerParams::default();
        let source = Spatial {
            position: Vec3::new(10.0, 0.0, 0.0),
            min_distance: 1.0,
            max_distance: 100.0,
            ..Spatial::default()
        };
        let (left, right, pitch) = spatialize(&listener, &source, HrtfQuality::Full);
        assert!(right > left);
        assert!(right < 0.2);
        assert_eq!(pitch, 1.0);
    }

    #[test]
    fn test_doppler_raises_pitch_for_approaching_source() {
        let listener = ListenerParams::default();
        let source = Spatial {
            position: Vec3::new(0.0, 0.0, -10.0),
            velocity: Vec3::new(0.0, 0.0, 30.0),
            ..Spatial::default()
        };
        let (_, _, pitch) = spatialize(&listener, &source, HrtfQuality::Light);
        assert!(pitch > 1.0);
    }
}
