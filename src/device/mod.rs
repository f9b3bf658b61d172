//! Capability interface the scheduler drives, plus two implementations.
//!
//! The scheduler never touches an audio API directly. It creates fixed-size ring
//! buffers through [`AudioDevice`], streams PCM into them, polls their play cursors and
//! pushes 3D parameters that only take effect on [`AudioDevice::commit_deferred_settings`].
//!
//! - [`CpalDevice`]: real output through cpal, buffers emulated on the audio callback
//! - [`VirtualDevice`]: deterministic headless device driven by a manual clock

mod cpal_device;
mod emulated;
mod virtual_device;

use crate::config::{HrtfQuality, PcmFormat};
use crate::error::Result;
use crate::math::Vec3;

pub use cpal_device::CpalDevice;
pub use virtual_device::{BufferSnapshot, ListenerSnapshot, VirtualDevice};

/// Parameters for creating one hardware buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferDesc {
    /// Ring size in bytes
    pub size: usize,
    pub format: PcmFormat,
    /// Whether the buffer accepts 3D position/velocity
    pub spatial: bool,
    /// 3D algorithm; ignored for non-spatial buffers
    pub hrtf: HrtfQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    /// Wrap to the start of the ring when the cursor reaches the end
    Looping,
    /// Stop when the cursor reaches the end of the ring
    Once,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStatus {
    pub playing: bool,
    pub looping: bool,
    /// The device reclaimed the buffer's memory; it must be restored before use
    pub lost: bool,
}

/// Listener block applied in one deferred call per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerParams {
    pub position: Vec3,
    pub velocity: Vec3,
    pub front: Vec3,
    pub top: Vec3,
    pub distance_factor: f32,
    pub rolloff_factor: f32,
    pub doppler_factor: f32,
}

impl Default for ListenerParams {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            front: -Vec3::Z,
            top: Vec3::Y,
            distance_factor: 1.0,
            rolloff_factor: 1.0,
            doppler_factor: 1.0,
        }
    }
}

/// One fixed-size ring buffer owned by a slot.
///
/// Position, velocity and distance range are deferred: they take effect on the
/// owning device's next [`AudioDevice::commit_deferred_settings`].
pub trait SoundBuffer {
    fn size(&self) -> usize;

    /// Copy `data` into the ring at `offset`, wrapping past the end.
    fn write(&mut self, offset: usize, data: &[u8]);

    fn set_current_position(&mut self, position: usize);

    /// Byte offset the device is currently playing from.
    fn play_cursor(&self) -> usize;

    fn play(&mut self, mode: PlayMode);

    fn stop(&mut self);

    /// Volume in millibels, `VOLUME_MIN..=VOLUME_MAX`.
    fn set_volume(&mut self, millibels: i32);

    fn set_position(&mut self, position: Vec3);

    fn set_velocity(&mut self, velocity: Vec3);

    fn set_distance_range(&mut self, min: f32, max: f32);

    /// Interpret the 3D position relative to the listener instead of the world.
    fn set_head_relative(&mut self, head_relative: bool);

    fn status(&self) -> BufferStatus;

    /// Reacquire a lost buffer. Contents are undefined afterwards.
    ///
    /// # Errors
    ///
    /// Returns `BufferLost` while the device still withholds the memory.
    fn restore(&mut self) -> Result<()>;
}

/// The audio output device: buffer factory plus the listener and commit batch.
pub trait AudioDevice {
    fn set_primary_format(&mut self, format: &PcmFormat) -> Result<()>;

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<Box<dyn SoundBuffer>>;

    /// Stage the listener block; applied on the next commit.
    fn set_listener(&mut self, params: &ListenerParams);

    /// Apply every deferred listener and buffer change in one batch.
    fn commit_deferred_settings(&mut self);
}

/// Convert a millibel attenuation to a linear gain.
pub fn millibels_to_gain(millibels: i32) -> f32 {
    if millibels <= crate::config::VOLUME_MIN {
        return 0.0;
    }
    10f32.powf(millibels as f32 / 2000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millibels_to_gain() {
        assert_eq!(millibels_to_gain(0), 1.0);
        assert_eq!(millibels_to_gain(-10_000), 0.0);
        assert!((millibels_to_gain(-2000) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_default_listener_faces_forward() {
        let params = ListenerParams::default();
        assert_eq!(params.front, -Vec3::Z);
        assert_eq!(params.top, Vec3::Y);
    }
}
