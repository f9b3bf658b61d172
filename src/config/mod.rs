//! Configuration for TagSonic.
//!
//! - [`TagSonicDesc`]: everything fixed at manager construction (formats, pool sizes,
//!   streaming layout, listener factors, recovery policy)
//! - [`PcmFormat`] / [`StreamLayout`]: the byte-level description of a hardware buffer
//! - Volume limits in millibels ([`VOLUME_MIN`], [`VOLUME_MAX`])

mod manager_desc;
mod pcm_format;

pub use manager_desc::{HrtfQuality, TagSonicDesc};
pub use pcm_format::{PcmFormat, StreamLayout};

/// Quietest volume a buffer accepts, in hundredths of a decibel.
pub const VOLUME_MIN: i32 = -10_000;

/// Loudest volume a buffer accepts (no attenuation).
pub const VOLUME_MAX: i32 = 0;

/// Clamp a millibel volume to the range a buffer accepts.
pub fn clamp_volume(volume: i32) -> i32 {
    volume.clamp(VOLUME_MIN, VOLUME_MAX)
}
