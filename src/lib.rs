//! TagSonic: tag-driven game audio over a fixed set of hardware buffers.
//!
//! Sounds are registered once as named [`AudioTag`]s and played by name. Every play
//! request competes for one of two fixed pools of streaming buffers (mono 3D effects
//! and stereo music): free slots are used first, otherwise the lowest-priority
//! playing sound is preempted, and requests that cannot win a slot are dropped.
//! The host drives everything from its frame loop through
//! [`TagSonicManager::update`].

pub mod audio;
pub mod audio_data;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod listener;
pub mod manager;
pub mod math;
pub mod pool;
pub mod scheduler;
pub mod slot;
pub mod tag;

pub use audio::WorldObject;
pub use audio_data::TagSonicAudioData;
pub use config::{HrtfQuality, TagSonicDesc, VOLUME_MAX, VOLUME_MIN};
pub use device::{AudioDevice, CpalDevice, VirtualDevice};
pub use error::{Result, TagSonicError};
pub use events::{PoolKind, TagSonicEvent};
pub use listener::Listener;
pub use manager::{PlayRequest, TagSonicManager};
pub use tag::{AudioTag, Cascade, TagKind};
