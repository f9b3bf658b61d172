//! Named templates describing how a class of sound is created and prioritized.

mod registry;

pub use registry::TagRegistry;

use crate::audio::{Audio, AudioKind, WorldObject};
use crate::audio_data::{PcmStream, TagSonicAudioData};
use crate::config::PcmFormat;
use crate::error::{Result, TagSonicError};
use crate::events::{PoolKind, TagSonicEvent};
use crossbeam_channel::Sender;
use std::sync::Weak;

/// Overlap limit for an effect tag.
///
/// Once `limit` instances of the tag are playing, the next request stops them all
/// and plays `fallback` instead. A `None` fallback silences the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cascade {
    pub limit: usize,
    pub fallback: Option<String>,
}

#[derive(Debug, Clone)]
pub enum TagKind {
    /// Non-positional sound, played head-relative in the effect pool
    Sound { data: TagSonicAudioData },
    /// Positional sound attached to a world object
    Effect {
        data: TagSonicAudioData,
        cascade: Option<Cascade>,
    },
    /// Streaming stereo track with cross-fading
    Music { data: TagSonicAudioData },
    /// Resolves but never produces audio
    Silent,
}

/// Immutable sound template, looked up by name.
#[derive(Debug, Clone)]
pub struct AudioTag {
    name: String,
    priority: i32,
    volume_adjust: i32,
    kind: TagKind,
}

impl AudioTag {
    pub fn new(name: impl Into<String>, kind: TagKind) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            volume_adjust: 0,
            kind,
        }
    }

    pub fn sound(name: impl Into<String>, data: TagSonicAudioData) -> Self {
        Self::new(name, TagKind::Sound { data })
    }

    pub fn effect(name: impl Into<String>, data: TagSonicAudioData) -> Self {
        Self::new(
            name,
            TagKind::Effect {
                data,
                cascade: None,
            },
        )
    }

    pub fn music(name: impl Into<String>, data: TagSonicAudioData) -> Self {
        Self::new(name, TagKind::Music { data })
    }

    pub fn silent(name: impl Into<String>) -> Self {
        Self::new(name, TagKind::Silent)
    }

    /// Higher priorities win preemption.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Millibel offset from the master volume.
    pub fn with_volume_adjust(mut self, adjust: i32) -> Self {
        self.volume_adjust = adjust;
        self
    }

    /// Attach a cascade policy. Ignored for anything but effect tags.
    pub fn with_cascade(mut self, limit: usize, fallback: Option<String>) -> Self {
        if let TagKind::Effect { cascade, .. } = &mut self.kind {
            *cascade = Some(Cascade { limit, fallback });
        } else {
            log::warn!("Cascade ignored on non-effect tag '{}'", self.name);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn volume_adjust(&self) -> i32 {
        self.volume_adjust
    }

    pub fn kind(&self) -> &TagKind {
        &self.kind
    }

    pub fn cascade(&self) -> Option<&Cascade> {
        match &self.kind {
            TagKind::Effect { cascade, .. } => cascade.as_ref(),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&TagSonicAudioData> {
        match &self.kind {
            TagKind::Sound { data } | TagKind::Effect { data, .. } | TagKind::Music { data } => {
                Some(data)
            }
            TagKind::Silent => None,
        }
    }

    /// Pool the tag plays in; `None` for silent tags.
    pub fn pool(&self) -> Option<PoolKind> {
        match self.kind {
            TagKind::Sound { .. } | TagKind::Effect { .. } => Some(PoolKind::Effects),
            TagKind::Music { .. } => Some(PoolKind::Music),
            TagKind::Silent => None,
        }
    }

    /// Copy of the tag with its data converted to `format`.
    pub(crate) fn conformed(&self, format: &PcmFormat) -> Result<Self> {
        let conform = |data: &TagSonicAudioData| -> Result<TagSonicAudioData> {
            let converted = data.conform(format)?;
            if converted.is_empty() {
                return Err(TagSonicError::AudioFormat(format!(
                    "Tag '{}' has no audio data",
                    self.name
                )));
            }
            Ok(converted)
        };

        let kind = match &self.kind {
            TagKind::Sound { data } => TagKind::Sound {
                data: conform(data)?,
            },
            TagKind::Effect { data, cascade } => TagKind::Effect {
                data: conform(data)?,
                cascade: cascade.clone(),
            },
            TagKind::Music { data } => TagKind::Music {
                data: conform(data)?,
            },
            TagKind::Silent => TagKind::Silent,
        };
        Ok(Self {
            kind,
            ..self.clone()
        })
    }

    /// Build a runtime instance for one play request.
    ///
    /// Returns `None` for tags that produce no audio, which is not an error.
    pub fn create_audio(
        &self,
        format: &PcmFormat,
        object: Option<Weak<dyn WorldObject>>,
        notify: Option<Sender<TagSonicEvent>>,
    ) -> Option<Audio> {
        let (kind, data) = match &self.kind {
            TagKind::Sound { data } => (AudioKind::Sound, data),
            TagKind::Effect { data, .. } => (AudioKind::Sound3D { object }, data),
            TagKind::Music { data } => (AudioKind::Music, data),
            TagKind::Silent => return None,
        };

        match PcmStream::new(data.clone(), *format) {
            Ok(stream) => Some(Audio::new(self.name.clone(), kind, stream, notify)),
            Err(e) => {
                log::warn!("Tag '{}' cannot stream: {}", self.name, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> TagSonicAudioData {
        TagSonicAudioData::from_samples(vec![0.0; 100], 1000, 1).unwrap()
    }

    #[test]
    fn test_pool_routing() {
        assert_eq!(AudioTag::sound("a", data()).pool(), Some(PoolKind::Effects));
        assert_eq!(AudioTag::effect("b", data()).pool(), Some(PoolKind::Effects));
        assert_eq!(AudioTag::music("c", data()).pool(), Some(PoolKind::Music));
        assert_eq!(AudioTag::silent("d").pool(), None);
    }

    #[test]
    fn test_cascade_only_on_effects() {
        let effect = AudioTag::effect("step", data()).with_cascade(3, Some("steps".into()));
        assert_eq!(effect.cascade().map(|c| c.limit), Some(3));

        let sound = AudioTag::sound("ui", data()).with_cascade(3, None);
        assert!(sound.cascade().is_none());
    }

    #[test]
    fn test_silent_tag_creates_no_audio() {
        let format = PcmFormat::new(1, 1000, 8);
        assert!(AudioTag::silent("quiet").create_audio(&format, None, None).is_none());
    }

    #[test]
    fn test_create_audio_requires_conformed_data() {
        let tag = AudioTag::effect("boom", data());
        assert!(tag.create_audio(&PcmFormat::new(2, 1000, 8), None, None).is_none());

        let conformed = tag.conformed(&PcmFormat::new(2, 1000, 8)).unwrap();
        let audio = conformed
            .create_audio(&PcmFormat::new(2, 1000, 8), None, None)
            .unwrap();
        assert_eq!(audio.tag_name(), "boom");
        assert_eq!(audio.length_ms(), 100);
    }

    #[test]
    fn test_conformed_rejects_empty_data() {
        let empty = TagSonicAudioData::from_samples(vec![], 1000, 1).unwrap();
        let tag = AudioTag::music("empty", empty);
        assert!(tag.conformed(&PcmFormat::new(2, 1000, 16)).is_err());
    }
}
