//! Runtime sound instances created from tags.

use crate::audio_data::PcmStream;
use crate::events::TagSonicEvent;
use crate::math::{Kinematics, Vec3};
use crossbeam_channel::Sender;
use std::sync::{Mutex, RwLock, Weak};

/// Source of position and velocity for a positional sound.
pub trait WorldObject {
    fn position(&self) -> Vec3;
    fn velocity(&self) -> Vec3;
}

impl WorldObject for Kinematics {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }
}

impl WorldObject for Mutex<Kinematics> {
    fn position(&self) -> Vec3 {
        self.lock().map(|k| k.position).unwrap_or_else(|e| e.into_inner().position)
    }

    fn velocity(&self) -> Vec3 {
        self.lock().map(|k| k.velocity).unwrap_or_else(|e| e.into_inner().velocity)
    }
}

impl WorldObject for RwLock<Kinematics> {
    fn position(&self) -> Vec3 {
        self.read().map(|k| k.position).unwrap_or_else(|e| e.into_inner().position)
    }

    fn velocity(&self) -> Vec3 {
        self.read().map(|k| k.velocity).unwrap_or_else(|e| e.into_inner().velocity)
    }
}

pub enum AudioKind {
    /// Non-positional
    Sound,
    /// Positional; `None` (or a dropped object) plays ambient at the listener
    Sound3D { object: Option<Weak<dyn WorldObject>> },
    Music,
}

impl std::fmt::Debug for AudioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sound => write!(f, "Sound"),
            Self::Sound3D { object } => f
                .debug_struct("Sound3D")
                .field("attached", &object.is_some())
                .finish(),
            Self::Music => write!(f, "Music"),
        }
    }
}

/// One playing instance of a tag, exclusively owned by the slot streaming it.
///
/// Finalizing sends `Finished` to the notification target at most once. Dropping an
/// instance without finalizing it sends nothing.
#[derive(Debug)]
pub struct Audio {
    tag: String,
    kind: AudioKind,
    stream: PcmStream,
    notify: Option<Sender<TagSonicEvent>>,
}

impl Audio {
    pub fn new(
        tag: String,
        kind: AudioKind,
        stream: PcmStream,
        notify: Option<Sender<TagSonicEvent>>,
    ) -> Self {
        Self {
            tag,
            kind,
            stream,
            notify,
        }
    }

    pub fn tag_name(&self) -> &str {
        &self.tag
    }

    pub fn kind(&self) -> &AudioKind {
        &self.kind
    }

    pub fn is_music(&self) -> bool {
        matches!(self.kind, AudioKind::Music)
    }

    pub fn length_ms(&self) -> u32 {
        self.stream.length_ms()
    }

    /// Live position and velocity of the attached world object.
    pub fn world_state(&self) -> Option<(Vec3, Vec3)> {
        match &self.kind {
            AudioKind::Sound3D {
                object: Some(object),
            } => object
                .upgrade()
                .map(|object| (object.position(), object.velocity())),
            _ => None,
        }
    }

    /// Fill `dst` with the next PCM bytes, padding the tail with silence.
    ///
    /// Returns the number of bytes of real audio written and whether more remains.
    pub fn fill(&mut self, dst: &mut [u8]) -> (usize, bool) {
        let written = self.stream.read(dst);
        dst[written..].fill(self.stream.format().silence());
        (written, !self.stream.is_exhausted())
    }

    pub fn rewind(&mut self) {
        self.stream.rewind();
    }

    /// Fire the completion notification.
    pub fn finish(&mut self) {
        if let Some(notify) = self.notify.take() {
            let _ = notify.send(TagSonicEvent::Finished {
                tag: self.tag.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::TagSonicAudioData;
    use crate::config::PcmFormat;
    use std::sync::Arc;

    fn audio(kind: AudioKind, notify: Option<Sender<TagSonicEvent>>) -> Audio {
        let data = TagSonicAudioData::from_samples(vec![0.5; 150], 1000, 1).unwrap();
        let stream = PcmStream::new(data, PcmFormat::new(1, 1000, 8)).unwrap();
        Audio::new("hit".into(), kind, stream, notify)
    }

    #[test]
    fn test_fill_pads_with_silence() {
        let mut audio = audio(AudioKind::Sound, None);
        let mut chunk = [0u8; 100];
        assert_eq!(audio.fill(&mut chunk), (100, true));
        assert_eq!(audio.fill(&mut chunk), (50, false));
        assert_eq!(chunk[49], 191);
        assert_eq!(chunk[50], 128);

        audio.rewind();
        assert_eq!(audio.fill(&mut chunk), (100, true));
    }

    #[test]
    fn test_finish_notifies_once() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut audio = audio(AudioKind::Sound, Some(tx));
        audio.finish();
        audio.finish();

        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![TagSonicEvent::Finished { tag: "hit".into() }]
        );
    }

    #[test]
    fn test_drop_does_not_notify() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(audio(AudioKind::Music, Some(tx)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_world_state_follows_object() {
        let object = Arc::new(Mutex::new(Kinematics::new(Vec3::X, Vec3::Y)));
        let weak: Weak<dyn WorldObject> = Arc::downgrade(&object) as Weak<dyn WorldObject>;
        let audio = audio(AudioKind::Sound3D { object: Some(weak) }, None);
        assert_eq!(audio.world_state(), Some((Vec3::X, Vec3::Y)));

        if let Ok(mut k) = object.lock() {
            k.step(1000);
        }
        assert_eq!(audio.world_state().map(|s| s.0), Some(Vec3::new(1.0, 1.0, 0.0)));

        drop(object);
        assert_eq!(audio.world_state(), None);
    }
}
