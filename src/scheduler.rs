//! The Play/Update protocol over both slot pools.
//!
//! Everything runs on the caller's thread inside `play` and `update`. One update
//! tick does, in order:
//!
//! 1. device-loss detection and bounded restore per pool
//! 2. the delayed-play queue
//! 3. per-slot streaming, looping, 3D sync and volume ramps
//! 4. the listener block plus a single commit of every deferred 3D change

use crate::config::{TagSonicDesc, VOLUME_MIN, clamp_volume};
use crate::device::AudioDevice;
use crate::events::{PoolKind, TagSonicEvent};
use crate::listener::{Listener, ListenerSync};
use crate::manager::PlayRequest;
use crate::pool::SlotPool;
use crate::tag::{AudioTag, TagRegistry};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::time::Duration;

/// Time left at the end of an outgoing track to absorb update-tick latency.
pub const FADE_MARGIN_MS: u32 = 250;

struct PendingPlay {
    tag: Arc<AudioTag>,
    request: PlayRequest,
}

pub struct Scheduler {
    device: Box<dyn AudioDevice>,
    effects: SlotPool,
    music: SlotPool,
    pending: Vec<PendingPlay>,
    master_volume: i32,
    listener: ListenerSync,
    events: Sender<TagSonicEvent>,
    restore_attempts: u32,
    restore_backoff: Duration,
}

impl Scheduler {
    pub fn new(
        device: Box<dyn AudioDevice>,
        effects: SlotPool,
        music: SlotPool,
        desc: &TagSonicDesc,
        events: Sender<TagSonicEvent>,
    ) -> Self {
        Self {
            device,
            effects,
            music,
            pending: Vec::new(),
            master_volume: desc.master_volume,
            listener: ListenerSync::new(
                desc.distance_factor,
                desc.rolloff_factor,
                desc.doppler_factor,
            ),
            events,
            restore_attempts: desc.restore_attempts,
            restore_backoff: desc.restore_backoff,
        }
    }

    pub fn pool(&self, kind: PoolKind) -> &SlotPool {
        match kind {
            PoolKind::Effects => &self.effects,
            PoolKind::Music => &self.music,
        }
    }

    fn pool_mut(&mut self, kind: PoolKind) -> &mut SlotPool {
        match kind {
            PoolKind::Effects => &mut self.effects,
            PoolKind::Music => &mut self.music,
        }
    }

    fn emit(&self, event: TagSonicEvent) {
        // The manager owns the receiver for as long as the scheduler exists
        let _ = self.events.send(event);
    }

    /// Queue or immediately start `tag`. Never fails: unplayable requests are dropped.
    pub fn play(&mut self, registry: &TagRegistry, tag: Arc<AudioTag>, request: PlayRequest) {
        if request.delay_ms > 0 {
            log::debug!("Queued '{}' for {} ms", tag.name(), request.delay_ms);
            self.pending.push(PendingPlay { tag, request });
            return;
        }
        self.play_now(registry, tag, request);
    }

    fn play_now(&mut self, registry: &TagRegistry, tag: Arc<AudioTag>, request: PlayRequest) {
        let Some(kind) = tag.pool() else {
            log::debug!("Tag '{}' produces no audio", tag.name());
            return;
        };

        self.detect_loss(kind);
        if self.pool(kind).is_lost() {
            log::debug!("Ignoring '{}': {} buffers are lost", tag.name(), kind);
            return;
        }

        let format = *self.pool(kind).format();
        let Some(audio) = tag.create_audio(&format, request.object.clone(), request.notify.clone())
        else {
            return;
        };

        let selection = self.pool(kind).select(&tag);

        if let Some(cascade) = tag.cascade() {
            if selection.same_tag >= cascade.limit {
                // The new instance never plays, so it is dropped without notifying
                drop(audio);
                let stopped = self.pool_mut(kind).stop_tag(tag.name());
                log::debug!(
                    "Cascade on '{}': stopped {}, fallback {:?}",
                    tag.name(),
                    stopped,
                    cascade.fallback
                );
                self.emit(TagSonicEvent::Cascaded {
                    tag: tag.name().to_string(),
                    fallback: cascade.fallback.clone(),
                    stopped,
                });
                self.collect_finished();

                if let Some(fallback) = &cascade.fallback {
                    match registry.lookup(fallback) {
                        Some(fallback_tag) => {
                            let request = PlayRequest {
                                object: request.object,
                                ..PlayRequest::default()
                            };
                            self.play_now(registry, fallback_tag, request);
                        }
                        None => log::warn!(
                            "Cascade fallback '{}' of '{}' is not registered",
                            fallback,
                            tag.name()
                        ),
                    }
                }
                return;
            }
        }

        let Some(index) = selection.chosen() else {
            log::debug!("Dropping '{}': no {} slot available", tag.name(), kind);
            self.emit(TagSonicEvent::Dropped {
                tag: tag.name().to_string(),
                pool: kind,
            });
            return;
        };

        if selection.free.is_none() {
            let slot = self.pool_mut(kind).slot_mut(index);
            let victim = slot.tag_name().unwrap_or_default().to_string();
            slot.stop(true);
            log::debug!(
                "'{}' preempts '{}' in {} slot {}",
                tag.name(),
                victim,
                kind,
                index
            );
            self.emit(TagSonicEvent::Preempted {
                tag: victim,
                by: tag.name().to_string(),
                slot: index,
            });
        }

        let fade_from = match kind {
            PoolKind::Music => selection.fade_candidate(index),
            PoolKind::Effects => None,
        };
        let volume = clamp_volume(self.master_volume.saturating_add(tag.volume_adjust()));
        let name = tag.name().to_string();
        self.pool_mut(kind)
            .slot_mut(index)
            .start(tag, audio, volume, request.duration_ms);
        log::debug!("Started '{}' in {} slot {} at {} mB", name, kind, index, volume);
        self.emit(TagSonicEvent::Started {
            tag: name,
            pool: kind,
            slot: index,
        });

        if let Some(old) = fade_from {
            self.cross_fade(old, index, volume);
        }
        self.collect_finished();
    }

    /// Ramp `new` up from silence while `old` ramps down over what is left of `old`.
    fn cross_fade(&mut self, old: usize, new: usize, volume: i32) {
        let (remaining, from) = {
            let slot = &self.music.slots()[old];
            (
                slot.track_length_ms().saturating_sub(slot.lifetime_ms()),
                slot.tag_name().unwrap_or_default().to_string(),
            )
        };
        if remaining <= FADE_MARGIN_MS {
            return;
        }

        let span = remaining - FADE_MARGIN_MS;
        let rate = (volume - VOLUME_MIN) as f32 / span as f32;
        if rate <= 0.0 {
            // The new track is silent; there is nothing to fade over
            self.music.slot_mut(old).apply_volume(VOLUME_MIN);
            log::debug!("Silenced '{}' for a muted incoming track", from);
            return;
        }
        self.music.slot_mut(new).begin_transition(VOLUME_MIN, rate);
        self.music.slot_mut(old).fade_out(rate);

        let to = self.music.slots()[new]
            .tag_name()
            .unwrap_or_default()
            .to_string();
        log::debug!("Cross-fading '{}' -> '{}' over {} ms", from, to, span);
        self.emit(TagSonicEvent::FadeStarted {
            from,
            to,
            span_ms: span,
        });
    }

    /// Advance every pool by `elapsed_ms`.
    pub fn update(&mut self, registry: &TagRegistry, elapsed_ms: u32) {
        for kind in [PoolKind::Effects, PoolKind::Music] {
            self.recover(kind);
        }

        let queued = std::mem::take(&mut self.pending);
        let mut due = Vec::new();
        for mut entry in queued {
            if entry.request.delay_ms <= elapsed_ms {
                due.push(entry);
            } else {
                entry.request.delay_ms -= elapsed_ms;
                self.pending.push(entry);
            }
        }
        for PendingPlay { tag, mut request } in due {
            request.delay_ms = 0;
            self.play_now(registry, tag, request);
        }

        for kind in [PoolKind::Effects, PoolKind::Music] {
            if self.pool(kind).is_lost() {
                continue;
            }
            let mut looped = Vec::new();
            for slot in self.pool_mut(kind).slots_mut() {
                if slot.update(elapsed_ms) {
                    looped.push(TagSonicEvent::Looped {
                        tag: slot.tag_name().unwrap_or_default().to_string(),
                        slot: slot.index(),
                    });
                }
            }
            for event in looped {
                self.emit(event);
            }
        }
        self.collect_finished();

        self.listener.sync(self.device.as_mut());
    }

    fn collect_finished(&mut self) {
        let finished: Vec<String> = [PoolKind::Effects, PoolKind::Music]
            .into_iter()
            .flat_map(|kind| self.pool_mut(kind).take_finished())
            .collect();
        for tag in finished {
            self.emit(TagSonicEvent::Finished { tag });
        }
    }

    fn detect_loss(&mut self, kind: PoolKind) {
        if self.pool_mut(kind).detect_loss() {
            log::warn!("{} buffers lost", kind);
            self.emit(TagSonicEvent::BuffersLost { pool: kind });
        }
    }

    fn recover(&mut self, kind: PoolKind) {
        self.detect_loss(kind);
        if !self.pool(kind).is_lost() {
            return;
        }

        let (attempts, backoff) = (self.restore_attempts, self.restore_backoff);
        if self.pool_mut(kind).restore(attempts, backoff) {
            self.emit(TagSonicEvent::BuffersRestored { pool: kind });
            self.collect_finished();
        } else {
            log::warn!(
                "{} buffers still lost after {} restore attempts",
                kind,
                attempts
            );
        }
    }

    /// Apply `clamp(volume + tag adjust)` to every playing slot.
    ///
    /// Running cross-fades are cancelled: both tracks jump to their new level.
    pub fn set_overall_volume(&mut self, volume: i32) {
        self.master_volume = volume;
        for pool in [&mut self.effects, &mut self.music] {
            for slot in pool.slots_mut() {
                if !slot.is_playing() {
                    continue;
                }
                let adjust = slot.tag().map_or(0, |tag| tag.volume_adjust());
                slot.apply_volume(clamp_volume(volume.saturating_add(adjust)));
            }
        }
    }

    pub fn overall_volume(&self) -> i32 {
        self.master_volume
    }

    /// Stop every slot without notifying. Queued plays stay queued.
    pub fn stop_all(&mut self) {
        self.effects.stop_all(false);
        self.music.stop_all(false);
        log::debug!("Stopped all slots ({} plays still queued)", self.pending.len());
    }

    /// Longest time left on any playing music track.
    pub fn remaining_music_playback(&self) -> u32 {
        self.music
            .slots()
            .iter()
            .filter(|slot| slot.is_playing())
            .map(|slot| slot.remaining_ms())
            .max()
            .unwrap_or(0)
    }

    pub fn set_listener(&mut self, listener: Option<Arc<dyn Listener>>) {
        self.listener.set_listener(listener);
    }

    pub fn set_listener_factors(&mut self, distance: f32, rolloff: f32, doppler: f32) {
        self.listener.set_factors(distance, rolloff, doppler);
    }

    pub fn playing_count(&self, kind: PoolKind) -> usize {
        self.pool(kind).playing_count()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::TagSonicAudioData;
    use crate::config::{HrtfQuality, PcmFormat, StreamLayout, VOLUME_MAX};
    use crate::device::{BufferDesc, VirtualDevice};
    use crate::slot::BufferSlot;
    use crossbeam_channel::Receiver;

    fn desc() -> TagSonicDesc {
        TagSonicDesc::new()
            .sample_rate(1000)
            .bits_per_sample(8)
            .effect_streaming(400, 200, 100)
            .music_streaming(400, 200, 100)
            .master_volume(VOLUME_MAX)
    }

    fn pool(device: &VirtualDevice, kind: PoolKind, format: PcmFormat, layout: StreamLayout) -> SlotPool {
        let mut handle = device.clone();
        let slots = (0..2)
            .map(|index| {
                let buffer = handle
                    .create_buffer(&BufferDesc {
                        size: layout.buffer_bytes,
                        format,
                        spatial: kind == PoolKind::Effects,
                        hrtf: HrtfQuality::Full,
                    })
                    .unwrap();
                BufferSlot::new(index, buffer, format, layout, None)
            })
            .collect();
        SlotPool::new(kind, format, slots)
    }

    fn scheduler(device: &VirtualDevice) -> (Scheduler, Receiver<TagSonicEvent>) {
        let desc = desc();
        let effects = pool(device, PoolKind::Effects, desc.effect_format(), desc.effect_layout());
        let music = pool(device, PoolKind::Music, desc.music_format(), desc.music_layout());
        let (tx, rx) = crossbeam_channel::unbounded();
        (
            Scheduler::new(Box::new(device.clone()), effects, music, &desc, tx),
            rx,
        )
    }

    fn effect(registry: &mut TagRegistry, name: &str, ms: usize) -> Arc<AudioTag> {
        let data = TagSonicAudioData::from_samples(vec![0.5; ms], 1000, 1).unwrap();
        registry.register(AudioTag::effect(name, data))
    }

    #[test]
    fn test_silent_tag_is_ignored() {
        let device = VirtualDevice::new();
        let (mut scheduler, rx) = scheduler(&device);
        let registry = TagRegistry::new();
        scheduler.play(&registry, Arc::new(AudioTag::silent("x")), PlayRequest::new());
        assert_eq!(scheduler.playing_count(PoolKind::Effects), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_queue_keeps_order_and_decrements() {
        let device = VirtualDevice::new();
        let (mut scheduler, rx) = scheduler(&device);
        let mut registry = TagRegistry::new();
        let a = effect(&mut registry, "a", 1000);
        let b = effect(&mut registry, "b", 1000);

        scheduler.play(&registry, a, PlayRequest::new().delay_ms(100));
        scheduler.play(&registry, b, PlayRequest::new().delay_ms(50));
        scheduler.update(&registry, 60);
        assert_eq!(scheduler.pending_count(), 1);
        scheduler.update(&registry, 40);
        assert_eq!(scheduler.pending_count(), 0);

        let started: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e {
                TagSonicEvent::Started { tag, .. } => Some(tag),
                _ => None,
            })
            .collect();
        assert_eq!(started, ["b", "a"]);
    }

    #[test]
    fn test_update_commits_once() {
        let device = VirtualDevice::new();
        let (mut scheduler, _rx) = scheduler(&device);
        let mut registry = TagRegistry::new();
        let a = effect(&mut registry, "a", 1000);
        let b = effect(&mut registry, "b", 1000);
        scheduler.play(&registry, a, PlayRequest::new());
        scheduler.play(&registry, b, PlayRequest::new());
        assert_eq!(device.listener().commits, 0);

        scheduler.update(&registry, 10);
        assert_eq!(device.listener().commits, 1);
    }
    fn music(registry: &mut TagRegistry, name: &str, ms: usize, adjust: i32) -> Arc<AudioTag> {
        let data = TagSonicAudioData::from_samples(vec![0.5; ms * 2], 1000, 2).unwrap();
        registry.register(AudioTag::music(name, data).with_volume_adjust(adjust))
    }

    #[test]
    fn test_muted_incoming_track_silences_old_one() {
        let device = VirtualDevice::new();
        let (mut scheduler, rx) = scheduler(&device);
        let mut registry = TagRegistry::new();
        let a = music(&mut registry, "a", 5000, 0);
        let b = music(&mut registry, "b", 5000, -20_000);

        scheduler.play(&registry, a, PlayRequest::new());
        scheduler.play(&registry, b, PlayRequest::new());

        // Music buffers follow the two effect buffers
        assert_eq!(device.buffer(2).unwrap().volume, VOLUME_MIN);
        assert_eq!(scheduler.pool(PoolKind::Music).slots()[0].transition_rate(), 0.0);
        assert!(!rx.try_iter().any(|e| matches!(e, TagSonicEvent::FadeStarted { .. })));
    }

    #[test]
    fn test_extreme_volumes_saturate() {
        let device = VirtualDevice::new();
        let (mut scheduler, _rx) = scheduler(&device);
        let mut registry = TagRegistry::new();
        let data = TagSonicAudioData::from_samples(vec![0.5; 1000], 1000, 1).unwrap();
        let loud = registry.register(AudioTag::effect("loud", data.clone()).with_volume_adjust(5000));
        let quiet = registry.register(AudioTag::effect("quiet", data).with_volume_adjust(-500));

        scheduler.set_overall_volume(i32::MAX);
        scheduler.play(&registry, loud, PlayRequest::new());
        scheduler.play(&registry, quiet, PlayRequest::new());
        assert_eq!(device.buffer(0).unwrap().volume, VOLUME_MAX);

        scheduler.set_overall_volume(i32::MIN);
        assert_eq!(device.buffer(0).unwrap().volume, VOLUME_MIN);
        assert_eq!(device.buffer(1).unwrap().volume, VOLUME_MIN);
    }
}
