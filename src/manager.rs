use crate::audio::WorldObject;
use crate::config::{HrtfQuality, PcmFormat, StreamLayout, TagSonicDesc};
use crate::device::{AudioDevice, BufferDesc, CpalDevice};
use crate::error::{Result, TagSonicError};
use crate::events::{PoolKind, TagSonicEvent};
use crate::listener::Listener;
use crate::pool::SlotPool;
use crate::scheduler::Scheduler;
use crate::slot::BufferSlot;
use crate::tag::{AudioTag, TagRegistry};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::{Arc, Weak};

/// Optional parameters of a single play call.
///
/// ```ignore
/// manager.play("footstep", PlayRequest::new().attached_to(&player).delay_ms(120));
/// ```
#[derive(Clone, Default)]
pub struct PlayRequest {
    /// Object the sound follows; held weakly so a dropped object plays out in place
    pub object: Option<Weak<dyn WorldObject>>,
    /// Total play time; shorter sounds restart until it is filled. 0 plays once.
    pub duration_ms: u32,
    pub delay_ms: u32,
    /// Receives `Finished` once this instance ends, is preempted or cascades away
    pub notify: Option<Sender<TagSonicEvent>>,
}

impl PlayRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attached_to<T: WorldObject + 'static>(mut self, object: &Arc<T>) -> Self {
        let object: Arc<dyn WorldObject> = object.clone();
        self.object = Some(Arc::downgrade(&object));
        self
    }

    pub fn duration_ms(mut self, duration_ms: u32) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn delay_ms(mut self, delay_ms: u32) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn notify(mut self, sender: Sender<TagSonicEvent>) -> Self {
        self.notify = Some(sender);
        self
    }
}

impl std::fmt::Debug for PlayRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayRequest")
            .field("attached", &self.object.is_some())
            .field("duration_ms", &self.duration_ms)
            .field("delay_ms", &self.delay_ms)
            .field("notify", &self.notify.is_some())
            .finish()
    }
}

/// Main entry point of TagSonic.
///
/// `TagSonicManager` owns the tag registry and both slot pools. It is constructed
/// explicitly by the application and driven from the frame loop:
///
/// - **Setup**: `new` creates every hardware buffer up front; `register_tag` loads tags
/// - **Per frame**: `play` as gameplay requests sounds, then one `update(elapsed_ms)`
/// - **Teardown**: `shutdown` (or drop) stops all buffers and clears the registry
///
/// Scheduling outcomes are queued as [`TagSonicEvent`]s and drained with
/// [`poll_events`](Self::poll_events).
pub struct TagSonicManager {
    desc: TagSonicDesc,
    registry: TagRegistry,
    scheduler: Scheduler,
    events: Receiver<TagSonicEvent>,
}

impl TagSonicManager {
    /// Initialize on `device`. Any failure releases the buffers created so far.
    pub fn new(mut device: Box<dyn AudioDevice>, desc: TagSonicDesc) -> Result<Self> {
        desc.validate()?;
        device
            .set_primary_format(&desc.primary_format())
            .map_err(|e| TagSonicError::AudioDevice(format!("Primary buffer setup failed: {}", e)))?;

        let effects = create_pool(
            device.as_mut(),
            PoolKind::Effects,
            desc.effect_slots,
            desc.effect_format(),
            desc.effect_layout(),
            desc.hrtf,
            Some((desc.min_distance, desc.max_distance)),
        )?;
        let music = create_pool(
            device.as_mut(),
            PoolKind::Music,
            desc.music_slots,
            desc.music_format(),
            desc.music_layout(),
            HrtfQuality::None,
            None,
        )?;

        let (sender, events) = unbounded();
        let scheduler = Scheduler::new(device, effects, music, &desc, sender);
        log::info!(
            "TagSonic initialized: {} effect slots, {} music slots, {} Hz {}-bit",
            desc.effect_slots,
            desc.music_slots,
            desc.sample_rate,
            desc.bits_per_sample
        );

        Ok(Self {
            desc,
            registry: TagRegistry::new(),
            scheduler,
            events,
        })
    }

    /// Initialize on the default cpal output device.
    pub fn with_default_device(desc: TagSonicDesc) -> Result<Self> {
        Self::new(Box::new(CpalDevice::new()), desc)
    }

    pub fn desc(&self) -> &TagSonicDesc {
        &self.desc
    }

    /// Register `tag`, converting its audio once to the format of the pool it plays in.
    ///
    /// A tag with the same name is replaced; instances already playing keep the old data.
    pub fn register_tag(&mut self, tag: AudioTag) -> Result<Arc<AudioTag>> {
        if let Some(cascade) = tag.cascade() {
            if cascade.limit == 0 {
                return Err(TagSonicError::Configuration(format!(
                    "Tag '{}' has a cascade limit of 0",
                    tag.name()
                )));
            }
        }

        let tag = match tag.pool() {
            Some(kind) => tag.conformed(self.scheduler.pool(kind).format())?,
            None => tag,
        };
        Ok(self.registry.register(tag))
    }

    pub fn tag(&self, name: &str) -> Option<Arc<AudioTag>> {
        self.registry.lookup(name)
    }

    /// Name of the tag at `index` in name order.
    pub fn tag_name(&self, index: usize) -> Option<&str> {
        self.registry.name_at(index)
    }

    pub fn tag_count(&self) -> usize {
        self.registry.len()
    }

    pub fn clear_tags(&mut self) {
        self.registry.clear();
    }

    /// Play the tag named `name`. Unknown tags and unplayable requests are ignored.
    pub fn play(&mut self, name: &str, request: PlayRequest) {
        match self.registry.lookup(name) {
            Some(tag) => self.scheduler.play(&self.registry, tag, request),
            None => log::warn!("Play of unknown tag '{}'", name),
        }
    }

    /// Advance playback by `elapsed_ms`: fire due delayed plays, stream every slot and
    /// commit this tick's 3D changes.
    pub fn update(&mut self, elapsed_ms: u32) {
        self.scheduler.update(&self.registry, elapsed_ms);
    }

    /// Set the master volume in millibels and reapply it to everything playing.
    pub fn set_overall_volume(&mut self, volume: i32) {
        self.scheduler.set_overall_volume(volume);
    }

    pub fn overall_volume(&self) -> i32 {
        self.scheduler.overall_volume()
    }

    /// Silence every slot. Completion notifications are not sent.
    pub fn stop_all(&mut self) {
        self.scheduler.stop_all();
    }

    /// Milliseconds until the longest playing music track ends, 0 if none is playing.
    pub fn remaining_music_playback(&self) -> u32 {
        self.scheduler.remaining_music_playback()
    }

    pub fn set_listener(&mut self, listener: Option<Arc<dyn Listener>>) {
        self.scheduler.set_listener(listener);
    }

    pub fn set_listener_factors(&mut self, distance: f32, rolloff: f32, doppler: f32) {
        self.scheduler.set_listener_factors(distance, rolloff, doppler);
    }

    /// Drain queued scheduling events.
    pub fn poll_events(&self) -> Vec<TagSonicEvent> {
        self.events.try_iter().collect()
    }

    pub fn playing_count(&self, kind: PoolKind) -> usize {
        self.scheduler.playing_count(kind)
    }

    pub fn pending_count(&self) -> usize {
        self.scheduler.pending_count()
    }

    /// Explicit teardown; equivalent to dropping the manager.
    pub fn shutdown(self) {}
}

impl Drop for TagSonicManager {
    fn drop(&mut self) {
        self.scheduler.stop_all();
        self.registry.clear();
        log::info!("TagSonic shut down");
    }
}

fn create_pool(
    device: &mut dyn AudioDevice,
    kind: PoolKind,
    count: usize,
    format: PcmFormat,
    layout: StreamLayout,
    hrtf: HrtfQuality,
    distance_range: Option<(f32, f32)>,
) -> Result<SlotPool> {
    let desc = BufferDesc {
        size: layout.buffer_bytes,
        format,
        spatial: kind == PoolKind::Effects,
        hrtf,
    };

    let mut slots = Vec::with_capacity(count);
    for index in 0..count {
        let buffer = device.create_buffer(&desc).map_err(|e| {
            TagSonicError::AudioDevice(format!("Creating {} buffer {} failed: {}", kind, index, e))
        })?;
        slots.push(BufferSlot::new(index, buffer, format, layout, distance_range));
    }
    log::debug!("Created {} {} buffers of {} bytes", count, kind, layout.buffer_bytes);
    Ok(SlotPool::new(kind, format, slots))
}
