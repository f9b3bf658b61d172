//! Fixed-size pools of buffer slots and the single-pass slot selection.

use crate::config::PcmFormat;
use crate::slot::BufferSlot;
use crate::tag::AudioTag;
use std::time::Duration;

pub use crate::events::PoolKind;

/// Everything the scheduler needs from one scan of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    /// First slot that is not playing
    pub free: Option<usize>,
    /// Playing slots owned by the requested tag
    pub same_tag: usize,
    /// Preemption candidate: the last-scanned playing slot whose priority is the
    /// lowest seen and not above the requested tag's
    pub lowest: Option<usize>,
    last_occupied: Option<usize>,
    prev_occupied: Option<usize>,
}

impl Selection {
    /// Slot to play in: the free slot, else the preemption candidate.
    pub fn chosen(&self) -> Option<usize> {
        self.free.or(self.lowest)
    }

    /// Last occupied slot other than `chosen`; the track a new music slot fades over.
    pub fn fade_candidate(&self, chosen: usize) -> Option<usize> {
        if self.last_occupied == Some(chosen) {
            self.prev_occupied
        } else {
            self.last_occupied
        }
    }
}

#[derive(Debug)]
pub struct SlotPool {
    kind: PoolKind,
    format: PcmFormat,
    slots: Vec<BufferSlot>,
    lost: bool,
}

impl SlotPool {
    pub fn new(kind: PoolKind, format: PcmFormat, slots: Vec<BufferSlot>) -> Self {
        Self {
            kind,
            format,
            slots,
            lost: false,
        }
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn format(&self) -> &PcmFormat {
        &self.format
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[BufferSlot] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [BufferSlot] {
        &mut self.slots
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut BufferSlot {
        &mut self.slots[index]
    }

    pub fn playing_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_playing()).count()
    }

    /// Scan every slot once for a free slot, tag occupancy and the preemption candidate.
    ///
    /// Ties on the lowest priority go to the slot scanned last.
    pub fn select(&self, tag: &AudioTag) -> Selection {
        let mut selection = Selection::default();
        let mut low_priority = tag.priority();

        for (index, slot) in self.slots.iter().enumerate() {
            if !slot.is_playing() {
                if selection.free.is_none() {
                    selection.free = Some(index);
                }
                continue;
            }

            if slot.tag_name() == Some(tag.name()) {
                selection.same_tag += 1;
            }
            if let Some(priority) = slot.priority() {
                if priority <= low_priority {
                    low_priority = priority;
                    selection.lowest = Some(index);
                }
            }
            selection.prev_occupied = selection.last_occupied;
            selection.last_occupied = Some(index);
        }

        selection
    }

    /// Stop every playing slot owned by `name`, returning how many were stopped.
    pub fn stop_tag(&mut self, name: &str) -> usize {
        let mut stopped = 0;
        for slot in &mut self.slots {
            if slot.is_playing() && slot.tag_name() == Some(name) {
                slot.stop(true);
                stopped += 1;
            }
        }
        stopped
    }

    pub fn stop_all(&mut self, finalize: bool) {
        for slot in &mut self.slots {
            slot.stop(finalize);
        }
    }

    /// Tags finalized since the last call.
    pub fn take_finished(&mut self) -> Vec<String> {
        self.slots
            .iter_mut()
            .filter_map(BufferSlot::take_finished)
            .collect()
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    /// Poll buffer status; returns `true` the first time a lost buffer is seen.
    pub fn detect_loss(&mut self) -> bool {
        if self.lost {
            return false;
        }
        self.lost = self.slots.iter().any(BufferSlot::is_lost);
        self.lost
    }

    /// Try to reacquire every buffer, sleeping `backoff` between rounds.
    ///
    /// On success, slots whose contents were lost are stopped and the pool is usable.
    pub fn restore(&mut self, attempts: u32, backoff: Duration) -> bool {
        for attempt in 0..attempts.max(1) {
            let mut restored = true;
            for slot in &mut self.slots {
                if slot.restore().is_err() {
                    restored = false;
                }
            }
            if restored {
                log::info!(
                    "Restored {} buffers after {} attempt(s)",
                    self.kind,
                    attempt + 1
                );
                self.stop_all(true);
                self.lost = false;
                return true;
            }
            if !backoff.is_zero() {
                std::thread::sleep(backoff);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::TagSonicAudioData;
    use crate::config::{HrtfQuality, StreamLayout};
    use crate::device::{AudioDevice, BufferDesc, VirtualDevice};
    use std::sync::Arc;

    fn format() -> PcmFormat {
        PcmFormat::new(1, 1000, 8)
    }

    fn pool(device: &VirtualDevice, count: usize) -> SlotPool {
        let mut handle = device.clone();
        let slots = (0..count)
            .map(|index| {
                let buffer = handle
                    .create_buffer(&BufferDesc {
                        size: 400,
                        format: format(),
                        spatial: true,
                        hrtf: HrtfQuality::Full,
                    })
                    .unwrap();
                BufferSlot::new(index, buffer, format(), StreamLayout::new(400, 200, 100), None)
            })
            .collect();
        SlotPool::new(PoolKind::Effects, format(), slots)
    }

    fn tag(name: &str, priority: i32) -> Arc<AudioTag> {
        let data = TagSonicAudioData::from_samples(vec![0.0; 1000], 1000, 1).unwrap();
        Arc::new(AudioTag::effect(name, data).with_priority(priority))
    }

    fn start(pool: &mut SlotPool, index: usize, tag: &Arc<AudioTag>) {
        let audio = tag.create_audio(&format(), None, None).unwrap();
        pool.slot_mut(index).start(Arc::clone(tag), audio, 0, 0);
    }

    #[test]
    fn test_select_prefers_first_free() {
        let device = VirtualDevice::new();
        let mut pool = pool(&device, 3);
        let a = tag("a", 1);
        start(&mut pool, 0, &a);

        let selection = pool.select(&a);
        assert_eq!(selection.free, Some(1));
        assert_eq!(selection.same_tag, 1);
        assert_eq!(selection.chosen(), Some(1));
    }

    #[test]
    fn test_select_tie_goes_to_last_scanned() {
        let device = VirtualDevice::new();
        let mut pool = pool(&device, 3);
        let low = tag("low", 1);
        let high = tag("high", 5);
        start(&mut pool, 0, &low);
        start(&mut pool, 1, &high);
        start(&mut pool, 2, &low);

        let selection = pool.select(&tag("mid", 3));
        assert_eq!(selection.free, None);
        assert_eq!(selection.lowest, Some(2));
        assert_eq!(selection.fade_candidate(2), Some(1));
        assert_eq!(selection.fade_candidate(0), Some(2));
    }

    #[test]
    fn test_select_refuses_higher_priority_slots() {
        let device = VirtualDevice::new();
        let mut pool = pool(&device, 2);
        let high = tag("high", 5);
        start(&mut pool, 0, &high);
        start(&mut pool, 1, &high);

        assert_eq!(pool.select(&tag("low", 1)).chosen(), None);
        assert_eq!(pool.select(&tag("equal", 5)).chosen(), Some(1));
    }

    #[test]
    fn test_stop_tag_and_finished() {
        let device = VirtualDevice::new();
        let mut pool = pool(&device, 3);
        let a = tag("a", 0);
        let b = tag("b", 0);
        start(&mut pool, 0, &a);
        start(&mut pool, 1, &b);
        start(&mut pool, 2, &a);

        assert_eq!(pool.stop_tag("a"), 2);
        assert_eq!(pool.playing_count(), 1);
        assert_eq!(pool.take_finished(), vec!["a".to_string(), "a".to_string()]);
        assert!(pool.take_finished().is_empty());
    }

    #[test]
    fn test_loss_and_restore() {
        let device = VirtualDevice::new();
        let mut pool = pool(&device, 2);
        let a = tag("a", 0);
        start(&mut pool, 0, &a);

        device.lose_buffers();
        device.fail_restores(4);
        assert!(pool.detect_loss());
        assert!(!pool.detect_loss());
        assert!(pool.is_lost());

        // Two slots per round: four failures use up two rounds
        assert!(!pool.restore(2, Duration::ZERO));
        assert!(pool.is_lost());
        assert!(pool.restore(1, Duration::ZERO));
        assert!(!pool.is_lost());
        assert_eq!(pool.playing_count(), 0);
        assert_eq!(pool.take_finished(), vec!["a".to_string()]);
    }
}
