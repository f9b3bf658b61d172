//! One hardware buffer plus the streaming state that feeds it.
//!
//! A slot streams its audio through a ring: the first `initial_read_bytes` are written
//! at offset 0, then `chunk_bytes` chunks are appended whenever no more than one chunk
//! of written audio is left ahead of the play cursor. When the source runs dry the slot drains:
//! it counts down the bytes of real audio still ahead of the cursor and stops once
//! they have played.

use crate::audio::{Audio, AudioKind};
use crate::config::{PcmFormat, StreamLayout, VOLUME_MAX, VOLUME_MIN, clamp_volume};
use crate::device::{BufferStatus, PlayMode, SoundBuffer};
use crate::error::Result;
use crate::math::Vec3;
use crate::tag::AudioTag;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Never used
    Empty,
    /// Source has more data; chunks are appended as the cursor advances
    Streaming,
    /// Source exhausted; the tail already in the ring is playing out
    Draining,
    /// Finished, preempted or stopped; free for reuse
    Stopped,
}

impl StreamState {
    pub fn is_playing(self) -> bool {
        matches!(self, Self::Streaming | Self::Draining)
    }

    pub fn can_transition(self, next: Self) -> bool {
        use StreamState::*;
        matches!(
            (self, next),
            (_, Streaming) | (Streaming, Draining) | (Streaming | Draining, Stopped)
        )
    }
}

/// Forward distance from `from` to `to` around a ring of `size` bytes.
pub fn ring_distance(from: usize, to: usize, size: usize) -> usize {
    if size == 0 {
        return 0;
    }
    (to % size + size - from % size) % size
}

pub struct BufferSlot {
    index: usize,
    buffer: Box<dyn SoundBuffer>,
    format: PcmFormat,
    layout: StreamLayout,
    distance_range: Option<(f32, f32)>,
    state: StreamState,
    tag: Option<Arc<AudioTag>>,
    audio: Option<Audio>,
    /// Target volume in millibels
    volume: i32,
    cur_volume: f32,
    /// Millibels per millisecond; zero when no transition is running
    transition_rate: f32,
    lifetime_ms: u32,
    /// Requested play time; 0 plays the source once
    duration_ms: u32,
    track_length_ms: u32,
    next_write: usize,
    /// Written bytes the play cursor has not reached yet while streaming
    written_ahead: usize,
    prev_play: usize,
    /// End of real audio in the ring while draining
    tail_end: usize,
    /// Bytes of real audio ahead of the play cursor while draining
    remaining: usize,
    one_shot: bool,
    finished: Option<String>,
    scratch: Vec<u8>,
}

impl BufferSlot {
    pub fn new(
        index: usize,
        buffer: Box<dyn SoundBuffer>,
        format: PcmFormat,
        layout: StreamLayout,
        distance_range: Option<(f32, f32)>,
    ) -> Self {
        Self {
            index,
            buffer,
            format,
            layout,
            distance_range,
            state: StreamState::Empty,
            tag: None,
            audio: None,
            volume: VOLUME_MAX,
            cur_volume: VOLUME_MAX as f32,
            transition_rate: 0.0,
            lifetime_ms: 0,
            duration_ms: 0,
            track_length_ms: 0,
            next_write: 0,
            written_ahead: 0,
            prev_play: 0,
            tail_end: 0,
            remaining: 0,
            one_shot: false,
            finished: None,
            scratch: Vec::with_capacity(layout.initial_read_bytes.max(layout.chunk_bytes)),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn tag(&self) -> Option<&Arc<AudioTag>> {
        self.tag.as_ref()
    }

    pub fn tag_name(&self) -> Option<&str> {
        self.tag.as_deref().map(AudioTag::name)
    }

    pub fn priority(&self) -> Option<i32> {
        self.tag.as_deref().map(AudioTag::priority)
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn lifetime_ms(&self) -> u32 {
        self.lifetime_ms
    }

    pub fn track_length_ms(&self) -> u32 {
        self.track_length_ms
    }

    /// Time left before the track ends, wrapping for tracks that restarted.
    pub fn remaining_ms(&self) -> u32 {
        if self.track_length_ms == 0 {
            return 0;
        }
        self.track_length_ms - self.lifetime_ms % self.track_length_ms
    }

    pub fn volume(&self) -> i32 {
        self.volume
    }

    pub fn current_volume(&self) -> i32 {
        self.cur_volume.round() as i32
    }

    pub fn transition_rate(&self) -> f32 {
        self.transition_rate
    }

    pub fn status(&self) -> BufferStatus {
        self.buffer.status()
    }

    /// Tag of the last audio finalized by this slot, if not yet collected.
    pub fn take_finished(&mut self) -> Option<String> {
        self.finished.take()
    }

    fn transition(&mut self, next: StreamState) {
        debug_assert!(
            self.state.can_transition(next),
            "invalid slot transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    /// Install `audio` and begin looped playback from the start of the ring.
    pub fn start(&mut self, tag: Arc<AudioTag>, audio: Audio, volume: i32, duration_ms: u32) {
        self.buffer.stop();
        self.audio = None;

        self.volume = clamp_volume(volume);
        self.cur_volume = self.volume as f32;
        self.transition_rate = 0.0;
        self.lifetime_ms = 0;
        self.duration_ms = duration_ms;
        self.track_length_ms = audio.length_ms();
        self.one_shot = false;
        self.remaining = 0;
        self.tail_end = 0;

        match audio.kind() {
            AudioKind::Sound3D { .. } | AudioKind::Sound => {
                if let Some((min, max)) = self.distance_range {
                    self.buffer.set_distance_range(min, max);
                }
                match audio.world_state() {
                    Some((position, velocity)) => {
                        self.buffer.set_head_relative(false);
                        self.buffer.set_position(position);
                        self.buffer.set_velocity(velocity);
                    }
                    None => {
                        self.buffer.set_head_relative(true);
                        self.buffer.set_position(Vec3::ZERO);
                        self.buffer.set_velocity(Vec3::ZERO);
                    }
                }
            }
            AudioKind::Music => {}
        }

        self.tag = Some(tag);
        self.audio = Some(audio);
        self.transition(StreamState::Streaming);
        self.buffer.set_volume(self.volume);
        self.prime();
        self.buffer.play(PlayMode::Looping);
        self.try_arm_one_shot(0);
    }

    fn prime(&mut self) {
        self.buffer.set_current_position(0);
        let initial = self.layout.initial_read_bytes;
        let (written, more) = self.fill_at(0, initial);
        self.next_write = initial % self.layout.buffer_bytes;
        self.written_ahead = initial;
        self.prev_play = 0;
        if !more {
            self.enter_draining(written, written, 0);
        }
    }

    fn fill_at(&mut self, offset: usize, len: usize) -> (usize, bool) {
        self.scratch.resize(len, 0);
        let result = match self.audio.as_mut() {
            Some(audio) => audio.fill(&mut self.scratch[..len]),
            None => {
                self.scratch[..len].fill(self.format.silence());
                (0, false)
            }
        };
        self.buffer.write(offset, &self.scratch[..len]);
        result
    }

    fn refill(&mut self, play: usize) {
        let chunk = self.layout.chunk_bytes;
        let offset = self.next_write;
        let (written, more) = self.fill_at(offset, chunk);
        self.next_write = (offset + chunk) % self.layout.buffer_bytes;
        if more {
            self.written_ahead += chunk;
        } else {
            self.enter_draining(offset + written, self.written_ahead + written, play);
        }
    }

    /// Append chunks until more than one chunk of audio is queued ahead of `play`.
    ///
    /// `overrun` is how far the cursor ran past the written audio since the last tick.
    /// The stale bytes it played are gone; streaming resumes at the cursor.
    fn stream_ahead(&mut self, play: usize, overrun: usize) {
        if overrun > 0 {
            log::debug!(
                "Slot {} ran {} bytes past its written audio",
                self.index,
                overrun
            );
            self.next_write = play;
        }

        let (chunk, size) = (self.layout.chunk_bytes, self.layout.buffer_bytes);
        while self.state == StreamState::Streaming
            && self.written_ahead <= chunk
            && self.written_ahead + chunk <= size
        {
            self.refill(play);
        }
    }

    /// `remaining` is the count of real audio bytes between `play` and `tail_end`.
    fn enter_draining(&mut self, tail_end: usize, remaining: usize, play: usize) {
        let size = self.layout.buffer_bytes;
        self.transition(StreamState::Draining);
        self.tail_end = tail_end % size;
        self.remaining = remaining;

        // Everything behind the tail is stale; silence it so a late stop stays quiet
        let gap = ring_distance(self.tail_end, play, size);
        if gap > 0 {
            let silence = vec![self.format.silence(); gap];
            self.buffer.write(self.tail_end, &silence);
        }

        if self.audio.as_ref().is_some_and(Audio::is_music) {
            self.finalize();
        }
    }

    /// Switch to one-shot playback once the tail no longer wraps the ring.
    fn try_arm_one_shot(&mut self, play: usize) {
        if self.state == StreamState::Draining
            && !self.one_shot
            && play + self.remaining <= self.layout.buffer_bytes
        {
            self.buffer.play(PlayMode::Once);
            self.one_shot = true;
        }
    }

    fn finalize(&mut self) {
        if let Some(mut audio) = self.audio.take() {
            audio.finish();
            self.finished = Some(audio.tag_name().to_string());
        }
    }

    /// Advance the slot by one tick. Returns `true` if the audio restarted to fill
    /// its requested duration.
    pub fn update(&mut self, elapsed_ms: u32) -> bool {
        if !self.state.is_playing() {
            return false;
        }

        self.lifetime_ms = self.lifetime_ms.saturating_add(elapsed_ms);
        let size = self.layout.buffer_bytes;
        let status = self.buffer.status();
        let play = self.buffer.play_cursor();
        let progress = if status.playing {
            ring_distance(self.prev_play, play, size)
        } else {
            0
        };
        self.prev_play = play;
        let mut overrun = 0;
        if self.state == StreamState::Draining {
            self.remaining = self.remaining.saturating_sub(progress);
        } else {
            overrun = progress.saturating_sub(self.written_ahead);
            self.written_ahead = self.written_ahead.saturating_sub(progress);
        }

        let mut looped = false;
        let wants_more = self.duration_ms > 0
            && self.lifetime_ms < self.duration_ms
            && self.audio.is_some();

        if self.state == StreamState::Draining
            && wants_more
            && (self.remaining <= self.layout.chunk_bytes || !status.playing)
        {
            if let Some(audio) = self.audio.as_mut() {
                audio.rewind();
            }
            self.one_shot = false;
            self.transition(StreamState::Streaming);
            if self.remaining == 0 || !status.playing {
                self.buffer.stop();
                self.prime();
                self.buffer.play(PlayMode::Looping);
                self.try_arm_one_shot(0);
            } else {
                self.buffer.play(PlayMode::Looping);
                self.next_write = self.tail_end;
                self.written_ahead = self.remaining;
                self.stream_ahead(play, 0);
                self.try_arm_one_shot(play);
            }
            looped = true;
        } else if self.state == StreamState::Streaming {
            self.stream_ahead(play, overrun);
            self.try_arm_one_shot(play);
        } else if self.remaining == 0 || !status.playing {
            self.stop(true);
            return looped;
        } else {
            self.try_arm_one_shot(play);
        }

        if let Some((position, velocity)) = self.audio.as_ref().and_then(Audio::world_state) {
            self.buffer.set_position(position);
            self.buffer.set_velocity(velocity);
        }
        if self.transition_rate != 0.0 {
            self.advance_volume(elapsed_ms);
        }

        looped
    }

    fn advance_volume(&mut self, elapsed_ms: u32) {
        let target = self.volume as f32;
        self.cur_volume += self.transition_rate * elapsed_ms as f32;
        if (self.transition_rate > 0.0 && self.cur_volume >= target)
            || (self.transition_rate < 0.0 && self.cur_volume <= target)
        {
            self.cur_volume = target;
            self.transition_rate = 0.0;
        }
        self.cur_volume = self.cur_volume.clamp(VOLUME_MIN as f32, VOLUME_MAX as f32);
        self.buffer.set_volume(self.current_volume());
    }

    /// Ramp from `from` toward the current target at `rate` millibels per ms.
    pub fn begin_transition(&mut self, from: i32, rate: f32) {
        self.cur_volume = clamp_volume(from) as f32;
        self.transition_rate = rate;
        self.buffer.set_volume(self.current_volume());
    }

    /// Ramp down to silence at `rate` millibels per ms (a positive magnitude).
    pub fn fade_out(&mut self, rate: f32) {
        self.volume = VOLUME_MIN;
        self.transition_rate = -rate.abs();
    }

    /// Jump to `volume` now, cancelling any running transition.
    pub fn apply_volume(&mut self, volume: i32) {
        self.volume = clamp_volume(volume);
        self.cur_volume = self.volume as f32;
        self.transition_rate = 0.0;
        self.buffer.set_volume(self.volume);
    }

    /// Stop playback, finalizing the audio when `finalize` is set.
    pub fn stop(&mut self, finalize: bool) {
        if !self.state.is_playing() {
            return;
        }
        self.buffer.stop();
        if finalize {
            self.finalize();
        }
        self.audio = None;
        self.tag = None;
        self.transition_rate = 0.0;
        self.transition(StreamState::Stopped);
    }

    pub fn is_lost(&self) -> bool {
        self.buffer.status().lost
    }

    pub fn restore(&mut self) -> Result<()> {
        self.buffer.restore()
    }
}

impl std::fmt::Debug for BufferSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferSlot")
            .field("index", &self.index)
            .field("state", &self.state)
            .field("tag", &self.tag_name())
            .field("volume", &self.volume)
            .field("lifetime_ms", &self.lifetime_ms)
            .finish()
    }
}
