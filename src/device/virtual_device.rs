use super::emulated::{self, SharedState};
use super::{AudioDevice, BufferDesc, ListenerParams, SoundBuffer};
use crate::config::PcmFormat;
use crate::error::{Result, TagSonicError};
use crate::math::Vec3;
use std::sync::{Arc, Mutex};

/// Headless device whose play cursors only move when [`VirtualDevice::advance`] is called.
///
/// Clones share state, so a test can hand one clone to the manager and keep another
/// to drive the clock, inspect buffers and inject faults.
#[derive(Clone, Default)]
pub struct VirtualDevice {
    state: SharedState,
    control: Arc<Mutex<Control>>,
}

#[derive(Debug, Default)]
struct Control {
    primary_format: Option<PcmFormat>,
    fail_primary_format: bool,
    /// Number of buffers that can still be created before creation fails
    buffer_budget: Option<usize>,
}

/// Observable state of one buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferSnapshot {
    pub size: usize,
    pub spatial: bool,
    pub playing: bool,
    pub looping: bool,
    pub lost: bool,
    pub volume: i32,
    pub cursor: usize,
    /// Committed 3D parameters
    pub position: Vec3,
    pub velocity: Vec3,
    pub min_distance: f32,
    pub max_distance: f32,
    pub head_relative: bool,
    pub writes: usize,
    pub bytes_written: usize,
}

/// Committed listener state plus the number of commits so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerSnapshot {
    pub params: ListenerParams,
    pub commits: usize,
}

impl VirtualDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance every playing buffer by `ms` milliseconds of its own format.
    pub fn advance(&self, ms: u32) {
        let mut state = emulated::lock(&self.state);
        for buffer in &mut state.buffers {
            let frames = ms as f64 * buffer.desc.format.sample_rate as f64 / 1000.0;
            buffer.advance(frames);
        }
    }

    pub fn primary_format(&self) -> Option<PcmFormat> {
        self.control().primary_format
    }

    pub fn buffer_count(&self) -> usize {
        emulated::lock(&self.state).buffers.len()
    }

    pub fn buffer(&self, index: usize) -> Option<BufferSnapshot> {
        let state = emulated::lock(&self.state);
        state.buffers.get(index).map(|b| BufferSnapshot {
            size: b.desc.size,
            spatial: b.desc.spatial,
            playing: b.playing,
            looping: b.playing && b.looping,
            lost: b.lost,
            volume: b.volume,
            cursor: b.cursor(),
            position: b.committed.position,
            velocity: b.committed.velocity,
            min_distance: b.committed.min_distance,
            max_distance: b.committed.max_distance,
            head_relative: b.committed.head_relative,
            writes: b.writes,
            bytes_written: b.bytes_written,
        })
    }

    /// Raw ring contents of one buffer.
    pub fn buffer_data(&self, index: usize) -> Option<Vec<u8>> {
        emulated::lock(&self.state)
            .buffers
            .get(index)
            .map(|b| b.data.clone())
    }

    pub fn listener(&self) -> ListenerSnapshot {
        let state = emulated::lock(&self.state);
        ListenerSnapshot {
            params: state.listener,
            commits: state.commits,
        }
    }

    /// Let only `count` more buffers be created.
    pub fn fail_buffer_creation_after(&self, count: usize) {
        self.control().buffer_budget = Some(count);
    }

    pub fn fail_primary_format(&self) {
        self.control().fail_primary_format = true;
    }

    /// Reclaim every buffer's memory, as when another application takes the device.
    pub fn lose_buffers(&self) {
        let mut state = emulated::lock(&self.state);
        for buffer in &mut state.buffers {
            buffer.lose();
        }
    }

    /// Make the next `count` restore calls report the buffer as still lost.
    pub fn fail_restores(&self, count: u32) {
        emulated::lock(&self.state).restore_failures = count;
    }

    fn control(&self) -> std::sync::MutexGuard<'_, Control> {
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AudioDevice for VirtualDevice {
    fn set_primary_format(&mut self, format: &PcmFormat) -> Result<()> {
        let mut control = self.control();
        if control.fail_primary_format {
            return Err(TagSonicError::AudioDevice(
                "Primary buffer rejected the format".into(),
            ));
        }
        format.validate()?;
        control.primary_format = Some(*format);
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<Box<dyn SoundBuffer>> {
        {
            let mut control = self.control();
            if let Some(budget) = control.buffer_budget.as_mut() {
                if *budget == 0 {
                    return Err(TagSonicError::AudioDevice(
                        "Out of hardware buffers".into(),
                    ));
                }
                *budget -= 1;
            }
        }
        emulated::create_buffer(&self.state, desc)
    }

    fn set_listener(&mut self, params: &ListenerParams) {
        emulated::lock(&self.state).pending_listener = *params;
    }

    fn commit_deferred_settings(&mut self) {
        emulated::lock(&self.state).commit();
    }
}

impl std::fmt::Debug for VirtualDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = emulated::lock(&self.state);
        f.debug_struct("VirtualDevice")
            .field("buffers", &state.buffers.len())
            .field("commits", &state.commits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HrtfQuality;
    use crate::device::PlayMode;

    fn desc(size: usize) -> BufferDesc {
        BufferDesc {
            size,
            format: PcmFormat::new(1, 1000, 8),
            spatial: true,
            hrtf: HrtfQuality::Full,
        }
    }

    #[test]
    fn test_advance_moves_cursor_by_millis() {
        let device = VirtualDevice::new();
        let mut handle = device.clone();
        let mut buffer = handle.create_buffer(&desc(400)).unwrap();
        buffer.play(PlayMode::Looping);

        device.advance(150);
        assert_eq!(buffer.play_cursor(), 150);
        device.advance(300);
        assert_eq!(buffer.play_cursor(), 50);
        assert!(buffer.status().looping);
    }

    #[test]
    fn test_deferred_settings_apply_on_commit() {
        let device = VirtualDevice::new();
        let mut handle = device.clone();
        let mut buffer = handle.create_buffer(&desc(400)).unwrap();
        buffer.set_position(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(device.buffer(0).unwrap().position, Vec3::ZERO);

        handle.commit_deferred_settings();
        assert_eq!(device.buffer(0).unwrap().position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(device.listener().commits, 1);
    }

    #[test]
    fn test_buffer_budget() {
        let mut device = VirtualDevice::new();
        device.fail_buffer_creation_after(1);
        assert!(device.create_buffer(&desc(400)).is_ok());
        assert!(device.create_buffer(&desc(400)).is_err());
    }

    #[test]
    fn test_lost_buffer_restores_after_failures() {
        let device = VirtualDevice::new();
        let mut handle = device.clone();
        let mut buffer = handle.create_buffer(&desc(400)).unwrap();
        buffer.play(PlayMode::Looping);

        device.lose_buffers();
        device.fail_restores(2);
        assert!(buffer.status().lost);
        assert!(!buffer.status().playing);
        assert!(buffer.restore().is_err());
        assert!(buffer.restore().is_err());
        assert!(buffer.restore().is_ok());
        assert!(!buffer.status().lost);
    }
}
