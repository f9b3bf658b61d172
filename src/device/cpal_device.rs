use super::emulated::{self, SharedState};
use super::{AudioDevice, BufferDesc, ListenerParams, SoundBuffer};
use crate::config::PcmFormat;
use crate::error::{Result, TagSonicError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Output device backed by cpal.
///
/// Sound buffers live in memory shared with the audio callback, which mixes every
/// playing buffer into the output stream and advances their play cursors.
pub struct CpalDevice {
    state: SharedState,
    stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
    frames_processed: Arc<AtomicUsize>,
}

impl CpalDevice {
    /// Create the device. No stream is opened until the primary format is set.
    pub fn new() -> Self {
        Self {
            state: SharedState::default(),
            stream: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frames_processed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Number of output frames rendered since the stream started.
    pub fn frames_processed(&self) -> usize {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// Stop and drop the output stream. Buffers keep their contents.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.is_running.store(false, Ordering::Relaxed);
            drop(stream);
        }
    }

    fn start(&mut self, format: &PcmFormat) -> Result<()> {
        self.stop();

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            TagSonicError::AudioDevice("No default output device available".into())
        })?;

        let config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let default_config = device.default_output_config().map_err(|e| {
            TagSonicError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.create_stream::<f32>(&device, &config)?,
            cpal::SampleFormat::I16 => self.create_stream::<i16>(&device, &config)?,
            cpal::SampleFormat::U16 => self.create_stream::<u16>(&device, &config)?,
            _ => {
                return Err(TagSonicError::AudioFormat(
                    "Unsupported sample format".into(),
                ));
            }
        };

        stream.play().map_err(|e| {
            TagSonicError::AudioDevice(format!("Failed to start stream: {}", e))
        })?;

        self.stream = Some(stream);
        self.is_running.store(true, Ordering::Relaxed);
        log::info!(
            "Output stream started ({} Hz, {} ch)",
            format.sample_rate,
            format.channels
        );

        Ok(())
    }

    fn create_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let state = Arc::clone(&self.state);
        let is_running = Arc::clone(&self.is_running);
        let frames_processed = Arc::clone(&self.frames_processed);
        let channels = config.channels;
        let sample_rate = config.sample_rate.0;
        let mut mix_buffer: Vec<f32> = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if !is_running.load(Ordering::Relaxed) {
                        for sample in data.iter_mut() {
                            *sample = T::from_sample(0.0f32);
                        }
                        return;
                    }

                    mix_buffer.resize(data.len(), 0.0);
                    // Never block the audio thread on the scheduler
                    match state.try_lock() {
                        Ok(mut guard) => guard.mix(&mut mix_buffer, channels, sample_rate),
                        Err(_) => mix_buffer.fill(0.0),
                    }

                    for (out, &value) in data.iter_mut().zip(mix_buffer.iter()) {
                        *out = T::from_sample(value);
                    }

                    frames_processed
                        .fetch_add(data.len() / channels.max(1) as usize, Ordering::Relaxed);
                },
                |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| TagSonicError::AudioDevice(format!("Failed to build stream: {}", e)))
    }
}

impl Default for CpalDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDevice for CpalDevice {
    fn set_primary_format(&mut self, format: &PcmFormat) -> Result<()> {
        format.validate()?;
        self.start(format)
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<Box<dyn SoundBuffer>> {
        emulated::create_buffer(&self.state, desc)
    }

    fn set_listener(&mut self, params: &ListenerParams) {
        emulated::lock(&self.state).pending_listener = *params;
    }

    fn commit_deferred_settings(&mut self) {
        emulated::lock(&self.state).commit();
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.stop();
    }
}
