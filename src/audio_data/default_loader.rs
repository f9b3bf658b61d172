use crate::audio_data::{AudioDataLoader, ConvertToMono, LoadOptions, TagSonicAudioData};
use crate::error::{Result, TagSonicError};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

/// Symphonia-backed loader for every format in Symphonia's default registry.
pub struct DefaultAudioLoader;

/// Decoder state for the default track of one file.
struct TrackReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
}

impl TrackReader {
    fn open(path: &str) -> Result<Self> {
        let file = File::open(path)?;
        let source = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = Path::new(path).extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let format = get_probe()
            .format(
                &hint,
                source,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| loading_error(path, "unrecognized format", e))?
            .format;

        let track = format
            .default_track()
            .ok_or_else(|| TagSonicError::AudioLoading(format!("{}: no audio track", path)))?;
        let params = &track.codec_params;
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| TagSonicError::AudioLoading(format!("{}: unknown sample rate", path)))?;
        let channels = params
            .channels
            .map(|channels| channels.count() as u16)
            .ok_or_else(|| TagSonicError::AudioLoading(format!("{}: unknown channel layout", path)))?;
        let track_id = track.id;

        let decoder = get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| loading_error(path, "no decoder", e))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    /// Decode every remaining packet of the track into interleaved f32 samples.
    fn decode_all(&mut self, path: &str) -> Result<Vec<f32>> {
        let mut samples = Vec::new();
        let mut scratch: Option<SampleBuffer<f32>> = None;
        let mut scratch_frames = 0;

        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                // End of stream
                Err(Error::IoError(_)) => break,
                Err(e) => return Err(loading_error(path, "bad packet", e)),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::IoError(_)) => break,
                Err(Error::DecodeError(e)) => {
                    log::debug!("{}: skipping corrupt packet: {}", path, e);
                    continue;
                }
                Err(e) => return Err(loading_error(path, "decode failed", e)),
            };

            let frames = decoded.capacity() as u64;
            if frames > scratch_frames {
                scratch = Some(SampleBuffer::new(frames, *decoded.spec()));
                scratch_frames = frames;
            }
            if let Some(buffer) = scratch.as_mut() {
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
        }

        Ok(samples)
    }
}

fn loading_error(path: &str, what: &str, error: Error) -> TagSonicError {
    TagSonicError::AudioLoading(format!("{}: {}: {}", path, what, error))
}

impl AudioDataLoader for DefaultAudioLoader {
    fn load(&self, path: &str, options: &LoadOptions) -> Result<Arc<TagSonicAudioData>> {
        let mut reader = TrackReader::open(path)?;
        let samples = reader.decode_all(path)?;
        let mut data = TagSonicAudioData::from_samples(samples, reader.sample_rate, reader.channels)?;
        if options.convert_to_mono == ConvertToMono::ForceMono {
            data = data.to_mono()?;
        }

        log::debug!(
            "Loaded {} ({} Hz, {} ch, {:?})",
            path,
            data.sample_rate(),
            data.channels(),
            data.duration()
        );
        Ok(Arc::new(data))
    }
}
