use crate::error::{Result, TagSonicError};
use rubato::{FftFixedIn, Resampler};

const CHUNK_FRAMES: usize = 1024;

/// Offline sample-rate converter used when tag data is conformed to a buffer format.
///
/// All channels go through a single rubato instance so they stay phase-aligned.
#[derive(Debug, Clone, Copy)]
pub struct AudioResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: u16,
}

impl AudioResampler {
    pub fn new(source_sample_rate: u32, target_sample_rate: u32, channels: u16) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(TagSonicError::AudioFormat(format!(
                "Cannot resample {} Hz -> {} Hz",
                source_sample_rate, target_sample_rate
            )));
        }
        if channels == 0 {
            return Err(TagSonicError::AudioFormat(
                "Cannot resample audio without channels".to_string(),
            ));
        }

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            channels,
        })
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn ratio(&self) -> f64 {
        self.target_sample_rate as f64 / self.source_sample_rate as f64
    }

    /// Frames produced from `frames` input frames.
    pub fn output_frames(&self, frames: usize) -> usize {
        (frames as f64 * self.ratio()).round() as usize
    }

    /// Convert interleaved samples, returning interleaved samples at the target rate.
    pub fn resample(&self, interleaved: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(interleaved.to_vec());
        }

        let channels = self.channels as usize;
        let frames = interleaved.len() / channels;
        let mut planar: Vec<Vec<f32>> = (0..channels)
            .map(|ch| interleaved.iter().skip(ch).step_by(channels).copied().collect())
            .collect();

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_sample_rate as usize,
            self.target_sample_rate as usize,
            CHUNK_FRAMES,
            2,
            channels,
        )
        .map_err(|e| TagSonicError::AudioLoading(format!("Resampler setup failed: {}", e)))?;

        let chunk = resampler.input_frames_next();
        // Zero-pad to whole chunks; the tail this produces is cut below
        let padded = frames.div_ceil(chunk).max(1) * chunk;
        for channel in &mut planar {
            channel.resize(padded, 0.0);
        }

        let wanted = self.output_frames(frames);
        let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted + chunk); channels];
        for start in (0..padded).step_by(chunk) {
            let input: Vec<&[f32]> = planar
                .iter()
                .map(|channel| &channel[start..start + chunk])
                .collect();
            let processed = resampler
                .process(&input, None)
                .map_err(|e| TagSonicError::AudioLoading(format!("Resampling failed: {}", e)))?;
            for (out, chunk_out) in output.iter_mut().zip(processed) {
                out.extend(chunk_out);
            }
        }

        let produced = output.iter().map(Vec::len).min().unwrap_or(0).min(wanted);
        let mut result = Vec::with_capacity(produced * channels);
        for frame in 0..produced {
            result.extend(output.iter().map(|channel| channel[frame]));
        }
        Ok(result)
    }
}
