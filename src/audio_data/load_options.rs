/// Defines how to handle channel conversion during audio loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvertToMono {
    /// Keep original channels: stereo if input is stereo, mono if input is mono.
    #[default]
    Original,

    /// Force mono: stereo input is averaged into one channel.
    ///
    /// Effect tags are conformed to mono anyway when registered, so loading them
    /// as mono up front saves the conversion.
    ForceMono,
}

/// Options for controlling audio file loading behavior.
///
/// # Examples
///
/// ```no_run
/// # use tagsonic::audio_data::{LoadOptions, ConvertToMono};
/// let options = LoadOptions::new()
///     .convert_to_mono(ConvertToMono::ForceMono);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// How to handle mono conversion during audio loading.
    pub convert_to_mono: ConvertToMono,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convert_to_mono(mut self, convert: ConvertToMono) -> Self {
        self.convert_to_mono = convert;
        self
    }
}
