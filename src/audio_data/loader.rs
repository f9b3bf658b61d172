use crate::audio_data::{LoadOptions, TagSonicAudioData};
use crate::error::Result;
use std::sync::Arc;

/// Trait for loading audio data from file paths.
///
/// TagSonic ships a Symphonia-backed [`DefaultAudioLoader`](super::DefaultAudioLoader);
/// games with packed asset archives can bring their own.
///
/// # Example
///
/// ```ignore
/// use tagsonic::audio_data::{AudioDataLoader, LoadOptions, TagSonicAudioData};
/// use tagsonic::error::Result;
/// use std::sync::Arc;
///
/// struct PakLoader;
///
/// impl AudioDataLoader for PakLoader {
///     fn load(&self, path: &str, options: &LoadOptions) -> Result<Arc<TagSonicAudioData>> {
///         todo!()
///     }
/// }
/// ```
pub trait AudioDataLoader {
    /// Loads and decodes audio data from `path`.
    ///
    /// # Errors
    ///
    /// Returns a `TagSonicError` if the file cannot be opened or decoded.
    fn load(&self, path: &str, options: &LoadOptions) -> Result<Arc<TagSonicAudioData>>;
}
