//! Hands finished artifacts to the host for saving.

use std::path::PathBuf;
use std::sync::Arc;

use glimpse_common::error::{GlimpseError, GlimpseResult};
use glimpse_encoders::EncodedArtifact;
use glimpse_platform_core::DesktopHost;

/// Asks the host for a path and writes one artifact there.
#[derive(Clone)]
pub struct SavePipeline {
    host: Arc<dyn DesktopHost>,
}

impl SavePipeline {
    pub fn new(host: Arc<dyn DesktopHost>) -> Self {
        Self { host }
    }

    /// Persist `artifact`.
    ///
    /// `Ok(None)` means the user cancelled the save dialog and nothing was
    /// written. Failures come back as `Persist` errors after being logged;
    /// the artifact is dropped either way.
    pub async fn persist(&self, artifact: EncodedArtifact) -> GlimpseResult<Option<PathBuf>> {
        let path = match self.host.get_save_path(&artifact.mime_type).await {
            Ok(Some(path)) => path,
            Ok(None) => {
                tracing::info!(mime = %artifact.mime_type, "Save cancelled, artifact discarded");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(mime = %artifact.mime_type, error = %e, "Could not get a save path");
                return Err(GlimpseError::persist(format!("No save path: {e}")));
            }
        };

        if let Err(e) = self.host.write_file(&path, &artifact.bytes).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write artifact");
            return Err(GlimpseError::persist(format!(
                "Failed to write {}: {e}",
                path.display()
            )));
        }

        tracing::info!(
            path = %path.display(),
            mime = %artifact.mime_type,
            bytes = artifact.bytes.len(),
            "Artifact saved"
        );
        Ok(Some(path))
    }
}
