//! Non-interactive save location for artifacts.

use std::path::{Path, PathBuf};

use chrono::Local;
use glimpse_common::error::{GlimpseError, GlimpseResult};
use glimpse_platform_core::SaveDialogOptions;

/// Propose where an artifact of `mime_type_hint` goes inside `dir`.
///
/// Uses the dialog's default name, `capture.<ext>`. An existing file gets a
/// timestamped sibling instead, and a counter after that.
pub fn propose_save_path(dir: &Path, mime_type_hint: &str) -> PathBuf {
    let options = SaveDialogOptions::for_mime(mime_type_hint);
    let plain = dir.join(&options.default_name);
    if !plain.exists() {
        return plain;
    }

    let ext = options
        .extensions
        .first()
        .map(String::as_str)
        .unwrap_or("bin");
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let stamped = dir.join(format!("capture-{stamp}.{ext}"));
    if !stamped.exists() {
        return stamped;
    }

    (2u32..)
        .map(|n| dir.join(format!("capture-{stamp}-{n}.{ext}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(stamped)
}

/// Write `bytes` to `path`, creating parent directories.
pub async fn write_artifact(path: &Path, bytes: &[u8]) -> GlimpseResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await.map_err(|e| {
        GlimpseError::persist(format!("Failed to write {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_save_uses_default_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = propose_save_path(dir.path(), "video/webm;codecs=vp9");
        assert_eq!(path, dir.path().join("capture.webm"));
    }

    #[test]
    fn existing_files_are_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("capture.gif"), b"old").unwrap();

        let second = propose_save_path(dir.path(), "image/gif");
        assert_ne!(second, dir.path().join("capture.gif"));
        assert_eq!(second.extension().unwrap(), "gif");
        std::fs::write(&second, b"newer").unwrap();

        let third = propose_save_path(dir.path(), "image/gif");
        assert!(!third.exists());
        assert_ne!(third, second);
    }

    #[tokio::test]
    async fn write_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("capture.mp4");

        write_artifact(&path, b"\x00\x00\x00\x18ftyp").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"\x00\x00\x00\x18ftyp");
    }
}
