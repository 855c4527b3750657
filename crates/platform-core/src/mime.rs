//! MIME type helpers for the save dialog.

use serde::{Deserialize, Serialize};

/// Strip parameters (`;codecs=...`) from a MIME type.
pub fn mime_essence(mime: &str) -> &str {
    mime.split(';').next().unwrap_or(mime).trim()
}

/// File extension for a MIME type hint: the subtype of its essence.
///
/// `video/webm;codecs=vp9` gives `webm`, `image/gif` gives `gif`.
pub fn extension_for_mime(mime: &str) -> &str {
    let essence = mime_essence(mime);
    match essence.split_once('/') {
        Some((_, subtype)) if !subtype.is_empty() => subtype,
        _ => "bin",
    }
}

/// What a host save dialog is pre-filled with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDialogOptions {
    /// Suggested file name, `capture.<ext>`.
    pub default_name: String,
    /// Filter label, the MIME essence.
    pub filter_name: String,
    pub extensions: Vec<String>,
}

impl SaveDialogOptions {
    pub fn for_mime(mime_type_hint: &str) -> Self {
        let ext = extension_for_mime(mime_type_hint);
        Self {
            default_name: format!("capture.{ext}"),
            filter_name: mime_essence(mime_type_hint).to_string(),
            extensions: vec![ext.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_parameter_is_stripped() {
        assert_eq!(mime_essence("video/webm;codecs=vp9"), "video/webm");
        assert_eq!(extension_for_mime("video/webm;codecs=vp9"), "webm");
        assert_eq!(extension_for_mime("video/3gpp2"), "3gpp2");
        assert_eq!(extension_for_mime("image/gif"), "gif");
    }

    #[test]
    fn malformed_hint_gets_generic_extension() {
        assert_eq!(extension_for_mime("garbage"), "bin");
        assert_eq!(extension_for_mime("video/"), "bin");
    }

    #[test]
    fn dialog_defaults_follow_hint() {
        let options = SaveDialogOptions::for_mime("video/mp4");
        assert_eq!(options.default_name, "capture.mp4");
        assert_eq!(options.filter_name, "video/mp4");
        assert_eq!(options.extensions, vec!["mp4".to_string()]);
    }
}
