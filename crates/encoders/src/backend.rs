//! The encoder backend contract.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use glimpse_common::error::{GlimpseError, GlimpseResult};
use glimpse_media_model::MediaStream;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};

/// Which backend variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Container,
    Palette,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Palette => "palette",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An option value passed to [`EncoderBackend::set_option`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Number(f64),
    Text(String),
}

impl OptionValue {
    /// Numeric view; text that parses as a number counts.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Text view; numbers are formatted.
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Final encoded bytes of one backend for one recording.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl fmt::Debug for EncodedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedArtifact")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Lifecycle notifications of a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Started { kind: BackendKind },
    /// Encoded bytes became available.
    DataAvailable { kind: BackendKind, len: usize },
    /// The backend finished its run. Sent before the artifact is delivered.
    Stopped { kind: BackendKind },
    Failed { kind: BackendKind, message: String },
}

/// Resolves to the artifact of a stopped backend.
///
/// Resolves exactly once, after the backend's `stop()` was called.
#[derive(Debug)]
pub struct PendingArtifact {
    kind: BackendKind,
    rx: oneshot::Receiver<GlimpseResult<EncodedArtifact>>,
}

impl PendingArtifact {
    pub(crate) fn new(
        kind: BackendKind,
        rx: oneshot::Receiver<GlimpseResult<EncodedArtifact>>,
    ) -> Self {
        Self { kind, rx }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }
}

impl Future for PendingArtifact {
    type Output = GlimpseResult<EncodedArtifact>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let kind = self.kind;
        Pin::new(&mut self.rx).poll(cx).map(|delivered| {
            delivered.unwrap_or_else(|_| {
                Err(GlimpseError::encode(
                    kind.as_str(),
                    "Recorder went away without delivering an artifact",
                ))
            })
        })
    }
}

/// A pipeline that turns a media stream into one artifact per recording.
///
/// Options changed while a recording runs apply to the next `start`.
pub trait EncoderBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    /// MIME type of the artifact the next recording produces.
    fn output_type(&self) -> String;

    /// Set an option by name.
    ///
    /// Unrecognised names are ignored. A recognised name with an unusable
    /// value is a `Config` error.
    fn set_option(&self, name: &str, value: OptionValue) -> GlimpseResult<()>;

    /// Begin encoding the first video track of `stream`.
    ///
    /// Fails with `BackendBusy` while a previous run has not delivered its
    /// artifact yet.
    fn start(&self, stream: &MediaStream) -> GlimpseResult<()>;

    /// Stop the current run. The artifact arrives through the returned future.
    fn stop(&self) -> GlimpseResult<PendingArtifact>;

    /// True from `start` until the artifact has been delivered.
    fn is_active(&self) -> bool;

    /// Whether this backend wants a fixed-size, compositor-drawn source.
    fn needs_normalized_frames(&self) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_values_convert_between_views() {
        assert_eq!(OptionValue::from("12").as_number(), Some(12.0));
        assert_eq!(OptionValue::from("fast").as_number(), None);
        assert_eq!(OptionValue::from(3u32).as_text(), "3");
    }

    #[test]
    fn option_values_deserialize_untagged() {
        let values: Vec<OptionValue> = serde_json::from_str(r#"[10, "Atkinson"]"#).unwrap();
        assert_eq!(values[0], OptionValue::Number(10.0));
        assert_eq!(values[1], OptionValue::Text("Atkinson".into()));
    }

    #[tokio::test]
    async fn dropped_sender_resolves_to_error() {
        let (tx, rx) = oneshot::channel();
        drop(tx);
        let err = PendingArtifact::new(BackendKind::Palette, rx)
            .await
            .unwrap_err();
        assert!(matches!(err, GlimpseError::Encode { ref backend, .. } if backend == "palette"));
    }
}
