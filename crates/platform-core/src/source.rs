//! Capture sources and the process-wide source selection.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A selectable screen or window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSource {
    /// Human readable name (monitor name or window title).
    pub name: String,
    /// Opaque id understood by the host's display-media grant.
    pub id: String,
    /// Preview image as a data URL, empty when none was taken.
    pub thumbnail: String,
}

/// The source id the next display-media grant resolves to.
///
/// Last write wins. Changing the selection never affects a stream that has
/// already been granted.
#[derive(Debug, Clone, Default)]
pub struct SourceSelection {
    selected: Arc<RwLock<Option<String>>>,
}

impl SourceSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: impl Into<String>) {
        let id = id.into();
        tracing::debug!(source = %id, "Capture source selected");
        *self.selected.write() = Some(id);
    }

    pub fn current(&self) -> Option<String> {
        self.selected.read().clone()
    }

    /// Find the selected source in `sources`.
    pub fn resolve<'a>(&self, sources: &'a [CaptureSource]) -> Option<&'a CaptureSource> {
        let selected = self.selected.read();
        let id = selected.as_deref()?;
        sources.iter().find(|source| source.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: &str) -> CaptureSource {
        CaptureSource {
            name: id.to_string(),
            id: id.to_string(),
            thumbnail: String::new(),
        }
    }

    #[test]
    fn last_write_wins() {
        let selection = SourceSelection::new();
        let shared = selection.clone();
        selection.set("screen:0:0");
        shared.set("window:42:0");

        assert_eq!(selection.current().as_deref(), Some("window:42:0"));
    }

    #[test]
    fn resolve_requires_a_matching_source() {
        let sources = vec![source("screen:0:0"), source("window:42:0")];
        let selection = SourceSelection::new();
        assert!(selection.resolve(&sources).is_none());

        selection.set("window:42:0");
        assert_eq!(selection.resolve(&sources).unwrap().id, "window:42:0");

        selection.set("window:7:0");
        assert!(selection.resolve(&sources).is_none());
    }
}
