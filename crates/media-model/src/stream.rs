//! Media streams: a handle over one or more live tracks.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::track::VideoTrack;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// A set of tracks produced together, e.g. one capture or one compositor output.
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: u64,
    tracks: Vec<VideoTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<VideoTrack>) -> Self {
        Self {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            tracks,
        }
    }

    pub fn from_track(track: VideoTrack) -> Self {
        Self::new(vec![track])
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn video_tracks(&self) -> &[VideoTrack] {
        &self.tracks
    }

    /// The first video track, which is the one encoders and previews consume.
    pub fn video_track(&self) -> Option<&VideoTrack> {
        self.tracks.first()
    }

    /// True while any track is still live.
    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(VideoTrack::is_live)
    }

    /// Stop every track of the stream.
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
        tracing::debug!(stream = self.id, "Stream stopped");
    }
}
