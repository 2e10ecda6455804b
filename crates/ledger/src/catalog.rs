//! In-memory content catalog.

use dashmap::DashMap;

use cadence_api::ContentCatalog;
use cadence_primitives::{ContentId, TrackInfo};

/// In-memory [`ContentCatalog`] for dev and testing.
#[derive(Default)]
pub struct MemoryCatalog {
    tracks: DashMap<ContentId, TrackInfo>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a track, replacing any previous row for the same id.
    pub fn insert_track(&self, track: TrackInfo) {
        let _ = self.tracks.insert(track.content_id, track);
    }
}

impl ContentCatalog for MemoryCatalog {
    fn track(&self, content: ContentId) -> Option<TrackInfo> {
        self.tracks.get(&content).map(|t| t.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_primitives::Address;

    #[test]
    fn test_lookup() {
        let catalog = MemoryCatalog::new();
        let content = ContentId::from([5u8; 32]);
        catalog.insert_track(TrackInfo {
            content_id: content,
            creator_id: Address::from([2u8; 20]),
            title: "first take".into(),
            restricted: Vec::new(),
        });

        assert!(catalog.track(content).is_some());
        assert!(catalog.track(ContentId::from([6u8; 32])).is_none());
    }
}
