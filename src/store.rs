// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Process-wide cache of decoded sample PCM.
//!
//! Decoding (possibly Vorbis) happens outside the realtime thread; the
//! decoded mono frames arrive through the event queue as dumps. A voice
//! whose sample id has no entry yet renders silence until the dump lands,
//! at which point the processor rehomes its cursor.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

/// Maps sample ids to decoded mono PCM. Entries only appear via dumps and
/// only disappear via [`SampleStore::clear`].
#[derive(Default)]
pub struct SampleStore {
    entries: HashMap<u32, Arc<[f32]>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The decoded frames for a sample id, if dumped.
    pub fn get(&self, sample_id: u32) -> Option<&Arc<[f32]>> {
        self.entries.get(&sample_id)
    }

    /// Whether a sample id has been dumped.
    pub fn contains(&self, sample_id: u32) -> bool {
        self.entries.contains_key(&sample_id)
    }

    /// Publishes decoded frames for a sample id. A repeated dump for the
    /// same id replaces the previous data.
    pub fn dump(&mut self, sample_id: u32, frames: Arc<[f32]>) {
        debug!(sample_id, frames = frames.len(), "Sample dumped");
        self.entries.insert(sample_id, frames);
    }

    /// Drops every entry. The caller must ensure no voices are live.
    pub fn clear(&mut self) {
        info!(entries = self.entries.len(), "Clearing sample store");
        self.entries.clear();
    }

    /// Number of dumped samples.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total memory held by the cached PCM, in bytes.
    pub fn memory_usage(&self) -> usize {
        self.entries
            .values()
            .map(|frames| frames.len() * std::mem::size_of::<f32>())
            .sum()
    }
}

impl std::fmt::Debug for SampleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleStore")
            .field("entries", &self.entries.len())
            .field("memory_kb", &(self.memory_usage() / 1024))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_and_get() {
        let mut store = SampleStore::new();
        assert!(!store.contains(3));

        store.dump(3, Arc::from(vec![0.5f32; 16]));
        assert!(store.contains(3));
        assert_eq!(store.get(3).unwrap().len(), 16);
        assert_eq!(store.memory_usage(), 64);
    }

    #[test]
    fn test_redump_replaces() {
        let mut store = SampleStore::new();
        store.dump(1, Arc::from(vec![0.0f32; 8]));
        store.dump(1, Arc::from(vec![0.0f32; 32]));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(1).unwrap().len(), 32);
    }

    #[test]
    fn test_clear() {
        let mut store = SampleStore::new();
        store.dump(1, Arc::from(vec![0.0f32; 8]));
        store.dump(2, Arc::from(vec![0.0f32; 8]));
        store.clear();
        assert!(store.is_empty());
        assert!(store.get(1).is_none());
    }
}
