//! Chunk Store
//!
//! Owns every resident chunk record, keyed by [`ChunkKey`]. Holds no policy;
//! the controller decides what goes in and what comes out.

use std::collections::HashMap;

use crate::chunk::{ChunkState, WorldChunk};
use crate::coords::ChunkKey;
use crate::error::{Result, StreamingError};

/// Mapping from chunk key to chunk record
#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: HashMap<ChunkKey, WorldChunk>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            chunks: HashMap::with_capacity(capacity),
        }
    }

    /// Reserve room for at least `additional` more chunks
    pub fn reserve(&mut self, additional: usize) {
        self.chunks.reserve(additional);
    }

    pub fn get(&self, key: ChunkKey) -> Option<&WorldChunk> {
        self.chunks.get(&key)
    }

    pub fn get_mut(&mut self, key: ChunkKey) -> Option<&mut WorldChunk> {
        self.chunks.get_mut(&key)
    }

    pub fn contains(&self, key: ChunkKey) -> bool {
        self.chunks.contains_key(&key)
    }

    /// Insert a new record; fails if the key is already resident
    pub fn insert(&mut self, chunk: WorldChunk) -> Result<()> {
        let key = chunk.key();
        if self.chunks.contains_key(&key) {
            return Err(StreamingError::ChunkAlreadyPresent(key));
        }
        self.chunks.insert(key, chunk);
        Ok(())
    }

    pub fn remove(&mut self, key: ChunkKey) -> Option<WorldChunk> {
        self.chunks.remove(&key)
    }

    /// All Loaded chunks, in no particular order
    pub fn loaded(&self) -> impl Iterator<Item = &WorldChunk> + '_ {
        self.chunks.values().filter(|c| c.state() == ChunkState::Loaded)
    }

    /// Every resident chunk regardless of state
    pub fn iter(&self) -> impl Iterator<Item = &WorldChunk> + '_ {
        self.chunks.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = ChunkKey> + '_ {
        self.chunks.keys().copied()
    }

    /// Number of resident chunks in the given state
    pub fn count_in_state(&self, state: ChunkState) -> usize {
        self.chunks.values().filter(|c| c.state() == state).count()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkHandles, LoadSource};
    use crate::coords::ChunkCoord;
    use glam::DVec3;

    fn chunk_at(x: i64) -> WorldChunk {
        let key = ChunkKey::pack(ChunkCoord::new(x, 0, 0)).unwrap();
        WorldChunk::new(key, DVec3::new(x as f64 * 1000.0, 0.0, 0.0), LoadSource::InRange)
    }

    #[test]
    fn test_insert_get_remove() {
        let mut store = ChunkStore::new();
        let chunk = chunk_at(1);
        let key = chunk.key();

        store.insert(chunk).unwrap();
        assert!(store.contains(key));
        assert_eq!(store.get(key).unwrap().coord(), ChunkCoord::new(1, 0, 0));

        let removed = store.remove(key).unwrap();
        assert_eq!(removed.key(), key);
        assert!(store.is_empty());
        assert!(store.remove(key).is_none());
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let mut store = ChunkStore::new();
        store.insert(chunk_at(2)).unwrap();

        let err = store.insert(chunk_at(2)).unwrap_err();
        assert!(matches!(err, StreamingError::ChunkAlreadyPresent(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_loaded_filters_by_state() {
        let mut store = ChunkStore::with_capacity(4);

        let mut loading = chunk_at(0);
        loading.start_loading(0.0);
        store.insert(loading).unwrap();

        let mut loaded = chunk_at(1);
        loaded.start_loading(0.0);
        loaded.finish_loading(ChunkHandles::new(), 1.0).unwrap();
        let loaded_key = loaded.key();
        store.insert(loaded).unwrap();

        let keys: Vec<_> = store.loaded().map(|c| c.key()).collect();
        assert_eq!(keys, vec![loaded_key]);
        assert_eq!(store.count_in_state(ChunkState::Loading), 1);
        assert_eq!(store.count_in_state(ChunkState::Loaded), 1);
    }
}
