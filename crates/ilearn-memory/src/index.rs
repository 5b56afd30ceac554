//! Exact nearest-neighbour index keyed by record id.
//!
//! Vectors live in one contiguous buffer, one slot per insertion. Removal
//! marks a slot dead instead of shifting the buffer; once dead slots exceed
//! the compaction ratio the buffer is rewritten without them. Slot order is
//! insertion order, which is also the tie-breaker for equal distances.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{MemoryError, Result};
use crate::types::RecordId;
use crate::validation::validate_embedding;

/// Default fraction of dead slots that triggers compaction.
pub const DEFAULT_COMPACTION_RATIO: f32 = 0.25;

/// A single search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Record the vector belongs to.
    pub id: RecordId,
    /// Squared L2 distance to the query.
    pub distance: f32,
}

/// Brute-force squared-L2 index with tombstoned removal.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    compaction_ratio: f32,
    vectors: Vec<f32>,
    ids: Vec<RecordId>,
    live: Vec<bool>,
    slots: HashMap<RecordId, usize>,
    dead: usize,
}

impl FlatIndex {
    /// Create an empty index for vectors of `dimensions` floats.
    pub fn new(dimensions: usize) -> Self {
        Self::with_compaction_ratio(dimensions, DEFAULT_COMPACTION_RATIO)
    }

    /// Create an empty index with a custom compaction threshold.
    pub fn with_compaction_ratio(dimensions: usize, compaction_ratio: f32) -> Self {
        Self {
            dimensions,
            compaction_ratio: compaction_ratio.clamp(0.0, 1.0),
            vectors: Vec::new(),
            ids: Vec::new(),
            live: Vec::new(),
            slots: HashMap::new(),
            dead: 0,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of live vectors.
    pub fn count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of dead slots awaiting compaction.
    pub fn tombstones(&self) -> usize {
        self.dead
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Append a vector for `id`.
    pub fn add(&mut self, id: RecordId, vector: &[f32]) -> Result<()> {
        validate_embedding(vector, self.dimensions)?;
        if self.slots.contains_key(&id) {
            return Err(MemoryError::InvalidData(format!(
                "record {id} is already indexed"
            )));
        }

        let slot = self.ids.len();
        self.vectors.extend_from_slice(vector);
        self.ids.push(id);
        self.live.push(true);
        self.slots.insert(id, slot);
        Ok(())
    }

    /// Remove the vector for `id`. Returns `false` if it was not indexed.
    pub fn remove(&mut self, id: RecordId) -> bool {
        let Some(slot) = self.slots.remove(&id) else {
            return false;
        };
        self.live[slot] = false;
        self.dead += 1;

        if self.dead as f32 > self.compaction_ratio * self.ids.len() as f32 {
            self.compact();
        }
        true
    }

    /// Drop dead slots, keeping live vectors in insertion order.
    pub fn compact(&mut self) {
        if self.dead == 0 {
            return;
        }
        let before = self.ids.len();
        let mut vectors = Vec::with_capacity(self.slots.len() * self.dimensions);
        let mut ids = Vec::with_capacity(self.slots.len());

        for (slot, id) in self.ids.iter().enumerate() {
            if !self.live[slot] {
                continue;
            }
            let start = slot * self.dimensions;
            vectors.extend_from_slice(&self.vectors[start..start + self.dimensions]);
            ids.push(*id);
        }

        self.slots = ids.iter().enumerate().map(|(slot, id)| (*id, slot)).collect();
        self.live = vec![true; ids.len()];
        self.vectors = vectors;
        self.ids = ids;
        self.dead = 0;
        debug!(before, after = self.ids.len(), "Compacted vector index");
    }

    /// Find up to `k` nearest live vectors, nearest first.
    ///
    /// `k` is clamped to [`count`](Self::count); an empty index yields an
    /// empty result.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let k = k.min(self.count());
        if k == 0 {
            return Ok(Vec::new());
        }
        validate_embedding(query, self.dimensions)?;

        let mut scored: Vec<(usize, f32)> = self
            .live
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(slot, _)| {
                let start = slot * self.dimensions;
                let vector = &self.vectors[start..start + self.dimensions];
                (slot, ilearn_embed::squared_l2_distance(query, vector))
            })
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(slot, distance)| Neighbor {
                id: self.ids[slot],
                distance,
            })
            .collect())
    }

    /// Drop every vector.
    pub fn reset(&mut self) {
        self.vectors.clear();
        self.ids.clear();
        self.live.clear();
        self.slots.clear();
        self.dead = 0;
    }
}
