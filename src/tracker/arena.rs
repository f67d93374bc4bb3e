//! Slot arena for live tracks with an id index.

use std::collections::HashMap;

use crate::tracker::track::{Track, TrackId};

/// Live tracks stored in reusable slots, looked up by [`TrackId`].
///
/// Iteration follows creation order so association stays deterministic.
#[derive(Debug, Default)]
pub struct TrackArena {
    slots: Vec<Option<Track>>,
    free: Vec<usize>,
    index: HashMap<TrackId, usize>,
    order: Vec<usize>,
}

impl TrackArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, track: Track) {
        let id = track.track_id;
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(track);
                slot
            }
            None => {
                self.slots.push(Some(track));
                self.slots.len() - 1
            }
        };
        self.index.insert(id, slot);
        self.order.push(slot);
    }

    pub fn remove(&mut self, id: TrackId) -> Option<Track> {
        let slot = self.index.remove(&id)?;
        self.order.retain(|&s| s != slot);
        self.free.push(slot);
        self.slots[slot].take()
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.index.get(&id).and_then(|&slot| self.slots[slot].as_ref())
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_mut()
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.index.contains_key(&id)
    }

    /// Ids in creation order.
    pub fn ids(&self) -> Vec<TrackId> {
        self.iter().map(|t| t.track_id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.order.iter().filter_map(|&slot| self.slots[slot].as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        // Storage order, not creation order.
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Remove every track, in creation order.
    pub fn drain(&mut self) -> Vec<Track> {
        let tracks = self
            .order
            .drain(..)
            .filter_map(|slot| self.slots[slot].take())
            .collect();
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        tracks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::kalman_filter::KalmanFilter;
    use crate::tracker::matching::Detection;

    fn track() -> Track {
        let det = Detection::new(0.0, 0.0, 10.0, 10.0, 0.9, "car");
        Track::spawn(TrackId::next(), &det, &KalmanFilter::new(), 1, 0.0, 1)
    }

    #[test]
    fn test_slot_reuse_keeps_creation_order() {
        let mut arena = TrackArena::new();
        let (a, b, c) = (track(), track(), track());
        let (ia, ib, ic) = (a.track_id, b.track_id, c.track_id);
        arena.insert(a);
        arena.insert(b);
        assert!(arena.remove(ia).is_some());
        arena.insert(c);

        assert_eq!(arena.ids(), vec![ib, ic]);
        assert!(!arena.contains(ia));
        assert!(arena.get(ic).is_some());
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_drain_empties_arena() {
        let mut arena = TrackArena::new();
        arena.insert(track());
        arena.insert(track());
        assert_eq!(arena.drain().len(), 2);
        assert!(arena.is_empty());
    }
}
