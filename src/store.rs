use crate::track::Track;
use crate::Detection;

/// Live tracks kept in creation order, which is also ascending id order.
#[derive(Debug, Clone)]
pub struct TrackStore {
    tracks: Vec<Track>,
    next_id: u32,
    history_len: usize,
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new(10)
    }
}

impl TrackStore {
    pub fn new(history_len: usize) -> Self {
        Self {
            tracks: Vec::with_capacity(64),
            next_id: 1,
            history_len,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    #[inline]
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.iter_mut()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get(&self, id: u32) -> Option<&Track> {
        self.tracks
            .binary_search_by_key(&id, |t| t.id)
            .ok()
            .map(|idx| &self.tracks[idx])
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Track> {
        match self.tracks.binary_search_by_key(&id, |t| t.id) {
            Ok(idx) => Some(&mut self.tracks[idx]),
            Err(_) => None,
        }
    }

    /// Id the next spawned track will receive.
    #[inline]
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Mints a new track; ids are never reused.
    pub(crate) fn spawn(&mut self, det: Detection) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.tracks.push(Track::new(id, det, self.history_len));

        id
    }

    /// Drops every track whose flag in `keep` (indexed like the store) is
    /// false. Returns how many were dropped.
    pub(crate) fn retain_flagged(&mut self, keep: &[bool]) -> usize {
        let before = self.tracks.len();
        let mut idx = 0;

        self.tracks.retain(|_| {
            let kept = keep.get(idx).copied().unwrap_or(false);
            idx += 1;
            kept
        });

        before - self.tracks.len()
    }

    pub fn stable(&self, threshold: u32) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(move |t| t.is_stable(threshold))
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}
