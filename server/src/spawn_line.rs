use heli_shared::protocol::SpawnPoint;

/// First spawn point, taken verbatim from the Unity scene. Slot ordinal 0
/// must return this constant bit-for-bit, not a recomputed value.
pub const ORIGIN: SpawnPoint = SpawnPoint {
    x_pos: 2060.0,
    x_heli_pos: 2060.0,
    radius: 37.3,
};

/// Gap added to the spawn radius between neighbouring slots.
pub const SPAWN_OFFSET: f64 = 5.0;

/// The ordered spawn sequence. Index is the spawn slot; removal always
/// compacts, so the line never contains a hole.
#[derive(Debug, Default)]
pub struct SpawnLine {
    points: Vec<SpawnPoint>,
}

impl SpawnLine {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Spawn coordinates for a slot ordinal. Slots alternate sides of the
    /// origin: even ordinals go left, odd go right, moving one step further
    /// out every two slots.
    pub fn position_for_slot(ordinal: usize) -> SpawnPoint {
        if ordinal == 0 {
            return ORIGIN;
        }
        let direction: f64 = if ordinal % 2 == 0 { -1.0 } else { 1.0 };
        let length = ((ordinal + 1) / 2) as f64 * direction;
        let shift = (ORIGIN.radius + SPAWN_OFFSET) * length;
        SpawnPoint {
            x_pos: ORIGIN.x_pos + shift,
            x_heli_pos: ORIGIN.x_heli_pos + shift,
            radius: ORIGIN.radius,
        }
    }

    /// Backfill a vacated slot. An out-of-range index is clamped so the
    /// insert still lands on the line; returns the index actually used.
    pub fn insert(&mut self, index: usize, point: SpawnPoint) -> usize {
        let index = if index > self.points.len() {
            tracing::error!(index, len = self.points.len(), "spawn insert out of range, clamping");
            self.points.len()
        } else {
            index
        };
        self.points.insert(index, point);
        index
    }

    /// Extend the line by one slot; returns the new slot's index.
    pub fn append(&mut self, point: SpawnPoint) -> usize {
        self.points.push(point);
        self.points.len() - 1
    }

    /// Compacting removal. An out-of-range index is clamped to the last slot
    /// so exactly one slot leaves a non-empty line; returns the index
    /// actually vacated, or None if the line was empty.
    pub fn remove(&mut self, index: usize) -> Option<usize> {
        if self.points.is_empty() {
            tracing::error!(index, "spawn remove on empty line");
            return None;
        }
        let index = if index >= self.points.len() {
            tracing::error!(index, len = self.points.len(), "spawn remove out of range, clamping");
            self.points.len() - 1
        } else {
            index
        };
        self.points.remove(index);
        Some(index)
    }

    pub fn points(&self) -> &[SpawnPoint] {
        &self.points
    }

    /// Owned copy for broadcast payloads.
    pub fn snapshot(&self) -> Vec<SpawnPoint> {
        self.points.clone()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
