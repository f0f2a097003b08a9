//! Per-level chunk pools
//!
//! Each [`LodLevel`] owns a fixed arena of [`ChunkSlot`]s created at warm-up.
//! Slots move between the free list and the coordinate map; they are never
//! allocated or destroyed while streaming, so `|active| + |free| == pool_size`
//! always holds.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{IVec2, Vec3, Vec3Swizzles};

use crate::core::{Error, Result};
use crate::math::Aabb;
use crate::mesh::{flat_mesh, Mesh};
use crate::terrain::{BuildRequest, BuiltChunk, Heightfield};

/// Grid coordinate of the chunk containing `position` (XZ plane)
pub fn world_to_grid(position: Vec3, chunk_size: f32) -> IVec2 {
    (position.xz() / chunk_size).floor().as_ivec2()
}

/// Whether a chunk at `offset` from the reference lies strictly inside the
/// window covered by the next finer level.
///
/// The finer window spans `[-radius * finer, radius * finer + finer]` on each
/// axis; the chunk spans `[offset * size, offset * size + size]`.
pub fn is_within_finer_lod(offset: IVec2, radius: u32, chunk_size: f32, finer_chunk_size: f32) -> bool {
    let lo = -(radius as f32) * finer_chunk_size;
    let hi = radius as f32 * finer_chunk_size + finer_chunk_size;
    let inside = |o: i32| {
        let min = o as f32 * chunk_size;
        let max = min + chunk_size;
        min > lo && max < hi
    };
    inside(offset.x) && inside(offset.y)
}

/// Lifecycle of an arena slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// On the free list
    Pooled,
    /// Assigned and waiting for the build carrying `ticket`
    Building { ticket: u64 },
    /// Geometry applied
    Ready,
}

/// Arena entry holding one chunk's placement and geometry
#[derive(Clone, Debug)]
pub struct ChunkSlot {
    pub index: usize,
    pub coord: Option<IVec2>,
    pub origin: Vec3,
    pub mesh: Option<Arc<Mesh>>,
    pub heightfield: Option<Arc<Heightfield>>,
    pub bounds: Aabb,
    pub state: SlotState,
    /// Ticket of the last applied build
    pub ticket: u64,
    /// Left the window while building; released once the build lands
    pub despawn_pending: bool,
}

impl ChunkSlot {
    fn pooled(index: usize) -> Self {
        Self {
            index,
            coord: None,
            origin: Vec3::ZERO,
            mesh: None,
            heightfield: None,
            bounds: Aabb::new(Vec3::ZERO, Vec3::ZERO),
            state: SlotState::Pooled,
            ticket: 0,
            despawn_pending: false,
        }
    }

    fn release(&mut self) {
        let ticket = self.ticket;
        *self = Self::pooled(self.index);
        self.ticket = ticket;
    }
}

/// Renderer-facing view of an assigned chunk
#[derive(Clone, Debug)]
pub struct ChunkHandle {
    pub level: usize,
    pub coord: IVec2,
    pub origin: Vec3,
    pub slot: usize,
    pub chunk_size: f32,
    pub bounds: Aabb,
    pub mesh: Option<Arc<Mesh>>,
    pub heightfield: Option<Arc<Heightfield>>,
}

/// What a despawn did with the slot
#[derive(Debug)]
pub enum Despawn {
    Released(ChunkHandle),
    /// Slot is still building; it stays mapped until the build lands
    Deferred,
}

/// Chunks released and builds requested by one spawn/despawn pass
#[derive(Debug, Default)]
pub struct LevelUpdate {
    pub despawned: Vec<ChunkHandle>,
    pub requests: Vec<BuildRequest>,
}

/// One detail level: chunk size, slot arena, free list and coordinate map
pub struct LodLevel {
    index: usize,
    chunk_size: f32,
    /// Chunk size of the next finer level, `None` for level 0
    finer_chunk_size: Option<f32>,
    radius: u32,
    resolution: u32,
    slots: Vec<ChunkSlot>,
    free: Vec<usize>,
    active: HashMap<IVec2, usize>,
    template: Arc<Mesh>,
    last_coord: Option<IVec2>,
    rescan: bool,
}

impl LodLevel {
    /// Warm up a level with `pool_size` pooled slots
    pub fn new(
        index: usize,
        chunk_size: f32,
        finer_chunk_size: Option<f32>,
        radius: u32,
        resolution: u32,
        pool_size: usize,
    ) -> Result<Self> {
        let template = Arc::new(flat_mesh(chunk_size, resolution)?);
        let slots = (0..pool_size).map(ChunkSlot::pooled).collect();
        // Reversed so slot 0 is handed out first
        let free = (0..pool_size).rev().collect();

        log::debug!(
            "LOD {index}: {pool_size} slots, chunk size {chunk_size}, {} template vertices",
            template.vertex_count()
        );

        Ok(Self {
            index,
            chunk_size,
            finer_chunk_size,
            radius,
            resolution,
            slots,
            free,
            active: HashMap::with_capacity(pool_size),
            template,
            last_coord: None,
            rescan: false,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn chunk_size(&self) -> f32 {
        self.chunk_size
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn pool_size(&self) -> usize {
        self.slots.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn template(&self) -> &Arc<Mesh> {
        &self.template
    }

    pub fn slots(&self) -> &[ChunkSlot] {
        &self.slots
    }

    pub fn last_coord(&self) -> Option<IVec2> {
        self.last_coord
    }

    pub fn rescan_pending(&self) -> bool {
        self.rescan
    }

    pub fn contains(&self, coord: IVec2) -> bool {
        self.active.contains_key(&coord)
    }

    pub fn slot_of(&self, coord: IVec2) -> Option<&ChunkSlot> {
        self.active.get(&coord).map(|&i| &self.slots[i])
    }

    /// Grid coordinate this level streams around for `position`
    pub fn reference_coord(&self, position: Vec3) -> IVec2 {
        world_to_grid(position, self.chunk_size)
    }

    /// Whether the spawn/despawn pass must run for `coord`
    pub fn needs_update(&self, coord: IVec2) -> bool {
        self.rescan || self.last_coord != Some(coord)
    }

    /// Whether the finer level already covers `offset`
    pub fn in_hole(&self, offset: IVec2) -> bool {
        match self.finer_chunk_size {
            Some(finer) => is_within_finer_lod(offset, self.radius, self.chunk_size, finer),
            None => false,
        }
    }

    fn out_of_window(&self, offset: IVec2) -> bool {
        let r = self.radius as i32;
        offset.x.abs() > r || offset.y.abs() > r
    }

    /// Handles of every assigned chunk, in slot order
    pub fn handles(&self) -> Vec<ChunkHandle> {
        self.slots
            .iter()
            .filter(|s| s.coord.is_some())
            .filter_map(|s| self.handle(s.index))
            .collect()
    }

    pub fn handle(&self, slot: usize) -> Option<ChunkHandle> {
        let s = self.slots.get(slot)?;
        Some(ChunkHandle {
            level: self.index,
            coord: s.coord?,
            origin: s.origin,
            slot,
            chunk_size: self.chunk_size,
            bounds: s.bounds,
            mesh: s.mesh.clone(),
            heightfield: s.heightfield.clone(),
        })
    }

    /// Run the spawn/despawn pass around `coord`.
    ///
    /// Tickets for new builds are drawn from `next_ticket`.
    pub fn update(&mut self, coord: IVec2, next_ticket: &mut u64) -> Result<LevelUpdate> {
        let mut update = LevelUpdate::default();
        self.last_coord = Some(coord);
        self.rescan = false;

        let mut leaving: Vec<IVec2> = self
            .active
            .keys()
            .copied()
            .filter(|&c| {
                let offset = c - coord;
                self.out_of_window(offset) || self.in_hole(offset)
            })
            .collect();
        leaving.sort_by_key(|c| (c.y, c.x));

        // Chunks that came back into the window stay; the pass re-flags the rest
        for s in &mut self.slots {
            s.despawn_pending = false;
        }
        for c in leaving {
            if let Despawn::Released(handle) = self.despawn(c)? {
                update.despawned.push(handle);
            }
        }

        let r = self.radius as i32;
        for z in -r..=r {
            for x in -r..=r {
                let offset = IVec2::new(x, z);
                if self.in_hole(offset) {
                    continue;
                }
                let target = coord + offset;
                if self.active.contains_key(&target) {
                    continue;
                }
                if let Some(request) = self.spawn(target, *next_ticket)? {
                    *next_ticket += 1;
                    update.requests.push(request);
                }
            }
        }

        debug_assert!(self.is_consistent());
        Ok(update)
    }

    /// Return the chunk at `coord` to the pool, or defer if it is still building
    pub fn despawn(&mut self, coord: IVec2) -> Result<Despawn> {
        let Some(&slot) = self.active.get(&coord) else {
            return Err(Error::ChunkNotFound { level: self.index, coord });
        };

        if let SlotState::Building { .. } = self.slots[slot].state {
            self.slots[slot].despawn_pending = true;
            self.rescan = true;
            log::debug!("LOD {}: despawn of {coord} deferred until its build lands", self.index);
            return Ok(Despawn::Deferred);
        }

        let handle = self.handle(slot).ok_or(Error::ChunkNotFound { level: self.index, coord })?;
        self.active.remove(&coord);
        self.slots[slot].release();
        self.free.push(slot);

        log::debug!("LOD {}: despawned {coord} (slot {slot})", self.index);
        Ok(Despawn::Released(handle))
    }

    /// Assign a pooled slot to `coord` and describe the build it needs.
    ///
    /// Returns `None` when the pool is empty only because deferred despawns
    /// still hold slots; the spawn is retried on the next pass.
    pub fn spawn(&mut self, coord: IVec2, ticket: u64) -> Result<Option<BuildRequest>> {
        let Some(slot) = self.free.pop() else {
            if self.slots.iter().any(|s| s.despawn_pending) {
                self.rescan = true;
                return Ok(None);
            }
            return Err(Error::PoolExhausted { level: self.index, coord });
        };

        let origin = Vec3::new(coord.x as f32 * self.chunk_size, 0.0, coord.y as f32 * self.chunk_size);
        let s = &mut self.slots[slot];
        s.coord = Some(coord);
        s.origin = origin;
        s.bounds = Aabb::chunk_footprint(origin, self.chunk_size, 0.0, 0.0);
        s.state = SlotState::Building { ticket };
        s.despawn_pending = false;
        self.active.insert(coord, slot);

        log::debug!("LOD {}: spawned {coord} (slot {slot}, ticket {ticket})", self.index);
        Ok(Some(BuildRequest {
            level: self.index,
            coord,
            origin,
            chunk_size: self.chunk_size,
            resolution: self.resolution,
            template: Arc::clone(&self.template),
            ticket,
        }))
    }

    fn building_slot(&self, coord: IVec2, ticket: u64) -> Option<usize> {
        let &slot = self.active.get(&coord)?;
        (self.slots[slot].state == SlotState::Building { ticket }).then_some(slot)
    }

    /// Install finished geometry if the slot still waits for this build.
    ///
    /// Returns `None` for stale results.
    pub fn apply(&mut self, coord: IVec2, ticket: u64, built: BuiltChunk) -> Option<ChunkHandle> {
        let Some(slot) = self.building_slot(coord, ticket) else {
            log::warn!("LOD {}: discarding stale build of {coord} (ticket {ticket})", self.index);
            return None;
        };

        let s = &mut self.slots[slot];
        let (min_y, max_y) = built.vertical_range;
        s.bounds = Aabb::chunk_footprint(s.origin, self.chunk_size, min_y, max_y);
        s.mesh = Some(built.mesh);
        s.heightfield = built.heightfield;
        s.state = SlotState::Ready;
        s.ticket = ticket;
        if s.despawn_pending {
            self.rescan = true;
        }

        self.handle(slot)
    }

    /// Give up on a failed build: the slot returns to the pool and the
    /// coordinate is respawned on the next pass.
    pub fn abandon(&mut self, coord: IVec2, ticket: u64) -> bool {
        let Some(slot) = self.building_slot(coord, ticket) else {
            return false;
        };
        self.active.remove(&coord);
        self.slots[slot].release();
        self.free.push(slot);
        self.rescan = true;
        true
    }

    /// Pool bookkeeping check: every slot is either free or mapped exactly once
    pub fn is_consistent(&self) -> bool {
        if self.active.len() + self.free.len() != self.slots.len() {
            return false;
        }
        let mapped_ok = self
            .active
            .iter()
            .all(|(&c, &i)| self.slots[i].coord == Some(c) && self.slots[i].state != SlotState::Pooled);
        let free_ok = self
            .free
            .iter()
            .all(|&i| self.slots[i].coord.is_none() && self.slots[i].state == SlotState::Pooled);
        mapped_ok && free_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(index: usize, radius: u32) -> LodLevel {
        let size = 16.0 * (1 << index) as f32;
        let finer = (index > 0).then(|| size / 2.0);
        let window = (2 * radius as usize + 1).pow(2);
        LodLevel::new(index, size, finer, radius, 2, window).unwrap()
    }

    fn built(level: &LodLevel) -> BuiltChunk {
        BuiltChunk { mesh: Arc::clone(level.template()), heightfield: None, vertical_range: (-1.0, 3.0) }
    }

    fn complete(level: &mut LodLevel, requests: &[BuildRequest]) {
        for r in requests {
            let b = built(level);
            assert!(level.apply(r.coord, r.ticket, b).is_some());
        }
    }

    #[test]
    fn test_world_to_grid() {
        assert_eq!(world_to_grid(Vec3::new(0.0, 50.0, 0.0), 16.0), IVec2::ZERO);
        assert_eq!(world_to_grid(Vec3::new(15.9, 0.0, 16.0), 16.0), IVec2::new(0, 1));
        assert_eq!(world_to_grid(Vec3::new(-0.1, 0.0, -16.1), 16.0), IVec2::new(-1, -2));
    }

    #[test]
    fn test_hole_suppression() {
        // LOD 1 chunks are twice the LOD 0 size, radius 2: LOD 0 covers [-2s, 3s]
        let s = 10.0;
        assert!(is_within_finer_lod(IVec2::ZERO, 2, 2.0 * s, s));
        assert!(!is_within_finer_lod(IVec2::new(1, 0), 2, 2.0 * s, s));
        assert!(!is_within_finer_lod(IVec2::new(-1, 0), 2, 2.0 * s, s));
        assert!(!is_within_finer_lod(IVec2::new(0, 1), 2, 2.0 * s, s));

        let lod0 = level(0, 2);
        assert!(!lod0.in_hole(IVec2::ZERO));
        let lod1 = level(1, 2);
        assert!(lod1.in_hole(IVec2::ZERO));
        assert!(!lod1.in_hole(IVec2::new(1, 1)));
    }

    #[test]
    fn test_warm_up() {
        let lod = level(0, 1);
        assert_eq!(lod.pool_size(), 9);
        assert_eq!(lod.free_count(), 9);
        assert_eq!(lod.active_count(), 0);
        assert!(lod.needs_update(IVec2::ZERO));
        assert!(lod.is_consistent());
        assert_eq!(lod.template().vertex_count(), 9);
    }

    #[test]
    fn test_update_fills_window() {
        let mut lod = level(0, 1);
        let mut ticket = 1;
        let update = lod.update(IVec2::new(3, -2), &mut ticket).unwrap();

        assert_eq!(update.requests.len(), 9);
        assert!(update.despawned.is_empty());
        assert_eq!(ticket, 10);
        assert_eq!(lod.free_count(), 0);
        assert!(!lod.needs_update(IVec2::new(3, -2)));
        assert!(lod.contains(IVec2::new(2, -3)));
        assert!(lod.contains(IVec2::new(4, -1)));

        let first = &update.requests[0];
        assert_eq!(first.coord, IVec2::new(2, -3));
        assert_eq!(first.origin, Vec3::new(32.0, 0.0, -48.0));
        assert_eq!(first.resolution, 2);
        assert!(Arc::ptr_eq(&first.template, lod.template()));
        assert!(lod.is_consistent());
    }

    #[test]
    fn test_apply_and_stale_results() {
        let mut lod = level(0, 1);
        let mut ticket = 1;
        let update = lod.update(IVec2::ZERO, &mut ticket).unwrap();
        let request = &update.requests[4];

        assert!(lod.apply(request.coord, request.ticket + 100, built(&lod)).is_none());
        assert!(lod.apply(IVec2::new(9, 9), request.ticket, built(&lod)).is_none());

        let handle = lod.apply(request.coord, request.ticket, built(&lod)).unwrap();
        assert_eq!(handle.coord, request.coord);
        assert_eq!(handle.bounds.min.y, -1.0);
        assert_eq!(handle.bounds.max.y, 3.0);
        assert_eq!(lod.slot_of(request.coord).unwrap().state, SlotState::Ready);

        // A second delivery of the same build is stale
        assert!(lod.apply(request.coord, request.ticket, built(&lod)).is_none());
    }

    #[test]
    fn test_despawn_unknown_coord() {
        let mut lod = level(0, 1);
        let err = lod.despawn(IVec2::new(5, 5)).unwrap_err();
        assert!(matches!(err, Error::ChunkNotFound { level: 0, coord } if coord == IVec2::new(5, 5)));
    }

    #[test]
    fn test_pool_exhausted() {
        let mut lod = level(0, 1);
        let mut ticket = 1;
        lod.update(IVec2::ZERO, &mut ticket).unwrap();
        let err = lod.spawn(IVec2::new(10, 10), ticket).unwrap_err();
        assert!(matches!(err, Error::PoolExhausted { .. }));
        assert!(err.is_consistency());
    }

    #[test]
    fn test_deferred_despawn_while_building() {
        let mut lod = level(0, 1);
        let mut ticket = 1;
        let first = lod.update(IVec2::ZERO, &mut ticket).unwrap();

        // Move one chunk east before any build lands
        let second = lod.update(IVec2::new(1, 0), &mut ticket).unwrap();
        assert!(second.despawned.is_empty());
        assert!(second.requests.is_empty());
        assert!(lod.rescan_pending());
        assert!(lod.contains(IVec2::new(-1, 0)));
        assert!(lod.is_consistent());

        complete(&mut lod, &first.requests);
        assert!(lod.needs_update(IVec2::new(1, 0)));

        let third = lod.update(IVec2::new(1, 0), &mut ticket).unwrap();
        assert_eq!(third.despawned.len(), 3);
        assert!(third.despawned.iter().all(|h| h.coord.x == -1));
        assert_eq!(third.requests.len(), 3);
        assert!(third.requests.iter().all(|r| r.coord.x == 2));
        assert!(!lod.rescan_pending());
        assert!(lod.is_consistent());
    }

    #[test]
    fn test_returning_before_build_lands_keeps_chunks() {
        let mut lod = level(0, 1);
        let mut ticket = 1;
        let first = lod.update(IVec2::ZERO, &mut ticket).unwrap();

        lod.update(IVec2::new(1, 0), &mut ticket).unwrap();
        assert_eq!(lod.slots().iter().filter(|s| s.despawn_pending).count(), 3);

        let back = lod.update(IVec2::ZERO, &mut ticket).unwrap();
        assert!(back.despawned.is_empty());
        assert!(back.requests.is_empty());
        assert!(lod.slots().iter().all(|s| !s.despawn_pending));

        complete(&mut lod, &first.requests);
        assert!(!lod.rescan_pending());
        assert!(!lod.needs_update(IVec2::ZERO));
        assert!(lod.is_consistent());

        // Nothing is leaving, so an empty pool is a real exhaustion
        let err = lod.spawn(IVec2::new(5, 5), ticket).unwrap_err();
        assert!(matches!(err, Error::PoolExhausted { .. }));
    }

    #[test]
    fn test_abandon_failed_build() {
        let mut lod = level(0, 1);
        let mut ticket = 1;
        let update = lod.update(IVec2::ZERO, &mut ticket).unwrap();
        let r = &update.requests[0];

        assert!(!lod.abandon(r.coord, r.ticket + 1));
        assert!(lod.abandon(r.coord, r.ticket));
        assert!(!lod.contains(r.coord));
        assert_eq!(lod.free_count(), 1);
        assert!(lod.is_consistent());

        let retry = lod.update(IVec2::ZERO, &mut ticket).unwrap();
        assert_eq!(retry.requests.len(), 1);
        assert_eq!(retry.requests[0].coord, r.coord);
    }
}
