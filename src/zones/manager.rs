//! Checked zone mutations.
//!
//! The `ZoneManager` borrows a working copy of the game state and performs
//! the primitive moves every effect is built from:
//! - Popping from and pushing to the tail of item lists
//! - Removing one entity by id
//! - Shuffling an instance in place
//! - Placing and relocating pieces on board cells
//!
//! Every operation checks shortage and capacity before touching storage.
//! A failed operation may leave the working copy half-modified; callers
//! discard the copy on error.

use crate::core::error::ExecError;
use crate::core::rng::GameRng;
use crate::core::state::{GameState, ZoneInstance, ZoneKind};
use crate::core::EntityId;

/// Largest row or column index an unsized board grows to.
pub const MAX_UNSIZED_EXTENT: usize = 1024;

/// A board coordinate. Cells are addressed `cells[y][x]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellPos {
    pub x: i64,
    pub y: i64,
}

impl CellPos {
    #[must_use]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    fn indices(self) -> Option<(usize, usize)> {
        Some((usize::try_from(self.x).ok()?, usize::try_from(self.y).ok()?))
    }
}

/// Performs checked zone operations on a working state.
///
/// ## Usage
///
/// ```
/// use rulekit::zones::ZoneManager;
/// # use rulekit::core::GameState;
/// # fn demo(state: &mut GameState) -> Result<(), rulekit::core::ExecError> {
/// let mut zones = ZoneManager::new(state);
/// let drawn = zones.pop_top("deck", "A", 1)?;
/// zones.push("hand", "A", drawn)?;
/// # Ok(())
/// # }
/// ```
pub struct ZoneManager<'a> {
    state: &'a mut GameState,
}

impl<'a> ZoneManager<'a> {
    pub fn new(state: &'a mut GameState) -> Self {
        Self { state }
    }

    /// Current length of an instance.
    pub fn len(&self, zone: &str, owner: &str) -> Result<usize, ExecError> {
        Ok(self.state.instance(zone, owner)?.len())
    }

    /// Remaining room in an instance, `None` when unbounded.
    pub fn room(&self, zone: &str, owner: &str) -> Result<Option<usize>, ExecError> {
        let runtime = self.state.zone(zone)?;
        let held = runtime.instance(zone, owner)?.len();
        Ok(runtime.capacity.map(|cap| cap.saturating_sub(held)))
    }

    fn check_room(&self, zone: &str, owner: &str, adding: usize) -> Result<(), ExecError> {
        let runtime = self.state.zone(zone)?;
        let held = runtime.instance(zone, owner)?.len();
        match runtime.capacity {
            Some(capacity) if held + adding > capacity => Err(ExecError::CapacityExceeded {
                zone: zone.to_string(),
                owner: owner.to_string(),
                capacity,
            }),
            _ => Ok(()),
        }
    }

    fn list_mut(
        &mut self,
        zone: &str,
        owner: &str,
        op: &'static str,
        ordered_only: bool,
    ) -> Result<&mut im::Vector<EntityId>, ExecError> {
        let instance = self.state.instance_mut(zone, owner)?;
        let kind = instance.kind();
        if ordered_only && !kind.is_ordered() {
            return Err(kind_mismatch(zone, kind, op));
        }
        instance.items_mut().ok_or_else(|| kind_mismatch(zone, kind, op))
    }

    /// Pop `count` entities from the tail, in pop order.
    pub fn pop_top(&mut self, zone: &str, owner: &str, count: usize) -> Result<Vec<EntityId>, ExecError> {
        let items = self.list_mut(zone, owner, "pop", false)?;
        if items.len() < count {
            return Err(ExecError::Shortage {
                zone: zone.to_string(),
                owner: owner.to_string(),
                need: count,
                have: items.len(),
            });
        }
        let mut popped = Vec::with_capacity(count);
        for _ in 0..count {
            if let Some(id) = items.pop_back() {
                popped.push(id);
            }
        }
        Ok(popped)
    }

    /// Push entities onto the tail, in the given order.
    pub fn push(&mut self, zone: &str, owner: &str, ids: Vec<EntityId>) -> Result<(), ExecError> {
        self.check_room(zone, owner, ids.len())?;
        let items = self.list_mut(zone, owner, "push", false)?;
        for id in ids {
            items.push_back(id);
        }
        Ok(())
    }

    /// Move `count` entities tail-to-tail between two ordered instances.
    ///
    /// Both ends are checked before anything moves.
    pub fn move_top(
        &mut self,
        (from_zone, from_owner): (&str, &str),
        (to_zone, to_owner): (&str, &str),
        count: usize,
    ) -> Result<(), ExecError> {
        let source_kind = self.state.instance(from_zone, from_owner)?.kind();
        if !source_kind.is_ordered() {
            return Err(kind_mismatch(from_zone, source_kind, "move_top"));
        }
        let target_kind = self.state.instance(to_zone, to_owner)?.kind();
        if !target_kind.is_ordered() {
            return Err(kind_mismatch(to_zone, target_kind, "move_top"));
        }

        let have = self.len(from_zone, from_owner)?;
        if have < count {
            return Err(ExecError::Shortage {
                zone: from_zone.to_string(),
                owner: from_owner.to_string(),
                need: count,
                have,
            });
        }
        let same_instance = from_zone == to_zone && from_owner == to_owner;
        if !same_instance {
            self.check_room(to_zone, to_owner, count)?;
        }

        let moved = self.pop_top(from_zone, from_owner, count)?;
        self.push(to_zone, to_owner, moved)
    }

    /// Remove one entity by id, wherever it sits in the list.
    pub fn remove(&mut self, zone: &str, owner: &str, entity: &str) -> Result<EntityId, ExecError> {
        let items = self.list_mut(zone, owner, "move_id", true)?;
        let index = items
            .iter()
            .position(|id| id == entity)
            .ok_or_else(|| ExecError::EntityNotInZone {
                entity: entity.to_string(),
                zone: zone.to_string(),
                owner: owner.to_string(),
            })?;
        Ok(items.remove(index))
    }

    /// Fisher-Yates shuffle of one ordered instance.
    pub fn shuffle(&mut self, zone: &str, owner: &str, rng: &mut GameRng) -> Result<(), ExecError> {
        let items = self.list_mut(zone, owner, "shuffle", true)?;
        let mut order: Vec<EntityId> = items.iter().cloned().collect();
        rng.shuffle(&mut order);
        *items = order.into_iter().collect();
        Ok(())
    }

    /// Put an entity on an empty board cell.
    ///
    /// Boards declared without a size grow to fit the cell, up to
    /// [`MAX_UNSIZED_EXTENT`] on each axis.
    pub fn place(&mut self, zone: &str, owner: &str, at: CellPos, entity: EntityId) -> Result<(), ExecError> {
        self.check_room(zone, owner, 1)?;
        let sized = self.state.zone(zone)?.size.is_some();
        let cells = board_mut(self.state.instance_mut(zone, owner)?, zone, "place")?;
        let (x, y) = at.indices().ok_or_else(|| out_of_bounds(zone, at))?;

        if !sized {
            if x >= MAX_UNSIZED_EXTENT || y >= MAX_UNSIZED_EXTENT {
                return Err(out_of_bounds(zone, at));
            }
            if cells.len() <= y {
                cells.resize_with(y + 1, Vec::new);
            }
            if cells[y].len() <= x {
                cells[y].resize(x + 1, None);
            }
        }
        let cell = cells
            .get_mut(y)
            .and_then(|row| row.get_mut(x))
            .ok_or_else(|| out_of_bounds(zone, at))?;
        if cell.is_some() {
            return Err(ExecError::CellOccupied {
                zone: zone.to_string(),
                x: at.x,
                y: at.y,
            });
        }
        *cell = Some(entity);
        Ok(())
    }

    /// Move a piece from an occupied cell to an empty one.
    pub fn relocate(&mut self, zone: &str, owner: &str, from: CellPos, to: CellPos) -> Result<(), ExecError> {
        let cells = board_mut(self.state.instance_mut(zone, owner)?, zone, "move_piece")?;

        let (fx, fy) = from.indices().ok_or_else(|| out_of_bounds(zone, from))?;
        let (tx, ty) = to.indices().ok_or_else(|| out_of_bounds(zone, to))?;
        let target_free = match cells.get(ty).and_then(|row| row.get(tx)) {
            None => return Err(out_of_bounds(zone, to)),
            Some(cell) => cell.is_none(),
        };

        let source = cells
            .get_mut(fy)
            .and_then(|row| row.get_mut(fx))
            .ok_or_else(|| out_of_bounds(zone, from))?;
        if source.is_none() {
            return Err(ExecError::CellEmpty {
                zone: zone.to_string(),
                x: from.x,
                y: from.y,
            });
        }
        if !target_free {
            return Err(ExecError::CellOccupied {
                zone: zone.to_string(),
                x: to.x,
                y: to.y,
            });
        }
        let piece = source.take();
        cells[ty][tx] = piece;
        Ok(())
    }
}

fn board_mut<'i>(
    instance: &'i mut ZoneInstance,
    zone: &str,
    op: &'static str,
) -> Result<&'i mut crate::core::state::Cells, ExecError> {
    let kind = instance.kind();
    instance.cells_mut().ok_or_else(|| kind_mismatch(zone, kind, op))
}

fn kind_mismatch(zone: &str, kind: ZoneKind, op: &'static str) -> ExecError {
    ExecError::KindMismatch {
        zone: zone.to_string(),
        kind: kind.to_string(),
        op,
    }
}

fn out_of_bounds(zone: &str, at: CellPos) -> ExecError {
    ExecError::OutOfBounds {
        zone: zone.to_string(),
        x: at.x,
        y: at.y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{BoardSize, StateMeta, ZoneRuntime, ZoneScope};
    use im::{OrdMap, Vector};

    fn runtime(kind: ZoneKind, capacity: Option<usize>, size: Option<BoardSize>) -> ZoneRuntime {
        let mut instances = OrdMap::new();
        instances.insert("A".to_string(), ZoneInstance::empty(kind, size));
        ZoneRuntime {
            kind,
            scope: ZoneScope::PerSeat,
            of: None,
            capacity,
            size,
            instances,
        }
    }

    fn state() -> GameState {
        let mut zones = OrdMap::new();
        zones.insert("deck".to_string(), runtime(ZoneKind::Stack, None, None));
        zones.insert("hand".to_string(), runtime(ZoneKind::List, Some(2), None));
        zones.insert("bag".to_string(), runtime(ZoneKind::Set, None, None));
        zones.insert(
            "board".to_string(),
            runtime(ZoneKind::Grid, None, Some(BoardSize { width: 2, height: 2 })),
        );
        zones.insert("track".to_string(), runtime(ZoneKind::Track, None, None));
        let mut state = GameState {
            phase: "main".into(),
            turn: 1,
            seats: Vector::from(vec!["A".to_string()]),
            active_seat: Some("A".into()),
            vars: OrdMap::new(),
            per_seat: OrdMap::new(),
            entities: OrdMap::new(),
            zones,
            rng_state: "42".into(),
            meta: StateMeta::default(),
        };
        state.set_items("deck", "A", ["c1", "c2", "c3"]).unwrap();
        state
    }

    #[test]
    fn test_move_top_pops_tail() {
        let mut state = state();
        ZoneManager::new(&mut state)
            .move_top(("deck", "A"), ("hand", "A"), 2)
            .unwrap();
        assert_eq!(state.items("deck", "A").unwrap(), &Vector::from(vec!["c1".to_string()]));
        assert_eq!(
            state.items("hand", "A").unwrap(),
            &Vector::from(vec!["c3".to_string(), "c2".to_string()])
        );
    }

    #[test]
    fn test_move_top_shortage_and_capacity() {
        let mut state = state();
        let mut zones = ZoneManager::new(&mut state);
        assert!(matches!(
            zones.move_top(("deck", "A"), ("hand", "A"), 4),
            Err(ExecError::Shortage { need: 4, have: 3, .. })
        ));
        assert!(matches!(
            zones.move_top(("deck", "A"), ("hand", "A"), 3),
            Err(ExecError::CapacityExceeded { capacity: 2, .. })
        ));
        assert_eq!(zones.len("deck", "A").unwrap(), 3);
    }

    #[test]
    fn test_move_top_rejects_unordered() {
        let mut state = state();
        let err = ZoneManager::new(&mut state)
            .move_top(("deck", "A"), ("bag", "A"), 1)
            .unwrap_err();
        assert!(matches!(err, ExecError::KindMismatch { op: "move_top", .. }));
    }

    #[test]
    fn test_remove_by_id() {
        let mut state = state();
        let mut zones = ZoneManager::new(&mut state);
        assert_eq!(zones.remove("deck", "A", "c2").unwrap(), "c2");
        assert!(matches!(
            zones.remove("deck", "A", "c2"),
            Err(ExecError::EntityNotInZone { .. })
        ));
        assert_eq!(zones.len("deck", "A").unwrap(), 2);
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let mut a = state();
        let mut b = state();
        let mut rng_a = GameRng::new(7);
        let mut rng_b = GameRng::new(7);
        ZoneManager::new(&mut a).shuffle("deck", "A", &mut rng_a).unwrap();
        ZoneManager::new(&mut b).shuffle("deck", "A", &mut rng_b).unwrap();
        assert_eq!(a.items("deck", "A"), b.items("deck", "A"));
        assert_eq!(rng_a.state(), rng_b.state());
        assert_eq!(a.items("deck", "A").unwrap().len(), 3);
    }

    #[test]
    fn test_place_and_relocate() {
        let mut state = state();
        let mut zones = ZoneManager::new(&mut state);
        zones.place("board", "A", CellPos::new(0, 1), "p1".into()).unwrap();
        assert!(matches!(
            zones.place("board", "A", CellPos::new(0, 1), "p2".into()),
            Err(ExecError::CellOccupied { x: 0, y: 1, .. })
        ));
        assert!(matches!(
            zones.place("board", "A", CellPos::new(2, 0), "p2".into()),
            Err(ExecError::OutOfBounds { .. })
        ));
        assert!(matches!(
            zones.relocate("board", "A", CellPos::new(1, 1), CellPos::new(0, 0)),
            Err(ExecError::CellEmpty { .. })
        ));
        zones.relocate("board", "A", CellPos::new(0, 1), CellPos::new(1, 0)).unwrap();

        let cells = state.instance("board", "A").unwrap().cells().unwrap();
        assert_eq!(cells[0][1].as_deref(), Some("p1"));
        assert_eq!(cells[1][0], None);
    }

    #[test]
    fn test_unsized_board_grows() {
        let mut state = state();
        ZoneManager::new(&mut state)
            .place("track", "A", CellPos::new(3, 0), "t1".into())
            .unwrap();
        let cells = state.instance("track", "A").unwrap().cells().unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].len(), 4);
        assert_eq!(cells[0][3].as_deref(), Some("t1"));
    }

    #[test]
    fn test_unsized_board_growth_is_bounded() {
        let mut state = state();
        let mut zones = ZoneManager::new(&mut state);
        for at in [CellPos::new(4_000_000_000_000_000_000, 0), CellPos::new(0, i64::MAX)] {
            assert!(matches!(
                zones.place("track", "A", at, "t1".into()),
                Err(ExecError::OutOfBounds { .. })
            ));
        }
        let edge = (MAX_UNSIZED_EXTENT - 1) as i64;
        zones.place("track", "A", CellPos::new(edge, 0), "t1".into()).unwrap();
        let cells = state.instance("track", "A").unwrap().cells().unwrap();
        assert_eq!(cells[0].len(), MAX_UNSIZED_EXTENT);
    }
}
