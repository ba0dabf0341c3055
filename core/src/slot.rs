//! # Slot registry
//!
//! Every mounted component owns a registry of named slots, nested under the registry of
//! the slot it was mounted into. Registries live in one arena with explicit parent/child
//! links; ids carry a generation so a stale id never aliases a reused arena cell.
//!
//! Invariants:
//! - a nested registry exists only while the slot owning it is occupied;
//! - releasing a registry releases every descendant registry.
//!
//! The arena lock is never held while an [`Outlet`] runs: callers fetch the outlet, drop
//! the lock, then mount or unmount.

use crate::error::SlotError;
use crate::outlet::{ComponentHandle, Outlet};
use crate::route::ActivatedRoute;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistryId {
    index: u32,
    generation: u32,
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// What occupies an activated slot.
#[derive(Debug, Clone)]
pub struct Occupancy {
    pub component: ComponentHandle,
    pub route: ActivatedRoute,
    /// Registry of the mounted component's own slots.
    pub nested: RegistryId,
}

#[derive(Default)]
struct SlotEntry {
    outlet: Option<Arc<dyn Outlet>>,
    occupancy: Option<Occupancy>,
}

struct RegistryNode {
    parent: Option<RegistryId>,
    children: Vec<RegistryId>,
    slots: BTreeMap<String, SlotEntry>,
}

#[derive(Default)]
struct Arena {
    cells: Vec<(u32, Option<RegistryNode>)>,
    free: Vec<u32>,
}

impl Arena {
    fn alloc(&mut self, parent: Option<RegistryId>) -> RegistryId {
        let node = RegistryNode {
            parent,
            children: Vec::new(),
            slots: BTreeMap::new(),
        };
        let id = match self.free.pop() {
            Some(index) => {
                let cell = &mut self.cells[index as usize];
                cell.0 += 1;
                cell.1 = Some(node);
                RegistryId {
                    index,
                    generation: cell.0,
                }
            }
            None => {
                self.cells.push((0, Some(node)));
                RegistryId {
                    index: (self.cells.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        if let Some(parent) = parent.and_then(|p| self.get_mut(p)) {
            parent.children.push(id);
        }
        id
    }

    fn get(&self, id: RegistryId) -> Option<&RegistryNode> {
        match self.cells.get(id.index as usize) {
            Some((generation, Some(node))) if *generation == id.generation => Some(node),
            _ => None,
        }
    }

    fn get_mut(&mut self, id: RegistryId) -> Option<&mut RegistryNode> {
        match self.cells.get_mut(id.index as usize) {
            Some((generation, Some(node))) if *generation == id.generation => Some(node),
            _ => None,
        }
    }

    /// Free `id` and its descendants, children first.
    fn release(&mut self, id: RegistryId) -> usize {
        let Some(node) = self.get_mut(id) else {
            return 0;
        };
        let children = std::mem::take(&mut node.children);
        let parent = node.parent;
        let mut released = children.into_iter().map(|c| self.release(c)).sum::<usize>();

        if let Some(parent) = parent.and_then(|p| self.get_mut(p)) {
            parent.children.retain(|c| *c != id);
        }
        self.cells[id.index as usize].1 = None;
        self.free.push(id.index);
        released += 1;
        released
    }
}

/// Shared handle to the slot arena.
#[derive(Clone)]
pub struct SlotRegistry {
    arena: Arc<Mutex<Arena>>,
    root: RegistryId,
}

impl Default for SlotRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotRegistry {
    pub fn new() -> Self {
        let mut arena = Arena::default();
        let root = arena.alloc(None);
        Self {
            arena: Arc::new(Mutex::new(arena)),
            root,
        }
    }

    /// The application shell's registry.
    pub fn root(&self) -> RegistryId {
        self.root
    }

    pub fn root_scope(&self) -> SlotScope {
        self.scope(self.root)
    }

    pub fn scope(&self, id: RegistryId) -> SlotScope {
        SlotScope {
            registry: self.clone(),
            id,
        }
    }

    pub fn contains(&self, id: RegistryId) -> bool {
        self.arena.lock().get(id).is_some()
    }

    /// Number of live registries, the root included.
    pub fn live_registries(&self) -> usize {
        self.arena
            .lock()
            .cells
            .iter()
            .filter(|(_, node)| node.is_some())
            .count()
    }

    pub fn parent(&self, id: RegistryId) -> Option<RegistryId> {
        self.arena.lock().get(id).and_then(|n| n.parent)
    }

    pub fn register_outlet(
        &self,
        id: RegistryId,
        slot: impl Into<String>,
        outlet: Arc<dyn Outlet>,
    ) -> Result<(), SlotError> {
        let mut arena = self.arena.lock();
        let node = arena
            .get_mut(id)
            .ok_or_else(|| SlotError::UnknownRegistry(id.to_string()))?;
        node.slots.entry(slot.into()).or_default().outlet = Some(outlet);
        Ok(())
    }

    /// Drop the outlet behind `slot`. Occupancy, if any, is left for the caller to tear down.
    pub fn remove_outlet(&self, id: RegistryId, slot: &str) {
        let mut arena = self.arena.lock();
        if let Some(entry) = arena.get_mut(id).and_then(|n| n.slots.get_mut(slot)) {
            entry.outlet = None;
        }
    }

    pub fn outlet(&self, id: RegistryId, slot: &str) -> Option<Arc<dyn Outlet>> {
        let arena = self.arena.lock();
        arena
            .get(id)
            .and_then(|n| n.slots.get(slot))
            .and_then(|e| e.outlet.clone())
    }

    pub fn occupancy(&self, id: RegistryId, slot: &str) -> Option<Occupancy> {
        let arena = self.arena.lock();
        arena
            .get(id)
            .and_then(|n| n.slots.get(slot))
            .and_then(|e| e.occupancy.clone())
    }

    /// Occupied slots of a registry, in name order.
    pub fn occupied(&self, id: RegistryId) -> Vec<(String, Occupancy)> {
        let arena = self.arena.lock();
        arena
            .get(id)
            .map(|n| {
                n.slots
                    .iter()
                    .filter_map(|(name, e)| e.occupancy.clone().map(|o| (name.clone(), o)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Allocate an empty registry for a component about to be mounted under `parent`.
    pub fn create_nested(&self, parent: RegistryId) -> Result<RegistryId, SlotError> {
        let mut arena = self.arena.lock();
        if arena.get(parent).is_none() {
            return Err(SlotError::UnknownRegistry(parent.to_string()));
        }
        Ok(arena.alloc(Some(parent)))
    }

    /// Free a registry and all registries below it. Returns how many were freed.
    pub fn release(&self, id: RegistryId) -> usize {
        if id == self.root {
            return 0;
        }
        self.arena.lock().release(id)
    }

    pub fn occupy(&self, id: RegistryId, slot: &str, occupancy: Occupancy) -> Result<(), SlotError> {
        let mut arena = self.arena.lock();
        let node = arena
            .get_mut(id)
            .ok_or_else(|| SlotError::UnknownRegistry(id.to_string()))?;
        node.slots.entry(slot.to_string()).or_default().occupancy = Some(occupancy);
        Ok(())
    }

    /// Clear a slot's occupancy. The nested registry is not released.
    pub fn vacate(&self, id: RegistryId, slot: &str) -> Option<Occupancy> {
        let mut arena = self.arena.lock();
        arena
            .get_mut(id)
            .and_then(|n| n.slots.get_mut(slot))
            .and_then(|e| e.occupancy.take())
    }
}

impl fmt::Debug for SlotRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotRegistry")
            .field("root", &self.root)
            .field("live", &self.live_registries())
            .finish()
    }
}

/// One registry of the arena, as handed to a mounted component.
#[derive(Clone)]
pub struct SlotScope {
    registry: SlotRegistry,
    id: RegistryId,
}

impl SlotScope {
    pub fn id(&self) -> RegistryId {
        self.id
    }

    pub fn registry(&self) -> &SlotRegistry {
        &self.registry
    }

    pub fn register_outlet(
        &self,
        slot: impl Into<String>,
        outlet: Arc<dyn Outlet>,
    ) -> Result<(), SlotError> {
        self.registry.register_outlet(self.id, slot, outlet)
    }

    pub fn occupancy(&self, slot: &str) -> Option<Occupancy> {
        self.registry.occupancy(self.id, slot)
    }
}

impl fmt::Debug for SlotScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotScope").field("id", &self.id).finish()
    }
}
