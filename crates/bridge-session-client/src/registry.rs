// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identity and sync state for host entities.
//!
//! The registry is keyed by host handles, never by name. Names are only
//! recorded so a later mismatch can flag a rename or a duplication (hosts
//! copy bridge metadata onto duplicates, so both end up holding one id).

use std::collections::{BTreeSet, HashMap};

use bridge_scene_port::{EntityId, IdWidth, MeshHandle, ObjectHandle, SceneObject};

use crate::error::EncodingError;

/// Sync state of one mesh object or light.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectRecord {
    /// Object id; zero until first observed.
    pub id: EntityId,
    /// Name recorded when the id was assigned.
    pub name: String,
    /// Mesh id the peer's item currently references (zero for lights).
    pub linked_mesh: EntityId,
    /// Peer state matches the host.
    pub in_sync: bool,
    /// Record belongs to a light.
    pub is_light: bool,
}

/// Sync state of one shared source mesh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshRecord {
    /// Mesh id; zero until first uploaded.
    pub id: EntityId,
    /// Pass that last uploaded this mesh; zero means never.
    pub frame_last_synced: u32,
}

/// Pass counter, kept in `[1, i32::MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounter(u32);

impl FrameCounter {
    const MAX: u32 = 0x7FFF_FFFF;

    /// Counter at its first pass.
    pub const fn new() -> Self {
        Self(1)
    }

    /// Counter at `value`, clamped into range.
    pub fn at(value: u32) -> Self {
        Self(value.clamp(1, Self::MAX))
    }

    /// Current pass number.
    pub const fn current(self) -> u32 {
        self.0
    }

    /// Step to the next pass, wrapping to 1 after `i32::MAX`.
    pub fn advance(&mut self) {
        self.0 = (self.0 % Self::MAX) + 1;
    }
}

impl Default for FrameCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// What the peer holds as of the last completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSet {
    /// `(mesh_id, object_id)` pairs.
    pub items: BTreeSet<(EntityId, EntityId)>,
    /// Light ids.
    pub lights: BTreeSet<EntityId>,
}

impl ActiveSet {
    /// Entries in `self` missing from `next`, in id order.
    pub fn removed_since(&self, next: &Self) -> (Vec<(EntityId, EntityId)>, Vec<EntityId>) {
        (
            self.items.difference(&next.items).copied().collect(),
            self.lights.difference(&next.lights).copied().collect(),
        )
    }

    /// Forget an item already removed on the peer.
    pub fn retire_item(&mut self, mesh: EntityId, object: EntityId) -> bool {
        self.items.remove(&(mesh, object))
    }

    /// Forget a light already removed on the peer.
    pub fn retire_light(&mut self, object: EntityId) -> bool {
        self.lights.remove(&object)
    }

    /// Nothing is active.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.lights.is_empty()
    }
}

/// Handle-keyed identity store.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    width: IdWidth,
    objects: HashMap<ObjectHandle, ObjectRecord>,
    meshes: HashMap<MeshHandle, MeshRecord>,
    next_object: u64,
    next_mesh: u64,
}

impl EntityRegistry {
    /// Empty registry with both counters at 1.
    pub fn new(width: IdWidth) -> Self {
        Self {
            width,
            objects: HashMap::new(),
            meshes: HashMap::new(),
            next_object: 1,
            next_mesh: 1,
        }
    }

    /// Id width the counters are bounded by.
    pub fn width(&self) -> IdWidth {
        self.width
    }

    /// Forget every record and restart both counters at 1.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.meshes.clear();
        self.next_object = 1;
        self.next_mesh = 1;
    }

    /// Record for an object handle.
    pub fn object(&self, handle: ObjectHandle) -> Option<&ObjectRecord> {
        self.objects.get(&handle)
    }

    /// Mutable record for an object handle.
    pub fn object_mut(&mut self, handle: ObjectHandle) -> Option<&mut ObjectRecord> {
        self.objects.get_mut(&handle)
    }

    /// Record for a mesh handle.
    pub fn mesh(&self, handle: MeshHandle) -> Option<&MeshRecord> {
        self.meshes.get(&handle)
    }

    /// Mutable record for a mesh handle.
    pub fn mesh_mut(&mut self, handle: MeshHandle) -> Option<&mut MeshRecord> {
        self.meshes.get_mut(&handle)
    }

    /// Number of tracked objects.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn bump(counter: &mut u64, width: IdWidth) -> Result<EntityId, EncodingError> {
        if *counter > width.max_plain() {
            return Err(EncodingError::IdSpaceExhausted);
        }
        let id = EntityId(*counter);
        *counter += 1;
        Ok(id)
    }

    /// Mirror a host duplication: an unseen handle copied from a known one
    /// starts out with the source's record, stale id included.
    pub fn adopt_duplicate(&mut self, object: &SceneObject) {
        let Some(source) = object.duplicated_from else {
            return;
        };
        if self.objects.contains_key(&object.handle) {
            return;
        }
        if let Some(record) = self.objects.get(&source).cloned() {
            self.objects.insert(object.handle, record);
        }
    }

    /// Existing id for `object`, or the next unused one.
    ///
    /// A fresh id records the object's current name.
    pub fn identity_for(&mut self, object: &SceneObject, is_light: bool) -> Result<EntityId, EncodingError> {
        let record = self.objects.entry(object.handle).or_default();
        if !record.id.is_assigned() {
            record.id = Self::bump(&mut self.next_object, self.width)?;
            record.name.clone_from(&object.name);
            record.is_light = is_light;
        }
        Ok(record.id)
    }

    /// The object holds an id recorded under a different name.
    pub fn is_renamed(&self, object: &SceneObject) -> bool {
        self.objects
            .get(&object.handle)
            .is_some_and(|r| r.id.is_assigned() && r.name != object.name)
    }

    /// Handles currently holding `id`, in handle order.
    pub fn holders_of(&self, id: EntityId) -> Vec<ObjectHandle> {
        let mut out: Vec<_> = self
            .objects
            .iter()
            .filter(|(_, r)| r.id == id)
            .map(|(h, _)| *h)
            .collect();
        out.sort_unstable();
        out
    }

    /// Drop an object's identity so the next pass resends it under a new id.
    pub fn forget_object(&mut self, handle: ObjectHandle) {
        if let Some(record) = self.objects.get_mut(&handle) {
            let is_light = record.is_light;
            *record = ObjectRecord {
                is_light,
                ..ObjectRecord::default()
            };
        }
    }

    /// Drop every object record whose handle fails `keep`; returns how many went.
    ///
    /// A handle that comes back later starts over with a fresh id.
    pub fn retain_objects(&mut self, keep: impl Fn(ObjectHandle) -> bool) -> usize {
        let before = self.objects.len();
        self.objects.retain(|handle, _| keep(*handle));
        before - self.objects.len()
    }

    /// Drop a shared mesh's identity and upload stamp.
    pub fn forget_mesh(&mut self, handle: MeshHandle) {
        if let Some(record) = self.meshes.get_mut(&handle) {
            *record = MeshRecord::default();
        }
    }

    /// Id for a shared mesh, allocated on first use.
    pub fn mesh_identity(&mut self, handle: MeshHandle) -> Result<EntityId, EncodingError> {
        let record = self.meshes.entry(handle).or_default();
        if !record.id.is_assigned() {
            record.id = Self::bump(&mut self.next_mesh, self.width)?;
        }
        Ok(record.id)
    }
}
