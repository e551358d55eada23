// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Mock host scene for headless testing of the sync engine.
//!
//! MockScene keeps objects and mesh datablocks in memory and raises the same
//! change flags a content-creation host would. Call [`MockScene::end_pass`]
//! after each sync pass to clear them, the way a host clears its update
//! flags once a frame has been processed.

use std::cell::Cell;
use std::collections::HashMap;

use bridge_scene_port::{
    ChangeFlags, FaceCorner, HostScene, LightParams, MeshHandle, MeshLink, ObjectHandle,
    ObjectKind, PortError, SceneObject, SourceFace, SourceMesh,
};

/// Column-major identity matrix.
#[rustfmt::skip]
pub const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

/// Column-major translation matrix.
pub fn translation(x: f32, y: f32, z: f32) -> [f32; 16] {
    let mut m = IDENTITY;
    m[12] = x;
    m[13] = y;
    m[14] = z;
    m
}

/// Mock host scene.
#[derive(Debug, Default)]
pub struct MockScene {
    objects: Vec<SceneObject>,
    meshes: HashMap<MeshHandle, (String, SourceMesh)>,
    /// Evaluated geometry of objects with modifiers.
    deformed: HashMap<ObjectHandle, SourceMesh>,
    next_handle: u64,
    evaluations: Cell<usize>,
}

impl MockScene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|o| o.handle == handle)
    }

    /// Look up an object.
    pub fn object(&self, handle: ObjectHandle) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.handle == handle)
    }

    /// Number of `evaluate_mesh` calls served so far.
    pub fn evaluation_count(&self) -> usize {
        self.evaluations.get()
    }

    /// Add a mesh datablock.
    pub fn add_mesh(&mut self, name: &str, geometry: SourceMesh) -> MeshHandle {
        let handle = MeshHandle(self.alloc());
        self.meshes.insert(handle, (name.to_string(), geometry));
        handle
    }

    /// Add an object instancing `mesh`.
    pub fn add_mesh_object(&mut self, name: &str, mesh: MeshHandle, world: [f32; 16]) -> ObjectHandle {
        let mesh_name = self
            .meshes
            .get(&mesh)
            .map(|(n, _)| n.clone())
            .unwrap_or_default();
        self.push(
            name,
            world,
            ObjectKind::Mesh(MeshLink {
                mesh,
                mesh_name,
                mesh_changed: true,
                has_modifiers: false,
            }),
        )
    }

    /// Add a light.
    pub fn add_light(&mut self, name: &str, params: LightParams, world: [f32; 16]) -> ObjectHandle {
        self.push(name, world, ObjectKind::Light(params))
    }

    /// Add an object the bridge does not sync (camera, empty).
    pub fn add_other(&mut self, name: &str) -> ObjectHandle {
        self.push(name, IDENTITY, ObjectKind::Other)
    }

    fn push(&mut self, name: &str, world: [f32; 16], kind: ObjectKind) -> ObjectHandle {
        let handle = ObjectHandle(self.alloc());
        self.objects.push(SceneObject {
            handle,
            name: name.to_string(),
            world,
            changes: ChangeFlags::ALL,
            kind,
            duplicated_from: None,
        });
        handle
    }

    /// Move an object.
    pub fn set_world(&mut self, handle: ObjectHandle, world: [f32; 16]) {
        if let Some(obj) = self.get_mut(handle) {
            obj.world = world;
            obj.changes.transform_changed = true;
        }
    }

    /// Rename an object. Hosts raise no flag for this.
    pub fn rename(&mut self, handle: ObjectHandle, name: &str) {
        if let Some(obj) = self.get_mut(handle) {
            obj.name = name.to_string();
        }
    }

    /// Show or hide an object.
    pub fn set_visible(&mut self, handle: ObjectHandle, visible: bool) {
        if let Some(obj) = self.get_mut(handle) {
            obj.changes.visible = visible;
        }
    }

    /// Flag an object's data as changed without touching geometry.
    pub fn touch_data(&mut self, handle: ObjectHandle) {
        if let Some(obj) = self.get_mut(handle) {
            obj.changes.data_changed = true;
        }
    }

    /// Change a light's parameters.
    pub fn set_light(&mut self, handle: ObjectHandle, params: LightParams) {
        if let Some(obj) = self.get_mut(handle) {
            obj.kind = ObjectKind::Light(params);
            obj.changes.data_changed = true;
        }
    }

    /// Give an object a modifier stack producing `deformed`, or remove it.
    pub fn set_modifiers(&mut self, handle: ObjectHandle, deformed: Option<SourceMesh>) {
        let has = deformed.is_some();
        match deformed {
            Some(mesh) => self.deformed.insert(handle, mesh),
            None => self.deformed.remove(&handle),
        };
        if let Some(obj) = self.get_mut(handle) {
            if let ObjectKind::Mesh(link) = &mut obj.kind {
                link.has_modifiers = has;
            }
            obj.changes.data_changed = true;
        }
    }

    /// Replace a mesh datablock's geometry; every instance sees the change.
    pub fn edit_mesh(&mut self, mesh: MeshHandle, geometry: SourceMesh) {
        if let Some(entry) = self.meshes.get_mut(&mesh) {
            entry.1 = geometry;
        }
        for obj in &mut self.objects {
            if let ObjectKind::Mesh(link) = &mut obj.kind {
                if link.mesh == mesh {
                    link.mesh_changed = true;
                    obj.changes.data_changed = true;
                }
            }
        }
    }

    /// Point an object at a different mesh datablock.
    pub fn relink(&mut self, handle: ObjectHandle, mesh: MeshHandle) {
        let mesh_name = self
            .meshes
            .get(&mesh)
            .map(|(n, _)| n.clone())
            .unwrap_or_default();
        if let Some(obj) = self.get_mut(handle) {
            if let ObjectKind::Mesh(link) = &mut obj.kind {
                link.mesh = mesh;
                link.mesh_name = mesh_name;
            }
            obj.changes.data_changed = true;
        }
    }

    /// Duplicate an object the way hosts do: new handle, copied metadata,
    /// suffixed name.
    pub fn duplicate(&mut self, handle: ObjectHandle, name: &str) -> Option<ObjectHandle> {
        let mut copy = self.object(handle)?.clone();
        let new_handle = ObjectHandle(self.alloc());
        copy.handle = new_handle;
        copy.name = name.to_string();
        copy.changes = ChangeFlags::ALL;
        copy.duplicated_from = Some(handle);
        if let Some(deformed) = self.deformed.get(&handle).cloned() {
            self.deformed.insert(new_handle, deformed);
        }
        self.objects.push(copy);
        Some(new_handle)
    }

    /// Delete an object.
    pub fn remove(&mut self, handle: ObjectHandle) {
        self.objects.retain(|o| o.handle != handle);
        self.deformed.remove(&handle);
    }

    /// Put a deleted object back exactly as given, flags included (undo).
    pub fn restore(&mut self, object: SceneObject) {
        self.remove(object.handle);
        self.objects.push(object);
    }

    /// Clear change flags; visibility is kept.
    pub fn end_pass(&mut self) {
        for obj in &mut self.objects {
            obj.changes = ChangeFlags {
                visible: obj.changes.visible,
                ..ChangeFlags::UNCHANGED
            };
            obj.duplicated_from = None;
            if let ObjectKind::Mesh(link) = &mut obj.kind {
                link.mesh_changed = false;
            }
        }
    }

    /// Small scene used by the CLI demo: two cubes sharing a mesh, one
    /// deformed cube, and three lights.
    pub fn demo() -> Self {
        use bridge_scene_port::{LightKind, SpotCone};

        let mut scene = Self::new();
        let cube = scene.add_mesh("Cube", cube_mesh());
        scene.add_mesh_object("Cube", cube, IDENTITY);
        scene.add_mesh_object("Cube.001", cube, translation(3.0, 0.0, 0.0));
        let bent = scene.add_mesh_object("Bent", cube, translation(-3.0, 0.0, 0.0));
        let mut squashed = cube_mesh();
        for p in &mut squashed.positions {
            p[2] *= 0.25;
        }
        scene.set_modifiers(bent, Some(squashed));
        scene.add_light(
            "Sun",
            LightParams {
                kind: LightKind::Sun,
                energy: 3.0,
                ..LightParams::default()
            },
            translation(0.0, 0.0, 10.0),
        );
        scene.add_light("Lamp", LightParams::default(), translation(4.0, 1.0, 5.9));
        scene.add_light(
            "Spot",
            LightParams {
                kind: LightKind::Spot,
                spot: SpotCone {
                    size: 0.785,
                    blend: 0.15,
                    falloff: 1.0,
                },
                ..LightParams::default()
            },
            translation(0.0, -4.0, 3.0),
        );
        scene.add_other("Camera");
        scene
    }
}

impl HostScene for MockScene {
    fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    fn evaluate_mesh(&self, object: ObjectHandle) -> Result<SourceMesh, PortError> {
        let obj = self.object(object).ok_or(PortError::UnknownObject(object))?;
        let ObjectKind::Mesh(link) = &obj.kind else {
            return Err(PortError::Evaluation(format!("{} is not a mesh", obj.name)));
        };
        self.evaluations.set(self.evaluations.get() + 1);
        if link.has_modifiers {
            if let Some(mesh) = self.deformed.get(&object) {
                return Ok(mesh.clone());
            }
        }
        self.meshes
            .get(&link.mesh)
            .map(|(_, mesh)| mesh.clone())
            .ok_or_else(|| PortError::Evaluation(format!("mesh {:?} missing", link.mesh)))
    }
}

/// Unit cube with flat normals, one UV channel and one material per side.
pub fn cube_mesh() -> SourceMesh {
    let positions = vec![
        [-1.0, -1.0, -1.0],
        [1.0, -1.0, -1.0],
        [1.0, 1.0, -1.0],
        [-1.0, 1.0, -1.0],
        [-1.0, -1.0, 1.0],
        [1.0, -1.0, 1.0],
        [1.0, 1.0, 1.0],
        [-1.0, 1.0, 1.0],
    ];
    let sides: [([u32; 4], [f32; 3]); 6] = [
        ([0, 3, 2, 1], [0.0, 0.0, -1.0]),
        ([4, 5, 6, 7], [0.0, 0.0, 1.0]),
        ([0, 1, 5, 4], [0.0, -1.0, 0.0]),
        ([2, 3, 7, 6], [0.0, 1.0, 0.0]),
        ([1, 2, 6, 5], [1.0, 0.0, 0.0]),
        ([3, 0, 4, 7], [-1.0, 0.0, 0.0]),
    ];
    let uv = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
    let faces = (0u16..)
        .zip(sides.iter())
        .map(|(material, (quad, normal))| SourceFace {
            material,
            corners: quad
                .iter()
                .zip(uv)
                .map(|(&vertex, uv)| FaceCorner {
                    vertex,
                    normal: *normal,
                    uvs: vec![uv],
                    color: None,
                })
                .collect(),
        })
        .collect();
    SourceMesh {
        positions,
        uv_channels: 1,
        has_vertex_color: false,
        faces,
    }
}
