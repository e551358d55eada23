// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Core identity and object types for the host scene contract.
//!
//! These are plain domain objects. Byte layout is handled by
//! bridge-session-proto.

/// Stable handle for a host scene object.
///
/// Survives renames; a duplicated object gets a new handle.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectHandle(pub u64);

/// Stable handle for a host mesh datablock (shared source geometry).
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshHandle(pub u64);

/// Width of entity ids on the wire.
///
/// Older peers speak 32-bit signed ids; newer ones speak 64-bit ids. The
/// sentinel bit marking synthetic per-object meshes is always the sign bit
/// of the chosen width.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IdWidth {
    /// `int32` ids, sentinel `0x8000_0000`.
    #[default]
    Narrow,
    /// `int64` ids, sentinel `1 << 63`.
    Wide,
}

impl IdWidth {
    /// The sentinel high bit reserved for synthetic mesh ids.
    pub const fn sentinel(self) -> u64 {
        match self {
            Self::Narrow => 1 << 31,
            Self::Wide => 1 << 63,
        }
    }

    /// Largest id the allocator may hand out (sentinel bit clear).
    pub const fn max_plain(self) -> u64 {
        self.sentinel() - 1
    }

    /// Encoded size of one id in bytes.
    pub const fn byte_len(self) -> usize {
        match self {
            Self::Narrow => 4,
            Self::Wide => 8,
        }
    }
}

/// Integer identity of an object, mesh or light for the lifetime of a session.
///
/// Zero means "unassigned".
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u64);

impl EntityId {
    /// The unassigned id.
    pub const UNASSIGNED: Self = Self(0);

    /// Whether an id has been handed out.
    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }

    /// Synthetic mesh id owned exclusively by `object`.
    ///
    /// Used when modifiers make an object's evaluated mesh unshareable.
    pub const fn synthetic_mesh(object: Self, width: IdWidth) -> Self {
        Self(object.0 | width.sentinel())
    }

    /// Whether the sentinel bit for `width` is set.
    pub const fn is_synthetic(self, width: IdWidth) -> bool {
        self.0 & width.sentinel() != 0
    }
}

impl core::fmt::Display for EntityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-pass mutation flags reported by the host for one object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeFlags {
    /// World transform changed since the last pass.
    pub transform_changed: bool,
    /// Object data changed (modifier result, skeleton pose, datablock swap).
    pub data_changed: bool,
    /// Object is visible this pass.
    pub visible: bool,
}

impl ChangeFlags {
    /// Visible, nothing changed.
    pub const UNCHANGED: Self = Self {
        transform_changed: false,
        data_changed: false,
        visible: true,
    };

    /// Visible, everything changed (fresh object).
    pub const ALL: Self = Self {
        transform_changed: true,
        data_changed: true,
        visible: true,
    };
}

impl Default for ChangeFlags {
    fn default() -> Self {
        Self::UNCHANGED
    }
}

/// Reference from a mesh object to its source mesh datablock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshLink {
    /// Handle of the shared source mesh.
    pub mesh: MeshHandle,
    /// Name of the source mesh datablock.
    pub mesh_name: String,
    /// Source geometry changed since the last pass.
    pub mesh_changed: bool,
    /// Object carries deforming modifiers; its evaluated mesh is unshareable.
    pub has_modifiers: bool,
}

/// Light kind as reported by the host.
///
/// Only [`LightKind::Sun`], [`LightKind::Point`] and [`LightKind::Spot`] are
/// synchronised; other kinds are skipped without assigning ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    /// Directional light.
    Sun,
    /// Omni light.
    Point,
    /// Cone light.
    Spot,
    /// Area light (not supported by the peer).
    Area,
    /// Hemisphere light (not supported by the peer).
    Hemi,
}

impl LightKind {
    /// Wire code for supported kinds (`0 = sun, 1 = point, 2 = spot`).
    pub const fn wire_code(self) -> Option<u8> {
        match self {
            Self::Sun => Some(0),
            Self::Point => Some(1),
            Self::Spot => Some(2),
            Self::Area | Self::Hemi => None,
        }
    }
}

/// Spot cone parameters. Ignored for non-spot lights.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SpotCone {
    /// Full cone angle in radians.
    pub size: f32,
    /// Edge softness in `[0, 1]`.
    pub blend: f32,
    /// Falloff exponent.
    pub falloff: f32,
}

/// Light parameters read from the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightParams {
    /// Light kind.
    pub kind: LightKind,
    /// Whether the light casts shadows.
    pub cast_shadow: bool,
    /// Negative (light-subtracting) light.
    pub use_negative: bool,
    /// Linear RGB color.
    pub color: [f32; 3],
    /// Intensity.
    pub energy: f32,
    /// Attenuation radius.
    pub radius: f32,
    /// Attenuation cut-off threshold.
    pub radius_threshold: f32,
    /// Spot cone (spot lights only).
    pub spot: SpotCone,
}

impl Default for LightParams {
    fn default() -> Self {
        Self {
            kind: LightKind::Point,
            cast_shadow: true,
            use_negative: false,
            color: [1.0, 1.0, 1.0],
            energy: 1.0,
            radius: 10.0,
            radius_threshold: 0.01,
            spot: SpotCone::default(),
        }
    }
}

/// What a scene object is, from the bridge's point of view.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectKind {
    /// Renderable mesh instance.
    Mesh(MeshLink),
    /// Light source.
    Light(LightParams),
    /// Anything else (cameras, empties, curves); ignored.
    Other,
}

/// One host object as seen in a single pass.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneObject {
    /// Stable host handle.
    pub handle: ObjectHandle,
    /// Current object name.
    pub name: String,
    /// Column-major world matrix.
    pub world: [f32; 16],
    /// Mutation flags for this pass.
    pub changes: ChangeFlags,
    /// Object payload.
    pub kind: ObjectKind,
    /// Set when the host copied this object's bridge metadata from another
    /// object (duplication). The new handle then starts out aliasing the
    /// source's identity until the rename check separates them.
    pub duplicated_from: Option<ObjectHandle>,
}
