// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Session wire schema for the scene bridge.
//!
//! Every message on the stream, in both directions, is framed as
//!
//! ``PAYLOAD_SIZE(u32) || MESSAGE_TYPE(u16) || PAYLOAD``
//!
//! with all numeric fields packed little-endian. Client kinds stream scene
//! state (meshes, items, lights, removals) and render requests; the server
//! answers render requests with a `Result` framebuffer. See [`wire`] for the
//! frame helpers and [`codec`] for the scalar reader/writer.

use bridge_scene_port::{EntityId, LightKind, SpotCone, WireVertex};

pub use bridge_scene_port::IdWidth;

pub mod codec;
pub mod wire;

pub use codec::{CodecError, MAX_NAME_BYTES};
pub use wire::WireError;

/// Message type codes sent by the client.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientKind {
    /// Drop all server-side state.
    Reset = 0,
    /// Create or replace a mesh.
    Mesh = 1,
    /// Create or update an item (mesh instance).
    Item = 2,
    /// Remove an item.
    ItemRemove = 3,
    /// Create or update a light.
    Light = 4,
    /// Remove a light.
    LightRemove = 5,
    /// Render the current scene from a camera.
    Render = 6,
}

impl ClientKind {
    /// Wire code.
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Parse a wire code.
    pub const fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0 => Self::Reset,
            1 => Self::Mesh,
            2 => Self::Item,
            3 => Self::ItemRemove,
            4 => Self::Light,
            5 => Self::LightRemove,
            6 => Self::Render,
            _ => return None,
        })
    }
}

/// Message type codes sent by the server.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerKind {
    /// Rendered framebuffer.
    Result = 0,
}

impl ServerKind {
    /// Wire code.
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Parse a wire code; unknown codes are not an error at this level.
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Result),
            _ => None,
        }
    }
}

/// Deduplicated mesh upload.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshPayload {
    /// Shared or synthetic mesh id.
    pub mesh_id: EntityId,
    /// Mesh name.
    pub name: String,
    /// Whether every vertex carries an RGBA8 color.
    pub has_vertex_color: bool,
    /// Number of UV channels per vertex.
    pub uv_channels: u8,
    /// Unique wire vertices.
    pub vertices: Vec<WireVertex>,
    /// Material index per triangle.
    pub materials: Vec<u16>,
}

/// Item (instance) create/update.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemPayload {
    /// Mesh the item draws.
    pub mesh_id: EntityId,
    /// Item id (object id).
    pub object_id: EntityId,
    /// Display name.
    pub name: String,
    /// World translation.
    pub position: [f32; 3],
    /// World rotation quaternion (x, y, z, w).
    pub rotation: [f32; 4],
    /// World scale.
    pub scale: [f32; 3],
}

/// Light create/update.
#[derive(Debug, Clone, PartialEq)]
pub struct LightPayload {
    /// Light id (object id).
    pub object_id: EntityId,
    /// Display name.
    pub name: String,
    /// Light kind; only sun, point and spot are encodable.
    pub kind: LightKind,
    /// Shadow casting.
    pub cast_shadow: bool,
    /// Negative light.
    pub use_negative: bool,
    /// Linear RGB color.
    pub color: [f32; 3],
    /// Intensity.
    pub energy: f32,
    /// World position.
    pub position: [f32; 3],
    /// World rotation quaternion (x, y, z, w).
    pub rotation: [f32; 4],
    /// Attenuation radius.
    pub radius: f32,
    /// Attenuation threshold.
    pub radius_threshold: f32,
    /// Spot cone; on the wire iff `kind` is spot.
    pub spot: Option<SpotCone>,
}

/// Render request.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPayload {
    /// Ask the server to send back a `Result`.
    pub want_result: bool,
    /// Stable per-viewport identifier.
    pub viewport_id: i64,
    /// Requested output width (ignored without `want_result`).
    pub width: u16,
    /// Requested output height (ignored without `want_result`).
    pub height: u16,
    /// Lens focal length.
    pub lens: f32,
    /// Near clip.
    pub clip_start: f32,
    /// Far clip.
    pub clip_end: f32,
    /// Camera position.
    pub cam_pos: [f32; 3],
    /// Up direction (unnormalised frustum basis).
    pub cam_up: [f32; 3],
    /// Right direction (unnormalised frustum basis).
    pub cam_right: [f32; 3],
    /// Forward direction (unnormalised frustum basis).
    pub cam_forward: [f32; 3],
    /// Perspective (true) or orthographic (false).
    pub is_perspective: bool,
}

/// Rendered framebuffer returned by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPayload {
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
    /// `width * height` RGBA8 pixels.
    pub pixels: Vec<u8>,
}

impl ResultPayload {
    /// Byte length of the pixel block implied by the dimensions.
    pub fn expected_len(width: u16, height: u16) -> usize {
        usize::from(width) * usize::from(height) * 4
    }
}

/// Messages sent from the client to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum FromClient {
    /// Drop all server-side state. Always the first message of a session.
    Reset,
    /// Mesh upload.
    Mesh(MeshPayload),
    /// Item create/update.
    Item(ItemPayload),
    /// Item removal.
    ItemRemove {
        /// Mesh the item was drawing.
        mesh_id: EntityId,
        /// Item id.
        object_id: EntityId,
    },
    /// Light create/update.
    Light(LightPayload),
    /// Light removal.
    LightRemove {
        /// Light id.
        object_id: EntityId,
    },
    /// Render request.
    Render(RenderPayload),
}

impl FromClient {
    /// Message type of this variant.
    pub fn kind(&self) -> ClientKind {
        match self {
            FromClient::Reset => ClientKind::Reset,
            FromClient::Mesh(_) => ClientKind::Mesh,
            FromClient::Item(_) => ClientKind::Item,
            FromClient::ItemRemove { .. } => ClientKind::ItemRemove,
            FromClient::Light(_) => ClientKind::Light,
            FromClient::LightRemove { .. } => ClientKind::LightRemove,
            FromClient::Render(_) => ClientKind::Render,
        }
    }

    /// Short name for logs.
    pub fn op_name(&self) -> &'static str {
        match self {
            FromClient::Reset => "reset",
            FromClient::Mesh(_) => "mesh",
            FromClient::Item(_) => "item",
            FromClient::ItemRemove { .. } => "item_remove",
            FromClient::Light(_) => "light",
            FromClient::LightRemove { .. } => "light_remove",
            FromClient::Render(_) => "render",
        }
    }
}

/// Messages sent from the server to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FromServer {
    /// Rendered framebuffer.
    Result(ResultPayload),
    /// A message type this client does not understand; skipped by size.
    Unknown {
        /// Raw message type.
        kind: u16,
        /// Raw payload, uninterpreted.
        payload: Vec<u8>,
    },
}
