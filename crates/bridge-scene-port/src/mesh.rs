// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Mesh input (host side) and wire vertex (bridge side) types.

use core::hash::{Hash, Hasher};

/// One corner of a host polygon: a position index plus per-corner attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceCorner {
    /// Index into [`SourceMesh::positions`].
    pub vertex: u32,
    /// Corner normal.
    pub normal: [f32; 3],
    /// One UV per channel; length must equal [`SourceMesh::uv_channels`].
    pub uvs: Vec<[f32; 2]>,
    /// Corner color; must be present iff [`SourceMesh::has_vertex_color`].
    pub color: Option<[u8; 4]>,
}

/// A host polygon with three or more corners.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceFace {
    /// Material slot index.
    pub material: u16,
    /// Corners in winding order.
    pub corners: Vec<FaceCorner>,
}

/// Final object-space geometry of a mesh object, as evaluated by the host.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceMesh {
    /// Vertex positions.
    pub positions: Vec<[f32; 3]>,
    /// Number of UV channels carried by every corner.
    pub uv_channels: u8,
    /// Whether every corner carries a color.
    pub has_vertex_color: bool,
    /// Polygons (triangles, quads, n-gons).
    pub faces: Vec<SourceFace>,
}

/// Deduplicated vertex in wire form.
///
/// Equality and hashing use the bit pattern of every attribute; `-0.0` and
/// `0.0` are different vertices, and so are two NaNs with different payloads.
#[derive(Clone, Debug)]
pub struct WireVertex {
    /// Object-space position.
    pub position: [f32; 3],
    /// Normal.
    pub normal: [f32; 3],
    /// UV per channel.
    pub uvs: Vec<[f32; 2]>,
    /// RGBA8 color when the mesh carries colors.
    pub color: Option<[u8; 4]>,
}

impl WireVertex {
    /// Encoded size of one vertex for the given layout.
    pub const fn stride(uv_channels: u8, has_color: bool) -> usize {
        24 + 8 * uv_channels as usize + if has_color { 4 } else { 0 }
    }

    /// Attribute bits in a fixed order, used for hashing and comparison.
    pub fn bit_pattern(&self) -> impl Iterator<Item = u32> + '_ {
        self.position
            .iter()
            .chain(self.normal.iter())
            .chain(self.uvs.iter().flatten())
            .map(|f| f.to_bits())
            .chain(self.color.map(u32::from_le_bytes))
    }
}

impl PartialEq for WireVertex {
    fn eq(&self, other: &Self) -> bool {
        self.uvs.len() == other.uvs.len()
            && self.color.is_some() == other.color.is_some()
            && self.bit_pattern().eq(other.bit_pattern())
    }
}

impl Eq for WireVertex {}

impl Hash for WireVertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uvs.len().hash(state);
        self.color.is_some().hash(state);
        for bits in self.bit_pattern() {
            bits.hash(state);
        }
    }
}
