// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Triangulation and face-vertex deduplication.
//!
//! Host polygons are fanned from their first corner. Each triangle corner
//! becomes a candidate [`WireVertex`]; candidates whose attributes are
//! bit-identical collapse to one vertex. Output vertices appear in order of
//! first use, so identical input always yields identical output.

use std::collections::HashMap;

use bridge_scene_port::{EntityId, SourceMesh, WireVertex};
use bridge_session_proto::MeshPayload;
use thiserror::Error;

/// Host geometry that cannot be converted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshError {
    /// Polygon with fewer than three corners.
    #[error("face {face} has {corners} corners")]
    MalformedFace {
        /// Face index.
        face: usize,
        /// Corner count.
        corners: usize,
    },
    /// Corner references a position that does not exist.
    #[error("face {face} references vertex {vertex} out of {positions}")]
    VertexOutOfRange {
        /// Face index.
        face: usize,
        /// Referenced position index.
        vertex: u32,
        /// Number of positions.
        positions: usize,
    },
    /// Corner carries the wrong number of UV channels.
    #[error("face {face} has {found} uv channels, mesh declares {expected}")]
    UvChannelMismatch {
        /// Face index.
        face: usize,
        /// Declared channel count.
        expected: u8,
        /// Channels on the corner.
        found: usize,
    },
    /// Corner color presence disagrees with the mesh flag.
    #[error("face {face} corner color does not match the mesh color flag")]
    ColorMismatch {
        /// Face index.
        face: usize,
    },
    /// Wire vertex count would overflow u32 indices.
    #[error("mesh needs {0} vertices")]
    TooManyVertices(usize),
}

/// Wire-ready mesh: unique vertices plus per-triangle tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupedMesh {
    /// UV channels per vertex.
    pub uv_channels: u8,
    /// Whether vertices carry colors.
    pub has_vertex_color: bool,
    /// Unique vertices, in order of first use.
    pub vertices: Vec<WireVertex>,
    /// Three vertex indices per triangle.
    pub indices: Vec<u32>,
    /// Material index per triangle.
    pub materials: Vec<u16>,
}

impl DedupedMesh {
    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.materials.len()
    }

    /// Build the Mesh message body for this geometry.
    pub fn into_payload(self, mesh_id: EntityId, name: impl Into<String>) -> MeshPayload {
        MeshPayload {
            mesh_id,
            name: name.into(),
            has_vertex_color: self.has_vertex_color,
            uv_channels: self.uv_channels,
            vertices: self.vertices,
            materials: self.materials,
        }
    }
}

/// Triangulate `mesh` and merge identical face-vertices.
///
/// Zero-area triangles are kept.
pub fn deduplicate(mesh: &SourceMesh) -> Result<DedupedMesh, MeshError> {
    validate(mesh)?;

    let triangles: usize = mesh
        .faces
        .iter()
        .map(|f| f.corners.len().saturating_sub(2))
        .sum();
    let mut out = DedupedMesh {
        uv_channels: mesh.uv_channels,
        has_vertex_color: mesh.has_vertex_color,
        vertices: Vec::new(),
        indices: Vec::with_capacity(triangles * 3),
        materials: Vec::with_capacity(triangles),
    };
    let mut seen: HashMap<WireVertex, u32> = HashMap::with_capacity(triangles * 3);

    for face in &mesh.faces {
        let fan = &face.corners;
        for i in 1..fan.len() - 1 {
            for corner in [&fan[0], &fan[i], &fan[i + 1]] {
                let vertex = WireVertex {
                    position: mesh.positions[corner.vertex as usize],
                    normal: corner.normal,
                    uvs: corner.uvs.clone(),
                    color: corner.color,
                };
                let index = match seen.get(&vertex) {
                    Some(index) => *index,
                    None => {
                        let index = u32::try_from(out.vertices.len())
                            .map_err(|_| MeshError::TooManyVertices(out.vertices.len() + 1))?;
                        seen.insert(vertex.clone(), index);
                        out.vertices.push(vertex);
                        index
                    }
                };
                out.indices.push(index);
            }
            out.materials.push(face.material);
        }
    }
    Ok(out)
}

fn validate(mesh: &SourceMesh) -> Result<(), MeshError> {
    for (face, f) in mesh.faces.iter().enumerate() {
        if f.corners.len() < 3 {
            return Err(MeshError::MalformedFace {
                face,
                corners: f.corners.len(),
            });
        }
        for corner in &f.corners {
            if corner.vertex as usize >= mesh.positions.len() {
                return Err(MeshError::VertexOutOfRange {
                    face,
                    vertex: corner.vertex,
                    positions: mesh.positions.len(),
                });
            }
            if corner.uvs.len() != usize::from(mesh.uv_channels) {
                return Err(MeshError::UvChannelMismatch {
                    face,
                    expected: mesh.uv_channels,
                    found: corner.uvs.len(),
                });
            }
            if corner.color.is_some() != mesh.has_vertex_color {
                return Err(MeshError::ColorMismatch { face });
            }
        }
    }
    Ok(())
}
