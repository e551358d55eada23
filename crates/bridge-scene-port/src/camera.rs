// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Camera snapshot types for render requests.

/// Camera projection type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionKind {
    /// Perspective projection (objects farther away appear smaller).
    Perspective,
    /// Orthographic projection (no perspective distortion).
    Orthographic,
}

/// Viewport camera as the host sees it at draw time.
///
/// The bridge only needs the combined view-projection matrix; view rays are
/// reconstructed from its inverse, so the host's matrix conventions do not
/// have to match the peer's.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraSnapshot {
    /// Column-major view-projection matrix.
    pub view_projection: [f32; 16],
    /// Lens focal length (mm).
    pub lens: f32,
    /// Near clipping plane.
    pub clip_start: f32,
    /// Far clipping plane.
    pub clip_end: f32,
    /// Projection type.
    pub projection: ProjectionKind,
}

impl Default for CameraSnapshot {
    fn default() -> Self {
        #[rustfmt::skip]
        let identity = [
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        Self {
            view_projection: identity,
            lens: 50.0,
            clip_start: 0.1,
            clip_end: 1000.0,
            projection: ProjectionKind::Perspective,
        }
    }
}
