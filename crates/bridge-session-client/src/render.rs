// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Render request/response cycle.
//!
//! The protocol is fire-and-forget, so a render with `want_result` is a
//! synchronous call layered on top: send, then keep receiving until a
//! `Result` arrives. Anything else that shows up meanwhile goes to the
//! caller's handler and the wait continues.

use std::time::{Duration, Instant};

use bridge_scene_port::{CameraSnapshot, ProjectionKind};
use bridge_session_proto::{FromServer, RenderPayload, ResultPayload};
use glam::{Mat4, Vec3, Vec4};
use tracing::{debug, warn};

use crate::connection::{Connection, Transport};
use crate::error::{ConnectionError, SessionError};

/// Stable per-viewport identifier sent with every render request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportId(pub i64);

impl ViewportId {
    /// Derive an id from a viewport label (first 8 bytes of its BLAKE3 hash).
    pub fn from_label(label: &str) -> Self {
        let hash = blake3::hash(label.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        Self(i64::from_le_bytes(head))
    }
}

/// Camera position plus unnormalised view basis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraBasis {
    /// Camera position.
    pub position: [f32; 3],
    /// Up direction.
    pub up: [f32; 3],
    /// Right direction.
    pub right: [f32; 3],
    /// Forward direction.
    pub forward: [f32; 3],
}

impl CameraBasis {
    /// Reconstruct the basis from a column-major view-projection matrix.
    ///
    /// Points `(0,0,0)`, `(0,1,0)`, `(1,0,0)` and `(0,0,-1)` are taken back
    /// through the inverse, divided by `w`, and the camera position is
    /// subtracted from the last three.
    pub fn from_view_projection(view_projection: &[f32; 16]) -> Result<Self, SessionError> {
        let vp = Mat4::from_cols_array(view_projection);
        let det = vp.determinant();
        if !det.is_finite() || det.abs() < f32::MIN_POSITIVE {
            return Err(SessionError::DegenerateCamera);
        }
        let inv = vp.inverse();
        let unproject = |x: f32, y: f32, z: f32| -> Result<Vec3, SessionError> {
            let p: Vec4 = inv * Vec4::new(x, y, z, 1.0);
            if p.w.abs() < f32::MIN_POSITIVE {
                return Err(SessionError::DegenerateCamera);
            }
            let point = p.truncate() / p.w;
            if point.is_finite() {
                Ok(point)
            } else {
                Err(SessionError::DegenerateCamera)
            }
        };
        let position = unproject(0.0, 0.0, 0.0)?;
        Ok(Self {
            position: position.to_array(),
            up: (unproject(0.0, 1.0, 0.0)? - position).to_array(),
            right: (unproject(1.0, 0.0, 0.0)? - position).to_array(),
            forward: (unproject(0.0, 0.0, -1.0)? - position).to_array(),
        })
    }
}

/// One render request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    /// Viewport issuing the request.
    pub viewport: ViewportId,
    /// Camera at draw time.
    pub camera: CameraSnapshot,
    /// Output width; ignored by the peer without `want_result`.
    pub width: u16,
    /// Output height; ignored by the peer without `want_result`.
    pub height: u16,
    /// Wait for and return the rendered pixels.
    pub want_result: bool,
}

impl RenderRequest {
    /// Build the wire payload.
    pub fn to_payload(&self) -> Result<RenderPayload, SessionError> {
        let basis = CameraBasis::from_view_projection(&self.camera.view_projection)?;
        Ok(RenderPayload {
            want_result: self.want_result,
            viewport_id: self.viewport.0,
            width: self.width,
            height: self.height,
            lens: self.camera.lens,
            clip_start: self.camera.clip_start,
            clip_end: self.camera.clip_end,
            cam_pos: basis.position,
            cam_up: basis.up,
            cam_right: basis.right,
            cam_forward: basis.forward,
            is_perspective: self.camera.projection == ProjectionKind::Perspective,
        })
    }
}

/// Receive until a `Result` arrives.
///
/// Other messages go to `on_other`. With a `deadline` the wait fails with
/// [`ConnectionError::Timeout`] once it elapses; without one it lasts until
/// a result or a connection error.
pub fn await_result<S: Transport>(
    conn: &mut Connection<S>,
    deadline: Option<Duration>,
    mut on_other: impl FnMut(&FromServer),
) -> Result<ResultPayload, SessionError> {
    let started = Instant::now();
    loop {
        let bound = match deadline {
            Some(limit) => {
                let left = limit.saturating_sub(started.elapsed());
                if left.is_zero() {
                    warn!(?limit, "render result did not arrive in time");
                    return Err(ConnectionError::Timeout(limit).into());
                }
                Some(left)
            }
            None => conn.receive_timeout(),
        };
        match conn.receive_message(bound)? {
            Some(FromServer::Result(result)) => {
                debug!(width = result.width, height = result.height, "render result");
                return Ok(result);
            }
            Some(other) => {
                if let FromServer::Unknown { kind, payload } = &other {
                    debug!(kind, size = payload.len(), "skipping unknown message");
                }
                on_other(&other);
            }
            None => {}
        }
    }
}
