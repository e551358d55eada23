// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Host scene contract for the scene bridge.
//!
//! This crate defines what the sync engine needs from the content-creation
//! host: stable handles, per-pass change flags, mesh topology and light
//! parameters. It contains NO wire logic (see bridge-session-proto) and NO
//! identity tracking (see bridge-session-client).
//!
//! # Design Principles
//!
//! - **The host reports, the bridge decides**: hosts expose a snapshot of
//!   their objects plus change flags each pass; all dirty tracking and id
//!   assignment lives on the bridge side.
//! - **Handles, not names**: objects are keyed by a stable handle the host
//!   provides. Names are data and may change at any time.

use thiserror::Error;

/// Error type for host scene queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    /// The handle does not name a live object in the host scene.
    #[error("unknown object handle {0:?}")]
    UnknownObject(ObjectHandle),
    /// The host could not produce evaluated geometry for the object.
    #[error("mesh evaluation failed: {0}")]
    Evaluation(String),
}

mod camera;
mod mesh;
mod port;
mod types;

pub use camera::{CameraSnapshot, ProjectionKind};
pub use mesh::{FaceCorner, SourceFace, SourceMesh, WireVertex};
pub use port::HostScene;
pub use types::{
    ChangeFlags, EntityId, IdWidth, LightKind, LightParams, MeshHandle, MeshLink, ObjectHandle,
    ObjectKind, SceneObject, SpotCone,
};
