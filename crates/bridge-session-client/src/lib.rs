// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Client side of the scene bridge.
//!
//! - [`Connection`]: blocking, framed byte stream to the renderer peer.
//! - [`EntityRegistry`]: handle-keyed identities and per-entity sync state.
//! - [`SyncEngine`]: per-pass diffing of a [`bridge_scene_port::HostScene`]
//!   into protocol messages, plus the render request/response cycle.
//!
//! Everything runs on the caller's thread. The only blocking call is a
//! receive, used both to drain stray messages ([`SyncEngine::pump`]) and to
//! wait for render results ([`SyncEngine::request_render`]).

pub mod connection;
pub mod engine;
pub mod error;
pub mod registry;
pub mod render;

pub use connection::{ConnectOptions, Connection, ConnectionState, RawFrame, Transport};
pub use engine::{decompose, PassReport, SyncEngine, INTERNAL_MESH_PREFIX};
pub use error::{ConnectionError, EncodingError, IdCollision, SessionError};
pub use registry::{ActiveSet, EntityRegistry, FrameCounter, MeshRecord, ObjectRecord};
pub use render::{await_result, CameraBasis, RenderRequest, ViewportId};
