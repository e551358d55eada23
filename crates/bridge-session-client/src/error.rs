// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error taxonomy for a bridge session.

use std::io;
use std::time::Duration;

use bridge_scene_codec::MeshError;
use bridge_scene_port::{EntityId, ObjectHandle, PortError};
use bridge_session_proto::{CodecError, WireError};
use thiserror::Error;

/// Transport-level failures. The session is unusable until reconnected.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Socket error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// Peer closed the stream at a frame boundary.
    #[error("connection closed by peer")]
    Closed,
    /// Operation on a connection that is not open.
    #[error("not connected")]
    NotConnected,
    /// Connect or receive bound elapsed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A single operation could not be encoded; nothing reached the stream.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// Scalar or string encoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Host geometry could not be converted.
    #[error(transparent)]
    Mesh(#[from] MeshError),
    /// Frame exceeds what the header can describe.
    #[error(transparent)]
    Frame(WireError),
    /// The id counter ran into the sentinel bit.
    #[error("entity id space exhausted")]
    IdSpaceExhausted,
}

/// Two live objects claimed the same id in one pass.
///
/// Not fatal: the engine removes every holder and issues a fresh id. Passes
/// report collisions in [`crate::PassReport::collisions`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("id {id} claimed by {first:?} and {second:?}")]
pub struct IdCollision {
    /// Contested id.
    pub id: EntityId,
    /// Handle that claimed the id first.
    pub first: ObjectHandle,
    /// Handle that claimed it again.
    pub second: ObjectHandle,
}

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Cannot connect, or the connection was lost.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// Inbound framing or decoding failed; the connection has been closed.
    #[error("protocol error: {0}")]
    Protocol(WireError),
    /// One outbound operation was rejected.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
    /// The host scene failed to answer a query.
    #[error("host scene: {0}")]
    Host(#[from] PortError),
    /// The camera's view-projection matrix cannot be inverted.
    #[error("degenerate camera matrix")]
    DegenerateCamera,
}

impl From<io::Error> for SessionError {
    fn from(err: io::Error) -> Self {
        Self::Connection(ConnectionError::Io(err))
    }
}

impl From<CodecError> for SessionError {
    fn from(err: CodecError) -> Self {
        Self::Encoding(EncodingError::Codec(err))
    }
}

impl From<MeshError> for SessionError {
    fn from(err: MeshError) -> Self {
        Self::Encoding(EncodingError::Mesh(err))
    }
}

impl SessionError {
    /// Whether the connection is gone after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Protocol(_))
    }
}
