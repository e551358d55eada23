// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Host scene port trait.

use crate::{ObjectHandle, PortError, SceneObject, SourceMesh};

/// Scene source trait implemented by the host integration.
///
/// One call to [`HostScene::objects`] is one pass worth of state: the change
/// flags describe what happened since the previous pass. The sync engine
/// reads the snapshot once per pass and never holds on to it.
///
/// # Evaluation
///
/// Geometry is pulled lazily. The engine calls [`HostScene::evaluate_mesh`]
/// only for objects whose mesh must actually be re-sent, so hosts can defer
/// modifier evaluation until it is needed.
pub trait HostScene {
    /// All objects in the scene this pass, in host order.
    fn objects(&self) -> &[SceneObject];

    /// Final object-space geometry for a mesh object (modifiers applied).
    fn evaluate_mesh(&self, object: ObjectHandle) -> Result<SourceMesh, PortError>;
}
