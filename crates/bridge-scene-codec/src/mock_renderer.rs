// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Headless renderer peer.
//!
//! MockRenderer applies decoded client messages to HashMaps without any GPU
//! work. Use it to verify what a sync pass leaves on the server side, or as
//! the backing store of a stub peer.

use std::collections::HashMap;

use bridge_scene_port::EntityId;
use bridge_session_proto::wire::DEFAULT_MAX_PAYLOAD;
use bridge_session_proto::{
    ClientKind, FromClient, FromServer, ItemPayload, LightPayload, MeshPayload, RenderPayload,
    ResultPayload,
};
use tracing::{debug, warn};

/// Mock renderer state.
#[derive(Debug, Default)]
pub struct MockRenderer {
    /// Meshes by mesh id.
    pub meshes: HashMap<EntityId, MeshPayload>,
    /// Items by object id.
    pub items: HashMap<EntityId, ItemPayload>,
    /// Lights by object id.
    pub lights: HashMap<EntityId, LightPayload>,
    /// Messages received per type.
    pub received: HashMap<ClientKind, usize>,
    /// Removals naming something that is not present.
    pub stale_removals: usize,
    /// Last render request.
    pub last_render: Option<RenderPayload>,
}

impl MockRenderer {
    /// Create an empty renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages of `kind` applied so far.
    pub fn count(&self, kind: ClientKind) -> usize {
        self.received.get(&kind).copied().unwrap_or(0)
    }

    /// Total messages applied so far.
    pub fn total(&self) -> usize {
        self.received.values().sum()
    }

    /// Forget the per-type counters, keep scene state.
    pub fn clear_counters(&mut self) {
        self.received.clear();
        self.stale_removals = 0;
    }

    /// Items whose mesh has not been uploaded.
    pub fn dangling_items(&self) -> Vec<EntityId> {
        let mut out: Vec<_> = self
            .items
            .values()
            .filter(|item| !self.meshes.contains_key(&item.mesh_id))
            .map(|item| item.object_id)
            .collect();
        out.sort_unstable();
        out
    }

    /// Apply one client message; returns the server's answer, if any.
    pub fn apply(&mut self, msg: &FromClient) -> Option<FromServer> {
        *self.received.entry(msg.kind()).or_default() += 1;
        debug!(op = msg.op_name(), "mock renderer apply");
        match msg {
            FromClient::Reset => {
                self.meshes.clear();
                self.items.clear();
                self.lights.clear();
            }
            FromClient::Mesh(mesh) => {
                self.meshes.insert(mesh.mesh_id, mesh.clone());
            }
            FromClient::Item(item) => {
                self.items.insert(item.object_id, item.clone());
            }
            FromClient::ItemRemove { mesh_id, object_id } => {
                let matches = self
                    .items
                    .get(object_id)
                    .is_some_and(|item| item.mesh_id == *mesh_id);
                if matches {
                    self.items.remove(object_id);
                } else {
                    warn!(%mesh_id, %object_id, "removal of unknown item");
                    self.stale_removals += 1;
                }
            }
            FromClient::Light(light) => {
                self.lights.insert(light.object_id, light.clone());
            }
            FromClient::LightRemove { object_id } => {
                if self.lights.remove(object_id).is_none() {
                    warn!(%object_id, "removal of unknown light");
                    self.stale_removals += 1;
                }
            }
            FromClient::Render(render) => {
                self.last_render = Some(render.clone());
                if render.want_result {
                    return Some(FromServer::Result(self.frame(render.width, render.height)));
                }
            }
        }
        None
    }

    /// Flat framebuffer whose color encodes the scene population.
    fn frame(&self, width: u16, height: u16) -> ResultPayload {
        let len = ResultPayload::expected_len(width, height);
        if len + 4 > DEFAULT_MAX_PAYLOAD as usize {
            warn!(width, height, "requested frame exceeds payload bound");
            return ResultPayload {
                width: 0,
                height: 0,
                pixels: Vec::new(),
            };
        }
        let shade = |n: usize| u8::try_from(n.saturating_mul(32)).unwrap_or(u8::MAX);
        let pixel = [
            shade(self.items.len()),
            shade(self.lights.len()),
            shade(self.meshes.len()),
            u8::MAX,
        ];
        ResultPayload {
            width,
            height,
            pixels: pixel.repeat(len / 4),
        }
    }
}
