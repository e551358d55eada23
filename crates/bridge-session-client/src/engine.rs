// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-pass scene synchronisation.
//!
//! One [`SyncEngine`] owns one connection and all identity state for it.
//! Each [`SyncEngine::sync_pass`] walks the host scene once, sends what
//! changed, then removes whatever the peer still holds that the scene no
//! longer shows.

use std::collections::{HashMap, HashSet};
use std::net::TcpStream;
use std::time::Duration;

use bridge_scene_codec::deduplicate;
use bridge_scene_port::{
    EntityId, HostScene, LightKind, LightParams, MeshLink, ObjectHandle, ObjectKind, SceneObject,
};
use bridge_session_proto::{FromClient, FromServer, ItemPayload, LightPayload, ResultPayload};
use glam::Mat4;
use tracing::{debug, info, warn};

use crate::connection::{ConnectOptions, Connection, Transport};
use crate::error::{IdCollision, SessionError};
use crate::registry::{ActiveSet, EntityRegistry, FrameCounter};
use crate::render::{await_result, RenderRequest};

/// Prefix of synthetic per-object mesh names.
pub const INTERNAL_MESH_PREFIX: &str = "##internal##_";

/// What one pass sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Pass number.
    pub frame: u32,
    /// Mesh uploads.
    pub meshes: usize,
    /// Item creates/updates.
    pub items: usize,
    /// Light creates/updates.
    pub lights: usize,
    /// Item and light removals.
    pub removals: usize,
    /// Identity collisions resolved by reissuing ids.
    pub collisions: Vec<IdCollision>,
    /// Objects skipped because their data could not be encoded.
    pub rejected: Vec<ObjectHandle>,
}

impl PassReport {
    /// Messages sent during the pass.
    pub fn messages(&self) -> usize {
        self.meshes + self.items + self.lights + self.removals
    }
}

struct Pass {
    next: ActiveSet,
    claimed: HashMap<EntityId, ObjectHandle>,
    report: PassReport,
}

/// Decompose a column-major world matrix into position, xyzw rotation, scale.
pub fn decompose(world: &[f32; 16]) -> ([f32; 3], [f32; 4], [f32; 3]) {
    let (scale, rotation, translation) = Mat4::from_cols_array(world).to_scale_rotation_translation();
    (translation.to_array(), rotation.to_array(), scale.to_array())
}

/// Scene sync session over one connection.
#[derive(Debug)]
pub struct SyncEngine<S: Transport = TcpStream> {
    conn: Connection<S>,
    registry: EntityRegistry,
    active: ActiveSet,
    frame: FrameCounter,
}

impl SyncEngine<TcpStream> {
    /// Connect and reset the peer.
    pub fn connect(opts: &ConnectOptions) -> Result<Self, SessionError> {
        Self::start(Connection::connect(opts)?)
    }
}

impl<S: Transport> SyncEngine<S> {
    /// Take over an open connection; Reset is the first message sent.
    pub fn start(conn: Connection<S>) -> Result<Self, SessionError> {
        let mut engine = Self {
            registry: EntityRegistry::new(conn.id_width()),
            conn,
            active: ActiveSet::default(),
            frame: FrameCounter::new(),
        };
        engine.reset()?;
        Ok(engine)
    }

    /// Tell the peer to drop everything and forget all identities.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.conn.send(&FromClient::Reset)?;
        self.registry.clear();
        self.active = ActiveSet::default();
        info!("session reset");
        Ok(())
    }

    /// Identity state.
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// What the peer holds after the last pass.
    pub fn active(&self) -> &ActiveSet {
        &self.active
    }

    /// Number of the next pass.
    pub fn frame(&self) -> u32 {
        self.frame.current()
    }

    /// Move the pass counter.
    pub fn set_frame(&mut self, frame: FrameCounter) {
        self.frame = frame;
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection<S> {
        &self.conn
    }

    /// The underlying connection, mutably.
    pub fn connection_mut(&mut self) -> &mut Connection<S> {
        &mut self.conn
    }

    /// Shut the connection down.
    pub fn close(&mut self) {
        self.conn.close();
    }

    fn send(&mut self, msg: &FromClient) -> Result<(), SessionError> {
        self.conn.send(msg).map(|_| ())
    }

    /// Run one synchronisation pass over `scene`.
    ///
    /// Connection and protocol errors abort the pass. An object whose data
    /// cannot be encoded is skipped and listed in [`PassReport::rejected`];
    /// whatever the peer already holds for it is kept, and the next pass
    /// retries it.
    pub fn sync_pass<H: HostScene + ?Sized>(&mut self, scene: &H) -> Result<PassReport, SessionError> {
        let mut pass = Pass {
            next: ActiveSet::default(),
            claimed: HashMap::new(),
            report: PassReport {
                frame: self.frame.current(),
                ..PassReport::default()
            },
        };

        for object in scene.objects() {
            if !object.changes.visible {
                self.hide(object);
                continue;
            }
            let outcome = match &object.kind {
                ObjectKind::Mesh(link) => self.sync_item(scene, object, link, &mut pass),
                ObjectKind::Light(params) => self.sync_light(scene, object, params, &mut pass),
                ObjectKind::Other => Ok(()),
            };
            match outcome {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(object = %object.name, error = %e, "object skipped");
                    self.keep_previous(object.handle, &mut pass.next);
                    self.mark_for_retry(object);
                    pass.report.rejected.push(object.handle);
                }
            }
        }

        let seen: HashSet<ObjectHandle> = scene.objects().iter().map(|o| o.handle).collect();
        let dropped = self.registry.retain_objects(|handle| seen.contains(&handle));
        if dropped > 0 {
            debug!(dropped, "forgot deleted objects");
        }

        let (items, lights) = self.active.removed_since(&pass.next);
        for (mesh_id, object_id) in items {
            self.send(&FromClient::ItemRemove { mesh_id, object_id })?;
            pass.report.removals += 1;
        }
        for object_id in lights {
            self.send(&FromClient::LightRemove { object_id })?;
            pass.report.removals += 1;
        }
        self.active = pass.next;
        self.frame.advance();

        let report = pass.report;
        if report.messages() > 0 {
            info!(
                frame = report.frame,
                meshes = report.meshes,
                items = report.items,
                lights = report.lights,
                removals = report.removals,
                "sync pass"
            );
        }
        Ok(report)
    }

    fn hide(&mut self, object: &SceneObject) {
        if let Some(record) = self.registry.object_mut(object.handle) {
            record.in_sync = false;
        }
        if let ObjectKind::Mesh(link) = &object.kind {
            if object.changes.data_changed {
                if let Some(mesh) = self.registry.mesh_mut(link.mesh) {
                    mesh.frame_last_synced = 0;
                }
            }
        }
    }

    /// Force a rejected object through the full send path next pass.
    fn mark_for_retry(&mut self, object: &SceneObject) {
        if let Some(record) = self.registry.object_mut(object.handle) {
            record.in_sync = false;
        }
        if let ObjectKind::Mesh(link) = &object.kind {
            if !link.has_modifiers {
                if let Some(mesh) = self.registry.mesh_mut(link.mesh) {
                    mesh.frame_last_synced = 0;
                }
            }
        }
    }

    fn keep_previous(&self, handle: ObjectHandle, next: &mut ActiveSet) {
        let Some(record) = self.registry.object(handle) else {
            return;
        };
        if record.is_light {
            if self.active.lights.contains(&record.id) {
                next.lights.insert(record.id);
            }
        } else if self.active.items.contains(&(record.linked_mesh, record.id)) {
            next.items.insert((record.linked_mesh, record.id));
        }
    }

    /// Resolve the object's id, reissuing it on rename, duplication or an
    /// in-pass collision.
    fn resolve_identity<H: HostScene + ?Sized>(
        &mut self,
        scene: &H,
        object: &SceneObject,
        is_light: bool,
        pass: &mut Pass,
    ) -> Result<EntityId, SessionError> {
        self.registry.adopt_duplicate(object);
        if self.registry.is_renamed(object) {
            let stale = self
                .registry
                .object(object.handle)
                .map(|r| r.id)
                .unwrap_or_default();
            warn!(object = %object.name, id = %stale, "object renamed or duplicated, reissuing id");
            self.remove_holders(scene, stale, pass)?;
        }

        let mut id = self.registry.identity_for(object, is_light)?;
        if let Some(&first) = pass.claimed.get(&id) {
            if first != object.handle {
                let collision = IdCollision {
                    id,
                    first,
                    second: object.handle,
                };
                warn!(%collision, "identity collision, reissuing ids");
                self.remove_holders(scene, id, pass)?;
                id = self.registry.identity_for(object, is_light)?;
                pass.report.collisions.push(collision);
            }
        }
        pass.claimed.insert(id, object.handle);
        Ok(id)
    }

    /// Remove every object holding `id` from the peer and forget its identity.
    ///
    /// Holders the peer never received are forgotten without a message.
    fn remove_holders<H: HostScene + ?Sized>(
        &mut self,
        scene: &H,
        id: EntityId,
        pass: &mut Pass,
    ) -> Result<(), SessionError> {
        let holders: Vec<_> = self
            .registry
            .holders_of(id)
            .into_iter()
            .filter_map(|handle| {
                let record = self.registry.object(handle)?;
                let on_peer = if record.is_light {
                    self.active.lights.contains(&id) || pass.next.lights.contains(&id)
                } else {
                    let pair = (record.linked_mesh, id);
                    record.linked_mesh.is_assigned()
                        && (self.active.items.contains(&pair) || pass.next.items.contains(&pair))
                };
                Some((handle, record.clone(), on_peer))
            })
            .collect();

        for (handle, record, on_peer) in holders {
            if on_peer {
                if record.is_light {
                    self.send(&FromClient::LightRemove { object_id: id })?;
                } else {
                    self.send(&FromClient::ItemRemove {
                        mesh_id: record.linked_mesh,
                        object_id: id,
                    })?;
                }
                pass.report.removals += 1;
            }
            if record.is_light {
                self.active.retire_light(id);
                pass.next.retire_light(id);
            } else {
                self.active.retire_item(record.linked_mesh, id);
                pass.next.retire_item(record.linked_mesh, id);
            }
            self.registry.forget_object(handle);
            let source = scene.objects().iter().find(|o| o.handle == handle);
            if let Some(ObjectKind::Mesh(link)) = source.map(|o| &o.kind) {
                self.registry.forget_mesh(link.mesh);
            }
        }
        Ok(())
    }

    fn sync_item<H: HostScene + ?Sized>(
        &mut self,
        scene: &H,
        object: &SceneObject,
        link: &MeshLink,
        pass: &mut Pass,
    ) -> Result<(), SessionError> {
        let id = self.resolve_identity(scene, object, false, pass)?;
        let record = self.registry.object(object.handle).cloned().unwrap_or_default();
        let changes = object.changes;
        let dirty = !record.in_sync
            || changes.transform_changed
            || changes.data_changed
            || link.mesh_changed;
        if !dirty {
            pass.next.items.insert((record.linked_mesh, id));
            return Ok(());
        }

        let frame = self.frame.current();
        let (mesh_id, mesh_name) = if link.has_modifiers {
            (
                EntityId::synthetic_mesh(id, self.registry.width()),
                format!("{INTERNAL_MESH_PREFIX}{}", object.name),
            )
        } else {
            (self.registry.mesh_identity(link.mesh)?, link.mesh_name.clone())
        };
        let stamp = self.registry.mesh(link.mesh).map_or(0, |m| m.frame_last_synced);
        let send_geometry = if link.has_modifiers {
            !record.in_sync || changes.data_changed
        } else {
            stamp == 0 || (stamp != frame && link.mesh_changed)
        };

        if send_geometry {
            let source = scene.evaluate_mesh(object.handle)?;
            let mesh = deduplicate(&source)?;
            debug!(
                %mesh_id,
                vertices = mesh.vertices.len(),
                triangles = mesh.triangle_count(),
                "uploading mesh"
            );
            self.send(&FromClient::Mesh(mesh.into_payload(mesh_id, mesh_name)))?;
            pass.report.meshes += 1;
            if !link.has_modifiers {
                if let Some(shared) = self.registry.mesh_mut(link.mesh) {
                    shared.frame_last_synced = frame;
                }
            }
        }

        let mut in_sync = record.in_sync;
        if record.linked_mesh.is_assigned() && record.linked_mesh != mesh_id {
            self.send(&FromClient::ItemRemove {
                mesh_id: record.linked_mesh,
                object_id: id,
            })?;
            pass.report.removals += 1;
            self.active.retire_item(record.linked_mesh, id);
            in_sync = false;
        }
        if let Some(r) = self.registry.object_mut(object.handle) {
            r.linked_mesh = mesh_id;
            r.in_sync = in_sync;
        }

        if !in_sync || changes.transform_changed {
            let (position, rotation, scale) = decompose(&object.world);
            self.send(&FromClient::Item(ItemPayload {
                mesh_id,
                object_id: id,
                name: link.mesh_name.clone(),
                position,
                rotation,
                scale,
            }))?;
            pass.report.items += 1;
        }
        if let Some(r) = self.registry.object_mut(object.handle) {
            r.in_sync = true;
        }
        pass.next.items.insert((mesh_id, id));
        Ok(())
    }

    fn sync_light<H: HostScene + ?Sized>(
        &mut self,
        scene: &H,
        object: &SceneObject,
        params: &LightParams,
        pass: &mut Pass,
    ) -> Result<(), SessionError> {
        if params.kind.wire_code().is_none() {
            debug!(object = %object.name, kind = ?params.kind, "light kind not synced");
            return Ok(());
        }
        let id = self.resolve_identity(scene, object, true, pass)?;
        let in_sync = self.registry.object(object.handle).is_some_and(|r| r.in_sync);
        if !in_sync || object.changes.transform_changed || object.changes.data_changed {
            let (position, rotation, _) = decompose(&object.world);
            self.send(&FromClient::Light(LightPayload {
                object_id: id,
                name: object.name.clone(),
                kind: params.kind,
                cast_shadow: params.cast_shadow,
                use_negative: params.use_negative,
                color: params.color,
                energy: params.energy,
                position,
                rotation,
                radius: params.radius,
                radius_threshold: params.radius_threshold,
                spot: (params.kind == LightKind::Spot).then_some(params.spot),
            }))?;
            pass.report.lights += 1;
            if let Some(r) = self.registry.object_mut(object.handle) {
                r.in_sync = true;
            }
        }
        pass.next.lights.insert(id);
        Ok(())
    }

    /// Handle inbound messages that are already waiting.
    ///
    /// Each receive waits at most `bound`; returns once nothing arrives
    /// within it. Returns the number of messages handled.
    pub fn pump(&mut self, bound: Duration, mut handler: impl FnMut(&FromServer)) -> Result<usize, SessionError> {
        let mut handled = 0;
        while let Some(msg) = self.conn.receive_message(Some(bound))? {
            if let FromServer::Unknown { kind, .. } = &msg {
                debug!(kind, "unknown message while pumping");
            }
            handler(&msg);
            handled += 1;
        }
        Ok(handled)
    }

    /// Send a render request; with `want_result`, block until the pixels
    /// arrive.
    ///
    /// Messages other than the result go to `on_other`. `deadline` bounds
    /// the whole wait.
    pub fn request_render(
        &mut self,
        request: &RenderRequest,
        deadline: Option<Duration>,
        on_other: impl FnMut(&FromServer),
    ) -> Result<Option<ResultPayload>, SessionError> {
        let payload = request.to_payload()?;
        self.send(&FromClient::Render(payload))?;
        if !request.want_result {
            return Ok(None);
        }
        await_result(&mut self.conn, deadline, on_other).map(Some)
    }
}
