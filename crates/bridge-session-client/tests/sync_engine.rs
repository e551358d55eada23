// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
mod common;

use std::cell::Cell;
use std::time::Duration;

use bridge_scene_codec::{cube_mesh, translation, MockRenderer, MockScene, IDENTITY};
use bridge_scene_port::{
    EntityId, HostScene, IdWidth, LightKind, LightParams, ObjectHandle, PortError, SceneObject,
    SourceMesh, SpotCone,
};
use bridge_session_client::FrameCounter;
use bridge_session_proto::wire::encode_server_message;
use bridge_session_proto::{ClientKind, FromClient, FromServer};
use common::{engine, kinds};

const W: IdWidth = IdWidth::Narrow;

fn item_remove(mesh: u64, object: u64) -> FromClient {
    FromClient::ItemRemove {
        mesh_id: EntityId(mesh),
        object_id: EntityId(object),
    }
}

fn item_ids(msg: &FromClient) -> Option<(EntityId, EntityId)> {
    match msg {
        FromClient::Item(item) => Some((item.mesh_id, item.object_id)),
        _ => None,
    }
}

/// Host whose next `failures` mesh evaluations fail.
struct FlakyHost {
    scene: MockScene,
    failures: Cell<u32>,
}

impl HostScene for FlakyHost {
    fn objects(&self) -> &[SceneObject] {
        self.scene.objects()
    }

    fn evaluate_mesh(&self, object: ObjectHandle) -> Result<SourceMesh, PortError> {
        let left = self.failures.get();
        if left > 0 {
            self.failures.set(left - 1);
            return Err(PortError::Evaluation("not ready".into()));
        }
        self.scene.evaluate_mesh(object)
    }
}

#[test]
fn unchanged_scene_goes_quiet_after_first_pass() {
    let (mut engine, stream) = engine(W);
    let mut scene = MockScene::new();
    let mesh = scene.add_mesh("Cube", cube_mesh());
    let cube = scene.add_mesh_object("Cube", mesh, IDENTITY);

    let report = engine.sync_pass(&scene).unwrap();
    let sent = stream.take_sent(W);
    assert_eq!(kinds(&sent), vec![ClientKind::Mesh, ClientKind::Item]);
    assert_eq!(report.messages(), 2);
    assert_eq!(item_ids(&sent[1]), Some((EntityId(1), EntityId(1))));
    scene.end_pass();

    for _ in 0..3 {
        let report = engine.sync_pass(&scene).unwrap();
        assert_eq!(report.messages(), 0);
        assert!(stream.take_sent(W).is_empty());
        scene.end_pass();
    }
    assert_eq!(engine.registry().object(cube).unwrap().id, EntityId(1));
}

#[test]
fn rename_sends_one_removal_then_resends_under_new_id() {
    let (mut engine, stream) = engine(W);
    let mut scene = MockScene::new();
    let mesh = scene.add_mesh("Cube", cube_mesh());
    let cube = scene.add_mesh_object("Cube", mesh, IDENTITY);
    engine.sync_pass(&scene).unwrap();
    scene.end_pass();
    stream.take_sent(W);

    scene.rename(cube, "Hero");
    engine.sync_pass(&scene).unwrap();
    let sent = stream.take_sent(W);
    assert_eq!(
        kinds(&sent),
        vec![ClientKind::ItemRemove, ClientKind::Mesh, ClientKind::Item]
    );
    assert_eq!(sent[0], item_remove(1, 1));
    assert_eq!(item_ids(&sent[2]), Some((EntityId(2), EntityId(2))));
    let record = engine.registry().object(cube).unwrap();
    assert_eq!((record.id, record.name.as_str()), (EntityId(2), "Hero"));
    scene.end_pass();

    engine.sync_pass(&scene).unwrap();
    assert!(stream.take_sent(W).is_empty());
}

#[test]
fn duplication_removes_every_holder_of_the_stale_id() {
    let (mut engine, stream) = engine(W);
    let mut scene = MockScene::new();
    let mesh = scene.add_mesh("Cube", cube_mesh());
    let original = scene.add_mesh_object("Cube", mesh, IDENTITY);
    engine.sync_pass(&scene).unwrap();
    scene.end_pass();
    stream.take_sent(W);

    let copy = scene.duplicate(original, "Cube.001").unwrap();
    engine.sync_pass(&scene).unwrap();
    let sent = stream.take_sent(W);
    let removals: Vec<_> = sent
        .iter()
        .filter(|m| m.kind() == ClientKind::ItemRemove)
        .collect();
    assert_eq!(removals, vec![&item_remove(1, 1), &item_remove(1, 1)]);
    assert_eq!(sent.last().and_then(item_ids), Some((EntityId(2), EntityId(2))));
    scene.end_pass();

    // The original comes back under its own fresh id; the stale id is gone.
    engine.sync_pass(&scene).unwrap();
    let sent = stream.take_sent(W);
    assert_eq!(kinds(&sent), vec![ClientKind::Item]);
    assert_eq!(item_ids(&sent[0]), Some((EntityId(2), EntityId(3))));
    let a = engine.registry().object(original).unwrap().id;
    let b = engine.registry().object(copy).unwrap().id;
    assert_ne!(a, b);
    assert!(!engine.active().items.iter().any(|(_, o)| *o == EntityId(1)));
}

#[test]
fn same_name_duplicate_is_a_collision_resolved_with_fresh_ids() {
    let (mut engine, stream) = engine(W);
    let mut scene = MockScene::new();
    let mesh = scene.add_mesh("Cube", cube_mesh());
    let original = scene.add_mesh_object("Cube", mesh, IDENTITY);
    engine.sync_pass(&scene).unwrap();
    scene.end_pass();
    stream.take_sent(W);

    let copy = scene.duplicate(original, "Cube").unwrap();
    let report = engine.sync_pass(&scene).unwrap();
    assert_eq!(report.collisions.len(), 1);
    assert_eq!(report.collisions[0].id, EntityId(1));
    assert_eq!(report.collisions[0].second, copy);
    let sent = stream.take_sent(W);
    assert_eq!(
        sent.iter().filter(|m| m.kind() == ClientKind::ItemRemove).count(),
        2
    );
    assert_eq!(engine.registry().object(copy).unwrap().id, EntityId(2));
}

#[test]
fn shared_mesh_is_uploaded_once_per_pass() {
    let (mut engine, stream) = engine(W);
    let mut scene = MockScene::new();
    let mesh = scene.add_mesh("Rock", cube_mesh());
    for i in 0..4u8 {
        scene.add_mesh_object(&format!("Rock.{i}"), mesh, translation(f32::from(i), 0.0, 0.0));
    }

    engine.sync_pass(&scene).unwrap();
    let sent = stream.take_sent(W);
    assert_eq!(sent.iter().filter(|m| m.kind() == ClientKind::Mesh).count(), 1);
    assert_eq!(sent.iter().filter(|m| m.kind() == ClientKind::Item).count(), 4);
    assert!(sent
        .iter()
        .filter_map(item_ids)
        .all(|(mesh_id, _)| mesh_id == EntityId(1)));
    scene.end_pass();

    // Editing the shared geometry re-uploads it once; items are untouched.
    let mut bigger = cube_mesh();
    bigger.positions.iter_mut().for_each(|p| p[0] *= 2.0);
    scene.edit_mesh(mesh, bigger);
    engine.sync_pass(&scene).unwrap();
    assert_eq!(kinds(&stream.take_sent(W)), vec![ClientKind::Mesh]);
}

#[test]
fn modifiers_get_a_private_stable_mesh_id() {
    let (mut engine, stream) = engine(W);
    let mut scene = MockScene::new();
    let mesh = scene.add_mesh("Cube", cube_mesh());
    scene.add_mesh_object("Plain", mesh, IDENTITY);
    let bent = scene.add_mesh_object("Bent", mesh, translation(3.0, 0.0, 0.0));
    let mut squashed = cube_mesh();
    squashed.positions.iter_mut().for_each(|p| p[2] *= 0.5);
    scene.set_modifiers(bent, Some(squashed));

    engine.sync_pass(&scene).unwrap();
    let sent = stream.take_sent(W);
    let meshes: Vec<_> = sent
        .iter()
        .filter_map(|m| match m {
            FromClient::Mesh(mesh) => Some((mesh.mesh_id, mesh.name.clone())),
            _ => None,
        })
        .collect();
    let synthetic = EntityId::synthetic_mesh(EntityId(2), W);
    assert_eq!(
        meshes,
        vec![
            (EntityId(1), "Cube".to_string()),
            (synthetic, "##internal##_Bent".to_string()),
        ]
    );
    assert!(synthetic.is_synthetic(W));
    scene.end_pass();

    // Moving the object resends the item under the same synthetic id.
    scene.set_world(bent, translation(4.0, 0.0, 0.0));
    engine.sync_pass(&scene).unwrap();
    let sent = stream.take_sent(W);
    assert_eq!(kinds(&sent), vec![ClientKind::Item]);
    assert_eq!(item_ids(&sent[0]), Some((synthetic, EntityId(2))));
}

#[test]
fn gaining_modifiers_relinks_the_item() {
    let (mut engine, stream) = engine(W);
    let mut scene = MockScene::new();
    let mesh = scene.add_mesh("Cube", cube_mesh());
    let cube = scene.add_mesh_object("Cube", mesh, IDENTITY);
    engine.sync_pass(&scene).unwrap();
    scene.end_pass();
    stream.take_sent(W);

    scene.set_modifiers(cube, Some(cube_mesh()));
    engine.sync_pass(&scene).unwrap();
    let sent = stream.take_sent(W);
    let synthetic = EntityId::synthetic_mesh(EntityId(1), W);
    assert_eq!(
        kinds(&sent),
        vec![ClientKind::Mesh, ClientKind::ItemRemove, ClientKind::Item]
    );
    assert_eq!(sent[1], item_remove(1, 1));
    assert_eq!(item_ids(&sent[2]), Some((synthetic, EntityId(1))));
    assert_eq!(
        engine.active().items.iter().copied().collect::<Vec<_>>(),
        vec![(synthetic, EntityId(1))]
    );
}

#[test]
fn disappearance_yields_exactly_one_removal() {
    let (mut engine, stream) = engine(W);
    let mut scene = MockScene::new();
    let mesh = scene.add_mesh("Cube", cube_mesh());
    let a = scene.add_mesh_object("A", mesh, IDENTITY);
    let b = scene.add_mesh_object("B", mesh, translation(2.0, 0.0, 0.0));
    engine.sync_pass(&scene).unwrap();
    scene.end_pass();
    stream.take_sent(W);

    scene.remove(b);
    scene.set_visible(a, false);
    let report = engine.sync_pass(&scene).unwrap();
    assert_eq!(report.removals, 2);
    let mut sent = stream.take_sent(W);
    sent.sort_by_key(|m| format!("{m:?}"));
    assert_eq!(sent, vec![item_remove(1, 1), item_remove(1, 2)]);
    scene.end_pass();

    engine.sync_pass(&scene).unwrap();
    assert!(stream.take_sent(W).is_empty());
    scene.end_pass();

    // Showing it again resends the item but not the shared mesh.
    scene.set_visible(a, true);
    engine.sync_pass(&scene).unwrap();
    let sent = stream.take_sent(W);
    assert_eq!(kinds(&sent), vec![ClientKind::Item]);
    assert_eq!(item_ids(&sent[0]), Some((EntityId(1), EntityId(1))));
}

#[test]
fn hidden_edit_reuploads_mesh_on_reappearance() {
    let (mut engine, stream) = engine(W);
    let mut scene = MockScene::new();
    let mesh = scene.add_mesh("Cube", cube_mesh());
    let a = scene.add_mesh_object("A", mesh, IDENTITY);
    engine.sync_pass(&scene).unwrap();
    scene.end_pass();

    scene.set_visible(a, false);
    scene.touch_data(a);
    engine.sync_pass(&scene).unwrap();
    scene.end_pass();
    stream.take_sent(W);

    scene.set_visible(a, true);
    engine.sync_pass(&scene).unwrap();
    assert_eq!(
        kinds(&stream.take_sent(W)),
        vec![ClientKind::Mesh, ClientKind::Item]
    );
}

#[test]
fn lights_resend_when_dirty_and_skip_unsupported_kinds() {
    let (mut engine, stream) = engine(W);
    let mut scene = MockScene::new();
    let lamp = scene.add_light("Lamp", LightParams::default(), translation(0.0, 0.0, 3.0));
    let spot_params = LightParams {
        kind: LightKind::Spot,
        spot: SpotCone {
            size: 0.8,
            blend: 0.2,
            falloff: 1.5,
        },
        ..LightParams::default()
    };
    scene.add_light("Spot", spot_params, IDENTITY);
    let area = scene.add_light(
        "Panel",
        LightParams {
            kind: LightKind::Area,
            ..LightParams::default()
        },
        IDENTITY,
    );

    engine.sync_pass(&scene).unwrap();
    let sent = stream.take_sent(W);
    assert_eq!(kinds(&sent), vec![ClientKind::Light, ClientKind::Light]);
    let FromClient::Light(spot) = &sent[1] else {
        panic!("expected light");
    };
    assert_eq!(spot.spot, Some(spot_params.spot));
    assert_eq!(spot.position, [0.0, 0.0, 0.0]);
    assert!(engine.registry().object(area).is_none());
    scene.end_pass();

    scene.set_light(
        lamp,
        LightParams {
            energy: 5.0,
            ..LightParams::default()
        },
    );
    engine.sync_pass(&scene).unwrap();
    let sent = stream.take_sent(W);
    let FromClient::Light(updated) = &sent[0] else {
        panic!("expected light");
    };
    assert_eq!(sent.len(), 1);
    assert_eq!((updated.object_id, updated.energy), (EntityId(1), 5.0));
    scene.end_pass();

    scene.remove(lamp);
    engine.sync_pass(&scene).unwrap();
    assert_eq!(
        stream.take_sent(W),
        vec![FromClient::LightRemove {
            object_id: EntityId(1)
        }]
    );
}

#[test]
fn frame_counter_wraps_to_one() {
    let (mut engine, _stream) = engine(W);
    let scene = MockScene::new();
    engine.set_frame(FrameCounter::at(2_147_483_647));
    let report = engine.sync_pass(&scene).unwrap();
    assert_eq!(report.frame, 2_147_483_647);
    assert_eq!(engine.frame(), 1);
}

#[test]
fn reset_restarts_identities_and_peer_state() {
    let (mut engine, stream) = engine(W);
    let mut scene = MockScene::demo();
    engine.sync_pass(&scene).unwrap();
    scene.end_pass();

    let mut peer = MockRenderer::new();
    for msg in stream.take_sent(W) {
        peer.apply(&msg);
    }
    assert_eq!(peer.items.len(), 3);
    assert_eq!(peer.lights.len(), 3);
    assert!(peer.dangling_items().is_empty());

    engine.reset().unwrap();
    assert_eq!(engine.registry().object_count(), 0);
    engine.sync_pass(&scene).unwrap();
    for msg in stream.take_sent(W) {
        peer.apply(&msg);
    }
    assert_eq!(peer.count(ClientKind::Reset), 1);
    assert_eq!(peer.items.len(), 3);
    assert!(peer.items.contains_key(&EntityId(1)));
    assert_eq!(peer.stale_removals, 0);
}

#[test]
fn wide_ids_use_the_64_bit_sentinel() {
    let width = IdWidth::Wide;
    let (mut engine, stream) = engine(width);
    let mut scene = MockScene::new();
    let mesh = scene.add_mesh("Cube", cube_mesh());
    let cube = scene.add_mesh_object("Cube", mesh, IDENTITY);
    scene.set_modifiers(cube, Some(cube_mesh()));
    engine.sync_pass(&scene).unwrap();
    let sent = stream.take_sent(width);
    assert_eq!(
        item_ids(&sent[1]),
        Some((EntityId((1 << 63) | 1), EntityId(1)))
    );
}

#[test]
fn unencodable_mesh_is_skipped_without_aborting_the_pass() {
    let (mut engine, stream) = engine(W);
    let mut scene = MockScene::new();
    let good = scene.add_mesh("Good", cube_mesh());
    let mut broken = cube_mesh();
    broken.faces[0].corners.truncate(2);
    let bad = scene.add_mesh("Bad", broken);
    let bad_obj = scene.add_mesh_object("Bad", bad, IDENTITY);
    scene.add_mesh_object("Good", good, IDENTITY);

    let report = engine.sync_pass(&scene).unwrap();
    assert_eq!(report.rejected, vec![bad_obj]);
    assert_eq!(
        kinds(&stream.take_sent(W)),
        vec![ClientKind::Mesh, ClientKind::Item]
    );
}

#[test]
fn pump_drains_buffered_messages() {
    let (mut engine, stream) = engine(W);
    let unknown = FromServer::Unknown {
        kind: 42,
        payload: vec![1, 2, 3],
    };
    stream.push_inbound(&encode_server_message(&unknown).unwrap());
    stream.push_inbound(&encode_server_message(&unknown).unwrap());
    let mut seen = Vec::new();
    let handled = engine
        .pump(Duration::from_millis(1), |m| seen.push(m.clone()))
        .unwrap();
    assert_eq!(handled, 2);
    assert_eq!(seen, vec![unknown.clone(), unknown]);
    assert_eq!(engine.pump(Duration::from_millis(1), |_| {}).unwrap(), 0);
}

#[test]
fn undeleted_object_is_resent_under_a_fresh_id() {
    let (mut engine, stream) = engine(W);
    let mut scene = MockScene::new();
    let mesh = scene.add_mesh("Cube", cube_mesh());
    let cube = scene.add_mesh_object("Cube", mesh, IDENTITY);
    engine.sync_pass(&scene).unwrap();
    scene.end_pass();
    stream.take_sent(W);

    let snapshot = scene.object(cube).unwrap().clone();
    scene.remove(cube);
    engine.sync_pass(&scene).unwrap();
    assert_eq!(stream.take_sent(W), vec![item_remove(1, 1)]);
    assert!(engine.registry().object(cube).is_none());
    scene.end_pass();

    // Undo brings the same handle back with no change flags set.
    scene.restore(snapshot);
    engine.sync_pass(&scene).unwrap();
    let sent = stream.take_sent(W);
    assert_eq!(kinds(&sent), vec![ClientKind::Item]);
    assert_eq!(item_ids(&sent[0]), Some((EntityId(1), EntityId(2))));
    assert!(engine.active().items.contains(&(EntityId(1), EntityId(2))));
    scene.end_pass();

    engine.sync_pass(&scene).unwrap();
    assert!(stream.take_sent(W).is_empty());
}

#[test]
fn rejected_update_is_retried_on_the_next_pass() {
    let (mut engine, stream) = engine(W);
    let mut host = FlakyHost {
        scene: MockScene::new(),
        failures: Cell::new(0),
    };
    let mesh = host.scene.add_mesh("Cube", cube_mesh());
    let cube = host.scene.add_mesh_object("Cube", mesh, IDENTITY);
    engine.sync_pass(&host).unwrap();
    host.scene.end_pass();
    stream.take_sent(W);

    host.scene.edit_mesh(mesh, cube_mesh());
    host.failures.set(1);
    let report = engine.sync_pass(&host).unwrap();
    assert_eq!(report.rejected, vec![cube]);
    assert!(stream.take_sent(W).is_empty());
    assert!(engine.active().items.contains(&(EntityId(1), EntityId(1))));
    host.scene.end_pass();

    // No flags left, but the edit never reached the peer.
    let report = engine.sync_pass(&host).unwrap();
    assert!(report.rejected.is_empty());
    let sent = stream.take_sent(W);
    assert_eq!(kinds(&sent), vec![ClientKind::Mesh, ClientKind::Item]);
    assert_eq!(item_ids(&sent[1]), Some((EntityId(1), EntityId(1))));
    host.scene.end_pass();

    engine.sync_pass(&host).unwrap();
    assert!(stream.take_sent(W).is_empty());
}

#[test]
fn renaming_an_object_the_peer_never_got_sends_no_removal() {
    let (mut engine, stream) = engine(W);
    let mut scene = MockScene::new();
    let mut broken = cube_mesh();
    broken.faces[0].corners.truncate(2);
    let mesh = scene.add_mesh("Bad", broken);
    let obj = scene.add_mesh_object("Bad", mesh, IDENTITY);
    let report = engine.sync_pass(&scene).unwrap();
    assert_eq!(report.rejected, vec![obj]);
    assert!(stream.take_sent(W).is_empty());
    scene.end_pass();

    scene.rename(obj, "Fixed");
    scene.edit_mesh(mesh, cube_mesh());
    let report = engine.sync_pass(&scene).unwrap();
    assert_eq!(report.removals, 0);
    let sent = stream.take_sent(W);
    assert_eq!(kinds(&sent), vec![ClientKind::Mesh, ClientKind::Item]);
    assert_eq!(item_ids(&sent[1]), Some((EntityId(2), EntityId(2))));
}
