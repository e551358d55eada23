// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Demo client: sync [`MockScene::demo`] and pull one frame back.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bridge_scene_codec::{translation, MockScene};
use bridge_scene_port::{CameraSnapshot, HostScene, ProjectionKind};
use bridge_session_client::{ConnectOptions, RenderRequest, SyncEngine, ViewportId};
use bridge_session_proto::FromServer;
use glam::{Mat4, Vec3};
use tracing::{info, warn};

pub struct DemoSettings {
    pub passes: u32,
    pub width: u16,
    pub height: u16,
    pub render_timeout: Duration,
    pub out: Option<PathBuf>,
}

/// Camera looking at the origin from above and behind, Z up.
pub fn demo_camera(aspect: f32) -> CameraSnapshot {
    let view = Mat4::look_at_rh(Vec3::new(0.0, -12.0, 6.0), Vec3::ZERO, Vec3::Z);
    let proj = Mat4::perspective_rh(50f32.to_radians(), aspect, 0.1, 1000.0);
    CameraSnapshot {
        view_projection: (proj * view).to_cols_array(),
        lens: 50.0,
        clip_start: 0.1,
        clip_end: 1000.0,
        projection: ProjectionKind::Perspective,
    }
}

pub fn run(opts: &ConnectOptions, settings: &DemoSettings) -> Result<()> {
    let mut engine = SyncEngine::connect(opts).with_context(|| format!("connect {}:{}", opts.host, opts.port))?;
    let mut scene = MockScene::demo();
    let cube = scene
        .objects()
        .iter()
        .find(|o| o.name == "Cube")
        .map(|o| o.handle)
        .context("demo scene has no cube")?;

    let mut lift = 0.0f32;
    for pass in 0..settings.passes.max(1) {
        if pass > 0 {
            lift += 0.5;
            scene.set_world(cube, translation(0.0, 0.0, lift));
        }
        let report = engine.sync_pass(&scene)?;
        scene.end_pass();
        for collision in &report.collisions {
            warn!(%collision, "id collision");
        }
        info!(
            frame = report.frame,
            meshes = report.meshes,
            items = report.items,
            lights = report.lights,
            removals = report.removals,
            rejected = report.rejected.len(),
            "pass synced"
        );
    }

    let request = RenderRequest {
        viewport: ViewportId::from_label("scenebridge-demo"),
        camera: demo_camera(f32::from(settings.width) / f32::from(settings.height.max(1))),
        width: settings.width,
        height: settings.height,
        want_result: true,
    };
    let result = engine
        .request_render(&request, Some(settings.render_timeout), |msg| {
            if let FromServer::Unknown { kind, payload } = msg {
                info!(kind, len = payload.len(), "ignoring message while waiting for frame");
            }
        })?
        .context("peer sent no frame")?;
    info!(width = result.width, height = result.height, "frame received");

    if let Some(path) = &settings.out {
        std::fs::write(path, &result.pixels).with_context(|| format!("write {}", path.display()))?;
        info!(path = %path.display(), bytes = result.pixels.len(), "raw RGBA written");
    }

    engine.close();
    Ok(())
}
