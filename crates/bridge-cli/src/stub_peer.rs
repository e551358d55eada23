// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Stub renderer peer backed by [`MockRenderer`].
//!
//! Every accepted client gets its own renderer state. Frames are decoded as
//! they complete, applied, and render requests with `want_result` are
//! answered with a flat framebuffer.

use anyhow::Result;
use bridge_scene_codec::MockRenderer;
use bridge_session_proto::wire::{decode_client_payload, encode_server_message, split_frame};
use bridge_session_proto::{ClientKind, IdWidth, WireError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 64 * 1024;

/// Accept clients forever.
pub async fn serve(listener: TcpListener, width: IdWidth, max_payload: u32) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "client connected");
        tokio::spawn(async move {
            match handle_client(stream, width, max_payload).await {
                Ok(renderer) => info!(
                    %peer,
                    messages = renderer.total(),
                    meshes = renderer.meshes.len(),
                    items = renderer.items.len(),
                    lights = renderer.lights.len(),
                    "client disconnected"
                ),
                Err(err) => warn!(?err, %peer, "client handler error"),
            }
        });
    }
}

/// Serve one client until it hangs up; returns the final renderer state.
async fn handle_client(mut stream: TcpStream, width: IdWidth, max_payload: u32) -> Result<MockRenderer> {
    stream.set_nodelay(true)?;
    let mut renderer = MockRenderer::new();
    let mut pending: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            if !pending.is_empty() {
                warn!(left = pending.len(), "client closed mid-frame");
            }
            return Ok(renderer);
        }
        pending.extend_from_slice(&chunk[..n]);

        let mut consumed = 0;
        while let Some((header, payload, used)) = split_frame(&pending[consumed..], max_payload)? {
            match decode_client_payload(header.kind, payload, width) {
                Ok(msg) => {
                    if msg.kind() == ClientKind::Reset {
                        debug!("client reset");
                    }
                    if let Some(reply) = renderer.apply(&msg) {
                        let bytes = encode_server_message(&reply)?;
                        stream.write_all(&bytes).await?;
                    }
                }
                Err(WireError::UnknownKind(kind)) => {
                    debug!(kind, size = header.payload_size, "skipping unknown message");
                }
                Err(err) => return Err(err.into()),
            }
            consumed += used;
        }
        pending.drain(..consumed);
    }
}
