// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Frame layout and message encode/decode.
//!
//! Frame layout:
//!
//! ``PAYLOAD_SIZE(4) || MESSAGE_TYPE(2) || PAYLOAD``
//!
//! * PAYLOAD_SIZE counts payload bytes only (the header is not included).
//! * Unknown MESSAGE_TYPE values are skippable using PAYLOAD_SIZE alone.

use bridge_scene_port::{IdWidth, LightKind, SpotCone, WireVertex};
use thiserror::Error;

use crate::codec::{CodecError, Reader, Writer, MAX_NAME_BYTES};
use crate::{
    ClientKind, FromClient, FromServer, ItemPayload, LightPayload, MeshPayload, RenderPayload,
    ResultPayload, ServerKind,
};

/// Encoded header length in bytes.
pub const HEADER_LEN: usize = 6;

/// Default bound on inbound payload size (256 MiB; a 4K RGBA frame is ~33 MiB).
pub const DEFAULT_MAX_PAYLOAD: u32 = 256 * 1024 * 1024;

/// Errors from framing or message decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Payload encoding or decoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Declared payload size exceeds the configured bound.
    #[error("payload of {size} bytes exceeds bound of {max}")]
    PayloadTooLarge {
        /// Declared or actual payload size.
        size: u64,
        /// Configured bound.
        max: u32,
    },
    /// The stream ended inside a frame.
    #[error("truncated frame: read {got} of {expected} bytes")]
    Truncated {
        /// Bytes the frame announced.
        expected: usize,
        /// Bytes actually read.
        got: usize,
    },
    /// A client message type this decoder does not know.
    #[error("unknown client message type {0}")]
    UnknownKind(u16),
}

/// Fixed-size message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload bytes following the header.
    pub payload_size: u32,
    /// Raw message type.
    pub kind: u16,
}

impl FrameHeader {
    /// Encode the header.
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.payload_size.to_le_bytes());
        out[4..6].copy_from_slice(&self.kind.to_le_bytes());
        out
    }

    /// Decode a header.
    pub fn from_bytes(bytes: [u8; HEADER_LEN]) -> Self {
        Self {
            payload_size: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            kind: u16::from_le_bytes([bytes[4], bytes[5]]),
        }
    }

    /// Reject headers announcing more than `max` payload bytes.
    pub fn check(self, max: u32) -> Result<Self, WireError> {
        if self.payload_size > max {
            return Err(WireError::PayloadTooLarge {
                size: u64::from(self.payload_size),
                max,
            });
        }
        Ok(self)
    }
}

/// Prefix `payload` with a header for `kind`.
pub fn encode_frame(kind: u16, payload: &[u8]) -> Result<Vec<u8>, WireError> {
    let payload_size = u32::try_from(payload.len()).map_err(|_| WireError::PayloadTooLarge {
        size: payload.len() as u64,
        max: u32::MAX,
    })?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&FrameHeader { payload_size, kind }.to_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Split one complete frame off the front of an accumulation buffer.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the header, the
/// payload view and the total number of bytes consumed.
pub fn split_frame(bytes: &[u8], max: u32) -> Result<Option<(FrameHeader, &[u8], usize)>, WireError> {
    let Some(head) = bytes.get(..HEADER_LEN) else {
        return Ok(None);
    };
    let mut raw = [0u8; HEADER_LEN];
    raw.copy_from_slice(head);
    let header = FrameHeader::from_bytes(raw).check(max)?;
    let end = HEADER_LEN + header.payload_size as usize;
    match bytes.get(HEADER_LEN..end) {
        Some(payload) => Ok(Some((header, payload, end))),
        None => Ok(None),
    }
}

// --- Client messages ---------------------------------------------------------

/// Encode the payload of a client message (no header).
///
/// Nothing is produced on error, so a rejected message never reaches the
/// stream half-written.
pub fn encode_client_payload(msg: &FromClient, width: IdWidth) -> Result<Vec<u8>, CodecError> {
    let mut w = Writer::default();
    match msg {
        FromClient::Reset => {}
        FromClient::Mesh(mesh) => encode_mesh(&mut w, mesh, width)?,
        FromClient::Item(item) => {
            w.write_id(item.mesh_id, width)?;
            w.write_id(item.object_id, width)?;
            w.write_string(&item.name, MAX_NAME_BYTES)?;
            w.write_f32s(&item.position);
            w.write_f32s(&item.rotation);
            w.write_f32s(&item.scale);
        }
        FromClient::ItemRemove { mesh_id, object_id } => {
            w.write_id(*mesh_id, width)?;
            w.write_id(*object_id, width)?;
        }
        FromClient::Light(light) => encode_light(&mut w, light, width)?,
        FromClient::LightRemove { object_id } => w.write_id(*object_id, width)?,
        FromClient::Render(render) => {
            w.write_bool(render.want_result);
            w.write_i64_le(render.viewport_id);
            w.write_u16_le(render.width);
            w.write_u16_le(render.height);
            w.write_f32_le(render.lens);
            w.write_f32_le(render.clip_start);
            w.write_f32_le(render.clip_end);
            w.write_f32s(&render.cam_pos);
            w.write_f32s(&render.cam_up);
            w.write_f32s(&render.cam_right);
            w.write_f32s(&render.cam_forward);
            w.write_bool(render.is_perspective);
        }
    }
    Ok(w.into_vec())
}

fn encode_mesh(w: &mut Writer, mesh: &MeshPayload, width: IdWidth) -> Result<(), CodecError> {
    let count = u32::try_from(mesh.vertices.len())
        .map_err(|_| CodecError::TooManyVertices(mesh.vertices.len()))?;
    w.write_id(mesh.mesh_id, width)?;
    w.write_string(&mesh.name, MAX_NAME_BYTES)?;
    w.write_u32_le(count);
    w.write_bool(mesh.has_vertex_color);
    w.write_u8(mesh.uv_channels);
    for (index, vertex) in mesh.vertices.iter().enumerate() {
        w.write_vertex(vertex, mesh.uv_channels, mesh.has_vertex_color)
            .map_err(|_| CodecError::VertexLayoutMismatch { index })?;
    }
    for material in &mesh.materials {
        w.write_u16_le(*material);
    }
    Ok(())
}

fn encode_light(w: &mut Writer, light: &LightPayload, width: IdWidth) -> Result<(), CodecError> {
    let code = light
        .kind
        .wire_code()
        .ok_or(CodecError::UnsupportedLight(light.kind))?;
    w.write_id(light.object_id, width)?;
    w.write_string(&light.name, MAX_NAME_BYTES)?;
    w.write_u8(code);
    w.write_bool(light.cast_shadow);
    w.write_bool(light.use_negative);
    w.write_f32s(&light.color);
    w.write_f32_le(light.energy);
    w.write_f32s(&light.position);
    w.write_f32s(&light.rotation);
    w.write_f32_le(light.radius);
    w.write_f32_le(light.radius_threshold);
    if light.kind == LightKind::Spot {
        let spot = light.spot.unwrap_or_default();
        w.write_f32s(&[spot.size, spot.blend, spot.falloff]);
    }
    Ok(())
}

/// Encode a full client frame (header + payload).
pub fn encode_client_message(msg: &FromClient, width: IdWidth) -> Result<Vec<u8>, WireError> {
    let payload = encode_client_payload(msg, width)?;
    encode_frame(msg.kind().code(), &payload)
}

/// Decode a client payload of the given message type.
pub fn decode_client_payload(
    kind: u16,
    payload: &[u8],
    width: IdWidth,
) -> Result<FromClient, WireError> {
    let kind = ClientKind::from_code(kind).ok_or(WireError::UnknownKind(kind))?;
    let mut r = Reader::new(payload);
    let msg = match kind {
        ClientKind::Reset => FromClient::Reset,
        ClientKind::Mesh => FromClient::Mesh(decode_mesh(&mut r, width)?),
        ClientKind::Item => FromClient::Item(ItemPayload {
            mesh_id: r.read_id(width)?,
            object_id: r.read_id(width)?,
            name: r.read_string(MAX_NAME_BYTES)?,
            position: r.read_f32s()?,
            rotation: r.read_f32s()?,
            scale: r.read_f32s()?,
        }),
        ClientKind::ItemRemove => FromClient::ItemRemove {
            mesh_id: r.read_id(width)?,
            object_id: r.read_id(width)?,
        },
        ClientKind::Light => FromClient::Light(decode_light(&mut r, width)?),
        ClientKind::LightRemove => FromClient::LightRemove {
            object_id: r.read_id(width)?,
        },
        ClientKind::Render => FromClient::Render(RenderPayload {
            want_result: r.read_bool()?,
            viewport_id: r.read_i64_le()?,
            width: r.read_u16_le()?,
            height: r.read_u16_le()?,
            lens: r.read_f32_le()?,
            clip_start: r.read_f32_le()?,
            clip_end: r.read_f32_le()?,
            cam_pos: r.read_f32s()?,
            cam_up: r.read_f32s()?,
            cam_right: r.read_f32s()?,
            cam_forward: r.read_f32s()?,
            is_perspective: r.read_bool()?,
        }),
    };
    r.finish()?;
    Ok(msg)
}

fn decode_mesh(r: &mut Reader<'_>, width: IdWidth) -> Result<MeshPayload, CodecError> {
    let mesh_id = r.read_id(width)?;
    let name = r.read_string(MAX_NAME_BYTES)?;
    let count = r.read_u32_le()? as usize;
    let has_vertex_color = r.read_bool()?;
    let uv_channels = r.read_u8()?;
    let stride = WireVertex::stride(uv_channels, has_vertex_color);
    // Bound the allocation by what the payload can actually hold.
    if count.checked_mul(stride).is_none_or(|need| need > r.remaining()) {
        return Err(CodecError::OutOfBounds);
    }
    let mut vertices = Vec::with_capacity(count);
    for _ in 0..count {
        vertices.push(r.read_vertex(uv_channels, has_vertex_color)?);
    }
    if r.remaining() % 2 != 0 {
        return Err(CodecError::TrailingBytes(1));
    }
    let mut materials = Vec::with_capacity(r.remaining() / 2);
    while r.remaining() > 0 {
        materials.push(r.read_u16_le()?);
    }
    Ok(MeshPayload {
        mesh_id,
        name,
        has_vertex_color,
        uv_channels,
        vertices,
        materials,
    })
}

fn decode_light(r: &mut Reader<'_>, width: IdWidth) -> Result<LightPayload, CodecError> {
    let object_id = r.read_id(width)?;
    let name = r.read_string(MAX_NAME_BYTES)?;
    let kind = match r.read_u8()? {
        0 => LightKind::Sun,
        1 => LightKind::Point,
        2 => LightKind::Spot,
        other => return Err(CodecError::InvalidEnum(other)),
    };
    let cast_shadow = r.read_bool()?;
    let use_negative = r.read_bool()?;
    let color = r.read_f32s()?;
    let energy = r.read_f32_le()?;
    let position = r.read_f32s()?;
    let rotation = r.read_f32s()?;
    let radius = r.read_f32_le()?;
    let radius_threshold = r.read_f32_le()?;
    let spot = if kind == LightKind::Spot {
        let [size, blend, falloff] = r.read_f32s()?;
        Some(SpotCone {
            size,
            blend,
            falloff,
        })
    } else {
        None
    };
    Ok(LightPayload {
        object_id,
        name,
        kind,
        cast_shadow,
        use_negative,
        color,
        energy,
        position,
        rotation,
        radius,
        radius_threshold,
        spot,
    })
}

// --- Server messages ---------------------------------------------------------

/// Encode a full server frame (header + payload).
pub fn encode_server_message(msg: &FromServer) -> Result<Vec<u8>, WireError> {
    match msg {
        FromServer::Result(result) => {
            if result.pixels.len() != ResultPayload::expected_len(result.width, result.height) {
                return Err(CodecError::OutOfBounds.into());
            }
            let mut w = Writer::with_capacity(4 + result.pixels.len());
            w.write_u16_le(result.width);
            w.write_u16_le(result.height);
            w.write_bytes(&result.pixels);
            encode_frame(ServerKind::Result.code(), &w.into_vec())
        }
        FromServer::Unknown { kind, payload } => encode_frame(*kind, payload),
    }
}

/// Decode a server payload. Unknown types come back as [`FromServer::Unknown`].
pub fn decode_server_payload(kind: u16, payload: &[u8]) -> Result<FromServer, CodecError> {
    match ServerKind::from_code(kind) {
        Some(ServerKind::Result) => {
            let mut r = Reader::new(payload);
            let width = r.read_u16_le()?;
            let height = r.read_u16_le()?;
            let pixels = r
                .read_bytes(ResultPayload::expected_len(width, height))?
                .to_vec();
            r.finish()?;
            Ok(FromServer::Result(ResultPayload {
                width,
                height,
                pixels,
            }))
        }
        None => Ok(FromServer::Unknown {
            kind,
            payload: payload.to_vec(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_scene_port::EntityId;

    #[test]
    fn header_layout_is_size_then_type() {
        let header = FrameHeader {
            payload_size: 0x0102_0304,
            kind: 0x0506,
        };
        assert_eq!(header.to_bytes(), [0x04, 0x03, 0x02, 0x01, 0x06, 0x05]);
        assert_eq!(FrameHeader::from_bytes(header.to_bytes()), header);
    }

    #[test]
    fn reset_is_an_empty_frame() {
        let bytes = encode_client_message(&FromClient::Reset, IdWidth::Narrow).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn oversized_header_is_rejected() {
        let header = FrameHeader {
            payload_size: 1024,
            kind: 0,
        };
        assert_eq!(
            header.check(512),
            Err(WireError::PayloadTooLarge { size: 1024, max: 512 })
        );
    }

    #[test]
    fn split_frame_waits_for_complete_payload() {
        let frame = encode_client_message(
            &FromClient::LightRemove {
                object_id: EntityId(9),
            },
            IdWidth::Narrow,
        )
        .unwrap();
        assert_eq!(split_frame(&frame[..3], DEFAULT_MAX_PAYLOAD).unwrap(), None);
        assert_eq!(split_frame(&frame[..8], DEFAULT_MAX_PAYLOAD).unwrap(), None);

        let mut acc = frame.clone();
        acc.extend_from_slice(&frame);
        let (header, payload, used) = split_frame(&acc, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(header.kind, ClientKind::LightRemove.code());
        assert_eq!(payload, &9u32.to_le_bytes());
        assert_eq!(used, frame.len());
    }

    #[test]
    fn unknown_server_kind_is_preserved_not_rejected() {
        let msg = decode_server_payload(77, &[1, 2, 3]).unwrap();
        assert_eq!(
            msg,
            FromServer::Unknown {
                kind: 77,
                payload: vec![1, 2, 3]
            }
        );
    }

    #[test]
    fn short_result_pixels_are_rejected() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&2u16.to_le_bytes());
        payload.extend_from_slice(&2u16.to_le_bytes());
        payload.extend_from_slice(&[0u8; 15]);
        assert_eq!(
            decode_server_payload(ServerKind::Result.code(), &payload),
            Err(CodecError::OutOfBounds)
        );
    }

    #[test]
    fn unsupported_light_is_rejected_before_writing() {
        let light = LightPayload {
            object_id: EntityId(1),
            name: "area".into(),
            kind: LightKind::Area,
            cast_shadow: false,
            use_negative: false,
            color: [1.0; 3],
            energy: 1.0,
            position: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            radius: 1.0,
            radius_threshold: 0.1,
            spot: None,
        };
        assert_eq!(
            encode_client_payload(&FromClient::Light(light), IdWidth::Narrow),
            Err(CodecError::UnsupportedLight(LightKind::Area))
        );
    }

    #[test]
    fn unknown_client_kind_is_an_error_for_peers() {
        assert_eq!(
            decode_client_payload(42, &[], IdWidth::Narrow),
            Err(WireError::UnknownKind(42))
        );
    }
}
