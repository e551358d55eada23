// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Mesh deduplication and test harness for the scene bridge.
//!
//! This crate provides:
//! - [`deduplicate`]: triangulate host polygons and merge identical
//!   face-vertices into a wire-ready vertex buffer
//! - [`MockScene`]: an in-memory [`bridge_scene_port::HostScene`] for tests
//!   and demos
//! - [`MockRenderer`]: a headless peer that applies decoded client messages
//!   to HashMaps and answers render requests with a flat framebuffer

mod dedup;
mod mock_renderer;
mod mock_scene;

pub use dedup::*;
pub use mock_renderer::*;
pub use mock_scene::*;
