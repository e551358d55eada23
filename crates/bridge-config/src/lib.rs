// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Configuration for scene bridge tools.
//!
//! [`ConfigService`] serialises values as JSON and hands the bytes to a
//! [`ConfigStore`]. [`FsConfigStore`] keeps them as files under the platform
//! config directory. [`SessionPrefs`] is the one value the bridge persists.

pub mod config;
mod fs_store;
mod prefs;

pub use config::{ConfigError, ConfigService, ConfigStore};
pub use fs_store::FsConfigStore;
pub use prefs::{IdWidthPref, SessionPrefs, PREFS_KEY};
