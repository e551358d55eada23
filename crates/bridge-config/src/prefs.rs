// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Saved connection preferences.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Config key the prefs are stored under (`session.json`).
pub const PREFS_KEY: &str = "session";

/// Id width spoken with the peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdWidthPref {
    /// 32-bit ids.
    #[default]
    Narrow,
    /// 64-bit ids.
    Wide,
}

/// How to reach the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPrefs {
    /// Peer host.
    pub host: String,
    /// Peer port.
    pub port: u16,
    /// Connect bound in milliseconds.
    pub connect_timeout_ms: u64,
    /// Receive bound in milliseconds; absent blocks.
    pub receive_timeout_ms: Option<u64>,
    /// Largest inbound payload accepted.
    pub max_payload_bytes: u32,
    /// Id width.
    pub id_width: IdWidthPref,
}

impl Default for SessionPrefs {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9093,
            connect_timeout_ms: 5000,
            receive_timeout_ms: None,
            max_payload_bytes: 256 * 1024 * 1024,
            id_width: IdWidthPref::Narrow,
        }
    }
}

impl SessionPrefs {
    /// Reject values no connection could use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host is empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port 0".into()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid("connect timeout is zero".into()));
        }
        // A Result header plus one pixel must fit.
        if self.max_payload_bytes < 8 {
            return Err(ConfigError::Invalid(format!(
                "max payload of {} bytes is too small",
                self.max_payload_bytes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let prefs: SessionPrefs = serde_json::from_str(r#"{"port": 7000, "id_width": "wide"}"#).unwrap();
        assert_eq!(prefs.port, 7000);
        assert_eq!(prefs.id_width, IdWidthPref::Wide);
        assert_eq!(prefs.host, "127.0.0.1");
        assert_eq!(prefs.receive_timeout_ms, None);
    }

    #[test]
    fn validation_rejects_unusable_values() {
        assert!(SessionPrefs::default().validate().is_ok());
        let bad = SessionPrefs {
            port: 0,
            ..SessionPrefs::default()
        };
        assert!(matches!(bad.validate(), Err(ConfigError::Invalid(_))));
        let tiny = SessionPrefs {
            max_payload_bytes: 4,
            ..SessionPrefs::default()
        };
        assert!(tiny.validate().is_err());
    }
}
