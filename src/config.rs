// ABOUTME: Bridge configuration: upstream endpoints, content markers, and timeouts
// ABOUTME: Builder-style BridgeConfig with environment and optional TOML file loading
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::env;
use std::num::ParseIntError;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default upstream session socket endpoint
const DEFAULT_SOCKET_URL: &str = "wss://api.enginelabs.ai/engine-agent/chat-socket";

/// Default upstream generation trigger endpoint
const DEFAULT_TRIGGER_URL: &str = "https://api.enginelabs.ai/engine-agent/chat";

/// Default `Origin` header sent on both upstream calls
const DEFAULT_ORIGIN: &str = "https://cto.new";

/// Default deadline for the listening phase (5 minutes)
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default socket handshake timeout
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Default trigger request timeout
const DEFAULT_TRIGGER_TIMEOUT_SECS: u64 = 30;

/// Default downstream chunk buffer
const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Text written around a marked content block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMarkers {
    /// Emitted when a markable kind begins
    pub open: String,
    /// Emitted when a markable kind ends
    pub close: String,
}

impl Default for ContentMarkers {
    fn default() -> Self {
        Self {
            open: "<think>\n".to_owned(),
            close: "\n</think>\n\n".to_owned(),
        }
    }
}

/// Configuration shared by every bridge invocation
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Base WebSocket URL; session parameters are appended as query pairs
    pub socket_url: String,
    /// HTTP endpoint that starts generation for a session
    pub trigger_url: String,
    /// `Origin` header for the handshake and the trigger call
    pub origin: Option<String>,
    /// Content kinds wrapped in open/close markers
    pub markable_kinds: Vec<String>,
    /// Marker text
    pub markers: ContentMarkers,
    /// Deadline for the listening phase (`None` waits forever)
    pub timeout: Option<Duration>,
    /// Deadline for the socket handshake
    pub connect_timeout: Duration,
    /// Deadline for the trigger request
    pub trigger_timeout: Duration,
    /// Number of encoded chunks buffered ahead of a slow downstream reader
    pub channel_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            socket_url: DEFAULT_SOCKET_URL.to_owned(),
            trigger_url: DEFAULT_TRIGGER_URL.to_owned(),
            origin: Some(DEFAULT_ORIGIN.to_owned()),
            markable_kinds: default_markable_kinds(),
            markers: ContentMarkers::default(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            trigger_timeout: Duration::from_secs(DEFAULT_TRIGGER_TIMEOUT_SECS),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl BridgeConfig {
    /// Create a configuration for the given upstream endpoints
    #[must_use]
    pub fn new(socket_url: impl Into<String>, trigger_url: impl Into<String>) -> Self {
        Self {
            socket_url: socket_url.into(),
            trigger_url: trigger_url.into(),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SOCKBRIDGE_SOCKET_URL`: upstream WebSocket endpoint
    /// - `SOCKBRIDGE_TRIGGER_URL`: upstream trigger endpoint
    /// - `SOCKBRIDGE_ORIGIN`: `Origin` header (empty disables it)
    /// - `SOCKBRIDGE_MARKABLE_KINDS`: comma-separated markable kinds
    /// - `SOCKBRIDGE_MARKER_OPEN` / `SOCKBRIDGE_MARKER_CLOSE`: marker text
    /// - `SOCKBRIDGE_TIMEOUT_SECS`: listening deadline, `0` disables it
    /// - `SOCKBRIDGE_CONNECT_TIMEOUT_SECS`: handshake deadline
    /// - `SOCKBRIDGE_TRIGGER_TIMEOUT_SECS`: trigger request deadline
    ///
    /// Unparsable numeric values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = env::var("SOCKBRIDGE_SOCKET_URL") {
            config.socket_url = url;
        }
        if let Ok(url) = env::var("SOCKBRIDGE_TRIGGER_URL") {
            config.trigger_url = url;
        }
        if let Ok(origin) = env::var("SOCKBRIDGE_ORIGIN") {
            config.origin = Some(origin).filter(|o| !o.trim().is_empty());
        }
        if let Ok(kinds) = env::var("SOCKBRIDGE_MARKABLE_KINDS") {
            config.markable_kinds = parse_list(&kinds);
        }
        if let Ok(open) = env::var("SOCKBRIDGE_MARKER_OPEN") {
            config.markers.open = open;
        }
        if let Ok(close) = env::var("SOCKBRIDGE_MARKER_CLOSE") {
            config.markers.close = close;
        }
        if let Some(timeout) = env_duration("SOCKBRIDGE_TIMEOUT_SECS") {
            config.timeout = Some(timeout).filter(|t| !t.is_zero());
        }
        if let Some(timeout) = env_duration("SOCKBRIDGE_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout = timeout;
        }
        if let Some(timeout) = env_duration("SOCKBRIDGE_TRIGGER_TIMEOUT_SECS") {
            config.trigger_timeout = timeout;
        }

        config
    }

    /// Set the `Origin` header
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Send no `Origin` header
    #[must_use]
    pub fn without_origin(mut self) -> Self {
        self.origin = None;
        self
    }

    /// Set the markable content kinds
    #[must_use]
    pub fn with_markable_kinds(mut self, kinds: Vec<String>) -> Self {
        self.markable_kinds = kinds;
        self
    }

    /// Set the marker text
    #[must_use]
    pub fn with_markers(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.markers = ContentMarkers {
            open: open.into(),
            close: close.into(),
        };
        self
    }

    /// Set the listening deadline
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the handshake deadline
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the trigger request deadline
    #[must_use]
    pub const fn with_trigger_timeout(mut self, timeout: Duration) -> Self {
        self.trigger_timeout = timeout;
        self
    }

    /// Set the downstream chunk buffer size (minimum 1)
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// Default set of markable content kinds
#[must_use]
pub fn default_markable_kinds() -> Vec<String> {
    vec!["thinking".to_owned()]
}

/// Parse a comma-separated list, dropping empty entries
#[must_use]
pub fn parse_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Parse a timeout value from a string (in seconds)
///
/// # Errors
///
/// Returns an error if the string cannot be parsed as a `u64`.
pub fn parse_timeout(input: &str) -> Result<Duration, ParseIntError> {
    input.trim().parse::<u64>().map(Duration::from_secs)
}

fn env_duration(key: &str) -> Option<Duration> {
    env::var(key).ok().and_then(|v| parse_timeout(&v).ok())
}

// ============================================================================
// TOML file loading
// ============================================================================

#[cfg(feature = "config-file")]
mod file {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use serde::Deserialize;
    use tracing::debug;

    use super::{BridgeConfig, ContentMarkers};
    use crate::types::BridgeError;

    /// On-disk shape; every field is optional and overlays the defaults
    #[derive(Debug, Default, Deserialize)]
    #[serde(default, deny_unknown_fields)]
    struct FileConfig {
        socket_url: Option<String>,
        trigger_url: Option<String>,
        origin: Option<String>,
        markable_kinds: Option<Vec<String>>,
        markers: Option<ContentMarkers>,
        timeout_secs: Option<u64>,
        connect_timeout_secs: Option<u64>,
        trigger_timeout_secs: Option<u64>,
        channel_capacity: Option<usize>,
    }

    impl BridgeConfig {
        /// Load configuration from a TOML file, overlaying the defaults
        ///
        /// A `timeout_secs` of `0` disables the listening deadline and an
        /// empty `origin` disables the header.
        pub fn from_file(path: &Path) -> Result<Self, BridgeError> {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                BridgeError::config(format!("Failed to read {}: {e}", path.display()))
            })?;
            Self::from_toml_str(&raw)
        }

        /// Parse configuration from TOML text, overlaying the defaults
        pub fn from_toml_str(raw: &str) -> Result<Self, BridgeError> {
            let parsed: FileConfig = toml::from_str(raw)
                .map_err(|e| BridgeError::config(format!("Invalid config file: {e}")))?;

            let mut config = Self::default();
            if let Some(url) = parsed.socket_url {
                config.socket_url = url;
            }
            if let Some(url) = parsed.trigger_url {
                config.trigger_url = url;
            }
            if let Some(origin) = parsed.origin {
                config.origin = Some(origin).filter(|o| !o.trim().is_empty());
            }
            if let Some(kinds) = parsed.markable_kinds {
                config.markable_kinds = kinds;
            }
            if let Some(markers) = parsed.markers {
                config.markers = markers;
            }
            if let Some(secs) = parsed.timeout_secs {
                config.timeout = Some(Duration::from_secs(secs)).filter(|t| !t.is_zero());
            }
            if let Some(secs) = parsed.connect_timeout_secs {
                config.connect_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = parsed.trigger_timeout_secs {
                config.trigger_timeout = Duration::from_secs(secs);
            }
            if let Some(capacity) = parsed.channel_capacity {
                config.channel_capacity = capacity.max(1);
            }

            debug!(socket_url = %config.socket_url, "Loaded bridge config from TOML");
            Ok(config)
        }
    }

    /// Default location of the config file (`<config dir>/sockbridge/config.toml`)
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("sockbridge").join("config.toml"))
    }
}

#[cfg(feature = "config-file")]
pub use file::default_config_path;
