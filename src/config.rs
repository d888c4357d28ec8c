//! Tunables for the authentication middleware.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_REPLAY_WINDOW_SECS: u64 = 60 * 60;
const DEFAULT_SPILL_THRESHOLD: usize = 1024 * 1024;
const DEFAULT_SESSION_COOKIE: &str = "session";

/// Settings shared by both middleware entry points.
///
/// Embedding applications usually deserialize this from their own config
/// file; every field has a default.
///
/// ```
/// use policy_guard::AuthConfig;
///
/// let config = AuthConfig::default()
///     .with_replay_window_secs(300)
///     .with_session_cookie("app_session");
/// assert_eq!(config.replay_window().as_secs(), 300);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Maximum distance, in seconds, between a signed request's Date header and now
    pub replay_window_secs: u64,
    /// Body size in bytes above which a duplicated body moves to a temp file
    pub spill_threshold: usize,
    /// Directory for spilled bodies; the system temp dir when unset
    pub temp_dir: Option<PathBuf>,
    /// Name of the cookie carrying the session token
    pub session_cookie: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            replay_window_secs: DEFAULT_REPLAY_WINDOW_SECS,
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            temp_dir: None,
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
        }
    }
}

impl AuthConfig {
    /// Replay window as a `Duration`.
    pub fn replay_window(&self) -> Duration {
        Duration::from_secs(self.replay_window_secs)
    }

    /// Sets the replay window in seconds.
    pub fn with_replay_window_secs(mut self, secs: u64) -> Self {
        self.replay_window_secs = secs;
        self
    }

    /// Sets the in-memory limit for duplicated bodies.
    pub fn with_spill_threshold(mut self, bytes: usize) -> Self {
        self.spill_threshold = bytes;
        self
    }

    /// Sets the directory used for spilled bodies.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Sets the session cookie name.
    pub fn with_session_cookie(mut self, name: impl Into<String>) -> Self {
        self.session_cookie = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.replay_window(), Duration::from_secs(3600));
        assert_eq!(config.spill_threshold, 1024 * 1024);
        assert!(config.temp_dir.is_none());
        assert_eq!(config.session_cookie, "session");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AuthConfig =
            serde_json::from_str(r#"{"spill_threshold": 16, "temp_dir": "/var/tmp"}"#).unwrap();
        assert_eq!(config.spill_threshold, 16);
        assert_eq!(config.temp_dir, Some(PathBuf::from("/var/tmp")));
        assert_eq!(config.replay_window_secs, DEFAULT_REPLAY_WINDOW_SECS);
        assert_eq!(config.session_cookie, DEFAULT_SESSION_COOKIE);
    }
}
