//! Browser session management
//!
//! Authenticated collection needs a logged-in x.com session, and the login
//! challenge (password, 2FA, CAPTCHA) can only be solved by a human. The
//! flow is therefore split in two: [`SessionManager::launch_for_login`]
//! starts a real browser on a debugging port and hands control to the user,
//! and [`SessionManager::attach_and_save`] later attaches over CDP and
//! serializes the session state to a snapshot file that the browser
//! strategy replays read-only.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use headless_chrome::Browser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SessionConfig;
use crate::log::LogSink;

/// Errors raised by session capture and replay
#[derive(Error, Debug)]
pub enum SessionError {
    /// Browser binary missing at the expected platform path
    #[error("Browser binary not found at {0}; install Google Chrome or set a browser_path override")]
    BrowserNotFound(PathBuf),

    /// Browser process failed to start
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(#[source] std::io::Error),

    /// No snapshot where one was expected
    #[error("No session snapshot at {0}; run the login flow first")]
    SnapshotMissing(PathBuf),

    /// Debugging endpoint not reachable or malformed
    #[error("Could not reach the browser debugging endpoint: {0}")]
    DebuggerUnreachable(String),

    /// Attached but could not read session state
    #[error("Failed to capture session state: {0}")]
    CaptureFailed(String),

    /// Snapshot file I/O error
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot serialization error
    #[error("Snapshot serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One browser cookie, as persisted in the snapshot file.
///
/// Field aliases keep snapshots written by Playwright-style tooling
/// loadable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default, alias = "httpOnly")]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

/// Serialized authentication state for one logical account.
///
/// Created once after a manual login; consumed read-only by every
/// authenticated strategy run. Staleness is not tracked here; it shows up
/// as a run that never reaches authenticated content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub cookies: Vec<SessionCookie>,
}

impl SessionSnapshot {
    /// Load a snapshot, reporting a missing file as its own error so
    /// callers can tell the user to log in first.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SessionError::SnapshotMissing(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write the snapshot as pretty JSON.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), raw)?;
        Ok(())
    }

    fn from_cdp_cookies(
        cookies: Vec<headless_chrome::protocol::cdp::Network::Cookie>,
    ) -> Self {
        let cookies = cookies
            .into_iter()
            .map(|c| SessionCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                // CDP reports session cookies with a non-positive expiry
                expires: (c.expires > 0.0).then_some(c.expires),
                http_only: c.http_only,
                secure: c.secure,
            })
            .collect();
        Self { cookies }
    }
}

/// Launches the login browser and captures session snapshots.
pub struct SessionManager {
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Resolve the browser binary: explicit override first, then the
    /// platform install location.
    pub fn browser_path(&self) -> PathBuf {
        if let Some(path) = &self.config.browser_path {
            return path.clone();
        }
        default_browser_path()
    }

    /// Start a real, visible browser bound to the configured debugging
    /// port and a persistent profile directory, then return so the user
    /// can complete the login at their own pace.
    pub fn launch_for_login(&self, sink: &Arc<dyn LogSink>) -> Result<u32, SessionError> {
        let browser = self.browser_path();
        if !browser.exists() {
            sink.line(&format!(
                "[worker] browser not found at {}",
                browser.display()
            ));
            return Err(SessionError::BrowserNotFound(browser));
        }

        let profile = self
            .config
            .profile_dir
            .clone()
            .unwrap_or_else(default_profile_dir);

        sink.line(&format!(
            "[worker] launching {} on debugging port {}",
            browser.display(),
            self.config.debug_port
        ));

        let child = Command::new(&browser)
            .arg(format!("--remote-debugging-port={}", self.config.debug_port))
            .arg(format!("--user-data-dir={}", profile.display()))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(SessionError::LaunchFailed)?;

        let pid = child.id();
        sink.line(&format!("[worker] browser started, pid {pid}"));
        sink.line("[worker] complete the login in the opened window, then run save_login");
        Ok(pid)
    }

    /// Attach to the already-running login browser and persist its first
    /// browsing context's cookies to the snapshot file.
    pub async fn attach_and_save(&self, sink: &Arc<dyn LogSink>) -> Result<PathBuf, SessionError> {
        let version_url = format!(
            "http://127.0.0.1:{}/json/version",
            self.config.debug_port
        );
        let version: serde_json::Value = reqwest::get(&version_url)
            .await
            .map_err(|e| SessionError::DebuggerUnreachable(e.to_string()))?
            .json()
            .await
            .map_err(|e| SessionError::DebuggerUnreachable(e.to_string()))?;

        let ws_url = version
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                SessionError::DebuggerUnreachable(
                    "version info has no webSocketDebuggerUrl".to_string(),
                )
            })?
            .to_string();

        tracing::debug!(ws_url = %ws_url, "attaching to browser");

        let snapshot = tokio::task::spawn_blocking(move || capture_snapshot(&ws_url))
            .await
            .map_err(|e| SessionError::CaptureFailed(e.to_string()))??;

        snapshot.write(&self.config.snapshot_path)?;
        sink.line(&format!(
            "[worker] session saved to {} ({} cookies)",
            self.config.snapshot_path.display(),
            snapshot.cookies.len()
        ));
        Ok(self.config.snapshot_path.clone())
    }
}

fn capture_snapshot(ws_url: &str) -> Result<SessionSnapshot, SessionError> {
    let browser = Browser::connect(ws_url.to_string())
        .map_err(|e| SessionError::DebuggerUnreachable(e.to_string()))?;

    let tab = {
        let tabs = browser.get_tabs().lock().unwrap();
        tabs.first()
            .cloned()
            .ok_or_else(|| SessionError::CaptureFailed("no open browsing context".to_string()))?
    };

    let cookies = tab
        .get_cookies()
        .map_err(|e| SessionError::CaptureFailed(e.to_string()))?;

    Ok(SessionSnapshot::from_cdp_cookies(cookies))
}

fn default_browser_path() -> PathBuf {
    if cfg!(target_os = "macos") {
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome")
    } else if cfg!(target_os = "windows") {
        PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe")
    } else {
        PathBuf::from("/usr/bin/google-chrome")
    }
}

fn default_profile_dir() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".x_debug_profile")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemorySink;
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage_state.json");

        let snapshot = SessionSnapshot {
            cookies: vec![SessionCookie {
                name: "auth_token".to_string(),
                value: "secret".to_string(),
                domain: ".x.com".to_string(),
                path: "/".to_string(),
                expires: Some(1924992000.0),
                http_only: true,
                secure: true,
            }],
        };
        snapshot.write(&path).unwrap();

        let loaded = SessionSnapshot::load(&path).unwrap();
        assert_eq!(loaded.cookies.len(), 1);
        assert_eq!(loaded.cookies[0].name, "auth_token");
        assert!(loaded.cookies[0].http_only);
    }

    #[test]
    fn test_snapshot_missing_is_reported() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("storage_state.json");

        match SessionSnapshot::load(&missing) {
            Err(SessionError::SnapshotMissing(path)) => assert_eq!(path, missing),
            other => panic!("expected SnapshotMissing, got {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_reads_camel_case_cookies() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage_state.json");
        std::fs::write(
            &path,
            r#"{"cookies":[{"name":"ct0","value":"v","domain":".x.com","path":"/","httpOnly":true,"secure":true,"sameSite":"Lax"}],"origins":[]}"#,
        )
        .unwrap();

        let loaded = SessionSnapshot::load(&path).unwrap();
        assert_eq!(loaded.cookies.len(), 1);
        assert!(loaded.cookies[0].http_only);
        assert!(loaded.cookies[0].expires.is_none());
    }

    #[test]
    fn test_browser_path_override() {
        let config = SessionConfig {
            browser_path: Some(PathBuf::from("/opt/chromium/chrome")),
            ..SessionConfig::default()
        };
        let manager = SessionManager::new(config);
        assert_eq!(manager.browser_path(), PathBuf::from("/opt/chromium/chrome"));
    }

    #[test]
    fn test_launch_reports_missing_browser() {
        let config = SessionConfig {
            browser_path: Some(PathBuf::from("/nonexistent/chrome-binary")),
            ..SessionConfig::default()
        };
        let manager = SessionManager::new(config);
        let sink: Arc<dyn LogSink> = Arc::new(MemorySink::new());

        match manager.launch_for_login(&sink) {
            Err(SessionError::BrowserNotFound(path)) => {
                assert_eq!(path, PathBuf::from("/nonexistent/chrome-binary"));
            }
            other => panic!("expected BrowserNotFound, got {other:?}"),
        }
    }
}
