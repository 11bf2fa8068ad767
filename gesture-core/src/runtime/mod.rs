//! runtime — process-level plumbing: config discovery and cancellation

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Notify;

use crate::config::CaptureConfig;

pub const CONFIG_ENV: &str = "GESTURE_CAPTURE_CONFIG";
pub const CONFIG_FILE_NAME: &str = "gesture-capture.json";

/// Resolve the session config.
///
/// Priority order:
/// 1) `explicit` path (must exist and parse)
/// 2) `GESTURE_CAPTURE_CONFIG` (if the file exists)
/// 3) `gesture-capture.json` in the current directory
/// 4) built-in defaults
pub fn resolve_config(explicit: Option<&Path>) -> Result<CaptureConfig> {
    if let Some(path) = explicit {
        tracing::info!(path = %path.display(), "loading config from command line");
        return CaptureConfig::from_file(path);
    }

    if let Some(from_env) = std::env::var_os(CONFIG_ENV) {
        let env_path = PathBuf::from(from_env);
        if env_path.is_file() {
            tracing::info!(path = %env_path.display(), "loading config from {CONFIG_ENV}");
            return CaptureConfig::from_file(&env_path);
        }
        tracing::warn!(
            path = %env_path.display(),
            "{CONFIG_ENV} is set but file does not exist; falling back"
        );
    }

    if let Ok(cwd) = std::env::current_dir() {
        let local = cwd.join(CONFIG_FILE_NAME);
        if local.is_file() {
            tracing::info!(path = %local.display(), "loading config from working directory");
            return CaptureConfig::from_file(&local)
                .with_context(|| format!("while loading {CONFIG_FILE_NAME}"));
        }
    }

    tracing::info!("no config file found; using defaults");
    Ok(CaptureConfig::default())
}

// ── Cancellation ─────────────────────────────────────────────────────────────

/// Shared cancel signal for a running session. Clones observe the same flag.
#[derive(Clone, Default)]
pub struct CancelFlag {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            tracing::debug!("cancellation requested");
        }
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Clear the flag so the owning session can run again.
    pub fn reset(&self) {
        self.inner.cancelled.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_explicit_config_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(&path, r#"{"gesture": {"countdown_seconds": 7}}"#).unwrap();

        let config = resolve_config(Some(&path)).unwrap();
        assert_eq!(config.gesture.countdown_seconds, 7);

        assert!(resolve_config(Some(&dir.path().join("missing.json"))).is_err());
    }

    #[test]
    fn test_invalid_explicit_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"frame_interval_ms": 0}"#).unwrap();
        assert!(resolve_config(Some(&path)).is_err());
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let flag = CancelFlag::new();
        let waiter = flag.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });

        tokio::task::yield_now().await;
        flag.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_already_set() {
        let flag = CancelFlag::new();
        flag.cancel();
        flag.cancel();
        flag.cancelled().await;

        flag.reset();
        assert!(!flag.is_cancelled());
    }
}
