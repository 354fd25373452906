//! Socket permission coordinator.
//!
//! The sidecar usually runs as a different user, so once a listener is up
//! its socket file is opened to read+write for everyone. This happens once
//! per socket, after binding, off the accept path.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

/// Mode applied to a bound socket file.
pub const SOCKET_MODE: u32 = 0o666;

#[derive(Debug)]
pub struct SocketLifecycle {
    path: PathBuf,
    relaxed: AtomicBool,
}

impl SocketLifecycle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            relaxed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_relaxed(&self) -> bool {
        self.relaxed.load(Ordering::Acquire)
    }

    /// Apply [`SOCKET_MODE`] to the socket file.
    ///
    /// Returns `Ok(true)` for the call that changed the mode and `Ok(false)`
    /// for every later call. A failed attempt may be retried.
    pub async fn relax_permissions(&self) -> io::Result<bool> {
        if self.relaxed.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }

        match set_mode(&self.path).await {
            Ok(()) => {
                info!(
                    socket = %self.path.display(),
                    mode = %format!("{SOCKET_MODE:o}"),
                    "Socket permissions relaxed"
                );
                Ok(true)
            }
            Err(e) => {
                warn!(
                    socket = %self.path.display(),
                    error = %e,
                    "Failed to relax socket permissions"
                );
                self.relaxed.store(false, Ordering::Release);
                Err(e)
            }
        }
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(SOCKET_MODE)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[tokio::test]
    async fn test_relaxes_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.sock");
        std::fs::write(&path, b"").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

        let lifecycle = SocketLifecycle::new(&path);
        assert!(lifecycle.relax_permissions().await.unwrap());
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o666);

        // Tighten again; a second relaxation must not touch the file.
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        assert!(!lifecycle.relax_permissions().await.unwrap());
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[tokio::test]
    async fn test_failed_attempt_can_retry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.sock");
        let lifecycle = SocketLifecycle::new(&path);

        assert!(lifecycle.relax_permissions().await.is_err());
        assert!(!lifecycle.is_relaxed());

        std::fs::write(&path, b"").unwrap();
        assert!(lifecycle.relax_permissions().await.unwrap());
    }
}
