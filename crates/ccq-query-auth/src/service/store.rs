//! # Permission Store
//!
//! Holds the current [`PermissionTable`] behind a swappable `Arc`.
//!
//! Readers take a snapshot (one `Arc` clone) and authorize against it without
//! holding any lock. A reload builds the replacement table off to the side and
//! publishes it with a single pointer swap; a failed reload leaves the current
//! table in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::authorizer::{authorize, AuthorizedQuery};
use super::loader::load_permissions;
use crate::domain::{AuthorizationError, PermissionError, PermissionTable, SignedQueryRequest};

/// Current permission table for a permissions file.
pub struct PermissionStore {
    path: PathBuf,
    current: RwLock<Arc<PermissionTable>>,
}

impl PermissionStore {
    /// Load `path` and wrap the resulting table. Fails if the initial load fails.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PermissionError> {
        let path = path.into();
        let table = load_permissions(&path)?;
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(table)),
        })
    }

    /// Wrap an already built table.
    pub fn with_table(path: impl Into<PathBuf>, table: PermissionTable) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(Arc::new(table)),
        }
    }

    /// Permissions file backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current table.
    pub fn snapshot(&self) -> Arc<PermissionTable> {
        Arc::clone(&self.current.read())
    }

    /// Publish a new table. Readers holding an old snapshot keep using it.
    pub fn replace(&self, table: PermissionTable) -> Arc<PermissionTable> {
        let table = Arc::new(table);
        *self.current.write() = Arc::clone(&table);
        table
    }

    /// Reload from disk. On error the current table stays in effect.
    pub fn reload(&self) -> Result<Arc<PermissionTable>, PermissionError> {
        match load_permissions(&self.path) {
            Ok(table) => {
                let table = self.replace(table);
                info!(
                    path = %self.path.display(),
                    api_keys = table.len(),
                    "Permissions reloaded"
                );
                Ok(table)
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Permissions reload failed, keeping current table"
                );
                Err(e)
            }
        }
    }

    /// Authorize against the current table.
    pub fn authorize(
        &self,
        api_key: &str,
        signed: &SignedQueryRequest,
    ) -> Result<AuthorizedQuery, AuthorizationError> {
        authorize(api_key, signed, &self.snapshot())
    }
}

/// Background task reloading a [`PermissionStore`] when its file changes.
pub struct PermissionWatcher {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PermissionWatcher {
    /// Start polling the store's file every `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<PermissionStore>, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut last_modified = modified_time(store.path());
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                let modified = modified_time(store.path());
                if modified.is_none() || modified == last_modified {
                    continue;
                }
                debug!(path = %store.path().display(), "Permissions file changed");
                // Remember the attempt either way so a bad file is not retried every tick.
                last_modified = modified;
                let _ = store.reload();
            }

            debug!(path = %store.path().display(), "Permission watcher stopped");
        });

        Self { shutdown, handle }
    }

    /// Stop the watcher and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
