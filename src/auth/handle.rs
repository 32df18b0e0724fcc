use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, MutexGuard, watch};

use crate::error::ApiError;
use crate::models::User;
use crate::storage::{self, KeyValueStore, StorageKey};

/// What the rest of the application may observe about authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    /// True until start-up validation of a stored session has finished.
    pub loading: bool,
    pub user: Option<User>,
}

/// The single credential holder for the process.
///
/// Owns the token pair in durable storage and a generation counter (`epoch`).
/// Every login and every teardown starts a new generation; writers capture
/// the generation when they start and commit only through
/// [`lock_current`](Self::lock_current), so a response that resolves after a
/// logout is dropped instead of restoring cleared state.
pub struct SessionHandle {
    storage: Arc<dyn KeyValueStore>,
    epoch: AtomicU64,
    commit: Mutex<()>,
    status: watch::Sender<AuthSnapshot>,
}

impl SessionHandle {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let (status, _) = watch::channel(AuthSnapshot {
            loading: true,
            user: None,
        });
        Self {
            storage,
            epoch: AtomicU64::new(0),
            commit: Mutex::new(()),
            status,
        }
    }

    pub fn storage(&self) -> &dyn KeyValueStore {
        self.storage.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.status.subscribe()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.status.borrow().clone()
    }

    pub async fn access_token(&self) -> Result<Option<String>, ApiError> {
        Ok(storage::read_json(self.storage(), StorageKey::AccessToken).await?)
    }

    pub async fn refresh_token(&self) -> Result<Option<String>, ApiError> {
        Ok(storage::read_json(self.storage(), StorageKey::RefreshToken).await?)
    }

    /// Hold the commit lock if `epoch` is still the live generation.
    pub async fn lock_current(&self, epoch: u64) -> Option<MutexGuard<'_, ()>> {
        let guard = self.commit.lock().await;
        (self.epoch() == epoch).then_some(guard)
    }

    /// Start a new session generation with a fresh user and token pair.
    pub(crate) async fn establish(
        &self,
        user: &User,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<u64, ApiError> {
        let _guard = self.commit.lock().await;

        let previous: Option<User> =
            storage::read_json(self.storage(), StorageKey::CurrentUser).await?;
        if previous.is_some_and(|p| !p.is_same_account(user)) {
            tracing::info!("Different account signed in, dropping cached companies");
            self.storage
                .remove_all(&[StorageKey::Companies, StorageKey::CurrentCompany])
                .await?;
        }

        storage::write_json(self.storage(), StorageKey::CurrentUser, user).await?;
        storage::write_json(self.storage(), StorageKey::AccessToken, access_token).await?;
        storage::write_json(self.storage(), StorageKey::RefreshToken, refresh_token).await?;

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.status.send_modify(|s| s.user = Some(user.clone()));
        Ok(epoch)
    }

    /// Persist a token minted by the refresh endpoint. Returns false when the
    /// session was torn down or replaced while the refresh was in flight.
    pub(crate) async fn store_refreshed(
        &self,
        epoch: u64,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<bool, ApiError> {
        let Some(_guard) = self.lock_current(epoch).await else {
            return Ok(false);
        };
        storage::write_json(self.storage(), StorageKey::AccessToken, access_token).await?;
        if let Some(refresh) = refresh_token {
            storage::write_json(self.storage(), StorageKey::RefreshToken, refresh).await?;
        }
        Ok(true)
    }

    /// Replace the cached user record after a successful profile fetch.
    pub(crate) async fn update_user(&self, epoch: u64, user: User) -> Result<bool, ApiError> {
        let Some(_guard) = self.lock_current(epoch).await else {
            return Ok(false);
        };
        storage::write_json(self.storage(), StorageKey::CurrentUser, &user).await?;
        self.status.send_modify(|s| s.user = Some(user));
        Ok(true)
    }

    /// Expose a user restored from storage before it has been validated.
    pub(crate) fn publish_user(&self, user: Option<User>) {
        self.status.send_modify(|s| s.user = user);
    }

    pub(crate) fn finish_loading(&self) {
        self.status.send_if_modified(|s| std::mem::replace(&mut s.loading, false));
    }

    /// Drop every durable key and the in-memory identity. Never fails: a
    /// storage error is logged and the in-memory state is cleared regardless.
    pub(crate) async fn teardown(&self) {
        let _guard = self.commit.lock().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if let Err(e) = self.storage.remove_all(&StorageKey::ALL).await {
            tracing::error!("Failed to clear session storage: {e}");
        }
        self.status.send_modify(|s| s.user = None);
        tracing::info!("Session cleared");
    }
}
