use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::watch;

use super::handle::{AuthSnapshot, SessionHandle};
use crate::api;
use crate::error::ApiError;
use crate::http::ApiClient;
use crate::models::auth::LoginRequest;
use crate::models::{ChangePasswordRequest, Credentials, DeviceInfo, RegisterRequest, User};
use crate::storage::{self, StorageKey};

/// Login, logout, registration and password flows, plus start-up restore.
pub struct SessionStore {
    client: Arc<ApiClient>,
    session: Arc<SessionHandle>,
    device: DeviceInfo,
    error: Mutex<Option<String>>,
}

impl SessionStore {
    pub fn new(client: Arc<ApiClient>, session: Arc<SessionHandle>, device: DeviceInfo) -> Self {
        Self {
            client,
            session,
            device,
            error: Mutex::new(None),
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.snapshot().user
    }

    /// True only while a stored session is being validated at start-up.
    pub fn is_loading(&self) -> bool {
        self.session.snapshot().loading
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.session.subscribe()
    }

    fn set_error(&self, message: Option<String>) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = message;
    }

    fn record(&self, err: &ApiError) {
        self.set_error(Some(err.user_message()));
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<User, ApiError> {
        self.set_error(None);

        let body = LoginRequest {
            email: &credentials.email,
            password: &credentials.password,
            device_info: &self.device,
        };

        let resp = match api::auth::login(&self.client, &body).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("Login failed: {e}");
                self.record(&e);
                return Err(e);
            }
        };

        if let Err(e) = self
            .session
            .establish(&resp.user, &resp.access_token, &resp.refresh_token)
            .await
        {
            self.record(&e);
            return Err(e);
        }

        tracing::info!("Signed in as {}", resp.user.email);
        Ok(resp.user)
    }

    /// Best-effort server logout; local state is always cleared.
    pub async fn logout(&self) {
        let refresh_token = self.session.refresh_token().await.ok().flatten();
        if let Err(e) = api::auth::logout(&self.client, refresh_token.as_deref()).await {
            tracing::warn!("Logout request failed: {e}");
        }
        self.session.teardown().await;
        self.set_error(None);
    }

    pub async fn register(&self, data: &RegisterRequest) -> Result<Value, ApiError> {
        self.set_error(None);
        api::auth::register(&self.client, data).await.inspect_err(|e| {
            tracing::warn!("Registration failed: {e}");
            self.record(e);
        })
    }

    pub async fn change_password(&self, data: &ChangePasswordRequest) -> Result<(), ApiError> {
        self.set_error(None);
        api::auth::change_password(&self.client, data)
            .await
            .inspect_err(|e| {
                tracing::warn!("Password change failed: {e}");
                self.record(e);
            })
    }

    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        self.set_error(None);
        api::auth::forgot_password(&self.client, email)
            .await
            .inspect_err(|e| self.record(e))
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), ApiError> {
        self.set_error(None);
        api::auth::reset_password(&self.client, token, password)
            .await
            .inspect_err(|e| self.record(e))
    }

    /// Restore a stored session at start-up.
    ///
    /// The cached user is exposed immediately, then validated against the
    /// profile endpoint. Only a 401 clears it; a network failure keeps the
    /// cached session so the app stays usable offline. The loading flag is
    /// lowered once validation has settled either way.
    pub async fn restore(&self) -> Result<Option<User>, ApiError> {
        let result = self.validate_stored().await;
        self.session.finish_loading();
        result
    }

    async fn validate_stored(&self) -> Result<Option<User>, ApiError> {
        let store = self.session.storage();
        let user: Option<User> = storage::read_json(store, StorageKey::CurrentUser).await?;
        let access = self.session.access_token().await?;
        let refresh = self.session.refresh_token().await?;

        let user = match (user, access, refresh) {
            (Some(user), Some(_), Some(_)) => user,
            (None, None, None) => return Ok(None),
            _ => {
                tracing::warn!("Stored session is incomplete, clearing it");
                self.session.teardown().await;
                return Ok(None);
            }
        };

        let epoch = self.session.epoch();
        self.session.publish_user(Some(user.clone()));

        match api::auth::me(&self.client).await {
            Ok(fresh) => {
                if !self.session.update_user(epoch, fresh.clone()).await? {
                    return Ok(None);
                }
                tracing::info!("Session restored for {}", fresh.email);
                Ok(Some(fresh))
            }
            Err(ApiError::Unauthorized) => {
                tracing::info!("Stored session rejected by backend");
                self.session.teardown().await;
                Ok(None)
            }
            Err(ApiError::SessionExpired) => Ok(None),
            Err(e) => {
                tracing::warn!("Could not validate stored session, keeping it: {e}");
                Ok(Some(user))
            }
        }
    }
}
