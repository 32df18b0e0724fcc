use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use super::auth_redirect::{self, Navigator};
use crate::auth::SessionHandle;
use crate::error::{ApiError, ErrorKind};
use crate::http::{ApiClient, ApiRequest, ApiResponse, secure};
use crate::models::RefreshResponse;

pub const REFRESH_PATH: &str = "auth/refresh-token";

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Request and response hooks wrapped around every backend call.
pub struct Interceptor {
    session: Arc<SessionHandle>,
    navigator: Arc<dyn Navigator>,
    secure_context: bool,
    /// Held for the whole of one refresh exchange, so concurrent 401s share it.
    refreshing: Mutex<()>,
}

impl Interceptor {
    pub fn new(
        session: Arc<SessionHandle>,
        navigator: Arc<dyn Navigator>,
        secure_context: bool,
    ) -> Self {
        Self {
            session,
            navigator,
            secure_context,
            refreshing: Mutex::new(()),
        }
    }

    /// Request phase: coerce the URL to https when required, then attach the
    /// stored access token.
    pub async fn prepare(&self, req: &mut ApiRequest) -> Result<(), ApiError> {
        self.secure(req);
        req.epoch = Some(self.session.epoch());
        if req.authenticate {
            if let Some(token) = self.session.access_token().await? {
                req.bearer = Some(token);
            }
        }
        Ok(())
    }

    fn secure(&self, req: &mut ApiRequest) {
        if !self.secure_context {
            return;
        }
        let (base, path) = secure::enforce(&req.base, &req.path);
        req.base = base;
        req.path = path;
    }

    /// Response phase, error path. A 401 on a call that has not been retried
    /// yet triggers one refresh-token exchange and one resubmission; anything
    /// else is handed back unchanged.
    ///
    /// Only one exchange runs at a time. A call that waited for another
    /// caller's exchange resubmits with the token that exchange stored.
    pub async fn recover(
        &self,
        client: &ApiClient,
        mut req: ApiRequest,
        err: ApiError,
    ) -> Result<ApiResponse, ApiError> {
        if !err.is_unauthorized() || !req.can_retry() {
            return Err(err);
        }
        req.attempt += 1;

        let bearer = {
            let _refreshing = self.refreshing.lock().await;

            let epoch = req.epoch.unwrap_or_else(|| self.session.epoch());
            if epoch != self.session.epoch() {
                tracing::debug!(
                    "Session changed since {} {} was sent, not retrying",
                    req.method,
                    req.path
                );
                return Err(err);
            }

            let stored = self.session.access_token().await?;
            match stored {
                Some(token) if req.bearer.as_ref() != Some(&token) => {
                    tracing::debug!("Access token already refreshed, reusing it");
                    token
                }
                _ => match self.refresh(client, epoch).await? {
                    Some(token) => token,
                    None => return Err(err),
                },
            }
        };

        tracing::debug!("Retrying {} {} with a fresh access token", req.method, req.path);
        req.bearer = Some(bearer);
        client.transmit(&req).await
    }

    /// Exchange the stored refresh token. `Ok(None)` means there was nothing
    /// to exchange or the session ended meanwhile; the caller then surfaces
    /// its original error.
    async fn refresh(&self, client: &ApiClient, epoch: u64) -> Result<Option<String>, ApiError> {
        let Some(refresh_token) = self.session.refresh_token().await? else {
            return Ok(None);
        };

        let refreshed = match self.exchange(client, &refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(e) if e.kind() == ErrorKind::Network => {
                // No answer from the backend says nothing about the token itself.
                tracing::warn!("Token refresh unreachable: {e}");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!("Token refresh rejected: {e}");
                self.session.teardown().await;
                auth_redirect::redirect_to_login(self.navigator.as_ref());
                return Err(ApiError::SessionExpired);
            }
        };

        let stored = self
            .session
            .store_refreshed(
                epoch,
                &refreshed.access_token,
                refreshed.refresh_token.as_deref(),
            )
            .await?;
        if !stored {
            tracing::debug!("Session ended during token refresh, not retrying");
            return Ok(None);
        }
        tracing::debug!("Access token refreshed");
        Ok(Some(refreshed.access_token))
    }

    async fn exchange(
        &self,
        client: &ApiClient,
        refresh_token: &str,
    ) -> Result<RefreshResponse, ApiError> {
        let mut req = client
            .post(REFRESH_PATH)
            .json(&RefreshRequest { refresh_token })?
            .anonymous()
            .no_retry();
        self.secure(&mut req);
        client.transmit(&req).await?.json()
    }
}
