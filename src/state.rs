use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use crate::auth::{SessionHandle, SessionStore};
use crate::company::CompanyContext;
use crate::config::Config;
use crate::error::ApiError;
use crate::http::ApiClient;
use crate::models::User;
use crate::storage::KeyValueStore;

/// Everything a view needs, built once at start-up and passed down.
pub struct App {
    pub config: Config,
    pub storage: Arc<dyn KeyValueStore>,
    pub session: Arc<SessionHandle>,
    pub client: Arc<ApiClient>,
    pub auth: Arc<SessionStore>,
    pub companies: Arc<CompanyContext>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl App {
    pub(crate) fn new(
        config: Config,
        storage: Arc<dyn KeyValueStore>,
        session: Arc<SessionHandle>,
        client: Arc<ApiClient>,
        auth: Arc<SessionStore>,
        companies: Arc<CompanyContext>,
    ) -> Self {
        Self {
            config,
            storage,
            session,
            client,
            auth,
            companies,
            listener: Mutex::new(None),
        }
    }

    /// Start following the session with the company context, then restore
    /// any stored session. Companies load once restore has settled.
    pub async fn start(&self) -> Result<Option<User>, ApiError> {
        {
            let mut listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
            if listener.is_none() {
                *listener = Some(self.companies.spawn_auth_listener());
            }
        }
        self.auth.restore().await
    }
}

impl Drop for App {
    fn drop(&mut self) {
        let listener = self.listener.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = listener.take() {
            handle.abort();
        }
    }
}
