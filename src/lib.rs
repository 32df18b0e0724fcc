pub mod api;
pub mod auth;
pub mod company;
pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod models;
pub mod state;
pub mod storage;

use std::sync::Arc;

use crate::auth::{SessionHandle, SessionStore};
use crate::company::CompanyContext;
use crate::config::Config;
use crate::error::ApiError;
use crate::http::ApiClient;
use crate::middleware::auth_redirect::Navigator;
use crate::models::DeviceInfo;
use crate::state::App;
use crate::storage::KeyValueStore;

pub fn build_app(
    config: Config,
    storage: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn Navigator>,
) -> Result<App, ApiError> {
    let session = Arc::new(SessionHandle::new(storage.clone()));

    let client = Arc::new(ApiClient::new(&config, session.clone(), navigator)?);
    tracing::debug!("API client targeting {}", client.base_url());

    let device = DeviceInfo::new(config.device_name.clone());
    let auth = Arc::new(SessionStore::new(client.clone(), session.clone(), device));
    let companies = Arc::new(CompanyContext::new(client.clone(), session.clone()));

    Ok(App::new(config, storage, session, client, auth, companies))
}
