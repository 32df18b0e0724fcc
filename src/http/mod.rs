pub mod request;
pub mod secure;

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use request::{ApiRequest, ApiResponse};

use crate::auth::SessionHandle;
use crate::config::Config;
use crate::error::ApiError;
use crate::middleware::auth_redirect::Navigator;
use crate::middleware::interceptor::Interceptor;

pub const USER_AGENT: &str = concat!("quickledger/", env!("CARGO_PKG_VERSION"));

/// The shared backend client. Every call goes through the interceptor chain.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    secure_context: bool,
    interceptor: Interceptor,
}

impl ApiClient {
    pub fn new(
        config: &Config,
        session: Arc<SessionHandle>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let base_url = secure::normalize_base(&config.api_url, config.secure_context);
        if base_url.is_empty() {
            return Err(ApiError::Config("API base URL is empty".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            interceptor: Interceptor::new(session, navigator, config.secure_context),
            base_url,
            secure_context: config.secure_context,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn secure_context(&self) -> bool {
        self.secure_context
    }

    pub fn request(&self, method: Method, path: &str) -> ApiRequest {
        ApiRequest::new(method, self.base_url.clone(), path)
    }

    pub fn get(&self, path: &str) -> ApiRequest {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> ApiRequest {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: &str) -> ApiRequest {
        self.request(Method::PUT, path)
    }

    pub fn delete(&self, path: &str) -> ApiRequest {
        self.request(Method::DELETE, path)
    }

    /// Run a request through the full chain: secure-URL coercion, token
    /// attachment, and at most one refresh-and-retry on 401.
    pub async fn execute(&self, mut req: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.interceptor.prepare(&mut req).await?;
        match self.transmit(&req).await {
            Ok(resp) => Ok(resp),
            Err(err) => self.interceptor.recover(self, req, err).await,
        }
    }

    pub async fn fetch<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, ApiError> {
        self.execute(req).await?.json()
    }

    /// Put one prepared request on the wire. No interception happens here.
    pub(crate) async fn transmit(&self, req: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = req.url();
        if self.secure_context && secure::is_insecure(&url) {
            return Err(ApiError::Config(format!(
                "refusing to send {} {} over plain http",
                req.method, req.path
            )));
        }

        let mut builder = self.http.request(req.method.clone(), &url);
        if let Some(token) = &req.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;

        let body = if bytes.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            }))
        };

        tracing::debug!(
            method = %req.method,
            path = %req.path,
            status = status.as_u16(),
            attempt = req.attempt,
            "Backend request completed"
        );

        if status.is_success() {
            Ok(ApiResponse { status, body })
        } else {
            Err(ApiError::from_status(status, body.as_ref()))
        }
    }
}
