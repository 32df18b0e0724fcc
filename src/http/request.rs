use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::secure;
use crate::error::ApiError;

/// One logical call, threaded through every interceptor stage.
///
/// `attempt` counts transparent retries already made for this call; the
/// interceptor only retries while `attempt < max_retries`. `epoch` is the
/// session generation the request was prepared under.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub base: String,
    pub path: String,
    pub body: Option<Value>,
    pub bearer: Option<String>,
    pub authenticate: bool,
    pub attempt: u8,
    pub max_retries: u8,
    pub epoch: Option<u64>,
}

impl ApiRequest {
    pub const DEFAULT_MAX_RETRIES: u8 = 1;

    pub fn new(method: Method, base: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            base: base.into(),
            path: path.into(),
            body: None,
            bearer: None,
            authenticate: true,
            attempt: 0,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            epoch: None,
        }
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Never refresh-and-retry this call on 401.
    pub fn no_retry(mut self) -> Self {
        self.max_retries = 0;
        self
    }

    /// Do not attach the stored access token.
    pub fn anonymous(mut self) -> Self {
        self.authenticate = false;
        self
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_retries
    }

    pub fn url(&self) -> String {
        secure::combine(&self.base, &self.path)
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        Ok(serde_json::from_value(self.body.unwrap_or(Value::Null))?)
    }
}
