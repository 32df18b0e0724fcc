use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::http::ApiClient;
use crate::models::auth::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, LoginResponse, RegisterRequest,
    ResetPasswordRequest,
};
use crate::models::User;

#[derive(Serialize)]
struct LogoutRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

/// A 401 here means bad credentials, never an expired token.
pub async fn login(client: &ApiClient, body: &LoginRequest<'_>) -> Result<LoginResponse, ApiError> {
    client
        .fetch(client.post("auth/login").json(body)?.no_retry())
        .await
}

pub async fn logout(client: &ApiClient, refresh_token: Option<&str>) -> Result<(), ApiError> {
    client
        .execute(
            client
                .post("auth/logout")
                .json(&LogoutRequest { refresh_token })?
                .no_retry(),
        )
        .await?;
    Ok(())
}

pub async fn register(client: &ApiClient, body: &RegisterRequest) -> Result<Value, ApiError> {
    let resp = client
        .execute(client.post("auth/register").json(body)?.anonymous().no_retry())
        .await?;
    Ok(resp.body.unwrap_or(Value::Null))
}

pub async fn change_password(
    client: &ApiClient,
    body: &ChangePasswordRequest,
) -> Result<(), ApiError> {
    client
        .execute(client.put("auth/change-password").json(body)?)
        .await?;
    Ok(())
}

pub async fn forgot_password(client: &ApiClient, email: &str) -> Result<(), ApiError> {
    client
        .execute(
            client
                .post("auth/forgot-password")
                .json(&ForgotPasswordRequest { email })?
                .anonymous()
                .no_retry(),
        )
        .await?;
    Ok(())
}

pub async fn reset_password(client: &ApiClient, token: &str, password: &str) -> Result<(), ApiError> {
    client
        .execute(
            client
                .post("auth/reset-password")
                .json(&ResetPasswordRequest { token, password })?
                .anonymous()
                .no_retry(),
        )
        .await?;
    Ok(())
}

pub async fn me(client: &ApiClient) -> Result<User, ApiError> {
    client.fetch(client.get("auth/me")).await
}
