use serde_json::Value;

use crate::error::ApiError;
use crate::http::ApiClient;
use crate::models::company::{self, Company, CompanyPayload, CompanyRecord};

pub async fn list(client: &ApiClient) -> Result<Vec<Company>, ApiError> {
    let body: Value = client.fetch(client.get("companies")).await?;
    company::normalize_list(body)
}

pub async fn create(client: &ApiClient, payload: &CompanyPayload) -> Result<Company, ApiError> {
    let body: Value = client
        .fetch(client.post("companies").json(payload)?)
        .await?;
    Company::from_value(body)
}

/// The backend may omit the identifier on update; `id` fills it in.
pub async fn update(
    client: &ApiClient,
    id: &str,
    payload: &CompanyPayload,
) -> Result<Company, ApiError> {
    let body: Value = client
        .fetch(client.put(&format!("companies/{id}")).json(payload)?)
        .await?;
    let record: CompanyRecord = serde_json::from_value(body)?;
    record
        .normalize_with(Some(id))
        .ok_or_else(|| ApiError::Decode("company record has no identifier".to_string()))
}

pub async fn delete(client: &ApiClient, id: &str) -> Result<(), ApiError> {
    client
        .execute(client.delete(&format!("companies/{id}")))
        .await?;
    Ok(())
}
