use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ident::lenient_id;
use crate::error::ApiError;

/// A company as it arrives from the backend or from an older storage entry.
///
/// The identifier and name each come under two field names. Nothing outside
/// this module holds a `CompanyRecord`; it is turned into a [`Company`] at the
/// point of ingestion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanyRecord {
    #[serde(default, deserialize_with = "lenient_id")]
    pub company_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, alias = "zip_code")]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default, alias = "last_accessed_at")]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Canonical company. `id` prefers `company_id` and falls back to `id`;
/// `name` prefers `company_name` and falls back to `name`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompanyRecord {
    pub fn normalize(self) -> Option<Company> {
        self.normalize_with(None)
    }

    /// Like [`normalize`](Self::normalize), using `fallback_id` when the record carries no identifier.
    pub fn normalize_with(self, fallback_id: Option<&str>) -> Option<Company> {
        let id = self
            .company_id
            .or(self.id)
            .or_else(|| fallback_id.map(str::to_string))?;
        let name = non_blank(self.company_name)
            .or(non_blank(self.name))
            .unwrap_or_default();

        Some(Company {
            id,
            name,
            address: self.address,
            city: self.city,
            state: self.state,
            postal_code: self.postal_code,
            country: self.country,
            phone: self.phone,
            email: self.email,
            website: self.website,
            status: self.status,
            industry: self.industry,
            last_accessed: self.last_accessed,
            extra: self.extra,
        })
    }
}

impl Company {
    /// Decode and normalize a single company from raw JSON.
    pub fn from_value(value: Value) -> Result<Company, ApiError> {
        let record: CompanyRecord = serde_json::from_value(value)?;
        record
            .normalize()
            .ok_or_else(|| ApiError::Decode("company record has no identifier".to_string()))
    }
}

/// Normalize a company listing. Accepts a bare array or a paginated
/// `{"results": [...]}` envelope; entries without any identifier are dropped.
pub fn normalize_list(value: Value) -> Result<Vec<Company>, ApiError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => items,
            _ => return Err(ApiError::Decode("expected a list of companies".to_string())),
        },
        Value::Null => Vec::new(),
        _ => return Err(ApiError::Decode("expected a list of companies".to_string())),
    };

    let mut companies = Vec::with_capacity(items.len());
    for item in items {
        match Company::from_value(item) {
            Ok(company) => companies.push(company),
            Err(e) => tracing::warn!("Skipping company entry: {e}"),
        }
    }
    Ok(companies)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Fields accepted when creating or updating a company.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompanyPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompanyPayload {
    pub fn named(name: impl Into<String>) -> Self {
        CompanyPayload {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}
