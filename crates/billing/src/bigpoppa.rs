//! HTTP client for the big-poppa organization registry.
//!
//! Thin [`OrganizationDirectory`] implementation: filters are serialized into
//! a `filter` query parameter, responses are camelCase JSON. A query that
//! matches nothing is a 200 with an empty array, never an error.

use async_trait::async_trait;
use cream_shared::Organization;
use reqwest::StatusCode;

use crate::directory::{OrganizationDirectory, OrganizationFilter, OrganizationPatch};
use crate::error::{ReconcileError, ReconcileResult};

#[derive(Clone)]
pub struct BigPoppaClient {
    base_url: String,
    http: reqwest::Client,
}

impl BigPoppaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl OrganizationDirectory for BigPoppaClient {
    async fn query_organizations(
        &self,
        filter: &OrganizationFilter,
    ) -> ReconcileResult<Vec<Organization>> {
        let filter_json = serde_json::to_string(filter)
            .map_err(|e| ReconcileError::Unexpected(e.into()))?;

        let response = self
            .http
            .get(self.endpoint("/organizations"))
            .query(&[("filter", filter_json.as_str())])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = response.error_for_status()?;
        let organizations = response.json::<Vec<Organization>>().await?;
        Ok(organizations)
    }

    async fn update_organization(
        &self,
        id: i64,
        patch: &OrganizationPatch,
    ) -> ReconcileResult<Organization> {
        let response = self
            .http
            .patch(self.endpoint(&format!("/organizations/{}", id)))
            .json(patch)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ReconcileError::not_found("organization", id.to_string()));
        }
        let response = response.error_for_status()?;
        let organization = response.json::<Organization>().await?;
        Ok(organization)
    }
}
