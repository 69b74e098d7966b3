//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining authentication
//! and HTTP functionality. Built once per run and handed to every listing.

use super::auth::Authorizer;
use super::http::{ApiError, GcpHttpClient};
use crate::config::{Config, Endpoints};
use serde_json::Value;

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub authorizer: Authorizer,
    pub http: GcpHttpClient,
    pub endpoints: Endpoints,
}

impl GcpClient {
    /// Create a new GCP client
    pub fn new(authorizer: Authorizer, config: &Config) -> Result<Self, ApiError> {
        let http = GcpHttpClient::new(config.request_timeout(), config.retry.clone())?;

        Ok(Self {
            authorizer,
            http,
            endpoints: config.endpoints.clone(),
        })
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String, ApiError> {
        self.authorizer
            .token()
            .await
            .map_err(|e| ApiError::Token(format!("{:#}", e)))
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        let token = self.get_token().await?;
        self.http.get(url, &token, query).await
    }

    // =========================================================================
    // Resource Manager API helpers
    // =========================================================================

    /// Build Resource Manager API URL
    pub fn resourcemanager_url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.endpoints.resource_manager, path)
    }

    // =========================================================================
    // Compute Engine API helpers
    // =========================================================================

    /// Build Compute Engine API URL
    /// Security: path segments are percent-encoded
    pub fn compute_url(&self, project_id: &str, path: &str) -> String {
        format!(
            "{}/compute/v1/projects/{}/{}",
            self.endpoints.compute,
            urlencoding::encode(project_id),
            path
        )
    }

    /// Build zonal Compute Engine API URL
    pub fn compute_zonal_url(&self, project_id: &str, zone: &str, resource: &str) -> String {
        self.compute_url(
            project_id,
            &format!("zones/{}/{}", urlencoding::encode(zone), resource),
        )
    }

    /// Build global Compute Engine API URL
    pub fn compute_global_url(&self, project_id: &str, resource: &str) -> String {
        self.compute_url(project_id, &format!("global/{}", resource))
    }

    /// Build aggregated Compute Engine API URL (all regions/zones)
    pub fn compute_aggregated_url(&self, project_id: &str, resource: &str) -> String {
        self.compute_url(project_id, &format!("aggregated/{}", resource))
    }

    // =========================================================================
    // GKE API helpers
    // =========================================================================

    /// Build GKE API URL
    pub fn container_url(&self, project_id: &str, path: &str) -> String {
        format!(
            "{}/v1/projects/{}/{}",
            self.endpoints.container,
            urlencoding::encode(project_id),
            path
        )
    }

    /// Build GKE location URL (region, zone, or `-` for all)
    pub fn container_location_url(&self, project_id: &str, location: &str, resource: &str) -> String {
        self.container_url(project_id, &format!("locations/{}/{}", location, resource))
    }

    // =========================================================================
    // Cloud SQL Admin API helpers
    // =========================================================================

    /// Build Cloud SQL Admin API URL
    pub fn sqladmin_url(&self, project_id: &str, resource: &str) -> String {
        format!(
            "{}/sql/v1beta4/projects/{}/{}",
            self.endpoints.sql_admin,
            urlencoding::encode(project_id),
            resource
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GcpClient {
        GcpClient::new(Authorizer::fixed("t"), &Config::default()).unwrap()
    }

    #[test]
    fn test_url_builders() {
        let c = client();
        assert_eq!(
            c.resourcemanager_url("projects"),
            "https://cloudresourcemanager.googleapis.com/v1/projects"
        );
        assert_eq!(
            c.compute_zonal_url("p1", "us-east1-b", "instances"),
            "https://compute.googleapis.com/compute/v1/projects/p1/zones/us-east1-b/instances"
        );
        assert_eq!(
            c.compute_global_url("p1", "networks"),
            "https://compute.googleapis.com/compute/v1/projects/p1/global/networks"
        );
        assert_eq!(
            c.compute_aggregated_url("p1", "subnetworks"),
            "https://compute.googleapis.com/compute/v1/projects/p1/aggregated/subnetworks"
        );
        assert_eq!(
            c.container_location_url("p1", "-", "clusters"),
            "https://container.googleapis.com/v1/projects/p1/locations/-/clusters"
        );
        assert_eq!(
            c.sqladmin_url("p1", "instances"),
            "https://sqladmin.googleapis.com/sql/v1beta4/projects/p1/instances"
        );
    }
}
