//! GCP Projects
//!
//! Functions for listing GCP projects through Resource Manager.

use super::client::GcpClient;
use super::http::ApiError;
use crate::resource::fetch_resources;
use serde_json::Value;
use std::fmt;

/// Project lifecycle state as reported by Resource Manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Active,
    DeleteRequested,
    DeleteInProgress,
    Unknown(String),
}

impl LifecycleState {
    pub fn parse(value: &str) -> Self {
        match value {
            "ACTIVE" => LifecycleState::Active,
            "DELETE_REQUESTED" => LifecycleState::DeleteRequested,
            "DELETE_IN_PROGRESS" => LifecycleState::DeleteInProgress,
            other => LifecycleState::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LifecycleState::Active => "ACTIVE",
            LifecycleState::DeleteRequested => "DELETE_REQUESTED",
            LifecycleState::DeleteInProgress => "DELETE_IN_PROGRESS",
            LifecycleState::Unknown(s) => s,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Project information
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub project_number: String,
    pub lifecycle_state: LifecycleState,
}

impl Project {
    pub fn is_active(&self) -> bool {
        self.lifecycle_state == LifecycleState::Active
    }
}

impl From<&Value> for Project {
    fn from(value: &Value) -> Self {
        Self {
            project_id: value
                .get("projectId")
                .and_then(|v| v.as_str())
                .unwrap_or("-")
                .to_string(),
            name: value
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("-")
                .to_string(),
            project_number: value
                .get("projectNumber")
                .and_then(|v| v.as_str())
                .unwrap_or("-")
                .to_string(),
            lifecycle_state: LifecycleState::parse(
                value
                    .get("lifecycleState")
                    .and_then(|v| v.as_str())
                    .unwrap_or("UNKNOWN"),
            ),
        }
    }
}

/// List every GCP project visible to the caller, following pagination
pub async fn list_projects(client: &GcpClient) -> Result<Vec<Project>, ApiError> {
    let url = client.resourcemanager_url("projects");
    let items = fetch_resources(client, &url, "projects").await?;

    let projects: Vec<Project> = items
        .iter()
        .map(Project::from)
        .filter(|p| p.project_id != "-")
        .collect();

    tracing::info!("Found {} projects", projects.len());
    Ok(projects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_from_value() {
        let project = Project::from(&json!({
            "projectId": "billing-prd",
            "name": "Billing",
            "projectNumber": "123456",
            "lifecycleState": "ACTIVE"
        }));
        assert_eq!(project.project_id, "billing-prd");
        assert_eq!(project.project_number, "123456");
        assert!(project.is_active());
    }

    #[test]
    fn test_project_defaults() {
        let project = Project::from(&json!({"projectId": "p"}));
        assert_eq!(project.name, "-");
        assert_eq!(project.lifecycle_state, LifecycleState::Unknown("UNKNOWN".to_string()));
        assert!(!project.is_active());
    }

    #[test]
    fn test_lifecycle_round_trip() {
        for s in ["ACTIVE", "DELETE_REQUESTED", "DELETE_IN_PROGRESS", "WEIRD"] {
            assert_eq!(LifecycleState::parse(s).as_str(), s);
        }
    }
}
