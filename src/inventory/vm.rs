//! Compute Engine instances
//!
//! Zones are discovered per project and scanned in parallel by the shared
//! [`ZoneScanner`]. Only active projects are visited.

use super::{scanned, write_project};
use crate::config::Config;
use crate::gcp::client::GcpClient;
use crate::gcp::http::{describe_failure, ApiError};
use crate::gcp::projects::Project;
use crate::report::{Record, ReportWriter};
use crate::resource::{extract_json_value, fetch_resources, ZoneLister, ZoneScanner, NOT_AVAILABLE};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;

/// One compute instance
#[derive(Debug, Clone, PartialEq)]
pub struct VmRecord {
    pub project_id: String,
    pub name: String,
    pub zone: String,
    pub private_ip: String,
    pub os: String,
    pub status: String,
}

impl VmRecord {
    /// Flatten an instance descriptor listed in `zone`
    pub fn from_instance(project_id: &str, zone: &str, instance: &Value) -> Self {
        Self {
            project_id: project_id.to_string(),
            name: extract_json_value(instance, "name", NOT_AVAILABLE),
            zone: zone.to_string(),
            private_ip: extract_json_value(instance, "networkInterfaces.0.networkIP", NOT_AVAILABLE),
            os: boot_license(instance).unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            status: extract_json_value(instance, "status", NOT_AVAILABLE),
        }
    }
}

/// Last path segment of the first license of the first disk
fn boot_license(instance: &Value) -> Option<String> {
    let url = instance
        .get("disks")?
        .get(0)?
        .get("licenses")?
        .get(0)?
        .as_str()?;
    url.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

impl Record for VmRecord {
    const HEADERS: &'static [&'static str] =
        &["PROJECT_ID", "VM", "ZONE", "PRIVATE_IP", "OS", "STATUS"];
    const WIDTHS: &'static [usize] = &[30, 45, 25, 18, 30, 20];

    fn fields(&self) -> Vec<String> {
        vec![
            self.project_id.clone(),
            self.name.clone(),
            self.zone.clone(),
            self.private_ip.clone(),
            self.os.clone(),
            self.status.clone(),
        ]
    }
}

#[async_trait]
impl ZoneLister for GcpClient {
    async fn list_instances(&self, project_id: &str, zone: &str) -> Result<Vec<Value>, ApiError> {
        let url = self.compute_zonal_url(project_id, zone, "instances");
        fetch_resources(self, &url, "items").await
    }
}

/// Zone names of a project
pub async fn list_zones(client: &GcpClient, project_id: &str) -> Result<Vec<String>, ApiError> {
    let url = client.compute_url(project_id, "zones");
    let items = fetch_resources(client, &url, "items").await?;
    Ok(items
        .iter()
        .filter_map(|z| z.get("name").and_then(|n| n.as_str()))
        .map(|n| n.to_string())
        .collect())
}

/// Scan every active project and write its instances
pub async fn export<W: Write, C: Write>(
    client: &GcpClient,
    config: &Config,
    projects: &[Project],
    sink: &mut ReportWriter<VmRecord, W, C>,
) -> Result<()> {
    let scanner = ZoneScanner::new(
        Arc::new(client.clone()),
        config.max_concurrency,
        config.zone_timeout(),
        &config.managed_node_prefix,
    );

    for project in scanned(projects, config) {
        if !project.is_active() {
            tracing::debug!(
                "Skipping project {} in state {}",
                project.project_id,
                project.lifecycle_state
            );
            continue;
        }

        let zones = match list_zones(client, &project.project_id).await {
            Ok(zones) => zones,
            Err(e) => {
                tracing::warn!(
                    "Failed to list zones for project '{}': {}",
                    project.project_id,
                    describe_failure(&e)
                );
                continue;
            }
        };
        if zones.is_empty() {
            tracing::info!("No zones found for project {}", project.project_id);
            continue;
        }

        let report = scanner.scan(&project.project_id, &zones).await;
        if report.all_failed() {
            tracing::warn!(
                "All {} zone(s) failed for project '{}'; is the Compute API enabled?",
                report.zones,
                project.project_id
            );
        }
        write_project(sink, &project.project_id, &report.records)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_instance() {
        let record = VmRecord::from_instance(
            "p1",
            "us-east1-b",
            &json!({
                "name": "web-1",
                "status": "RUNNING",
                "networkInterfaces": [{"networkIP": "10.0.0.2"}, {"networkIP": "10.1.0.2"}],
                "disks": [{"licenses": [
                    "https://www.googleapis.com/compute/v1/projects/debian-cloud/global/licenses/debian-12-bookworm"
                ]}]
            }),
        );
        assert_eq!(record.name, "web-1");
        assert_eq!(record.zone, "us-east1-b");
        assert_eq!(record.private_ip, "10.0.0.2");
        assert_eq!(record.os, "debian-12-bookworm");
        assert_eq!(record.status, "RUNNING");
    }

    #[test]
    fn test_from_instance_fallbacks() {
        let record = VmRecord::from_instance(
            "p1",
            "z",
            &json!({"name": "bare", "networkInterfaces": [], "disks": [{}]}),
        );
        assert_eq!(record.private_ip, "N/A");
        assert_eq!(record.os, "N/A");
        assert_eq!(record.status, "N/A");
        assert_eq!(
            record.fields(),
            vec!["p1", "bare", "z", "N/A", "N/A", "N/A"]
        );
    }

    #[test]
    fn test_headers_match_fields() {
        assert_eq!(VmRecord::HEADERS.len(), VmRecord::WIDTHS.len());
        let record = VmRecord::from_instance("p", "z", &json!({}));
        assert_eq!(record.fields().len(), VmRecord::HEADERS.len());
    }
}
