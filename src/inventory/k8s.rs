//! GKE clusters, one row per node pool

use super::{scanned, write_project};
use crate::config::Config;
use crate::gcp::client::GcpClient;
use crate::gcp::http::{describe_failure, ApiError};
use crate::gcp::projects::Project;
use crate::report::{Record, ReportWriter};
use crate::resource::{extract_json_value, fetch_resources};
use anyhow::Result;
use serde_json::Value;
use std::io::Write;

/// Cluster column of the row written when a project's GKE API can't be listed
pub const GKE_UNAVAILABLE: &str = "GKE API UNAVAILABLE";

#[derive(Debug, Clone, PartialEq)]
pub struct NodePoolRecord {
    pub project_id: String,
    pub cluster: String,
    pub cluster_version: String,
    pub pool: String,
    pub nodes: String,
    pub machine_type: String,
    pub autoscaling: String,
    pub zones: String,
}

impl NodePoolRecord {
    /// Rows of one cluster descriptor; a cluster without node pools yields none
    pub fn from_cluster(project_id: &str, cluster: &Value) -> Vec<Self> {
        let name = extract_json_value(cluster, "name", "");
        let version = extract_json_value(cluster, "currentMasterVersion", "");
        let nodes = extract_json_value(cluster, "currentNodeCount", "0");
        let autoscaling = extract_json_value(cluster, "autoscaling.autoscalingProfile", "");
        let zones = cluster
            .get("locations")
            .and_then(|l| l.as_array())
            .map_or(0, |l| l.len())
            .to_string();

        cluster
            .get("nodePools")
            .and_then(|p| p.as_array())
            .into_iter()
            .flatten()
            .map(|pool| Self {
                project_id: project_id.to_string(),
                cluster: name.clone(),
                cluster_version: version.clone(),
                pool: extract_json_value(pool, "name", ""),
                nodes: nodes.clone(),
                machine_type: extract_json_value(pool, "config.machineType", ""),
                autoscaling: autoscaling.clone(),
                zones: zones.clone(),
            })
            .collect()
    }

    /// Placeholder row for a project whose clusters could not be listed
    pub fn unavailable(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            cluster: GKE_UNAVAILABLE.to_string(),
            cluster_version: String::new(),
            pool: String::new(),
            nodes: String::new(),
            machine_type: String::new(),
            autoscaling: String::new(),
            zones: String::new(),
        }
    }
}

impl Record for NodePoolRecord {
    const HEADERS: &'static [&'static str] = &[
        "PROJECT_ID",
        "CLUSTER",
        "CLUSTER_VERSION",
        "POOL",
        "NODES",
        "MACHINE_TYPE",
        "AUTOSCALING",
        "ZONES",
    ];
    const WIDTHS: &'static [usize] = &[28, 40, 20, 35, 5, 18, 20, 5];

    fn fields(&self) -> Vec<String> {
        vec![
            self.project_id.clone(),
            self.cluster.clone(),
            self.cluster_version.clone(),
            self.pool.clone(),
            self.nodes.clone(),
            self.machine_type.clone(),
            self.autoscaling.clone(),
            self.zones.clone(),
        ]
    }
}

/// Clusters in every location of a project
pub async fn list_clusters(client: &GcpClient, project_id: &str) -> Result<Vec<NodePoolRecord>, ApiError> {
    let url = client.container_location_url(project_id, "-", "clusters");
    let clusters = fetch_resources(client, &url, "clusters").await?;
    Ok(clusters
        .iter()
        .flat_map(|c| NodePoolRecord::from_cluster(project_id, c))
        .collect())
}

pub async fn export<W: Write, C: Write>(
    client: &GcpClient,
    config: &Config,
    projects: &[Project],
    sink: &mut ReportWriter<NodePoolRecord, W, C>,
) -> Result<()> {
    for project in scanned(projects, config) {
        match list_clusters(client, &project.project_id).await {
            Ok(records) => write_project(sink, &project.project_id, &records)?,
            Err(e) => {
                tracing::warn!(
                    "Failed to list GKE clusters for project '{}': {}",
                    project.project_id,
                    describe_failure(&e)
                );
                sink.write(&NodePoolRecord::unavailable(&project.project_id))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_one_row_per_pool() {
        let rows = NodePoolRecord::from_cluster(
            "p1",
            &json!({
                "name": "prod",
                "currentMasterVersion": "1.29.4-gke.100",
                "currentNodeCount": 6,
                "autoscaling": {"autoscalingProfile": "BALANCED"},
                "locations": ["us-east1-b", "us-east1-c", "us-east1-d"],
                "nodePools": [
                    {"name": "default", "config": {"machineType": "e2-standard-4"}},
                    {"name": "batch", "config": {"machineType": "n2-highmem-8"}}
                ]
            }),
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[1].fields(),
            vec!["p1", "prod", "1.29.4-gke.100", "batch", "6", "n2-highmem-8", "BALANCED", "3"]
        );
    }

    #[test]
    fn test_missing_fields() {
        let rows = NodePoolRecord::from_cluster("p1", &json!({"name": "c", "nodePools": [{}]}));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].nodes, "0");
        assert_eq!(rows[0].zones, "0");
        assert_eq!(rows[0].machine_type, "");

        assert!(NodePoolRecord::from_cluster("p1", &json!({"name": "empty"})).is_empty());
    }

    #[test]
    fn test_unavailable_row() {
        let fields = NodePoolRecord::unavailable("p9").fields();
        assert_eq!(fields[0], "p9");
        assert_eq!(fields[1], GKE_UNAVAILABLE);
        assert!(fields[2..].iter().all(|f| f.is_empty()));
        assert_eq!(fields.len(), NodePoolRecord::HEADERS.len());
    }
}
