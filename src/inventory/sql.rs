//! Cloud SQL instances

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

/// Environment tag derived from substrings of the project id, first match wins
const ENVIRONMENTS: &[(&str, &str)] = &[("dev", "DEV"), ("prd", "PRD"), ("hml", "HML")];

pub fn environment(project_id: &str) -> &'static str {
    ENVIRONMENTS
        .iter()
        .find(|(needle, _)| project_id.contains(needle))
        .map_or("", |&(_, env)| env)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlRecord {
    pub env: String,
    pub project_id: String,
    pub instance: String,
    pub version: String,
    pub backup: String,
    pub public_ip: String,
    pub private_ip: String,
    pub tier: String,
    pub disk_type: String,
    pub size_gb: String,
    pub location: String,
}

impl SqlRecord {
    pub fn from_instance(project_id: &str, instance: &Value) -> Self {
        Self {
            env: environment(project_id).to_string(),
            project_id: project_id.to_string(),
            instance: extract_json_value(instance, "name", ""),
            version: extract_json_value(instance, "databaseInstalledVersion", ""),
            backup: backup_state(instance).to_string(),
            public_ip: address_of_type(instance, "PRIMARY"),
            private_ip: address_of_type(instance, "PRIVATE"),
            tier: extract_json_value(instance, "settings.tier", ""),
            disk_type: extract_json_value(instance, "settings.dataDiskType", ""),
            size_gb: extract_json_value(instance, "settings.dataDiskSizeGb", ""),
            location: extract_json_value(instance, "settings.locationPreference.zone", ""),
        }
    }
}

fn backup_state(instance: &Value) -> &'static str {
    let enabled = instance
        .pointer("/settings/backupConfiguration/enabled")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if enabled {
        "True"
    } else if instance.get("instanceType").and_then(|v| v.as_str()) == Some("READ_REPLICA_INSTANCE") {
        "REPLICA"
    } else {
        "False"
    }
}

fn address_of_type(instance: &Value, kind: &str) -> String {
    instance
        .get("ipAddresses")
        .and_then(|a| a.as_array())
        .into_iter()
        .flatten()
        .find(|a| a.get("type").and_then(|t| t.as_str()) == Some(kind))
        .and_then(|a| a.get("ipAddress").and_then(|ip| ip.as_str()))
        .unwrap_or_default()
        .to_string()
}

impl Record for SqlRecord {
    const HEADERS: &'static [&'static str] = &[
        "ENV",
        "PROJECT_ID",
        "INSTANCE",
        "VERSION",
        "BACKUP",
        "PUBLIC_IP",
        "PRIVATE_IP",
        "TIER",
        "DISK_TYPE",
        "SIZE_GB",
        "LOCATION",
    ];
    const WIDTHS: &'static [usize] = &[4, 25, 30, 30, 7, 15, 15, 23, 10, 8, 10];

    fn fields(&self) -> Vec<String> {
        vec![
            self.env.clone(),
            self.project_id.clone(),
            self.instance.clone(),
            self.version.clone(),
            self.backup.clone(),
            self.public_ip.clone(),
            self.private_ip.clone(),
            self.tier.clone(),
            self.disk_type.clone(),
            self.size_gb.clone(),
            self.location.clone(),
        ]
    }
}

pub async fn list_instances(client: &GcpClient, project_id: &str) -> Result<Vec<SqlRecord>, ApiError> {
    let url = client.sqladmin_url(project_id, "instances");
    let items = fetch_resources(client, &url, "items").await?;
    Ok(items
        .iter()
        .map(|i| SqlRecord::from_instance(project_id, i))
        .collect())
}

pub async fn export<W: Write, C: Write>(
    client: &GcpClient,
    config: &Config,
    projects: &[Project],
    sink: &mut ReportWriter<SqlRecord, W, C>,
) -> Result<()> {
    for project in scanned(projects, config) {
        match list_instances(client, &project.project_id).await {
            Ok(records) => write_project(sink, &project.project_id, &records)?,
            Err(e) => tracing::warn!(
                "Failed to list Cloud SQL instances for project '{}': {}",
                project.project_id,
                describe_failure(&e)
            ),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_environment() {
        assert_eq!(environment("billing-prd"), "PRD");
        assert_eq!(environment("web-dev-01"), "DEV");
        assert_eq!(environment("crm-hml"), "HML");
        assert_eq!(environment("shared"), "");
        // dev is checked before prd
        assert_eq!(environment("dev-prd"), "DEV");
    }

    #[test]
    fn test_from_instance() {
        let record = SqlRecord::from_instance(
            "billing-prd",
            &json!({
                "name": "billing-db",
                "databaseInstalledVersion": "POSTGRES_15_4",
                "instanceType": "CLOUD_SQL_INSTANCE",
                "ipAddresses": [
                    {"type": "PRIVATE", "ipAddress": "10.10.0.3"},
                    {"type": "PRIMARY", "ipAddress": "34.1.2.3"}
                ],
                "settings": {
                    "tier": "db-custom-2-7680",
                    "dataDiskType": "PD_SSD",
                    "dataDiskSizeGb": "100",
                    "backupConfiguration": {"enabled": true},
                    "locationPreference": {"zone": "us-east1-b"}
                }
            }),
        );
        assert_eq!(
            record.fields(),
            vec![
                "PRD",
                "billing-prd",
                "billing-db",
                "POSTGRES_15_4",
                "True",
                "34.1.2.3",
                "10.10.0.3",
                "db-custom-2-7680",
                "PD_SSD",
                "100",
                "us-east1-b"
            ]
        );
    }

    #[test]
    fn test_backup_and_address_fallbacks() {
        let replica = json!({"instanceType": "READ_REPLICA_INSTANCE", "settings": {}});
        assert_eq!(backup_state(&replica), "REPLICA");
        assert_eq!(backup_state(&json!({})), "False");

        let record = SqlRecord::from_instance("p", &replica);
        assert_eq!(record.public_ip, "");
        assert_eq!(record.private_ip, "");
        assert_eq!(record.location, "");
    }
}
