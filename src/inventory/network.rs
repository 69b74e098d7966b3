//! VPC networks and their subnets
//!
//! Subnets come from one aggregated list per project and are grouped under
//! the network they reference.

use super::{scanned, write_project};
use crate::config::Config;
use crate::gcp::client::GcpClient;
use crate::gcp::http::{describe_failure, ApiError};
use crate::gcp::projects::Project;
use crate::report::{Record, ReportWriter};
use crate::resource::{extract_json_value, extract_short_name, fetch_resources};
use anyhow::Result;
use serde_json::Value;
use std::io::Write;

#[derive(Debug, Clone, PartialEq)]
pub struct SubnetRecord {
    /// Display name of the project
    pub project: String,
    pub vpc: String,
    pub subnet: String,
    pub region: String,
    pub range: String,
    /// Secondary CIDR ranges, comma separated
    pub secondary_ranges: String,
    pub gateway: String,
}

impl SubnetRecord {
    pub fn from_subnetwork(project: &str, vpc: &str, subnet: &Value) -> Self {
        let secondary: Vec<&str> = subnet
            .get("secondaryIpRanges")
            .and_then(|r| r.as_array())
            .into_iter()
            .flatten()
            .filter_map(|r| r.get("ipCidrRange").and_then(|c| c.as_str()))
            .collect();

        Self {
            project: project.to_string(),
            vpc: vpc.to_string(),
            subnet: extract_json_value(subnet, "name", ""),
            region: extract_short_name(&extract_json_value(subnet, "region", "")),
            range: extract_json_value(subnet, "ipCidrRange", ""),
            secondary_ranges: secondary.join(","),
            gateway: extract_json_value(subnet, "gatewayAddress", ""),
        }
    }
}

impl Record for SubnetRecord {
    const HEADERS: &'static [&'static str] = &[
        "PROJECT",
        "VPC",
        "SUBNET",
        "REGION",
        "RANGE",
        "SECONDARY_RANGES",
        "GATEWAY",
    ];
    const WIDTHS: &'static [usize] = &[35, 30, 45, 25, 20, 35, 16];

    fn fields(&self) -> Vec<String> {
        vec![
            self.project.clone(),
            self.vpc.clone(),
            self.subnet.clone(),
            self.region.clone(),
            self.range.clone(),
            self.secondary_ranges.clone(),
            self.gateway.clone(),
        ]
    }
}

/// Rows for each network, in network order, from an already fetched subnet list
pub fn group_subnets(project: &str, networks: &[Value], subnets: &[Value]) -> Vec<SubnetRecord> {
    let mut records = Vec::new();
    for network in networks {
        let vpc = extract_json_value(network, "name", "");
        let suffix = format!("/networks/{}", vpc);
        let before = records.len();

        records.extend(
            subnets
                .iter()
                .filter(|s| {
                    s.get("network")
                        .and_then(|n| n.as_str())
                        .is_some_and(|n| n.ends_with(&suffix))
                })
                .map(|s| SubnetRecord::from_subnetwork(project, &vpc, s)),
        );

        if records.len() == before {
            tracing::info!("No subnets found for VPC {} in {}", vpc, project);
        }
    }
    records
}

pub async fn list_subnets(client: &GcpClient, project: &Project) -> Result<Vec<SubnetRecord>, ApiError> {
    let networks = fetch_resources(
        client,
        &client.compute_global_url(&project.project_id, "networks"),
        "items",
    )
    .await?;
    if networks.is_empty() {
        tracing::info!("No VPC found in project {}", project.project_id);
        return Ok(Vec::new());
    }

    let subnets = fetch_resources(
        client,
        &client.compute_aggregated_url(&project.project_id, "subnetworks"),
        "items",
    )
    .await?;

    let display_name = if project.name == "-" {
        &project.project_id
    } else {
        &project.name
    };
    Ok(group_subnets(display_name, &networks, &subnets))
}

pub async fn export<W: Write, C: Write>(
    client: &GcpClient,
    config: &Config,
    projects: &[Project],
    sink: &mut ReportWriter<SubnetRecord, W, C>,
) -> Result<()> {
    for project in scanned(projects, config) {
        match list_subnets(client, project).await {
            Ok(records) => write_project(sink, &project.project_id, &records)?,
            Err(e) => tracing::warn!(
                "Failed to list VPCs/subnets for project '{}': {}",
                project.project_id,
                describe_failure(&e)
            ),
        }
    }
    Ok(())
}
