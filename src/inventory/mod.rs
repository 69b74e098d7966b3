//! Inventory listings
//!
//! One module per resource class. Each flattens API descriptors into a
//! fixed-column [`Record`](crate::report::Record) and streams the rows into a
//! [`ReportWriter`].
//!
//! Projects are enumerated once per run; a failure there is fatal. Failures
//! below the project level are logged and the run carries on.

pub mod k8s;
pub mod network;
pub mod projects;
pub mod sql;
pub mod vm;

use crate::config::Config;
use crate::gcp::client::GcpClient;
use crate::gcp::projects::{list_projects, Project};
use crate::report::{Record, ReportWriter};
use anyhow::{Context, Result};
use clap::Subcommand;
use std::fmt;
use std::io::Write;

/// Resource class exported by one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Listing {
    /// List every visible project
    Projects,
    /// List compute instances of active projects, zone by zone
    Vm,
    /// List GKE clusters, one row per node pool
    K8s,
    /// List Cloud SQL instances
    Sql,
    /// List VPC networks and their subnets
    Network,
}

impl Listing {
    /// Stem of the CSV and log file names
    pub fn name(&self) -> &'static str {
        match self {
            Listing::Projects => "projects",
            Listing::Vm => "vm",
            Listing::K8s => "k8s",
            Listing::Sql => "sql",
            Listing::Network => "network",
        }
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Run one listing end to end and return the number of rows written
pub async fn export(listing: Listing, client: &GcpClient, config: &Config) -> Result<usize> {
    let projects = list_projects(client)
        .await
        .context("Failed to list projects")?;
    let path = config.output_path(listing.name());

    match listing {
        Listing::Projects => {
            let mut sink = ReportWriter::create(&path)?;
            projects::export(&projects, config, &mut sink)?;
            sink.finish()
        }
        Listing::Vm => {
            let mut sink = ReportWriter::create(&path)?;
            vm::export(client, config, &projects, &mut sink).await?;
            sink.finish()
        }
        Listing::K8s => {
            let mut sink = ReportWriter::create(&path)?;
            k8s::export(client, config, &projects, &mut sink).await?;
            sink.finish()
        }
        Listing::Sql => {
            let mut sink = ReportWriter::create(&path)?;
            sql::export(client, config, &projects, &mut sink).await?;
            sink.finish()
        }
        Listing::Network => {
            let mut sink = ReportWriter::create(&path)?;
            network::export(client, config, &projects, &mut sink).await?;
            sink.finish()
        }
    }
}

/// Projects a listing visits, minus the configured exclusions
pub(crate) fn scanned<'a>(
    projects: &'a [Project],
    config: &'a Config,
) -> impl Iterator<Item = &'a Project> + 'a {
    projects.iter().filter(move |p| {
        let excluded = config.is_excluded(&p.project_id);
        if excluded {
            tracing::debug!("Skipping excluded project {}", p.project_id);
        }
        !excluded
    })
}

/// Write a batch of records, logging how many came from the project
pub(crate) fn write_project<R: Record, W: Write, C: Write>(
    sink: &mut ReportWriter<R, W, C>,
    project_id: &str,
    records: &[R],
) -> Result<()> {
    tracing::info!("Project {}: {} row(s)", project_id, records.len());
    sink.write_all(records)
}
