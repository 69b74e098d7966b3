//! gcp-inventory
//!
//! Exports a Google Cloud inventory (projects, VMs, GKE node pools, Cloud SQL
//! instances, VPC subnets) across every visible project to CSV.

pub mod config;
pub mod gcp;
pub mod inventory;
pub mod report;
pub mod resource;
