//! GCP API interaction module
//!
//! This module provides the core functionality for interacting with Google Cloud Platform
//! APIs, including authentication, HTTP client, and project management.
//!
//! # Module Structure
//!
//! - [`credentials`] - User credential record and its single-slot file cache
//! - [`oauth`] - Installed-app OAuth flow (consent, code exchange, refresh)
//! - [`provider`] - Credential acquisition state machine
//! - [`auth`] - Bearer token sources (user credential or ADC)
//! - [`client`] - Main GCP client for making API requests
//! - [`http`] - HTTP utilities for REST API calls
//! - [`projects`] - Project listing
//!
//! # Example
//!
//! ```ignore
//! use crate::gcp::client::GcpClient;
//!
//! async fn example(client: &GcpClient) -> anyhow::Result<()> {
//!     let url = client.compute_zonal_url("my-project", "us-central1-a", "instances");
//!     let instances = client.get(&url, &[]).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod credentials;
pub mod http;
pub mod oauth;
pub mod projects;
pub mod provider;
