//! Resource listing layer
//!
//! - [`fetcher`] - Follows `nextPageToken` pagination on GCP list endpoints
//! - [`scanner`] - Fans a per-zone listing out over a bounded worker pool

mod fetcher;
pub mod scanner;

pub use fetcher::{
    extract_json_value, extract_short_name, fetch_resources, fetch_resources_paginated,
    split_page, PaginatedResult, NOT_AVAILABLE,
};
pub use scanner::{ScanReport, ZoneFailure, ZoneLister, ZoneOutcome, ZoneScanner};
