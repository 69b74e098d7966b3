//! Parallel Zone Scanner
//!
//! Lists compute instances for every zone of a project concurrently. The
//! worker budget is a single semaphore created once per run and shared by the
//! scans of every project, so a long project loop never has more than
//! `max_concurrency` zone listings in flight.
//!
//! Each zone is isolated: an API error, a timeout or even a panic in one task
//! is logged and contributes nothing, while the other zones carry on.

use crate::gcp::http::ApiError;
use crate::inventory::vm::VmRecord;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Source of per-zone instance descriptors
#[async_trait]
pub trait ZoneLister: Send + Sync + 'static {
    async fn list_instances(&self, project_id: &str, zone: &str) -> Result<Vec<Value>, ApiError>;
}

/// Why one zone contributed nothing
#[derive(Debug, Error)]
pub enum ZoneFailure {
    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("worker pool closed")]
    PoolClosed,
}

/// Result of a single zone task
#[derive(Debug)]
pub struct ZoneOutcome {
    pub zone: String,
    pub result: Result<Vec<VmRecord>, ZoneFailure>,
}

/// Aggregate of one project scan
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Records in task completion order
    pub records: Vec<VmRecord>,
    /// Zones that failed, with the reason
    pub failures: Vec<(String, ZoneFailure)>,
    /// Number of zones submitted
    pub zones: usize,
}

impl ScanReport {
    /// Every submitted zone failed (typically a rejected credential or a
    /// disabled Compute API)
    pub fn all_failed(&self) -> bool {
        self.zones > 0 && self.failures.len() == self.zones
    }
}

/// Bounded, reusable zone fan-out
pub struct ZoneScanner<L: ZoneLister> {
    lister: Arc<L>,
    permits: Arc<Semaphore>,
    zone_timeout: Duration,
    managed_node_prefix: Arc<str>,
}

impl<L: ZoneLister> Clone for ZoneScanner<L> {
    fn clone(&self) -> Self {
        Self {
            lister: Arc::clone(&self.lister),
            permits: Arc::clone(&self.permits),
            zone_timeout: self.zone_timeout,
            managed_node_prefix: Arc::clone(&self.managed_node_prefix),
        }
    }
}

impl<L: ZoneLister> ZoneScanner<L> {
    pub fn new(
        lister: Arc<L>,
        max_concurrency: usize,
        zone_timeout: Duration,
        managed_node_prefix: &str,
    ) -> Self {
        Self {
            lister,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            zone_timeout,
            managed_node_prefix: Arc::from(managed_node_prefix),
        }
    }

    /// Scan every zone of a project and aggregate the surviving records
    pub async fn scan(&self, project_id: &str, zones: &[String]) -> ScanReport {
        let mut report = ScanReport {
            zones: zones.len(),
            ..ScanReport::default()
        };

        let mut tasks = JoinSet::new();
        for zone in zones {
            let lister = Arc::clone(&self.lister);
            let permits = Arc::clone(&self.permits);
            let prefix = Arc::clone(&self.managed_node_prefix);
            let project_id = project_id.to_string();
            let zone = zone.clone();
            let zone_timeout = self.zone_timeout;

            tasks.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => {
                        let work = fetch_zone(lister.as_ref(), &project_id, &zone, &prefix);
                        match AssertUnwindSafe(tokio::time::timeout(zone_timeout, work))
                            .catch_unwind()
                            .await
                        {
                            Ok(Ok(result)) => result,
                            Ok(Err(_)) => Err(ZoneFailure::Timeout(zone_timeout)),
                            Err(panic) => Err(ZoneFailure::Panicked(panic_message(panic))),
                        }
                    }
                    Err(_) => Err(ZoneFailure::PoolClosed),
                };
                ZoneOutcome { zone, result }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(ZoneOutcome { zone, result: Ok(records) }) => {
                    tracing::debug!(
                        "Zone {} in project {}: {} instance(s)",
                        zone,
                        project_id,
                        records.len()
                    );
                    report.records.extend(records);
                }
                Ok(ZoneOutcome { zone, result: Err(failure) }) => {
                    tracing::warn!(
                        "Failed to list VMs in project '{}' zone '{}': {}",
                        project_id,
                        zone,
                        failure
                    );
                    report.failures.push((zone, failure));
                }
                Err(e) => {
                    // Only reachable if the task was cancelled; the zone is unknown here
                    tracing::warn!("Zone task in project '{}' did not complete: {}", project_id, e);
                    report
                        .failures
                        .push(("<unknown>".to_string(), ZoneFailure::Panicked(e.to_string())));
                }
            }
        }

        report
    }
}

async fn fetch_zone<L: ZoneLister>(
    lister: &L,
    project_id: &str,
    zone: &str,
    managed_node_prefix: &str,
) -> Result<Vec<VmRecord>, ZoneFailure> {
    let instances = lister.list_instances(project_id, zone).await?;
    Ok(instances
        .iter()
        .filter(|instance| !is_managed_node(instance, managed_node_prefix))
        .map(|instance| VmRecord::from_instance(project_id, zone, instance))
        .collect())
}

/// Instances created by a GKE node pool are reported by the cluster listing
pub fn is_managed_node(instance: &Value, prefix: &str) -> bool {
    !prefix.is_empty()
        && instance
            .get("name")
            .and_then(|n| n.as_str())
            .is_some_and(|name| name.starts_with(prefix))
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
