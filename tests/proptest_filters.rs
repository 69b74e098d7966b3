//! Property-based tests using proptest
//!
//! These tests verify the managed-node exclusion filter, record flattening,
//! page splitting and zone-scan aggregation using randomized inputs.

use async_trait::async_trait;
use gcp_inventory::gcp::http::ApiError;
use gcp_inventory::inventory::sql::environment;
use gcp_inventory::inventory::vm::VmRecord;
use gcp_inventory::report::Record;
use gcp_inventory::resource::scanner::is_managed_node;
use gcp_inventory::resource::{split_page, ZoneLister, ZoneScanner};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Generate arbitrary VM instance data for testing
fn arb_instance() -> impl Strategy<Value = Value> {
    (
        prop_oneof!["[a-z][a-z0-9-]{0,30}", "gke[a-z0-9-]{0,30}"],
        prop_oneof!["RUNNING", "STOPPED", "TERMINATED", "PROVISIONING", "STAGING"],
        prop::option::of("10\\.[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}"),
        prop::option::of("[a-z0-9-]{1,20}"),
    )
        .prop_map(|(name, status, ip, license)| {
            let mut instance = json!({"name": name, "status": status});
            if let Some(ip) = ip {
                instance["networkInterfaces"] = json!([{"networkIP": ip}]);
            }
            if let Some(license) = license {
                instance["disks"] = json!([{
                    "licenses": [format!("https://www.googleapis.com/compute/v1/projects/x/global/licenses/{}", license)]
                }]);
            }
            instance
        })
}

/// Generate a list of instances
fn arb_instance_list() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(arb_instance(), 0..40)
}

proptest! {
    /// Exactly the names carrying the prefix are excluded
    #[test]
    fn managed_node_filter_matches_prefix(items in arb_instance_list()) {
        for item in &items {
            let name = item["name"].as_str().unwrap();
            prop_assert_eq!(is_managed_node(item, "gke"), name.starts_with("gke"));
        }
    }

    /// An empty prefix excludes nothing
    #[test]
    fn empty_prefix_keeps_everything(items in arb_instance_list()) {
        prop_assert!(items.iter().all(|i| !is_managed_node(i, "")));
    }

    /// Flattening never yields an empty field; missing data becomes N/A
    #[test]
    fn vm_fields_never_empty(instance in arb_instance(), zone in "[a-z]+-[a-z]+[0-9]-[a-z]") {
        let record = VmRecord::from_instance("p1", &zone, &instance);
        let fields = record.fields();
        prop_assert_eq!(fields.len(), VmRecord::HEADERS.len());
        prop_assert!(fields.iter().all(|f| !f.is_empty()));
        if instance.get("networkInterfaces").is_none() {
            prop_assert_eq!(record.private_ip.as_str(), "N/A");
        }
        if instance.get("disks").is_none() {
            prop_assert_eq!(record.os.as_str(), "N/A");
        }
    }

    /// Page splitting keeps every item and drops empty tokens
    #[test]
    fn split_page_keeps_items(items in arb_instance_list(), token in "[a-zA-Z0-9]{0,8}") {
        let page = split_page(&json!({"items": items.clone(), "nextPageToken": token.clone()}), "items");
        prop_assert_eq!(page.items, items);
        prop_assert_eq!(page.next_token.is_none(), token.is_empty());
    }

    /// Environment tag is one of the known values and follows the first match
    #[test]
    fn environment_is_known(project_id in "[a-z0-9-]{1,30}") {
        let env = environment(&project_id);
        prop_assert!(["", "DEV", "PRD", "HML"].contains(&env));
        if project_id.contains("dev") {
            prop_assert_eq!(env, "DEV");
        }
        if env.is_empty() {
            prop_assert!(!project_id.contains("prd") && !project_id.contains("hml"));
        }
    }
}

/// Zone fixture: `Ok(names)` lists those instances, `Err(())` fails
struct MapLister(HashMap<String, Result<Vec<Value>, ()>>);

#[async_trait]
impl ZoneLister for MapLister {
    async fn list_instances(&self, _project: &str, zone: &str) -> Result<Vec<Value>, ApiError> {
        match self.0.get(zone) {
            Some(Ok(items)) => Ok(items.clone()),
            _ => Err(ApiError::Status {
                status: 503,
                message: "backend error".to_string(),
            }),
        }
    }
}

fn arb_zones() -> impl Strategy<Value = Vec<Result<Vec<Value>, ()>>> {
    prop::collection::vec(
        prop_oneof![
            3 => arb_instance_list().prop_map(Ok),
            1 => Just(Err(())),
        ],
        0..12,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The scan returns the multiset union of every successful zone minus
    /// managed nodes, whatever the completion order
    #[test]
    fn scan_is_union_of_successful_zones(zones in arb_zones(), workers in 1usize..6) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        let names: Vec<String> = (0..zones.len()).map(|i| format!("zone-{}", i)).collect();
        let mut expected: Vec<(String, String)> = Vec::new();
        let mut failed = 0;
        for (zone, result) in names.iter().zip(&zones) {
            match result {
                Ok(items) => expected.extend(
                    items
                        .iter()
                        .map(|i| i["name"].as_str().unwrap().to_string())
                        .filter(|n| !n.starts_with("gke"))
                        .map(|n| (zone.clone(), n)),
                ),
                Err(()) => failed += 1,
            }
        }

        let lister = MapLister(names.iter().cloned().zip(zones).collect());
        let scanner = ZoneScanner::new(Arc::new(lister), workers, Duration::from_secs(5), "gke");
        let report = runtime.block_on(scanner.scan("p1", &names));

        let mut actual: Vec<(String, String)> = report
            .records
            .iter()
            .map(|r| (r.zone.clone(), r.name.clone()))
            .collect();
        actual.sort();
        expected.sort();

        prop_assert_eq!(actual, expected);
        prop_assert_eq!(report.failures.len(), failed);
        prop_assert_eq!(report.all_failed(), !names.is_empty() && failed == names.len());
    }
}
