//! Resource Fetcher
//!
//! Paginated listing for GCP list endpoints, plus the small JSON helpers the
//! listings use to flatten descriptors.

use crate::gcp::client::GcpClient;
use crate::gcp::http::ApiError;
use serde_json::Value;

/// Sentinel for fields a descriptor does not carry
pub const NOT_AVAILABLE: &str = "N/A";

/// Upper bound on pages for one listing, in case an endpoint keeps handing
/// back the same token
const MAX_PAGES: usize = 10_000;

/// Result of paginated fetch
#[derive(Debug)]
pub struct PaginatedResult {
    pub items: Vec<Value>,
    pub next_token: Option<String>,
}

/// Fetch all resources (auto-paginate)
pub async fn fetch_resources(
    client: &GcpClient,
    url: &str,
    items_key: &str,
) -> Result<Vec<Value>, ApiError> {
    let mut all_items = Vec::new();
    let mut page_token: Option<String> = None;

    for _ in 0..MAX_PAGES {
        let result = fetch_resources_paginated(client, url, items_key, page_token.as_deref()).await?;
        all_items.extend(result.items);

        match result.next_token {
            Some(token) if Some(token.as_str()) != page_token.as_deref() => page_token = Some(token),
            Some(_) => {
                tracing::warn!("Pagination token repeated for {}, stopping", url);
                break;
            }
            None => break,
        }
    }

    Ok(all_items)
}

/// Fetch one page of resources
pub async fn fetch_resources_paginated(
    client: &GcpClient,
    url: &str,
    items_key: &str,
    page_token: Option<&str>,
) -> Result<PaginatedResult, ApiError> {
    let mut query: Vec<(&str, &str)> = Vec::new();
    if let Some(token) = page_token {
        query.push(("pageToken", token));
    }

    let response = client.get(url, &query).await?;
    Ok(split_page(&response, items_key))
}

/// Split a list response into its items and continuation token
pub fn split_page(response: &Value, items_key: &str) -> PaginatedResult {
    let items = match response.get(items_key) {
        Some(Value::Array(arr)) => arr.clone(),
        // Aggregated lists key their items by scope
        Some(Value::Object(_)) => flatten_aggregated_items(response, items_key),
        _ => Vec::new(),
    };

    let next_token = response
        .get("nextPageToken")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    PaginatedResult { items, next_token }
}

/// Flatten an aggregated list (`{"items": {"regions/x": {"subnetworks": [...]}}}`)
fn flatten_aggregated_items(response: &Value, items_key: &str) -> Vec<Value> {
    let Some(items) = response.get(items_key).and_then(|v| v.as_object()) else {
        return Vec::new();
    };

    let mut all_items: Vec<Value> = Vec::new();

    for (_scope, scope_data) in items {
        if let Some(obj) = scope_data.as_object() {
            for (key, value) in obj {
                // Scopes without resources only carry a warning
                if key == "warning" {
                    continue;
                }
                if let Some(arr) = value.as_array() {
                    all_items.extend(arr.iter().cloned());
                }
            }
        }
    }

    all_items
}

/// Extract short name from GCP resource URL
/// e.g., "https://www.googleapis.com/compute/v1/projects/my-project/zones/us-central1-a" -> "us-central1-a"
pub fn extract_short_name(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

/// Extract a value from JSON using a dot-notation path, or `default`
pub fn extract_json_value(item: &Value, path: &str, default: &str) -> String {
    let mut current = item;

    for part in path.split('.') {
        // Handle array index
        let next = match part.parse::<usize>() {
            Ok(idx) => current.get(idx),
            Err(_) => current.get(part),
        };
        current = match next {
            Some(v) => v,
            None => return default.to_string(),
        };
    }

    match current {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => default.to_string(),
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(_) => "[object]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_page_with_token() {
        let page = split_page(
            &json!({"items": [{"name": "a"}, {"name": "b"}], "nextPageToken": "t2"}),
            "items",
        );
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_token.as_deref(), Some("t2"));
    }

    #[test]
    fn test_split_page_missing_items() {
        let page = split_page(&json!({"kind": "compute#instanceList"}), "items");
        assert!(page.items.is_empty());
        assert!(page.next_token.is_none());
    }

    #[test]
    fn test_empty_token_ends_pagination() {
        let page = split_page(&json!({"projects": [], "nextPageToken": ""}), "projects");
        assert!(page.next_token.is_none());
    }

    #[test]
    fn test_split_aggregated_page() {
        let page = split_page(
            &json!({"items": {
                "regions/us-east1": {"subnetworks": [{"name": "s1"}, {"name": "s2"}]},
                "regions/asia-east1": {"warning": {"code": "NO_RESULTS_ON_PAGE"}},
                "regions/europe-west1": {"subnetworks": [{"name": "s3"}]}
            }}),
            "items",
        );
        let mut names: Vec<_> = page.items.iter().map(|i| i["name"].as_str().unwrap()).collect();
        names.sort();
        assert_eq!(names, vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn test_extract_short_name() {
        assert_eq!(
            extract_short_name("https://www.googleapis.com/compute/v1/projects/p/zones/us-east1-b"),
            "us-east1-b"
        );
        assert_eq!(extract_short_name("plain"), "plain");
    }

    #[test]
    fn test_extract_json_value() {
        let item = json!({"networkInterfaces": [{"networkIP": "10.0.0.2"}], "n": 3, "nil": null});
        assert_eq!(extract_json_value(&item, "networkInterfaces.0.networkIP", "N/A"), "10.0.0.2");
        assert_eq!(extract_json_value(&item, "networkInterfaces.1.networkIP", "N/A"), "N/A");
        assert_eq!(extract_json_value(&item, "n", ""), "3");
        assert_eq!(extract_json_value(&item, "nil", "-"), "-");
    }
}
