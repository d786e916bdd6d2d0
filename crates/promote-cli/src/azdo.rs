//! Azure DevOps work-item client over `ureq`.
//!
//! Implements both collaborator traits from `promote-core`: WIQL link
//! queries, batch fetches and revision history on the read side, JSON-Patch
//! updates on the write side. Every call is blocking and counted.

use std::cell::Cell;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use promote_core::config::Connection;
use promote_core::dispatch::PatchOp;
use promote_core::model::{Edge, WorkItemId, WorkItemRecord, WorkItemUpdate};
use promote_core::source::{SinkError, SourceError, WorkItemSink, WorkItemSource};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

const USER_AGENT: &str = concat!("promote-cli/", env!("CARGO_PKG_VERSION"));
const JSON_PATCH: &str = "application/json-patch+json";

/// Fields requested in batch fetches.
const FETCH_FIELDS: &str = "System.Id,System.WorkItemType,System.State,System.Title,System.Description,System.Tags";

/// Revisions requested per history page; the service caps `$top` at 200.
const UPDATES_PAGE: usize = 200;

pub struct AzureDevOpsClient {
    /// `https://dev.azure.com/{org}/{project}/_apis/wit`
    base: String,
    authorization: String,
    api_version: String,
    requests: Cell<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WiqlResponse {
    #[serde(default)]
    work_item_relations: Vec<WiqlRelation>,
    /// Flat queries answer with bare references instead of relations.
    #[serde(default)]
    work_items: Vec<WiqlReference>,
}

#[derive(Debug, Deserialize)]
struct WiqlRelation {
    #[serde(default)]
    source: Option<WiqlReference>,
    target: WiqlReference,
}

#[derive(Debug, Deserialize)]
struct WiqlReference {
    id: WorkItemId,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    /// `errorPolicy=omit` leaves a `null` for every id it could not read.
    #[serde(default)]
    value: Vec<Option<WorkItemRecord>>,
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    value: Vec<WorkItemUpdate>,
}

impl WiqlResponse {
    fn into_edges(self) -> Vec<Edge> {
        if self.work_item_relations.is_empty() {
            return self.work_items.into_iter().map(|item| Edge::root(item.id)).collect();
        }
        self.work_item_relations
            .into_iter()
            .map(|relation| Edge {
                source: relation.source.map(|source| source.id),
                target: relation.target.id,
            })
            .collect()
    }
}

/// `Basic` header value for a personal access token with an empty user.
fn basic_authorization(token: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!(":{token}")))
}

fn api_base(organization: &str, project: &str) -> String {
    let organization = organization.trim_end_matches('/');
    let host = if organization.starts_with("http://") || organization.starts_with("https://") {
        organization.to_string()
    } else {
        format!("https://dev.azure.com/{organization}")
    };
    format!("{host}/{project}/_apis/wit")
}

fn join_ids(ids: &[WorkItemId]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

/// Read the body of a non-2xx response, keeping only a short prefix.
fn status_message(response: ureq::Response) -> String {
    let status_text = response.status_text().to_string();
    response
        .into_string()
        .ok()
        .map(|body| body.trim().chars().take(300).collect::<String>())
        .filter(|body| !body.is_empty())
        .unwrap_or(status_text)
}

fn source_error(url: &str, err: ureq::Error) -> SourceError {
    match err {
        ureq::Error::Status(status, response) => SourceError::Status {
            url: url.to_string(),
            status,
            message: status_message(response),
        },
        ureq::Error::Transport(transport) => SourceError::Transport {
            url: url.to_string(),
            message: transport.to_string(),
        },
    }
}

impl AzureDevOpsClient {
    pub fn new(connection: &Connection) -> Self {
        Self {
            base: api_base(&connection.organization, &connection.project),
            authorization: basic_authorization(&connection.token),
            api_version: connection.api_version.clone(),
            requests: Cell::new(0),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.get()
    }

    fn wiql_url(&self) -> String {
        format!("{}/wiql?api-version={}", self.base, self.api_version)
    }

    fn batch_url(&self, ids: &[WorkItemId]) -> String {
        format!(
            "{}/workitems?ids={}&fields={FETCH_FIELDS}&errorPolicy=omit&api-version={}",
            self.base,
            join_ids(ids),
            self.api_version
        )
    }

    fn updates_url(&self, id: WorkItemId, skip: usize) -> String {
        format!(
            "{}/workItems/{id}/updates?$top={UPDATES_PAGE}&$skip={skip}&api-version={}",
            self.base, self.api_version
        )
    }

    fn patch_url(&self, id: WorkItemId) -> String {
        format!("{}/workItems/{id}?api-version={}", self.base, self.api_version)
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        self.requests.set(self.requests.get() + 1);
        debug!(method, url, "azure devops request");
        ureq::request(method, url)
            .set("Accept", "application/json")
            .set("User-Agent", USER_AGENT)
            .set("Authorization", &self.authorization)
    }

    fn decode<T: DeserializeOwned>(url: &str, response: ureq::Response) -> Result<T, SourceError> {
        response.into_json::<T>().map_err(|err| SourceError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        })
    }
}

impl WorkItemSource for AzureDevOpsClient {
    fn query_edges(&self, query: &str) -> Result<Vec<Edge>, SourceError> {
        let url = self.wiql_url();
        let response = self
            .request("POST", &url)
            .send_json(serde_json::json!({ "query": query }))
            .map_err(|err| source_error(&url, err))?;
        let wiql: WiqlResponse = Self::decode(&url, response)?;
        Ok(wiql.into_edges())
    }

    fn fetch_items(&self, ids: &[WorkItemId]) -> Result<Vec<WorkItemRecord>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.batch_url(ids);
        let response = self
            .request("GET", &url)
            .call()
            .map_err(|err| source_error(&url, err))?;
        let batch: BatchResponse = Self::decode(&url, response)?;
        Ok(batch.value.into_iter().flatten().collect())
    }

    fn fetch_updates(&self, id: WorkItemId) -> Result<Vec<WorkItemUpdate>, SourceError> {
        let mut updates = Vec::new();
        loop {
            let url = self.updates_url(id, updates.len());
            let response = self
                .request("GET", &url)
                .call()
                .map_err(|err| source_error(&url, err))?;
            let page: UpdatesResponse = Self::decode(&url, response)?;
            let full = page.value.len() >= UPDATES_PAGE;
            updates.extend(page.value);
            if !full {
                break;
            }
        }
        updates.sort_by_key(|update| update.rev);
        Ok(updates)
    }
}

impl WorkItemSink for AzureDevOpsClient {
    fn patch(&self, id: WorkItemId, ops: &[PatchOp]) -> Result<(), SinkError> {
        let body = serde_json::to_string(ops).map_err(|err| SinkError::Transport {
            id,
            message: err.to_string(),
        })?;
        let url = self.patch_url(id);
        match self
            .request("PATCH", &url)
            .set("Content-Type", JSON_PATCH)
            .send_string(&body)
        {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(status, response)) => Err(SinkError::Rejected {
                id,
                status,
                message: status_message(response),
            }),
            Err(ureq::Error::Transport(transport)) => Err(SinkError::Transport {
                id,
                message: transport.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        Connection {
            organization: "contoso".to_string(),
            project: "Web".to_string(),
            token: "pat".to_string(),
            api_version: "6.0".to_string(),
            query: String::new(),
        }
    }

    #[test]
    fn authorization_encodes_empty_user_and_token() {
        // base64(":pat")
        assert_eq!(basic_authorization("pat"), "Basic OnBhdA==");
    }

    #[test]
    fn urls_follow_the_rest_layout() {
        let client = AzureDevOpsClient::new(&connection());
        assert_eq!(
            client.wiql_url(),
            "https://dev.azure.com/contoso/Web/_apis/wit/wiql?api-version=6.0"
        );
        assert_eq!(
            client.patch_url(WorkItemId(42)),
            "https://dev.azure.com/contoso/Web/_apis/wit/workItems/42?api-version=6.0"
        );

        let batch = client.batch_url(&[WorkItemId(1), WorkItemId(2), WorkItemId(3)]);
        assert!(batch.starts_with("https://dev.azure.com/contoso/Web/_apis/wit/workitems?ids=1,2,3&"));
        assert!(batch.contains("errorPolicy=omit"));
        assert!(batch.ends_with("api-version=6.0"));

        assert_eq!(
            client.updates_url(WorkItemId(42), 200),
            "https://dev.azure.com/contoso/Web/_apis/wit/workItems/42/updates?$top=200&$skip=200&api-version=6.0"
        );
        assert_eq!(client.request_count(), 0);
    }

    #[test]
    fn organization_may_be_a_full_url() {
        assert_eq!(
            api_base("https://tfs.contoso.local/DefaultCollection/", "Web"),
            "https://tfs.contoso.local/DefaultCollection/Web/_apis/wit"
        );
    }

    #[test]
    fn wiql_relations_become_edges() {
        let raw = r#"{
            "queryType": "oneHop",
            "workItemRelations": [
                {"rel": null, "source": null, "target": {"id": 1, "url": "u"}},
                {"rel": "System.LinkTypes.Hierarchy-Forward", "source": {"id": 1, "url": "u"}, "target": {"id": 7, "url": "u"}}
            ]
        }"#;
        let edges = serde_json::from_str::<WiqlResponse>(raw).unwrap().into_edges();
        assert_eq!(edges, vec![Edge::root(1), Edge::child(1, 7)]);
    }

    #[test]
    fn flat_wiql_results_are_roots() {
        let raw = r#"{"queryType": "flat", "workItems": [{"id": 4, "url": "u"}, {"id": 5, "url": "u"}]}"#;
        let edges = serde_json::from_str::<WiqlResponse>(raw).unwrap().into_edges();
        assert_eq!(edges, vec![Edge::root(4), Edge::root(5)]);
    }

    #[test]
    fn update_pages_decode_tag_changes() {
        let raw = r#"{"count": 2, "value": [
            {"id": 1, "workItemId": 9, "rev": 1, "revisedBy": {"displayName": "Ada"},
             "revisedDate": "2024-01-02T00:00:00Z",
             "fields": {"System.ChangedDate": {"newValue": "2024-01-01T00:00:00Z"}}},
            {"id": 2, "workItemId": 9, "rev": 2, "revisedBy": {"displayName": "Grace"},
             "revisedDate": "9999-01-01T00:00:00Z",
             "fields": {"System.Tags": {"newValue": "blocked"},
                        "System.ChangedDate": {"oldValue": "2024-01-01T00:00:00Z", "newValue": "2024-01-02T00:00:00Z"}},
             "relations": {"added": [{"rel": "System.LinkTypes.Hierarchy-Reverse", "url": "u"}]}}
        ]}"#;
        let page: UpdatesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(page.value.len(), 2);
        assert!(page.value[1].adds_tag("blocked"));
        assert_eq!(page.value[1].revised_by_name(), Some("Grace"));
    }

    #[test]
    fn omitted_batch_entries_are_dropped() {
        let raw = r#"{"count": 2, "value": [
            {"id": 4, "rev": 1, "fields": {"System.WorkItemType": "Task", "System.Title": "a", "System.State": "New"}},
            null
        ]}"#;
        let batch: BatchResponse = serde_json::from_str(raw).unwrap();
        let records: Vec<WorkItemRecord> = batch.value.into_iter().flatten().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, WorkItemId(4));
    }
}
