//! Blocking Notion API client.

use super::parse::{parse_block, parse_page, property_warnings};
use super::retry::RetryPolicy;
use super::{BlockBatch, ContentSource, SourceError};
use crate::model::DocumentMeta;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Largest page size the API accepts.
const PAGE_SIZE: u32 = 100;

/// Everything needed to talk to one database.
#[derive(Debug, Clone)]
pub struct NotionSettings {
    pub token: String,
    pub database_id: String,
    pub api_base: String,
    pub api_version: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

/// Result of a connection check against the configured database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub id: String,
    pub title: String,
    /// Property name → property type.
    pub properties: BTreeMap<String, String>,
    /// Problems with the required properties; empty when the schema is usable.
    pub warnings: Vec<String>,
}

pub struct NotionClient {
    agent: ureq::Agent,
    settings: NotionSettings,
}

impl NotionClient {
    pub fn new(settings: NotionSettings) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(settings.timeout).build();
        Self { agent, settings }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.api_base.trim_end_matches('/'), path)
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        self.agent
            .request(method, url)
            .set("Authorization", &format!("Bearer {}", self.settings.token))
            .set("Notion-Version", &self.settings.api_version)
    }

    /// Send one request with retries, returning the decoded JSON body.
    fn send(
        &self,
        what: &str,
        build: impl Fn() -> Result<ureq::Response, ureq::Error>,
    ) -> Result<Value, SourceError> {
        self.settings.retry.run(what, || {
            let response = build().map_err(|e| api_error(what, e))?;
            response
                .into_json::<Value>()
                .map_err(|e| SourceError::Decode(format!("{what}: {e}")))
        })
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, SourceError> {
        let url = self.url(path);
        self.send(&url, || {
            query
                .iter()
                .fold(self.request("GET", &url), |req, (k, v)| req.query(k, v))
                .call()
        })
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value, SourceError> {
        let url = self.url(path);
        self.send(&url, || self.request("POST", &url).send_json(body.clone()))
    }

    /// Retrieve the database schema and check the properties the sync relies on.
    pub fn inspect_database(&self) -> Result<DatabaseInfo, SourceError> {
        let database = self.get(&format!("databases/{}", self.settings.database_id), &[])?;
        let title = database
            .get("title")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("plain_text").and_then(Value::as_str))
                    .collect::<String>()
            })
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());
        let properties: BTreeMap<String, String> = database
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, prop)| {
                        let kind = prop.get("type").and_then(Value::as_str).unwrap_or("unknown");
                        (name.clone(), kind.to_string())
                    })
                    .collect()
            })
            .unwrap_or_default();
        let warnings = property_warnings(&properties);
        Ok(DatabaseInfo {
            id: self.settings.database_id.clone(),
            title,
            properties,
            warnings,
        })
    }
}

/// Map a ureq failure onto the retry taxonomy, keeping the API's own message.
fn api_error(url: &str, err: ureq::Error) -> SourceError {
    match err {
        ureq::Error::Status(status, response) => {
            let message = response
                .into_json::<Value>()
                .ok()
                .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {status}"));
            SourceError::Api { status, message }
        }
        ureq::Error::Transport(t) => SourceError::Transport {
            url: url.to_string(),
            message: t.to_string(),
        },
    }
}

fn results(body: &Value) -> &[Value] {
    body.get("results")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn next_cursor(body: &Value) -> Option<String> {
    let has_more = body.get("has_more").and_then(Value::as_bool).unwrap_or(false);
    if !has_more {
        return None;
    }
    body.get("next_cursor")
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl ContentSource for NotionClient {
    /// Every row with `Published` checked, across all result pages.
    ///
    /// Rows that can't be parsed are logged and skipped.
    fn list_published_documents(&self) -> Result<Vec<DocumentMeta>, SourceError> {
        let path = format!("databases/{}/query", self.settings.database_id);
        let mut documents = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({
                "filter": { "property": "Published", "checkbox": { "equals": true } },
                "page_size": PAGE_SIZE,
            });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }
            let page = self.post(&path, &body)?;
            for row in results(&page) {
                match parse_page(row) {
                    Ok(meta) => documents.push(meta),
                    Err(e) => warn!(error = %e, "Skipping unreadable database row"),
                }
            }
            match next_cursor(&page) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(count = documents.len(), "Listed published documents");
        Ok(documents)
    }

    fn list_block_children(
        &self,
        block_id: &str,
        cursor: Option<&str>,
    ) -> Result<BlockBatch, SourceError> {
        let page_size = PAGE_SIZE.to_string();
        let mut query = vec![("page_size", page_size.as_str())];
        if let Some(c) = cursor {
            query.push(("start_cursor", c));
        }
        let body = self.get(&format!("blocks/{block_id}/children"), &query)?;
        let blocks = results(&body)
            .iter()
            .map(parse_block)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BlockBatch {
            blocks,
            next_cursor: next_cursor(&body),
        })
    }
}
