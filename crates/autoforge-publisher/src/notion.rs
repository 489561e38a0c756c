//! Idea tracking in a Notion database.

use async_trait::async_trait;
use autoforge_config::NotionConfig;
use autoforge_core::collaborator::{IdeaStatus, IdeaTracker};
use autoforge_core::{Error, Idea, Result, Secret};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::HttpError;

const NOTION_VERSION: &str = "2022-06-28";
/// Notion rejects rich text longer than 2000 characters.
const MAX_TEXT_LEN: usize = 1900;
const MAX_TAGS: usize = 5;

pub struct NotionTracker {
    client: reqwest::Client,
    token: Secret,
    database_id: String,
    api_url: Url,
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    id: String,
}

impl NotionTracker {
    pub fn new(config: &NotionConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(Self {
            client,
            token: config.token.clone(),
            database_id: config.database_id.clone(),
            api_url: config.api_url.clone(),
        })
    }

    fn request(
        &self,
        method: Method,
        segments: &[&str],
    ) -> std::result::Result<RequestBuilder, HttpError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| HttpError::Request(format!("invalid API base URL: {}", self.api_url)))?
            .pop_if_empty()
            .extend(segments);

        Ok(self
            .client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token.expose()))
            .header("Notion-Version", NOTION_VERSION))
    }

    async fn send(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<reqwest::Response, HttpError> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(HttpError::from_response(response).await);
        }
        Ok(response)
    }

    async fn create_page(&self, body: &Value) -> std::result::Result<CreatedPage, HttpError> {
        let request = self.request(Method::POST, &["pages"])?.json(body);
        Ok(self.send(request).await?.json::<CreatedPage>().await?)
    }

    async fn patch_page(&self, id: &str, properties: Value) -> std::result::Result<(), HttpError> {
        let request = self
            .request(Method::PATCH, &["pages", id])?
            .json(&json!({ "properties": properties }));
        self.send(request).await?;
        Ok(())
    }
}

/// Name of the status option in the database.
fn status_name(status: IdeaStatus) -> &'static str {
    match status {
        IdeaStatus::Discovered => "Idea",
        IdeaStatus::InProgress => "In Progress",
        IdeaStatus::Completed => "Published",
        IdeaStatus::Failed => "Failed",
    }
}

fn page_properties(idea: &Idea) -> Value {
    let description: String = idea.description.chars().take(MAX_TEXT_LEN).collect();
    let tags: Vec<Value> = idea
        .tags
        .iter()
        .take(MAX_TAGS)
        .map(|tag| json!({ "name": tag }))
        .collect();

    let mut properties = json!({
        "Name": { "title": [{ "text": { "content": idea.name } }] },
        "Description": { "rich_text": [{ "text": { "content": description } }] },
        "Tags": { "multi_select": tags },
        "Status": { "status": { "name": status_name(IdeaStatus::Discovered) } },
    });
    if !idea.category.is_empty() {
        properties["Category"] = json!({ "select": { "name": idea.category } });
    }
    properties
}

#[async_trait]
impl IdeaTracker for NotionTracker {
    async fn record_idea(&self, idea: &Idea) -> Result<String> {
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": page_properties(idea),
        });

        let page = self
            .create_page(&body)
            .await
            .map_err(|e| Error::Tracker(e.to_string()))?;

        debug!(idea = %idea.name, page = %page.id, "Recorded idea");
        Ok(page.id)
    }

    async fn update_status(&self, id: &str, status: IdeaStatus, url: Option<&str>) -> Result<()> {
        let mut properties = json!({
            "Status": { "status": { "name": status_name(status) } },
        });
        if let Some(url) = url {
            properties["URL"] = json!({ "url": url });
        }

        self.patch_page(id, properties)
            .await
            .map_err(|e| Error::Tracker(e.to_string()))?;

        debug!(page = %id, %status, "Updated idea status");
        Ok(())
    }
}

/// Tracker used when no document store is configured.
pub struct NoopTracker;

#[async_trait]
impl IdeaTracker for NoopTracker {
    async fn record_idea(&self, idea: &Idea) -> Result<String> {
        Ok(idea.name.clone())
    }

    async fn update_status(&self, _id: &str, _status: IdeaStatus, _url: Option<&str>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tracker(server: &MockServer) -> NotionTracker {
        let config = NotionConfig {
            token: Secret::new("secret_abc"),
            database_id: "db-1".to_string(),
            api_url: format!("{}/v1", server.uri()).parse().unwrap(),
        };
        NotionTracker::new(&config, Duration::from_secs(5)).unwrap()
    }

    fn idea() -> Idea {
        Idea::new("markdown-link-checker", "Find broken links")
            .unwrap()
            .with_category("documentation")
            .with_tags(["a", "b", "c", "d", "e", "f"])
    }

    #[tokio::test]
    async fn test_record_idea() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .and(header("Notion-Version", NOTION_VERSION))
            .and(header("authorization", "Bearer secret_abc"))
            .and(body_partial_json(json!({
                "parent": {"database_id": "db-1"},
                "properties": {
                    "Status": {"status": {"name": "Idea"}},
                    "Category": {"select": {"name": "documentation"}}
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "page-42"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = tracker(&server).record_idea(&idea()).await.unwrap();
        assert_eq!(id, "page-42");

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let tags = body["properties"]["Tags"]["multi_select"].as_array().unwrap();
        assert_eq!(tags.len(), MAX_TAGS);
    }

    #[tokio::test]
    async fn test_update_status_with_url() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/pages/page-42"))
            .and(body_partial_json(json!({
                "properties": {
                    "Status": {"status": {"name": "Published"}},
                    "URL": {"url": "https://github.com/acme/markdown-link-checker"}
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "page-42"})))
            .expect(1)
            .mount(&server)
            .await;

        tracker(&server)
            .update_status(
                "page-42",
                IdeaStatus::Completed,
                Some("https://github.com/acme/markdown-link-checker"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_api_errors_become_tracker_errors() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(400).set_body_string("validation_error"))
            .mount(&server)
            .await;

        let err = tracker(&server)
            .update_status("page-42", IdeaStatus::Failed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tracker(ref m) if m.contains("validation_error")));
    }

    #[tokio::test]
    async fn test_noop_tracker() {
        let id = NoopTracker.record_idea(&idea()).await.unwrap();
        assert_eq!(id, "markdown-link-checker");
        assert!(NoopTracker.update_status(&id, IdeaStatus::InProgress, None).await.is_ok());
    }
}
