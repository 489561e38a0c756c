//! GitHub publisher: one repository per idea, one contents commit per file.

use async_trait::async_trait;
use autoforge_config::GitHubConfig;
use autoforge_core::collaborator::{PublishedLocation, Publisher};
use autoforge_core::{Error, Idea, Result, Secret};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::HttpError;

const USER_AGENT: &str = "autoforge";
/// GitHub rejects longer repository descriptions.
const MAX_DESCRIPTION_LEN: usize = 350;

pub struct GitHubPublisher {
    client: reqwest::Client,
    token: Option<Secret>,
    owner: Option<String>,
    private: bool,
    api_url: Url,
}

#[derive(Debug, Deserialize)]
struct CreatedRepo {
    html_url: String,
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

impl GitHubPublisher {
    pub fn new(config: &GitHubConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(Self {
            client,
            token: config.token.clone(),
            owner: config.owner.clone(),
            private: config.private,
            api_url: config.api_url.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> std::result::Result<Url, HttpError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| HttpError::Request(format!("invalid API base URL: {}", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, token: &Secret) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", token.expose()))
            .header("Accept", "application/vnd.github+json")
    }

    /// Organisation repositories are created under `/orgs/{owner}`, everything
    /// else under the token's user.
    async fn create_repository(
        &self,
        token: &Secret,
        idea: &Idea,
    ) -> std::result::Result<CreatedRepo, HttpError> {
        let url = match &self.owner {
            Some(owner) => self.url(&["orgs", owner.as_str(), "repos"])?,
            None => self.url(&["user", "repos"])?,
        };

        let description: String = idea.description.chars().take(MAX_DESCRIPTION_LEN).collect();
        let payload = serde_json::json!({
            "name": idea.name,
            "description": description,
            "private": self.private,
            "auto_init": false,
        });

        let response = self
            .request(Method::POST, url, token)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HttpError::from_response(response).await);
        }

        Ok(response.json().await?)
    }

    async fn upload_file(
        &self,
        token: &Secret,
        repository: &str,
        path: &str,
        content: &str,
    ) -> std::result::Result<(), HttpError> {
        let mut segments = vec!["repos"];
        segments.extend(repository.split('/'));
        segments.push("contents");
        segments.extend(path.split('/'));
        let url = self.url(&segments)?;

        let payload = serde_json::json!({
            "message": format!("Add {}", path),
            "content": STANDARD.encode(content),
        });

        let response = self
            .request(Method::PUT, url, token)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HttpError::from_response(response).await);
        }

        debug!(repository, path, "Uploaded file");
        Ok(())
    }

    /// Login of the token's user. Verifies the token without side effects.
    pub async fn authenticated_user(&self) -> Result<String> {
        let token = self.token()?;
        let url = self.url(&["user"]).map_err(publish_error)?;
        let response = self
            .request(Method::GET, url, token)
            .send()
            .await
            .map_err(|e| publish_error(e.into()))?;

        if !response.status().is_success() {
            return Err(publish_error(HttpError::from_response(response).await));
        }

        let user: GitHubUser = response.json().await.map_err(|e| publish_error(e.into()))?;
        Ok(user.login)
    }

    fn token(&self) -> Result<&Secret> {
        self.token
            .as_ref()
            .ok_or_else(|| Error::Publish("GITHUB_TOKEN is not configured".to_string()))
    }
}

fn publish_error(e: HttpError) -> Error {
    Error::Publish(e.to_string())
}

/// Reject paths that would escape the repository root.
fn validate_path(path: &str) -> Result<()> {
    let valid = !path.is_empty()
        && !path.starts_with('/')
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");

    if valid {
        Ok(())
    } else {
        Err(Error::Publish(format!("invalid artifact path: {}", path)))
    }
}

fn readme(idea: &Idea) -> String {
    let mut readme = format!("# {}\n\n{}\n", idea.name, idea.description);

    if !idea.requirements.is_empty() {
        readme.push_str("\n## Features\n\n");
        for requirement in &idea.requirements {
            readme.push_str(&format!("- {}\n", requirement));
        }
    }
    if !idea.technical_stack.is_empty() {
        readme.push_str(&format!(
            "\n## Tech stack\n\n{}\n",
            idea.technical_stack.join(", ")
        ));
    }

    readme
}

#[async_trait]
impl Publisher for GitHubPublisher {
    fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    async fn publish(
        &self,
        idea: &Idea,
        files: &BTreeMap<String, String>,
    ) -> Result<PublishedLocation> {
        let token = self.token()?;
        if files.is_empty() {
            return Err(Error::Publish("no artifacts to publish".to_string()));
        }
        for path in files.keys() {
            validate_path(path)?;
        }

        let repo = self
            .create_repository(token, idea)
            .await
            .map_err(publish_error)?;
        info!(repository = %repo.full_name, files = files.len(), "Created repository");

        for (path, content) in files {
            self.upload_file(token, &repo.full_name, path, content)
                .await
                .map_err(|e| Error::Publish(format!("{}: {}", path, e)))?;
        }

        if !files.keys().any(|p| p.eq_ignore_ascii_case("README.md")) {
            self.upload_file(token, &repo.full_name, "README.md", &readme(idea))
                .await
                .map_err(|e| Error::Publish(format!("README.md: {}", e)))?;
        }

        Ok(PublishedLocation {
            url: repo.html_url,
            repository: repo.full_name,
        })
    }
}
