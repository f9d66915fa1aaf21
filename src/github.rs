//! GitHub contents API integration
//!
//! Stores habit documents as files in a GitHub repository. The blob `sha`
//! returned by GitHub is the version token: a `PUT` carrying a stale `sha` is
//! refused, which gives optimistic concurrency for free.

use crate::config::GithubConfig;
use crate::store::{FileStore, Result, StoreError, StoredFile};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

const USER_AGENT: &str = "HabitBot";
const ACCEPT_V3: &str = "application/vnd.github.v3+json";

/// Body of `GET /repos/{repo}/contents/{path}`
#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
}

/// Body of `PUT /repos/{repo}/contents/{path}`
#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

/// GitHub client for one repository branch
pub struct GitHubClient {
    http: Client,
    api_url: String,
    repo: String, // "owner/repo" format
    branch: String,
    token: String,
}

impl GitHubClient {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            repo: config.repo.clone().unwrap_or_default(),
            branch: config.branch.clone(),
            token: config.token.clone().unwrap_or_default(),
        })
    }

    /// Get the repo name
    pub fn repo_name(&self) -> &str {
        &self.repo
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    fn contents_url(&self, path: &str) -> String {
        format!("{}/repos/{}/contents/{}", self.api_url, self.repo, path)
    }

    fn transport_error(operation: &'static str, path: &str, response: Response) -> StoreError {
        let status = response.status().as_u16();
        let message = response.text().unwrap_or_default();
        StoreError::Transport {
            operation,
            path: path.to_string(),
            status,
            message,
        }
    }
}

impl FileStore for GitHubClient {
    fn get(&self, path: &str) -> Result<Option<StoredFile>> {
        let response = self
            .http
            .get(format!("{}?ref={}", self.contents_url(path), self.branch))
            .bearer_auth(&self.token)
            .header(ACCEPT, ACCEPT_V3)
            .send()?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::transport_error("GET", path, response));
        }

        let body: ContentsResponse = response.json()?;
        let content = decode_content(&body.content).map_err(|message| StoreError::Encoding {
            path: path.to_string(),
            message,
        })?;
        log::debug!("GET {} at {}", path, body.sha);

        Ok(Some(StoredFile {
            content,
            token: body.sha,
        }))
    }

    fn put(&self, path: &str, content: &str, token: Option<&str>, message: &str) -> Result<()> {
        let body = PutContentsRequest {
            message,
            content: STANDARD.encode(content),
            branch: &self.branch,
            sha: token,
        };

        let response = self
            .http
            .put(self.contents_url(path))
            .bearer_auth(&self.token)
            .header(ACCEPT, ACCEPT_V3)
            .json(&body)
            .send()?;

        let status = response.status();
        if status.is_success() {
            log::debug!("PUT {}: {}", path, message);
            return Ok(());
        }

        let error = Self::transport_error("PUT", path, response);
        match error {
            StoreError::Transport {
                status, message, ..
            } if is_conflict(status, &message) => Err(StoreError::Conflict {
                path: path.to_string(),
            }),
            other => Err(other),
        }
    }
}

/// GitHub wraps base64 content at 60 columns
fn decode_content(encoded: &str) -> std::result::Result<String, String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact).map_err(|e| e.to_string())?;
    String::from_utf8(bytes).map_err(|e| e.to_string())
}

/// A rejected write because the file moved on: 409 for a stale `sha`, 422
/// when the file appeared since we last saw it and no `sha` was sent
fn is_conflict(status: u16, body: &str) -> bool {
    status == 409 || (status == 422 && body.contains("sha"))
}
