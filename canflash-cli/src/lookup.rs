//! Commit lookup against the firmware repository on GitHub.
//!
//! Boards only broadcast a 7-digit hash. With `commits --lookup` each hash is
//! resolved through the GitHub REST API (`GET /repos/{repo}/commits/{sha}`)
//! to the full hash, message, author and date.

use anyhow::{Context, Result};
use log::debug;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::time::Duration;

/// Repository the firmware images are built from.
pub const DEFAULT_REPOSITORY: &str = "UBCFormulaElectric/Consolidated-Firmware";

/// GitHub REST API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Details of one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitDetails {
    /// Full commit hash.
    pub sha: String,
    /// Full commit message.
    pub message: String,
    /// Git author name.
    pub author: String,
    /// Author date as reported by GitHub (RFC 3339).
    pub date: String,
}

impl CommitDetails {
    /// First line of the commit message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// Resolves a short commit hash.
pub trait CommitLookup {
    /// Look `short_sha` up in the repository.
    fn lookup(&self, short_sha: &str) -> Result<CommitDetails>;
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
    commit: GitCommit,
}

#[derive(Deserialize)]
struct GitCommit {
    message: String,
    author: Option<GitSignature>,
}

#[derive(Deserialize)]
struct GitSignature {
    name: String,
    date: String,
}

impl From<CommitResponse> for CommitDetails {
    fn from(response: CommitResponse) -> Self {
        let (author, date) = response
            .commit
            .author
            .map(|a| (a.name, a.date))
            .unwrap_or_default();
        Self {
            sha: response.sha,
            message: response.commit.message,
            author,
            date,
        }
    }
}

/// GitHub REST client for one repository.
pub struct GitHub {
    client: Client,
    api_url: String,
    repository: String,
    token: Option<String>,
}

impl GitHub {
    /// Client for `repository` ("owner/name") under `api_url`.
    pub fn new(api_url: &str, repository: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("canflash/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self::with_client(client, api_url, repository))
    }

    fn with_client(client: Client, api_url: &str, repository: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            repository: repository.to_string(),
            token: None,
        }
    }

    /// Authenticate requests, which raises GitHub's rate limit.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    fn commit_url(&self, sha: &str) -> String {
        format!("{}/repos/{}/commits/{sha}", self.api_url, self.repository)
    }
}

impl CommitLookup for GitHub {
    fn lookup(&self, short_sha: &str) -> Result<CommitDetails> {
        let url = self.commit_url(short_sha);
        debug!("GET {url}");

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .with_context(|| format!("Failed to reach {}", self.api_url))?
            .error_for_status()
            .with_context(|| format!("Commit {short_sha} not found in {}", self.repository))?;
        let body: CommitResponse = response
            .json()
            .with_context(|| format!("Unexpected response for commit {short_sha}"))?;
        Ok(body.into())
    }
}
