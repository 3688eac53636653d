use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/drive/v2";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

impl DriveError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DriveError::Request(_) => true,
            DriveError::Api { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            DriveError::Url(_) => false,
        }
    }
}

/// Thin client for the two Drive v2 operations the sync engine consumes:
/// `files.get` and `changes.list`.
#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveError> {
        // A trailing slash keeps Url::join from eating the /drive/v2 prefix.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(&normalized)?,
            token: token.into(),
        })
    }

    /// Fetches metadata for a single file or folder by id. The well-known
    /// alias `root` resolves to the Drive's root folder.
    pub async fn get_file(&self, id: &str) -> Result<DriveFile, DriveError> {
        let url = self.base_url.join(&format!("files/{id}"))?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Fetches one page of the change feed. `page_token` and
    /// `start_change_id` are mutually exclusive; the token wins when both
    /// are set.
    pub async fn list_changes(&self, query: &ChangeListQuery) -> Result<ChangeList, DriveError> {
        let mut url = self.base_url.join("changes")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("includeSubscribed", "false");
            if !query.page_token.is_empty() {
                pairs.append_pair("pageToken", &query.page_token);
            } else if query.start_change_id > 0 {
                pairs.append_pair("startChangeId", &query.start_change_id.to_string());
            }
            if !query.include_deleted {
                pairs.append_pair("includeDeleted", "false");
            }
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DriveError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangeListQuery {
    pub page_token: String,
    pub start_change_id: i64,
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub title: String,
    pub mime_type: String,
    /// RFC 3339 with milliseconds, e.g. `2024-01-01T00:00:00.000Z`.
    pub modified_date: String,
    pub file_size: i64,
    pub md5_checksum: String,
    pub etag: String,
    pub parents: Vec<ParentRef>,
    pub download_url: String,
    pub labels: Labels,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ParentRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Labels {
    pub trashed: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Change {
    pub id: i64,
    pub file_id: String,
    pub deleted: bool,
    pub file: Option<DriveFile>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangeList {
    pub next_page_token: String,
    pub items: Vec<Change>,
}
