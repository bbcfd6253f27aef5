use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use dirs::config_dir;
use reqwest::{header, Client as HttpClient, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::wire::{
    ContentFilterResponse, DeltaRequest, DeltaResponse, PageRequest, PageResponse, PlaylistMeta,
    Rootlist, RootlistDelta, WriteRequest,
};
use super::{CollectionApi, MetadataResolver, PlaylistApi};
use crate::config::ApiConfig;
use crate::error::{Result, SyncError};
use crate::metadata::{ExtensionKind, MetadataBatch, MetadataQuery};

const CREDENTIALS_FILE_NAME: &str = "credentials.json";

/// Bearer credentials of an already-authenticated session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub username: String,
}

impl Credentials {
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let dir = config_dir()
            .context("Could not find config directory")?
            .join("spindle");
        Ok(dir.join(CREDENTIALS_FILE_NAME))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials at {}", path.display()))?;
        let creds: Credentials =
            serde_json::from_str(&contents).context("Failed to parse credentials file")?;
        Ok(creds)
    }
}

#[derive(Serialize)]
struct MetadataEntityRequest<'a> {
    entity_uri: &'a str,
    query: &'a [ExtensionKind],
}

#[derive(Serialize)]
struct MetadataRequest<'a> {
    entity_request: Vec<MetadataEntityRequest<'a>>,
}

/// JSON client for the collection, playlist and metadata endpoints.
pub struct SpClient {
    http_client: HttpClient,
    base_url: String,
    access_token: String,
}

impl SpClient {
    pub fn new(config: &ApiConfig, credentials: &Credentials) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: credentials.access_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(header::AUTHORIZATION, format!("Bearer {}", self.access_token))
            .header(header::ACCEPT, "application/json")
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, body))
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        Ok(self.send(builder).await?.json::<T>().await?)
    }

    /// Playlist id part of `spotify:playlist:<id>` or `spotify:user:<u>:playlist:<id>`.
    fn playlist_id(uri: &str) -> Result<&str> {
        let mut parts = uri.rsplit(':');
        match (parts.next(), parts.next()) {
            (Some(id), Some("playlist")) if !id.is_empty() => Ok(id),
            _ => Err(SyncError::InvalidId(uri.to_string())),
        }
    }
}

/// 404 and 410 mean the entity is gone; every other failure status is a
/// remote error.
fn status_error(status: StatusCode, body: String) -> SyncError {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => SyncError::NotFound(body),
        _ => SyncError::Remote {
            status: status.as_u16(),
            body,
        },
    }
}

#[async_trait]
impl CollectionApi for SpClient {
    async fn paging(&self, request: PageRequest) -> Result<PageResponse> {
        let builder = self
            .http_client
            .post(self.url("/collection/v2/paging"))
            .json(&request);
        self.send_json(builder).await
    }

    async fn delta(&self, request: DeltaRequest) -> Result<DeltaResponse> {
        let builder = self
            .http_client
            .post(self.url("/collection/v2/delta"))
            .json(&request);
        self.send_json(builder).await
    }

    async fn write(&self, request: WriteRequest) -> Result<()> {
        let builder = self
            .http_client
            .post(self.url("/collection/v2/write"))
            .json(&request);
        self.send(builder).await?;
        Ok(())
    }

    async fn content_filters(&self) -> Result<ContentFilterResponse> {
        let builder = self
            .http_client
            .get(self.url("/your-library-view/v1/collection-tags"));
        self.send_json(builder).await
    }
}

#[async_trait]
impl PlaylistApi for SpClient {
    async fn rootlist(&self, username: &str) -> Result<Rootlist> {
        let builder = self
            .http_client
            .get(self.url(&format!("/playlist/v2/user/{}/rootlist", username)))
            .query(&[("decorate", "revision,attributes,length,owner")]);
        self.send_json(builder).await
    }

    async fn rootlist_delta(
        &self,
        username: &str,
        revision: &str,
        target_revision: &str,
    ) -> Result<RootlistDelta> {
        let builder = self
            .http_client
            .get(self.url(&format!("/playlist/v2/user/{}/rootlist/diff", username)))
            .query(&[
                ("revision", revision),
                ("target_revision", target_revision),
                ("handlesContent", ""),
            ]);
        self.send_json(builder).await
    }

    async fn playlist(&self, uri: &str) -> Result<PlaylistMeta> {
        let id = Self::playlist_id(uri)?;
        let builder = self
            .http_client
            .get(self.url(&format!("/playlist/v2/playlist/{}", id)));
        self.send_json(builder).await
    }
}

#[async_trait]
impl MetadataResolver for SpClient {
    async fn request(&self, queries: Vec<MetadataQuery>) -> Result<MetadataBatch> {
        if queries.is_empty() {
            return Ok(MetadataBatch::default());
        }
        let body = MetadataRequest {
            entity_request: queries
                .iter()
                .map(|(uri, kinds)| MetadataEntityRequest {
                    entity_uri: uri,
                    query: kinds,
                })
                .collect(),
        };
        let builder = self
            .http_client
            .post(self.url("/extended-metadata/v0/extended-metadata"))
            .json(&body);
        self.send_json(builder).await
    }
}
