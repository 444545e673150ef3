use std::{path::PathBuf, str::FromStr, time::Duration};

use reqwest::{
    header::{ETAG, IF_NONE_MATCH},
    StatusCode,
};

use super::{
    archive::{archive_digest, extract_archive, DownloadMarker},
    DatasetError,
};
use crate::{
    config::DatasetConfig,
    pipeline::{FetchOutcome, PipelineError, Source},
};

/// `owner/slug` dataset reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetId {
    owner: String,
    slug: String,
}

impl FromStr for DatasetId {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((owner, slug)) if !owner.is_empty() && !slug.is_empty() && !slug.contains('/') => Ok(Self {
                owner: owner.to_string(),
                slug: slug.to_string(),
            }),
            _ => Err(DatasetError::InvalidDatasetId(s.to_string())),
        }
    }
}

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.slug)
    }
}

#[derive(serde::Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

fn api_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Downloads a dataset archive from a Kaggle-compatible API and unpacks it.
pub struct KaggleDatasetSource {
    client: reqwest::Client,
    api_base: String,
    dataset: DatasetId,
    username: String,
    api_key: String,
    data_dir: PathBuf,
    raw_path: PathBuf,
    force: bool,
}

impl KaggleDatasetSource {
    pub fn new(cfg: &DatasetConfig) -> Result<Self, DatasetError> {
        let dataset: DatasetId = cfg.id.parse()?;

        let (username, api_key) = match (cfg.username.as_deref(), cfg.api_key.as_deref()) {
            (Some(u), Some(k)) if !u.is_empty() && !k.is_empty() => (u.to_string(), k.to_string()),
            _ => return Err(DatasetError::MissingCredentials),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(concat!("energy-etl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DatasetError::Client(e.to_string()))?;

        Ok(Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            dataset,
            username,
            api_key,
            data_dir: cfg.data_dir.clone(),
            raw_path: cfg.raw_path(),
            force: cfg.force,
        })
    }

    fn download_url(&self) -> String {
        format!(
            "{}/datasets/download/{}/{}",
            self.api_base, self.dataset.owner, self.dataset.slug
        )
    }

    /// Download and unpack, or report that the local copy is current.
    ///
    /// A previously unpacked copy is reused when the server answers
    /// `304 Not Modified` to the stored ETag, or when the downloaded archive
    /// hashes to the stored digest.
    pub async fn fetch_dataset(&self) -> Result<FetchOutcome, DatasetError> {
        tokio::fs::create_dir_all(&self.data_dir).await?;

        let raw_present = tokio::fs::try_exists(&self.raw_path).await.unwrap_or(false);
        let previous = if !self.force && raw_present {
            DownloadMarker::read(&self.data_dir).await
        } else {
            None
        };

        let url = self.download_url();
        let mut request = self.client.get(&url).basic_auth(&self.username, Some(&self.api_key));
        if let Some(etag) = previous.as_ref().and_then(|m| m.etag.as_deref()) {
            request = request.header(IF_NONE_MATCH, etag);
        }

        tracing::info!(dataset = %self.dataset, url = %url, "downloading dataset");
        let response = request.send().await.map_err(|e| DatasetError::Unreachable {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        match status {
            StatusCode::NOT_MODIFIED if previous.is_some() => {
                tracing::info!(dataset = %self.dataset, "dataset not modified since last download");
                return Ok(FetchOutcome::UpToDate);
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(DatasetError::Unauthorized { status: status.as_u16() });
            }
            StatusCode::NOT_FOUND => return Err(DatasetError::NotFound(self.dataset.to_string())),
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(DatasetError::Status {
                    status: s.as_u16(),
                    message: api_message(&body),
                });
            }
            _ => {}
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| DatasetError::Unreachable {
            url: url.clone(),
            reason: format!("failed to read response body: {e}"),
        })?;

        let bytes = body.len() as u64;
        metrics::counter!("etl_dataset_bytes_downloaded_total").increment(bytes);

        let marker = DownloadMarker {
            etag,
            digest: archive_digest(&body),
        };

        if previous.as_ref().is_some_and(|m| m.digest == marker.digest) {
            marker.write(&self.data_dir).await?;
            tracing::info!(dataset = %self.dataset, bytes, "downloaded archive matches local copy");
            return Ok(FetchOutcome::UpToDate);
        }

        let dest = self.data_dir.clone();
        let files = tokio::task::spawn_blocking(move || extract_archive(&body, &dest))
            .await
            .map_err(|e| DatasetError::Archive(format!("extract task failed: {e}")))??;
        marker.write(&self.data_dir).await?;

        tracing::info!(
            dataset = %self.dataset,
            dir = %self.data_dir.display(),
            bytes,
            files = files.len(),
            "dataset downloaded and unpacked"
        );

        Ok(FetchOutcome::Downloaded { files, bytes })
    }
}

#[async_trait::async_trait]
impl Source for KaggleDatasetSource {
    async fn fetch(&self) -> Result<FetchOutcome, PipelineError> {
        Ok(self.fetch_dataset().await?)
    }
}
