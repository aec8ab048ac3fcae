use reqwest::{header, header::HeaderMap, Client, StatusCode, Url};
use tracing::debug;

use crate::{errors::YankError, plan::ChunkPlan};

/// A representation of a download task.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub file_url: String,
    pub meta: DownloadMeta,
}

/// What the capability probe learned about the remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadMeta {
    pub content_length: u64,
    pub file_name: String,
    pub content_type: Option<String>,
}

impl DownloadTask {
    /// Probes `url` with a HEAD request. Fails unless the server answers
    /// 200, advertises `Accept-Ranges: bytes` and reports a positive length.
    pub async fn new(client: &Client, url: &str) -> Result<Self, YankError> {
        let response = client.head(url).send().await?;
        debug!(status = %response.status(), final_url = %response.url(), "probe response");
        let meta = DownloadMeta::from_parts(response.status(), response.headers(), response.url())?;
        Ok(DownloadTask {
            file_url: url.to_string(),
            meta,
        })
    }

    /// Splits the resource into `concurrency` chunks.
    pub fn get_download_parts(&self, concurrency: u32) -> Result<ChunkPlan, YankError> {
        ChunkPlan::new(self.meta.content_length, concurrency)
    }
}

impl DownloadMeta {
    /// Validates a probe response. `final_url` is the URL after redirects.
    pub fn from_parts(
        status: StatusCode,
        headers: &HeaderMap,
        final_url: &Url,
    ) -> Result<Self, YankError> {
        if status != StatusCode::OK {
            return Err(YankError::Probe(format!(
                "server responded with {}, expected {}",
                status,
                StatusCode::OK
            )));
        }

        let supports_ranges = headers
            .get_all(header::ACCEPT_RANGES)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"));
        if !supports_ranges {
            return Err(YankError::Probe(
                "server does not support range requests".to_string(),
            ));
        }

        let content_length = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|len| *len > 0)
            .ok_or_else(|| {
                YankError::Probe("server sent an invalid Content-Length header".to_string())
            })?;

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Ok(DownloadMeta {
            content_length,
            file_name: get_file_name_from_url(final_url),
            content_type,
        })
    }
}

/// Base component of the URL path, ignoring the query string.
fn get_file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .filter(|name| *name != "." && *name != "..")
        .map(str::to_string)
        .unwrap_or_else(|| String::from("Unknown_File"))
}
