use log::debug;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use url::Url;

use crate::error::{BuildTrendError, Result};
use crate::http;

pub const DEFAULT_TRAVIS_API_URL: &str = "https://api.travis-ci.org";

/// Build level data reported by Travis CI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TravisBuild {
    pub id: Option<u64>,
    pub number: Option<String>,
    pub state: Option<String>,
    /// ISO 8601, `None` while the build is queued
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

/// Client for the Travis CI API, used to fetch raw job logs and build data.
pub struct TravisClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl TravisClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http::build_client()?,
            base_url: http::parse_base_url(base_url)?,
            token,
        })
    }

    fn get(&self, path: &str) -> Result<RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| BuildTrendError::Config(format!("Invalid Travis CI URL: {e}")))?;

        debug!("Requesting {url}");

        let mut request = self.client.get(url).header("Travis-API-Version", "3");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {token}"));
        }
        Ok(request)
    }

    /// Fetches the plain text log of a job.
    ///
    /// # Errors
    ///
    /// Returns `BuildTrendError::Api` when Travis answers with a non-success status.
    pub async fn fetch_job_log(&self, job_id: &str) -> Result<String> {
        let request = self.get(&format!("jobs/{job_id}/log.txt"))?;
        let response = http::send(request).await?;
        Ok(response.text().await?)
    }

    /// Fetches the data of a build, including when it started and finished.
    pub async fn fetch_build(&self, build_id: &str) -> Result<TravisBuild> {
        let request = self.get(&format!("builds/{build_id}"))?;
        let response = http::send(request).await?;
        Ok(response.json().await?)
    }
}
