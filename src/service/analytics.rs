use log::{debug, info};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use url::Url;

use crate::buildjob::BuildJob;
use crate::config::AnalyticsConfig;
use crate::error::{BuildTrendError, Result};
use crate::http::{self, send};

pub const BUILD_JOBS_COLLECTION: &str = "build_jobs";
pub const BUILD_STAGES_COLLECTION: &str = "build_stages";

/// Client for a Keen IO compatible analytics API.
///
/// Writing events requires the project id and write key, queries require
/// the project id and read key.
pub struct AnalyticsClient {
    client: Client,
    base_url: Url,
    project_id: Option<String>,
    write_key: Option<String>,
    read_key: Option<String>,
}

#[derive(Deserialize)]
struct CountResponse {
    result: u64,
}

impl AnalyticsClient {
    pub fn new(config: &AnalyticsConfig) -> Result<Self> {
        Ok(Self {
            client: http::build_client()?,
            base_url: http::parse_base_url(&config.base_url)?,
            project_id: non_empty(config.project_id.as_deref()),
            write_key: non_empty(config.write_key.as_deref()),
            read_key: non_empty(config.read_key.as_deref()),
        })
    }

    pub fn is_writable(&self) -> bool {
        self.project_id.is_some() && self.write_key.is_some()
    }

    pub fn is_readable(&self) -> bool {
        self.project_id.is_some() && self.read_key.is_some()
    }

    /// Counts the build jobs recorded for `repo` with build number `build`.
    pub async fn has_build_id(&self, repo: &str, build: &str) -> Result<bool> {
        let read_key = self.read_key.as_deref().ok_or_else(|| {
            BuildTrendError::Config("analytics read key is not set".to_string())
        })?;

        let filters = json!([
            {"property_name": "job.repo", "operator": "eq", "property_value": repo},
            {"property_name": "job.build", "operator": "eq", "property_value": build},
        ]);

        let mut url = self.project_url("queries/count")?;
        url.query_pairs_mut()
            .append_pair("event_collection", BUILD_JOBS_COLLECTION)
            .append_pair("filters", &filters.to_string());

        let response = send(self.client.get(url).header("Authorization", read_key)).await?;
        let count: CountResponse = response.json().await?;

        debug!("Found {} build jobs for build #{build} of {repo}", count.result);
        Ok(count.result > 0)
    }

    /// Records a single event in `collection`.
    pub async fn add_event(&self, collection: &str, event: &Value) -> Result<()> {
        let url = self.project_url(&format!("events/{collection}"))?;
        send(self.write_request(url)?.json(event)).await?;
        Ok(())
    }

    /// Records events in bulk, keyed by collection name.
    pub async fn add_events(&self, events: &Map<String, Value>) -> Result<()> {
        let url = self.project_url("events")?;
        send(self.write_request(url)?.json(events)).await?;
        Ok(())
    }

    /// Sends the build job and each of its stages.
    pub async fn send_build_data(&self, job: &BuildJob) -> Result<()> {
        self.add_event(BUILD_JOBS_COLLECTION, &json!({"job": job.to_dict()}))
            .await?;

        let stages = job.stages_to_list();
        let stage_count = stages.len();
        let mut events = Map::new();
        events.insert(BUILD_STAGES_COLLECTION.to_string(), Value::Array(stages));
        self.add_events(&events).await?;

        info!("Sent build job and {stage_count} stages to analytics");
        Ok(())
    }

    fn project_url(&self, path: &str) -> Result<Url> {
        let project_id = self.project_id.as_deref().ok_or_else(|| {
            BuildTrendError::Config("analytics project id is not set".to_string())
        })?;

        self.base_url
            .join(&format!("3.0/projects/{project_id}/{path}"))
            .map_err(|e| BuildTrendError::Config(format!("Invalid analytics URL: {e}")))
    }

    fn write_request(&self, url: Url) -> Result<RequestBuilder> {
        let write_key = self.write_key.as_deref().ok_or_else(|| {
            BuildTrendError::Config("analytics write key is not set".to_string())
        })?;
        Ok(self.client.post(url).header("Authorization", write_key))
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
