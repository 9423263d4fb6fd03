use reqwest::{Client, RequestBuilder, Response};
use url::Url;

use crate::error::{BuildTrendError, Result};

/// Builds the HTTP client shared by the API clients.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("buildtrend/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| BuildTrendError::Config(format!("Failed to create HTTP client: {e}")))
}

/// Parses a base URL so that relative paths are joined below it, not next to it.
pub fn parse_base_url(base_url: &str) -> Result<Url> {
    let normalized = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    };
    Url::parse(&normalized).map_err(|e| BuildTrendError::Config(format!("Invalid base URL: {e}")))
}

/// Sends a request, turning non-success statuses into `BuildTrendError::Api`.
pub async fn send(request: RequestBuilder) -> Result<Response> {
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        return Err(BuildTrendError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response)
}
