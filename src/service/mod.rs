mod analytics;

pub use analytics::AnalyticsClient;

use log::warn;

use crate::config::Settings;
use crate::error::{BuildTrendError, Result};

const REPO_BUILD_NOT_SET: &str =
    "Repo or build are not set, format : /travis/<repo_owner>/<repo_name>/<build>";
const WRITE_KEY_NOT_SET: &str = "Keen IO write key not set, no data was sent";
const BUILD_CHECK_FAILED: &str = "Error checking if build exists.";

/// Checks a repository name against the configured deny and allow lists.
///
/// Entries match as substrings of `repo`. Denied entries always win; a
/// non-empty allow list requires at least one entry to match.
pub fn is_repo_allowed(settings: &Settings, repo: Option<&str>) -> bool {
    let Some(repo) = repo else {
        return false;
    };

    let service = &settings.service;
    if service
        .denied_repo
        .iter()
        .any(|denied| repo.contains(denied.as_str()))
    {
        return false;
    }

    service.allowed_repo.is_empty()
        || service
            .allowed_repo
            .iter()
            .any(|allowed| repo.contains(allowed.as_str()))
}

/// Formats a duration in seconds as `1h 2m 3s`, rounded to whole seconds.
pub fn format_duration(duration: Option<f64>) -> String {
    let Some(duration) = duration.filter(|d| d.is_finite() && *d >= 0.0) else {
        return "unknown".to_string();
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total = duration.round() as u64;
    let (hours, minutes, seconds) = (total / 3600, total % 3600 / 60, total % 60);

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Validates the repo and build of an incoming build notification.
///
/// Returns a message explaining why the request is refused, `None` when it is accepted.
pub fn validate_travis_request(
    settings: &Settings,
    repo: Option<&str>,
    build: Option<&str>,
) -> Option<String> {
    let (Some(repo), Some(_)) = (repo, build) else {
        return Some(REPO_BUILD_NOT_SET.to_string());
    };

    if !is_repo_allowed(settings, Some(repo)) {
        return Some(format!("Project '{repo}' is not allowed."));
    }

    None
}

/// Checks a build can be stored: analytics must be writable and the build not yet recorded.
///
/// # Errors
///
/// Returns `BuildTrendError::BuildCheck` when the existence check itself fails.
pub async fn validate_task_parameters(
    settings: &Settings,
    analytics: &AnalyticsClient,
    repo: &str,
    build: &str,
) -> Result<Option<String>> {
    let has_write_key = settings
        .analytics
        .write_key
        .as_deref()
        .is_some_and(|key| !key.trim().is_empty());
    if !has_write_key {
        return Ok(Some(WRITE_KEY_NOT_SET.to_string()));
    }

    match analytics.has_build_id(repo, build).await {
        Ok(true) => Ok(Some(format!(
            "Build #{build} of project {repo} already exists in database"
        ))),
        Ok(false) => Ok(None),
        Err(e) => {
            warn!("Checking build #{build} of {repo} failed: {e}");
            Err(BuildTrendError::BuildCheck(BUILD_CHECK_FAILED.to_string()))
        }
    }
}

/// Runs request validation, then task validation.
pub async fn check_process_parameters(
    settings: &Settings,
    analytics: &AnalyticsClient,
    repo: Option<&str>,
    build: Option<&str>,
) -> Result<Option<String>> {
    if let Some(message) = validate_travis_request(settings, repo, build) {
        return Ok(Some(message));
    }

    match (repo, build) {
        (Some(repo), Some(build)) => {
            validate_task_parameters(settings, analytics, repo, build).await
        }
        _ => Ok(Some(REPO_BUILD_NOT_SET.to_string())),
    }
}
