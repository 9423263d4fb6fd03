use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// Build settings shared by the exporters, the service checks and the analytics client.
///
/// Loaded once from a configuration file (or defaults), then overlaid with
/// the CI environment through [`Settings::load_env_vars`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    /// Name of the project the build belongs to (e.g. 'owner/repo')
    #[serde(default = "default_project_name")]
    pub project_name: String,

    /// Named build settings (build, job, branch, result, ...)
    #[serde(default)]
    pub settings: Map<String, Value>,

    /// Repository filters applied before accepting a build
    #[serde(default)]
    pub service: ServiceConfig,

    /// Analytics (Keen IO compatible) connection settings
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Output format preferences
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceConfig {
    /// Repository name fragments that are accepted; empty accepts all
    #[serde(default)]
    pub allowed_repo: Vec<String>,

    /// Repository name fragments that are always refused
    #[serde(default)]
    pub denied_repo: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AnalyticsConfig {
    #[serde(default = "default_analytics_base_url")]
    pub base_url: String,

    pub project_id: Option<String>,

    pub write_key: Option<String>,

    pub read_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Default output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
    Xml,
    /// One JSON document per stage, each carrying the build properties
    List,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            settings: Map::new(),
            service: ServiceConfig::default(),
            analytics: AnalyticsConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            base_url: default_analytics_base_url(),
            project_id: None,
            write_key: None,
            read_key: None,
        }
    }
}

fn default_project_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_analytics_base_url() -> String {
    "https://api.keen.io".to_string()
}

/// Travis variables holding the dimensions of a build matrix entry.
const BUILD_MATRIX_VARS: [(&str, &str); 8] = [
    ("TRAVIS_OS_NAME", "os"),
    ("TRAVIS_PYTHON_VERSION", "language_version"),
    ("TRAVIS_RUBY_VERSION", "language_version"),
    ("TRAVIS_PHP_VERSION", "language_version"),
    ("TRAVIS_NODE_VERSION", "language_version"),
    ("TRAVIS_JDK_VERSION", "language_version"),
    ("CC", "compiler"),
    ("ENV", "parameters"),
];

impl Settings {
    /// Load settings from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./buildtrend.toml
    /// 3. ./buildtrend.json
    /// 4. ./buildtrend.yaml
    /// 5. ./buildtrend.yml
    ///
    /// Returns default settings if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "buildtrend.toml",
            "buildtrend.json",
            "buildtrend.yaml",
            "buildtrend.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    /// Load settings from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Save settings to a file, the format following the extension (TOML by default).
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn get_setting(&self, name: &str) -> Option<&Value> {
        self.settings.get(name)
    }

    pub fn add_setting(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.settings.insert(name.into(), value.into());
    }

    pub fn get_project_name(&self) -> &str {
        &self.project_name
    }

    pub fn set_project_name(&mut self, name: impl Into<String>) {
        self.project_name = name.into();
    }

    /// Overlays settings with CI environment variables.
    ///
    /// Travis variables are only taken into account when `TRAVIS` is `true`;
    /// analytics keys and repository filters are read regardless.
    pub fn load_env_vars<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();

        if vars.get("TRAVIS").map(String::as_str) == Some("true") {
            self.load_travis_env_vars(&vars);
        }

        if let Some(project_id) = vars.get("KEEN_PROJECT_ID") {
            self.analytics.project_id = Some(project_id.clone());
        }
        if let Some(write_key) = vars.get("KEEN_WRITE_KEY") {
            self.analytics.write_key = Some(write_key.clone());
        }
        if let Some(read_key) = vars.get("KEEN_READ_KEY") {
            self.analytics.read_key = Some(read_key.clone());
        }

        if let Some(allowed) = vars.get("BTT_ALLOWED_REPO") {
            self.service.allowed_repo = split_list(allowed);
        }
        if let Some(denied) = vars.get("BTT_DENIED_REPO") {
            self.service.denied_repo = split_list(denied);
        }
    }

    fn load_travis_env_vars(&mut self, vars: &HashMap<String, String>) {
        debug!("Loading Travis CI environment variables");
        self.add_setting("ci_platform", "travis");

        if let Some(slug) = vars.get("TRAVIS_REPO_SLUG") {
            self.set_project_name(slug.as_str());
        }

        let copied = [
            ("TRAVIS_BUILD_NUMBER", "build"),
            ("TRAVIS_JOB_NUMBER", "job"),
            ("TRAVIS_BRANCH", "branch"),
            ("TRAVIS_EVENT_TYPE", "build_trigger"),
        ];
        for (var, setting) in copied {
            if let Some(value) = vars.get(var) {
                self.add_setting(setting, value.as_str());
            }
        }

        if let Some(pull_request) = vars.get("TRAVIS_PULL_REQUEST") {
            self.add_setting("pull_request", pull_request_setting(pull_request));
        }

        if let Some(result) = vars.get("TRAVIS_TEST_RESULT") {
            let result = if result.trim() == "0" { "passed" } else { "failed" };
            self.add_setting("result", result);
        }

        if let Some(build_matrix) = build_matrix_setting(vars) {
            self.add_setting("build_matrix", build_matrix);
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn pull_request_setting(raw: &str) -> Value {
    match raw.trim() {
        "" | "false" => json!({"is_pull_request": false, "title": "", "number": 0}),
        number => json!({
            "is_pull_request": true,
            "title": "unknown",
            "number": number.parse::<u64>().map_or_else(|_| Value::from(number), Value::from),
        }),
    }
}

fn build_matrix_setting(vars: &HashMap<String, String>) -> Option<Value> {
    let mut matrix = Map::new();
    let mut summary = Vec::new();

    for (var, key) in BUILD_MATRIX_VARS {
        if matrix.contains_key(key) {
            continue;
        }
        if let Some(value) = vars.get(var).filter(|value| !value.is_empty()) {
            matrix.insert(key.to_string(), Value::from(value.as_str()));
            summary.push(value.as_str());
        }
    }

    if matrix.is_empty() {
        return None;
    }
    matrix.insert("summary".to_string(), Value::from(summary.join(" ")));
    Some(Value::Object(matrix))
}
