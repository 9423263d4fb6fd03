use std::path::Path;

use log::warn;
use serde_json::{Map, Value};

use crate::config::Settings;
use crate::output::xml::{format_number, XmlElement};
use crate::stages::{Stage, Stages, FINISHED_AT, STARTED_AT};
use crate::timestamp;

/// Settings copied onto a build job as properties of the same name.
const SETTINGS_PROPERTIES: [&str; 8] = [
    "build",
    "job",
    "branch",
    "ci_platform",
    "build_trigger",
    "pull_request",
    "result",
    "build_matrix",
];

/// A build job: free-form properties plus the stages it went through.
#[derive(Debug, Clone, Default)]
pub struct BuildJob {
    properties: Map<String, Value>,
    stages: Stages,
}

impl BuildJob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a build job, optionally reading stages from a timestamp CSV.
    ///
    /// The end timestamp, when given, closes a stage left open at the end of the file.
    pub fn from_csv(path: Option<&Path>, end_timestamp: Option<f64>) -> Self {
        let mut job = Self::new();
        if let Some(end_timestamp) = end_timestamp {
            job.stages.set_end_timestamp(end_timestamp);
        }
        if let Some(path) = path {
            job.stages.read_csv(path);
        }
        job
    }

    pub fn stages(&self) -> &Stages {
        &self.stages
    }

    /// Replaces the stages of the job.
    pub fn add_stages(&mut self, stages: Stages) {
        self.stages = stages;
    }

    pub fn add_stage(&mut self, stage: Stage) {
        self.stages.add_stage(stage);
    }

    pub fn add_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn get_property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Properties as set, completed with values derived from the stages.
    ///
    /// `duration` defaults to the total stage duration; `started_at` and
    /// `finished_at` come from the stages unless set explicitly.
    pub fn get_properties(&self) -> Map<String, Value> {
        let mut data = self.properties.clone();

        if !data.contains_key("duration") {
            data.insert(
                "duration".to_string(),
                Value::from(self.stages.total_duration()),
            );
        }

        if let Some(started_at) = self.stages.started_at() {
            if !data.contains_key(STARTED_AT) {
                data.insert(STARTED_AT.to_string(), started_at.to_value());
            }
        }

        if let Some(finished_at) = self.stages.finished_at() {
            if !data.contains_key(FINISHED_AT) {
                data.insert(FINISHED_AT.to_string(), finished_at.to_value());
            }
        }

        data
    }

    /// Sets the build start from an ISO 8601 timestamp; invalid input is logged and ignored.
    pub fn set_started_at(&mut self, isotimestamp: &str) -> bool {
        self.set_iso_property(STARTED_AT, isotimestamp)
    }

    /// Sets the build end from an ISO 8601 timestamp; invalid input is logged and ignored.
    pub fn set_finished_at(&mut self, isotimestamp: &str) -> bool {
        self.set_iso_property(FINISHED_AT, isotimestamp)
    }

    fn set_iso_property(&mut self, name: &str, isotimestamp: &str) -> bool {
        match timestamp::split_isotimestamp(isotimestamp) {
            Ok(split) => {
                self.add_property(name, split.to_value());
                true
            }
            Err(e) => {
                warn!("isotimestamp expected when setting {name} : {e}");
                false
            }
        }
    }

    /// Copies the build related settings, and the project name as `repo`.
    pub fn load_properties_from_settings(&mut self, settings: &Settings) {
        for name in SETTINGS_PROPERTIES {
            if let Some(value) = settings.get_setting(name) {
                self.add_property(name, value.clone());
            }
        }
        self.add_property("repo", settings.get_project_name());
    }

    pub fn to_dict(&self) -> Map<String, Value> {
        let mut data = self.get_properties();
        data.insert("stages".to_string(), Value::Array(self.stages.to_list()));
        data
    }

    /// One entry per stage, each carrying the build properties under `job`.
    pub fn stages_to_list(&self) -> Vec<Value> {
        let properties = self.get_properties();

        self.stages
            .stages()
            .iter()
            .map(|stage| {
                let mut entry = Map::new();
                entry.insert("stage".to_string(), Value::Object(stage.to_dict()));
                if !properties.is_empty() {
                    entry.insert("job".to_string(), Value::Object(properties.clone()));
                }
                Value::Object(entry)
            })
            .collect()
    }

    /// `<build>` element with the explicit properties as attributes and the stages nested.
    pub fn to_xml(&self) -> XmlElement {
        let mut root = XmlElement::new("build");
        for (name, value) in &self.properties {
            root.set(name.as_str(), attribute_value(value));
        }
        root.append(self.stages.to_xml());
        root
    }

    pub fn to_xml_string(&self) -> String {
        self.to_xml().to_pretty_string()
    }
}

fn attribute_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number
            .as_f64()
            .filter(|_| number.is_f64())
            .map_or_else(|| number.to_string(), format_number),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ISOTIMESTAMP_STARTED: &str = "2014-04-01T18:58:55+00:00";
    const ISOTIMESTAMP_FINISHED: &str = "2014-04-01T18:59:12+00:00";

    fn dict(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn split_value(seconds: f64) -> Value {
        timestamp::split(seconds).unwrap().to_value()
    }

    fn sample_csv() -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        write!(
            file,
            "stage1,1396378735\nstage2,1396378737\nstage3,1396378742\nend,1396378752\n"
        )
        .unwrap();
        file
    }

    fn stage(name: &str, duration: f64) -> Stage {
        let mut stage = Stage::new();
        stage.set_name(name);
        stage.set_duration(duration);
        stage
    }

    #[test]
    fn test_novalue() {
        let job = BuildJob::new();
        assert!(job.stages().is_empty());
        assert_eq!(job.get_properties(), dict(json!({"duration": 0.0})));
        assert_eq!(
            job.to_dict(),
            dict(json!({"duration": 0.0, "stages": []}))
        );
        assert!(job.stages_to_list().is_empty());
        assert_eq!(job.to_xml().to_compact_string(), "<build><stages/></build>");
        assert_eq!(job.to_xml_string(), "<build>\n  <stages/>\n</build>\n");
    }

    #[test]
    fn test_nofile() {
        let job = BuildJob::from_csv(Some(Path::new("nofile.csv")), None);
        assert!(job.stages().is_empty());

        let job = BuildJob::from_csv(Some(Path::new("")), None);
        assert!(job.stages().is_empty());
    }

    #[test]
    fn test_end_timestamp() {
        assert_eq!(BuildJob::new().stages().end_timestamp(), 0.0);

        let job = BuildJob::from_csv(Some(Path::new("")), Some(123.0));
        assert_eq!(job.stages().end_timestamp(), 123.0);
    }

    #[test]
    fn test_from_csv() {
        let file = sample_csv();
        let job = BuildJob::from_csv(Some(file.path()), None);

        assert_eq!(job.stages().len(), 3);
        assert_eq!(job.stages().total_duration(), 17.0);
    }

    #[test]
    fn test_set_started_finished_at() {
        let mut job = BuildJob::new();
        assert!(!job.set_started_at("1396378735"));
        assert!(!job.set_finished_at("not a timestamp"));
        assert_eq!(job.get_property(STARTED_AT), None);
        assert_eq!(job.get_property(FINISHED_AT), None);

        assert!(job.set_started_at(ISOTIMESTAMP_STARTED));
        assert!(job.set_finished_at(ISOTIMESTAMP_FINISHED));
        assert_eq!(
            job.get_property(STARTED_AT),
            Some(&timestamp::split_isotimestamp(ISOTIMESTAMP_STARTED).unwrap().to_value())
        );
        assert_eq!(
            job.get_property(FINISHED_AT).and_then(|v| v.get("isotimestamp")),
            Some(&json!(ISOTIMESTAMP_FINISHED))
        );
    }

    #[test]
    fn test_add_stages() {
        let file = sample_csv();
        let mut stages = Stages::new();
        assert!(stages.read_csv(file.path()));

        let mut job = BuildJob::new();
        job.add_stages(stages);
        assert_eq!(job.stages().len(), 3);

        job.add_stages(Stages::new());
        assert!(job.stages().is_empty());
    }

    #[test]
    fn test_add_stage() {
        let mut job = BuildJob::new();

        let mut first = stage("stage1", 235.0);
        first.set_started_at(1_396_378_735.0);
        first.set_finished_at(1_396_378_970.0);
        job.add_stage(first);

        job.add_stage(stage("stage2", 136.0));

        assert_eq!(job.stages().len(), 2);
        assert_eq!(
            job.get_properties(),
            dict(json!({
                "duration": 371.0,
                "started_at": split_value(1_396_378_735.0),
                "finished_at": split_value(1_396_378_970.0),
            }))
        );
    }

    #[test]
    fn test_add_property() {
        let mut job = BuildJob::new();
        job.add_property("property1", 2);
        assert_eq!(job.get_property("property1"), Some(&json!(2)));

        job.add_property("property1", 3);
        assert_eq!(job.get_property("property1"), Some(&json!(3)));

        job.add_property("property2", "value2");
        assert_eq!(
            job.get_properties(),
            dict(json!({"property1": 3, "property2": "value2", "duration": 0.0}))
        );
    }

    #[test]
    fn test_explicit_properties_win() {
        let mut job = BuildJob::from_csv(Some(sample_csv().path()), None);
        job.add_property("duration", 20);
        assert!(job.set_started_at("2014-04-01T18:58:50+00:00"));

        let properties = job.get_properties();
        assert_eq!(properties.get("duration"), Some(&json!(20)));
        assert_eq!(
            properties.get(STARTED_AT).and_then(|v| v.get("second")),
            Some(&json!(50))
        );
        assert_eq!(properties.get(FINISHED_AT), Some(&split_value(1_396_378_752.0)));
    }

    #[test]
    fn test_load_properties_from_settings() {
        let mut settings = Settings::default();
        settings.set_project_name("owner/repo");
        settings.add_setting("build", "123");
        settings.add_setting("branch", "main");
        settings.add_setting("unrelated", "ignored");

        let mut job = BuildJob::new();
        job.load_properties_from_settings(&settings);

        assert_eq!(
            job.get_properties(),
            dict(json!({
                "build": "123",
                "branch": "main",
                "repo": "owner/repo",
                "duration": 0.0,
            }))
        );
    }

    #[test]
    fn test_stages_to_list() {
        let mut job = BuildJob::new();
        job.add_stage(stage("stage1", 2.0));
        job.add_stage(stage("stage2", 5.0));
        job.add_property("build", "123");

        let job_properties = json!({"build": "123", "duration": 7.0});
        assert_eq!(
            job.stages_to_list(),
            vec![
                json!({"stage": {"name": "stage1", "duration": 2.0}, "job": job_properties}),
                json!({"stage": {"name": "stage2", "duration": 5.0}, "job": job_properties}),
            ]
        );
    }

    #[test]
    fn test_to_dict() {
        let mut job = BuildJob::new();
        job.add_stage(stage("stage1", 2.0));
        job.add_property("property1", 2);

        assert_eq!(
            job.to_dict(),
            dict(json!({
                "property1": 2,
                "duration": 2.0,
                "stages": [{"name": "stage1", "duration": 2.0}],
            }))
        );
    }

    #[test]
    fn test_to_xml() {
        let mut job = BuildJob::new();
        job.add_stage(stage("stage1", 2.0));
        job.add_stage(stage("stage2", 5.0));
        job.add_property("property1", 2);
        job.add_property("property2", 3.5);

        assert_eq!(
            job.to_xml_string(),
            "<build property1=\"2\" property2=\"3.5\">\n  <stages>\n    <stage duration=\"2.0\" name=\"stage1\"/>\n    <stage duration=\"5.0\" name=\"stage2\"/>\n  </stages>\n</build>\n"
        );
    }

    #[test]
    fn test_to_xml_string_from_csv() {
        let file = sample_csv();
        let mut job = BuildJob::from_csv(Some(file.path()), None);

        assert_eq!(
            job.to_xml_string(),
            "<build>\n\
             \x20 <stages>\n\
             \x20   <stage duration=\"2.0\" name=\"stage1\"/>\n\
             \x20   <stage duration=\"5.0\" name=\"stage2\"/>\n\
             \x20   <stage duration=\"10.0\" name=\"stage3\"/>\n\
             \x20 </stages>\n\
             </build>\n"
        );

        job.add_property("property1", 2);
        job.add_property("property2", 3);
        assert!(job
            .to_xml_string()
            .starts_with("<build property1=\"2\" property2=\"3\">\n"));
    }
}
