use indexmap::IndexMap;
use log::warn;
use serde_json::{Map, Value};

use crate::output::xml::{format_number, XmlElement};
use crate::timestamp::{self, SplitTimestamp};

pub const STARTED_AT: &str = "started_at";
pub const FINISHED_AT: &str = "finished_at";

/// A single named timing interval of a build.
///
/// Setters for numeric fields are best-effort: invalid input is rejected,
/// logged, and reported through the returned flag, leaving the stage unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stage {
    name: String,
    duration: f64,
    command: Option<String>,
    /// Named timestamp events (`started_at`, `finished_at`, ...) in insertion order
    timestamps: IndexMap<String, SplitTimestamp>,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn timestamp(&self, event: &str) -> Option<&SplitTimestamp> {
        self.timestamps.get(event)
    }

    pub fn started_at(&self) -> Option<&SplitTimestamp> {
        self.timestamp(STARTED_AT)
    }

    pub fn finished_at(&self) -> Option<&SplitTimestamp> {
        self.timestamp(FINISHED_AT)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_command(&mut self, command: impl Into<String>) {
        self.command = Some(command.into());
    }

    /// Sets the duration in seconds. Negative and non-finite values are rejected.
    pub fn set_duration(&mut self, duration: f64) -> bool {
        if !duration.is_finite() || duration < 0.0 {
            warn!("Rejected duration {duration} for stage '{}'", self.name);
            return false;
        }
        self.duration = duration;
        true
    }

    /// Sets the duration from a value in nanoseconds.
    pub fn set_duration_nano(&mut self, duration: f64) -> bool {
        match timestamp::nano_to_seconds(duration) {
            Ok(seconds) => self.set_duration(seconds),
            Err(e) => {
                warn!("Rejected duration for stage '{}': {e}", self.name);
                false
            }
        }
    }

    /// Records a timestamp event, `seconds` being an epoch timestamp.
    pub fn set_timestamp(&mut self, event: &str, seconds: f64) -> bool {
        self.store_timestamp(event, timestamp::split(seconds))
    }

    /// Records a timestamp event, `nanoseconds` being an epoch timestamp in nanoseconds.
    pub fn set_timestamp_nano(&mut self, event: &str, nanoseconds: f64) -> bool {
        self.store_timestamp(event, timestamp::split_nano(nanoseconds))
    }

    pub fn set_started_at(&mut self, seconds: f64) -> bool {
        self.set_timestamp(STARTED_AT, seconds)
    }

    pub fn set_started_at_nano(&mut self, nanoseconds: f64) -> bool {
        self.set_timestamp_nano(STARTED_AT, nanoseconds)
    }

    pub fn set_finished_at(&mut self, seconds: f64) -> bool {
        self.set_timestamp(FINISHED_AT, seconds)
    }

    pub fn set_finished_at_nano(&mut self, nanoseconds: f64) -> bool {
        self.set_timestamp_nano(FINISHED_AT, nanoseconds)
    }

    fn store_timestamp(
        &mut self,
        event: &str,
        split: crate::error::Result<SplitTimestamp>,
    ) -> bool {
        match split {
            Ok(split) => {
                self.timestamps.insert(event.to_string(), split);
                true
            }
            Err(e) => {
                warn!("Rejected timestamp '{event}' for stage '{}': {e}", self.name);
                false
            }
        }
    }

    /// Flat mapping of the populated fields; `name` and `duration` are always present.
    pub fn to_dict(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("name".to_string(), Value::from(self.name.clone()));
        data.insert("duration".to_string(), Value::from(self.duration));
        if let Some(command) = &self.command {
            data.insert("command".to_string(), Value::from(command.clone()));
        }
        for (event, split) in &self.timestamps {
            data.insert(event.clone(), split.to_value());
        }
        data
    }

    /// `<stage>` element holding the scalar fields, string-coerced.
    ///
    /// Timestamp events are nested mappings and stay out of the attributes.
    pub fn to_xml(&self) -> XmlElement {
        let mut element = XmlElement::new("stage");
        element.set("duration", format_number(self.duration));
        element.set("name", self.name.as_str());
        if let Some(command) = &self.command {
            element.set("command", command.as_str());
        }
        element
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dict(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn split_value(seconds: f64) -> Value {
        timestamp::split(seconds).unwrap().to_value()
    }

    #[test]
    fn test_novalue() {
        let stage = Stage::new();
        assert_eq!(stage.to_dict(), dict(json!({"name": "", "duration": 0.0})));
        assert!(stage.started_at().is_none());
        assert!(stage.command().is_none());
    }

    #[test]
    fn test_set_name() {
        let mut stage = Stage::new();
        stage.set_name("stage_name");
        assert_eq!(
            stage.to_dict(),
            dict(json!({"name": "stage_name", "duration": 0.0}))
        );

        stage.set_name("");
        assert_eq!(stage.to_dict(), dict(json!({"name": "", "duration": 0.0})));
    }

    #[test]
    fn test_set_command() {
        let mut stage = Stage::new();
        stage.set_command("command1.sh");
        assert_eq!(
            stage.to_dict(),
            dict(json!({"name": "", "duration": 0.0, "command": "command1.sh"}))
        );

        // an empty command is still a command
        stage.set_command("");
        assert_eq!(
            stage.to_dict(),
            dict(json!({"name": "", "duration": 0.0, "command": ""}))
        );
    }

    #[test]
    fn test_set_duration() {
        let mut stage = Stage::new();
        assert!(!stage.set_duration(-1.0));
        assert!(!stage.set_duration(f64::NAN));
        assert_eq!(stage.duration(), 0.0);

        assert!(stage.set_duration(123.0));
        assert_eq!(stage.duration(), 123.0);
        assert!(stage.set_duration(123.456));
        assert_eq!(
            stage.to_dict(),
            dict(json!({"name": "", "duration": 123.456}))
        );

        assert!(stage.set_duration(0.0));
        assert_eq!(stage.duration(), 0.0);
    }

    #[test]
    fn test_set_duration_nano() {
        let mut stage = Stage::new();
        assert!(!stage.set_duration_nano(-1.0));
        assert!(!stage.set_duration_nano(f64::INFINITY));
        assert_eq!(stage.duration(), 0.0);

        assert!(stage.set_duration_nano(123_456_789.0));
        assert_eq!(
            stage.to_dict(),
            dict(json!({"name": "", "duration": 0.123_456_789}))
        );

        // fractions of a nanosecond are dropped
        assert!(stage.set_duration_nano(123_456_789.123));
        assert_eq!(stage.duration(), 0.123_456_789);

        assert!(stage.set_duration_nano(0.0));
        assert_eq!(stage.duration(), 0.0);
    }

    #[test]
    fn test_duration_nano_equals_seconds() {
        let mut nano = Stage::new();
        let mut seconds = Stage::new();
        assert!(nano.set_duration_nano(123_456_789.0));
        assert!(seconds.set_duration(0.123_456_789));
        assert_eq!(nano.to_dict(), seconds.to_dict());
    }

    #[test]
    fn test_set_timestamp() {
        let mut stage = Stage::new();
        assert!(!stage.set_timestamp("event1", -1.0));
        assert!(!stage.set_timestamp("event1", f64::NAN));
        assert_eq!(stage.to_dict(), dict(json!({"name": "", "duration": 0.0})));

        assert!(stage.set_timestamp("event1", 0.0));
        assert_eq!(
            stage.to_dict(),
            dict(json!({"name": "", "duration": 0.0, "event1": split_value(0.0)}))
        );

        assert!(stage.set_timestamp("event1", 1_396_378_735.0));
        assert_eq!(
            stage.timestamp("event1").unwrap().isotimestamp,
            "2014-04-01T18:58:55+00:00"
        );
    }

    #[test]
    fn test_set_timestamp_nano() {
        let mut stage = Stage::new();
        assert!(stage.set_timestamp_nano("event1", 0.0));
        assert_eq!(stage.timestamp("event1"), timestamp::split(0.0).ok().as_ref());

        assert!(stage.set_timestamp_nano("event1", 1_396_378_735_000_000_000.0));
        assert_eq!(
            stage.timestamp("event1"),
            timestamp::split(1_396_378_735.0).ok().as_ref()
        );
    }

    #[test]
    fn test_set_started_finished_at() {
        let mut stage = Stage::new();
        assert!(!stage.set_started_at(-3.0));
        assert!(stage.started_at().is_none());

        assert!(stage.set_started_at(1_396_378_735.0));
        assert!(stage.set_finished_at_nano(1_396_378_752_000_000_000.0));
        assert_eq!(stage.started_at().unwrap().second, 55);
        assert_eq!(stage.finished_at().unwrap().isotimestamp, "2014-04-01T18:59:12+00:00");

        let mut nano = Stage::new();
        assert!(nano.set_started_at_nano(1_396_378_735_000_000_000.0));
        assert_eq!(nano.started_at(), stage.started_at());
    }

    #[test]
    fn test_to_dict() {
        let mut stage = Stage::new();
        stage.set_name("stage.1");
        assert!(stage.set_duration(11.2345));
        stage.set_command("command1.sh");
        assert!(stage.set_started_at(1_396_378_735.0));
        assert!(stage.set_finished_at(1_396_378_752.0));

        assert_eq!(
            stage.to_dict(),
            dict(json!({
                "name": "stage.1",
                "duration": 11.2345,
                "command": "command1.sh",
                "started_at": split_value(1_396_378_735.0),
                "finished_at": split_value(1_396_378_752.0),
            }))
        );
    }

    #[test]
    fn test_to_xml() {
        let mut stage = Stage::new();
        stage.set_name("stage1");
        assert!(stage.set_duration(2.0));
        assert_eq!(
            stage.to_xml().to_compact_string(),
            "<stage duration=\"2.0\" name=\"stage1\"/>"
        );

        stage.set_command("make");
        assert!(stage.set_started_at(0.0));
        assert_eq!(
            stage.to_xml().to_compact_string(),
            "<stage duration=\"2.0\" name=\"stage1\" command=\"make\"/>"
        );
    }
}
