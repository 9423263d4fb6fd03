mod stage;

use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use serde_json::Value;

use crate::output::xml::XmlElement;
use crate::timestamp::{self, SplitTimestamp};

pub use stage::{Stage, FINISHED_AT, STARTED_AT};

/// Labels that close the currently open stage instead of opening a new one.
const END_TAGS: [&str; 4] = ["end", "done", "finished", "completed"];

/// Unit of the raw timestamps fed to [`Stages::parse_timestamps`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Resolution {
    #[default]
    Seconds,
    Nanoseconds,
}

impl Resolution {
    fn to_seconds(self, value: f64) -> Option<f64> {
        match self {
            Resolution::Seconds => Some(value),
            Resolution::Nanoseconds => timestamp::nano_to_seconds(value).ok(),
        }
    }
}

/// Ordered collection of build stages.
///
/// `started_at` is taken from the first added stage carrying one and never
/// replaced afterwards; `finished_at` follows the last added stage carrying one.
#[derive(Debug, Clone, Default)]
pub struct Stages {
    stages: Vec<Stage>,
    started_at: Option<SplitTimestamp>,
    finished_at: Option<SplitTimestamp>,
    end_timestamp: Option<f64>,
    resolution: Resolution,
}

impl Stages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn started_at(&self) -> Option<&SplitTimestamp> {
        self.started_at.as_ref()
    }

    pub fn finished_at(&self) -> Option<&SplitTimestamp> {
        self.finished_at.as_ref()
    }

    /// Timestamp used to close a trailing open stage, 0 when not set.
    pub fn end_timestamp(&self) -> f64 {
        self.end_timestamp.unwrap_or(0.0)
    }

    /// Sets the timestamp used to close a stage left open at the end of the input.
    ///
    /// Expressed in the same unit as the parsed timestamps. Negative and
    /// non-finite values are rejected.
    pub fn set_end_timestamp(&mut self, end_timestamp: f64) -> bool {
        if !end_timestamp.is_finite() || end_timestamp < 0.0 {
            warn!("Rejected end timestamp {end_timestamp}");
            return false;
        }
        self.end_timestamp = Some(end_timestamp);
        true
    }

    pub fn set_resolution(&mut self, resolution: Resolution) {
        self.resolution = resolution;
    }

    /// Reads `label,timestamp` rows from a CSV file and parses them into stages.
    ///
    /// Returns `false` when the path is empty, the file does not exist or cannot be read.
    pub fn read_csv(&mut self, path: &Path) -> bool {
        if path.as_os_str().is_empty() || !path.is_file() {
            warn!("Timestamp file not found: {}", path.display());
            return false;
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read timestamp file {}: {e}", path.display());
                return false;
            }
        };

        let rows = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(index, line)| {
                let fields = parse_csv_row(line);
                if let [label, timestamp] = fields.as_slice() {
                    Some((label.clone(), timestamp.clone()))
                } else {
                    warn!(
                        "Skipping line {} of {}: expected 2 fields, found {}",
                        index + 1,
                        path.display(),
                        fields.len()
                    );
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!("Read {} timestamp rows from {}", rows.len(), path.display());
        self.parse_timestamps(rows);
        true
    }

    /// Turns an ordered `(label, timestamp)` stream into stages.
    ///
    /// Each label closes the stage opened by the previous label, using its own
    /// timestamp as finish. End labels (`end`, `done`, `finished`,
    /// `completed`, any case) only close; repeated end labels are no-ops. A
    /// stage still open after the last token is closed with the end timestamp
    /// when one is set, and dropped otherwise.
    pub fn parse_timestamps<I, L, T>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = (L, T)>,
        L: AsRef<str>,
        T: AsRef<str>,
    {
        let mut open: Option<(String, String)> = None;

        for (label, raw_timestamp) in tokens {
            let label = label.as_ref().trim();
            let raw_timestamp = raw_timestamp.as_ref().trim();

            if let Err(e) = timestamp::parse_seconds(raw_timestamp) {
                warn!("Skipping tag '{label}': {e}");
                continue;
            }

            if let Some((name, start)) = open.take() {
                if let Some(stage) = self.create_stage(&name, &start, raw_timestamp) {
                    self.add_stage(stage);
                }
            }

            if is_end_tag(label) {
                continue;
            }

            open = Some((label.to_string(), raw_timestamp.to_string()));
        }

        if let Some((name, start)) = open {
            let closed = self.end_timestamp.and_then(|end_timestamp| {
                let start = self.raw_to_seconds(&start)?;
                let finish = self.resolution.to_seconds(end_timestamp)?;
                Some(Self::build_stage(&name, start, finish))
            });
            match closed {
                Some(stage) => self.add_stage(stage),
                None => debug!("Dropping stage '{name}', it was never closed"),
            }
        }
    }

    /// Builds a stage from two raw timestamps in the configured resolution.
    ///
    /// Returns `None` when either timestamp is not numeric. A finish before
    /// the start leaves the duration at zero.
    pub fn create_stage(&self, name: &str, start: &str, finish: &str) -> Option<Stage> {
        let start = self.raw_to_seconds(start)?;
        let finish = self.raw_to_seconds(finish)?;
        Some(Self::build_stage(name, start, finish))
    }

    fn build_stage(name: &str, start: f64, finish: f64) -> Stage {
        let duration = finish - start;
        info!("Duration {name} : {duration}s");

        let mut stage = Stage::new();
        stage.set_name(name);
        stage.set_started_at(start);
        stage.set_finished_at(finish);
        stage.set_duration(duration);
        stage
    }

    fn raw_to_seconds(&self, raw: &str) -> Option<f64> {
        timestamp::parse_seconds(raw)
            .ok()
            .and_then(|value| self.resolution.to_seconds(value))
    }

    pub fn add_stage(&mut self, stage: Stage) {
        if self.started_at.is_none() {
            self.started_at = stage.started_at().cloned();
        }

        if let Some(finished_at) = stage.finished_at() {
            self.finished_at = Some(finished_at.clone());
        }

        self.stages.push(stage);
    }

    /// Sum of all stage durations in seconds.
    pub fn total_duration(&self) -> f64 {
        self.stages.iter().map(Stage::duration).sum()
    }

    pub fn to_list(&self) -> Vec<Value> {
        self.stages
            .iter()
            .map(|stage| Value::Object(stage.to_dict()))
            .collect()
    }

    pub fn to_xml(&self) -> XmlElement {
        let mut root = XmlElement::new("stages");
        for stage in &self.stages {
            root.append(stage.to_xml());
        }
        root
    }

    pub fn to_xml_string(&self) -> String {
        self.to_xml().to_pretty_string()
    }
}

fn is_end_tag(label: &str) -> bool {
    END_TAGS.iter().any(|tag| tag.eq_ignore_ascii_case(label))
}

/// Splits one comma separated line, honouring double quotes (`""` escapes a quote).
fn parse_csv_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
