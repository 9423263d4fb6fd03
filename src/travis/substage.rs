use log::{debug, warn};

use crate::stages::Stage;

/// Tags extracted from one fragment of a Travis CI log.
///
/// Timestamps and durations are in nanoseconds, as Travis writes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTags {
    pub start_stage: Option<String>,
    pub start_substage: Option<String>,
    pub start_hash: Option<String>,
    pub command: Option<String>,
    pub end_hash: Option<String>,
    pub start_timestamp: Option<u64>,
    pub finish_timestamp: Option<u64>,
    pub duration: Option<u64>,
    pub end_stage: Option<String>,
    pub end_substage: Option<String>,
}

/// One timed substage of a Travis CI job, reconciled from its log tags.
///
/// A substage starts when it gets a name (fold start), a timing hash (time
/// start) or a command; each of those can be set once. It finishes when
/// matching timing data or a matching fold end arrives, or incompletely when
/// an end tag cannot be matched to what was started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TravisSubstage {
    name: String,
    timing_hash: String,
    command: String,
    start_timestamp: u64,
    finish_timestamp: u64,
    duration: u64,
    finished: bool,
    finished_incomplete: bool,
}

impl TravisSubstage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timing_hash(&self) -> &str {
        &self.timing_hash
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn start_timestamp(&self) -> u64 {
        self.start_timestamp
    }

    pub fn finish_timestamp(&self) -> u64 {
        self.finish_timestamp
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn finished_incomplete(&self) -> bool {
        self.finished_incomplete
    }

    /// Applies every handler whose tags are present, in log order.
    ///
    /// Returns `true` if at least one handler succeeded.
    pub fn process_parsed_tags(&mut self, tags: &ParsedTags) -> bool {
        // every handler runs, no short-circuit
        let results = [
            self.process_start_stage(tags),
            self.process_start_time(tags),
            self.process_command(tags),
            self.process_end_time(tags),
            self.process_end_stage(tags),
        ];
        results.contains(&true)
    }

    /// Handles `travis_fold:start:<stage>.<substage>`.
    pub fn process_start_stage(&mut self, tags: &ParsedTags) -> bool {
        let (Some(stage), Some(substage)) = (&tags.start_stage, &tags.start_substage) else {
            return false;
        };

        if self.has_finished() || self.has_name() {
            warn!(
                "Substage '{}' already started, ignoring start tag {stage}.{substage}",
                self.get_name()
            );
            return false;
        }

        self.name = format!("{stage}.{substage}");
        debug!("Start stage : {}", self.name);
        true
    }

    /// Handles `travis_time:start:<hash>`.
    pub fn process_start_time(&mut self, tags: &ParsedTags) -> bool {
        let Some(start_hash) = &tags.start_hash else {
            return false;
        };

        if self.has_finished() || self.has_timing_hash() {
            warn!(
                "Substage timing already started, ignoring start hash {start_hash}"
            );
            return false;
        }

        self.timing_hash = start_hash.clone();
        debug!("Start time : {}", self.timing_hash);
        true
    }

    /// Handles a `$ <command>` line.
    pub fn process_command(&mut self, tags: &ParsedTags) -> bool {
        let Some(command) = &tags.command else {
            return false;
        };

        if self.has_finished() || self.has_command() {
            warn!(
                "Command is already set for substage '{}', ignoring {command}",
                self.get_name()
            );
            return false;
        }

        self.command = command.clone();
        debug!("Command : {}", self.command);
        true
    }

    /// Handles `travis_time:end:<hash>:start=..,finish=..,duration=..`.
    ///
    /// Timing data is only taken over when the hash matches the one the
    /// substage was started with; otherwise the substage finishes incomplete.
    pub fn process_end_time(&mut self, tags: &ParsedTags) -> bool {
        let (Some(end_hash), Some(start_timestamp), Some(finish_timestamp), Some(duration)) = (
            &tags.end_hash,
            tags.start_timestamp,
            tags.finish_timestamp,
            tags.duration,
        ) else {
            return false;
        };

        if !self.has_started() {
            warn!("Substage timing was not started, end hash {end_hash}");
            self.finished_incomplete = true;
            return false;
        }

        if *end_hash != self.timing_hash {
            warn!(
                "Substage timing hash mismatch, started with '{}', ended with '{end_hash}'",
                self.timing_hash
            );
            self.finished_incomplete = true;
            return false;
        }

        debug!("End time : {end_hash}");
        self.start_timestamp = start_timestamp;
        self.finish_timestamp = finish_timestamp;
        self.duration = duration;
        true
    }

    /// Handles `travis_fold:end:<stage>.<substage>`.
    pub fn process_end_stage(&mut self, tags: &ParsedTags) -> bool {
        let (Some(stage), Some(substage)) = (&tags.end_stage, &tags.end_substage) else {
            return false;
        };

        if !self.has_started() {
            warn!("Substage was not started, end tag {stage}.{substage}");
            self.finished_incomplete = true;
            return false;
        }

        let end_name = format!("{stage}.{substage}");
        if end_name != self.name {
            warn!(
                "Substage name mismatch, started as '{}', ended as '{end_name}'",
                self.name
            );
            self.finished_incomplete = true;
            return false;
        }

        debug!("End stage : {end_name}");
        self.finished = true;
        true
    }

    /// Name of the substage, falling back to its command.
    pub fn get_name(&self) -> &str {
        if self.has_name() {
            &self.name
        } else {
            &self.command
        }
    }

    pub fn has_name(&self) -> bool {
        !self.name.is_empty()
    }

    pub fn has_timing_hash(&self) -> bool {
        !self.timing_hash.is_empty()
    }

    pub fn has_command(&self) -> bool {
        !self.command.is_empty()
    }

    pub fn has_started(&self) -> bool {
        self.has_name() || self.has_timing_hash() || self.has_command()
    }

    pub fn has_finished(&self) -> bool {
        self.finished || self.finish_timestamp > 0 || self.finished_incomplete
    }

    /// Whether matching timing data was taken over.
    pub fn has_timing(&self) -> bool {
        self.finish_timestamp > 0
    }

    /// Converts the reconciled substage into a build stage.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_stage(&self) -> Stage {
        let mut stage = Stage::new();
        stage.set_name(self.get_name());
        if self.has_command() {
            stage.set_command(self.command.as_str());
        }
        stage.set_started_at_nano(self.start_timestamp as f64);
        stage.set_finished_at_nano(self.finish_timestamp as f64);
        stage.set_duration_nano(self.duration as f64);
        stage
    }
}
