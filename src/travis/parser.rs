use lazy_static::lazy_static;
use log::{debug, info};
use regex::{Captures, Regex};

use crate::stages::Stages;

use super::substage::{ParsedTags, TravisSubstage};

lazy_static! {
    static ref ANSI_ESCAPE: Regex = Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap();
    static ref FOLD_START: Regex =
        Regex::new(r"travis_fold:start:(?P<start_stage>[\w\-]+)\.(?P<start_substage>[\w\-]+)")
            .unwrap();
    static ref FOLD_END: Regex =
        Regex::new(r"travis_fold:end:(?P<end_stage>[\w\-]+)\.(?P<end_substage>[\w\-]+)").unwrap();
    static ref TIME_START: Regex =
        Regex::new(r"travis_time:start:(?P<start_hash>[0-9a-fA-F]+)").unwrap();
    static ref TIME_END: Regex = Regex::new(
        r"travis_time:end:(?P<end_hash>[0-9a-fA-F]+):start=(?P<start_timestamp>\d+),finish=(?P<finish_timestamp>\d+),duration=(?P<duration>\d+)"
    )
    .unwrap();
    static ref COMMAND: Regex = Regex::new(r"^\$ (?P<command>.+)$").unwrap();
}

/// Parses a complete Travis CI job log into stages.
pub fn parse_job_log(log: &str) -> Stages {
    let mut parser = TravisLogParser::new();
    for line in log.lines() {
        parser.parse_line(line);
    }
    parser.finish()
}

/// Streaming parser turning Travis CI log lines into stages.
///
/// Travis separates tags on one line with `\r` and wraps them in ANSI escape
/// sequences; every fragment is matched on its own, in log order, and fed to
/// the substage currently being reconciled.
#[derive(Debug, Default)]
pub struct TravisLogParser {
    current: TravisSubstage,
    stages: Stages,
}

impl TravisLogParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_line(&mut self, line: &str) {
        let line = ANSI_ESCAPE.replace_all(line, "");
        for fragment in line.split('\r') {
            if let Some(tags) = parse_fragment(fragment) {
                self.process_tags(&tags);
            }
        }
    }

    /// Returns the stages gathered so far; an unfinished substage is dropped.
    pub fn finish(self) -> Stages {
        if self.current.has_started() {
            debug!("Dropping unfinished substage '{}'", self.current.get_name());
        }
        info!("Parsed {} stages from Travis CI log", self.stages.len());
        self.stages
    }

    fn process_tags(&mut self, tags: &ParsedTags) {
        if tags.end_stage.is_some() && !self.current.has_started() {
            // fold of a substage already closed by its timing tag
            return;
        }

        if begins_new_substage(&self.current, tags) {
            debug!("Abandoning substage '{}'", self.current.get_name());
            self.current = TravisSubstage::new();
        }

        self.current.process_parsed_tags(tags);

        if self.current.has_finished() {
            if self.current.finished_incomplete() {
                debug!("Dropping incomplete substage '{}'", self.current.get_name());
            } else if !self.current.has_timing() {
                debug!("Substage '{}' ended without timing", self.current.get_name());
            } else {
                self.stages.add_stage(self.current.to_stage());
            }
            self.current = TravisSubstage::new();
        }
    }
}

/// Travis writes fold start, time start, command and time end in that order,
/// so a start tag following a later tag belongs to the next substage.
fn begins_new_substage(current: &TravisSubstage, tags: &ParsedTags) -> bool {
    if !current.has_started() {
        return false;
    }
    tags.start_stage.is_some()
        || (tags.start_hash.is_some() && (current.has_timing_hash() || current.has_command()))
        || (tags.command.is_some() && current.has_command())
}

fn parse_fragment(fragment: &str) -> Option<ParsedTags> {
    let fragment = fragment.trim_end();

    if let Some(caps) = TIME_END.captures(fragment) {
        return Some(ParsedTags {
            end_hash: capture(&caps, "end_hash"),
            start_timestamp: capture_number(&caps, "start_timestamp"),
            finish_timestamp: capture_number(&caps, "finish_timestamp"),
            duration: capture_number(&caps, "duration"),
            ..Default::default()
        });
    }

    if let Some(caps) = FOLD_END.captures(fragment) {
        return Some(ParsedTags {
            end_stage: capture(&caps, "end_stage"),
            end_substage: capture(&caps, "end_substage"),
            ..Default::default()
        });
    }

    if let Some(caps) = FOLD_START.captures(fragment) {
        return Some(ParsedTags {
            start_stage: capture(&caps, "start_stage"),
            start_substage: capture(&caps, "start_substage"),
            ..Default::default()
        });
    }

    if let Some(caps) = TIME_START.captures(fragment) {
        return Some(ParsedTags {
            start_hash: capture(&caps, "start_hash"),
            ..Default::default()
        });
    }

    COMMAND.captures(fragment).map(|caps| ParsedTags {
        command: capture(&caps, "command"),
        ..Default::default()
    })
}

fn capture(caps: &Captures<'_>, name: &str) -> Option<String> {
    caps.name(name).map(|m| m.as_str().to_string())
}

fn capture_number(caps: &Captures<'_>, name: &str) -> Option<u64> {
    caps.name(name).and_then(|m| m.as_str().parse().ok())
}
