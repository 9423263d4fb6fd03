use std::fmt::Write;

use comfy_table::Cell;
use serde_json::Value;

use crate::buildjob::BuildJob;
use crate::service::format_duration;

use super::styling::{bright, bright_yellow, cyan, dim};
use super::tables::{color_coded_duration_cell, create_cyan_header, create_table};

/// Renders a human-readable summary of a build job.
///
/// Shows an overview of the build properties followed by a table of stages,
/// each duration colored by its share of the total build time.
#[allow(clippy::format_push_string)]
pub fn render_summary(job: &BuildJob) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Overview");

    let total_duration = job.stages().total_duration();
    output.push_str(&format!(
        "  {} {}\n",
        dim("Project:"),
        cyan(property(job, "repo"))
    ));
    for (label, name) in [("Build:", "build"), ("Branch:", "branch"), ("Result:", "result")] {
        if job.get_property(name).is_some() {
            output.push_str(&format!("  {} {}\n", dim(label), property(job, name)));
        }
    }
    output.push_str(&format!(
        "  {} {}\n  {} {}\n",
        dim("Stages:"),
        bright_yellow(job.stages().len()),
        dim("Total duration:"),
        bright_yellow(format_duration(Some(total_duration)))
    ));
    if let Some(started_at) = job.stages().started_at() {
        output.push_str(&format!(
            "  {} {}\n",
            dim("Started at:"),
            started_at.isotimestamp
        ));
    }
    output.push('\n');

    if job.stages().is_empty() {
        output.push_str(&format!("{}\n", bright_yellow("No stage data found.")));
        return output;
    }

    add_section_header(&mut output, "⏱", "Stages");

    let mut table = create_table();
    table.set_header(create_cyan_header(&["Stage", "Command", "Started", "Duration"]));

    for stage in job.stages().stages() {
        let started = stage
            .started_at()
            .map_or_else(|| "N/A".to_string(), |split| split.isotimestamp.clone());
        table.add_row(vec![
            Cell::new(stage.name()),
            Cell::new(stage.command().unwrap_or("")),
            Cell::new(started),
            color_coded_duration_cell(stage.duration(), total_duration),
        ]);
    }

    output.push_str(&format!("{table}\n"));
    output
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn property(job: &BuildJob, name: &str) -> String {
    match job.get_property(name) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => "unknown".to_string(),
    }
}
