use anyhow::Result;
use std::io::Write;

use crate::buildjob::BuildJob;
use crate::config::OutputFormat;

use super::summary::render_summary;

/// Exports a build job in the requested format.
///
/// - Summary: human-readable overview and stage table
/// - JSON: the build job with its properties and stages
/// - XML: `<build>` element with nested `<stages>`
/// - List: one entry per stage carrying the build properties, as sent to analytics
pub fn export_job(
    job: &BuildJob,
    format: OutputFormat,
    pretty: bool,
    output: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Summary => {
            write!(output, "{}", render_summary(job))?;
            Ok(())
        }
        OutputFormat::Json => export_json(job, pretty, output),
        OutputFormat::Xml => export_xml(job, pretty, output),
        OutputFormat::List => export_list(job, pretty, output),
    }
}

fn export_json(job: &BuildJob, pretty: bool, output: &mut dyn Write) -> Result<()> {
    let data = job.to_dict();
    let json = if pretty {
        serde_json::to_string_pretty(&data)?
    } else {
        serde_json::to_string(&data)?
    };
    writeln!(output, "{json}")?;
    Ok(())
}

fn export_xml(job: &BuildJob, pretty: bool, output: &mut dyn Write) -> Result<()> {
    if pretty {
        write!(output, "{}", job.to_xml_string())?;
    } else {
        writeln!(output, "{}", job.to_xml().to_compact_string())?;
    }
    Ok(())
}

fn export_list(job: &BuildJob, pretty: bool, output: &mut dyn Write) -> Result<()> {
    let entries = job.stages_to_list();
    if pretty {
        writeln!(output, "{}", serde_json::to_string_pretty(&entries)?)?;
    } else {
        // one document per line
        for entry in &entries {
            writeln!(output, "{}", serde_json::to_string(entry)?)?;
        }
    }
    Ok(())
}
