use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::buildjob::BuildJob;
use crate::config::{OutputFormat, Settings};
use crate::output::export_job;
use crate::service::{self, AnalyticsClient};
use crate::stages::{Resolution, Stages};
use crate::travis::{
    parse_job_log, TravisBuild, TravisClient, TravisLogParser, DEFAULT_TRAVIS_API_URL,
};

#[derive(Parser)]
#[command(name = "buildtrend")]
#[command(author, version, about = "Build stage timing trends", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./buildtrend.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,

    #[arg(short, long, global = true, value_enum)]
    format: Option<OutputFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build stages from a CSV file of `label,timestamp` rows
    Stages {
        csv: PathBuf,

        /// Timestamp closing a stage left open at the end of the file
        #[arg(short, long)]
        end_timestamp: Option<f64>,

        /// Timestamps in the file are in nanoseconds
        #[arg(short, long, default_value_t = false)]
        nanoseconds: bool,

        /// ISO 8601 timestamp of the build start
        #[arg(long)]
        started_at: Option<String>,

        /// ISO 8601 timestamp of the build end
        #[arg(long)]
        finished_at: Option<String>,
    },

    /// Build stages from a Travis CI job log, read from a file or fetched by job id
    TravisLog {
        file: Option<PathBuf>,

        #[arg(short, long, conflicts_with = "file")]
        job: Option<String>,

        /// Travis CI build id to take the build start and end times from
        #[arg(short, long)]
        build: Option<String>,

        #[arg(long, default_value = DEFAULT_TRAVIS_API_URL)]
        api_url: String,

        #[arg(short, long, env = "TRAVIS_TOKEN")]
        token: Option<String>,
    },

    /// Check whether a build would be accepted for processing
    Validate { repo: String, build: String },

    /// Validate a build, then send its job and stages to analytics
    Send {
        repo: String,
        build: String,
        csv: PathBuf,

        #[arg(short, long)]
        end_timestamp: Option<f64>,
    },

    /// Write the effective settings, environment included, to a config file
    SaveConfig { path: PathBuf },
}

impl Cli {
    fn write_job(&self, job: &BuildJob, settings: &Settings) -> Result<()> {
        let format = self.format.unwrap_or(settings.output.format);
        let pretty = self.pretty || settings.output.pretty;

        if let Some(output_path) = &self.output {
            let file = File::create(output_path)
                .with_context(|| format!("Failed to create {}", output_path.display()))?;
            let mut writer = BufWriter::new(file);
            export_job(job, format, pretty, &mut writer)?;
            writer.flush()?;
            info!("Build job written to: {}", output_path.display());
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            export_job(job, format, pretty, &mut handle)?;
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_stages(
        &self,
        settings: &Settings,
        csv: &Path,
        end_timestamp: Option<f64>,
        nanoseconds: bool,
        started_at: Option<&str>,
        finished_at: Option<&str>,
    ) -> Result<()> {
        info!("Reading stage timestamps from {}", csv.display());

        let mut stages = Stages::new();
        if nanoseconds {
            stages.set_resolution(Resolution::Nanoseconds);
        }
        if let Some(end_timestamp) = end_timestamp {
            stages.set_end_timestamp(end_timestamp);
        }
        if !stages.read_csv(csv) {
            bail!("Failed to read timestamp file: {}", csv.display());
        }

        let mut job = BuildJob::new();
        job.add_stages(stages);
        job.load_properties_from_settings(settings);
        if let Some(started_at) = started_at {
            job.set_started_at(started_at);
        }
        if let Some(finished_at) = finished_at {
            job.set_finished_at(finished_at);
        }

        self.write_job(&job, settings)
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_travis_log(
        &self,
        settings: &Settings,
        file: Option<&Path>,
        job_id: Option<&str>,
        build_id: Option<&str>,
        api_url: &str,
        token: Option<&str>,
    ) -> Result<()> {
        let stages = match (file, job_id) {
            (Some(file), _) => {
                let reader = File::open(file)
                    .map(BufReader::new)
                    .with_context(|| format!("Failed to open log file: {}", file.display()))?;
                let mut parser = TravisLogParser::new();
                for line in reader.lines() {
                    let line = line
                        .with_context(|| format!("Failed to read log file: {}", file.display()))?;
                    parser.parse_line(&line);
                }
                parser.finish()
            }
            (None, Some(job_id)) => {
                info!("Fetching log of Travis CI job {job_id}");
                let client = TravisClient::new(api_url, token.map(str::to_string))?;
                parse_job_log(&client.fetch_job_log(job_id).await?)
            }
            (None, None) => bail!("Either a log file or a Travis CI job id is required"),
        };

        let mut job = BuildJob::new();
        job.load_properties_from_settings(settings);
        job.add_stages(stages);

        if let Some(build_id) = build_id {
            info!("Fetching data of Travis CI build {build_id}");
            let client = TravisClient::new(api_url, token.map(str::to_string))?;
            apply_build_times(&mut job, &client.fetch_build(build_id).await?);
        }

        self.write_job(&job, settings)
    }

    async fn execute_validate(&self, settings: &Settings, repo: &str, build: &str) -> Result<()> {
        let analytics = AnalyticsClient::new(&settings.analytics)?;
        if analytics.is_writable() && !analytics.is_readable() {
            warn!("Analytics read key not set, the build existence check will fail");
        }

        match service::check_process_parameters(settings, &analytics, Some(repo), Some(build))
            .await?
        {
            Some(message) => println!("{message}"),
            None => println!("Build #{build} of project {repo} can be processed"),
        }

        Ok(())
    }

    async fn execute_send(
        &self,
        settings: &mut Settings,
        repo: &str,
        build: &str,
        csv: &Path,
        end_timestamp: Option<f64>,
    ) -> Result<()> {
        let mut job = BuildJob::from_csv(Some(csv), end_timestamp);
        if job.stages().is_empty() {
            bail!("No stages found in timestamp file: {}", csv.display());
        }

        let analytics = AnalyticsClient::new(&settings.analytics)?;

        if let Some(message) =
            service::check_process_parameters(settings, &analytics, Some(repo), Some(build)).await?
        {
            warn!("{message}");
            println!("{message}");
            return Ok(());
        }

        settings.set_project_name(repo);
        settings.add_setting("build", build);

        job.load_properties_from_settings(settings);

        analytics.send_build_data(&job).await?;
        println!(
            "Sent build #{build} of project {repo} ({} stages)",
            job.stages().len()
        );

        Ok(())
    }

    fn execute_save_config(&self, settings: &Settings, path: &Path) -> Result<()> {
        settings.save(path)?;
        info!("Settings written to: {}", path.display());
        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        let mut settings = Settings::load(self.config.as_deref())?;
        settings.load_env_vars(std::env::vars());

        match &self.command {
            Commands::Stages {
                csv,
                end_timestamp,
                nanoseconds,
                started_at,
                finished_at,
            } => self.execute_stages(
                &settings,
                csv,
                *end_timestamp,
                *nanoseconds,
                started_at.as_deref(),
                finished_at.as_deref(),
            ),
            Commands::TravisLog {
                file,
                job,
                build,
                api_url,
                token,
            } => {
                self.execute_travis_log(
                    &settings,
                    file.as_deref(),
                    job.as_deref(),
                    build.as_deref(),
                    api_url,
                    token.as_deref(),
                )
                .await
            }
            Commands::Validate { repo, build } => {
                self.execute_validate(&settings, repo, build).await
            }
            Commands::Send {
                repo,
                build,
                csv,
                end_timestamp,
            } => {
                self.execute_send(&mut settings, repo, build, csv, *end_timestamp)
                    .await
            }
            Commands::SaveConfig { path } => self.execute_save_config(&settings, path),
        }
    }
}

/// Takes the build start and end times reported by Travis CI over into the job.
fn apply_build_times(job: &mut BuildJob, build: &TravisBuild) {
    match &build.started_at {
        Some(started_at) => {
            job.set_started_at(started_at);
        }
        None => warn!("Travis CI build has not started yet"),
    }
    if let Some(finished_at) = &build.finished_at {
        job.set_finished_at(finished_at);
    }
}
