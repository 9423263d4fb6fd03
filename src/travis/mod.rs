mod client;
mod parser;
mod substage;

pub use client::{TravisBuild, TravisClient, DEFAULT_TRAVIS_API_URL};
pub use parser::{parse_job_log, TravisLogParser};
