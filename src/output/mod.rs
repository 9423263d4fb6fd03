mod exports;
mod styling;
mod summary;
mod tables;
pub mod xml;

pub use exports::export_job;
pub use styling::{dim, magenta_bold};

/// Prints the `buildtrend` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("⏱ buildtrend"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Build stage timing trends")
    );
}
