use lazytable_core::{source::SourceError, table::TableError};
use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Failed to open fixed-width file {path}: {source}"))]
    OpenSource { path: String, source: SourceError },

    #[snafu(display("Failed to set up the generator: {source}"))]
    Generator { source: SourceError },

    #[snafu(display("Failed to convert {input}: {source}"))]
    Convert { input: String, source: SourceError },

    #[snafu(display("{source}"))]
    Table {
        #[snafu(source(from(TableError, Box::new)))]
        source: Box<TableError>,
    },

    #[snafu(display("Invalid filter '{expr}': {message}"))]
    InvalidFilter { expr: String, message: String },

    #[snafu(display("Failed to read prefetch config {path}"))]
    ReadConfig {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Invalid prefetch config {path}: {source}"))]
    ParseConfig {
        path: String,
        source: serde_json::Error,
    },

    #[snafu(display("Failed to initialize readline: {source}"))]
    Readline {
        source: rustyline::error::ReadlineError,
    },

    #[snafu(display("Shell thread failed: {message}"))]
    ShellThread { message: String },
}
