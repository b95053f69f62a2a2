//! CLI tool for browsing lazily materialized tables.

mod error;
mod expr;
mod render;
mod shell;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Parser, Subcommand};
use lazytable_core::{
    source::DataSource,
    table::{LazyTable, PrefetchConfig},
};
use lazytable_sources::{FixedWidthSource, GeneratorSource, convert_tab_to_fixed, fixed_path_for};
use log::debug;
use snafu::ResultExt;

use crate::{
    error::{
        CliResult, ConvertSnafu, GeneratorSnafu, OpenSourceSnafu, ParseConfigSnafu,
        ReadConfigSnafu, TableSnafu,
    },
    expr::parse_filter,
    render::{Labels, render_header, render_row},
    shell::cmd_shell,
};

const DEFAULT_SEED: u64 = 12345;

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the first rows of a fixed-width file
    Head {
        #[arg(long)]
        file: PathBuf,

        #[arg(long, default_value_t = 10)]
        rows: usize,

        /// Repeatable filter, e.g. --where 'a > 1' --where 'class == yes'
        #[arg(long = "where")]
        filters: Vec<String>,
    },

    /// Print the first rows of the two-Gaussian demo generator
    Generate {
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        #[arg(long, default_value_t = 10)]
        rows: usize,

        /// Repeatable filter, e.g. --where 'a > 1'
        #[arg(long = "where")]
        filters: Vec<String>,
    },

    /// Convert a tab-separated file into a fixed-width file
    Convert {
        #[arg(long)]
        input: PathBuf,

        /// Defaults to the input path with a `.fixed` extension
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Interactive shell over a live lazy table
    Shell {
        #[arg(long, conflicts_with = "generate", required_unless_present = "generate")]
        file: Option<PathBuf>,

        /// Browse the demo generator instead of a file
        #[arg(long, default_value_t = false)]
        generate: bool,

        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        /// JSON file with prefetch settings (interval_ms, batch_rows, max_probes)
        #[arg(long = "prefetch-config")]
        prefetch_config: Option<PathBuf>,

        /// Optional history file path
        #[arg(long)]
        history: Option<PathBuf>,
    },
}

#[derive(Debug, Parser)]
#[command(name = "lazytable", version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

/// A table ready for browsing plus what is needed to display it.
pub(crate) struct OpenedTable {
    pub(crate) table: LazyTable,
    pub(crate) labels: Labels,
    pub(crate) description: String,
}

fn open_file(path: &Path) -> CliResult<OpenedTable> {
    let source = Arc::new(FixedWidthSource::open(path).context(OpenSourceSnafu {
        path: path.display().to_string(),
    })?);
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let table = LazyTable::builder()
        .name(name)
        .shared_source(source.clone())
        .build()
        .context(TableSnafu)?;
    Ok(OpenedTable {
        table,
        description: format!("{} ({} rows)", path.display(), source.row_count()),
        labels: Labels::from_file(source),
    })
}

fn open_generator(seed: u64) -> CliResult<OpenedTable> {
    let source = GeneratorSource::two_gaussians(seed).context(GeneratorSnafu)?;
    let length = source.pull_length().context(GeneratorSnafu)?;
    let table = LazyTable::builder()
        .name("generated")
        .source(source)
        .build()
        .context(TableSnafu)?;
    Ok(OpenedTable {
        table,
        labels: Labels::default(),
        description: format!("two-gaussian generator (seed {seed}, {length} rows)"),
    })
}

fn apply_filters(opened: &OpenedTable, filters: &[String]) -> CliResult<LazyTable> {
    let mut view = opened.table.clone();
    for expr in filters {
        let predicate = parse_filter(expr, view.domain(), &opened.labels)?;
        view = view.derive(predicate).context(TableSnafu)?;
        debug!("applied filter {expr:?}");
    }
    Ok(view)
}

fn print_rows(opened: &OpenedTable, filters: &[String], rows: usize) -> CliResult<()> {
    let view = apply_filters(opened, filters)?;
    println!("{}", render_header(view.domain()));
    for row in view.iter().take(rows) {
        let row = row.context(TableSnafu)?;
        println!("{}", render_row(&row, &opened.labels).context(TableSnafu)?);
    }
    Ok(())
}

fn cmd_convert(input: &Path, output: Option<PathBuf>) -> CliResult<()> {
    let output = output.unwrap_or_else(|| fixed_path_for(input));
    let summary = convert_tab_to_fixed(input, &output).context(ConvertSnafu {
        input: input.display().to_string(),
    })?;
    println!(
        "Created {} from {} ({} lines, {} columns)",
        output.display(),
        input.display(),
        summary.lines,
        summary.columns
    );
    Ok(())
}

fn load_prefetch_config(path: Option<&Path>) -> CliResult<PrefetchConfig> {
    let Some(path) = path else {
        return Ok(PrefetchConfig::default());
    };
    let raw = std::fs::read_to_string(path).context(ReadConfigSnafu {
        path: path.display().to_string(),
    })?;
    serde_json::from_str(&raw).context(ParseConfigSnafu {
        path: path.display().to_string(),
    })
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Head {
            file,
            rows,
            filters,
        } => print_rows(&open_file(&file)?, &filters, rows),
        Command::Generate {
            seed,
            rows,
            filters,
        } => print_rows(&open_generator(seed)?, &filters, rows),
        Command::Convert { input, output } => cmd_convert(&input, output),
        Command::Shell {
            file,
            generate: _,
            seed,
            prefetch_config,
            history,
        } => {
            let prefetch = load_prefetch_config(prefetch_config.as_deref())?;
            let opened = match file {
                Some(path) => open_file(&path)?,
                None => open_generator(seed)?,
            };
            cmd_shell(opened, prefetch, history).await
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
