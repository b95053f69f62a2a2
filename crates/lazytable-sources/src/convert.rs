//! Tab-separated to fixed-width conversion.
//!
//! Every column is padded on the left to the byte width of its widest cell
//! and columns are joined with a single space, which yields the layout
//! [`FixedWidthSource`](crate::FixedWidthSource) reads. Ragged rows are
//! padded with blank (missing) cells.

use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use lazytable_core::source::{IoSnafu, MalformedSnafu, SourceResult};
use log::info;
use snafu::prelude::*;

/// What a conversion produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertSummary {
    /// Lines written, header lines included.
    pub lines: usize,
    /// Columns per line.
    pub columns: usize,
    /// Bytes per line, terminator included.
    pub line_len: usize,
}

/// Default output path for `input`: `glass.tab` becomes `glass.fixed`, any
/// other name gets `.fixed` appended.
pub fn fixed_path_for(input: &Path) -> PathBuf {
    match input.extension() {
        Some(ext) if ext == "tab" => input.with_extension("fixed"),
        _ => {
            let mut name = input.as_os_str().to_owned();
            name.push(".fixed");
            PathBuf::from(name)
        }
    }
}

/// Convert the tab-separated file `input` into the fixed-width file `output`.
pub fn convert_tab_to_fixed(input: &Path, output: &Path) -> SourceResult<ConvertSummary> {
    let text = fs::read_to_string(input).context(IoSnafu {
        action: format!("reading {}", input.display()),
    })?;

    let rows: Vec<Vec<&str>> = text
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line).split('\t').collect())
        .collect();
    ensure!(
        rows.len() >= 3,
        MalformedSnafu {
            message: format!("{}: expected three header lines", input.display()),
        }
    );

    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }
    // Column extents are recovered from the type line, so every type cell
    // needs a token.
    if let Some((col, _)) = rows[1]
        .iter()
        .chain(std::iter::repeat(&""))
        .take(columns)
        .enumerate()
        .find(|(_, cell)| cell.trim().is_empty())
    {
        return MalformedSnafu {
            message: format!("{}: column {col} has no type", input.display()),
        }
        .fail();
    }

    let file = fs::File::create(output).context(IoSnafu {
        action: format!("creating {}", output.display()),
    })?;
    let mut out = BufWriter::new(file);
    let mut line = String::new();
    for row in &rows {
        line.clear();
        for (col, width) in widths.iter().enumerate() {
            if col > 0 {
                line.push(' ');
            }
            let cell = row.get(col).copied().unwrap_or("");
            line.extend(std::iter::repeat_n(' ', width - cell.len()));
            line.push_str(cell);
        }
        line.push('\n');
        out.write_all(line.as_bytes()).context(IoSnafu {
            action: format!("writing {}", output.display()),
        })?;
    }
    out.flush().context(IoSnafu {
        action: format!("writing {}", output.display()),
    })?;

    let summary = ConvertSummary {
        lines: rows.len(),
        columns,
        line_len: widths.iter().sum::<usize>() + columns.saturating_sub(1) + 1,
    };
    info!(
        "converted {} to {} ({} lines, {} columns)",
        input.display(),
        output.display(),
        summary.lines,
        summary.columns
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_replaces_tab_extension() {
        assert_eq!(fixed_path_for(Path::new("data/glass.tab")), PathBuf::from("data/glass.fixed"));
        assert_eq!(fixed_path_for(Path::new("glass.txt")), PathBuf::from("glass.txt.fixed"));
        assert_eq!(fixed_path_for(Path::new("glass")), PathBuf::from("glass.fixed"));
    }
}
